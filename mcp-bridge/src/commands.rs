//! One function per CLI subcommand (spec §1 "thin glue" over the Bridge
//! Manager and the IPC Request Client). Every function returns the JSON
//! value `main` either pretty-prints or wraps in `{"result": ...}` — there
//! is no separate human-rendering path per command, matching the single
//! generic renderer in `main.rs`.

use crate::error::secret_error;
use bridge_common::constants::{BRIDGES_DIR, DEFAULT_TIMEOUT_MS};
use bridge_common::{
    AuthProfileRecord, AuthType, BridgeError, ProxyConfig, SessionRecord, SessionStatus, TransportDescriptor,
};
use bridge_manager::BridgeManager;
use bridge_registry::{AuthProfileRegistry, FixedHomeProvider, SessionPatch, SessionRegistry};
use bridge_secrets::{KeyringSecretStore, OAuthCredentials, SecretStore, SecretStoreExt};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Plain data carried from [`crate::cli::Command::Connect`] into
/// [`connect`], decoupling the command implementations from clap's derive
/// attributes on the enum variant fields.
pub struct ConnectArgs {
    pub name: String,
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub headers: Vec<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub profile: Option<String>,
    pub ttl_ms: Option<u64>,
    pub proxy_port: Option<u16>,
    pub proxy_bearer: Option<String>,
}

/// Plain data carried from [`crate::cli::Command::ProfileLogin`] into
/// [`profile_login`].
pub struct ProfileLoginArgs {
    pub server_url: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: Option<String>,
    pub oauth_issuer: Option<String>,
}

/// Everything a command needs: the registries, the Secret Store, and the
/// Bridge Manager, all rooted at the same bridge home directory.
pub struct Context {
    home: PathBuf,
    registry: Arc<SessionRegistry>,
    auth_profiles: AuthProfileRegistry,
    secrets: Arc<dyn SecretStore>,
    manager: BridgeManager,
}

impl Context {
    pub fn new(home: PathBuf) -> Self {
        let secrets: Arc<dyn SecretStore> = Arc::new(KeyringSecretStore::default());
        let registry = Arc::new(SessionRegistry::new(FixedHomeProvider(home.clone())));
        let auth_profiles = AuthProfileRegistry::new(FixedHomeProvider(home.clone()));
        let manager = BridgeManager::new(home.clone(), secrets.clone());
        Self {
            home,
            registry,
            auth_profiles,
            secrets,
            manager,
        }
    }

    /// Run on every invocation before dispatching the subcommand (spec §4.1
    /// step 3): clears dangling `pid`s for bridges that crashed since the
    /// last run. Never fatal — a failure here just means this invocation
    /// sees slightly stale liveness data.
    pub fn startup_consolidate(&self) {
        if let Err(err) = self.manager.consolidate(false) {
            tracing::warn!(error = %err, "startup consolidation failed");
        }
    }
}

fn session_to_json(record: &SessionRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

fn validate_name(name: &str) -> Result<(), BridgeError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(BridgeError::client(format!(
            "invalid session name '{name}': only ASCII letters, digits, and '-' are allowed"
        )));
    }
    Ok(())
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>, BridgeError> {
    let mut map = HashMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once(':')
            .ok_or_else(|| BridgeError::client(format!("invalid --header '{entry}', expected 'Key: Value'")))?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

fn parse_env(raw: &[String]) -> Result<HashMap<String, String>, BridgeError> {
    let mut map = HashMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| BridgeError::client(format!("invalid --env '{entry}', expected 'KEY=VALUE'")))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

fn parse_arguments(raw: Option<String>) -> Result<Option<Value>, BridgeError> {
    match raw {
        None => Ok(None),
        Some(text) => {
            serde_json::from_str(&text).map(Some).map_err(|e| BridgeError::client(format!("invalid JSON in --arguments: {e}")))
        }
    }
}

/// `connect` (spec §4.1, §4.3, §4.7): registers a brand-new session and
/// brings its bridge up, spawning `mcp-bridge-daemon` if it isn't already
/// running. Refuses a name already in the registry — `close` or `restart`
/// handle the re-use cases.
pub async fn connect(ctx: &Context, args: ConnectArgs) -> Result<Value, BridgeError> {
    validate_name(&args.name)?;
    if ctx.registry.get(&args.name)?.is_some() {
        return Err(BridgeError::client(format!(
            "session '{}' already exists; use `close` first or `restart`",
            args.name
        )));
    }

    let transport = match (&args.url, &args.command) {
        (Some(url), None) => TransportDescriptor::Http {
            url: url.clone(),
            headers_present: !args.headers.is_empty(),
            timeout_ms: args.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        },
        (None, Some(command)) => TransportDescriptor::Stdio {
            command: command.clone(),
            args: args.args.clone(),
            env: parse_env(&args.env)?,
        },
        (Some(_), Some(_)) => return Err(BridgeError::client("--url and --command are mutually exclusive")),
        (None, None) => return Err(BridgeError::client("one of --url or --command is required")),
    };

    let socket_path = ctx.home.join(BRIDGES_DIR).join(format!("{}.sock", args.name));
    let mut record = SessionRecord::new(&args.name, transport, socket_path.display().to_string());
    record.profile_name = args.profile.clone();
    if let Some(ttl_ms) = args.ttl_ms {
        record.config.ttl_ms = ttl_ms;
    }

    let mut generated_bearer = None;
    if let Some(port) = args.proxy_port {
        let bearer = args.proxy_bearer.clone().unwrap_or_else(|| {
            let token = uuid::Uuid::new_v4().to_string();
            generated_bearer = Some(token.clone());
            token
        });
        ctx.secrets.set_proxy_bearer(&args.name, &bearer).map_err(secret_error)?;
        record.proxy_config = Some(ProxyConfig { port });
    }

    if !args.headers.is_empty() {
        let headers = parse_headers(&args.headers)?;
        ctx.secrets.set_session_headers(&args.name, &headers).map_err(secret_error)?;
    }

    ctx.registry.save(record)?;

    let live = ctx.manager.ensure_bridge_healthy(&args.name).await?;

    let mut result = session_to_json(&live);
    if let Some(token) = generated_bearer
        && let Value::Object(map) = &mut result
    {
        map.insert("generatedProxyBearer".to_string(), Value::String(token));
    }
    Ok(result)
}

/// `close` (spec §3 "removed by close"): stops the bridge and forgets the
/// session entirely, including any secrets it owned.
pub async fn close(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    ctx.manager.stop_bridge(name).await?;
    ctx.registry.delete(name)?;
    ctx.secrets.delete_session_secrets(name).map_err(secret_error)?;
    Ok(serde_json::json!({ "closed": name }))
}

/// `restart` (spec §8 scenario 3): stops the bridge, clears any `expired`
/// status so `ensureBridgeHealthy` is willing to respawn it, then spawns a
/// fresh one.
pub async fn restart(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    ctx.registry.get(name)?.ok_or_else(|| BridgeError::client(format!("no session named '{name}'")))?;
    ctx.manager.stop_bridge(name).await?;
    ctx.registry.update(
        name,
        SessionPatch {
            status: Some(SessionStatus::Crashed),
            pid: Some(None),
            ..Default::default()
        },
    )?;
    let record = ctx.manager.ensure_bridge_healthy(name).await?;
    Ok(session_to_json(&record))
}

/// `clean` (spec §4.1 `consolidate(cleanExpired: true)`, supplemented CLI
/// verb per spec §10.5).
pub fn clean(ctx: &Context) -> Result<Value, BridgeError> {
    let report = ctx.manager.consolidate(true)?;
    Ok(serde_json::json!({ "crashed": report.crashed, "expiredRemoved": report.expired_removed }))
}

/// `status` (no `name`: every session; with `name`: one record), always
/// freshened by a non-destructive consolidation pass first.
pub fn status(ctx: &Context, name: Option<String>) -> Result<Value, BridgeError> {
    ctx.manager.consolidate(false)?;
    match name {
        Some(name) => {
            let record = ctx.registry.get(&name)?.ok_or_else(|| BridgeError::client(format!("no session named '{name}'")))?;
            Ok(session_to_json(&record))
        }
        None => {
            let records = ctx.registry.load()?;
            Ok(Value::Array(records.iter().map(session_to_json).collect()))
        }
    }
}

async fn call_bridge(ctx: &Context, name: &str, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
    let record = ctx.manager.ensure_bridge_healthy(name).await?;
    let socket_path = PathBuf::from(&record.socket_path);
    bridge_ipc::call(&socket_path, method, params).await
}

pub async fn ping(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "ping", None).await?;
    Ok(serde_json::json!({ "ok": true }))
}

pub async fn tools_list(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "listTools", None).await
}

pub async fn tools_call(ctx: &Context, name: &str, tool: &str, arguments: Option<String>) -> Result<Value, BridgeError> {
    let params = serde_json::json!({ "name": tool, "arguments": parse_arguments(arguments)? });
    call_bridge(ctx, name, "callTool", Some(params)).await
}

pub async fn resources_list(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "listResources", None).await
}

pub async fn resources_read(ctx: &Context, name: &str, uri: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "readResource", Some(serde_json::json!({ "uri": uri }))).await
}

pub async fn resource_templates_list(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "listResourceTemplates", None).await
}

pub async fn resources_subscribe(ctx: &Context, name: &str, uri: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "subscribeResource", Some(serde_json::json!({ "uri": uri }))).await
}

pub async fn resources_unsubscribe(ctx: &Context, name: &str, uri: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "unsubscribeResource", Some(serde_json::json!({ "uri": uri }))).await
}

pub async fn prompts_list(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "listPrompts", None).await
}

pub async fn prompts_get(ctx: &Context, name: &str, prompt: &str, arguments: Option<String>) -> Result<Value, BridgeError> {
    let params = serde_json::json!({ "name": prompt, "arguments": parse_arguments(arguments)? });
    call_bridge(ctx, name, "getPrompt", Some(params)).await
}

pub async fn set_logging_level(ctx: &Context, name: &str, level: &str) -> Result<Value, BridgeError> {
    call_bridge(ctx, name, "setLoggingLevel", Some(serde_json::json!({ "level": level }))).await
}

/// `server-info` (spec §4.5 `initialize`): the four read-only facts the
/// daemon learned from the `initialize` handshake and has held ever since.
pub async fn server_info(ctx: &Context, name: &str) -> Result<Value, BridgeError> {
    let record = ctx.manager.ensure_bridge_healthy(name).await?;
    let socket_path = PathBuf::from(&record.socket_path);
    let capabilities = bridge_ipc::call(&socket_path, "getServerCapabilities", None).await?;
    let server_version = bridge_ipc::call(&socket_path, "getServerVersion", None).await?;
    let instructions = bridge_ipc::call(&socket_path, "getInstructions", None).await?;
    let protocol_version = bridge_ipc::call(&socket_path, "getProtocolVersion", None).await?;
    Ok(serde_json::json!({
        "capabilities": capabilities,
        "serverVersion": server_version,
        "instructions": instructions,
        "protocolVersion": protocol_version,
    }))
}

/// `profile-login` (spec §4.4): registers an already-issued OAuth token
/// triple under a named profile. Issuing that first token via the
/// authorization-code+PKCE flow is an external collaborator's job (spec
/// §1 Non-goals) — this just provisions the triple `OAuthTokenManager`
/// subsequently keeps refreshed.
pub fn profile_login(ctx: &Context, args: ProfileLoginArgs) -> Result<Value, BridgeError> {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::seconds(args.expires_in);

    let profile = AuthProfileRecord {
        name: args.name.clone(),
        server_url: args.server_url.clone(),
        auth_type: AuthType::Oauth,
        oauth_issuer: args.oauth_issuer.clone(),
        scopes: args
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        expires_at: Some(expires_at),
        authenticated_at: Some(now),
    };
    ctx.auth_profiles.save(profile)?;

    let creds = OAuthCredentials {
        client_id: args.client_id.clone(),
        client_secret: args.client_secret.clone(),
        access_token: args.access_token.clone(),
        refresh_token: args.refresh_token.clone(),
        token_type: "Bearer".to_string(),
        expires_at: expires_at.timestamp(),
        scope: args.scope.clone(),
    };
    ctx.secrets
        .set_oauth_credentials(&args.server_url, &args.name, &creds)
        .map_err(secret_error)?;

    Ok(serde_json::json!({ "profile": args.name, "serverUrl": args.server_url }))
}

pub fn profile_list(ctx: &Context, server_url: &str) -> Result<Value, BridgeError> {
    let profiles = ctx.auth_profiles.list_for_server(server_url)?;
    Ok(serde_json::to_value(profiles).unwrap_or(Value::Null))
}

pub fn profile_delete(ctx: &Context, server_url: &str, name: &str) -> Result<Value, BridgeError> {
    ctx.auth_profiles.delete(server_url, name)?;
    ctx.secrets
        .delete(&bridge_secrets::SecretKey::oauth_credentials(server_url, name))
        .map_err(secret_error)?;
    Ok(serde_json::json!({ "deleted": name, "serverUrl": server_url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().to_path_buf());
        (dir, ctx)
    }

    #[test]
    fn validate_name_rejects_non_ascii_punctuation() {
        assert!(validate_name("work-1").is_ok());
        assert!(validate_name("work/1").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn parse_headers_splits_on_first_colon() {
        let headers = parse_headers(&["Authorization: Bearer abc:def".to_string()]).unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer abc:def");
    }

    #[test]
    fn parse_arguments_rejects_invalid_json() {
        let err = parse_arguments(Some("{not json".to_string())).unwrap_err();
        assert_eq!(err.kind, bridge_common::ErrorKind::ClientError);
    }

    #[tokio::test]
    async fn connect_refuses_a_duplicate_session_name() {
        let (_dir, ctx) = ctx();
        let args = ConnectArgs {
            name: "s1".to_string(),
            url: None,
            timeout_ms: None,
            headers: vec![],
            command: Some("true".to_string()),
            args: vec![],
            env: vec![],
            profile: None,
            ttl_ms: None,
            proxy_port: None,
            proxy_bearer: None,
        };
        ctx.registry
            .save(SessionRecord::new(
                "s1",
                TransportDescriptor::Stdio {
                    command: "true".into(),
                    args: vec![],
                    env: Default::default(),
                },
                "/tmp/s1.sock",
            ))
            .unwrap();

        let err = connect(&ctx, args).await.unwrap_err();
        assert_eq!(err.kind, bridge_common::ErrorKind::ClientError);
    }

    #[test]
    fn status_with_no_sessions_returns_an_empty_array() {
        let (_dir, ctx) = ctx();
        let result = status(&ctx, None).unwrap();
        assert_eq!(result, serde_json::json!([]));
    }

    #[test]
    fn profile_login_then_list_round_trips_metadata_without_secrets() {
        let (_dir, ctx) = ctx();
        let args = ProfileLoginArgs {
            server_url: "https://mcp.example.com".to_string(),
            name: "work".to_string(),
            client_id: "client-1".to_string(),
            client_secret: None,
            access_token: "at-1".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_in: 3600,
            scope: Some("tools resources".to_string()),
            oauth_issuer: None,
        };
        profile_login(&ctx, args).unwrap();

        let listed = profile_list(&ctx, "https://mcp.example.com").unwrap();
        let array = listed.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["name"], "work");
        assert!(array[0].get("access_token").is_none());

        let creds = ctx.secrets.get_oauth_credentials("https://mcp.example.com", "work").unwrap().unwrap();
        assert_eq!(creds.access_token, "at-1");
    }
}
