//! Startup orchestration and main loop for one bridge daemon process (spec
//! §4.7). A daemon serves exactly one session: it is spawned by the Bridge
//! Manager (spec §4.8), named on the command line, and exits once its
//! session is drained, expired, or fails to come up at all.

use crate::error::{DaemonError, Result};
use crate::handler::{BridgeRequestHandler, RegistryNotificationSink};
use crate::state::{BridgeState, StateCell};
use bridge_cache::ListCache;
use bridge_common::constants::BRIDGE_PING_TIMEOUT_MS;
use bridge_common::{AuthType, SessionStatus, TransportDescriptor};
use bridge_core::{McpClient, NotificationSink};
use bridge_oauth::OAuthTokenManager;
use bridge_registry::{AuthProfileRegistry, SessionPatch, SessionRegistry};
use bridge_secrets::{KeyringSecretStore, SecretStore, SecretStoreExt};
use bridge_transport::{AuthMode, HttpTransportConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs a bridge daemon for session `name` to completion: startup,
/// main loop, graceful shutdown. Returns once the process should exit 0;
/// any error here maps to a nonzero exit by the caller in `main`.
pub async fn run(name: String, home: PathBuf) -> Result<()> {
    let registry = Arc::new(SessionRegistry::new(bridge_registry::FixedHomeProvider(home.clone())));
    let record = registry.get(&name)?.ok_or_else(|| DaemonError::NoSuchSession(name.clone()))?;
    let socket_path = PathBuf::from(&record.socket_path);

    refuse_if_already_bound(&socket_path).await?;

    let secrets: Arc<dyn SecretStore> = Arc::new(KeyringSecretStore::default());
    let cache = Arc::new(ListCache::new(Duration::from_millis(record.config.ttl_ms)));
    let state = StateCell::new();
    let sink: Arc<dyn NotificationSink> = Arc::new(RegistryNotificationSink::new(registry.clone(), name.clone()));

    info!(session = %name, transport = %record.transport.label(), "bridge daemon starting");

    let client = match connect(&record, &home, &name, secrets.clone(), cache.clone(), sink).await {
        Ok(client) => client,
        Err(err) => {
            warn!(session = %name, error = %err, "initialize handshake failed, exiting");
            return Err(err);
        }
    };
    state.set(BridgeState::Ready);

    let client = Arc::new(client);
    registry.update(
        &name,
        SessionPatch {
            mcp_session_id: client.http_mcp_session_id().await,
            protocol_version: client.protocol_version(),
            pid: Some(Some(std::process::id())),
            status: Some(SessionStatus::Live),
            ..Default::default()
        },
    )?;

    let shutdown = CancellationToken::new();
    let handler = Arc::new(BridgeRequestHandler {
        client: client.clone(),
        state: state.clone(),
        shutdown: shutdown.clone(),
        registry: registry.clone(),
        name: name.clone(),
    });

    let ipc_shutdown = shutdown.clone();
    let ipc_socket_path = socket_path.clone();
    let ipc_task = tokio::spawn(async move { bridge_ipc::serve_unix_socket(&ipc_socket_path, handler, ipc_shutdown).await });

    let proxy_task = match &record.proxy_config {
        Some(proxy_config) => start_proxy(&name, proxy_config.port, client.clone(), secrets.clone()).await,
        None => None,
    };

    wait_for_shutdown_signal(&shutdown, &state).await;
    let expired = state.get() == BridgeState::Expired;

    state.set(BridgeState::Draining);
    while state.outstanding() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    state.set(BridgeState::Stopping);

    if !expired
        && let Some(mcp_session_id) = client.http_mcp_session_id().await
        && let TransportDescriptor::Http { url, .. } = &record.transport
    {
        let bearer = resolve_release_bearer(&record, &home, secrets.clone()).await;
        release_http_session(url, &mcp_session_id, bearer.as_deref()).await;
    }

    if let Some(proxy_task) = proxy_task {
        proxy_task.abort();
    }
    shutdown.cancel();
    let _ = ipc_task.await;
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    if !expired {
        registry.update(
            &name,
            SessionPatch {
                status: Some(SessionStatus::Crashed),
                pid: Some(None),
                ..Default::default()
            },
        )?;
    }

    info!(session = %name, "bridge daemon exiting");
    Ok(())
}

/// Spec §4.7 step 1: a live bridge already answering on `socket_path` means
/// this process refuses to start; a stale socket file left behind by a
/// crashed bridge is not an error, it is simply removed when the IPC
/// acceptor binds.
async fn refuse_if_already_bound(socket_path: &Path) -> Result<()> {
    if !socket_path.exists() {
        return Ok(());
    }
    let probe = tokio::time::timeout(Duration::from_millis(BRIDGE_PING_TIMEOUT_MS), UnixStream::connect(socket_path)).await;
    match probe {
        Ok(Ok(_stream)) => Err(DaemonError::SocketInUse(socket_path.display().to_string())),
        _ => Ok(()),
    }
}

async fn connect(
    record: &bridge_common::SessionRecord,
    home: &Path,
    name: &str,
    secrets: Arc<dyn SecretStore>,
    cache: Arc<ListCache>,
    sink: Arc<dyn NotificationSink>,
) -> Result<McpClient> {
    match &record.transport {
        TransportDescriptor::Http { url, timeout_ms, .. } => {
            let timeout = Duration::from_millis(*timeout_ms);
            let headers = secrets.get_session_headers(name).map_err(DaemonError::Secrets)?.unwrap_or_default();
            let auth = resolve_http_auth(record, home, secrets)?;
            let config = HttpTransportConfig {
                url: url::Url::parse(url).map_err(|e| DaemonError::HandshakeFailed(e.to_string()))?,
                headers,
                auth,
                timeout,
            };
            let (client, info) = McpClient::connect_http(config, cache, sink, timeout).await?;
            info_log_handshake(name, &info);
            Ok(client)
        }
        TransportDescriptor::Stdio { command, args, env } => {
            let timeout = Duration::from_millis(bridge_common::constants::DEFAULT_TIMEOUT_MS);
            let (client, info) = McpClient::connect_stdio(command, args, env, cache, sink, timeout).await?;
            info_log_handshake(name, &info);
            Ok(client)
        }
    }
}

fn info_log_handshake(name: &str, info: &bridge_core::HandshakeInfo) {
    info!(
        session = %name,
        protocol_version = %info.protocol_version,
        server = %info.server_name,
        server_version = %info.server_version,
        "initialize handshake complete"
    );
}

/// Resolves the session's `AuthMode` from its `profile_name` (spec §4.3/§4.4):
/// no profile or a `none`-type profile means unauthenticated requests;
/// an `oauth`-type profile wires up the `OAuthTokenManager`.
fn resolve_http_auth(record: &bridge_common::SessionRecord, home: &Path, secrets: Arc<dyn SecretStore>) -> Result<AuthMode> {
    let Some(profile_name) = &record.profile_name else {
        return Ok(AuthMode::None);
    };
    let TransportDescriptor::Http { url, .. } = &record.transport else {
        return Ok(AuthMode::None);
    };
    let profiles = AuthProfileRegistry::new(bridge_registry::FixedHomeProvider(home.to_path_buf()));
    let profile = profiles.get(url, profile_name)?;
    match profile {
        Some(profile) if profile.auth_type == AuthType::Oauth => {
            let observer = Arc::new(AuthProfileRefreshObserver::new(home.to_path_buf()));
            Ok(AuthMode::OAuth {
                manager: Arc::new(OAuthTokenManager::new(secrets).with_observer(observer)),
                server_url: url.clone(),
                profile: profile_name.clone(),
            })
        }
        _ => Ok(AuthMode::None),
    }
}

/// The OAuth Token Manager's "persistence callback" (spec §4.4): after a
/// successful refresh, rewrites the auth profile's `expiresAt`/`scopes` in
/// `auth-profiles.json` so `profile-list` reflects the refreshed token
/// without touching the Secret Store the manager already updated directly.
struct AuthProfileRefreshObserver {
    home: PathBuf,
}

impl AuthProfileRefreshObserver {
    fn new(home: PathBuf) -> Self {
        Self { home }
    }
}

impl bridge_oauth::ProfileRefreshObserver for AuthProfileRefreshObserver {
    fn on_refreshed(&self, server_url: &str, profile: &str, credentials: &bridge_secrets::OAuthCredentials) {
        let profiles = AuthProfileRegistry::new(bridge_registry::FixedHomeProvider(self.home.clone()));
        let existing = match profiles.get(server_url, profile) {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                warn!(server_url, profile, "refreshed token for a profile no longer in the registry");
                return;
            }
            Err(err) => {
                warn!(server_url, profile, error = %err, "failed to read auth profile during refresh persistence");
                return;
            }
        };
        let updated = bridge_common::AuthProfileRecord {
            expires_at: Some(
                chrono::DateTime::from_timestamp(credentials.expires_at, 0).unwrap_or_else(chrono::Utc::now),
            ),
            scopes: credentials
                .scope
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or(existing.scopes),
            authenticated_at: Some(chrono::Utc::now()),
            ..existing
        };
        if let Err(err) = profiles.save(updated) {
            warn!(server_url, profile, error = %err, "failed to persist refreshed auth profile metadata");
        }
    }
}

async fn start_proxy(name: &str, port: u16, client: Arc<McpClient>, secrets: Arc<dyn SecretStore>) -> Option<tokio::task::JoinHandle<()>> {
    let token = match secrets.get_proxy_bearer(name) {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!(session = %name, "proxy_config set but no bearer token in secret store, skipping proxy server");
            return None;
        }
        Err(err) => {
            warn!(session = %name, error = %err, "failed to read proxy bearer token, skipping proxy server");
            return None;
        }
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(session = %name, %addr, error = %err, "failed to bind proxy server, skipping");
            return None;
        }
    };
    let router = bridge_proxy::router(client, token);
    info!(session = %name, %addr, "proxy server listening");
    Some(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            warn!(error = %err, "proxy server exited with error");
        }
    }))
}

/// Blocks until the bridge should start draining: either an IPC `shutdown`/
/// `restart` call cancelled the token, the session expired (spec §4.7 `ready
/// -> expired`), or the process received SIGINT/SIGTERM.
async fn wait_for_shutdown_signal(shutdown: &CancellationToken, state: &StateCell) {
    let mut sigterm = match signal_terminate() {
        Ok(sig) => sig,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            shutdown.cancelled().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::signal::ctrl_c() => { shutdown.cancel(); return; }
            _ = sigterm.recv() => { shutdown.cancel(); return; }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if state.get() == BridgeState::Expired {
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}

#[cfg(unix)]
fn signal_terminate() -> std::io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
}

#[cfg(not(unix))]
fn signal_terminate() -> std::io::Result<NeverFires> {
    Ok(NeverFires)
}

#[cfg(not(unix))]
struct NeverFires;

#[cfg(not(unix))]
impl NeverFires {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

/// Resolves the same bearer `resolve_http_auth` would hand to an MCP call on
/// this session's transport, so the graceful shutdown `DELETE` below doesn't
/// 401 against an OAuth/bearer-authenticated upstream. Best-effort: a failure
/// here is logged and the `DELETE` still goes out unauthenticated.
async fn resolve_release_bearer(record: &bridge_common::SessionRecord, home: &Path, secrets: Arc<dyn SecretStore>) -> Option<String> {
    let auth = match resolve_http_auth(record, home, secrets) {
        Ok(auth) => auth,
        Err(err) => {
            warn!(error = %err, "failed to resolve auth for graceful session DELETE");
            return None;
        }
    };
    match bridge_transport::resolve_bearer(&auth).await {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "failed to resolve bearer for graceful session DELETE");
            None
        }
    }
}

/// Spec §4.7: "on graceful shutdown over HTTP transport, the bridge issues
/// an HTTP `DELETE` on the MCP endpoint with the `MCP-Session-Id` header".
/// Best-effort: a failure here does not stop the daemon from exiting.
async fn release_http_session(url: &str, mcp_session_id: &str, bearer: Option<&str>) {
    let http = reqwest::Client::new();
    let mut builder = http.delete(url).header("MCP-Session-Id", mcp_session_id);
    if let Some(token) = bearer {
        builder = builder.bearer_auth(token);
    }
    match builder.send().await {
        Ok(response) if !response.status().is_success() => {
            warn!(status = %response.status(), "upstream rejected graceful session DELETE");
        }
        Err(err) => warn!(error = %err, "failed to send graceful session DELETE"),
        Ok(_) => {}
    }
}
