//! Dispatches the bridge IPC method surface (spec §4.7 "IPC wire format",
//! §6 "Bridge IPC") onto a single shared [`McpClient`], and keeps the
//! session registry's `notifications.<kind>.listChangedAt` timestamps in
//! sync with `*/list_changed` frames the client core observes (spec §4.5).

use crate::state::{BridgeState, StateCell};
use bridge_cache::CacheKind;
use bridge_common::{BridgeError, ErrorKind};
use bridge_core::{McpClient, NotificationSink};
use bridge_ipc::IpcHandler;
use bridge_registry::{SessionPatch, SessionRegistry};
use rmcp::model::LoggingLevel;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Notifies the session registry whenever the client core invalidates a
/// cache kind, recording the spec's per-kind `listChangedAt` timestamp.
/// Runs on a detached task since `NotificationSink::on_list_changed` is a
/// synchronous callback invoked from inside `rmcp`'s notification handler,
/// and the registry write takes a blocking file lock (spec §9 "suspension
/// points"; a detached task keeps that off the MCP event loop).
pub struct RegistryNotificationSink {
    registry: Arc<SessionRegistry>,
    name: String,
}

impl RegistryNotificationSink {
    pub fn new(registry: Arc<SessionRegistry>, name: String) -> Self {
        Self { registry, name }
    }
}

impl NotificationSink for RegistryNotificationSink {
    fn on_list_changed(&self, kind: CacheKind) {
        let registry = self.registry.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let patch = match kind {
                CacheKind::Tools => SessionPatch {
                    tools_list_changed_at: Some(()),
                    ..Default::default()
                },
                CacheKind::Resources | CacheKind::ResourceTemplates => SessionPatch {
                    resources_list_changed_at: Some(()),
                    ..Default::default()
                },
                CacheKind::Prompts => SessionPatch {
                    prompts_list_changed_at: Some(()),
                    ..Default::default()
                },
            };
            let result = tokio::task::spawn_blocking(move || registry.update(&name, patch)).await;
            if let Err(err) = result.unwrap_or_else(|join_err| Err(bridge_registry::RegistryError::Io {
                path: "<spawn_blocking join>".to_string(),
                source: std::io::Error::other(join_err.to_string()),
            })) {
                tracing::warn!(error = %err, "failed to record list_changed timestamp");
            }
        });
    }
}

/// Shared context every IPC connection's task dispatches through. Cloneable
/// and cheap: everything inside is an `Arc`.
#[derive(Clone)]
pub struct BridgeRequestHandler {
    pub client: Arc<McpClient>,
    pub state: StateCell,
    pub shutdown: CancellationToken,
    pub registry: Arc<SessionRegistry>,
    pub name: String,
}

impl IpcHandler for BridgeRequestHandler {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        match method {
            "shutdown" => {
                self.state.set(BridgeState::Draining);
                self.shutdown.cancel();
                return Ok(Value::Null);
            }
            "restart" => {
                // A restart is requested by closing this bridge; the Bridge
                // Manager (spec §4.8) observes the dead process on its next
                // `ensureBridgeHealthy` and spawns a fresh one.
                self.state.set(BridgeState::Draining);
                self.shutdown.cancel();
                return Ok(Value::Null);
            }
            "getServerCapabilities" => {
                return Ok(serde_json::to_value(self.client.server_capabilities()).unwrap_or(Value::Null));
            }
            "getServerVersion" => {
                return Ok(serde_json::to_value(self.client.server_version()).unwrap_or(Value::Null));
            }
            "getInstructions" => {
                return Ok(serde_json::json!({ "instructions": self.client.instructions() }));
            }
            "getProtocolVersion" => {
                return Ok(serde_json::json!({ "protocolVersion": self.client.protocol_version() }));
            }
            _ => {}
        }

        if !self.state.is_accepting_calls() {
            return Err(BridgeError::new(
                ErrorKind::ClientError,
                "bridge is not ready to serve MCP requests (state transitioning)",
            ));
        }

        self.state.call_started();
        let result = self.dispatch_mcp(method, params.unwrap_or(Value::Null)).await;
        self.state.call_finished();

        if let Err(err) = &result
            && err.kind == ErrorKind::SessionExpired
        {
            self.mark_expired();
        }
        result
    }
}

impl BridgeRequestHandler {
    /// The upstream server discarded the session with no automatic recovery
    /// available (spec §4.7 `ready -> expired`): stop accepting further MCP
    /// calls and record `status: expired` so `mcp-bridge` reports it and a
    /// later `restart` CLI invocation knows to spawn a fresh bridge.
    fn mark_expired(&self) {
        self.state.set(BridgeState::Expired);
        let registry = self.registry.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let patch = SessionPatch {
                status: Some(bridge_common::SessionStatus::Expired),
                ..Default::default()
            };
            if let Err(err) = tokio::task::spawn_blocking(move || registry.update(&name, patch))
                .await
                .unwrap_or_else(|join_err| {
                    Err(bridge_registry::RegistryError::Io {
                        path: "<spawn_blocking join>".to_string(),
                        source: std::io::Error::other(join_err.to_string()),
                    })
                })
            {
                tracing::warn!(error = %err, "failed to record session expiry");
            }
        });
    }

    async fn dispatch_mcp(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let client = &self.client;
        let result = match method {
            "ping" => client.ping().await.map(|_| Value::Null),
            "listTools" => client.list_tools_cached().await,
            "listResources" => client.list_resources_cached().await,
            "listResourceTemplates" => client.list_resource_templates_cached().await,
            "listPrompts" => client.list_prompts_cached().await,
            "callTool" => {
                let (name, arguments) = tool_args(&params)?;
                client.call_tool(name, arguments).await.and_then(|r| Ok(serde_json::to_value(r)?))
            }
            "readResource" => {
                let uri = uri_arg(&params)?;
                client.read_resource(uri).await.and_then(|r| Ok(serde_json::to_value(r)?))
            }
            "subscribeResource" => {
                let uri = uri_arg(&params)?;
                client.subscribe_resource(uri).await.map(|_| Value::Null)
            }
            "unsubscribeResource" => {
                let uri = uri_arg(&params)?;
                client.unsubscribe_resource(uri).await.map(|_| Value::Null)
            }
            "getPrompt" => {
                let (name, arguments) = tool_args(&params)?;
                client.get_prompt(name, arguments).await.and_then(|r| Ok(serde_json::to_value(r)?))
            }
            "setLoggingLevel" => {
                let level: LoggingLevel = serde_json::from_value(params.get("level").cloned().unwrap_or(Value::Null))
                    .map_err(|e| bridge_core::CoreError::Json(e))?;
                client.set_logging_level(level).await.map(|_| Value::Null)
            }
            other => return Err(BridgeError::client(format!("unknown IPC method: {other}"))),
        };
        result.map_err(BridgeError::from).map_err(|err| self.reclassify_session_expired(err))
    }

    /// `rmcp::ServiceError` loses the transport's `SessionExpired` variant on
    /// the way out of a failed call, so a 404 session-expiry surfaces here as
    /// a generic network error. The transport records the real cause out of
    /// band; reclassify using it before the caller sees the error.
    fn reclassify_session_expired(&self, err: BridgeError) -> BridgeError {
        let expired = self.client.take_session_expired();
        if expired && err.kind != ErrorKind::SessionExpired {
            return BridgeError::session_expired(err.message);
        }
        err
    }
}

fn uri_arg(params: &Value) -> Result<String, BridgeError> {
    params
        .get("uri")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BridgeError::client("missing required param 'uri'"))
}

fn tool_args(params: &Value) -> Result<(String, Option<serde_json::Map<String, Value>>), BridgeError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BridgeError::client("missing required param 'name'"))?;
    let arguments = params.get("arguments").and_then(Value::as_object).cloned();
    Ok((name, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_args_extracts_name_and_arguments() {
        let params = serde_json::json!({"name": "echo", "arguments": {"message": "hi"}});
        let (name, arguments) = tool_args(&params).unwrap();
        assert_eq!(name, "echo");
        assert_eq!(arguments.unwrap().get("message").unwrap(), "hi");
    }

    #[test]
    fn uri_arg_errors_when_missing() {
        let err = uri_arg(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, bridge_common::ErrorKind::ClientError);
    }
}
