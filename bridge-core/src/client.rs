//! The MCP Client Core (spec §4.5): a thin wrapper around `rmcp`'s own
//! `RunningService`, since request/response correlation by JSON-RPC id is
//! already implemented there — every client in the pack builds on it rather
//! than re-deriving a correlator by hand, and the same applies here.
//!
//! Grounded on the wrapper shape of `rmcp-client::RmcpClient` (per-call
//! methods that delegate straight to the matching `RunningService` method,
//! wrapped in a timeout): `list_tools`, `list_resources`,
//! `list_resource_templates`, `read_resource`, `call_tool` mirror that file
//! almost verbatim; `subscribe`/`unsubscribe`/`list_prompts`/`get_prompt`/
//! `set_logging_level`/`ping` follow the identical one-call-per-MCP-method
//! shape by direct analogy, since `RunningService` exposes the full MCP
//! client surface the same way.

use crate::error::CoreError;
use crate::handler::{BridgeClientHandler, NotificationSink};
use bridge_cache::{CacheKind, ListCache};
use bridge_transport::{HttpTransport, SessionIdHandle};
use rmcp::RoleClient;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, Implementation,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    LoggingLevel, PaginatedRequestParam, ReadResourceRequestParam, ReadResourceResult,
    ServerCapabilities, SetLevelRequestParam,
};
use rmcp::service::RunningService;
use rmcp::{ServiceExt, model::SubscribeRequestParam, model::UnsubscribeRequestParam};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Everything negotiated during `initialize` that the bridge daemon persists
/// to the session registry (spec §4.7 step 3).
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    pub protocol_version: String,
    pub server_name: String,
    pub server_version: String,
    pub instructions: Option<String>,
}

pub struct McpClient {
    service: RunningService<RoleClient, BridgeClientHandler>,
    cache: Arc<ListCache>,
    timeout: Duration,
    /// `Some` only for HTTP-transport sessions; lets the bridge daemon read
    /// the negotiated `MCP-Session-Id` after the transport itself has been
    /// moved into `service` (spec §4.7 graceful `DELETE` on shutdown).
    http_session_id: Option<SessionIdHandle>,
}

async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T, rmcp::ServiceError>>, timeout: Duration) -> Result<T, CoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CoreError::Timeout(timeout)),
    }
}

impl McpClient {
    /// Connects over HTTP+SSE (spec §4.3.1), running the `initialize`
    /// handshake as part of `service::serve`.
    pub async fn connect_http(
        config: bridge_transport::HttpTransportConfig,
        cache: Arc<ListCache>,
        sink: Arc<dyn NotificationSink>,
        timeout: Duration,
    ) -> Result<(Self, HandshakeInfo), CoreError> {
        let transport = HttpTransport::new(config);
        let http_session_id = Some(transport.session_id_handle());
        let handler = BridgeClientHandler::new(cache.clone(), sink);
        let service = handler.serve(transport).await.map_err(CoreError::Service)?;
        let info = handshake_info(&service);
        if let Some(handle) = &http_session_id
            && !info.protocol_version.is_empty()
        {
            handle.set_protocol_version(info.protocol_version.clone()).await;
        }
        Ok((
            Self {
                service,
                cache,
                timeout,
                http_session_id,
            },
            info,
        ))
    }

    /// Connects over stdio (spec §4.3.2): spawns the configured child and
    /// hands its transport straight to `rmcp`.
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        env: &std::collections::HashMap<String, String>,
        cache: Arc<ListCache>,
        sink: Arc<dyn NotificationSink>,
        timeout: Duration,
    ) -> Result<(Self, HandshakeInfo), CoreError> {
        let transport = bridge_transport::spawn_stdio_transport(command, args, env)?;
        let handler = BridgeClientHandler::new(cache.clone(), sink);
        let service = handler.serve(transport).await.map_err(CoreError::Service)?;
        let info = handshake_info(&service);
        Ok((
            Self {
                service,
                cache,
                timeout,
                http_session_id: None,
            },
            info,
        ))
    }

    /// The negotiated `MCP-Session-Id` for an HTTP session, if any (spec §3).
    pub async fn http_mcp_session_id(&self) -> Option<String> {
        match &self.http_session_id {
            Some(handle) => handle.get().await,
            None => None,
        }
    }

    /// Consumes the HTTP transport's session-expired flag, if this is an
    /// HTTP session. `rmcp::ServiceError` does not carry the transport's
    /// `SessionExpired` variant through, so the daemon calls this after a
    /// failed MCP call to recover that classification.
    pub fn take_session_expired(&self) -> bool {
        match &self.http_session_id {
            Some(handle) => handle.take_session_expired(),
            None => false,
        }
    }

    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.service.peer_info().map(|info| info.capabilities.clone())
    }

    pub fn instructions(&self) -> Option<String> {
        self.service.peer_info().and_then(|info| info.instructions.clone())
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.service.peer_info().map(|info| info.protocol_version.to_string())
    }

    pub fn server_version(&self) -> Option<Implementation> {
        self.service.peer_info().map(|info| info.server_info.clone())
    }

    pub async fn ping(&self) -> Result<(), CoreError> {
        with_timeout(self.service.ping(), self.timeout).await
    }

    pub async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, CoreError> {
        with_timeout(self.service.list_tools(cursor.map(|cursor| PaginatedRequestParam { cursor: Some(cursor) })), self.timeout).await
    }

    pub async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesResult, CoreError> {
        with_timeout(self.service.list_resources(cursor.map(|cursor| PaginatedRequestParam { cursor: Some(cursor) })), self.timeout).await
    }

    pub async fn list_resource_templates(&self, cursor: Option<String>) -> Result<ListResourceTemplatesResult, CoreError> {
        with_timeout(
            self.service.list_resource_templates(cursor.map(|cursor| PaginatedRequestParam { cursor: Some(cursor) })),
            self.timeout,
        )
        .await
    }

    pub async fn list_prompts(&self, cursor: Option<String>) -> Result<ListPromptsResult, CoreError> {
        with_timeout(self.service.list_prompts(cursor.map(|cursor| PaginatedRequestParam { cursor: Some(cursor) })), self.timeout).await
    }

    pub async fn call_tool(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<CallToolResult, CoreError> {
        with_timeout(
            self.service.call_tool(CallToolRequestParam { name: name.into(), arguments }),
            self.timeout,
        )
        .await
    }

    pub async fn read_resource(&self, uri: String) -> Result<ReadResourceResult, CoreError> {
        with_timeout(self.service.read_resource(ReadResourceRequestParam { uri }), self.timeout).await
    }

    pub async fn subscribe_resource(&self, uri: String) -> Result<(), CoreError> {
        with_timeout(self.service.subscribe(SubscribeRequestParam { uri }), self.timeout).await
    }

    pub async fn unsubscribe_resource(&self, uri: String) -> Result<(), CoreError> {
        with_timeout(self.service.unsubscribe(UnsubscribeRequestParam { uri }), self.timeout).await
    }

    pub async fn get_prompt(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<GetPromptResult, CoreError> {
        with_timeout(self.service.get_prompt(GetPromptRequestParam { name: name.into(), arguments }), self.timeout).await
    }

    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<(), CoreError> {
        with_timeout(self.service.set_level(SetLevelRequestParam { level }), self.timeout).await
    }

    /// Fetches `tools/list`'s full aggregate, paginating through every
    /// cursor the server returns, consulting and repopulating the cache
    /// around the miss (spec §4.6, §4.7 "cache coordination").
    pub async fn list_tools_cached(&self) -> Result<Value, CoreError> {
        if let Some(cached) = self.cache.get(CacheKind::Tools) {
            return Ok(cached);
        }
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_tools(cursor).await?;
            items.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let payload = serde_json::to_value(&items)?;
        self.cache.put(CacheKind::Tools, payload.clone());
        Ok(payload)
    }

    pub async fn list_resources_cached(&self) -> Result<Value, CoreError> {
        if let Some(cached) = self.cache.get(CacheKind::Resources) {
            return Ok(cached);
        }
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_resources(cursor).await?;
            items.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let payload = serde_json::to_value(&items)?;
        self.cache.put(CacheKind::Resources, payload.clone());
        Ok(payload)
    }

    pub async fn list_resource_templates_cached(&self) -> Result<Value, CoreError> {
        if let Some(cached) = self.cache.get(CacheKind::ResourceTemplates) {
            return Ok(cached);
        }
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_resource_templates(cursor).await?;
            items.extend(page.resource_templates);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let payload = serde_json::to_value(&items)?;
        self.cache.put(CacheKind::ResourceTemplates, payload.clone());
        Ok(payload)
    }

    pub async fn list_prompts_cached(&self) -> Result<Value, CoreError> {
        if let Some(cached) = self.cache.get(CacheKind::Prompts) {
            return Ok(cached);
        }
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_prompts(cursor).await?;
            items.extend(page.prompts);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let payload = serde_json::to_value(&items)?;
        self.cache.put(CacheKind::Prompts, payload.clone());
        Ok(payload)
    }

    /// Closes the underlying transport. On an HTTP session this should be
    /// preceded by the caller issuing the graceful `DELETE` (spec §4.7); that
    /// lives in the bridge daemon, which knows the session's transport kind.
    pub async fn close(self) -> Result<(), CoreError> {
        self.service.cancel().await.map_err(CoreError::Service)
    }
}

fn handshake_info(service: &RunningService<RoleClient, BridgeClientHandler>) -> HandshakeInfo {
    let peer_info = service.peer_info();
    HandshakeInfo {
        protocol_version: peer_info.map(|info| info.protocol_version.to_string()).unwrap_or_default(),
        server_name: peer_info.map(|info| info.server_info.name.clone()).unwrap_or_default(),
        server_version: peer_info.map(|info| info.server_info.version.clone()).unwrap_or_default(),
        instructions: peer_info.and_then(|info| info.instructions.clone()),
    }
}
