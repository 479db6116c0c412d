//! HTTP+SSE MCP transport (spec §4.3.1).
//!
//! Grounded on the request/response shape of `HttpMcpTransport` in the pack
//! (POST the request, buffer inbound messages through an mpsc channel fed by
//! a background SSE task, implement `rmcp::transport::Transport<RoleClient>`
//! over that channel) generalized from a single Atlassian-specific OAuth
//! flow to: configurable bearer/OAuth auth, dual POST-response handling
//! (immediate JSON or SSE), `MCP-Session-Id`/`MCP-Protocol-Version` headers,
//! `Last-Event-ID` resume, and session-expiry detection.

use crate::error::TransportError;
use crate::sse::{SseEventParser, is_session_expired_response};
use bridge_oauth::OAuthTokenManager;
use reqwest::StatusCode;
use rmcp::RoleClient;
use rmcp::service::{RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, warn};
use url::Url;

const SSE_RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const SSE_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// How the transport authenticates outbound requests.
pub enum AuthMode {
    None,
    /// A static bearer token (e.g. a pre-shared proxy token), never refreshed.
    StaticBearer(String),
    /// OAuth-backed: the transport asks the token manager for a valid access
    /// token on every request and refreshes once on 401/403.
    OAuth {
        manager: Arc<OAuthTokenManager>,
        server_url: String,
        profile: String,
    },
}

pub struct HttpTransportConfig {
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub auth: AuthMode,
    pub timeout: Duration,
}

/// Shared mutable state the background SSE task and the `send`/`receive`
/// halves of the transport all touch.
struct Shared {
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
    last_event_id: Mutex<Option<String>>,
    closed: AtomicBool,
    /// Set when a POST response matches `is_session_expired_response`. `rmcp`
    /// only carries `TransportError`'s `Display` text across its own
    /// `ServiceError`, not the variant itself, so the daemon reads this flag
    /// out of band after a failed call to reclassify it as session-expired.
    session_expired: AtomicBool,
}

pub struct HttpTransport {
    http: reqwest::Client,
    url: Url,
    headers: HashMap<String, String>,
    auth: AuthMode,
    timeout: Duration,
    shared: Arc<Shared>,
    sender: mpsc::Sender<RxJsonRpcMessage<RoleClient>>,
    receiver: Arc<Mutex<mpsc::Receiver<RxJsonRpcMessage<RoleClient>>>>,
    sse_task: tokio::task::JoinHandle<()>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        let (sender, receiver) = mpsc::channel(128);
        let shared = Arc::new(Shared {
            session_id: Mutex::new(None),
            protocol_version: Mutex::new(None),
            last_event_id: Mutex::new(None),
            closed: AtomicBool::new(false),
            session_expired: AtomicBool::new(false),
        });

        let sse_task = spawn_sse_listener(
            config.url.clone(),
            config.headers.clone(),
            clone_auth_header_source(&config.auth),
            shared.clone(),
            sender.clone(),
        );

        Self {
            http: reqwest::Client::new(),
            url: config.url,
            headers: config.headers,
            auth: config.auth,
            timeout: config.timeout,
            shared,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            sse_task,
        }
    }

    pub async fn negotiated_session_id(&self) -> Option<String> {
        self.shared.session_id.lock().await.clone()
    }

    /// A cheap, cloneable handle onto the transport's shared state, readable
    /// and (for the protocol version) writable after the transport itself
    /// has been moved into an `rmcp::service::RunningService` — the bridge
    /// core and daemon need this once they no longer own the transport
    /// directly (negotiated protocol version push-back, the graceful HTTP
    /// `DELETE` on shutdown per spec §4.7, session-expiry detection).
    pub fn session_id_handle(&self) -> SessionIdHandle {
        SessionIdHandle(self.shared.clone())
    }
}

/// See [`HttpTransport::session_id_handle`].
#[derive(Clone)]
pub struct SessionIdHandle(Arc<Shared>);

impl SessionIdHandle {
    pub async fn get(&self) -> Option<String> {
        self.0.session_id.lock().await.clone()
    }

    /// Pushes the protocol version negotiated during `initialize` into the
    /// transport's shared state, once the transport itself has already been
    /// moved into `rmcp`'s `RunningService` and can no longer be reached
    /// directly (spec §4.3.1/§6 `MCP-Protocol-Version` header).
    pub async fn set_protocol_version(&self, version: String) {
        *self.0.protocol_version.lock().await = Some(version);
    }

    /// Consumes the session-expired flag set by the last failed POST, if any.
    pub fn take_session_expired(&self) -> bool {
        self.0.session_expired.swap(false, Ordering::SeqCst)
    }
}

/// Resolves the bearer token `send`/the SSE listener attach to a request for
/// a given `AuthMode`. Also used by the bridge daemon to authenticate the
/// graceful session-release `DELETE` on shutdown (spec §4.7).
pub async fn resolve_bearer(auth: &AuthMode) -> Result<Option<String>, TransportError> {
    match auth {
        AuthMode::None => Ok(None),
        AuthMode::StaticBearer(token) => Ok(Some(token.clone())),
        AuthMode::OAuth { manager, server_url, profile } => manager
            .valid_access_token(server_url, profile)
            .await
            .map(Some)
            .map_err(|e| TransportError::Auth(e.to_string())),
    }
}

async fn force_refresh(auth: &AuthMode) -> Result<Option<String>, TransportError> {
    match auth {
        AuthMode::OAuth { manager, server_url, profile } => manager
            .refresh(server_url, profile)
            .await
            .map(Some)
            .map_err(|e| TransportError::Auth(e.to_string())),
        _ => Ok(None),
    }
}

fn clone_auth_header_source(auth: &AuthMode) -> AuthMode {
    match auth {
        AuthMode::None => AuthMode::None,
        AuthMode::StaticBearer(token) => AuthMode::StaticBearer(token.clone()),
        AuthMode::OAuth { manager, server_url, profile } => AuthMode::OAuth {
            manager: manager.clone(),
            server_url: server_url.clone(),
            profile: profile.clone(),
        },
    }
}

fn spawn_sse_listener(
    url: Url,
    headers: HashMap<String, String>,
    auth: AuthMode,
    shared: Arc<Shared>,
    sender: mpsc::Sender<RxJsonRpcMessage<RoleClient>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        let mut backoff = SSE_RECONNECT_INITIAL;

        while !shared.closed.load(Ordering::SeqCst) {
            let mut builder = http.get(url.clone()).header("Accept", "text/event-stream");
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }
            if let Some(session_id) = shared.session_id.lock().await.as_ref() {
                builder = builder.header("MCP-Session-Id", session_id);
            }
            if let Some(last_id) = shared.last_event_id.lock().await.as_ref() {
                builder = builder.header("Last-Event-ID", last_id);
            }
            let token = match &auth {
                AuthMode::None => None,
                AuthMode::StaticBearer(t) => Some(t.clone()),
                AuthMode::OAuth { manager, server_url, profile } => {
                    manager.valid_access_token(server_url, profile).await.ok()
                }
            };
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }

            let response = match builder.send().await {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    warn!(status = %resp.status(), "SSE GET rejected, retrying with backoff");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(SSE_RECONNECT_MAX);
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "SSE connection failed, retrying with backoff");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(SSE_RECONNECT_MAX);
                    continue;
                }
            };
            backoff = SSE_RECONNECT_INITIAL;

            if let Err(err) = drain_sse_stream(response, &shared, &sender).await {
                debug!(error = %err, "SSE stream ended, reconnecting");
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
}

async fn drain_sse_stream(
    response: reqwest::Response,
    shared: &Arc<Shared>,
    sender: &mpsc::Sender<RxJsonRpcMessage<RoleClient>>,
) -> Result<(), TransportError> {
    use futures::StreamExt;
    let mut parser = SseEventParser::new();
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            if let Some(event) = parser.feed_line(&line) {
                if let Some(id) = event.id {
                    *shared.last_event_id.lock().await = Some(id);
                }
                if event.data.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RxJsonRpcMessage<RoleClient>>(&event.data) {
                    Ok(message) => {
                        if sender.send(message).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, data = %event.data, "ignoring unparseable SSE event");
                    }
                }
            }
        }
    }
    Ok(())
}

impl Transport<RoleClient> for HttpTransport {
    type Error = TransportError;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleClient>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send + 'static {
        let http = self.http.clone();
        let url = self.url.clone();
        let headers = self.headers.clone();
        let shared = self.shared.clone();
        let timeout = self.timeout;
        let sender = self.sender.clone();
        let auth = clone_auth_header_source(&self.auth);

        async move {
            let token = resolve_bearer(&auth).await?;
            let response = send_post(&http, &url, &headers, &shared, timeout, &item, token.as_deref()).await?;

            if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
                let refreshed = force_refresh(&auth).await?;
                let retried = send_post(&http, &url, &headers, &shared, timeout, &item, refreshed.as_deref()).await?;
                return handle_post_response(retried, &shared, &sender).await;
            }

            handle_post_response(response, &shared, &sender).await
        }
    }

    async fn receive(&mut self) -> Option<RxJsonRpcMessage<RoleClient>> {
        self.receiver.lock().await.recv().await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.sse_task.abort();
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn send_post(
    http: &reqwest::Client,
    url: &Url,
    headers: &HashMap<String, String>,
    shared: &Arc<Shared>,
    timeout: Duration,
    body: &TxJsonRpcMessage<RoleClient>,
    bearer: Option<&str>,
) -> Result<reqwest::Response, TransportError> {
    let mut builder = http
        .post(url.clone())
        .timeout(timeout)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json, text/event-stream")
        .json(body);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(session_id) = shared.session_id.lock().await.as_ref() {
        builder = builder.header("MCP-Session-Id", session_id);
    }
    if let Some(version) = shared.protocol_version.lock().await.as_ref() {
        builder = builder.header("MCP-Protocol-Version", version);
    }
    if let Some(token) = bearer {
        builder = builder.bearer_auth(token);
    }
    Ok(builder.send().await?)
}

async fn handle_post_response(
    response: reqwest::Response,
    shared: &Arc<Shared>,
    sender: &mpsc::Sender<RxJsonRpcMessage<RoleClient>>,
) -> Result<(), TransportError> {
    if let Some(session_id) = response.headers().get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) {
        *shared.session_id.lock().await = Some(session_id.to_string());
    }

    let status = response.status();
    let content_type = response
        .headers()
        .get("Content-Type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if is_session_expired_response(status, &body) {
            shared.session_expired.store(true, Ordering::SeqCst);
            return Err(TransportError::SessionExpired(body));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Auth(body));
        }
        return Err(TransportError::Custom(format!("HTTP {status}: {body}")));
    }

    if content_type.contains("text/event-stream") {
        return drain_sse_stream(response, shared, sender).await;
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        // A bare 202/204-style acknowledgement: the real response arrives
        // later over the background SSE stream.
        return Ok(());
    }
    let message: RxJsonRpcMessage<RoleClient> = serde_json::from_str(&text)?;
    let _ = sender.send(message).await;
    Ok(())
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.sse_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_mode_none_yields_no_header_source() {
        let auth = AuthMode::None;
        match clone_auth_header_source(&auth) {
            AuthMode::None => {}
            _ => panic!("expected None variant to clone as None"),
        }
    }
}
