//! The bridge-side IPC acceptor (spec §4.7 step 4-5): binds the
//! session's Unix-domain socket with mode 0600, then serves one task per
//! connected caller. IPC reads are concurrent across connections; only the
//! MCP-side effects a handler triggers are serialized, and that
//! serialization is the handler's concern, not this module's (spec §5).

use crate::error::IpcError;
use crate::protocol::{IpcRequest, IpcResponse};
use bridge_common::BridgeError;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dispatches one IPC method call to whatever the bridge daemon's state
/// machine wants to do with it. Implemented by the bridge daemon; this
/// crate only knows how to frame requests and responses.
pub trait IpcHandler: Send + Sync + 'static {
    fn handle(&self, method: &str, params: Option<Value>) -> impl Future<Output = Result<Value, BridgeError>> + Send;
}

/// Binds `socket_path` and serves IPC connections until `shutdown` fires.
/// Fails immediately if another process already holds the socket (spec §4.7
/// step 1 "refuses to start if another bridge is bound").
pub async fn serve_unix_socket<H: IpcHandler>(
    socket_path: &Path,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<(), IpcError> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    set_owner_only_mode(socket_path)?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(socket = %socket_path.display(), "ipc acceptor shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, handler).await {
                        warn!("ipc connection ended with error: {err}");
                    }
                });
            }
        }
    }
}

async fn serve_connection<H: IpcHandler>(stream: UnixStream, handler: Arc<H>) -> Result<(), IpcError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!("dropping malformed ipc request: {err}");
                continue;
            }
        };

        let response = match handler.handle(&request.method, request.params).await {
            Ok(result) => IpcResponse::ok(request.id, result),
            Err(err) => IpcResponse::err(request.id, &err),
        };

        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        write_half.write_all(line.as_bytes()).await?;
    }

    Ok(())
}

#[cfg(unix)]
fn set_owner_only_mode(path: &Path) -> Result<(), IpcError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_mode(_path: &Path) -> Result<(), IpcError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::io::AsyncBufReadExt as _;

    struct EchoHandler {
        calls: AtomicU64,
    }

    impl IpcHandler for EchoHandler {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if method == "fail" {
                return Err(BridgeError::client("requested failure"));
            }
            Ok(serde_json::json!({"method": method, "params": params}))
        }
    }

    #[tokio::test]
    async fn round_trips_a_request_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bridge.sock");
        let handler = Arc::new(EchoHandler { calls: AtomicU64::new(0) });
        let shutdown = CancellationToken::new();

        let server_shutdown = shutdown.clone();
        let server_path = socket_path.clone();
        let server_handler = handler.clone();
        let server = tokio::spawn(async move {
            serve_unix_socket(&server_path, server_handler, server_shutdown).await.unwrap();
        });

        // Give the acceptor a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let request = IpcRequest { id: 1, method: "ping".to_string(), params: None };
        let mut line = serde_json::to_string(&request).unwrap();
        line.push('\n');
        stream.write_all(line.as_bytes()).await.unwrap();

        let (read_half, _write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let response_line = lines.next_line().await.unwrap().unwrap();
        let response: IpcResponse = serde_json::from_str(&response_line).unwrap();

        assert_eq!(response.id, 1);
        assert!(response.error.is_none());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        server.await.unwrap();
    }
}
