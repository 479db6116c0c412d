//! The IPC Request Client (spec §4.10): a caller-side, single-shot
//! connection to a running bridge's Unix socket. Every CLI command opens
//! one, sends one request, reads one response, then closes — there is no
//! persistent client-side connection pool.

use crate::error::IpcError;
use crate::protocol::{IpcRequest, IpcResponse};
use bridge_common::BridgeError;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Sends a single IPC request to the bridge listening at `socket_path` and
/// returns its result, or `Err` classified to the CLI-facing exit codes
/// (spec §6): a connection failure or unresponsive bridge surfaces as
/// `SessionExpired` so the caller knows to re-run `ensureBridgeHealthy`.
pub async fn call(socket_path: &Path, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
    call_with_timeout(socket_path, method, params, Duration::from_millis(bridge_common::constants::DEFAULT_IPC_TIMEOUT_MS)).await
}

pub async fn call_with_timeout(
    socket_path: &Path,
    method: &str,
    params: Option<Value>,
    request_timeout: Duration,
) -> Result<Value, BridgeError> {
    let outcome = timeout(request_timeout, send_request(socket_path, method, params)).await;
    match outcome {
        Ok(result) => result.map_err(BridgeError::from),
        Err(_) => Err(IpcError::Timeout.into()),
    }
}

async fn send_request(socket_path: &Path, method: &str, params: Option<Value>) -> Result<Value, IpcError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|err| IpcError::Remote(session_expired_for_connect_failure(&err)))?;

    let request = IpcRequest {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        method: method.to_string(),
        params,
    };
    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;

    let (read_half, write_half) = stream.into_split();
    drop(write_half);
    let mut lines = BufReader::new(read_half).lines();
    let response_line = lines.next_line().await?.ok_or(IpcError::ConnectionClosed)?;
    let response: IpcResponse = serde_json::from_str(&response_line)?;

    response.into_result().map_err(IpcError::Remote)
}

fn session_expired_for_connect_failure(err: &std::io::Error) -> BridgeError {
    BridgeError::session_expired(format!("bridge is not running or its socket is stale: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{serve_unix_socket, IpcHandler};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct EchoHandler;

    impl IpcHandler for EchoHandler {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
            match method {
                "fail" => Err(BridgeError::client("nope")),
                _ => Ok(serde_json::json!({"echo": method, "params": params})),
            }
        }
    }

    async fn start_server(socket_path: std::path::PathBuf) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            serve_unix_socket(&socket_path, Arc::new(EchoHandler), server_shutdown).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (shutdown, handle)
    }

    #[tokio::test]
    async fn calls_a_running_bridge_and_returns_its_result() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bridge.sock");
        let (shutdown, handle) = start_server(socket_path.clone()).await;

        let result = call(&socket_path, "listTools", None).await.unwrap();
        assert_eq!(result["echo"], "listTools");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn propagates_handler_errors() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bridge.sock");
        let (shutdown, handle) = start_server(socket_path.clone()).await;

        let err = call(&socket_path, "fail", None).await.unwrap_err();
        assert_eq!(err.kind, bridge_common::ErrorKind::ClientError);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn connecting_to_a_missing_socket_is_session_expired() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("nobody-home.sock");

        let err = call(&socket_path, "ping", None).await.unwrap_err();
        assert_eq!(err.kind, bridge_common::ErrorKind::SessionExpired);
    }
}
