use bridge_common::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] bridge_transport::TransportError),
    #[error("MCP request failed: {0}")]
    Service(#[from] rmcp::ServiceError),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to serialize list result: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CoreError> for BridgeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport(transport) => transport.into(),
            CoreError::Timeout(duration) => BridgeError::network(format!("request timed out after {duration:?}")),
            CoreError::Service(rmcp::ServiceError::McpError(data)) => BridgeError::mcp(data.to_string()),
            CoreError::Service(other) => BridgeError::network(other.to_string()),
            CoreError::Json(err) => BridgeError::client(err.to_string()),
        }
    }
}
