use bridge_common::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed IPC frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request timed out")]
    Timeout,
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("{0}")]
    Remote(BridgeError),
}

impl From<IpcError> for BridgeError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::Remote(bridge_err) => bridge_err,
            IpcError::Timeout => BridgeError::network("IPC request timed out"),
            IpcError::ConnectionClosed => BridgeError::network("bridge closed the IPC connection"),
            IpcError::Io(_) | IpcError::Json(_) => BridgeError::client(err.to_string()),
        }
    }
}
