use bridge_common::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL parsing failed: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("upstream server rejected the session: {0}")]
    SessionExpired(String),
    #[error("transport closed")]
    Closed,
    #[error("{0}")]
    Custom(String),
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match &err {
            TransportError::SessionExpired(msg) => BridgeError::session_expired(msg.clone()),
            TransportError::Auth(msg) => BridgeError::auth(msg.clone()),
            TransportError::HttpRequest(_) | TransportError::Io(_) => BridgeError::network(err.to_string()),
            TransportError::Json(_) | TransportError::UrlParse(_) | TransportError::Closed | TransportError::Custom(_) => {
                BridgeError::client(err.to_string())
            }
        }
    }
}
