use bridge_common::{BridgeError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("timed out acquiring lock on {path} after {attempted_ms}ms")]
    LockTimeout { path: String, attempted_ms: u64 },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed registry file {path}, treating as empty: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no session named '{0}'")]
    NoSuchSession(String),

    #[error("no auth profile '{name}' for server '{server_url}'")]
    NoSuchProfile { server_url: String, name: String },
}

impl From<RegistryError> for BridgeError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::LockTimeout { .. } => {
                BridgeError::client(format!("{err} (retry shortly)"))
            }
            RegistryError::Io { .. } => BridgeError::new(ErrorKind::NetworkError, err.to_string()),
            RegistryError::Malformed { .. } => BridgeError::new(ErrorKind::ClientError, err.to_string()),
            RegistryError::NoSuchSession(_) | RegistryError::NoSuchProfile { .. } => {
                BridgeError::client(err.to_string())
            }
        }
    }
}
