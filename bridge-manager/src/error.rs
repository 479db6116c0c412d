//! Error type for the Bridge Manager (spec §4.8).

use bridge_common::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no session named '{0}'")]
    NoSuchSession(String),

    #[error("session '{0}' has expired; run `restart`")]
    SessionExpired(String),

    #[error("timed out waiting for bridge '{0}' to announce readiness")]
    SpawnTimedOut(String),

    #[error("failed to spawn bridge daemon binary at {path}: {source}")]
    Spawn { path: String, source: std::io::Error },

    #[error(transparent)]
    Registry(#[from] bridge_registry::RegistryError),

    #[error(transparent)]
    Secrets(#[from] bridge_secrets::SecretStoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ManagerError> for BridgeError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::NoSuchSession(_) => BridgeError::client(err.to_string()),
            ManagerError::SessionExpired(_) => BridgeError::session_expired(err.to_string()),
            ManagerError::SpawnTimedOut(_) => BridgeError::network(err.to_string()),
            ManagerError::Spawn { .. } => BridgeError::network(err.to_string()),
            ManagerError::Registry(e) => e.into(),
            ManagerError::Secrets(e) => BridgeError::client(e.to_string()),
            ManagerError::Io(e) => BridgeError::network(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
