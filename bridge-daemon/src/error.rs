//! Error types for the bridge daemon binary (spec §4.7).

use bridge_common::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("no session named '{0}' in the registry")]
    NoSuchSession(String),

    #[error("another bridge already holds the socket at {0}")]
    SocketInUse(String),

    #[error(transparent)]
    Registry(#[from] bridge_registry::RegistryError),

    #[error(transparent)]
    Secrets(#[from] bridge_secrets::SecretStoreError),

    #[error(transparent)]
    OAuth(#[from] bridge_oauth::OAuthError),

    #[error(transparent)]
    Core(#[from] bridge_core::CoreError),

    #[error(transparent)]
    Transport(#[from] bridge_transport::TransportError),

    #[error(transparent)]
    Ipc(#[from] bridge_ipc::IpcError),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DaemonError> for BridgeError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::NoSuchSession(_) | DaemonError::SocketInUse(_) => BridgeError::client(err.to_string()),
            DaemonError::Registry(e) => e.into(),
            DaemonError::Secrets(e) => BridgeError::client(e.to_string()),
            DaemonError::OAuth(e) => e.into(),
            DaemonError::Core(e) => e.into(),
            DaemonError::Transport(e) => e.into(),
            DaemonError::Ipc(e) => e.into(),
            DaemonError::HandshakeFailed(msg) => BridgeError::network(msg),
            DaemonError::Io(e) => BridgeError::network(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
