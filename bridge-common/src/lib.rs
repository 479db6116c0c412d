//! # Bridge Common
//!
//! Shared data model and error taxonomy for the MCP session-bridge CLI.
//!
//! Every other crate in this workspace depends on `bridge-common` for the
//! session/auth-profile record shapes that cross process boundaries (CLI,
//! bridge daemon, registry file) and for the `ErrorKind` taxonomy that maps
//! onto the CLI's exit codes. Nothing in here talks to the filesystem,
//! network, or keychain — those live in `bridge-registry`, `bridge-transport`,
//! and `bridge-secrets` respectively.

/// Exit-code taxonomy and the top-level error type carried across IPC.
pub mod error;
/// Session and auth-profile record shapes (the registry's data model).
pub mod session;
/// Shared constants: default TTLs, timeouts, and well-known paths.
pub mod constants;

pub use error::{BridgeError, ErrorKind};
pub use session::{
    AuthProfileRecord, AuthType, NotificationTimestamps, ProxyConfig, SessionConfig, SessionRecord,
    SessionStatus, TransportDescriptor,
};
