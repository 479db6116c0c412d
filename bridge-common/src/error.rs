//! The cross-cutting error taxonomy (spec §7) and its exit-code mapping (spec §6).
//!
//! Crate-local error types (`RegistryError`, `TransportError`, `OAuthError`, ...)
//! convert into `BridgeError` at the point where they cross into an IPC
//! response or a CLI exit code; they are not replaced by it internally.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The error-kind taxonomy from spec §7, carried end to end so the CLI can
/// map it onto an exit code without re-deriving it from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed request, unknown session name, bad arguments.
    ClientError,
    /// OAuth discovery/refresh failure, missing credentials, 401/403 the bridge
    /// could not resolve by refreshing.
    AuthError,
    /// Transport-level failure: connection refused, DNS failure, timeout.
    NetworkError,
    /// The upstream server discarded the MCP session (e.g. 404 on the
    /// session's HTTP endpoint) and no automatic recovery applies.
    SessionExpired,
    /// The upstream server returned a well-formed JSON-RPC error object.
    McpError,
}

impl ErrorKind {
    /// Exit code taxonomy from spec §6: 0 success, 1 generic client error,
    /// 2 auth error, 3 network error, 4 session expired. `McpError` is
    /// reported as a generic client error at the process boundary since it
    /// is a successful round trip carrying an application-level failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::ClientError => 1,
            ErrorKind::AuthError => 2,
            ErrorKind::NetworkError => 3,
            ErrorKind::SessionExpired => 4,
            ErrorKind::McpError => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ClientError => "client_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::McpError => "mcp_error",
        };
        f.write_str(s)
    }
}

/// The error type that crosses the IPC boundary and is reported to the CLI.
///
/// Mirrors the teacher's per-crate `thiserror` enums in shape (a message plus
/// a classification) but is deliberately the single type every crate-local
/// error converts *into* at its boundary, since it is also what gets
/// serialized over the wire to `mcp-bridge`.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionExpired, message)
    }

    pub fn mcp(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::McpError, message)
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_taxonomy() {
        assert_eq!(ErrorKind::ClientError.exit_code(), 1);
        assert_eq!(ErrorKind::AuthError.exit_code(), 2);
        assert_eq!(ErrorKind::NetworkError.exit_code(), 3);
        assert_eq!(ErrorKind::SessionExpired.exit_code(), 4);
    }

    #[test]
    fn bridge_error_round_trips_through_json() {
        let err = BridgeError::auth("refresh token rejected");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: BridgeError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, ErrorKind::AuthError);
        assert_eq!(parsed.exit_code(), 2);
    }
}
