//! # Bridge Transport
//!
//! The MCP Transport layer (spec §4.3): the two wire-level ways a Bridge
//! Daemon talks to an upstream MCP server.
//!
//! - [`http`] implements the HTTP+SSE transport (spec §4.3.1) by hand: POST
//!   each outbound message, drain a background SSE listener for inbound
//!   messages and async responses, track `Mcp-Session-Id`/protocol version,
//!   resume with `Last-Event-ID` after a reconnect, and detect upstream
//!   session expiry.
//! - [`stdio`] builds the stdio transport (spec §4.3.2) on top of rmcp's own
//!   `TokioChildProcess`, which already implements `Transport<RoleClient>`
//!   for a child process's stdin/stdout — there is no wire format of our own
//!   to hand-roll here, only process setup (merged environment, captured
//!   stderr) around the SDK's transport.
//!
//! [`sse`] holds the SSE parsing state machine and the small URL/response
//! helpers both transports (well, today just `http`) depend on.

pub mod error;
pub mod http;
pub mod sse;
pub mod stdio;

pub use error::TransportError;
pub use http::{AuthMode, HttpTransport, HttpTransportConfig, SessionIdHandle, resolve_bearer};
pub use stdio::spawn_stdio_transport;
