//! # Bridge IPC
//!
//! The wire format and both endpoints of the Bridge Daemon IPC channel
//! (spec §4.7, §4.10): a Unix-domain socket carrying line-delimited JSON
//! requests and responses between `mcp-bridge` and the long-running bridge
//! process backing a session.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{call, call_with_timeout};
pub use error::IpcError;
pub use protocol::{IpcErrorBody, IpcRequest, IpcResponse};
pub use server::{serve_unix_socket, IpcHandler};
