//! # Bridge Proxy
//!
//! The optional local proxy server (spec §4.9): a plain bearer-authenticated
//! JSON-RPC-over-HTTP front door onto a bridge's `McpClient`, for callers
//! that would rather speak HTTP than the Unix-domain IPC socket.

pub mod dispatch;
pub mod error;
pub mod server;

pub use dispatch::{DispatchError, dispatch};
pub use error::ProxyError;
pub use server::router;
