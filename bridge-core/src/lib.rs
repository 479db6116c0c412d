//! # Bridge Core
//!
//! The MCP Client Core (spec §4.5): the `initialize` handshake, the
//! request/notification surface a bridge daemon drives IPC calls through,
//! and the notification dispatcher that keeps the List Cache honest.
//!
//! Rather than hand-rolling a `nextId` counter and a `id -> pending` map,
//! this wraps `rmcp::service::RunningService` — every client in the
//! reference pack (the teacher included) builds its MCP client this way, so
//! the correlator spec §4.5 describes is `rmcp`'s, not reimplemented here.

pub mod client;
pub mod error;
pub mod handler;

pub use client::{HandshakeInfo, McpClient};
pub use error::CoreError;
pub use handler::{BridgeClientHandler, NoopSink, NotificationSink};
