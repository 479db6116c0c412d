//! # Bridge Daemon
//!
//! The long-running process backing one MCP session (spec §4.7): holds the
//! `McpClient`, serves the session's IPC socket, keeps the List Cache and
//! session registry in sync with upstream notifications, and drains
//! gracefully on `shutdown`/`restart`/session-expiry.
//!
//! One process, one session: the daemon is spawned by the Bridge Manager
//! (spec §4.8) with a session name and a bridge home directory, reads that
//! session's record from the registry, and runs until told to stop.

/// Startup orchestration and the main loop (`run`).
pub mod daemon;
/// Daemon-local error type, converting into `bridge_common::BridgeError` at
/// the IPC/exit-code boundary.
pub mod error;
/// IPC method dispatch onto the shared `McpClient`.
pub mod handler;
/// The `initializing/ready/refreshing-auth/draining/stopping/expired` state machine.
pub mod state;

pub use daemon::run;
pub use error::{DaemonError, Result};
