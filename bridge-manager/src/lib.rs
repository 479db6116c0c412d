//! # Bridge Manager
//!
//! The CLI-process half of bridge lifecycle management (spec §4.8): discovers
//! whether a session's bridge is alive, spawns a fresh one when it isn't,
//! stops one on request, and runs the registry's crash/staleness
//! consolidation sweep (spec §4.1) that every `mcp-bridge` invocation performs
//! before doing anything else.
//!
//! This crate never holds an `McpClient` or a transport — that's
//! `bridge-daemon`'s job, running in a separate OS process. Everything here
//! talks to a bridge only through its IPC socket or its PID.

mod error;
mod manager;
mod spawn;

pub use error::{ManagerError, Result};
pub use manager::BridgeManager;
pub use spawn::default_daemon_binary;
