//! Stdio MCP transport (spec §4.3.2).
//!
//! There is no wire format to hand-roll here: `rmcp::transport::child_process`
//! already implements `Transport<RoleClient>` directly over a child's
//! stdin/stdout. This module is just the process-setup glue — merged
//! environment from a `TransportDescriptor::Stdio`, `kill_on_drop` so a
//! crashed bridge never leaks an orphan, and the child's stderr piped into
//! `tracing` instead of the terminal.

use crate::error::TransportError;
use rmcp::transport::child_process::TokioChildProcess;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Spawns `command` with `args`/`env` merged over the current process's
/// environment, returning the `rmcp` transport ready to hand to
/// `service::serve_client`.
///
/// Stderr lines are logged at `info` under `target: "mcp_server_stderr"` so a
/// misbehaving upstream server's diagnostics end up in the daemon's log file
/// (spec §10.1) rather than silently discarded.
pub fn spawn_stdio_transport(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<TokioChildProcess, TransportError> {
    let mut cmd = Command::new(command);
    cmd.args(args).kill_on_drop(true).stdin(Stdio::piped()).stdout(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let (transport, stderr) = TokioChildProcess::builder(cmd)
        .stderr(Stdio::piped())
        .spawn()
        .map_err(TransportError::Io)?;

    if let Some(stderr) = stderr {
        let label = command.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => info!(target: "mcp_server_stderr", server = %label, "{line}"),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(target: "mcp_server_stderr", server = %label, "failed to read stderr: {err}");
                        break;
                    }
                }
            }
        });
    }

    Ok(transport)
}
