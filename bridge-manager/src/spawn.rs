//! Resolves and launches the `mcp-bridge-daemon` binary (spec §4.8 step 4
//! "spawn a new bridge process"). The Bridge Manager lives inside the
//! short-lived `mcp-bridge` CLI process, so it never imports `bridge-daemon`
//! directly — the daemon is always a separate OS process, found next to
//! whatever binary is currently running, mirroring the sibling-executable
//! resolution `codex-rs/arg0` uses for its own companion binaries.

use crate::error::{ManagerError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const DAEMON_BINARY_NAME: &str = "mcp-bridge-daemon";

/// The daemon binary's name with the platform's executable suffix.
fn daemon_file_name() -> String {
    if cfg!(windows) {
        format!("{DAEMON_BINARY_NAME}.exe")
    } else {
        DAEMON_BINARY_NAME.to_string()
    }
}

/// Looks for `mcp-bridge-daemon` next to the currently running executable
/// (the normal case: both binaries are installed into the same directory),
/// falling back to `$PATH` resolution via the bare name so `cargo run` and
/// out-of-tree installs still work.
pub fn default_daemon_binary() -> PathBuf {
    if let Ok(current_exe) = std::env::current_exe()
        && let Some(dir) = current_exe.parent()
    {
        let candidate = dir.join(daemon_file_name());
        if candidate.is_file() {
            return candidate;
        }
    }
    PathBuf::from(daemon_file_name())
}

/// Spawns the daemon for session `name`, detached from this process:
/// stdin is closed, stdout/stderr are redirected to the bridge's log file
/// (spec §4.8 "redirect its stdout/stderr to a log file in the bridge logs
/// dir"). The daemon is expected to outlive this CLI invocation, so the
/// `Child` handle is dropped without awaiting it; `kill_on_drop(false)`
/// ensures that drop does not send it a signal.
pub async fn spawn_daemon(binary: &Path, name: &str, home: &Path, log_path: &Path) -> Result<()> {
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let stdout_log = open_append(log_path)?;
    let stderr_log = open_append(log_path)?;

    let mut command = Command::new(binary);
    command
        .arg("--name")
        .arg(name)
        .arg("--home")
        .arg(home.as_os_str())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_log))
        .stderr(Stdio::from(stderr_log))
        .kill_on_drop(false);

    command.spawn().map_err(|source| ManagerError::Spawn {
        path: path_for_error(binary),
        source,
    })?;
    Ok(())
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

fn path_for_error(binary: &Path) -> String {
    binary.to_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", binary.as_os_str() as &OsStr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_file_name_matches_platform_convention() {
        let name = daemon_file_name();
        assert!(name.starts_with(DAEMON_BINARY_NAME));
    }

    #[tokio::test]
    async fn spawn_daemon_reports_a_missing_binary_as_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist-binary");
        let log_path = dir.path().join("logs").join("s1.log");

        let err = spawn_daemon(&missing, "s1", dir.path(), &log_path).await.unwrap_err();
        assert!(matches!(err, ManagerError::Spawn { .. }));
    }
}
