//! The Bridge Manager (spec §4.8): lives in the CLI process, discovers and
//! spawns bridges, probes liveness, and performs crash/staleness
//! consolidation on every `mcp-bridge` invocation.

use crate::error::{ManagerError, Result};
use crate::spawn::{default_daemon_binary, spawn_daemon};
use bridge_common::constants::{
    BRIDGES_DIR, BRIDGE_LOGS_DIR, BRIDGE_PING_TIMEOUT_MS, BRIDGE_SPAWN_READY_TIMEOUT_MS, STOP_GRACE_SIGKILL_MS,
    STOP_GRACE_SIGTERM_MS,
};
use bridge_common::{SessionRecord, SessionStatus};
use bridge_registry::{ConsolidateReport, FixedHomeProvider, SessionRegistry};
use bridge_secrets::{SecretStore, SecretStoreExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, Signal, System};
use tracing::{info, warn};

pub struct BridgeManager {
    registry: Arc<SessionRegistry>,
    secrets: Arc<dyn SecretStore>,
    home: PathBuf,
    daemon_binary: PathBuf,
}

impl BridgeManager {
    pub fn new(home: PathBuf, secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_daemon_binary(home, secrets, default_daemon_binary())
    }

    pub fn with_daemon_binary(home: PathBuf, secrets: Arc<dyn SecretStore>, daemon_binary: PathBuf) -> Self {
        let registry = Arc::new(SessionRegistry::new(FixedHomeProvider(home.clone())));
        Self {
            registry,
            secrets,
            home,
            daemon_binary,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// `ensureBridgeHealthy(name)` (spec §4.8): returns a session record with
    /// a live, responsive bridge behind it, spawning one if necessary.
    pub async fn ensure_bridge_healthy(&self, name: &str) -> Result<SessionRecord> {
        let record = self
            .registry
            .get(name)?
            .ok_or_else(|| ManagerError::NoSuchSession(name.to_string()))?;

        if record.pid.is_some() && self.ping(&record).await {
            return Ok(record);
        }

        if record.status == SessionStatus::Expired {
            return Err(ManagerError::SessionExpired(name.to_string()));
        }

        self.spawn_and_wait(name).await
    }

    /// Lightweight `ping` IPC probe with the spec's 500ms liveness budget.
    async fn ping(&self, record: &SessionRecord) -> bool {
        let socket_path = PathBuf::from(&record.socket_path);
        bridge_ipc::call_with_timeout(&socket_path, "ping", None, Duration::from_millis(BRIDGE_PING_TIMEOUT_MS))
            .await
            .is_ok()
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.home.join(BRIDGES_DIR).join(BRIDGE_LOGS_DIR).join(format!("{name}.log"))
    }

    async fn spawn_and_wait(&self, name: &str) -> Result<SessionRecord> {
        info!(session = %name, "spawning bridge daemon");
        spawn_daemon(&self.daemon_binary, name, &self.home, &self.log_path(name)).await?;

        let deadline = tokio::time::Instant::now() + Duration::from_millis(BRIDGE_SPAWN_READY_TIMEOUT_MS);
        loop {
            if let Some(record) = self.registry.get(name)?
                && record.pid.is_some()
                && self.ping(&record).await
            {
                return Ok(record);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ManagerError::SpawnTimedOut(name.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// `stopBridge(name)` (spec §4.8): IPC `shutdown`, escalating to
    /// SIGTERM then SIGKILL if the bridge doesn't acknowledge or exit in
    /// time. A no-op on an already-stopped session (spec §8 idempotence).
    pub async fn stop_bridge(&self, name: &str) -> Result<()> {
        let Some(record) = self.registry.get(name)? else {
            return Ok(());
        };
        let Some(pid) = record.pid else {
            return Ok(());
        };
        let socket_path = PathBuf::from(&record.socket_path);

        let acked = bridge_ipc::call_with_timeout(&socket_path, "shutdown", None, Duration::from_millis(STOP_GRACE_SIGTERM_MS))
            .await
            .is_ok();

        if !acked {
            warn!(session = %name, pid, "bridge did not acknowledge shutdown, sending SIGTERM");
            send_signal(pid, Signal::Term);
        }

        if !wait_until_dead(pid, Duration::from_millis(STOP_GRACE_SIGKILL_MS)).await {
            warn!(session = %name, pid, "bridge still alive after grace period, sending SIGKILL");
            send_signal(pid, Signal::Kill);
            wait_until_dead(pid, Duration::from_millis(STOP_GRACE_SIGKILL_MS)).await;
        }

        if socket_path.exists() {
            let _ = std::fs::remove_file(&socket_path);
        }
        Ok(())
    }

    /// Runs `consolidate()` (spec §4.1) plus the socket-file and
    /// Secret-Store cleanup step 2 leaves to the caller since the registry
    /// crate alone doesn't know about either. Called on every CLI
    /// invocation before it does anything else.
    pub fn consolidate(&self, clean_expired: bool) -> Result<ConsolidateReport> {
        let expired_before = if clean_expired {
            self.registry
                .load()?
                .into_iter()
                .filter(|record| record.status == SessionStatus::Expired)
                .collect()
        } else {
            Vec::new()
        };

        let report = self.registry.consolidate(clean_expired)?;

        for record in expired_before {
            let socket_path = PathBuf::from(&record.socket_path);
            if socket_path.exists() {
                let _ = std::fs::remove_file(&socket_path);
            }
            if let Err(err) = self.secrets.delete_session_secrets(&record.name) {
                warn!(session = %record.name, error = %err, "failed to delete secrets during consolidation");
            }
        }

        Ok(report)
    }
}

fn send_signal(pid: u32, signal: Signal) {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    if let Some(process) = system.process(Pid::from_u32(pid)) {
        let _ = process.kill_with(signal);
    }
}

fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system.process(Pid::from_u32(pid)).is_some()
}

async fn wait_until_dead(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_common::TransportDescriptor;
    use bridge_secrets::MemorySecretStore;

    fn manager() -> (tempfile::TempDir, BridgeManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = BridgeManager::with_daemon_binary(
            dir.path().to_path_buf(),
            Arc::new(MemorySecretStore::new()),
            PathBuf::from("mcp-bridge-daemon-does-not-exist"),
        );
        (dir, manager)
    }

    fn stdio_record(name: &str, socket_path: &Path) -> SessionRecord {
        SessionRecord::new(
            name,
            TransportDescriptor::Stdio {
                command: "true".into(),
                args: vec![],
                env: Default::default(),
            },
            socket_path.display().to_string(),
        )
    }

    #[tokio::test]
    async fn ensure_bridge_healthy_errors_on_unknown_session() {
        let (_dir, manager) = manager();
        let err = manager.ensure_bridge_healthy("nope").await.unwrap_err();
        assert!(matches!(err, ManagerError::NoSuchSession(_)));
    }

    #[tokio::test]
    async fn ensure_bridge_healthy_refuses_to_respawn_an_expired_session() {
        let (dir, manager) = manager();
        let mut record = stdio_record("s1", &dir.path().join("s1.sock"));
        record.status = SessionStatus::Expired;
        manager.registry().save(record).unwrap();

        let err = manager.ensure_bridge_healthy("s1").await.unwrap_err();
        assert!(matches!(err, ManagerError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn ensure_bridge_healthy_returns_immediately_when_bridge_answers_ping() {
        let (dir, manager) = manager();
        let socket_path = dir.path().join("s1.sock");
        let mut record = stdio_record("s1", &socket_path);
        record.pid = Some(std::process::id());
        record.status = SessionStatus::Live;
        manager.registry().save(record).unwrap();

        struct Pong;
        impl bridge_ipc::IpcHandler for Pong {
            async fn handle(&self, _method: &str, _params: Option<serde_json::Value>) -> std::result::Result<serde_json::Value, bridge_common::BridgeError> {
                Ok(serde_json::Value::Null)
            }
        }
        let shutdown = tokio_util::sync::CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_socket = socket_path.clone();
        let server = tokio::spawn(async move {
            bridge_ipc::serve_unix_socket(&server_socket, Arc::new(Pong), server_shutdown).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let record = manager.ensure_bridge_healthy("s1").await.unwrap();
        assert_eq!(record.name, "s1");

        shutdown.cancel();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stop_bridge_is_idempotent_on_an_already_stopped_session() {
        let (_dir, manager) = manager();
        manager.stop_bridge("never-existed").await.unwrap();
    }

    #[test]
    fn consolidate_removes_expired_sessions_socket_and_secrets() {
        let (dir, manager) = manager();
        let socket_path = dir.path().join("bridges").join("s1.sock");
        std::fs::create_dir_all(socket_path.parent().unwrap()).unwrap();
        std::fs::write(&socket_path, b"").unwrap();

        let mut record = stdio_record("s1", &socket_path);
        record.status = SessionStatus::Expired;
        manager.registry().save(record).unwrap();
        manager.secrets.set_proxy_bearer("s1", "secret-token").unwrap();

        let report = manager.consolidate(true).unwrap();
        assert_eq!(report.expired_removed, 1);
        assert!(!socket_path.exists());
        assert!(manager.secrets.get_proxy_bearer("s1").unwrap().is_none());
    }
}
