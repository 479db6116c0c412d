//! The session registry: `{sessions: {name: record}}` at `sessions.json` (spec §4.1).

use crate::error::RegistryError;
use crate::home::HomeProvider;
use crate::lock::FileLock;
use bridge_common::constants::{DEFAULT_LOCK_TIMEOUT_MS, SESSIONS_FILE};
use bridge_common::session::ListChanged;
use bridge_common::{SessionRecord, SessionStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Pid, System};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    sessions: HashMap<String, SessionRecord>,
}

/// A shallow patch applied to a session record by `update` (spec §4.1):
/// every `Some` field overwrites, `notifications` deep-merges field by field.
#[derive(Debug, Default)]
pub struct SessionPatch {
    pub mcp_session_id: Option<String>,
    pub protocol_version: Option<String>,
    pub pid: Option<Option<u32>>,
    pub status: Option<SessionStatus>,
    pub tools_list_changed_at: Option<()>,
    pub resources_list_changed_at: Option<()>,
    pub prompts_list_changed_at: Option<()>,
    pub proxy_config: Option<Option<bridge_common::ProxyConfig>>,
}

/// Outcome of a `consolidate()` sweep (spec §4.1 step 3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidateReport {
    pub crashed: usize,
    pub expired_removed: usize,
}

pub struct SessionRegistry {
    home: Box<dyn HomeProvider>,
    lock_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(home: impl HomeProvider + 'static) -> Self {
        Self {
            home: Box::new(home),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn path(&self) -> PathBuf {
        self.home.home_dir().join(SESSIONS_FILE)
    }

    /// `load`: returns every session, never erroring on malformed JSON (spec
    /// §4.1 failure semantics) — instead logs and treats the file as empty.
    pub fn load(&self) -> Result<Vec<SessionRecord>, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        Ok(read_file(&path)?.sessions.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<SessionRecord>, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        Ok(read_file(&path)?.sessions.remove(name))
    }

    pub fn save(&self, record: SessionRecord) -> Result<(), RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        file.sessions.insert(record.name.clone(), record);
        write_file(&path, &file)
    }

    pub fn update(&self, name: &str, patch: SessionPatch) -> Result<SessionRecord, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        let record = file
            .sessions
            .get_mut(name)
            .ok_or_else(|| RegistryError::NoSuchSession(name.to_string()))?;
        apply_patch(record, patch);
        record.updated_at = Utc::now();
        let updated = record.clone();
        write_file(&path, &file)?;
        Ok(updated)
    }

    pub fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        file.sessions.remove(name);
        write_file(&path, &file)
    }

    /// `consolidate(cleanExpired)`: reconciles `pid`/`status` against observed
    /// process liveness, then optionally prunes `expired` records.
    pub fn consolidate(&self, clean_expired: bool) -> Result<ConsolidateReport, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        let mut report = ConsolidateReport::default();

        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        for record in file.sessions.values_mut() {
            if let Some(pid) = record.pid
                && system.process(Pid::from_u32(pid)).is_none()
            {
                record.pid = None;
                if record.status != SessionStatus::Expired {
                    record.status = SessionStatus::Crashed;
                }
                record.updated_at = Utc::now();
                report.crashed += 1;
            }
        }

        if clean_expired {
            let expired: Vec<String> = file
                .sessions
                .iter()
                .filter(|(_, r)| r.status == SessionStatus::Expired)
                .map(|(name, _)| name.clone())
                .collect();
            for name in &expired {
                file.sessions.remove(name);
            }
            report.expired_removed = expired.len();
        }

        write_file(&path, &file)?;
        Ok(report)
    }
}

fn apply_patch(record: &mut SessionRecord, patch: SessionPatch) {
    if let Some(v) = patch.mcp_session_id {
        record.mcp_session_id = Some(v);
    }
    if let Some(v) = patch.pid {
        record.pid = v;
    }
    if let Some(v) = patch.status {
        record.status = v;
    }
    if let Some(v) = patch.protocol_version {
        record.protocol_version = Some(v);
    }
    if let Some(v) = patch.proxy_config {
        record.proxy_config = v;
    }
    let now = ListChanged {
        list_changed_at: Utc::now(),
    };
    if patch.tools_list_changed_at.is_some() {
        record.notifications.tools = Some(now.clone());
    }
    if patch.resources_list_changed_at.is_some() {
        record.notifications.resources = Some(now.clone());
    }
    if patch.prompts_list_changed_at.is_some() {
        record.notifications.prompts = Some(now);
    }
}

fn read_file(path: &Path) -> Result<RegistryFile, RegistryError> {
    if !path.exists() {
        return Ok(RegistryFile::default());
    }
    let mut contents = String::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if contents.trim().is_empty() {
        return Ok(RegistryFile::default());
    }
    match serde_json::from_str(&contents) {
        Ok(file) => Ok(file),
        Err(source) => {
            tracing::warn!(path = %path.display(), error = %source, "malformed registry file, treating as empty");
            Ok(RegistryFile::default())
        }
    }
}

fn write_file(path: &Path, file: &RegistryFile) -> Result<(), RegistryError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(".{}.tmp", uuid_like()));
    let json = serde_json::to_string_pretty(file).expect("RegistryFile always serializes");

    {
        let mut tmp = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| RegistryError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tmp.write_all(json.as_bytes()).map_err(|source| RegistryError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
        set_owner_only_mode(&tmp)?;
    }

    std::fs::rename(&tmp_path, path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(unix)]
fn set_owner_only_mode(file: &std::fs::File) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .map_err(|source| RegistryError::Io {
            path: "<tempfile>".to_string(),
            source,
        })
}

#[cfg(not(unix))]
fn set_owner_only_mode(_file: &std::fs::File) -> Result<(), RegistryError> {
    Ok(())
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{nanos:x}-{:?}", std::thread::current().id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home::FixedHomeProvider;
    use bridge_common::TransportDescriptor;

    fn registry() -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(FixedHomeProvider(dir.path().to_path_buf()));
        (dir, registry)
    }

    fn stdio_record(name: &str) -> SessionRecord {
        SessionRecord::new(
            name,
            TransportDescriptor::Stdio {
                command: "true".into(),
                args: vec![],
                env: Default::default(),
            },
            format!("/tmp/{name}.sock"),
        )
    }

    #[test]
    fn save_then_get_round_trips() {
        let (_dir, registry) = registry();
        registry.save(stdio_record("s1")).unwrap();
        let got = registry.get("s1").unwrap().unwrap();
        assert_eq!(got.name, "s1");
    }

    #[test]
    fn update_deep_merges_notifications() {
        let (_dir, registry) = registry();
        registry.save(stdio_record("s1")).unwrap();
        registry
            .update(
                "s1",
                SessionPatch {
                    tools_list_changed_at: Some(()),
                    ..Default::default()
                },
            )
            .unwrap();
        let got = registry.get("s1").unwrap().unwrap();
        assert!(got.notifications.tools.is_some());
        assert!(got.notifications.resources.is_none());
    }

    #[test]
    fn consolidate_marks_dead_pid_as_crashed() {
        let (_dir, registry) = registry();
        let mut record = stdio_record("s1");
        record.pid = Some(u32::MAX - 1);
        record.status = SessionStatus::Live;
        registry.save(record).unwrap();

        let report = registry.consolidate(false).unwrap();
        assert_eq!(report.crashed, 1);
        let got = registry.get("s1").unwrap().unwrap();
        assert_eq!(got.pid, None);
        assert_eq!(got.status, SessionStatus::Crashed);
    }

    #[test]
    fn consolidate_removes_expired_when_requested() {
        let (_dir, registry) = registry();
        let mut record = stdio_record("s1");
        record.status = SessionStatus::Expired;
        registry.save(record).unwrap();

        let report = registry.consolidate(true).unwrap();
        assert_eq!(report.expired_removed, 1);
        assert!(registry.get("s1").unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let (dir, registry) = registry();
        std::fs::write(dir.path().join(SESSIONS_FILE), "{not json").unwrap();
        let sessions = registry.load().unwrap();
        assert!(sessions.is_empty());
    }
}
