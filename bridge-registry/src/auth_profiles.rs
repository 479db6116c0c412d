//! The auth-profile registry: `{profiles: {serverUrl: {name: profile}}}` (spec §4.1, §6).

use crate::error::RegistryError;
use crate::home::HomeProvider;
use crate::lock::FileLock;
use bridge_common::constants::{AUTH_PROFILES_FILE, DEFAULT_LOCK_TIMEOUT_MS};
use bridge_common::AuthProfileRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: HashMap<String, HashMap<String, AuthProfileRecord>>,
}

pub struct AuthProfileRegistry {
    home: Box<dyn HomeProvider>,
    lock_timeout: Duration,
}

impl AuthProfileRegistry {
    pub fn new(home: impl HomeProvider + 'static) -> Self {
        Self {
            home: Box::new(home),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    fn path(&self) -> PathBuf {
        self.home.home_dir().join(AUTH_PROFILES_FILE)
    }

    pub fn get(&self, server_url: &str, name: &str) -> Result<Option<AuthProfileRecord>, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let file = read_file(&path)?;
        Ok(file.profiles.get(server_url).and_then(|m| m.get(name)).cloned())
    }

    pub fn list_for_server(&self, server_url: &str) -> Result<Vec<AuthProfileRecord>, RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let file = read_file(&path)?;
        Ok(file
            .profiles
            .get(server_url)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn save(&self, record: AuthProfileRecord) -> Result<(), RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        file.profiles
            .entry(record.server_url.clone())
            .or_default()
            .insert(record.name.clone(), record);
        write_file(&path, &file)
    }

    pub fn delete(&self, server_url: &str, name: &str) -> Result<(), RegistryError> {
        let path = self.path();
        let _lock = FileLock::acquire(&path, self.lock_timeout)?;
        let mut file = read_file(&path)?;
        if let Some(profiles) = file.profiles.get_mut(server_url) {
            profiles.remove(name);
            if profiles.is_empty() {
                file.profiles.remove(server_url);
            }
        }
        write_file(&path, &file)
    }
}

fn read_file(path: &Path) -> Result<ProfilesFile, RegistryError> {
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }
    let mut contents = String::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if contents.trim().is_empty() {
        return Ok(ProfilesFile::default());
    }
    match serde_json::from_str(&contents) {
        Ok(file) => Ok(file),
        Err(source) => {
            tracing::warn!(path = %path.display(), error = %source, "malformed auth profile file, treating as empty");
            Ok(ProfilesFile::default())
        }
    }
}

fn write_file(path: &Path, file: &ProfilesFile) -> Result<(), RegistryError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| RegistryError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let tmp_path = dir.join(format!(".{}.auth.tmp", std::process::id()));
    let json = serde_json::to_string_pretty(file).expect("ProfilesFile always serializes");

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
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|source| RegistryError::Io {
                    path: tmp_path.display().to_string(),
                    source,
                })?;
        }
    }

    std::fs::rename(&tmp_path, path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home::FixedHomeProvider;
    use bridge_common::AuthType;

    fn registry() -> (tempfile::TempDir, AuthProfileRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = AuthProfileRegistry::new(FixedHomeProvider(dir.path().to_path_buf()));
        (dir, registry)
    }

    fn profile(name: &str, server_url: &str) -> AuthProfileRecord {
        AuthProfileRecord {
            name: name.to_string(),
            server_url: server_url.to_string(),
            auth_type: AuthType::Oauth,
            oauth_issuer: None,
            scopes: vec![],
            expires_at: None,
            authenticated_at: None,
        }
    }

    #[test]
    fn profiles_are_keyed_by_server_then_name() {
        let (_dir, registry) = registry();
        registry.save(profile("work", "https://mcp.example.com")).unwrap();
        registry.save(profile("personal", "https://mcp.example.com")).unwrap();

        let profiles = registry.list_for_server("https://mcp.example.com").unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(registry.get("https://mcp.example.com", "work").unwrap().is_some());
    }

    #[test]
    fn deleting_last_profile_removes_server_entry() {
        let (_dir, registry) = registry();
        registry.save(profile("work", "https://mcp.example.com")).unwrap();
        registry.delete("https://mcp.example.com", "work").unwrap();
        assert!(registry.list_for_server("https://mcp.example.com").unwrap().is_empty());
    }
}
