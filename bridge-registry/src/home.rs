//! Bridge home directory resolution.
//!
//! Mirrors the `ConfigProvider` trait pattern used for settings persistence
//! in the bouncer example: a trait so tests can point the registry at a
//! scratch directory instead of the real OS config dir.

use std::path::PathBuf;

pub trait HomeProvider: Send + Sync {
    fn home_dir(&self) -> PathBuf;
}

#[derive(Default, Clone, Copy)]
pub struct OsHomeProvider;

impl HomeProvider for OsHomeProvider {
    fn home_dir(&self) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default())
            .join("mcp-bridge")
    }
}

#[derive(Clone)]
pub struct FixedHomeProvider(pub PathBuf);

impl HomeProvider for FixedHomeProvider {
    fn home_dir(&self) -> PathBuf {
        self.0.clone()
    }
}
