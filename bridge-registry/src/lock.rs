//! Advisory whole-file locking with retry/backoff (spec §4.1, §9).
//!
//! Primary mechanism is `fs2`'s OS advisory lock (`flock` on Unix). If the
//! platform or filesystem doesn't support it the retry loop still bounds how
//! long a caller waits, which is the behavior spec §9 asks for regardless of
//! which primitive backs it.

use crate::error::RegistryError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive lock on a file, released on drop.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks (with bounded retries) until an exclusive lock on `path` is
    /// acquired, or returns `RegistryError::LockTimeout` after `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| RegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(_) => {
                    return Err(RegistryError::LockTimeout {
                        path: path.display().to_string(),
                        attempted_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn second_acquire_blocks_until_first_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let lock1 = FileLock::acquire(&path, Duration::from_secs(2)).unwrap();

        let unlocked = Arc::new(AtomicBool::new(false));
        let unlocked_writer = unlocked.clone();
        let path2 = path.clone();
        let handle = std::thread::spawn(move || {
            let _lock2 = FileLock::acquire(&path2, Duration::from_secs(2)).unwrap();
            unlocked_writer.load(Ordering::SeqCst)
        });

        std::thread::sleep(Duration::from_millis(100));
        unlocked.store(true, Ordering::SeqCst);
        drop(lock1);

        assert!(handle.join().unwrap());
    }

    #[test]
    fn times_out_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let _lock1 = FileLock::acquire(&path, Duration::from_secs(2)).unwrap();
        let err = FileLock::acquire(&path, Duration::from_millis(150)).unwrap_err();
        assert!(matches!(err, RegistryError::LockTimeout { .. }));
    }
}
