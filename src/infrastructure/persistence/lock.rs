//! Directory-level advisory lock (spec §5: "no concurrent writers across
//! processes"). A plain lock file containing the holding PID — if it already
//! exists and that PID is still alive, `acquire` fails; a stale lock left by
//! a crashed process is reclaimed.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub struct DirectoryLock {
    path: PathBuf,
}

impl DirectoryLock {
    /// Acquires the advisory lock for `dir`, creating `dir` if needed.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(".lock");

        if let Ok(existing) = std::fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if pid != std::process::id() && process_is_alive(pid) {
                    bail!(
                        "data directory {} is locked by running process {pid}",
                        dir.display()
                    );
                }
            }
        }

        std::fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn process_is_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_alive(_pid: u32) -> bool {
    // Non-Linux targets: assume the lock is live and rely on the operator
    // to clear a stale `.lock` file after an unclean shutdown.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_lock_file_and_releases_on_drop() {
        let dir = std::env::temp_dir().join(format!("solbot-lock-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let _lock = DirectoryLock::acquire(&dir).unwrap();
            assert!(dir.join(".lock").exists());
        }
        assert!(!dir.join(".lock").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn acquire_is_reentrant_for_the_same_process() {
        let dir = std::env::temp_dir().join(format!("solbot-lock-test-reentrant-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let _lock1 = DirectoryLock::acquire(&dir).unwrap();
        let _lock2 = DirectoryLock::acquire(&dir).unwrap();

        std::fs::remove_dir_all(&dir).ok();
    }
}
