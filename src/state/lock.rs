//! Exclusive run lock.
//!
//! The lock serializes runs: only the holder may advance station branches.
//! It is deliberately separate from the run PID file - the lock prevents
//! concurrent engines, the PID file lets a successor identify and kill its
//! predecessor. Acquisition is non-blocking; a held lock is a normal outcome
//! the driver handles by exiting cleanly.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;
use thiserror::Error;

use super::line_dir;

const LOCK_FILE: &str = "run.lock";

/// Errors acquiring the run lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run already holds the lock.
    #[error("another run already holds the lock")]
    Held,

    /// Creating or opening the lock file failed.
    #[error("lock file error: {0}")]
    Io(#[from] io::Error),
}

/// An acquired exclusive run lock. Released on drop (or process exit).
pub struct RunLock {
    file: File,
}

impl RunLock {
    /// Attempt a non-blocking exclusive acquisition.
    pub fn acquire(repo: &Path) -> Result<RunLock, LockError> {
        let dir = line_dir(repo);
        fs::create_dir_all(&dir)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(LOCK_FILE))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(RunLock { file }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Err(LockError::Held),
            Err(err) => Err(LockError::Io(err)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_the_lock_file() {
        let repo = TempDir::new().unwrap();
        let _lock = RunLock::acquire(repo.path()).unwrap();
        assert!(repo.path().join(".line/run.lock").exists());
    }

    #[test]
    fn second_acquisition_reports_held() {
        let repo = TempDir::new().unwrap();
        let _lock = RunLock::acquire(repo.path()).unwrap();

        match RunLock::acquire(repo.path()) {
            Err(LockError::Held) => {}
            other => panic!("expected Held, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn dropping_the_lock_releases_it() {
        let repo = TempDir::new().unwrap();
        {
            let _lock = RunLock::acquire(repo.path()).unwrap();
        }
        let _relocked = RunLock::acquire(repo.path()).unwrap();
    }
}
