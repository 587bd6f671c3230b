//! Single-instance gate.
//!
//! Holds a non-blocking exclusive `flock` on a fixed path; a second
//! instance fails fast with a distinct message instead of fighting the
//! first one over the audio device and the library index.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Errors from acquiring the instance lock.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("failed to open lock file {0}: {1}")]
    Open(PathBuf, std::io::Error),

    #[error("another instance is already running")]
    AlreadyRunning,
}

/// An acquired instance lock.
///
/// The advisory lock is released when this is dropped (or when the process
/// exits, whichever comes first).
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Try to acquire the exclusive lock at `path`.
    pub fn acquire(path: &Path) -> Result<Self, InstanceError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| InstanceError::Open(path.to_path_buf(), e))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(InstanceError::AlreadyRunning);
        }

        tracing::debug!(target: "instance", path = %path.display(), "instance lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        tracing::debug!(target: "instance", path = %self.path.display(), "instance lock released");
    }
}
