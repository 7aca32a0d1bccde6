use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error_handling::types::CoordinatorError;

/// Result of a run attempted under the coordinator.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// Another run held the lock; nothing was executed.
    Skipped,
}

impl<T> RunOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }
}

/// Holds the exclusive lock until dropped.
pub struct RunGuard {
    file: File,
    path: PathBuf,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!("Unable to release run lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released run lock {}", self.path.display());
        }
    }
}

/// Serializes ingestion runs across processes with an advisory file lock.
///
/// The lock is never waited for: a run that finds it held is skipped. The
/// lock is not reentrant, a nested attempt from the same process is skipped
/// as well.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    lock_path: PathBuf,
}

impl RunCoordinator {
    pub fn new<P: Into<PathBuf>>(lock_path: P) -> Self {
        Self {
            lock_path: lock_path.into(),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Takes the lock without blocking.
    pub fn try_acquire(&self) -> Result<RunGuard, CoordinatorError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;

        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired run lock {}", self.lock_path.display());
                Ok(RunGuard {
                    file,
                    path: self.lock_path.clone(),
                })
            }
            Err(e) if is_contention(&e) => Err(CoordinatorError::LockContention),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `f` while holding the lock. The lock is released on every exit
    /// path, including a panic inside `f`.
    pub async fn with_exclusive_run<F, Fut, T>(&self, f: F) -> Result<RunOutcome<T>, CoordinatorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = match self.try_acquire() {
            Ok(guard) => guard,
            Err(CoordinatorError::LockContention) => {
                info!("A run is already in progress, skipping");
                return Ok(RunOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };
        Ok(RunOutcome::Completed(f().await))
    }
}

fn is_contention(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
