//! Advisory locking for the archive directory.
//!
//! Two runs over the same retention window would race on the same partition
//! files and on the same hot-store rows. A run holds [`ArchiveLock`] for its
//! whole duration; a second run waits up to its timeout and then fails before
//! touching anything.

use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// File name of the lock inside the archive directory.
pub const LOCK_FILE_NAME: &str = ".larder.lock";

/// Advisory lock errors for the archive directory.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::ArchiveWriteFailed,
        }
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "archive lock timed out after {:?} at {}",
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "archive lock unavailable: {err}"),
        }
    }
}

impl std::error::Error for LockError {}

/// RAII guard for the exclusive archive-run lock.
#[derive(Debug)]
pub struct ArchiveLock {
    file: File,
    path: PathBuf,
}

impl ArchiveLock {
    /// Acquire the lock for `archive_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if another process holds the lock for
    /// longer than `timeout`, or [`LockError::IoError`] if the lock file cannot
    /// be opened.
    pub fn acquire(archive_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(archive_dir)?;
        let path = archive_dir.join(LOCK_FILE_NAME);

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
