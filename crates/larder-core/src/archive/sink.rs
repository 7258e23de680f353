//! Durable destinations for archive files.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;

/// Where encoded archives are persisted.
pub trait ArchiveSink {
    /// Bytes of an existing archive named `name`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the archive exists but cannot be read.
    fn read_existing(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Durably store `bytes` under `name`, replacing any existing archive
    /// atomically. Returns the number of bytes written.
    ///
    /// When this returns `Ok`, the archive survives a crash.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the archive could not be fully persisted; in
    /// that case any previous archive under `name` is left untouched.
    fn persist(&self, name: &str, bytes: &[u8]) -> io::Result<u64>;
}

/// Archive sink backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsArchiveSink {
    dir: PathBuf,
}

impl FsArchiveSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path of the archive called `name`.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ArchiveSink for FsArchiveSink {
    fn read_existing(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_of(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn persist(&self, name: &str, bytes: &[u8]) -> io::Result<u64> {
        fs::create_dir_all(&self.dir)?;

        // Write beside the target so the final rename stays on one filesystem.
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(self.path_of(name)).map_err(|err| err.error)?;

        Ok(bytes.len() as u64)
    }
}
