//! Data directory layout and locking.
//!
//! ```text
//! <data>/
//! ├─ LOCK          # Advisory lock held while a command runs
//! ├─ store.json    # Messenger store snapshot
//! └─ media/        # Media files
//! ```

use chatvault_core::{FileMediaStore, InMemoryStore, StoreError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const STORE_FILE: &str = "store.json";
const MEDIA_DIR: &str = "media";

/// Errors opening the data directory.
#[derive(Debug, thiserror::Error)]
pub enum DataDirError {
    /// Another process holds the lock.
    #[error("data directory {0} is in use by another process")]
    Locked(PathBuf),

    /// The path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store snapshot error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A locked data directory.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates `path` and takes its lock without blocking.
    pub fn open(path: &Path) -> Result<Self, DataDirError> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(DataDirError::NotADirectory(path.to_path_buf()));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(DataDirError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Path of the store snapshot.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.path.join(STORE_FILE)
    }

    /// Loads the store snapshot, empty if none was saved yet.
    pub fn load_store(&self) -> Result<InMemoryStore, DataDirError> {
        Ok(InMemoryStore::load(&self.store_path())?)
    }

    /// Opens the media directory.
    pub fn media(&self) -> Result<FileMediaStore, DataDirError> {
        Ok(FileMediaStore::open(self.path.join(MEDIA_DIR))?)
    }
}
