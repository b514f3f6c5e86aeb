//! Error types for archive operations.

use std::io;
use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while reading or writing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The container cannot be read: wrong password, missing password or
    /// a corrupted container.
    #[error("archive unreadable: {message}")]
    Unreadable {
        /// Description of the failure.
        message: String,
    },

    /// The requested entry does not exist in the archive.
    #[error("entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// An entry with the same name was already written.
    #[error("duplicate entry: {name}")]
    DuplicateEntry {
        /// Name of the duplicated entry.
        name: String,
    },

    /// The entry name is empty, not ASCII or reserved.
    #[error("invalid entry name: {name:?}")]
    InvalidEntryName {
        /// The rejected name.
        name: String,
    },

    /// Sealing an entry failed.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },
}

impl ArchiveError {
    /// Creates an unreadable-archive error.
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::Unreadable {
            message: message.into(),
        }
    }

    /// Creates an entry-not-found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Returns true if this error means the container could not be opened
    /// or authenticated.
    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

/// Maps a zip error raised while reading to the archive taxonomy.
pub(crate) fn from_zip_read(err: zip::result::ZipError) -> ArchiveError {
    match err {
        zip::result::ZipError::Io(e) => ArchiveError::unreadable(e.to_string()),
        other => ArchiveError::unreadable(other.to_string()),
    }
}

/// Maps a zip error raised while writing.
pub(crate) fn from_zip_write(err: zip::result::ZipError) -> ArchiveError {
    match err {
        zip::result::ZipError::Io(e) => ArchiveError::Io(e),
        other => ArchiveError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
    }
}
