//! Error types for backup and restore.

use crate::store::StoreError;
use chatvault_archive::ArchiveError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that end a backup or restore run.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The archive cannot be opened: wrong password or corrupt container.
    #[error("backup archive unreadable: {message}")]
    ArchiveUnreadable {
        /// Description of the failure.
        message: String,
    },

    /// The archive was written by a newer (or unknown) format version.
    #[error("backup format version {found} is not supported (this build reads up to {supported})")]
    UnsupportedFormatVersion {
        /// Version declared by the archive.
        found: u32,
        /// Highest version this build reads.
        supported: u32,
    },

    /// The identity row is missing or broken.
    #[error("identity could not be restored: {reason}")]
    IdentityRestoreFailed {
        /// Why the identity was rejected.
        reason: String,
    },

    /// The user canceled the run.
    #[error("operation canceled")]
    Canceled,

    /// An operation of the same kind is already running.
    #[error("a {operation} is already running")]
    AlreadyRunning {
        /// The operation kind.
        operation: &'static str,
    },

    /// Archive error other than an unreadable container.
    #[error("archive error: {0}")]
    Archive(ArchiveError),

    /// Storage or media collaborator error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Row codec error.
    #[error("row codec error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive is structurally invalid.
    #[error("invalid backup: {message}")]
    InvalidBackup {
        /// Description of the problem.
        message: String,
    },

    /// The background worker stopped unexpectedly.
    #[error("worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an unreadable-archive error.
    pub fn archive_unreadable(message: impl Into<String>) -> Self {
        Self::ArchiveUnreadable {
            message: message.into(),
        }
    }

    /// Creates an identity failure.
    pub fn identity_failed(reason: impl Into<String>) -> Self {
        Self::IdentityRestoreFailed {
            reason: reason.into(),
        }
    }

    /// Creates an invalid backup error.
    pub fn invalid_backup(message: impl Into<String>) -> Self {
        Self::InvalidBackup {
            message: message.into(),
        }
    }

    /// Creates a worker failure.
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Returns true if this is a user cancellation rather than a failure.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<ArchiveError> for CoreError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Unreadable { message } => Self::ArchiveUnreadable { message },
            ArchiveError::Io(e) => Self::Io(e),
            other => Self::Archive(other),
        }
    }
}

/// Why a single row was dropped during restore.
///
/// Skips are never fatal: they are logged, counted and the restore goes on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// A required column is absent or empty.
    #[error("missing field {column}")]
    MissingField {
        /// Column name.
        column: &'static str,
    },

    /// A column value cannot be parsed.
    #[error("malformed field {column}: {value:?}")]
    MalformedField {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },

    /// An enum column carries an unknown value.
    #[error("unknown value {value:?} for {column}")]
    UnknownValue {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },

    /// A synthetic identifier does not resolve to a restored entity.
    #[error("unresolved {family} reference {uid:?}")]
    Unresolved {
        /// Identifier family.
        family: &'static str,
        /// The unresolved identifier.
        uid: String,
    },

    /// The row is redundant or contradicts restored state.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The storage collaborator refused the row.
    #[error("storage refused row: {0}")]
    Storage(String),
}

impl From<StoreError> for SkipReason {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
