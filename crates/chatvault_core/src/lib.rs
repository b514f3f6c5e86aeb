//! # chatvault core
//!
//! Backup and restore engine for a messenger's local data.
//!
//! This crate provides:
//! - The data model and the [`MessengerStore`] / [`MediaStore`] seams to
//!   the application's storage
//! - A versioned CSV row format with one declarative field gate table
//! - [`BackupEngine`], which serializes a selection of the data into an
//!   archive
//! - [`RestoreEngine`], which validates an archive, counts its work in a
//!   dry pass, then rebuilds the store while remapping every synthetic
//!   cross-reference to freshly assigned ids
//! - An [`OperationSupervisor`] allowing one backup and one restore at a
//!   time
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatvault_core::{
//!     BackupConfig, BackupEngine, CancelToken, InMemoryMedia, InMemoryStore, LogSink,
//!     RestoreConfig, RestoreEngine,
//! };
//! use std::path::Path;
//!
//! let store = InMemoryStore::load(Path::new("store.json")).unwrap();
//! let media = InMemoryMedia::new();
//! let report = BackupEngine::new(&store, &media, BackupConfig::new())
//!     .run(Path::new("backup.zip"), Some("secret"), CancelToken::new(), &LogSink)
//!     .unwrap();
//!
//! let mut target = InMemoryStore::new();
//! let mut target_media = InMemoryMedia::new();
//! RestoreEngine::new(&mut target, &mut target_media, RestoreConfig::default())
//!     .run(&report.path, Some("secret"), CancelToken::new(), &LogSink)
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
pub mod entities;
mod error;
pub mod layout;
mod model;
mod progress;
mod remap;
mod restore;
mod rows;
pub mod store;
mod supervisor;
mod version;

pub use backup::{BackupEngine, BackupReport};
pub use config::{BackupConfig, EntitySelection, MediaSelection, RestoreConfig};
pub use error::{CoreError, CoreResult, SkipReason};
pub use model::{
    AcquaintanceLevel, Ballot, BallotAssessment, BallotChoice, BallotChoiceType, BallotKind,
    BallotLink, BallotState, BallotTarget, BallotVote, Contact, Conversation, DistributionList,
    DistributionListMember, Group, GroupMember, Identity, LegacyAck, Message, MessageKind,
    MessageState, Nonce, NonceScope, NotificationTrigger, Reaction, RowId, UserState,
    VerificationLevel,
};
pub use progress::{
    CancelToken, CollectingSink, LogSink, NullSink, Outcome, ProgressSink, ProgressTracker,
    ProgressUpdate, GROUP_AVATAR_WEIGHT, MEDIA_WEIGHT, NONCES_PER_STEP, REACTIONS_PER_STEP,
    ROW_WEIGHT,
};
pub use remap::{RemapTable, RemapTables};
pub use restore::{read_version, RestoreEngine, RestoreReport};
pub use rows::{Column, Row, RowReader, RowWriter};
pub use store::{
    FileMediaStore, InMemoryMedia, InMemoryStore, MediaRef, MediaStore, MessengerStore,
    StoreError, StoreResult, Table,
};
pub use supervisor::{OperationKind, OperationState, OperationSupervisor};
pub use version::{
    field_present, FieldTag, FormatVersion, CURRENT_FORMAT_VERSION, FIELD_GATES,
    MIN_FORMAT_VERSION,
};
