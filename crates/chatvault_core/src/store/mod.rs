//! Storage collaborators.
//!
//! The engine never owns the messenger database. It talks to it through
//! [`MessengerStore`] for relational data and [`MediaStore`] for files.
//! Two reference implementations ship with the crate:
//!
//! - [`InMemoryStore`] and [`InMemoryMedia`] - for tests and snapshots
//! - [`FileMediaStore`] - media files under a directory

mod file;
mod memory;

pub use file::FileMediaStore;
pub use memory::{InMemoryMedia, InMemoryStore};

use crate::model::{
    Ballot, BallotChoice, BallotLink, BallotTarget, BallotVote, Contact, Conversation,
    DistributionList, DistributionListMember, Group, GroupMember, Identity, Message, Nonce,
    Reaction, RowId,
};
use std::fmt;
use std::io::{self, Read};
use thiserror::Error;

/// Result type for storage collaborators.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A referenced row does not exist.
    #[error("{table} row {id} not found")]
    NotFound {
        /// Table of the missing row.
        table: Table,
        /// Key of the missing row.
        id: String,
    },

    /// The row violates a uniqueness constraint.
    #[error("conflict in {table}: {message}")]
    Conflict {
        /// Table of the conflicting row.
        table: Table,
        /// Description of the conflict.
        message: String,
    },

    /// Persisted state cannot be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A media reference does not name a file inside the store.
    #[error("invalid media reference: {0}")]
    InvalidReference(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

/// Tables the restore repopulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// The user's identity.
    Identity,
    /// Contacts.
    Contacts,
    /// Groups.
    Groups,
    /// Group memberships.
    GroupMembers,
    /// Distribution lists.
    DistributionLists,
    /// Distribution list memberships.
    DistributionListMembers,
    /// Ballots.
    Ballots,
    /// Ballot to conversation links.
    BallotLinks,
    /// Ballot choices.
    BallotChoices,
    /// Ballot votes.
    BallotVotes,
    /// Messages of every conversation.
    Messages,
    /// Reactions.
    Reactions,
    /// Used nonces.
    Nonces,
}

impl Table {
    /// Every table, in dependency order.
    pub const ALL: [Table; 13] = [
        Table::Identity,
        Table::Contacts,
        Table::Groups,
        Table::GroupMembers,
        Table::DistributionLists,
        Table::DistributionListMembers,
        Table::Ballots,
        Table::BallotLinks,
        Table::BallotChoices,
        Table::BallotVotes,
        Table::Messages,
        Table::Reactions,
        Table::Nonces,
    ];

    /// Returns the table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Identity => "identity",
            Table::Contacts => "contacts",
            Table::Groups => "groups",
            Table::GroupMembers => "group_members",
            Table::DistributionLists => "distribution_lists",
            Table::DistributionListMembers => "distribution_list_members",
            Table::Ballots => "ballots",
            Table::BallotLinks => "ballot_links",
            Table::BallotChoices => "ballot_choices",
            Table::BallotVotes => "ballot_votes",
            Table::Messages => "messages",
            Table::Reactions => "reactions",
            Table::Nonces => "nonces",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The relational messenger database.
///
/// Create operations return the primary key assigned to the new row.
/// Contacts are keyed by identity, so [`create_contact`] returns whether
/// the contact was inserted.
///
/// # Invariants
///
/// - Child rows are rejected with [`StoreError::NotFound`] if their parent
///   row does not exist
/// - Readers return rows in insertion order
///
/// [`create_contact`]: MessengerStore::create_contact
pub trait MessengerStore: Send {
    /// Deletes every row of `table`.
    fn clear(&mut self, table: Table) -> StoreResult<()>;

    /// Returns the number of rows in `table`.
    fn count(&self, table: Table) -> StoreResult<u64>;

    /// Returns the user's identity, if one is set.
    fn identity(&self) -> StoreResult<Option<Identity>>;

    /// Replaces the user's identity.
    fn save_identity(&mut self, identity: &Identity) -> StoreResult<()>;

    /// Returns every contact.
    fn contacts(&self) -> StoreResult<Vec<Contact>>;

    /// Inserts a contact; returns false if the identity already exists.
    fn create_contact(&mut self, contact: &Contact) -> StoreResult<bool>;

    /// Returns every group with its key.
    fn groups(&self) -> StoreResult<Vec<(RowId, Group)>>;

    /// Inserts a group.
    fn create_group(&mut self, group: &Group) -> StoreResult<RowId>;

    /// Returns the member identities of a group.
    fn group_members(&self, group: RowId) -> StoreResult<Vec<String>>;

    /// Adds a member to a group.
    fn create_group_member(&mut self, member: &GroupMember) -> StoreResult<()>;

    /// Returns every distribution list with its key.
    fn distribution_lists(&self) -> StoreResult<Vec<(RowId, DistributionList)>>;

    /// Inserts a distribution list.
    fn create_distribution_list(&mut self, list: &DistributionList) -> StoreResult<RowId>;

    /// Returns the member identities of a distribution list.
    fn distribution_list_members(&self, list: RowId) -> StoreResult<Vec<String>>;

    /// Adds a member to a distribution list.
    fn create_distribution_list_member(
        &mut self,
        member: &DistributionListMember,
    ) -> StoreResult<()>;

    /// Returns every ballot with its key.
    fn ballots(&self) -> StoreResult<Vec<(RowId, Ballot)>>;

    /// Inserts a ballot.
    fn create_ballot(&mut self, ballot: &Ballot) -> StoreResult<RowId>;

    /// Returns the conversation a ballot was posted in.
    fn ballot_link(&self, ballot: RowId) -> StoreResult<Option<BallotTarget>>;

    /// Links a ballot to its conversation.
    fn create_ballot_link(&mut self, link: &BallotLink) -> StoreResult<()>;

    /// Returns the choices of a ballot with their keys.
    fn ballot_choices(&self, ballot: RowId) -> StoreResult<Vec<(RowId, BallotChoice)>>;

    /// Inserts a ballot choice.
    fn create_ballot_choice(&mut self, choice: &BallotChoice) -> StoreResult<RowId>;

    /// Returns the votes cast on a ballot.
    fn ballot_votes(&self, ballot: RowId) -> StoreResult<Vec<BallotVote>>;

    /// Inserts a ballot vote.
    fn create_ballot_vote(&mut self, vote: &BallotVote) -> StoreResult<()>;

    /// Returns the messages of a conversation with their keys.
    fn messages(&self, conversation: &Conversation) -> StoreResult<Vec<(RowId, Message)>>;

    /// Inserts a message into a conversation.
    fn create_message(&mut self, conversation: &Conversation, message: &Message)
        -> StoreResult<RowId>;

    /// Returns the reactions on a message.
    fn reactions(&self, message: RowId) -> StoreResult<Vec<Reaction>>;

    /// Inserts a reaction.
    fn create_reaction(&mut self, reaction: &Reaction) -> StoreResult<()>;

    /// Returns every used nonce.
    fn nonces(&self) -> StoreResult<Vec<Nonce>>;

    /// Inserts a batch of nonces.
    fn create_nonces(&mut self, nonces: &[Nonce]) -> StoreResult<()>;
}

/// A file managed by the media store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaRef {
    /// The user's own profile picture.
    OwnProfilePicture,
    /// Avatar set locally for a contact.
    ContactAvatar(String),
    /// Profile picture published by a contact.
    ContactProfilePicture(String),
    /// Group avatar.
    GroupAvatar(RowId),
    /// Media file of a message.
    MessageMedia(RowId),
    /// Thumbnail of a message.
    MessageThumbnail(RowId),
}

impl MediaRef {
    /// Returns a relative path naming this file, unique per reference.
    #[must_use]
    pub fn relative_path(&self) -> String {
        match self {
            MediaRef::OwnProfilePicture => "profile_picture".to_string(),
            MediaRef::ContactAvatar(identity) => format!("contact_avatars/{identity}"),
            MediaRef::ContactProfilePicture(identity) => {
                format!("contact_profile_pictures/{identity}")
            }
            MediaRef::GroupAvatar(id) => format!("group_avatars/{}", id.as_u64()),
            MediaRef::MessageMedia(id) => format!("message_media/{}", id.as_u64()),
            MediaRef::MessageThumbnail(id) => format!("message_thumbnails/{}", id.as_u64()),
        }
    }
}

/// Media files of the messenger.
pub trait MediaStore: Send {
    /// Stores `data` under `media`, replacing any earlier file.
    ///
    /// Returns the number of bytes written.
    fn write(&mut self, media: &MediaRef, data: &mut dyn Read) -> StoreResult<u64>;

    /// Opens the file stored under `media`.
    fn read(&self, media: &MediaRef) -> StoreResult<Option<Box<dyn Read + '_>>>;

    /// Deletes every file.
    fn delete_all(&mut self) -> StoreResult<()>;

    /// Returns true if a file is stored under `media`.
    fn contains(&self, media: &MediaRef) -> StoreResult<bool> {
        Ok(self.read(media)?.is_some())
    }

    /// Stores the media file of a message.
    fn write_media(&mut self, message: RowId, data: &mut dyn Read) -> StoreResult<u64> {
        self.write(&MediaRef::MessageMedia(message), data)
    }

    /// Stores the thumbnail of a message.
    fn write_thumbnail(&mut self, message: RowId, data: &mut dyn Read) -> StoreResult<u64> {
        self.write(&MediaRef::MessageThumbnail(message), data)
    }

    /// Opens the media file of a message.
    fn read_media(&self, message: RowId) -> StoreResult<Option<Box<dyn Read + '_>>> {
        self.read(&MediaRef::MessageMedia(message))
    }
}
