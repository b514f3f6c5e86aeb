//! The messenger data model as seen by the backup engine.
//!
//! Live entities are identified by [`RowId`]s assigned by the storage
//! collaborator, except contacts, which are keyed by their identity string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key assigned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl RowId {
    /// Creates a row id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declares an enum with a fixed archive spelling per variant.
macro_rules! archive_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Returns the archive spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            /// Parses the archive spelling.
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// The user's own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Eight-character identity string.
    pub identity: String,
    /// Private key bytes.
    pub private_key: Vec<u8>,
    /// Public nickname.
    pub nickname: Option<String>,
}

archive_enum! {
    /// How well a contact's key has been verified.
    pub enum VerificationLevel {
        /// Key seen but not verified.
        Unverified => "UNVERIFIED",
        /// Key vouched for by the directory server.
        ServerVerified => "SERVER_VERIFIED",
        /// Key verified in person.
        FullyVerified => "FULLY_VERIFIED",
    }
}

archive_enum! {
    /// Whether a contact was added directly or only via a group.
    pub enum AcquaintanceLevel {
        /// Added by the user.
        Direct => "DIRECT",
        /// Known only as a member of a shared group.
        GroupOnly => "GROUP",
    }
}

/// A contact, keyed by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Eight-character identity string.
    pub identity: String,
    /// Public key bytes.
    pub public_key: Vec<u8>,
    /// Verification level.
    pub verification: VerificationLevel,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Public nickname.
    pub nickname: Option<String>,
    /// Hidden from the contact list.
    pub hidden: bool,
    /// Acquaintance level.
    pub acquaintance: AcquaintanceLevel,
    /// Feature capability bits.
    pub feature_mask: u64,
    /// Per-contact read receipt override.
    pub read_receipts: Option<bool>,
}

archive_enum! {
    /// The user's own membership state in a group.
    pub enum UserState {
        /// Active member.
        Member => "MEMBER",
        /// Removed by the creator.
        Kicked => "KICKED",
        /// Left voluntarily.
        Left => "LEFT",
    }
}

archive_enum! {
    /// When group messages trigger notifications.
    pub enum NotificationTrigger {
        /// Every message.
        Default => "DEFAULT",
        /// Only mentions.
        Mentioned => "MENTIONED",
        /// Never.
        Never => "NEVER",
    }
}

/// A group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Protocol-level group id (hex).
    pub api_group_id: String,
    /// Identity of the creator.
    pub creator: String,
    /// Group name.
    pub name: Option<String>,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Free-text description.
    pub description: Option<String>,
    /// Archived by the user.
    pub archived: bool,
    /// The user's own membership state.
    pub user_state: UserState,
    /// Last activity (ms since epoch).
    pub last_update: Option<u64>,
    /// Notification policy.
    pub notification_trigger: NotificationTrigger,
}

/// Membership of a contact in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// The group.
    pub group_id: RowId,
    /// The member's identity.
    pub identity: String,
}

/// A distribution list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionList {
    /// List name.
    pub name: Option<String>,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Archived by the user.
    pub archived: bool,
}

/// Membership of a contact in a distribution list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionListMember {
    /// The list.
    pub list_id: RowId,
    /// The member's identity.
    pub identity: String,
}

archive_enum! {
    /// Lifecycle of a ballot.
    pub enum BallotState {
        /// Being composed.
        Temporary => "TEMPORARY",
        /// Accepting votes.
        Open => "OPEN",
        /// Closed.
        Closed => "CLOSED",
    }
}

archive_enum! {
    /// How many choices a participant may select.
    pub enum BallotAssessment {
        /// One choice.
        SingleChoice => "SINGLE_CHOICE",
        /// Any number of choices.
        MultipleChoice => "MULTIPLE_CHOICE",
    }
}

archive_enum! {
    /// When results become visible.
    pub enum BallotKind {
        /// After closing.
        ResultOnClose => "RESULT_ON_CLOSE",
        /// While voting.
        Intermediate => "INTERMEDIATE",
    }
}

archive_enum! {
    /// Kind of ballot choices.
    pub enum BallotChoiceType {
        /// Free text.
        Text => "TEXT",
    }
}

/// A poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Protocol-level ballot id.
    pub api_ballot_id: String,
    /// Identity of the creator.
    pub creator: String,
    /// Question.
    pub name: Option<String>,
    /// Lifecycle state.
    pub state: BallotState,
    /// Selection rule.
    pub assessment: BallotAssessment,
    /// Result visibility.
    pub kind: BallotKind,
    /// Choice kind.
    pub choice_type: BallotChoiceType,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Last modification (ms since epoch).
    pub modified_at: u64,
    /// Last time the user looked at it.
    pub last_viewed_at: Option<u64>,
}

/// Where a ballot was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotTarget {
    /// A group conversation.
    Group(RowId),
    /// A one-to-one conversation.
    Contact(String),
}

/// Links a ballot to its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotLink {
    /// The ballot.
    pub ballot_id: RowId,
    /// Its conversation.
    pub target: BallotTarget,
}

/// One selectable answer of a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotChoice {
    /// The ballot.
    pub ballot_id: RowId,
    /// Protocol-level choice id.
    pub api_choice_id: u32,
    /// Answer text.
    pub name: String,
    /// Cached vote count.
    pub vote_count: u32,
    /// Display position.
    pub order: u32,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Last modification (ms since epoch).
    pub modified_at: u64,
}

/// One participant's vote on one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotVote {
    /// The ballot.
    pub ballot_id: RowId,
    /// The choice.
    pub choice_id: RowId,
    /// Voter identity.
    pub identity: String,
    /// Vote value (1 selected, 0 not selected).
    pub choice: i32,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Last modification (ms since epoch).
    pub modified_at: u64,
}

/// The container a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversation {
    /// One-to-one chat with a contact.
    Contact(String),
    /// Group chat.
    Group(RowId),
    /// Distribution list.
    DistributionList(RowId),
}

archive_enum! {
    /// Delivery state of a message.
    pub enum MessageState {
        /// Waiting to be sent.
        Pending => "PENDING",
        /// Being sent.
        Sending => "SENDING",
        /// Media upload in progress.
        Uploading => "UPLOADING",
        /// Accepted by the server.
        Sent => "SENT",
        /// Delivered to the recipient.
        Delivered => "DELIVERED",
        /// Read by the recipient.
        Read => "READ",
        /// Sending failed.
        SendFailed => "SENDFAILED",
        /// Voice message played.
        Consumed => "CONSUMED",
    }
}

impl MessageState {
    /// Returns true for states that only make sense while the app is
    /// actively sending.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Pending | Self::Sending | Self::Uploading)
    }
}

archive_enum! {
    /// Legacy acknowledge states stored in the state column before
    /// reactions existed.
    pub enum LegacyAck {
        /// Thumbs up.
        Acknowledged => "USERACK",
        /// Thumbs down.
        Declined => "USERDEC",
    }
}

impl LegacyAck {
    /// Emoji of the reaction replacing this state.
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Acknowledged => "\u{1F44D}",
            Self::Declined => "\u{1F44E}",
        }
    }
}

archive_enum! {
    /// Content type of a message.
    pub enum MessageKind {
        /// Plain text.
        Text => "TEXT",
        /// Image.
        Image => "IMAGE",
        /// Video.
        Video => "VIDEO",
        /// Voice message.
        Audio => "VOICEMESSAGE",
        /// Arbitrary file.
        File => "FILE",
        /// Location.
        Location => "LOCATION",
        /// Ballot announcement.
        Ballot => "BALLOT",
        /// Call status.
        VoipStatus => "VOIP_STATUS",
        /// Group call status.
        GroupCall => "GROUP_CALL_STATUS",
    }
}

impl MessageKind {
    /// Returns true for kinds that carry a media file.
    #[must_use]
    pub fn has_media(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio | Self::File)
    }

    /// Returns true for kinds whose media counts as "video and files" in
    /// the backup configuration.
    #[must_use]
    pub fn is_large_media(self) -> bool {
        matches!(self, Self::Video | Self::File)
    }
}

/// A message in any conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Protocol-level message id (hex).
    pub api_id: String,
    /// Sent by the user.
    pub outgoing: bool,
    /// Read by the user.
    pub read: bool,
    /// Saved (starred) by the user.
    pub saved: bool,
    /// Delivery state.
    pub state: Option<MessageState>,
    /// Content type.
    pub kind: MessageKind,
    /// Text or serialized content.
    pub body: Option<String>,
    /// Media caption.
    pub caption: Option<String>,
    /// Status message rather than user content.
    pub status_message: bool,
    /// Still queued for sending.
    pub queued: bool,
    /// Sender identity for incoming group messages.
    pub sender: Option<String>,
    /// Time the sender posted it (ms since epoch).
    pub posted_at: Option<u64>,
    /// Local creation time (ms since epoch).
    pub created_at: u64,
    /// Last modification (ms since epoch).
    pub modified_at: Option<u64>,
    /// Api id of the quoted message.
    pub quoted_api_id: Option<String>,
    /// Delivery time (ms since epoch).
    pub delivered_at: Option<u64>,
    /// Read time (ms since epoch).
    pub read_at: Option<u64>,
    /// Display tag bits (starred, pinned).
    pub display_tags: u8,
    /// Forward security mode used when sending or receiving.
    pub forward_security: u8,
    /// Last edit (ms since epoch).
    pub edited_at: Option<u64>,
    /// Deletion (ms since epoch).
    pub deleted_at: Option<u64>,
    /// Ballot announced by this message.
    pub ballot_id: Option<RowId>,
}

/// An emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The message reacted to.
    pub message_id: RowId,
    /// Identity of the reacting participant.
    pub sender: String,
    /// The emoji sequence.
    pub emoji: String,
    /// Reaction time (ms since epoch).
    pub reacted_at: u64,
}

archive_enum! {
    /// Protocol scope of a nonce.
    pub enum NonceScope {
        /// Chat server protocol.
        Csp => "CSP",
        /// Device-to-device protocol.
        D2d => "D2D",
    }
}

/// A used cryptographic nonce (stored hashed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// Protocol scope.
    pub scope: NonceScope,
    /// Hashed nonce bytes.
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_spelling_roundtrip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Video,
            MessageKind::Audio,
            MessageKind::File,
            MessageKind::Location,
            MessageKind::Ballot,
            MessageKind::VoipStatus,
            MessageKind::GroupCall,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("HOLOGRAM"), None);
    }

    #[test]
    fn legacy_ack_is_not_a_state() {
        assert_eq!(MessageState::parse("USERACK"), None);
        assert_eq!(LegacyAck::parse("USERDEC"), Some(LegacyAck::Declined));
    }

    #[test]
    fn media_kinds() {
        assert!(MessageKind::Image.has_media());
        assert!(!MessageKind::Image.is_large_media());
        assert!(MessageKind::File.is_large_media());
        assert!(!MessageKind::Location.has_media());
    }
}
