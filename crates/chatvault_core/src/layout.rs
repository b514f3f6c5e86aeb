//! Entry names inside a backup archive.
//!
//! ```text
//! settings.csv                               format version (always first)
//! identity.csv, contacts.csv, groups.csv     root tables
//! distribution_lists.csv                     (v3+)
//! ballots.csv, ballot_choices.csv, ballot_votes.csv   (v4+)
//! nonces.csv                                 (v11+)
//! reactions.csv                              (v17+)
//! message_<identity-id>.csv                  one-to-one messages
//! group_message_<group-uid>.csv              group messages
//! distribution_list_message_<list-uid>.csv   list messages
//! profile_picture                            own profile picture
//! contact_avatar_<identity-id>               blobs, no extension
//! contact_profile_picture_<identity-id>
//! group_avatar_<group-uid>
//! message_media_<message-uid>
//! message_thumbnail_<message-uid>
//! ```

/// Suffix of every table entry.
pub const TABLE_SUFFIX: &str = ".csv";

/// The settings table.
pub const SETTINGS: &str = "settings.csv";
/// The identity table.
pub const IDENTITY: &str = "identity.csv";
/// The contacts table.
pub const CONTACTS: &str = "contacts.csv";
/// The groups table.
pub const GROUPS: &str = "groups.csv";
/// The distribution lists table.
pub const DISTRIBUTION_LISTS: &str = "distribution_lists.csv";
/// The ballots table.
pub const BALLOTS: &str = "ballots.csv";
/// The ballot choices table.
pub const BALLOT_CHOICES: &str = "ballot_choices.csv";
/// The ballot votes table.
pub const BALLOT_VOTES: &str = "ballot_votes.csv";
/// The nonces table.
pub const NONCES: &str = "nonces.csv";
/// The reactions table.
pub const REACTIONS: &str = "reactions.csv";
/// The own profile picture blob.
pub const PROFILE_PICTURE: &str = "profile_picture";

const CONTACT_MESSAGES: &str = "message_";
const GROUP_MESSAGES: &str = "group_message_";
const LIST_MESSAGES: &str = "distribution_list_message_";
const CONTACT_AVATAR: &str = "contact_avatar_";
const CONTACT_PROFILE_PICTURE: &str = "contact_profile_picture_";
const GROUP_AVATAR: &str = "group_avatar_";
const MESSAGE_MEDIA: &str = "message_media_";
const MESSAGE_THUMBNAIL: &str = "message_thumbnail_";

/// What an archive entry holds, with the synthetic id embedded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// `settings.csv`.
    Settings,
    /// `identity.csv`.
    Identity,
    /// `contacts.csv`.
    Contacts,
    /// `groups.csv`.
    Groups,
    /// `distribution_lists.csv`.
    DistributionLists,
    /// `ballots.csv`.
    Ballots,
    /// `ballot_choices.csv`.
    BallotChoices,
    /// `ballot_votes.csv`.
    BallotVotes,
    /// `nonces.csv`.
    Nonces,
    /// `reactions.csv`.
    Reactions,
    /// Messages with the contact of this identity id.
    ContactMessages(String),
    /// Messages of the group with this uid.
    GroupMessages(String),
    /// Messages of the distribution list with this uid.
    DistributionListMessages(String),
    /// The user's own profile picture.
    OwnProfilePicture,
    /// Avatar of the contact with this identity id.
    ContactAvatar(String),
    /// Profile picture of the contact with this identity id.
    ContactProfilePicture(String),
    /// Avatar of the group with this uid.
    GroupAvatar(String),
    /// Media of the message with this uid.
    MessageMedia(String),
    /// Thumbnail of the message with this uid.
    MessageThumbnail(String),
    /// Anything else.
    Unknown,
}

impl EntryKind {
    /// Classifies an entry by name.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        if let Some(table) = name.strip_suffix(TABLE_SUFFIX) {
            return Self::classify_table(name, table);
        }
        if name == PROFILE_PICTURE {
            return Self::OwnProfilePicture;
        }
        let blob_prefixes: [(&str, fn(String) -> Self); 5] = [
            (CONTACT_AVATAR, Self::ContactAvatar),
            (CONTACT_PROFILE_PICTURE, Self::ContactProfilePicture),
            (GROUP_AVATAR, Self::GroupAvatar),
            (MESSAGE_MEDIA, Self::MessageMedia),
            (MESSAGE_THUMBNAIL, Self::MessageThumbnail),
        ];
        for (prefix, make) in blob_prefixes {
            if let Some(uid) = name.strip_prefix(prefix).filter(|uid| !uid.is_empty()) {
                return make(uid.to_string());
            }
        }
        Self::Unknown
    }

    fn classify_table(name: &str, table: &str) -> Self {
        match name {
            SETTINGS => return Self::Settings,
            IDENTITY => return Self::Identity,
            CONTACTS => return Self::Contacts,
            GROUPS => return Self::Groups,
            DISTRIBUTION_LISTS => return Self::DistributionLists,
            BALLOTS => return Self::Ballots,
            BALLOT_CHOICES => return Self::BallotChoices,
            BALLOT_VOTES => return Self::BallotVotes,
            NONCES => return Self::Nonces,
            REACTIONS => return Self::Reactions,
            _ => {}
        }
        // Longest prefixes first: "message_" is a suffix of the other two.
        let message_prefixes: [(&str, fn(String) -> Self); 3] = [
            (LIST_MESSAGES, Self::DistributionListMessages),
            (GROUP_MESSAGES, Self::GroupMessages),
            (CONTACT_MESSAGES, Self::ContactMessages),
        ];
        for (prefix, make) in message_prefixes {
            if let Some(uid) = table.strip_prefix(prefix).filter(|uid| !uid.is_empty()) {
                return make(uid.to_string());
            }
        }
        Self::Unknown
    }

    /// Returns true for table entries.
    #[must_use]
    pub fn is_table(&self) -> bool {
        matches!(
            self,
            Self::Settings
                | Self::Identity
                | Self::Contacts
                | Self::Groups
                | Self::DistributionLists
                | Self::Ballots
                | Self::BallotChoices
                | Self::BallotVotes
                | Self::Nonces
                | Self::Reactions
                | Self::ContactMessages(_)
                | Self::GroupMessages(_)
                | Self::DistributionListMessages(_)
        )
    }
}

/// Table name for messages with a contact.
#[must_use]
pub fn contact_messages(identity_id: &str) -> String {
    format!("{CONTACT_MESSAGES}{identity_id}{TABLE_SUFFIX}")
}

/// Table name for messages of a group.
#[must_use]
pub fn group_messages(group_uid: &str) -> String {
    format!("{GROUP_MESSAGES}{group_uid}{TABLE_SUFFIX}")
}

/// Table name for messages of a distribution list.
#[must_use]
pub fn distribution_list_messages(list_uid: &str) -> String {
    format!("{LIST_MESSAGES}{list_uid}{TABLE_SUFFIX}")
}

/// Blob name for a contact avatar.
#[must_use]
pub fn contact_avatar(identity_id: &str) -> String {
    format!("{CONTACT_AVATAR}{identity_id}")
}

/// Blob name for a contact profile picture.
#[must_use]
pub fn contact_profile_picture(identity_id: &str) -> String {
    format!("{CONTACT_PROFILE_PICTURE}{identity_id}")
}

/// Blob name for a group avatar.
#[must_use]
pub fn group_avatar(group_uid: &str) -> String {
    format!("{GROUP_AVATAR}{group_uid}")
}

/// Blob name for message media.
#[must_use]
pub fn message_media(message_uid: &str) -> String {
    format!("{MESSAGE_MEDIA}{message_uid}")
}

/// Blob name for a message thumbnail.
#[must_use]
pub fn message_thumbnail(message_uid: &str) -> String {
    format!("{MESSAGE_THUMBNAIL}{message_uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_message_tables() {
        assert_eq!(
            EntryKind::classify(&contact_messages("abc")),
            EntryKind::ContactMessages("abc".into())
        );
        assert_eq!(
            EntryKind::classify(&group_messages("g1")),
            EntryKind::GroupMessages("g1".into())
        );
        assert_eq!(
            EntryKind::classify(&distribution_list_messages("l1")),
            EntryKind::DistributionListMessages("l1".into())
        );
    }

    #[test]
    fn blobs_are_not_tables() {
        let media = EntryKind::classify(&message_media("m1"));
        assert_eq!(media, EntryKind::MessageMedia("m1".into()));
        assert!(!media.is_table());
        assert_eq!(
            EntryKind::classify(&message_thumbnail("m1")),
            EntryKind::MessageThumbnail("m1".into())
        );
        assert_eq!(
            EntryKind::classify(&contact_profile_picture("c")),
            EntryKind::ContactProfilePicture("c".into())
        );
        assert_eq!(EntryKind::classify(PROFILE_PICTURE), EntryKind::OwnProfilePicture);
    }

    #[test]
    fn fixed_tables_and_unknowns() {
        assert_eq!(EntryKind::classify(SETTINGS), EntryKind::Settings);
        assert_eq!(EntryKind::classify(REACTIONS), EntryKind::Reactions);
        assert_eq!(EntryKind::classify("message_.csv"), EntryKind::Unknown);
        assert_eq!(EntryKind::classify("notes.txt"), EntryKind::Unknown);
        assert_eq!(EntryKind::classify("group_avatar_"), EntryKind::Unknown);
    }
}
