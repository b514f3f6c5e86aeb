//! Backup format versions and the field gate.
//!
//! Every optional column or table is identified by a [`FieldTag`]. The
//! [`FIELD_GATES`] table maps each tag to the first format version that
//! wrote it; deserializers ask [`field_present`] instead of comparing
//! version numbers inline. Tags are only ever added, and a version number
//! never changes meaning.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 22;

/// Oldest format version this build can read.
pub const MIN_FORMAT_VERSION: u32 = 1;

/// Optional fields and tables of the backup format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    /// `caption` column of message tables.
    MessageCaption,
    /// `distribution_lists.csv` and list message tables.
    DistributionLists,
    /// `ballots.csv`, `ballot_choices.csv`, `ballot_votes.csv` and the
    /// message `ballot_uid` column.
    Ballots,
    /// `hidden` column of contacts.
    ContactHidden,
    /// `quoted_message_id` column of messages.
    MessageQuote,
    /// `description` column of groups.
    GroupDescription,
    /// `delivered_at` and `read_at` columns of messages.
    MessageDeliveryTimestamps,
    /// `acquaintance_level` column of contacts.
    ContactAcquaintanceLevel,
    /// `last_viewed_at` column of ballots.
    BallotLastViewed,
    /// `nonces.csv`.
    Nonces,
    /// Explicit `user_state` column of groups.
    GroupUserState,
    /// `display_tags` column of messages.
    MessageDisplayTags,
    /// `last_update` column of groups.
    GroupLastUpdate,
    /// `feature_mask` column of contacts.
    ContactFeatureMask,
    /// `forward_security` column of messages.
    MessageForwardSecurity,
    /// `reactions.csv`; legacy acknowledge states stop being written.
    Reactions,
    /// `edited_at` column of messages.
    MessageEditedAt,
    /// `deleted_at` column of messages.
    MessageDeletedAt,
    /// `read_receipts` column of contacts.
    ContactReadReceipts,
    /// `notification_trigger` column of groups.
    GroupNotificationTrigger,
    /// `archived` column of distribution lists.
    DistributionListArchived,
    /// `scope` column of nonces.
    NonceScope,
}

/// First version that carries each tag.
pub const FIELD_GATES: &[(FieldTag, u32)] = &[
    (FieldTag::MessageCaption, 2),
    (FieldTag::DistributionLists, 3),
    (FieldTag::Ballots, 4),
    (FieldTag::ContactHidden, 5),
    (FieldTag::MessageQuote, 6),
    (FieldTag::GroupDescription, 7),
    (FieldTag::MessageDeliveryTimestamps, 8),
    (FieldTag::ContactAcquaintanceLevel, 9),
    (FieldTag::BallotLastViewed, 10),
    (FieldTag::Nonces, 11),
    (FieldTag::GroupUserState, 12),
    (FieldTag::MessageDisplayTags, 13),
    (FieldTag::GroupLastUpdate, 14),
    (FieldTag::ContactFeatureMask, 15),
    (FieldTag::MessageForwardSecurity, 16),
    (FieldTag::Reactions, 17),
    (FieldTag::MessageEditedAt, 18),
    (FieldTag::MessageDeletedAt, 19),
    (FieldTag::ContactReadReceipts, 20),
    (FieldTag::GroupNotificationTrigger, 21),
    (FieldTag::DistributionListArchived, 21),
    (FieldTag::NonceScope, 22),
];

impl FieldTag {
    /// Returns the first format version carrying this tag.
    #[must_use]
    pub fn introduced_in(self) -> u32 {
        FIELD_GATES
            .iter()
            .find(|(tag, _)| *tag == self)
            .map(|(_, since)| *since)
            .unwrap_or(CURRENT_FORMAT_VERSION)
    }
}

/// Returns true if archives of `version` carry `tag`.
#[must_use]
pub fn field_present(version: u32, tag: FieldTag) -> bool {
    version >= tag.introduced_in()
}

/// A format version that has been checked against this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion(u32);

impl FormatVersion {
    /// The version written by this build.
    pub const CURRENT: Self = Self(CURRENT_FORMAT_VERSION);

    /// Validates a version declared by an archive.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFormatVersion`] for versions newer
    /// than [`CURRENT_FORMAT_VERSION`] or older than [`MIN_FORMAT_VERSION`].
    pub fn check(version: u32) -> CoreResult<Self> {
        if !(MIN_FORMAT_VERSION..=CURRENT_FORMAT_VERSION).contains(&version) {
            return Err(CoreError::UnsupportedFormatVersion {
                found: version,
                supported: CURRENT_FORMAT_VERSION,
            });
        }
        Ok(Self(version))
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true if this version carries `tag`.
    #[must_use]
    pub fn has(self, tag: FieldTag) -> bool {
        field_present(self.0, tag)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn every_tag_is_gated_once() {
        let mut seen = HashSet::new();
        for (tag, since) in FIELD_GATES {
            assert!(seen.insert(*tag), "{tag:?} gated twice");
            assert!(*since > MIN_FORMAT_VERSION && *since <= CURRENT_FORMAT_VERSION);
        }
    }

    #[test]
    fn gates_are_ordered_by_version() {
        let versions: Vec<u32> = FIELD_GATES.iter().map(|(_, v)| *v).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn current_version_has_everything() {
        for (tag, _) in FIELD_GATES {
            assert!(FormatVersion::CURRENT.has(*tag));
        }
    }

    #[test]
    fn known_boundaries() {
        assert!(!field_present(16, FieldTag::Reactions));
        assert!(field_present(17, FieldTag::Reactions));
        assert!(!field_present(11, FieldTag::GroupUserState));
        assert!(field_present(12, FieldTag::GroupUserState));
        assert!(!field_present(1, FieldTag::MessageCaption));
    }

    #[test]
    fn rejects_future_and_zero() {
        assert!(matches!(
            FormatVersion::check(CURRENT_FORMAT_VERSION + 1),
            Err(CoreError::UnsupportedFormatVersion { found, .. }) if found == CURRENT_FORMAT_VERSION + 1
        ));
        assert!(FormatVersion::check(0).is_err());
        assert_eq!(FormatVersion::check(5).unwrap().as_u32(), 5);
    }

    proptest! {
        #[test]
        fn presence_is_monotonic(v1 in MIN_FORMAT_VERSION..=CURRENT_FORMAT_VERSION, v2 in MIN_FORMAT_VERSION..=CURRENT_FORMAT_VERSION) {
            let (lo, hi) = if v1 <= v2 { (v1, v2) } else { (v2, v1) };
            for (tag, _) in FIELD_GATES {
                if field_present(lo, *tag) {
                    prop_assert!(field_present(hi, *tag));
                }
            }
        }
    }
}
