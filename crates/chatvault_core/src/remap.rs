//! Synthetic identifier remapping.
//!
//! A backup replaces every live key with a random uid. During restore each
//! restored entity registers its uid here with the key the store assigned,
//! and every dependent row resolves its references through the same tables.

use crate::error::SkipReason;
use crate::model::RowId;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Maps synthetic uids of one family to live values.
#[derive(Debug)]
pub struct RemapTable<V> {
    family: &'static str,
    entries: HashMap<String, V>,
}

impl<V> RemapTable<V> {
    /// Creates an empty table for `family`.
    #[must_use]
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            entries: HashMap::new(),
        }
    }

    /// Registers `uid`. An existing mapping is never overwritten; the
    /// duplicate is dropped with a warning and `false` is returned.
    pub fn insert(&mut self, uid: impl Into<String>, value: V) -> bool {
        let uid = uid.into();
        if self.entries.contains_key(&uid) {
            warn!(family = self.family, uid = %uid, "duplicate uid ignored");
            return false;
        }
        self.entries.insert(uid, value);
        true
    }

    /// Resolves `uid` to its live value.
    pub fn resolve(&self, uid: &str) -> Result<&V, SkipReason> {
        self.entries.get(uid).ok_or_else(|| SkipReason::Unresolved {
            family: self.family,
            uid: uid.to_string(),
        })
    }

    /// Returns true if `uid` is registered.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Returns the number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every remapping table of one restore run.
#[derive(Debug)]
pub struct RemapTables {
    /// identity-id to contact identity.
    pub identities: RemapTable<String>,
    /// Identities of restored contacts.
    pub contacts: HashSet<String>,
    /// group-uid to group key.
    pub groups: RemapTable<RowId>,
    /// distribution-list-uid to list key.
    pub distribution_lists: RemapTable<RowId>,
    /// ballot-uid to ballot key.
    pub ballots: RemapTable<RowId>,
    /// ballot-choice-uid to (ballot key, choice key).
    pub ballot_choices: RemapTable<(RowId, RowId)>,
    /// message-uid to message key.
    pub messages: RemapTable<RowId>,
}

impl RemapTables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identities: RemapTable::new("identity"),
            contacts: HashSet::new(),
            groups: RemapTable::new("group"),
            distribution_lists: RemapTable::new("distribution list"),
            ballots: RemapTable::new("ballot"),
            ballot_choices: RemapTable::new("ballot choice"),
            messages: RemapTable::new("message"),
        }
    }

    /// Resolves a contact identity that must belong to a restored contact.
    pub fn contact(&self, identity: &str) -> Result<(), SkipReason> {
        if self.contacts.contains(identity) {
            Ok(())
        } else {
            Err(SkipReason::Unresolved {
                family: "contact",
                uid: identity.to_string(),
            })
        }
    }
}

impl Default for RemapTables {
    fn default() -> Self {
        Self::new()
    }
}
