//! `distribution_lists.csv`.
//!
//! Members are stored as identity-ids and resolved through the identity
//! remapping table; a member whose contact was not restored is dropped
//! without affecting the list.

use super::{join_list, split_list, ReadContext};
use crate::error::{CoreResult, SkipReason};
use crate::model::DistributionList;
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;

const LIST_UID: &str = "distribution_list_uid";
const NAME: &str = "name";
const CREATED_AT: &str = "created_at";
const ARCHIVED: &str = "archived";
const MEMBERS: &str = "members";

/// Columns of the distribution lists table.
pub const COLUMNS: &[Column] = &[
    Column::base(LIST_UID),
    Column::base(NAME),
    Column::base(CREATED_AT),
    Column::base(MEMBERS),
    Column::gated(ARCHIVED, FieldTag::DistributionListArchived),
];

/// A distribution list with its synthetic uid and member identity-ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionListRecord {
    /// Synthetic distribution-list-uid.
    pub uid: String,
    /// The list.
    pub list: DistributionList,
    /// Identity-ids of the members.
    pub member_ids: Vec<String>,
}

impl DistributionListRecord {
    /// Resolves member identity-ids to identities. Unresolved members are
    /// returned separately.
    #[must_use]
    pub fn resolve_members(&self, ctx: &ReadContext<'_>) -> (Vec<String>, Vec<SkipReason>) {
        let mut members = Vec::with_capacity(self.member_ids.len());
        let mut skipped = Vec::new();
        for id in &self.member_ids {
            match ctx.remap.identities.resolve(id) {
                Ok(identity) => members.push(identity.clone()),
                Err(reason) => skipped.push(reason),
            }
        }
        (members, skipped)
    }
}

/// Writes one distribution list row.
pub fn write<W: Write>(record: &DistributionListRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let mut row = Row::new();
    row.set(LIST_UID, record.uid.as_str())
        .set_opt(NAME, record.list.name.as_deref())
        .set(CREATED_AT, record.list.created_at.to_string())
        .set(MEMBERS, join_list(&record.member_ids))
        .set_flag(ARCHIVED, record.list.archived);
    out.write(&row)
}

/// Parses one distribution list row.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<DistributionListRecord, SkipReason> {
    let archived = if ctx.version.has(FieldTag::DistributionListArchived) {
        row.flag(ARCHIVED)?
    } else {
        false
    };
    Ok(DistributionListRecord {
        uid: row.text(LIST_UID)?.to_string(),
        list: DistributionList {
            name: row.opt_text(NAME),
            created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
            archived,
        },
        member_ids: split_list(row.get(MEMBERS)),
    })
}
