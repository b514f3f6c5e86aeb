//! `groups.csv` with the member list of each group.

use super::{join_list, split_list, ReadContext};
use crate::error::{CoreResult, SkipReason};
use crate::model::{Group, NotificationTrigger, UserState};
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;

const GROUP_UID: &str = "group_uid";
const API_GROUP_ID: &str = "api_group_id";
const CREATOR: &str = "creator";
const NAME: &str = "name";
const CREATED_AT: &str = "created_at";
const DESCRIPTION: &str = "description";
const ARCHIVED: &str = "archived";
const MEMBERS: &str = "members";
const USER_STATE: &str = "user_state";
const LAST_UPDATE: &str = "last_update";
const NOTIFICATION_TRIGGER: &str = "notification_trigger";

/// Columns of the groups table.
pub const COLUMNS: &[Column] = &[
    Column::base(GROUP_UID),
    Column::base(API_GROUP_ID),
    Column::base(CREATOR),
    Column::base(NAME),
    Column::base(CREATED_AT),
    Column::gated(DESCRIPTION, FieldTag::GroupDescription),
    Column::base(ARCHIVED),
    Column::base(MEMBERS),
    Column::gated(USER_STATE, FieldTag::GroupUserState),
    Column::gated(LAST_UPDATE, FieldTag::GroupLastUpdate),
    Column::gated(NOTIFICATION_TRIGGER, FieldTag::GroupNotificationTrigger),
];

/// A group with its synthetic uid and member identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// Synthetic group-uid.
    pub uid: String,
    /// The group.
    pub group: Group,
    /// Member identities. When written, includes the user's own identity
    /// if the user is a member; when read, the user's own identity is
    /// removed.
    pub members: Vec<String>,
}

/// Writes one group row.
pub fn write<W: Write>(record: &GroupRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let group = &record.group;
    let mut row = Row::new();
    row.set(GROUP_UID, record.uid.as_str())
        .set(API_GROUP_ID, group.api_group_id.as_str())
        .set(CREATOR, group.creator.as_str())
        .set_opt(NAME, group.name.as_deref())
        .set(CREATED_AT, group.created_at.to_string())
        .set_opt(DESCRIPTION, group.description.as_deref())
        .set_flag(ARCHIVED, group.archived)
        .set(MEMBERS, join_list(&record.members))
        .set(USER_STATE, group.user_state.as_str())
        .set_opt(LAST_UPDATE, group.last_update)
        .set(NOTIFICATION_TRIGGER, group.notification_trigger.as_str());
    out.write(&row)
}

/// Parses one group row.
///
/// Archives without the explicit state column derive the user's state from
/// membership. A `Member` state whose creator is not among the members is
/// an orphaned group and is corrected to `Kicked`.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<GroupRecord, SkipReason> {
    let version = ctx.version;
    let creator = row.text(CREATOR)?.to_string();
    let mut members = split_list(row.get(MEMBERS));
    let user_is_member = members.iter().any(|m| m == ctx.own_identity);

    let mut user_state = if version.has(FieldTag::GroupUserState) {
        let fallback = if user_is_member {
            UserState::Member
        } else {
            UserState::Left
        };
        row.choice_or(USER_STATE, UserState::parse, fallback)?
    } else if user_is_member {
        UserState::Member
    } else {
        UserState::Left
    };
    if user_state == UserState::Member && !members.contains(&creator) {
        user_state = UserState::Kicked;
    }
    members.retain(|m| m != ctx.own_identity);
    members.dedup();

    let description = if version.has(FieldTag::GroupDescription) {
        row.opt_text(DESCRIPTION)
    } else {
        None
    };
    let last_update = if version.has(FieldTag::GroupLastUpdate) {
        row.opt_number(LAST_UPDATE)?
    } else {
        None
    };
    let notification_trigger = if version.has(FieldTag::GroupNotificationTrigger) {
        row.choice_or(
            NOTIFICATION_TRIGGER,
            NotificationTrigger::parse,
            NotificationTrigger::Default,
        )?
    } else {
        NotificationTrigger::Default
    };

    Ok(GroupRecord {
        uid: row.text(GROUP_UID)?.to_string(),
        group: Group {
            api_group_id: row.text(API_GROUP_ID)?.to_string(),
            creator,
            name: row.opt_text(NAME),
            created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
            description,
            archived: row.flag(ARCHIVED)?,
            user_state,
            last_update,
            notification_trigger,
        },
        members,
    })
}
