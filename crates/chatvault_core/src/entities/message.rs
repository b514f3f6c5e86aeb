//! Message tables: `message_<identity-id>.csv`, `group_message_<uid>.csv`
//! and `distribution_list_message_<uid>.csv` share one layout.
//!
//! Archives written before reactions existed stored a thumbs up or down in
//! the state column (`USERACK`/`USERDEC`). Such rows restore with a real
//! delivery state plus a synthesized reaction.

use super::ReadContext;
use crate::error::{CoreResult, SkipReason};
use crate::model::{Conversation, LegacyAck, Message, MessageKind, MessageState};
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;
use tracing::debug;

const MESSAGE_UID: &str = "message_uid";
const API_ID: &str = "api_id";
const OUTGOING: &str = "outgoing";
const READ: &str = "read";
const SAVED: &str = "saved";
const STATE: &str = "state";
const KIND: &str = "type";
const BODY: &str = "body";
const CAPTION: &str = "caption";
const STATUS_MESSAGE: &str = "status_message";
const QUEUED: &str = "queued";
const SENDER: &str = "sender";
const POSTED_AT: &str = "posted_at";
const CREATED_AT: &str = "created_at";
const MODIFIED_AT: &str = "modified_at";
const QUOTED_MESSAGE_ID: &str = "quoted_message_id";
const BALLOT_UID: &str = "ballot_uid";
const DELIVERED_AT: &str = "delivered_at";
const READ_AT: &str = "read_at";
const DISPLAY_TAGS: &str = "display_tags";
const FORWARD_SECURITY: &str = "forward_security";
const EDITED_AT: &str = "edited_at";
const DELETED_AT: &str = "deleted_at";

/// Columns of every message table.
pub const COLUMNS: &[Column] = &[
    Column::base(MESSAGE_UID),
    Column::base(API_ID),
    Column::base(OUTGOING),
    Column::base(READ),
    Column::base(SAVED),
    Column::base(STATE),
    Column::base(KIND),
    Column::base(BODY),
    Column::gated(CAPTION, FieldTag::MessageCaption),
    Column::base(STATUS_MESSAGE),
    Column::base(QUEUED),
    Column::base(SENDER),
    Column::base(POSTED_AT),
    Column::base(CREATED_AT),
    Column::base(MODIFIED_AT),
    Column::gated(QUOTED_MESSAGE_ID, FieldTag::MessageQuote),
    Column::gated(BALLOT_UID, FieldTag::Ballots),
    Column::gated(DELIVERED_AT, FieldTag::MessageDeliveryTimestamps),
    Column::gated(READ_AT, FieldTag::MessageDeliveryTimestamps),
    Column::gated(DISPLAY_TAGS, FieldTag::MessageDisplayTags),
    Column::gated(FORWARD_SECURITY, FieldTag::MessageForwardSecurity),
    Column::gated(EDITED_AT, FieldTag::MessageEditedAt),
    Column::gated(DELETED_AT, FieldTag::MessageDeletedAt),
];

/// A message with its synthetic uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Synthetic message-uid naming its blobs and reactions.
    pub uid: String,
    /// The message. `ballot_id` is ignored when writing.
    pub message: Message,
    /// Synthetic uid of the announced ballot.
    pub ballot_uid: Option<String>,
}

/// A reaction to create once the message has its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReaction {
    /// Identity of the reacting participant.
    pub sender: String,
    /// The emoji sequence.
    pub emoji: String,
    /// Reaction time (ms since epoch).
    pub reacted_at: u64,
}

/// A message read back from a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredMessage {
    /// Synthetic message-uid.
    pub uid: String,
    /// The message, with its ballot resolved when possible.
    pub message: Message,
    /// Reaction converted from a legacy acknowledge state.
    pub legacy_reaction: Option<PendingReaction>,
}

/// Writes one message row.
pub fn write<W: Write>(record: &MessageRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let m = &record.message;
    let mut row = Row::new();
    row.set(MESSAGE_UID, record.uid.as_str())
        .set(API_ID, m.api_id.as_str())
        .set_flag(OUTGOING, m.outgoing)
        .set_flag(READ, m.read)
        .set_flag(SAVED, m.saved)
        .set_opt(STATE, m.state.map(MessageState::as_str))
        .set(KIND, m.kind.as_str())
        .set_opt(BODY, m.body.as_deref())
        .set_opt(CAPTION, m.caption.as_deref())
        .set_flag(STATUS_MESSAGE, m.status_message)
        .set_flag(QUEUED, m.queued)
        .set_opt(SENDER, m.sender.as_deref())
        .set_opt(POSTED_AT, m.posted_at)
        .set(CREATED_AT, m.created_at.to_string())
        .set_opt(MODIFIED_AT, m.modified_at)
        .set_opt(QUOTED_MESSAGE_ID, m.quoted_api_id.as_deref())
        .set_opt(BALLOT_UID, record.ballot_uid.as_deref())
        .set_opt(DELIVERED_AT, m.delivered_at)
        .set_opt(READ_AT, m.read_at)
        .set(DISPLAY_TAGS, m.display_tags.to_string())
        .set(FORWARD_SECURITY, m.forward_security.to_string())
        .set_opt(EDITED_AT, m.edited_at)
        .set_opt(DELETED_AT, m.deleted_at);
    out.write(&row)
}

/// Parses one message row of `conversation`.
///
/// Outgoing messages left in a transient sending state restore as
/// `SendFailed`. A ballot uid that does not resolve leaves the message
/// without its ballot.
pub fn read(
    row: &Row,
    ctx: &ReadContext<'_>,
    conversation: &Conversation,
) -> Result<RestoredMessage, SkipReason> {
    let version = ctx.version;
    let uid = row.text(MESSAGE_UID)?.to_string();
    let outgoing = row.flag(OUTGOING)?;
    let created_at = row.number(CREATED_AT)?;
    let modified_at = row.opt_number(MODIFIED_AT)?;

    let (delivered_at, read_at) = if version.has(FieldTag::MessageDeliveryTimestamps) {
        (row.opt_number(DELIVERED_AT)?, row.opt_number(READ_AT)?)
    } else {
        (None, None)
    };

    let mut legacy_ack = None;
    let state = match row.get(STATE).filter(|s| !s.is_empty()) {
        None => None,
        Some(value) => match (MessageState::parse(value), LegacyAck::parse(value)) {
            (Some(state), _) => Some(state),
            (None, Some(ack)) => {
                legacy_ack = Some(ack);
                Some(if read_at.is_some() {
                    MessageState::Read
                } else {
                    MessageState::Delivered
                })
            }
            (None, None) => {
                return Err(SkipReason::UnknownValue {
                    column: STATE,
                    value: value.to_string(),
                })
            }
        },
    };
    let state = match state {
        Some(s) if outgoing && s.is_transient() => Some(MessageState::SendFailed),
        other => other,
    };

    let legacy_reaction = legacy_ack.and_then(|ack| {
        legacy_reaction_sender(ctx, conversation, outgoing).map(|sender| PendingReaction {
            sender,
            emoji: ack.emoji().to_string(),
            reacted_at: read_at.or(delivered_at).or(modified_at).unwrap_or(created_at),
        })
    });

    let ballot_id = if version.has(FieldTag::Ballots) {
        match row.opt_text(BALLOT_UID) {
            Some(ballot_uid) => match ctx.remap.ballots.resolve(&ballot_uid) {
                Ok(id) => Some(*id),
                Err(reason) => {
                    debug!(message = %uid, %reason, "message ballot not restored");
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };

    let gated_text = |tag: FieldTag, column: &str| {
        if version.has(tag) {
            row.opt_text(column)
        } else {
            None
        }
    };
    let gated_time = |tag: FieldTag, column: &'static str| -> Result<Option<u64>, SkipReason> {
        if version.has(tag) {
            row.opt_number(column)
        } else {
            Ok(None)
        }
    };
    let gated_small = |tag: FieldTag, column: &'static str| -> Result<u8, SkipReason> {
        if version.has(tag) {
            Ok(row.opt_number(column)?.unwrap_or(0))
        } else {
            Ok(0)
        }
    };

    let message = Message {
        api_id: row.text(API_ID)?.to_string(),
        outgoing,
        read: row.flag(READ)?,
        saved: row.flag(SAVED)?,
        state,
        kind: row.choice_or(KIND, MessageKind::parse, MessageKind::Text)?,
        body: row.opt_text(BODY),
        caption: gated_text(FieldTag::MessageCaption, CAPTION),
        status_message: row.flag(STATUS_MESSAGE)?,
        queued: row.flag(QUEUED)?,
        sender: row.opt_text(SENDER),
        posted_at: row.opt_number(POSTED_AT)?,
        created_at,
        modified_at,
        quoted_api_id: gated_text(FieldTag::MessageQuote, QUOTED_MESSAGE_ID),
        delivered_at,
        read_at,
        display_tags: gated_small(FieldTag::MessageDisplayTags, DISPLAY_TAGS)?,
        forward_security: gated_small(FieldTag::MessageForwardSecurity, FORWARD_SECURITY)?,
        edited_at: gated_time(FieldTag::MessageEditedAt, EDITED_AT)?,
        deleted_at: gated_time(FieldTag::MessageDeletedAt, DELETED_AT)?,
        ballot_id,
    };

    Ok(RestoredMessage {
        uid,
        message,
        legacy_reaction,
    })
}

/// Who acknowledged a message. In a one-to-one chat an outgoing message was
/// acknowledged by the contact and an incoming one by the user. In groups
/// and lists only the user's own acknowledgement of incoming messages is
/// known.
fn legacy_reaction_sender(
    ctx: &ReadContext<'_>,
    conversation: &Conversation,
    outgoing: bool,
) -> Option<String> {
    match (conversation, outgoing) {
        (_, false) => Some(ctx.own_identity.to_string()),
        (Conversation::Contact(identity), true) => Some(identity.clone()),
        (Conversation::Group(_) | Conversation::DistributionList(_), true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{context, context_at, parse_table, through_table, OWN};
    use crate::model::RowId;
    use crate::remap::RemapTables;
    use crate::version::FormatVersion;

    fn message() -> Message {
        Message {
            api_id: "00aa11bb22cc33dd".into(),
            outgoing: false,
            read: true,
            saved: true,
            state: None,
            kind: MessageKind::Image,
            body: Some("{\"w\":1}".into()),
            caption: Some("sunset".into()),
            status_message: false,
            queued: false,
            sender: Some("ECHOECHO".into()),
            posted_at: Some(90),
            created_at: 100,
            modified_at: Some(110),
            quoted_api_id: Some("ffeeddccbbaa9988".into()),
            delivered_at: Some(101),
            read_at: Some(102),
            display_tags: 1,
            forward_security: 2,
            edited_at: Some(120),
            deleted_at: None,
            ballot_id: None,
        }
    }

    fn contact_chat() -> Conversation {
        Conversation::Contact("ECHOECHO".into())
    }

    #[test]
    fn roundtrip_with_ballot() {
        let mut remap = RemapTables::new();
        remap.ballots.insert("b1", RowId(4));
        let record = MessageRecord {
            uid: "m1".into(),
            message: message(),
            ballot_uid: Some("b1".into()),
        };
        let rows = through_table(COLUMNS, |w| write(&record, w).unwrap());
        let restored = read(&rows[0], &context(&remap), &contact_chat()).unwrap();

        let mut expected = message();
        expected.ballot_id = Some(RowId(4));
        assert_eq!(restored.uid, "m1");
        assert_eq!(restored.message, expected);
        assert_eq!(restored.legacy_reaction, None);
    }

    #[test]
    fn unresolved_ballot_keeps_message() {
        let remap = RemapTables::new();
        let record = MessageRecord {
            uid: "m1".into(),
            message: message(),
            ballot_uid: Some("b-missing".into()),
        };
        let rows = through_table(COLUMNS, |w| write(&record, w).unwrap());
        let restored = read(&rows[0], &context(&remap), &contact_chat()).unwrap();
        assert_eq!(restored.message.ballot_id, None);
    }

    #[test]
    fn legacy_ack_becomes_state_and_reaction() {
        let remap = RemapTables::new();
        let ctx = context_at(&remap, FormatVersion::check(16).unwrap());
        let rows = parse_table(
            "message_uid,api_id,outgoing,state,type,created_at,read_at\n\
             m1,aa,1,USERACK,TEXT,100,150\n\
             m2,bb,0,USERDEC,TEXT,200,\n\
             m3,cc,1,USERACK,TEXT,300,\n",
        );

        let acked = read(&rows[0], &ctx, &contact_chat()).unwrap();
        assert_eq!(acked.message.state, Some(MessageState::Read));
        assert_eq!(
            acked.legacy_reaction,
            Some(PendingReaction {
                sender: "ECHOECHO".into(),
                emoji: "\u{1F44D}".into(),
                reacted_at: 150,
            })
        );

        let declined = read(&rows[1], &ctx, &contact_chat()).unwrap();
        assert_eq!(declined.message.state, Some(MessageState::Delivered));
        let reaction = declined.legacy_reaction.unwrap();
        assert_eq!(reaction.sender, OWN);
        assert_eq!(reaction.emoji, "\u{1F44E}");
        assert_eq!(reaction.reacted_at, 200);

        let in_group = read(&rows[2], &ctx, &Conversation::Group(RowId(1))).unwrap();
        assert_eq!(in_group.message.state, Some(MessageState::Delivered));
        assert_eq!(in_group.legacy_reaction, None);
    }

    #[test]
    fn transient_outgoing_state_fails() {
        let remap = RemapTables::new();
        let rows = parse_table(
            "message_uid,api_id,outgoing,state,type,created_at\n\
             m1,aa,1,SENDING,TEXT,1\n\
             m2,bb,0,PENDING,TEXT,1\n",
        );
        let ctx = context(&remap);
        assert_eq!(
            read(&rows[0], &ctx, &contact_chat()).unwrap().message.state,
            Some(MessageState::SendFailed)
        );
        assert_eq!(
            read(&rows[1], &ctx, &contact_chat()).unwrap().message.state,
            Some(MessageState::Pending)
        );
    }

    #[test]
    fn version_one_ignores_later_columns() {
        let remap = RemapTables::new();
        let rows = parse_table(
            "message_uid,api_id,outgoing,read,saved,state,type,body,caption,created_at\n\
             m1,aa,0,1,1,READ,TEXT,hello,ignored,5\n",
        );
        let ctx = context_at(&remap, FormatVersion::check(1).unwrap());
        let m = read(&rows[0], &ctx, &contact_chat()).unwrap().message;
        assert_eq!(m.body.as_deref(), Some("hello"));
        assert_eq!(m.caption, None);
        assert_eq!(m.display_tags, 0);
    }

    #[test]
    fn unknown_state_skips() {
        let remap = RemapTables::new();
        let rows = parse_table("message_uid,api_id,outgoing,state,created_at\nm1,aa,0,WARPED,1\n");
        assert!(matches!(
            read(&rows[0], &context(&remap), &contact_chat()),
            Err(SkipReason::UnknownValue { column: "state", .. })
        ));
    }
}
