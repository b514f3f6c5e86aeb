//! `reactions.csv`.

use super::ReadContext;
use crate::error::{CoreResult, SkipReason};
use crate::model::Reaction;
use crate::rows::{Column, Row, RowWriter};
use std::io::Write;

const MESSAGE_UID: &str = "message_uid";
const SENDER: &str = "sender";
const EMOJI: &str = "emoji";
const REACTED_AT: &str = "reacted_at";

/// Columns of the reactions table.
pub const COLUMNS: &[Column] = &[
    Column::base(MESSAGE_UID),
    Column::base(SENDER),
    Column::base(EMOJI),
    Column::base(REACTED_AT),
];

/// A reaction with the synthetic uid of its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRecord {
    /// Synthetic uid of the message.
    pub message_uid: String,
    /// The reaction. `message_id` is ignored when writing.
    pub reaction: Reaction,
}

/// Writes one reaction row.
pub fn write<W: Write>(record: &ReactionRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let mut row = Row::new();
    row.set(MESSAGE_UID, record.message_uid.as_str())
        .set(SENDER, record.reaction.sender.as_str())
        .set(EMOJI, record.reaction.emoji.as_str())
        .set(REACTED_AT, record.reaction.reacted_at.to_string());
    out.write(&row)
}

/// Parses one reaction row, resolving its message.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<Reaction, SkipReason> {
    let message_id = *ctx.remap.messages.resolve(row.text(MESSAGE_UID)?)?;
    Ok(Reaction {
        message_id,
        sender: row.text(SENDER)?.to_string(),
        emoji: row.text(EMOJI)?.to_string(),
        reacted_at: row.opt_number(REACTED_AT)?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{context, through_table};
    use crate::model::RowId;
    use crate::remap::RemapTables;

    fn record(message_uid: &str) -> ReactionRecord {
        ReactionRecord {
            message_uid: message_uid.into(),
            reaction: Reaction {
                message_id: RowId(0),
                sender: "ECHOECHO".into(),
                emoji: "\u{2764}\u{FE0F}".into(),
                reacted_at: 42,
            },
        }
    }

    #[test]
    fn roundtrip() {
        let mut remap = RemapTables::new();
        remap.messages.insert("m1", RowId(8));
        let rows = through_table(COLUMNS, |w| write(&record("m1"), w).unwrap());
        let reaction = read(&rows[0], &context(&remap)).unwrap();
        assert_eq!(reaction.message_id, RowId(8));
        assert_eq!(reaction.emoji, "\u{2764}\u{FE0F}");
        assert_eq!(reaction.reacted_at, 42);
    }

    #[test]
    fn unknown_message_is_dropped() {
        let remap = RemapTables::new();
        let rows = through_table(COLUMNS, |w| write(&record("m-gone"), w).unwrap());
        assert!(matches!(
            read(&rows[0], &context(&remap)),
            Err(SkipReason::Unresolved { family: "message", .. })
        ));
    }
}
