//! `ballots.csv`, `ballot_choices.csv` and `ballot_votes.csv`.

use super::ReadContext;
use crate::error::{CoreResult, SkipReason};
use crate::model::{
    Ballot, BallotAssessment, BallotChoice, BallotChoiceType, BallotKind, BallotState,
    BallotTarget, BallotVote, RowId,
};
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;

const BALLOT_UID: &str = "ballot_uid";
const API_BALLOT_ID: &str = "api_ballot_id";
const CREATOR: &str = "creator";
const NAME: &str = "name";
const STATE: &str = "state";
const ASSESSMENT: &str = "assessment";
const KIND: &str = "type";
const CHOICE_TYPE: &str = "choice_type";
const CREATED_AT: &str = "created_at";
const MODIFIED_AT: &str = "modified_at";
const LAST_VIEWED_AT: &str = "last_viewed_at";
const REF_TYPE: &str = "ref_type";
const REF_ID: &str = "ref_id";

const CHOICE_UID: &str = "ballot_choice_uid";
const API_CHOICE_ID: &str = "api_choice_id";
const VOTE_COUNT: &str = "vote_count";
const ORDER: &str = "order";

const IDENTITY: &str = "identity";
const CHOICE: &str = "choice";

const REF_GROUP: &str = "group";
const REF_CONTACT: &str = "contact";

/// Columns of the ballots table.
pub const COLUMNS: &[Column] = &[
    Column::base(BALLOT_UID),
    Column::base(API_BALLOT_ID),
    Column::base(CREATOR),
    Column::base(NAME),
    Column::base(STATE),
    Column::base(ASSESSMENT),
    Column::base(KIND),
    Column::base(CHOICE_TYPE),
    Column::base(CREATED_AT),
    Column::base(MODIFIED_AT),
    Column::gated(LAST_VIEWED_AT, FieldTag::BallotLastViewed),
    Column::base(REF_TYPE),
    Column::base(REF_ID),
];

/// Columns of the ballot choices table.
pub const CHOICE_COLUMNS: &[Column] = &[
    Column::base(CHOICE_UID),
    Column::base(BALLOT_UID),
    Column::base(API_CHOICE_ID),
    Column::base(NAME),
    Column::base(VOTE_COUNT),
    Column::base(ORDER),
    Column::base(CREATED_AT),
    Column::base(MODIFIED_AT),
];

/// Columns of the ballot votes table.
pub const VOTE_COLUMNS: &[Column] = &[
    Column::base(BALLOT_UID),
    Column::base(CHOICE_UID),
    Column::base(IDENTITY),
    Column::base(CHOICE),
    Column::base(CREATED_AT),
    Column::base(MODIFIED_AT),
];

/// Conversation of a ballot as written to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BallotRef {
    /// Group, by synthetic group-uid.
    Group(String),
    /// One-to-one chat, by contact identity.
    Contact(String),
}

/// A ballot with its synthetic uid and archive reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotRecord {
    /// Synthetic ballot-uid.
    pub uid: String,
    /// The ballot.
    pub ballot: Ballot,
    /// Where it was posted.
    pub reference: BallotRef,
}

/// A ballot read back with its reference resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBallot {
    /// Synthetic ballot-uid.
    pub uid: String,
    /// The ballot.
    pub ballot: Ballot,
    /// Its restored conversation.
    pub target: BallotTarget,
}

/// A ballot choice with its synthetic uids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceRecord {
    /// Synthetic ballot-choice-uid.
    pub uid: String,
    /// Synthetic uid of the owning ballot.
    pub ballot_uid: String,
    /// The choice. `ballot_id` is ignored when writing.
    pub choice: BallotChoice,
}

/// A ballot vote with the synthetic uids it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    /// Synthetic uid of the ballot.
    pub ballot_uid: String,
    /// Synthetic uid of the choice.
    pub choice_uid: String,
    /// The vote. `ballot_id` and `choice_id` are ignored when writing.
    pub vote: BallotVote,
}

/// Writes one ballot row.
pub fn write<W: Write>(record: &BallotRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let ballot = &record.ballot;
    let (ref_type, ref_id) = match &record.reference {
        BallotRef::Group(uid) => (REF_GROUP, uid.as_str()),
        BallotRef::Contact(identity) => (REF_CONTACT, identity.as_str()),
    };
    let mut row = Row::new();
    row.set(BALLOT_UID, record.uid.as_str())
        .set(API_BALLOT_ID, ballot.api_ballot_id.as_str())
        .set(CREATOR, ballot.creator.as_str())
        .set_opt(NAME, ballot.name.as_deref())
        .set(STATE, ballot.state.as_str())
        .set(ASSESSMENT, ballot.assessment.as_str())
        .set(KIND, ballot.kind.as_str())
        .set(CHOICE_TYPE, ballot.choice_type.as_str())
        .set(CREATED_AT, ballot.created_at.to_string())
        .set(MODIFIED_AT, ballot.modified_at.to_string())
        .set_opt(LAST_VIEWED_AT, ballot.last_viewed_at)
        .set(REF_TYPE, ref_type)
        .set(REF_ID, ref_id);
    out.write(&row)
}

/// Parses one ballot row and resolves its conversation.
///
/// A reference to a group that was not restored, or to an identity that is
/// not a restored contact, skips the ballot.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<ResolvedBallot, SkipReason> {
    let ref_id = row.text(REF_ID)?;
    let target = match row.text(REF_TYPE)? {
        REF_GROUP => BallotTarget::Group(*ctx.remap.groups.resolve(ref_id)?),
        REF_CONTACT => {
            ctx.remap.contact(ref_id)?;
            BallotTarget::Contact(ref_id.to_string())
        }
        other => {
            return Err(SkipReason::UnknownValue {
                column: REF_TYPE,
                value: other.to_string(),
            })
        }
    };
    let last_viewed_at = if ctx.version.has(FieldTag::BallotLastViewed) {
        row.opt_number(LAST_VIEWED_AT)?
    } else {
        None
    };

    Ok(ResolvedBallot {
        uid: row.text(BALLOT_UID)?.to_string(),
        ballot: Ballot {
            api_ballot_id: row.text(API_BALLOT_ID)?.to_string(),
            creator: row.text(CREATOR)?.to_string(),
            name: row.opt_text(NAME),
            state: row.choice(STATE, BallotState::parse)?,
            assessment: row.choice(ASSESSMENT, BallotAssessment::parse)?,
            kind: row.choice(KIND, BallotKind::parse)?,
            choice_type: row.choice_or(CHOICE_TYPE, BallotChoiceType::parse, BallotChoiceType::Text)?,
            created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
            modified_at: row.opt_number(MODIFIED_AT)?.unwrap_or(0),
            last_viewed_at,
        },
        target,
    })
}

/// Writes one ballot choice row.
pub fn write_choice<W: Write>(record: &ChoiceRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let choice = &record.choice;
    let mut row = Row::new();
    row.set(CHOICE_UID, record.uid.as_str())
        .set(BALLOT_UID, record.ballot_uid.as_str())
        .set(API_CHOICE_ID, choice.api_choice_id.to_string())
        .set(NAME, choice.name.as_str())
        .set(VOTE_COUNT, choice.vote_count.to_string())
        .set(ORDER, choice.order.to_string())
        .set(CREATED_AT, choice.created_at.to_string())
        .set(MODIFIED_AT, choice.modified_at.to_string());
    out.write(&row)
}

/// Parses one ballot choice row. Returns the choice uid and the choice
/// bound to its restored ballot.
pub fn read_choice(row: &Row, ctx: &ReadContext<'_>) -> Result<(String, BallotChoice), SkipReason> {
    let ballot_id = *ctx.remap.ballots.resolve(row.text(BALLOT_UID)?)?;
    Ok((
        row.text(CHOICE_UID)?.to_string(),
        BallotChoice {
            ballot_id,
            api_choice_id: row.number(API_CHOICE_ID)?,
            name: row.opt_text(NAME).unwrap_or_default(),
            vote_count: row.opt_number(VOTE_COUNT)?.unwrap_or(0),
            order: row.opt_number(ORDER)?.unwrap_or(0),
            created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
            modified_at: row.opt_number(MODIFIED_AT)?.unwrap_or(0),
        },
    ))
}

/// Writes one ballot vote row.
pub fn write_vote<W: Write>(record: &VoteRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let vote = &record.vote;
    let mut row = Row::new();
    row.set(BALLOT_UID, record.ballot_uid.as_str())
        .set(CHOICE_UID, record.choice_uid.as_str())
        .set(IDENTITY, vote.identity.as_str())
        .set(CHOICE, vote.choice.to_string())
        .set(CREATED_AT, vote.created_at.to_string())
        .set(MODIFIED_AT, vote.modified_at.to_string());
    out.write(&row)
}

/// Parses one ballot vote row, resolving its ballot and choice.
pub fn read_vote(row: &Row, ctx: &ReadContext<'_>) -> Result<BallotVote, SkipReason> {
    let ballot_uid = row.text(BALLOT_UID)?;
    let ballot_id: RowId = *ctx.remap.ballots.resolve(ballot_uid)?;
    let (choice_ballot, choice_id) = *ctx.remap.ballot_choices.resolve(row.text(CHOICE_UID)?)?;
    if choice_ballot != ballot_id {
        return Err(SkipReason::Rejected(format!(
            "choice does not belong to ballot {ballot_uid}"
        )));
    }
    Ok(BallotVote {
        ballot_id,
        choice_id,
        identity: row.text(IDENTITY)?.to_string(),
        choice: row.opt_number(CHOICE)?.unwrap_or(0),
        created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
        modified_at: row.opt_number(MODIFIED_AT)?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{context, through_table};
    use crate::remap::RemapTables;

    fn ballot() -> Ballot {
        Ballot {
            api_ballot_id: "b-api".into(),
            creator: "ECHOECHO".into(),
            name: Some("Lunch?".into()),
            state: BallotState::Open,
            assessment: BallotAssessment::SingleChoice,
            kind: BallotKind::Intermediate,
            choice_type: BallotChoiceType::Text,
            created_at: 1,
            modified_at: 2,
            last_viewed_at: Some(3),
        }
    }

    fn write_ballot(reference: BallotRef) -> Vec<Row> {
        let record = BallotRecord {
            uid: "b1".into(),
            ballot: ballot(),
            reference,
        };
        through_table(COLUMNS, |w| write(&record, w).unwrap())
    }

    #[test]
    fn group_reference_resolves() {
        let mut remap = RemapTables::new();
        remap.groups.insert("g1", RowId(7));
        let rows = write_ballot(BallotRef::Group("g1".into()));
        let resolved = read(&rows[0], &context(&remap)).unwrap();
        assert_eq!(resolved.ballot, ballot());
        assert_eq!(resolved.target, BallotTarget::Group(RowId(7)));
    }

    #[test]
    fn unresolvable_reference_skips_ballot() {
        let remap = RemapTables::new();
        let rows = write_ballot(BallotRef::Group("g-missing".into()));
        assert!(matches!(
            read(&rows[0], &context(&remap)),
            Err(SkipReason::Unresolved { family: "group", .. })
        ));

        let rows = write_ballot(BallotRef::Contact("ECHOECHO".into()));
        assert!(matches!(
            read(&rows[0], &context(&remap)),
            Err(SkipReason::Unresolved { family: "contact", .. })
        ));
    }

    #[test]
    fn contact_reference_resolves() {
        let mut remap = RemapTables::new();
        remap.contacts.insert("ECHOECHO".into());
        let rows = write_ballot(BallotRef::Contact("ECHOECHO".into()));
        let resolved = read(&rows[0], &context(&remap)).unwrap();
        assert_eq!(resolved.target, BallotTarget::Contact("ECHOECHO".into()));
    }

    #[test]
    fn choices_and_votes_resolve_through_uids() {
        let mut remap = RemapTables::new();
        remap.ballots.insert("b1", RowId(1));

        let choice = ChoiceRecord {
            uid: "c1".into(),
            ballot_uid: "b1".into(),
            choice: BallotChoice {
                ballot_id: RowId(0),
                api_choice_id: 4,
                name: "Pizza".into(),
                vote_count: 1,
                order: 0,
                created_at: 1,
                modified_at: 1,
            },
        };
        let rows = through_table(CHOICE_COLUMNS, |w| write_choice(&choice, w).unwrap());
        let (uid, restored) = read_choice(&rows[0], &context(&remap)).unwrap();
        assert_eq!(uid, "c1");
        assert_eq!(restored.ballot_id, RowId(1));
        assert_eq!(restored.name, "Pizza");
        remap.ballot_choices.insert(uid, (RowId(1), RowId(2)));

        let vote = VoteRecord {
            ballot_uid: "b1".into(),
            choice_uid: "c1".into(),
            vote: BallotVote {
                ballot_id: RowId(0),
                choice_id: RowId(0),
                identity: "ECHOECHO".into(),
                choice: 1,
                created_at: 3,
                modified_at: 3,
            },
        };
        let rows = through_table(VOTE_COLUMNS, |w| write_vote(&vote, w).unwrap());
        let restored = read_vote(&rows[0], &context(&remap)).unwrap();
        assert_eq!(restored.choice_id, RowId(2));
        assert_eq!(restored.ballot_id, RowId(1));
    }

    #[test]
    fn choice_of_unknown_ballot_is_dropped() {
        let remap = RemapTables::new();
        let choice = ChoiceRecord {
            uid: "c1".into(),
            ballot_uid: "b-missing".into(),
            choice: BallotChoice {
                ballot_id: RowId(0),
                api_choice_id: 1,
                name: "x".into(),
                vote_count: 0,
                order: 0,
                created_at: 0,
                modified_at: 0,
            },
        };
        let rows = through_table(CHOICE_COLUMNS, |w| write_choice(&choice, w).unwrap());
        assert!(read_choice(&rows[0], &context(&remap)).is_err());
    }

    #[test]
    fn vote_with_mismatched_ballot_is_rejected() {
        let mut remap = RemapTables::new();
        remap.ballots.insert("b1", RowId(1));
        remap.ballot_choices.insert("c9", (RowId(9), RowId(10)));
        let vote = VoteRecord {
            ballot_uid: "b1".into(),
            choice_uid: "c9".into(),
            vote: BallotVote {
                ballot_id: RowId(0),
                choice_id: RowId(0),
                identity: "ECHOECHO".into(),
                choice: 1,
                created_at: 0,
                modified_at: 0,
            },
        };
        let rows = through_table(VOTE_COLUMNS, |w| write_vote(&vote, w).unwrap());
        assert!(matches!(
            read_vote(&rows[0], &context(&remap)),
            Err(SkipReason::Rejected(_))
        ));
    }
}
