//! `contacts.csv`.

use super::identity::is_valid_identity;
use super::ReadContext;
use crate::error::{CoreResult, SkipReason};
use crate::model::{AcquaintanceLevel, Contact, VerificationLevel};
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;

const IDENTITY_ID: &str = "identity_id";
const IDENTITY: &str = "identity";
const PUBLIC_KEY: &str = "public_key";
const VERIFICATION: &str = "verification";
const FIRST_NAME: &str = "first_name";
const LAST_NAME: &str = "last_name";
const NICKNAME: &str = "nickname";
const HIDDEN: &str = "hidden";
const ACQUAINTANCE: &str = "acquaintance_level";
const FEATURE_MASK: &str = "feature_mask";
const READ_RECEIPTS: &str = "read_receipts";

/// Columns of the contacts table.
pub const COLUMNS: &[Column] = &[
    Column::base(IDENTITY_ID),
    Column::base(IDENTITY),
    Column::base(PUBLIC_KEY),
    Column::base(VERIFICATION),
    Column::base(FIRST_NAME),
    Column::base(LAST_NAME),
    Column::base(NICKNAME),
    Column::gated(HIDDEN, FieldTag::ContactHidden),
    Column::gated(ACQUAINTANCE, FieldTag::ContactAcquaintanceLevel),
    Column::gated(FEATURE_MASK, FieldTag::ContactFeatureMask),
    Column::gated(READ_RECEIPTS, FieldTag::ContactReadReceipts),
];

/// A contact with its synthetic identity-id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    /// Synthetic identity-id naming the contact's message table and blobs.
    pub identity_id: String,
    /// The contact.
    pub contact: Contact,
}

/// Writes one contact row.
pub fn write<W: Write>(record: &ContactRecord, out: &mut RowWriter<W>) -> CoreResult<()> {
    let contact = &record.contact;
    let mut row = Row::new();
    row.set(IDENTITY_ID, record.identity_id.as_str())
        .set(IDENTITY, contact.identity.as_str())
        .set_bytes(PUBLIC_KEY, &contact.public_key)
        .set(VERIFICATION, contact.verification.as_str())
        .set_opt(FIRST_NAME, contact.first_name.as_deref())
        .set_opt(LAST_NAME, contact.last_name.as_deref())
        .set_opt(NICKNAME, contact.nickname.as_deref())
        .set_flag(HIDDEN, contact.hidden)
        .set(ACQUAINTANCE, contact.acquaintance.as_str())
        .set(FEATURE_MASK, contact.feature_mask.to_string())
        .set_opt(READ_RECEIPTS, contact.read_receipts.map(u8::from));
    out.write(&row)
}

/// Parses one contact row.
///
/// A contact carrying the user's own identity is rejected, as is one whose
/// identity is not well formed.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<ContactRecord, SkipReason> {
    let identity = row.text(IDENTITY)?.to_string();
    if !is_valid_identity(&identity) {
        return Err(SkipReason::MalformedField {
            column: IDENTITY,
            value: identity,
        });
    }
    if identity == ctx.own_identity {
        return Err(SkipReason::Rejected(format!(
            "contact {identity} is the user's own identity"
        )));
    }

    let version = ctx.version;
    let hidden = if version.has(FieldTag::ContactHidden) {
        row.flag(HIDDEN)?
    } else {
        false
    };
    let acquaintance = if version.has(FieldTag::ContactAcquaintanceLevel) {
        row.choice_or(ACQUAINTANCE, AcquaintanceLevel::parse, AcquaintanceLevel::Direct)?
    } else {
        AcquaintanceLevel::Direct
    };
    let feature_mask = if version.has(FieldTag::ContactFeatureMask) {
        row.opt_number(FEATURE_MASK)?.unwrap_or(0)
    } else {
        0
    };
    let read_receipts = if version.has(FieldTag::ContactReadReceipts) {
        match row.get(READ_RECEIPTS) {
            None | Some("") => None,
            Some(_) => Some(row.flag(READ_RECEIPTS)?),
        }
    } else {
        None
    };

    Ok(ContactRecord {
        identity_id: row.text(IDENTITY_ID)?.to_string(),
        contact: Contact {
            identity,
            public_key: row.bytes(PUBLIC_KEY)?,
            verification: row.choice_or(
                VERIFICATION,
                VerificationLevel::parse,
                VerificationLevel::Unverified,
            )?,
            first_name: row.opt_text(FIRST_NAME),
            last_name: row.opt_text(LAST_NAME),
            nickname: row.opt_text(NICKNAME),
            hidden,
            acquaintance,
            feature_mask,
            read_receipts,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{context, context_at, parse_table, through_table, OWN};
    use crate::remap::RemapTables;
    use crate::version::FormatVersion;

    fn record(identity: &str) -> ContactRecord {
        ContactRecord {
            identity_id: "c0ffee".into(),
            contact: Contact {
                identity: identity.into(),
                public_key: vec![9; 32],
                verification: VerificationLevel::FullyVerified,
                first_name: Some("Echo".into()),
                last_name: None,
                nickname: Some("echo".into()),
                hidden: true,
                acquaintance: AcquaintanceLevel::GroupOnly,
                feature_mask: 0x1f,
                read_receipts: Some(false),
            },
        }
    }

    #[test]
    fn roundtrip() {
        let remap = RemapTables::new();
        let original = record("ECHOECHO");
        let rows = through_table(COLUMNS, |w| write(&original, w).unwrap());
        assert_eq!(read(&rows[0], &context(&remap)).unwrap(), original);
    }

    #[test]
    fn own_identity_is_rejected() {
        let remap = RemapTables::new();
        let rows = through_table(COLUMNS, |w| write(&record(OWN), w).unwrap());
        assert!(matches!(
            read(&rows[0], &context(&remap)),
            Err(SkipReason::Rejected(_))
        ));
    }

    #[test]
    fn version_one_row() {
        let remap = RemapTables::new();
        let rows = parse_table(
            "identity_id,identity,public_key,verification,first_name,last_name,nickname\n\
             c1,ECHOECHO,0a0b,SERVER_VERIFIED,,,\n",
        );
        let ctx = context_at(&remap, FormatVersion::check(1).unwrap());
        let contact = read(&rows[0], &ctx).unwrap().contact;
        assert_eq!(contact.verification, VerificationLevel::ServerVerified);
        assert!(!contact.hidden);
        assert_eq!(contact.acquaintance, AcquaintanceLevel::Direct);
        assert_eq!(contact.read_receipts, None);
        assert_eq!(contact.first_name, None);
    }

    #[test]
    fn malformed_identity_skips() {
        let remap = RemapTables::new();
        let rows = parse_table(
            "identity_id,identity,public_key,verification\n\
             c1,../../../escaped,00,UNVERIFIED\n\
             c2,echoecho,00,UNVERIFIED\n\
             c3,ECHO,00,UNVERIFIED\n",
        );
        for row in &rows {
            assert!(matches!(
                read(row, &context(&remap)),
                Err(SkipReason::MalformedField { column: "identity", .. })
            ));
        }
    }

    #[test]
    fn unknown_verification_skips() {
        let remap = RemapTables::new();
        let rows = parse_table("identity_id,identity,public_key,verification\nc1,ECHOECHO,00,MAYBE\n");
        assert!(matches!(
            read(&rows[0], &context(&remap)),
            Err(SkipReason::UnknownValue { column: "verification", .. })
        ));
    }
}
