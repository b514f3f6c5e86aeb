//! `identity.csv`: the user's own identity.
//!
//! Read before any other entity, so unlike the other serializers it needs
//! no [`ReadContext`](super::ReadContext).

use crate::error::{CoreResult, SkipReason};
use crate::model::Identity;
use crate::rows::{Column, Row, RowWriter};
use std::io::Write;

const IDENTITY: &str = "identity";
const PRIVATE_KEY: &str = "private_key";
const NICKNAME: &str = "nickname";

/// Length of an identity string.
pub const IDENTITY_LEN: usize = 8;

/// Returns true if `identity` is [`IDENTITY_LEN`] characters of `A-Z`,
/// `0-9` or `*`.
#[must_use]
pub fn is_valid_identity(identity: &str) -> bool {
    identity.len() == IDENTITY_LEN
        && identity
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'*')
}

/// Columns of the identity table.
pub const COLUMNS: &[Column] = &[
    Column::base(IDENTITY),
    Column::base(PRIVATE_KEY),
    Column::base(NICKNAME),
];

/// Writes the identity row.
pub fn write<W: Write>(identity: &Identity, out: &mut RowWriter<W>) -> CoreResult<()> {
    let mut row = Row::new();
    row.set(IDENTITY, identity.identity.as_str())
        .set_bytes(PRIVATE_KEY, &identity.private_key)
        .set_opt(NICKNAME, identity.nickname.as_deref());
    out.write(&row)
}

/// Parses the identity row.
pub fn read(row: &Row) -> Result<Identity, SkipReason> {
    let identity = row.text(IDENTITY)?;
    if !is_valid_identity(identity) {
        return Err(SkipReason::MalformedField {
            column: IDENTITY,
            value: identity.to_string(),
        });
    }
    let private_key = row.bytes(PRIVATE_KEY)?;
    Ok(Identity {
        identity: identity.to_string(),
        private_key,
        nickname: row.opt_text(NICKNAME),
    })
}
