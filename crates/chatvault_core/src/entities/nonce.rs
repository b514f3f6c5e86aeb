//! `nonces.csv`: hashed nonces already used, so replayed messages stay
//! rejected after a restore.

use super::ReadContext;
use crate::error::{CoreResult, SkipReason};
use crate::model::{Nonce, NonceScope};
use crate::rows::{Column, Row, RowWriter};
use crate::version::FieldTag;
use std::io::Write;

const SCOPE: &str = "scope";
const NONCE: &str = "nonce";

/// Columns of the nonces table.
pub const COLUMNS: &[Column] = &[
    Column::gated(SCOPE, FieldTag::NonceScope),
    Column::base(NONCE),
];

/// Writes one nonce row.
pub fn write<W: Write>(nonce: &Nonce, out: &mut RowWriter<W>) -> CoreResult<()> {
    let mut row = Row::new();
    row.set(SCOPE, nonce.scope.as_str())
        .set_bytes(NONCE, &nonce.value);
    out.write(&row)
}

/// Parses one nonce row. Archives without scopes only held chat server
/// nonces.
pub fn read(row: &Row, ctx: &ReadContext<'_>) -> Result<Nonce, SkipReason> {
    let scope = if ctx.version.has(FieldTag::NonceScope) {
        row.choice_or(SCOPE, NonceScope::parse, NonceScope::Csp)?
    } else {
        NonceScope::Csp
    };
    Ok(Nonce {
        scope,
        value: row.bytes(NONCE)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{context, context_at, parse_table, through_table};
    use crate::remap::RemapTables;
    use crate::version::FormatVersion;

    #[test]
    fn roundtrip() {
        let remap = RemapTables::new();
        let nonce = Nonce {
            scope: NonceScope::D2d,
            value: vec![0xab; 32],
        };
        let rows = through_table(COLUMNS, |w| write(&nonce, w).unwrap());
        assert_eq!(read(&rows[0], &context(&remap)).unwrap(), nonce);
    }

    #[test]
    fn unscoped_nonces_are_csp() {
        let remap = RemapTables::new();
        let rows = parse_table("nonce\n00ff\n");
        let ctx = context_at(&remap, FormatVersion::check(11).unwrap());
        let nonce = read(&rows[0], &ctx).unwrap();
        assert_eq!(nonce.scope, NonceScope::Csp);
        assert_eq!(nonce.value, vec![0x00, 0xff]);
    }
}
