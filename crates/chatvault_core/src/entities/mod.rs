//! Entity serializers.
//!
//! One module per entity kind. Each exposes a `COLUMNS` list, a `write`
//! function turning a record into a row of its table, and a `read`
//! function parsing a row back. `read` never touches storage: it resolves
//! references through the [`RemapTables`] of the [`ReadContext`] and
//! reports unusable rows as a [`SkipReason`](crate::error::SkipReason).

pub mod ballot;
pub mod contact;
pub mod distribution_list;
pub mod group;
pub mod identity;
pub mod message;
pub mod nonce;
pub mod reaction;
pub mod settings;

use crate::remap::RemapTables;
use crate::version::FormatVersion;

/// Separator of list-valued columns.
pub const LIST_SEPARATOR: char = ';';

/// Everything a deserializer may consult.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    /// Format version of the archive being read.
    pub version: FormatVersion,
    /// The user's own identity.
    pub own_identity: &'a str,
    /// Remapping tables filled so far.
    pub remap: &'a RemapTables,
}

pub(crate) fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(&LIST_SEPARATOR.to_string())
}

pub(crate) fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by the serializer tests.

    use super::ReadContext;
    use crate::remap::RemapTables;
    use crate::rows::{Column, Row, RowReader, RowWriter};
    use crate::version::FormatVersion;

    pub const OWN: &str = "MYSELF01";

    pub fn context(remap: &RemapTables) -> ReadContext<'_> {
        context_at(remap, FormatVersion::CURRENT)
    }

    pub fn context_at(remap: &RemapTables, version: FormatVersion) -> ReadContext<'_> {
        ReadContext {
            version,
            own_identity: OWN,
            remap,
        }
    }

    /// Writes rows through `write` and reads them back as parsed rows.
    pub fn through_table(columns: &[Column], write: impl FnOnce(&mut RowWriter<Vec<u8>>)) -> Vec<Row> {
        let mut writer = RowWriter::new(Vec::new(), columns).unwrap();
        write(&mut writer);
        let data = writer.finish().unwrap();
        RowReader::new(data.as_slice())
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    /// Parses a handwritten table.
    pub fn parse_table(text: &str) -> Vec<Row> {
        RowReader::new(text.as_bytes())
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }
}
