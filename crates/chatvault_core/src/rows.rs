//! Tabular row codec.
//!
//! Tables are CSV text with a header line. Rows are matched to columns by
//! header name, so a reader tolerates rows with fewer fields than its own
//! column list: absent trailing fields simply read as missing.

use crate::error::{CoreResult, SkipReason};
use crate::version::FieldTag;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::{self, Read, Write};
use std::str::FromStr;

/// One column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Header name.
    pub name: &'static str,
    /// Tag gating the column, `None` for columns present since version 1.
    pub since: Option<FieldTag>,
}

impl Column {
    /// A column present in every version.
    #[must_use]
    pub const fn base(name: &'static str) -> Self {
        Self { name, since: None }
    }

    /// A column added with `tag`.
    #[must_use]
    pub const fn gated(name: &'static str, tag: FieldTag) -> Self {
        Self {
            name,
            since: Some(tag),
        }
    }
}

/// Ordered set of named string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`, replacing any earlier value.
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some(field) => field.1 = value,
            None => self.fields.push((column.to_string(), value)),
        }
        self
    }

    /// Sets `column` to the display form of `value`, or empty for `None`.
    pub fn set_opt<T: ToString>(&mut self, column: &str, value: Option<T>) -> &mut Self {
        self.set(column, value.map(|v| v.to_string()).unwrap_or_default())
    }

    /// Sets a boolean column as `1` or `0`.
    pub fn set_flag(&mut self, column: &str, value: bool) -> &mut Self {
        self.set(column, if value { "1" } else { "0" })
    }

    /// Sets a byte column as lowercase hex.
    pub fn set_bytes(&mut self, column: &str, value: &[u8]) -> &mut Self {
        self.set(column, hex::encode(value))
    }

    /// Returns the raw value of `column`, if the row has it.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a required non-empty text field.
    pub fn text(&self, column: &'static str) -> Result<&str, SkipReason> {
        match self.get(column) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(SkipReason::MissingField { column }),
        }
    }

    /// Returns an optional text field; empty reads as `None`.
    #[must_use]
    pub fn opt_text(&self, column: &str) -> Option<String> {
        self.get(column)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Returns a boolean field; absent or empty reads as `false`.
    pub fn flag(&self, column: &'static str) -> Result<bool, SkipReason> {
        match self.get(column).unwrap_or("") {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(SkipReason::MalformedField {
                column,
                value: other.to_string(),
            }),
        }
    }

    /// Returns a required numeric field.
    pub fn number<T: FromStr>(&self, column: &'static str) -> Result<T, SkipReason> {
        self.opt_number(column)?
            .ok_or(SkipReason::MissingField { column })
    }

    /// Returns an optional numeric field.
    pub fn opt_number<T: FromStr>(&self, column: &'static str) -> Result<Option<T>, SkipReason> {
        match self.get(column) {
            None | Some("") => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| SkipReason::MalformedField {
                    column,
                    value: value.to_string(),
                }),
        }
    }

    /// Returns a required hex-encoded byte field.
    pub fn bytes(&self, column: &'static str) -> Result<Vec<u8>, SkipReason> {
        let value = self.text(column)?;
        hex::decode(value).map_err(|_| SkipReason::MalformedField {
            column,
            value: value.to_string(),
        })
    }

    /// Parses a required enum field with `parse`.
    pub fn choice<T>(&self, column: &'static str, parse: fn(&str) -> Option<T>) -> Result<T, SkipReason> {
        let value = self.text(column)?;
        parse(value).ok_or_else(|| SkipReason::UnknownValue {
            column,
            value: value.to_string(),
        })
    }

    /// Parses an optional enum field, falling back to `default` when empty.
    pub fn choice_or<T>(
        &self,
        column: &'static str,
        parse: fn(&str) -> Option<T>,
        default: T,
    ) -> Result<T, SkipReason> {
        match self.get(column) {
            None | Some("") => Ok(default),
            Some(value) => parse(value).ok_or_else(|| SkipReason::UnknownValue {
                column,
                value: value.to_string(),
            }),
        }
    }

    fn from_record(header: &[String], record: &StringRecord) -> Self {
        let fields = header
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        Self { fields }
    }
}

/// Writes rows of one table.
pub struct RowWriter<W: Write> {
    inner: csv::Writer<W>,
    header: Vec<&'static str>,
    rows: u64,
}

impl<W: Write> RowWriter<W> {
    /// Starts a table with `columns` and writes its header.
    pub fn new(inner: W, columns: &[Column]) -> CoreResult<Self> {
        let header: Vec<&'static str> = columns.iter().map(|c| c.name).collect();
        let mut inner = WriterBuilder::new().from_writer(inner);
        inner.write_record(&header)?;
        Ok(Self {
            inner,
            header,
            rows: 0,
        })
    }

    /// Writes one row; columns the row does not set are written empty.
    pub fn write(&mut self, row: &Row) -> CoreResult<()> {
        let record: Vec<&str> = self
            .header
            .iter()
            .map(|column| row.get(column).unwrap_or(""))
            .collect();
        self.inner.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// Returns the number of rows written so far.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(self) -> CoreResult<W> {
        let inner = self
            .inner
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(inner)
    }
}

/// Reads rows of one table.
pub struct RowReader<R: Read> {
    inner: csv::Reader<R>,
    header: Vec<String>,
    record: StringRecord,
}

impl<R: Read> RowReader<R> {
    /// Reads the header of a table.
    pub fn new(inner: R) -> CoreResult<Self> {
        let mut inner = ReaderBuilder::new().flexible(true).from_reader(inner);
        let header = inner.headers()?.iter().map(str::to_string).collect();
        Ok(Self {
            inner,
            header,
            record: StringRecord::new(),
        })
    }

    /// Returns the header columns of the table.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<Row, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_record(&mut self.record) {
            Ok(true) => Some(Ok(Row::from_record(&self.header, &self.record))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COLUMNS: &[Column] = &[
        Column::base("identity"),
        Column::base("nickname"),
        Column::gated("hidden", FieldTag::ContactHidden),
    ];

    fn write_table(rows: &[Row]) -> Vec<u8> {
        let mut writer = RowWriter::new(Vec::new(), COLUMNS).unwrap();
        for row in rows {
            writer.write(row).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn header_and_rows() {
        let mut row = Row::new();
        row.set("identity", "ECHOECHO").set("nickname", "Echo, \"the\" one");
        row.set_flag("hidden", true);

        let data = write_table(&[row.clone()]);
        let text = String::from_utf8(data.clone()).unwrap();
        assert!(text.starts_with("identity,nickname,hidden\n"));

        let rows: Vec<Row> = RowReader::new(data.as_slice())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn tolerates_missing_trailing_fields() {
        let data = b"identity,nickname,hidden\nECHOECHO\nABCDEFGH,Abe\n";
        let rows: Vec<Row> = RowReader::new(&data[..])
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("identity"), Some("ECHOECHO"));
        assert_eq!(rows[0].get("nickname"), None);
        assert!(!rows[0].flag("hidden").unwrap());
        assert_eq!(rows[1].opt_text("nickname").as_deref(), Some("Abe"));
    }

    #[test]
    fn older_header_without_gated_column() {
        let data = b"identity,nickname\nECHOECHO,Echo\n";
        let reader = RowReader::new(&data[..]).unwrap();
        assert_eq!(reader.header(), ["identity", "nickname"]);
        let row = reader.into_iter().next().unwrap().unwrap();
        assert_eq!(row.get("hidden"), None);
    }

    #[test]
    fn typed_accessors() {
        let mut row = Row::new();
        row.set("n", "42").set("bad", "4x2").set("key", "00ff").set("flag", "yes");

        assert_eq!(row.number::<u64>("n").unwrap(), 42);
        assert!(matches!(row.number::<u64>("bad"), Err(SkipReason::MalformedField { .. })));
        assert!(matches!(row.number::<u64>("absent"), Err(SkipReason::MissingField { .. })));
        assert_eq!(row.opt_number::<u64>("absent").unwrap(), None);
        assert_eq!(row.bytes("key").unwrap(), vec![0x00, 0xff]);
        assert!(row.flag("flag").is_err());
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut row = Row::new();
        row.set("a", "1").set("a", "2");
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("a"), Some("2"));
    }

    proptest! {
        #[test]
        fn arbitrary_text_survives(nickname in "[^\u{0}]{1,40}") {
            let mut row = Row::new();
            row.set("identity", "ECHOECHO").set("nickname", nickname.clone());
            let data = write_table(&[row]);
            let read = RowReader::new(data.as_slice()).unwrap().next().unwrap().unwrap();
            prop_assert_eq!(read.get("nickname"), Some(nickname.as_str()));
        }
    }
}
