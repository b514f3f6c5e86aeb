//! `settings.csv`: format version and provenance of the archive.

use crate::error::{CoreResult, SkipReason};
use crate::rows::{Column, Row, RowWriter};
use std::io::Write;

const VERSION: &str = "version";
const CREATED_AT: &str = "created_at";
const APP_VERSION: &str = "app_version";

/// Columns of the settings table.
pub const COLUMNS: &[Column] = &[
    Column::base(VERSION),
    Column::base(CREATED_AT),
    Column::base(APP_VERSION),
];

/// Archive-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Declared format version, not yet checked.
    pub version: u32,
    /// Backup time (ms since epoch).
    pub created_at: u64,
    /// Version of the application that wrote the archive.
    pub app_version: Option<String>,
}

/// Writes the settings row.
pub fn write<W: Write>(settings: &Settings, out: &mut RowWriter<W>) -> CoreResult<()> {
    let mut row = Row::new();
    row.set(VERSION, settings.version.to_string())
        .set(CREATED_AT, settings.created_at.to_string())
        .set_opt(APP_VERSION, settings.app_version.as_deref());
    out.write(&row)
}

/// Parses the settings row. Only `version` is required.
pub fn read(row: &Row) -> Result<Settings, SkipReason> {
    Ok(Settings {
        version: row.number(VERSION)?,
        created_at: row.opt_number(CREATED_AT)?.unwrap_or(0),
        app_version: row.opt_text(APP_VERSION),
    })
}
