//! Backup command.

use super::supervised;
use crate::data_dir::DataDir;
use chatvault_core::{BackupConfig, BackupEngine, LogSink, OperationKind};
use std::path::Path;
use tracing::info;

/// Writes a backup of the data directory to `output`.
pub fn run(
    data: &Path,
    output: &Path,
    password: Option<String>,
    config: BackupConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = DataDir::open(data)?;
    let store = dir.load_store()?;
    let media = dir.media()?;
    info!("Creating backup of {:?}", data);

    let output = output.to_path_buf();
    let report = supervised(OperationKind::Backup, move |cancel| {
        BackupEngine::new(&store, &media, config).run(&output, password.as_deref(), cancel, &LogSink)
    })?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", report.path);
    println!("  Encrypted: {}", report.encrypted);
    println!("  Tables: {}", report.tables);
    println!("  Rows: {}", report.rows);
    println!("  Media files: {}", report.blobs);

    Ok(())
}
