//! Restore command.

use super::supervised;
use crate::data_dir::DataDir;
use chatvault_core::{LogSink, OperationKind, RestoreConfig, RestoreEngine};
use std::path::Path;
use tracing::{info, warn};

/// Replaces the contents of the data directory with the backup at `input`.
///
/// The store snapshot is saved whenever the restore touched it, so a run
/// canceled after clearing still leaves snapshot and media consistent.
pub fn run(
    data: &Path,
    input: &Path,
    password: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = DataDir::open(data)?;
    let mut store = dir.load_store()?;
    let mut media = dir.media()?;
    info!("Restoring {:?} from {:?}", data, input);

    let input = input.to_path_buf();
    let (result, store) = supervised(OperationKind::Restore, move |cancel| {
        let result = RestoreEngine::new(&mut store, &mut media, RestoreConfig::default()).run(
            &input,
            password.as_deref(),
            cancel,
            &LogSink,
        );
        Ok((result, store))
    })?;

    if store.mutations() > 0 {
        store.save(&dir.store_path())?;
    }
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if store.mutations() > 0 {
                warn!("restore stopped after clearing, the data directory is incomplete");
            }
            return Err(e.into());
        }
    };

    println!("✓ Backup restored successfully");
    println!("  Format version: {}", report.format_version);
    println!("  Contacts: {}", report.contacts);
    println!("  Groups: {}", report.groups);
    println!("  Distribution lists: {}", report.distribution_lists);
    println!("  Ballots: {}", report.ballots);
    println!("  Messages: {}", report.messages);
    println!("  Reactions: {}", report.reactions);
    println!("  Media files: {}", report.media_files);
    if report.skipped > 0 {
        println!("  Skipped: {} (see log)", report.skipped);
    }
    if report.media_missing > 0 {
        println!("  Media missing: {}", report.media_missing);
    }

    Ok(())
}
