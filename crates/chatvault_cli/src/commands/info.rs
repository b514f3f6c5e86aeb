//! Info command implementation.

use chatvault_archive::ArchiveReader;
use chatvault_core::layout::EntryKind;
use chatvault_core::read_version;
use serde::Serialize;
use std::path::Path;

/// Archive summary.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Archive path.
    pub path: String,
    /// Whether entries are sealed.
    pub encrypted: bool,
    /// Declared format version.
    pub format_version: u32,
    /// Every entry.
    pub entries: Vec<EntryInfo>,
}

/// One archive entry.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Entry name.
    pub name: String,
    /// What the entry holds.
    pub kind: &'static str,
    /// Stored payload size in bytes.
    pub size: u64,
    /// Size inside the container in bytes.
    pub compressed_size: u64,
}

/// Runs the info command.
pub fn run(input: &Path, password: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(input, password)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn inspect(input: &Path, password: Option<&str>) -> Result<InfoResult, Box<dyn std::error::Error>> {
    let mut archive = ArchiveReader::open(input, password)?;
    let version = read_version(&mut archive)?;
    let entries = archive
        .entries()
        .iter()
        .map(|entry| EntryInfo {
            name: entry.name.clone(),
            kind: kind_label(&EntryKind::classify(&entry.name)),
            size: entry.size,
            compressed_size: entry.compressed_size,
        })
        .collect();

    Ok(InfoResult {
        path: input.display().to_string(),
        encrypted: archive.is_encrypted(),
        format_version: version.as_u32(),
        entries,
    })
}

fn kind_label(kind: &EntryKind) -> &'static str {
    match kind {
        EntryKind::Settings => "settings",
        EntryKind::Identity => "identity",
        EntryKind::Contacts => "contacts",
        EntryKind::Groups => "groups",
        EntryKind::DistributionLists => "distribution lists",
        EntryKind::Ballots => "ballots",
        EntryKind::BallotChoices => "ballot choices",
        EntryKind::BallotVotes => "ballot votes",
        EntryKind::Nonces => "nonces",
        EntryKind::Reactions => "reactions",
        EntryKind::ContactMessages(_) => "contact messages",
        EntryKind::GroupMessages(_) => "group messages",
        EntryKind::DistributionListMessages(_) => "distribution list messages",
        EntryKind::OwnProfilePicture => "own profile picture",
        EntryKind::ContactAvatar(_) => "contact avatar",
        EntryKind::ContactProfilePicture(_) => "contact profile picture",
        EntryKind::GroupAvatar(_) => "group avatar",
        EntryKind::MessageMedia(_) => "message media",
        EntryKind::MessageThumbnail(_) => "message thumbnail",
        EntryKind::Unknown => "unknown",
    }
}

fn print_text(result: &InfoResult) {
    println!("Backup Information");
    println!("==================");
    println!("  Path: {}", result.path);
    println!("  Encrypted: {}", result.encrypted);
    println!("  Format version: {}", result.format_version);
    println!("  Entries: {}", result.entries.len());
    println!();
    for entry in &result.entries {
        println!(
            "  {:<48} {:<28} {:>10} bytes",
            entry.name, entry.kind, entry.size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatvault_archive::ArchiveWriter;

    #[test]
    fn lists_entries_with_kinds() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("backup.zip");
        let mut writer = ArchiveWriter::create(&path, Some("pw")).unwrap();
        writer
            .add_entry("settings.csv", &mut &b"version\n22\n"[..], true)
            .unwrap();
        writer
            .add_entry("group_avatar_abc", &mut &b"png"[..], false)
            .unwrap();
        writer.finish().unwrap();

        let info = inspect(&path, Some("pw")).unwrap();
        assert!(info.encrypted);
        assert_eq!(info.format_version, 22);
        let kinds: Vec<_> = info.entries.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&"settings"));
        assert!(kinds.contains(&"group avatar"));
    }

    #[test]
    fn wrong_password_fails() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("backup.zip");
        let mut writer = ArchiveWriter::create(&path, Some("pw")).unwrap();
        writer
            .add_entry("settings.csv", &mut &b"version\n22\n"[..], true)
            .unwrap();
        writer.finish().unwrap();

        assert!(inspect(&path, Some("nope")).is_err());
    }
}
