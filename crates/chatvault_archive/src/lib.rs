//! # chatvault archive
//!
//! Container format for chatvault backups.
//!
//! An archive is a zip container of named entries. Table entries are
//! deflate-compressed text, blob entries are stored raw. When a password is
//! given, every entry payload is sealed in 64 KiB chunks with AES-256-GCM
//! under a key derived from the password and a random per-archive salt.
//!
//! ## Design Principles
//!
//! - Entries are streamed: neither side holds the whole archive in memory
//! - An archive only appears under its final name once fully written
//! - Wrong password and corrupted container are one error kind,
//!   [`ArchiveError::Unreadable`], distinct from a missing entry
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatvault_archive::{ArchiveReader, ArchiveWriter};
//! use std::io::Read;
//! use std::path::Path;
//!
//! let path = Path::new("backup.zip");
//! let mut writer = ArchiveWriter::create(path, Some("secret")).unwrap();
//! writer.add_entry("settings.csv", &mut &b"version\n22\n"[..], true).unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = ArchiveReader::open(path, Some("secret")).unwrap();
//! let mut text = String::new();
//! reader.read_entry("settings.csv").unwrap().read_to_string(&mut text).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod reader;
mod sealed;
mod writer;

pub use error::{ArchiveError, ArchiveResult};
pub use key::{ArchiveKey, KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
pub use reader::{ArchiveReader, EntryHeader, EntryReader};
pub use sealed::CHUNK_SIZE;
pub use writer::{incomplete_path, ArchiveWriter, EntryWriter};

/// Suffix appended to the file name while an archive is being written.
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

/// Reserved entry holding the salt and password check of sealed archives.
pub const ENCRYPTION_ENTRY: &str = "encryption";

const ENCRYPTION_MAGIC: &[u8] = b"CVENC2";
const PASSWORD_CHECK: &[u8] = b"chatvault-password-check";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn read_string(reader: &mut ArchiveReader, name: &str) -> String {
        let mut out = String::new();
        reader
            .read_entry(name)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    fn write_sample(path: &std::path::Path, password: Option<&str>) {
        let mut writer = ArchiveWriter::create(path, password).unwrap();
        writer
            .add_entry("settings.csv", &mut &b"version,created_at\n22,0\n"[..], true)
            .unwrap();
        let media = vec![0x5Au8; CHUNK_SIZE + 1000];
        writer
            .add_entry("message_media_abc", &mut media.as_slice(), false)
            .unwrap();
        let mut entry = writer.entry_writer("contacts.csv", true).unwrap();
        entry.write_all(b"identity\nECHOECHO\n").unwrap();
        entry.finish().unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn plain_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");
        write_sample(&path, None);

        let mut reader = ArchiveReader::open(&path, None).unwrap();
        assert!(!reader.is_encrypted());
        let names: Vec<_> = reader.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["settings.csv", "message_media_abc", "contacts.csv"]);
        assert!(reader.entries()[0].compressed);
        assert!(!reader.entries()[1].compressed);

        assert_eq!(read_string(&mut reader, "contacts.csv"), "identity\nECHOECHO\n");
        assert_eq!(reader.read_to_vec("message_media_abc").unwrap().len(), CHUNK_SIZE + 1000);
    }

    #[test]
    fn sealed_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");
        write_sample(&path, Some("correct horse"));

        let mut reader = ArchiveReader::open(&path, Some("correct horse")).unwrap();
        assert!(reader.is_encrypted());
        assert!(!reader.contains(ENCRYPTION_ENTRY));
        assert_eq!(read_string(&mut reader, "settings.csv"), "version,created_at\n22,0\n");
        let media = reader.read_to_vec("message_media_abc").unwrap();
        assert!(media.iter().all(|b| *b == 0x5A));
    }

    #[test]
    fn wrong_or_missing_password_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");
        write_sample(&path, Some("right"));

        let err = ArchiveReader::open(&path, Some("wrong")).unwrap_err();
        assert!(err.is_unreadable());
        let err = ArchiveReader::open(&path, None).unwrap_err();
        assert!(err.is_unreadable());
    }

    #[test]
    fn corrupted_container_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.zip");
        std::fs::write(&path, b"this is not a zip container at all").unwrap();

        let err = ArchiveReader::open(&path, None).unwrap_err();
        assert!(err.is_unreadable());
    }

    #[test]
    fn missing_entry_is_distinct() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");
        write_sample(&path, None);

        let mut reader = ArchiveReader::open(&path, None).unwrap();
        let err = reader.read_entry("ballots.csv").err().unwrap();
        assert!(matches!(err, ArchiveError::EntryNotFound { .. }));
        assert!(!err.is_unreadable());
    }

    #[test]
    fn duplicate_and_reserved_names_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");
        let mut writer = ArchiveWriter::create(&path, None).unwrap();
        writer.add_entry("a.csv", &mut &b"x"[..], true).unwrap();

        let err = writer.add_entry("a.csv", &mut &b"y"[..], true).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateEntry { .. }));
        let err = writer.add_entry(ENCRYPTION_ENTRY, &mut &b"y"[..], true).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidEntryName { .. }));
        let err = writer.add_entry("", &mut &b"y"[..], true).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidEntryName { .. }));
    }

    #[test]
    fn incomplete_file_until_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");

        let mut writer = ArchiveWriter::create(&path, None).unwrap();
        writer.add_entry("a.csv", &mut &b"x"[..], true).unwrap();
        assert!(writer.incomplete_path().exists());
        assert!(writer.incomplete_path().to_string_lossy().ends_with(INCOMPLETE_SUFFIX));
        assert!(!path.exists());

        writer.finish().unwrap();
        assert!(path.exists());
        assert!(!incomplete_path(&path).exists());
    }

    #[test]
    fn dropped_writer_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.zip");

        {
            let mut writer = ArchiveWriter::create(&path, Some("pw")).unwrap();
            writer.add_entry("a.csv", &mut &b"x"[..], true).unwrap();
        }

        assert!(!path.exists());
        assert!(!incomplete_path(&path).exists());
    }
}
