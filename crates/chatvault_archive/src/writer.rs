//! Streaming archive writer.

use crate::error::{from_zip_write, ArchiveError, ArchiveResult};
use crate::key::ArchiveKey;
use crate::sealed::SealingWriter;
use crate::{ENCRYPTION_ENTRY, ENCRYPTION_MAGIC, INCOMPLETE_SUFFIX, PASSWORD_CHECK};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

type Container = ZipWriter<BufWriter<File>>;

/// Writes a backup archive entry by entry.
///
/// The archive is written to `<path>.incomplete` and only renamed to `path`
/// by [`finish`](Self::finish). Dropping an unfinished writer removes the
/// incomplete file, so a crash or cancellation never leaves a truncated
/// archive under the final name.
pub struct ArchiveWriter {
    zip: Option<Container>,
    key: Option<ArchiveKey>,
    names: HashSet<String>,
    temp_path: PathBuf,
    final_path: PathBuf,
    finished: bool,
}

impl ArchiveWriter {
    /// Creates a new archive at `path`, sealed with `password` if given.
    pub fn create(path: &Path, password: Option<&str>) -> ArchiveResult<Self> {
        let temp_path = incomplete_path(path);
        let file = File::create(&temp_path)?;
        let mut writer = Self {
            zip: Some(ZipWriter::new(BufWriter::new(file))),
            key: None,
            names: HashSet::new(),
            temp_path,
            final_path: path.to_path_buf(),
            finished: false,
        };

        if let Some(password) = password {
            let salt = ArchiveKey::generate_salt();
            let key = ArchiveKey::derive(password.as_bytes(), &salt)?;
            let check = crate::key::ChunkCipher::new(&key).seal(PASSWORD_CHECK, ENCRYPTION_ENTRY.as_bytes())?;

            let mut header = Vec::with_capacity(ENCRYPTION_MAGIC.len() + salt.len() + check.len());
            header.extend_from_slice(ENCRYPTION_MAGIC);
            header.extend_from_slice(&salt);
            header.extend_from_slice(&check);

            let zip = writer.container()?;
            zip.start_file(ENCRYPTION_ENTRY, options(false))
                .map_err(from_zip_write)?;
            zip.write_all(&header)?;
            writer.key = Some(key);
        }

        debug!(path = %writer.temp_path.display(), sealed = writer.key.is_some(), "Archive created");
        Ok(writer)
    }

    /// Returns true if entries are sealed with a password-derived key.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Returns the path the archive is written to until it is finished.
    #[must_use]
    pub fn incomplete_path(&self) -> &Path {
        &self.temp_path
    }

    /// Starts a new entry and returns a writer streaming into it.
    ///
    /// The returned [`EntryWriter`] must be finished before the next entry
    /// is started.
    pub fn entry_writer(&mut self, name: &str, compress: bool) -> ArchiveResult<EntryWriter<'_>> {
        validate_name(name)?;
        if !self.names.insert(name.to_string()) {
            return Err(ArchiveError::DuplicateEntry {
                name: name.to_string(),
            });
        }

        let key = self.key.clone();
        let zip = self.container()?;
        zip.start_file(name, options(compress))
            .map_err(from_zip_write)?;

        let sink = match key {
            Some(key) => EntrySink::Sealed(SealingWriter::new(zip, &key, name)),
            None => EntrySink::Plain(zip),
        };
        Ok(EntryWriter { sink, written: 0 })
    }

    /// Copies `data` into a new entry. Returns the number of plaintext bytes.
    pub fn add_entry(&mut self, name: &str, data: &mut dyn Read, compress: bool) -> ArchiveResult<u64> {
        let mut entry = self.entry_writer(name, compress)?;
        io::copy(data, &mut entry)?;
        entry.finish()
    }

    /// Finalizes the container and publishes it under its final name.
    pub fn finish(mut self) -> ArchiveResult<PathBuf> {
        let mut zip = self
            .zip
            .take()
            .ok_or_else(|| ArchiveError::Io(io::Error::new(io::ErrorKind::Other, "archive already closed")))?;
        let buffered = zip.finish().map_err(from_zip_write)?;
        let file = buffered
            .into_inner()
            .map_err(|e| ArchiveError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)?;
        sync_parent(&self.final_path)?;
        self.finished = true;

        debug!(path = %self.final_path.display(), entries = self.names.len(), "Archive published");
        Ok(self.final_path.clone())
    }

    fn container(&mut self) -> ArchiveResult<&mut Container> {
        self.zip
            .as_mut()
            .ok_or_else(|| ArchiveError::Io(io::Error::new(io::ErrorKind::Other, "archive already closed")))
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.zip.take());
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.temp_path.display(), error = %e, "Failed to remove incomplete archive");
            }
        }
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("path", &self.final_path)
            .field("entries", &self.names.len())
            .field("encrypted", &self.key.is_some())
            .finish()
    }
}

enum EntrySink<'a> {
    Plain(&'a mut Container),
    Sealed(SealingWriter<&'a mut Container>),
}

/// Streams the payload of a single entry.
pub struct EntryWriter<'a> {
    sink: EntrySink<'a>,
    written: u64,
}

impl EntryWriter<'_> {
    /// Completes the entry. Returns the number of plaintext bytes written.
    pub fn finish(self) -> ArchiveResult<u64> {
        match self.sink {
            EntrySink::Plain(zip) => zip.flush()?,
            EntrySink::Sealed(sealer) => {
                sealer.finish()?;
            }
        }
        Ok(self.written)
    }
}

impl Write for EntryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match &mut self.sink {
            EntrySink::Plain(zip) => zip.write(buf)?,
            EntrySink::Sealed(sealer) => sealer.write(buf)?,
        };
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            EntrySink::Plain(zip) => zip.flush(),
            EntrySink::Sealed(sealer) => sealer.flush(),
        }
    }
}

fn options(compress: bool) -> FileOptions {
    let method = if compress {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    FileOptions::default()
        .compression_method(method)
        .large_file(true)
}

fn validate_name(name: &str) -> ArchiveResult<()> {
    if name.is_empty() || !name.is_ascii() || name == ENCRYPTION_ENTRY {
        return Err(ArchiveError::InvalidEntryName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Returns the in-progress path for an archive that will be published at
/// `path`.
#[must_use]
pub fn incomplete_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(INCOMPLETE_SUFFIX);
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> ArchiveResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> ArchiveResult<()> {
    Ok(())
}
