//! Archive reader.

use crate::error::{from_zip_read, ArchiveError, ArchiveResult};
use crate::key::{ArchiveKey, ChunkCipher, SALT_SIZE};
use crate::sealed::OpeningReader;
use crate::{ENCRYPTION_ENTRY, ENCRYPTION_MAGIC, PASSWORD_CHECK};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;
use zip::read::ZipFile;
use zip::{CompressionMethod, ZipArchive};

/// Description of one entry in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Entry name.
    pub name: String,
    /// Stored payload size (sealed size for encrypted archives).
    pub size: u64,
    /// Size inside the container after compression.
    pub compressed_size: u64,
    /// Whether the entry is deflate-compressed.
    pub compressed: bool,
}

/// Reads entries from a backup archive.
pub struct ArchiveReader {
    zip: ZipArchive<BufReader<File>>,
    key: Option<ArchiveKey>,
    entries: Vec<EntryHeader>,
}

impl ArchiveReader {
    /// Opens an archive.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Unreadable`] if the container is corrupted,
    /// the archive is sealed and no password was given, or the password is
    /// wrong.
    pub fn open(path: &Path, password: Option<&str>) -> ArchiveResult<Self> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(from_zip_read)?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut sealed = false;
        for i in 0..zip.len() {
            let entry = zip.by_index(i).map_err(from_zip_read)?;
            if entry.name() == ENCRYPTION_ENTRY {
                sealed = true;
                continue;
            }
            entries.push(EntryHeader {
                name: entry.name().to_string(),
                size: entry.size(),
                compressed_size: entry.compressed_size(),
                compressed: entry.compression() != CompressionMethod::Stored,
            });
        }

        let key = if sealed {
            let password =
                password.ok_or_else(|| ArchiveError::unreadable("archive is password protected"))?;
            Some(unlock(&mut zip, password)?)
        } else {
            None
        };

        debug!(path = %path.display(), entries = entries.len(), sealed, "Archive opened");
        Ok(Self { zip, key, entries })
    }

    /// Returns the headers of all entries, in container order.
    #[must_use]
    pub fn entries(&self) -> &[EntryHeader] {
        &self.entries
    }

    /// Returns true if the archive has an entry called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Returns true if the archive is password protected.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Opens the payload of the entry called `name`.
    ///
    /// Decryption failures surface as `InvalidData` I/O errors while
    /// reading.
    pub fn read_entry(&mut self, name: &str) -> ArchiveResult<EntryReader<'_>> {
        if name == ENCRYPTION_ENTRY || !self.contains(name) {
            return Err(ArchiveError::entry_not_found(name));
        }
        let file = self.zip.by_name(name).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ArchiveError::entry_not_found(name),
            other => from_zip_read(other),
        })?;
        let stream = match &self.key {
            Some(key) => EntryStream::Sealed(OpeningReader::new(file, key, name)),
            None => EntryStream::Plain(file),
        };
        Ok(EntryReader { stream })
    }

    /// Reads the whole payload of `name` into memory.
    pub fn read_to_vec(&mut self, name: &str) -> ArchiveResult<Vec<u8>> {
        let mut reader = self.read_entry(name)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                ArchiveError::unreadable(e.to_string())
            } else {
                ArchiveError::Io(e)
            }
        })?;
        Ok(data)
    }
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.entries.len())
            .field("encrypted", &self.key.is_some())
            .finish()
    }
}

fn unlock(zip: &mut ZipArchive<BufReader<File>>, password: &str) -> ArchiveResult<ArchiveKey> {
    let mut header = Vec::new();
    zip.by_name(ENCRYPTION_ENTRY)
        .map_err(from_zip_read)?
        .read_to_end(&mut header)
        .map_err(|e| ArchiveError::unreadable(e.to_string()))?;

    let magic_len = ENCRYPTION_MAGIC.len();
    if header.len() < magic_len + SALT_SIZE || &header[..magic_len] != ENCRYPTION_MAGIC {
        return Err(ArchiveError::unreadable("invalid encryption header"));
    }
    let salt = &header[magic_len..magic_len + SALT_SIZE];
    let key = ArchiveKey::derive(password.as_bytes(), salt)?;

    let check = ChunkCipher::new(&key)
        .open(&header[magic_len + SALT_SIZE..], ENCRYPTION_ENTRY.as_bytes())
        .map_err(|_| ArchiveError::unreadable("wrong password"))?;
    if check != PASSWORD_CHECK {
        return Err(ArchiveError::unreadable("wrong password"));
    }
    Ok(key)
}

enum EntryStream<'a> {
    Plain(ZipFile<'a>),
    Sealed(OpeningReader<ZipFile<'a>>),
}

/// Streaming reader over one entry's plaintext.
pub struct EntryReader<'a> {
    stream: EntryStream<'a>,
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            EntryStream::Plain(file) => file.read(buf),
            EntryStream::Sealed(reader) => reader.read(buf),
        }
    }
}
