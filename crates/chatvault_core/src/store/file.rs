//! Media files stored in a directory tree.

use super::{MediaRef, MediaStore, StoreError, StoreResult};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

/// Media store keeping one file per [`MediaRef`] under a root directory.
#[derive(Debug)]
pub struct FileMediaStore {
    root: PathBuf,
}

impl FileMediaStore {
    /// Opens (and creates if needed) a media directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a reference to its file under the root.
    ///
    /// Identities name a single file, so any identity that is empty, holds a
    /// separator or walks out of its directory is refused.
    fn path_of(&self, media: &MediaRef) -> StoreResult<PathBuf> {
        if let MediaRef::ContactAvatar(identity) | MediaRef::ContactProfilePicture(identity) = media
        {
            if !is_plain_file_name(identity) {
                return Err(StoreError::InvalidReference(format!("{media:?}")));
            }
        }
        Ok(self.root.join(media.relative_path()))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) || name.contains("..") {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

fn copy_synced(data: &mut dyn Read, path: &Path) -> io::Result<u64> {
    let mut file = File::create(path)?;
    let written = io::copy(data, &mut file)?;
    file.sync_all()?;
    Ok(written)
}

impl MediaStore for FileMediaStore {
    /// Streams into a `.partial` sibling and renames it into place once the
    /// source is exhausted, so a failing source never leaves a truncated
    /// file behind.
    fn write(&mut self, media: &MediaRef, data: &mut dyn Read) -> StoreResult<u64> {
        let path = self.path_of(media)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = partial_path(&path);
        let written = match copy_synced(data, &temp_path) {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    warn!(path = %temp_path.display(), error = %cleanup, "partial media file not removed");
                }
                return Err(e.into());
            }
        };
        fs::rename(&temp_path, &path)?;
        debug!(path = %path.display(), bytes = written, "media written");
        Ok(written)
    }

    fn read(&self, media: &MediaRef) -> StoreResult<Option<Box<dyn Read + '_>>> {
        match File::open(self.path_of(media)?) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_all(&mut self) -> StoreResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn contains(&self, media: &MediaRef) -> StoreResult<bool> {
        Ok(self.path_of(media)?.is_file())
    }
}
