//! Backup and restore configuration.

/// Entity families included in a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySelection {
    /// The user's identity. An archive without it cannot be restored.
    pub identity: bool,
    /// Contacts and their one-to-one messages.
    pub contacts: bool,
    /// Groups and their messages.
    pub groups: bool,
    /// Distribution lists and their messages.
    pub distribution_lists: bool,
    /// Ballots with choices and votes.
    pub ballots: bool,
}

impl Default for EntitySelection {
    fn default() -> Self {
        Self {
            identity: true,
            contacts: true,
            groups: true,
            distribution_lists: true,
            ballots: true,
        }
    }
}

/// Media files included in a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSelection {
    /// Contact avatars, profile pictures and group avatars.
    pub avatars: bool,
    /// Images and voice messages.
    pub media: bool,
    /// Videos and files.
    pub video_and_files: bool,
    /// Message thumbnails.
    pub thumbnails: bool,
}

impl Default for MediaSelection {
    fn default() -> Self {
        Self {
            avatars: true,
            media: true,
            video_and_files: true,
            thumbnails: true,
        }
    }
}

/// Configuration for creating a backup.
#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    /// Entity families to export.
    pub entities: EntitySelection,
    /// Media files to export.
    pub media: MediaSelection,
    /// Deflate table entries. Blobs are always stored as-is.
    pub compress_tables: bool,
}

impl BackupConfig {
    /// Creates a configuration that exports everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compress_tables: true,
            ..Self::default()
        }
    }

    /// Sets whether contacts and their messages are exported.
    #[must_use]
    pub const fn contacts(mut self, value: bool) -> Self {
        self.entities.contacts = value;
        self
    }

    /// Sets whether groups and their messages are exported.
    #[must_use]
    pub const fn groups(mut self, value: bool) -> Self {
        self.entities.groups = value;
        self
    }

    /// Sets whether distribution lists and their messages are exported.
    #[must_use]
    pub const fn distribution_lists(mut self, value: bool) -> Self {
        self.entities.distribution_lists = value;
        self
    }

    /// Sets whether ballots are exported.
    #[must_use]
    pub const fn ballots(mut self, value: bool) -> Self {
        self.entities.ballots = value;
        self
    }

    /// Sets whether avatars and profile pictures are exported.
    #[must_use]
    pub const fn avatars(mut self, value: bool) -> Self {
        self.media.avatars = value;
        self
    }

    /// Sets whether image and voice media are exported.
    #[must_use]
    pub const fn media(mut self, value: bool) -> Self {
        self.media.media = value;
        self
    }

    /// Sets whether video and file media are exported.
    #[must_use]
    pub const fn video_and_files(mut self, value: bool) -> Self {
        self.media.video_and_files = value;
        self
    }

    /// Sets whether thumbnails are exported.
    #[must_use]
    pub const fn thumbnails(mut self, value: bool) -> Self {
        self.media.thumbnails = value;
        self
    }

    /// Sets whether table entries are compressed.
    #[must_use]
    pub const fn compress_tables(mut self, value: bool) -> Self {
        self.compress_tables = value;
        self
    }
}

/// Configuration for restoring a backup.
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    /// Minimum percentage growth between two progress events.
    pub progress_step: u8,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self { progress_step: 1 }
    }
}

impl RestoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum percentage growth between progress events.
    #[must_use]
    pub const fn progress_step(mut self, step: u8) -> Self {
        self.progress_step = step;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_exports_everything() {
        let config = BackupConfig::new();
        assert!(config.entities.identity);
        assert!(config.entities.ballots);
        assert!(config.media.video_and_files);
        assert!(config.compress_tables);
    }

    #[test]
    fn builder_pattern() {
        let config = BackupConfig::new()
            .groups(false)
            .video_and_files(false)
            .compress_tables(false);

        assert!(!config.entities.groups);
        assert!(config.entities.contacts);
        assert!(!config.media.video_and_files);
        assert!(config.media.media);
        assert!(!config.compress_tables);
    }

    #[test]
    fn restore_defaults() {
        assert_eq!(RestoreConfig::default().progress_step, 1);
        assert_eq!(RestoreConfig::new().progress_step(5).progress_step, 5);
    }
}
