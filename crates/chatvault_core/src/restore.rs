//! Backup restore.
//!
//! ## Algorithm
//!
//! 1. Open the archive and read `settings.csv`; reject unsupported format
//!    versions before any other entry is parsed.
//! 2. Parse the identity row. A missing or broken identity is fatal.
//! 3. **Pass 1** walks every table row and blob exactly like pass 2 does,
//!    but without touching storage, to count the weighted steps.
//!    Canceling here leaves the store untouched.
//! 4. Clear every table the restore repopulates and delete all media.
//! 5. **Pass 2** imports in dependency order: identity, nonces, contacts,
//!    groups, distribution lists, ballots, messages, group avatars,
//!    message media, reactions, contact pictures.
//!
//! Both passes advance the tracker for every row, parsable or not, so the
//! steps applied in pass 2 match the total counted in pass 1. Rows that
//! cannot be restored are logged and counted, never fatal.
//!
//! Canceling during pass 2 stops after the current row; rows already
//! written stay in the store.

use crate::config::RestoreConfig;
use crate::entities::{
    ballot, contact, distribution_list, group, identity, message, nonce, reaction, settings,
    ReadContext,
};
use crate::error::{CoreError, CoreResult, SkipReason};
use crate::layout::{self, EntryKind};
use crate::model::{
    Conversation, DistributionListMember, GroupMember, Identity, Nonce, Reaction, RowId,
};
use crate::progress::{
    CancelToken, Outcome, ProgressSink, ProgressTracker, GROUP_AVATAR_WEIGHT, MEDIA_WEIGHT,
    NONCES_PER_STEP, REACTIONS_PER_STEP, ROW_WEIGHT,
};
use crate::remap::RemapTables;
use crate::rows::{Row, RowReader};
use crate::store::{MediaRef, MediaStore, MessengerStore, Table};
use crate::version::{FieldTag, FormatVersion};
use chatvault_archive::{ArchiveError, ArchiveReader};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a finished restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Format version of the archive.
    pub format_version: u32,
    /// Weighted steps counted in pass 1.
    pub total_steps: u64,
    /// Weighted steps applied in pass 2.
    pub applied_steps: u64,
    /// Contacts restored.
    pub contacts: u64,
    /// Groups restored.
    pub groups: u64,
    /// Group member rows restored.
    pub group_members: u64,
    /// Distribution lists restored.
    pub distribution_lists: u64,
    /// Distribution list member rows restored.
    pub distribution_list_members: u64,
    /// Ballots restored.
    pub ballots: u64,
    /// Ballot choices restored.
    pub ballot_choices: u64,
    /// Ballot votes restored.
    pub ballot_votes: u64,
    /// Messages restored.
    pub messages: u64,
    /// Reactions restored, including those converted from legacy states.
    pub reactions: u64,
    /// Nonces restored.
    pub nonces: u64,
    /// Media files restored.
    pub media_files: u64,
    /// Rows and references dropped.
    pub skipped: u64,
    /// Media messages restored without their media file.
    pub media_missing: u64,
}

/// Restores backup archives into a store and its media.
pub struct RestoreEngine<'a> {
    store: &'a mut dyn MessengerStore,
    media: &'a mut dyn MediaStore,
    config: RestoreConfig,
}

impl<'a> RestoreEngine<'a> {
    /// Creates an engine writing into `store` and `media`.
    pub fn new(
        store: &'a mut dyn MessengerStore,
        media: &'a mut dyn MediaStore,
        config: RestoreConfig,
    ) -> Self {
        Self {
            store,
            media,
            config,
        }
    }

    /// Restores the archive at `path`.
    ///
    /// The sink receives progress during pass 2 and exactly one terminal
    /// event.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ArchiveUnreadable`] if the archive cannot be opened
    /// - [`CoreError::UnsupportedFormatVersion`] for archives of unknown versions
    /// - [`CoreError::IdentityRestoreFailed`] if the identity is unusable
    /// - [`CoreError::Canceled`] if `cancel` was triggered
    ///
    /// The first three happen before any storage call.
    pub fn run(
        &mut self,
        path: &Path,
        password: Option<&str>,
        cancel: CancelToken,
        sink: &dyn ProgressSink,
    ) -> CoreResult<RestoreReport> {
        let result = self.restore(path, password, cancel, sink);
        sink.on_finished(&Outcome::of(&result));
        result
    }

    fn restore(
        &mut self,
        path: &Path,
        password: Option<&str>,
        cancel: CancelToken,
        sink: &dyn ProgressSink,
    ) -> CoreResult<RestoreReport> {
        let started = Instant::now();
        let mut archive = ArchiveReader::open(path, password)?;
        let version = read_version(&mut archive)?;
        let own = read_identity(&mut archive)?;
        info!(path = %path.display(), %version, identity = %own.identity, "restore started");

        let entries: Vec<(String, EntryKind)> = archive
            .entries()
            .iter()
            .map(|e| (e.name.clone(), EntryKind::classify(&e.name)))
            .collect();

        let tracker = ProgressTracker::counting(cancel, sink)
            .with_percent_step(self.config.progress_step);
        let mut importer = Importer {
            store: &mut *self.store,
            media: &mut *self.media,
            tracker,
            version,
            identity: own,
            commit: false,
            remap: RemapTables::new(),
            pending_nonces: Vec::new(),
            media_messages: HashSet::new(),
            media_restored: HashSet::new(),
            report: RestoreReport {
                format_version: version.as_u32(),
                ..RestoreReport::default()
            },
        };

        importer.import(&mut archive, &entries)?;
        let total = importer.tracker.steps();
        info!(total_steps = total, "restore pass 1 finished");

        importer.begin_commit(total)?;
        importer.import(&mut archive, &entries)?;
        importer.finish();

        let report = importer.report;
        info!(
            applied_steps = report.applied_steps,
            messages = report.messages,
            skipped = report.skipped,
            media_missing = report.media_missing,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "restore finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RestoreEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reads the settings entry and checks its format version.
///
/// # Errors
///
/// Returns [`CoreError::InvalidBackup`] if the settings entry is missing or
/// unusable, and [`CoreError::UnsupportedFormatVersion`] for versions this
/// build cannot read.
pub fn read_version(archive: &mut ArchiveReader) -> CoreResult<FormatVersion> {
    let row = first_row(archive, layout::SETTINGS)?
        .ok_or_else(|| CoreError::invalid_backup("settings table is empty"))?;
    let settings = settings::read(&row)
        .map_err(|reason| CoreError::invalid_backup(format!("settings: {reason}")))?;
    FormatVersion::check(settings.version)
}

fn read_identity(archive: &mut ArchiveReader) -> CoreResult<Identity> {
    let row = match first_row(archive, layout::IDENTITY) {
        Ok(Some(row)) => row,
        Ok(None) => return Err(CoreError::identity_failed("identity table is empty")),
        Err(CoreError::InvalidBackup { message }) => return Err(CoreError::identity_failed(message)),
        Err(e) => return Err(e),
    };
    identity::read(&row).map_err(|reason| CoreError::identity_failed(reason.to_string()))
}

fn first_row(archive: &mut ArchiveReader, name: &str) -> CoreResult<Option<Row>> {
    let entry = match archive.read_entry(name) {
        Ok(entry) => entry,
        Err(ArchiveError::EntryNotFound { .. }) => {
            return Err(CoreError::invalid_backup(format!("{name} is missing")))
        }
        Err(e) => return Err(e.into()),
    };
    let mut rows = RowReader::new(entry)
        .map_err(|e| CoreError::invalid_backup(format!("{name}: {e}")))?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(CoreError::invalid_backup(format!("{name}: {e}"))),
        None => Ok(None),
    }
}

/// State of one restore run, shared by both passes.
struct Importer<'r> {
    store: &'r mut dyn MessengerStore,
    media: &'r mut dyn MediaStore,
    tracker: ProgressTracker<'r>,
    version: FormatVersion,
    identity: Identity,
    /// False in pass 1: parse and count only.
    commit: bool,
    remap: RemapTables,
    pending_nonces: Vec<Nonce>,
    media_messages: HashSet<RowId>,
    media_restored: HashSet<RowId>,
    report: RestoreReport,
}

type ApplyRow<'r> = fn(&mut Importer<'r>, Row) -> Result<(), SkipReason>;

impl<'r> Importer<'r> {
    fn ctx(&self) -> ReadContext<'_> {
        ReadContext {
            version: self.version,
            own_identity: &self.identity.identity,
            remap: &self.remap,
        }
    }

    fn has(&self, tag: FieldTag) -> bool {
        self.version.has(tag)
    }

    /// Ends pass 1: clears storage and switches to committing.
    fn begin_commit(&mut self, total: u64) -> CoreResult<()> {
        self.tracker.cancel_token().check()?;
        for table in Table::ALL {
            self.store.clear(table)?;
        }
        self.media.delete_all()?;
        info!("storage cleared");
        self.commit = true;
        self.tracker.start_reporting(total);
        self.report.total_steps = total;
        Ok(())
    }

    fn finish(&mut self) {
        for id in self.media_messages.difference(&self.media_restored) {
            warn!(message = %id, "media file missing");
            self.report.media_missing += 1;
        }
        self.report.applied_steps = self.tracker.steps();
    }

    fn skip(&mut self, table: &str, reason: SkipReason) {
        if self.commit {
            warn!(table, %reason, "row skipped");
            self.report.skipped += 1;
        }
    }

    fn import(&mut self, archive: &mut ArchiveReader, entries: &[(String, EntryKind)]) -> CoreResult<()> {
        self.import_identity()?;
        if self.has(FieldTag::Nonces) {
            self.table(archive, layout::NONCES, NONCES_PER_STEP, Self::apply_nonce)?;
            self.flush_nonces();
        }
        self.table(archive, layout::CONTACTS, 1, Self::apply_contact)?;
        self.table(archive, layout::GROUPS, 1, Self::apply_group)?;
        if self.has(FieldTag::DistributionLists) {
            self.table(archive, layout::DISTRIBUTION_LISTS, 1, Self::apply_list)?;
        }
        if self.has(FieldTag::Ballots) {
            self.table(archive, layout::BALLOTS, 1, Self::apply_ballot)?;
            self.table(archive, layout::BALLOT_CHOICES, 1, Self::apply_choice)?;
            self.table(archive, layout::BALLOT_VOTES, 1, Self::apply_vote)?;
        }

        for (name, kind) in entries {
            let conversation = match kind {
                EntryKind::ContactMessages(id) => self
                    .remap
                    .identities
                    .resolve(id)
                    .map(|identity| Conversation::Contact(identity.clone())),
                EntryKind::GroupMessages(uid) => {
                    self.remap.groups.resolve(uid).map(|id| Conversation::Group(*id))
                }
                EntryKind::DistributionListMessages(uid) if self.has(FieldTag::DistributionLists) => {
                    self.remap
                        .distribution_lists
                        .resolve(uid)
                        .map(|id| Conversation::DistributionList(*id))
                }
                _ => continue,
            };
            self.messages(archive, name, conversation)?;
        }

        for (name, kind) in entries {
            if let EntryKind::GroupAvatar(uid) = kind {
                let target = self.remap.groups.resolve(uid).map(|id| MediaRef::GroupAvatar(*id));
                self.blob(archive, name, GROUP_AVATAR_WEIGHT, target)?;
            }
        }
        for (name, kind) in entries {
            let target = match kind {
                EntryKind::MessageMedia(uid) => {
                    self.remap.messages.resolve(uid).map(|id| MediaRef::MessageMedia(*id))
                }
                EntryKind::MessageThumbnail(uid) => self
                    .remap
                    .messages
                    .resolve(uid)
                    .map(|id| MediaRef::MessageThumbnail(*id)),
                _ => continue,
            };
            self.blob(archive, name, MEDIA_WEIGHT, target)?;
        }

        if self.has(FieldTag::Reactions) {
            self.table(archive, layout::REACTIONS, REACTIONS_PER_STEP, Self::apply_reaction)?;
        }

        for (name, kind) in entries {
            let target = match kind {
                EntryKind::ContactAvatar(id) => self
                    .remap
                    .identities
                    .resolve(id)
                    .map(|identity| MediaRef::ContactAvatar(identity.clone())),
                EntryKind::ContactProfilePicture(id) => self
                    .remap
                    .identities
                    .resolve(id)
                    .map(|identity| MediaRef::ContactProfilePicture(identity.clone())),
                EntryKind::OwnProfilePicture => Ok(MediaRef::OwnProfilePicture),
                _ => continue,
            };
            self.blob(archive, name, MEDIA_WEIGHT, target)?;
        }
        Ok(())
    }

    fn import_identity(&mut self) -> CoreResult<()> {
        if self.commit {
            self.store
                .save_identity(&self.identity)
                .map_err(|e| CoreError::identity_failed(e.to_string()))?;
        }
        self.tracker.advance(ROW_WEIGHT)
    }

    /// Feeds every row of table `name` to `apply`, advancing once per
    /// `per_step` rows. An absent table is empty; an unreadable one is
    /// abandoned with a warning.
    fn table(
        &mut self,
        archive: &mut ArchiveReader,
        name: &str,
        per_step: u64,
        apply: ApplyRow<'r>,
    ) -> CoreResult<()> {
        let entry = match archive.read_entry(name) {
            Ok(entry) => entry,
            Err(ArchiveError::EntryNotFound { .. }) => return Ok(()),
            Err(e) => {
                self.abandon(name, &e);
                return Ok(());
            }
        };
        let rows = match RowReader::new(entry) {
            Ok(rows) => rows,
            Err(e) => {
                self.abandon(name, &e);
                return Ok(());
            }
        };
        for (index, row) in rows.enumerate() {
            match row {
                Ok(row) => {
                    if let Err(reason) = apply(self, row) {
                        self.skip(name, reason);
                    }
                }
                Err(e) if e.is_io_error() => {
                    self.abandon(name, &e);
                    return Ok(());
                }
                Err(e) => self.skip(
                    name,
                    SkipReason::Rejected(format!("unparsable row: {e}")),
                ),
            }
            self.tracker.advance_batched(index as u64, per_step)?;
        }
        debug!(table = name, commit = self.commit, "table imported");
        Ok(())
    }

    fn abandon(&self, name: &str, error: &dyn std::fmt::Display) {
        if self.commit {
            warn!(table = name, %error, "table unreadable, remaining rows skipped");
        }
    }

    fn blob(
        &mut self,
        archive: &mut ArchiveReader,
        name: &str,
        weight: u64,
        target: Result<MediaRef, SkipReason>,
    ) -> CoreResult<()> {
        if self.commit {
            match target {
                Ok(media) => match archive.read_entry(name) {
                    Ok(mut reader) => match self.media.write(&media, &mut reader) {
                        Ok(bytes) => {
                            debug!(entry = name, bytes, "media restored");
                            self.report.media_files += 1;
                            if let MediaRef::MessageMedia(id) = media {
                                self.media_restored.insert(id);
                            }
                        }
                        Err(e) => self.skip(name, e.into()),
                    },
                    Err(e) => self.skip(name, SkipReason::Rejected(e.to_string())),
                },
                Err(reason) => self.skip(name, reason),
            }
        }
        self.tracker.advance(weight)
    }

    fn messages(
        &mut self,
        archive: &mut ArchiveReader,
        name: &str,
        conversation: Result<Conversation, SkipReason>,
    ) -> CoreResult<()> {
        match conversation {
            Ok(conversation) => {
                let entry = match archive.read_entry(name) {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.abandon(name, &e);
                        return Ok(());
                    }
                };
                let rows = match RowReader::new(entry) {
                    Ok(rows) => rows,
                    Err(e) => {
                        self.abandon(name, &e);
                        return Ok(());
                    }
                };
                for row in rows {
                    match row {
                        Ok(row) => {
                            if let Err(reason) = self.apply_message(row, &conversation) {
                                self.skip(name, reason);
                            }
                        }
                        Err(e) if e.is_io_error() => {
                            self.abandon(name, &e);
                            return Ok(());
                        }
                        Err(e) => self.skip(name, SkipReason::Rejected(format!("unparsable row: {e}"))),
                    }
                    self.tracker.advance(ROW_WEIGHT)?;
                }
                Ok(())
            }
            Err(reason) => {
                if self.commit {
                    warn!(table = name, %reason, "conversation not restored, its messages are skipped");
                }
                self.count_orphaned(archive, name)
            }
        }
    }

    /// Advances over the rows of a table whose parent is missing.
    fn count_orphaned(&mut self, archive: &mut ArchiveReader, name: &str) -> CoreResult<()> {
        let Ok(entry) = archive.read_entry(name) else {
            return Ok(());
        };
        let Ok(rows) = RowReader::new(entry) else {
            return Ok(());
        };
        for row in rows {
            if matches!(&row, Err(e) if e.is_io_error()) {
                return Ok(());
            }
            if self.commit {
                self.report.skipped += 1;
            }
            self.tracker.advance(ROW_WEIGHT)?;
        }
        Ok(())
    }

    fn apply_nonce(&mut self, row: Row) -> Result<(), SkipReason> {
        let nonce = nonce::read(&row, &self.ctx())?;
        if self.commit {
            self.pending_nonces.push(nonce);
            if self.pending_nonces.len() as u64 >= NONCES_PER_STEP {
                self.flush_nonces();
            }
        }
        Ok(())
    }

    fn flush_nonces(&mut self) {
        if self.pending_nonces.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending_nonces);
        match self.store.create_nonces(&batch) {
            Ok(()) => self.report.nonces += batch.len() as u64,
            Err(e) => {
                warn!(count = batch.len(), error = %e, "nonce batch skipped");
                self.report.skipped += batch.len() as u64;
            }
        }
    }

    fn apply_contact(&mut self, row: Row) -> Result<(), SkipReason> {
        let record = contact::read(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        if self.remap.identities.contains(&record.identity_id) {
            return Err(SkipReason::Rejected(format!(
                "duplicate identity id {}",
                record.identity_id
            )));
        }
        if !self.store.create_contact(&record.contact)? {
            return Err(SkipReason::Rejected(format!(
                "duplicate contact {}",
                record.contact.identity
            )));
        }
        let identity = record.contact.identity;
        self.remap.identities.insert(record.identity_id, identity.clone());
        self.remap.contacts.insert(identity);
        self.report.contacts += 1;
        Ok(())
    }

    fn apply_group(&mut self, row: Row) -> Result<(), SkipReason> {
        let record = group::read(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        if self.remap.groups.contains(&record.uid) {
            return Err(SkipReason::Rejected(format!("duplicate group uid {}", record.uid)));
        }
        let group_id = self.store.create_group(&record.group)?;
        self.remap.groups.insert(record.uid, group_id);
        self.report.groups += 1;

        for identity in record.members {
            if let Err(reason) = self.remap.contact(&identity) {
                self.skip(layout::GROUPS, reason);
                continue;
            }
            match self.store.create_group_member(&GroupMember { group_id, identity }) {
                Ok(()) => self.report.group_members += 1,
                Err(e) => self.skip(layout::GROUPS, e.into()),
            }
        }
        Ok(())
    }

    fn apply_list(&mut self, row: Row) -> Result<(), SkipReason> {
        let ctx = self.ctx();
        let record = distribution_list::read(&row, &ctx)?;
        let (members, unresolved) = record.resolve_members(&ctx);
        if !self.commit {
            return Ok(());
        }
        if self.remap.distribution_lists.contains(&record.uid) {
            return Err(SkipReason::Rejected(format!("duplicate list uid {}", record.uid)));
        }
        let list_id = self.store.create_distribution_list(&record.list)?;
        self.remap.distribution_lists.insert(record.uid, list_id);
        self.report.distribution_lists += 1;

        for reason in unresolved {
            self.skip(layout::DISTRIBUTION_LISTS, reason);
        }
        for identity in members {
            let member = DistributionListMember { list_id, identity };
            match self.store.create_distribution_list_member(&member) {
                Ok(()) => self.report.distribution_list_members += 1,
                Err(e) => self.skip(layout::DISTRIBUTION_LISTS, e.into()),
            }
        }
        Ok(())
    }

    fn apply_ballot(&mut self, row: Row) -> Result<(), SkipReason> {
        let resolved = ballot::read(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        if self.remap.ballots.contains(&resolved.uid) {
            return Err(SkipReason::Rejected(format!("duplicate ballot uid {}", resolved.uid)));
        }
        let ballot_id = self.store.create_ballot(&resolved.ballot)?;
        // An unlinked ballot is unreachable; its choices and votes then
        // fail to resolve and are skipped too.
        self.store.create_ballot_link(&crate::model::BallotLink {
            ballot_id,
            target: resolved.target,
        })?;
        self.remap.ballots.insert(resolved.uid, ballot_id);
        self.report.ballots += 1;
        Ok(())
    }

    fn apply_choice(&mut self, row: Row) -> Result<(), SkipReason> {
        let (uid, choice) = ballot::read_choice(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        if self.remap.ballot_choices.contains(&uid) {
            return Err(SkipReason::Rejected(format!("duplicate choice uid {uid}")));
        }
        let choice_id = self.store.create_ballot_choice(&choice)?;
        self.remap.ballot_choices.insert(uid, (choice.ballot_id, choice_id));
        self.report.ballot_choices += 1;
        Ok(())
    }

    fn apply_vote(&mut self, row: Row) -> Result<(), SkipReason> {
        let vote = ballot::read_vote(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        self.store.create_ballot_vote(&vote)?;
        self.report.ballot_votes += 1;
        Ok(())
    }

    fn apply_message(&mut self, row: Row, conversation: &Conversation) -> Result<(), SkipReason> {
        let restored = message::read(&row, &self.ctx(), conversation)?;
        if !self.commit {
            return Ok(());
        }
        if self.remap.messages.contains(&restored.uid) {
            return Err(SkipReason::Rejected(format!("duplicate message uid {}", restored.uid)));
        }
        let message_id = self.store.create_message(conversation, &restored.message)?;
        self.remap.messages.insert(restored.uid, message_id);
        self.report.messages += 1;
        if restored.message.kind.has_media() {
            self.media_messages.insert(message_id);
        }

        if let Some(pending) = restored.legacy_reaction {
            let reaction = Reaction {
                message_id,
                sender: pending.sender,
                emoji: pending.emoji,
                reacted_at: pending.reacted_at,
            };
            match self.store.create_reaction(&reaction) {
                Ok(()) => self.report.reactions += 1,
                Err(e) => self.skip(layout::REACTIONS, e.into()),
            }
        }
        Ok(())
    }

    fn apply_reaction(&mut self, row: Row) -> Result<(), SkipReason> {
        let reaction = reaction::read(&row, &self.ctx())?;
        if !self.commit {
            return Ok(());
        }
        self.store.create_reaction(&reaction)?;
        self.report.reactions += 1;
        Ok(())
    }
}
