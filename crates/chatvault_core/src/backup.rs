//! Backup creation.
//!
//! A backup run first snapshots the selected rows from the store and mints
//! a random uid for every entity that others refer to. Knowing every row
//! and blob up front gives the exact number of weighted steps, so progress
//! is reported against a fixed total. Rows are then streamed into table
//! entries and media files into blob entries.
//!
//! The archive is written under a temporary name and only renamed to its
//! final path once complete. A canceled or failed run leaves nothing
//! behind.

use crate::config::BackupConfig;
use crate::entities::ballot::{self, BallotRecord, BallotRef, ChoiceRecord, VoteRecord};
use crate::entities::contact::{self, ContactRecord};
use crate::entities::distribution_list::{self, DistributionListRecord};
use crate::entities::group::{self, GroupRecord};
use crate::entities::message::{self, MessageRecord};
use crate::entities::reaction::{self, ReactionRecord};
use crate::entities::settings::{self, Settings};
use crate::entities::{identity, nonce};
use crate::error::{CoreError, CoreResult};
use crate::layout;
use crate::model::{BallotTarget, Conversation, Identity, Message, Nonce, RowId, UserState};
use crate::progress::{
    CancelToken, Outcome, ProgressSink, ProgressTracker, GROUP_AVATAR_WEIGHT, MEDIA_WEIGHT,
    NONCES_PER_STEP, REACTIONS_PER_STEP, ROW_WEIGHT,
};
use crate::rows::{Column, RowWriter};
use crate::store::{MediaRef, MediaStore, MessengerStore};
use crate::version::CURRENT_FORMAT_VERSION;
use chatvault_archive::{ArchiveWriter, EntryWriter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

/// Summary of a finished backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Final path of the archive.
    pub path: PathBuf,
    /// Whether the archive is password protected.
    pub encrypted: bool,
    /// Weighted steps announced up front.
    pub total_steps: u64,
    /// Weighted steps performed.
    pub steps: u64,
    /// Number of table entries written.
    pub tables: u64,
    /// Number of rows written across all tables.
    pub rows: u64,
    /// Number of blob entries written.
    pub blobs: u64,
}

/// Writes backup archives from a store and its media.
pub struct BackupEngine<'a> {
    store: &'a dyn MessengerStore,
    media: &'a dyn MediaStore,
    config: BackupConfig,
}

struct ConversationPlan {
    entry: String,
    messages: Vec<MessageRecord>,
}

struct BlobPlan {
    media: MediaRef,
    entry: String,
    weight: u64,
}

#[derive(Default)]
struct Plan {
    identity: Option<Identity>,
    contacts: Vec<ContactRecord>,
    groups: Vec<GroupRecord>,
    lists: Vec<DistributionListRecord>,
    ballots: Vec<BallotRecord>,
    choices: Vec<ChoiceRecord>,
    votes: Vec<VoteRecord>,
    conversations: Vec<ConversationPlan>,
    reactions: Vec<ReactionRecord>,
    nonces: Vec<Nonce>,
    blobs: Vec<BlobPlan>,
}

impl Plan {
    fn total_steps(&self) -> u64 {
        let rows = self.identity.iter().count()
            + self.contacts.len()
            + self.groups.len()
            + self.lists.len()
            + self.ballots.len()
            + self.choices.len()
            + self.votes.len()
            + self
                .conversations
                .iter()
                .map(|c| c.messages.len())
                .sum::<usize>();
        rows as u64 * ROW_WEIGHT
            + batches(self.nonces.len() as u64, NONCES_PER_STEP)
            + batches(self.reactions.len() as u64, REACTIONS_PER_STEP)
            + self.blobs.iter().map(|b| b.weight).sum::<u64>()
    }
}

fn batches(items: u64, per_step: u64) -> u64 {
    items.div_ceil(per_step)
}

fn mint_uid() -> String {
    Uuid::new_v4().simple().to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Counters collected while writing.
#[derive(Default)]
struct Written {
    tables: u64,
    rows: u64,
    blobs: u64,
}

impl<'a> BackupEngine<'a> {
    /// Creates an engine reading from `store` and `media`.
    pub fn new(
        store: &'a dyn MessengerStore,
        media: &'a dyn MediaStore,
        config: BackupConfig,
    ) -> Self {
        Self {
            store,
            media,
            config,
        }
    }

    /// Writes a backup to `path`.
    ///
    /// The sink receives progress while rows and blobs are written and
    /// exactly one terminal event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Canceled`] if `cancel` was triggered, or the
    /// error that stopped the run. In both cases no file is left at `path`.
    pub fn run(
        &self,
        path: &Path,
        password: Option<&str>,
        cancel: CancelToken,
        sink: &dyn ProgressSink,
    ) -> CoreResult<BackupReport> {
        let result = self.export(path, password, cancel, sink);
        sink.on_finished(&Outcome::of(&result));
        result
    }

    fn export(
        &self,
        path: &Path,
        password: Option<&str>,
        cancel: CancelToken,
        sink: &dyn ProgressSink,
    ) -> CoreResult<BackupReport> {
        let started = Instant::now();
        cancel.check()?;
        let plan = self.plan()?;
        let total_steps = plan.total_steps();
        info!(path = %path.display(), total_steps, "backup started");

        let mut tracker = ProgressTracker::reporting(total_steps, cancel, sink);
        let mut archive = ArchiveWriter::create(path, password)?;
        let encrypted = archive.is_encrypted();
        let mut written = Written::default();

        self.write_settings(&mut archive, &mut written)?;
        self.write_tables(&plan, &mut archive, &mut tracker, &mut written)?;
        for blob in &plan.blobs {
            let Some(mut reader) = self.media.read(&blob.media)? else {
                debug!(entry = %blob.entry, "media vanished before it was written");
                continue;
            };
            archive.add_entry(&blob.entry, &mut *reader, false)?;
            written.blobs += 1;
            tracker.advance(blob.weight)?;
        }

        let steps = tracker.steps();
        let path = archive.finish()?;
        info!(
            path = %path.display(),
            tables = written.tables,
            rows = written.rows,
            blobs = written.blobs,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backup finished"
        );
        Ok(BackupReport {
            path,
            encrypted,
            total_steps,
            steps,
            tables: written.tables,
            rows: written.rows,
            blobs: written.blobs,
        })
    }

    fn write_settings(&self, archive: &mut ArchiveWriter, written: &mut Written) -> CoreResult<()> {
        let settings = Settings {
            version: CURRENT_FORMAT_VERSION,
            created_at: now_millis(),
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };
        let entry = archive.entry_writer(layout::SETTINGS, self.config.compress_tables)?;
        let mut rows = RowWriter::new(entry, settings::COLUMNS)?;
        settings::write(&settings, &mut rows)?;
        rows.finish()?.finish()?;
        written.tables += 1;
        Ok(())
    }

    fn write_tables(
        &self,
        plan: &Plan,
        archive: &mut ArchiveWriter,
        tracker: &mut ProgressTracker<'_>,
        written: &mut Written,
    ) -> CoreResult<()> {
        let entities = self.config.entities;
        let mut table = TableWriter {
            archive,
            tracker,
            written,
            compress: self.config.compress_tables,
        };

        if let Some(own) = &plan.identity {
            table.write(layout::IDENTITY, identity::COLUMNS, std::slice::from_ref(own), 1, |r, w| {
                identity::write(r, w)
            })?;
            table.write(layout::NONCES, nonce::COLUMNS, &plan.nonces, NONCES_PER_STEP, |r, w| {
                nonce::write(r, w)
            })?;
        }
        if entities.contacts {
            table.write(layout::CONTACTS, contact::COLUMNS, &plan.contacts, 1, |r, w| {
                contact::write(r, w)
            })?;
        }
        if entities.groups {
            table.write(layout::GROUPS, group::COLUMNS, &plan.groups, 1, |r, w| {
                group::write(r, w)
            })?;
        }
        if entities.distribution_lists {
            table.write(
                layout::DISTRIBUTION_LISTS,
                distribution_list::COLUMNS,
                &plan.lists,
                1,
                |r, w| distribution_list::write(r, w),
            )?;
        }
        if entities.ballots {
            table.write(layout::BALLOTS, ballot::COLUMNS, &plan.ballots, 1, |r, w| {
                ballot::write(r, w)
            })?;
            table.write(
                layout::BALLOT_CHOICES,
                ballot::CHOICE_COLUMNS,
                &plan.choices,
                1,
                |r, w| ballot::write_choice(r, w),
            )?;
            table.write(layout::BALLOT_VOTES, ballot::VOTE_COLUMNS, &plan.votes, 1, |r, w| {
                ballot::write_vote(r, w)
            })?;
        }
        for conversation in &plan.conversations {
            table.write(&conversation.entry, message::COLUMNS, &conversation.messages, 1, |r, w| {
                message::write(r, w)
            })?;
        }
        table.write(
            layout::REACTIONS,
            reaction::COLUMNS,
            &plan.reactions,
            REACTIONS_PER_STEP,
            |r, w| reaction::write(r, w),
        )?;
        Ok(())
    }

    /// Reads the selected rows and mints their uids.
    fn plan(&self) -> CoreResult<Plan> {
        let entities = self.config.entities;
        let avatars = self.config.media.avatars;
        let mut plan = Plan::default();

        let own = self.store.identity()?;
        if entities.identity {
            if own.is_none() {
                return Err(CoreError::invalid_backup("no identity to back up"));
            }
            plan.identity = own.clone();
            plan.nonces = self.store.nonces()?;
            if avatars {
                self.plan_blob(&mut plan, MediaRef::OwnProfilePicture, layout::PROFILE_PICTURE.into(), MEDIA_WEIGHT)?;
            }
        }
        let own_identity = own.map(|i| i.identity);

        let mut identity_ids: HashMap<String, String> = HashMap::new();
        if entities.contacts {
            for contact in self.store.contacts()? {
                let identity_id = mint_uid();
                identity_ids.insert(contact.identity.clone(), identity_id.clone());
                if avatars {
                    self.plan_blob(
                        &mut plan,
                        MediaRef::ContactAvatar(contact.identity.clone()),
                        layout::contact_avatar(&identity_id),
                        MEDIA_WEIGHT,
                    )?;
                    self.plan_blob(
                        &mut plan,
                        MediaRef::ContactProfilePicture(contact.identity.clone()),
                        layout::contact_profile_picture(&identity_id),
                        MEDIA_WEIGHT,
                    )?;
                }
                self.plan_conversation(
                    &mut plan,
                    Conversation::Contact(contact.identity.clone()),
                    layout::contact_messages(&identity_id),
                )?;
                plan.contacts.push(ContactRecord {
                    identity_id,
                    contact,
                });
            }
        }

        let mut group_uids: HashMap<RowId, String> = HashMap::new();
        if entities.groups {
            for (id, group) in self.store.groups()? {
                let uid = mint_uid();
                group_uids.insert(id, uid.clone());
                let mut members = self.store.group_members(id)?;
                if let Some(own) = &own_identity {
                    if group.user_state == UserState::Member && !members.contains(own) {
                        members.push(own.clone());
                    }
                }
                if avatars {
                    self.plan_blob(
                        &mut plan,
                        MediaRef::GroupAvatar(id),
                        layout::group_avatar(&uid),
                        GROUP_AVATAR_WEIGHT,
                    )?;
                }
                self.plan_conversation(&mut plan, Conversation::Group(id), layout::group_messages(&uid))?;
                plan.groups.push(GroupRecord {
                    uid,
                    group,
                    members,
                });
            }
        }

        if entities.distribution_lists {
            for (id, list) in self.store.distribution_lists()? {
                let uid = mint_uid();
                let member_ids = self
                    .store
                    .distribution_list_members(id)?
                    .iter()
                    .filter_map(|identity| identity_ids.get(identity).cloned())
                    .collect();
                self.plan_conversation(
                    &mut plan,
                    Conversation::DistributionList(id),
                    layout::distribution_list_messages(&uid),
                )?;
                plan.lists.push(DistributionListRecord {
                    uid,
                    list,
                    member_ids,
                });
            }
        }

        if entities.ballots {
            self.plan_ballots(&mut plan, &group_uids)?;
        }
        Ok(plan)
    }

    fn plan_ballots(&self, plan: &mut Plan, group_uids: &HashMap<RowId, String>) -> CoreResult<()> {
        let mut ballot_uids: HashMap<RowId, String> = HashMap::new();
        for (id, ballot) in self.store.ballots()? {
            let reference = match self.store.ballot_link(id)? {
                Some(BallotTarget::Group(group)) => match group_uids.get(&group) {
                    Some(uid) => BallotRef::Group(uid.clone()),
                    None => {
                        debug!(ballot = %id, "ballot of an excluded group not exported");
                        continue;
                    }
                },
                Some(BallotTarget::Contact(identity)) => BallotRef::Contact(identity),
                None => {
                    debug!(ballot = %id, "unlinked ballot not exported");
                    continue;
                }
            };
            let uid = mint_uid();
            ballot_uids.insert(id, uid.clone());

            let mut choice_uids: HashMap<RowId, String> = HashMap::new();
            for (choice_id, choice) in self.store.ballot_choices(id)? {
                let choice_uid = mint_uid();
                choice_uids.insert(choice_id, choice_uid.clone());
                plan.choices.push(ChoiceRecord {
                    uid: choice_uid,
                    ballot_uid: uid.clone(),
                    choice,
                });
            }
            for vote in self.store.ballot_votes(id)? {
                if let Some(choice_uid) = choice_uids.get(&vote.choice_id) {
                    plan.votes.push(VoteRecord {
                        ballot_uid: uid.clone(),
                        choice_uid: choice_uid.clone(),
                        vote,
                    });
                }
            }
            plan.ballots.push(BallotRecord {
                uid,
                ballot,
                reference,
            });
        }

        for conversation in &mut plan.conversations {
            for record in &mut conversation.messages {
                record.ballot_uid = record
                    .message
                    .ballot_id
                    .and_then(|id| ballot_uids.get(&id).cloned());
            }
        }
        Ok(())
    }

    fn plan_conversation(
        &self,
        plan: &mut Plan,
        conversation: Conversation,
        entry: String,
    ) -> CoreResult<()> {
        let messages = self.store.messages(&conversation)?;
        if messages.is_empty() {
            return Ok(());
        }
        let mut records = Vec::with_capacity(messages.len());
        for (id, message) in messages {
            let uid = mint_uid();
            for reaction in self.store.reactions(id)? {
                plan.reactions.push(ReactionRecord {
                    message_uid: uid.clone(),
                    reaction,
                });
            }
            if self.wants_media(&message) {
                self.plan_blob(plan, MediaRef::MessageMedia(id), layout::message_media(&uid), MEDIA_WEIGHT)?;
            }
            if self.config.media.thumbnails {
                self.plan_blob(
                    plan,
                    MediaRef::MessageThumbnail(id),
                    layout::message_thumbnail(&uid),
                    MEDIA_WEIGHT,
                )?;
            }
            records.push(MessageRecord {
                uid,
                message,
                ballot_uid: None,
            });
        }
        debug!(entry = %entry, messages = records.len(), "conversation planned");
        plan.conversations.push(ConversationPlan {
            entry,
            messages: records,
        });
        Ok(())
    }

    fn wants_media(&self, message: &Message) -> bool {
        if !message.kind.has_media() {
            return false;
        }
        if message.kind.is_large_media() {
            self.config.media.video_and_files
        } else {
            self.config.media.media
        }
    }

    fn plan_blob(&self, plan: &mut Plan, media: MediaRef, entry: String, weight: u64) -> CoreResult<()> {
        if self.media.contains(&media)? {
            plan.blobs.push(BlobPlan { media, entry, weight });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BackupEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Streams rows of one table into an archive entry.
struct TableWriter<'w, 'p> {
    archive: &'w mut ArchiveWriter,
    tracker: &'w mut ProgressTracker<'p>,
    written: &'w mut Written,
    compress: bool,
}

impl TableWriter<'_, '_> {
    fn write<T>(
        &mut self,
        name: &str,
        columns: &[Column],
        items: &[T],
        per_step: u64,
        write_row: impl Fn(&T, &mut RowWriter<EntryWriter<'_>>) -> CoreResult<()>,
    ) -> CoreResult<()> {
        let entry = self.archive.entry_writer(name, self.compress)?;
        let mut rows = RowWriter::new(entry, columns)?;
        for (index, item) in items.iter().enumerate() {
            write_row(item, &mut rows)?;
            self.tracker.advance_batched(index as u64, per_step)?;
        }
        let count = rows.rows();
        rows.finish()?.finish()?;
        debug!(entry = name, rows = count, "table written");
        self.written.tables += 1;
        self.written.rows += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AcquaintanceLevel, Contact, MessageKind, VerificationLevel};
    use crate::progress::CollectingSink;
    use crate::store::{InMemoryMedia, InMemoryStore};
    use chatvault_archive::ArchiveReader;

    fn store_with_chat() -> (InMemoryStore, InMemoryMedia) {
        let mut store = InMemoryStore::new();
        store
            .save_identity(&Identity {
                identity: "MYSELF01".into(),
                private_key: vec![1; 32],
                nickname: None,
            })
            .unwrap();
        store
            .create_contact(&Contact {
                identity: "ECHOECHO".into(),
                public_key: vec![2; 32],
                verification: VerificationLevel::Unverified,
                first_name: None,
                last_name: None,
                nickname: None,
                hidden: false,
                acquaintance: AcquaintanceLevel::Direct,
                feature_mask: 0,
                read_receipts: None,
            })
            .unwrap();
        let image = Message {
            api_id: "01".into(),
            outgoing: true,
            read: true,
            saved: true,
            state: None,
            kind: MessageKind::Video,
            body: None,
            caption: None,
            status_message: false,
            queued: false,
            sender: None,
            posted_at: None,
            created_at: 1,
            modified_at: None,
            quoted_api_id: None,
            delivered_at: None,
            read_at: None,
            display_tags: 0,
            forward_security: 0,
            edited_at: None,
            deleted_at: None,
            ballot_id: None,
        };
        let id = store
            .create_message(&Conversation::Contact("ECHOECHO".into()), &image)
            .unwrap();
        let mut media = InMemoryMedia::new();
        media.write_media(id, &mut &b"video"[..]).unwrap();
        media.write_thumbnail(id, &mut &b"thumb"[..]).unwrap();
        (store, media)
    }

    #[test]
    fn total_steps_are_announced_and_met() {
        let (store, media) = store_with_chat();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");
        let sink = CollectingSink::new();

        let engine = BackupEngine::new(&store, &media, BackupConfig::new());
        let report = engine.run(&path, None, CancelToken::new(), &sink).unwrap();

        // identity + contact + message + media + thumbnail
        assert_eq!(report.total_steps, 3 + 2 * MEDIA_WEIGHT);
        assert_eq!(report.steps, report.total_steps);
        assert_eq!(report.blobs, 2);
        assert_eq!(sink.outcomes(), vec![Outcome::Succeeded]);
        assert_eq!(sink.updates().last().unwrap().percent, 100);

        let archive = ArchiveReader::open(&path, None).unwrap();
        assert_eq!(archive.entries()[0].name, layout::SETTINGS);
        assert!(archive.contains(layout::IDENTITY));
        assert!(archive.contains(layout::REACTIONS));
    }

    #[test]
    fn media_selection_is_honored() {
        let (store, media) = store_with_chat();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");

        let config = BackupConfig::new().video_and_files(false);
        let report = BackupEngine::new(&store, &media, config)
            .run(&path, None, CancelToken::new(), &CollectingSink::new())
            .unwrap();
        assert_eq!(report.blobs, 1);
    }

    #[test]
    fn canceled_backup_leaves_nothing() {
        let (store, media) = store_with_chat();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");
        let sink = CollectingSink::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = BackupEngine::new(&store, &media, BackupConfig::new()).run(&path, None, cancel, &sink);
        assert!(matches!(result, Err(CoreError::Canceled)));
        assert_eq!(sink.outcomes(), vec![Outcome::Canceled]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_identity_fails() {
        let store = InMemoryStore::new();
        let media = InMemoryMedia::new();
        let dir = tempfile::tempdir().unwrap();
        let result = BackupEngine::new(&store, &media, BackupConfig::new()).run(
            &dir.path().join("b.zip"),
            None,
            CancelToken::new(),
            &CollectingSink::new(),
        );
        assert!(matches!(result, Err(CoreError::InvalidBackup { .. })));
    }
}
