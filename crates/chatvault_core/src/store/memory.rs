//! In-memory storage collaborators.

use super::{MediaRef, MediaStore, MessengerStore, StoreError, StoreResult, Table};
use crate::model::{
    Ballot, BallotChoice, BallotLink, BallotTarget, BallotVote, Contact, Conversation,
    DistributionList, DistributionListMember, Group, GroupMember, Identity, Message, Nonce,
    Reaction, RowId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    id: RowId,
    conversation: Conversation,
    message: Message,
}

/// An in-memory messenger database.
///
/// Enforces the parent/child constraints a relational store would, counts
/// every mutating call, and can be persisted as a JSON snapshot.
///
/// # Example
///
/// ```rust
/// use chatvault_core::store::{InMemoryStore, MessengerStore, Table};
///
/// let mut store = InMemoryStore::new();
/// store.clear(Table::Contacts).unwrap();
/// assert_eq!(store.mutations(), 1);
/// assert_eq!(store.count(Table::Contacts).unwrap(), 0);
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InMemoryStore {
    identity: Option<Identity>,
    contacts: Vec<Contact>,
    groups: Vec<(RowId, Group)>,
    group_members: Vec<GroupMember>,
    distribution_lists: Vec<(RowId, DistributionList)>,
    distribution_list_members: Vec<DistributionListMember>,
    ballots: Vec<(RowId, Ballot)>,
    ballot_links: Vec<BallotLink>,
    ballot_choices: Vec<(RowId, BallotChoice)>,
    ballot_votes: Vec<BallotVote>,
    messages: Vec<StoredMessage>,
    reactions: Vec<Reaction>,
    nonces: Vec<Nonce>,
    next_id: u64,
    #[serde(skip)]
    mutations: u64,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of mutating calls made so far.
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Loads a snapshot, or returns an empty store if `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Saves a snapshot atomically: temp file, fsync, rename, directory fsync.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = Path::new(&temp);

        let data = serde_json::to_vec_pretty(self)?;
        let mut file = File::create(temp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(temp, path)?;
        sync_parent(path)?;
        Ok(())
    }

    fn allocate(&mut self) -> RowId {
        self.next_id += 1;
        RowId(self.next_id)
    }

    fn mutate(&mut self) {
        self.mutations += 1;
    }

    fn has_contact(&self, identity: &str) -> bool {
        self.contacts.iter().any(|c| c.identity == identity)
    }

    fn has_group(&self, id: RowId) -> bool {
        self.groups.iter().any(|(gid, _)| *gid == id)
    }

    fn has_list(&self, id: RowId) -> bool {
        self.distribution_lists.iter().any(|(lid, _)| *lid == id)
    }

    fn has_ballot(&self, id: RowId) -> bool {
        self.ballots.iter().any(|(bid, _)| *bid == id)
    }

    fn conversation_exists(&self, conversation: &Conversation) -> bool {
        match conversation {
            Conversation::Contact(identity) => self.has_contact(identity),
            Conversation::Group(id) => self.has_group(*id),
            Conversation::DistributionList(id) => self.has_list(*id),
        }
    }
}

fn not_found(table: Table, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        table,
        id: id.to_string(),
    }
}

fn conflict(table: Table, message: impl Into<String>) -> StoreError {
    StoreError::Conflict {
        table,
        message: message.into(),
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StoreResult<()> {
    Ok(())
}

impl MessengerStore for InMemoryStore {
    fn clear(&mut self, table: Table) -> StoreResult<()> {
        self.mutate();
        match table {
            Table::Identity => self.identity = None,
            Table::Contacts => self.contacts.clear(),
            Table::Groups => self.groups.clear(),
            Table::GroupMembers => self.group_members.clear(),
            Table::DistributionLists => self.distribution_lists.clear(),
            Table::DistributionListMembers => self.distribution_list_members.clear(),
            Table::Ballots => self.ballots.clear(),
            Table::BallotLinks => self.ballot_links.clear(),
            Table::BallotChoices => self.ballot_choices.clear(),
            Table::BallotVotes => self.ballot_votes.clear(),
            Table::Messages => self.messages.clear(),
            Table::Reactions => self.reactions.clear(),
            Table::Nonces => self.nonces.clear(),
        }
        Ok(())
    }

    fn count(&self, table: Table) -> StoreResult<u64> {
        let count = match table {
            Table::Identity => usize::from(self.identity.is_some()),
            Table::Contacts => self.contacts.len(),
            Table::Groups => self.groups.len(),
            Table::GroupMembers => self.group_members.len(),
            Table::DistributionLists => self.distribution_lists.len(),
            Table::DistributionListMembers => self.distribution_list_members.len(),
            Table::Ballots => self.ballots.len(),
            Table::BallotLinks => self.ballot_links.len(),
            Table::BallotChoices => self.ballot_choices.len(),
            Table::BallotVotes => self.ballot_votes.len(),
            Table::Messages => self.messages.len(),
            Table::Reactions => self.reactions.len(),
            Table::Nonces => self.nonces.len(),
        };
        Ok(count as u64)
    }

    fn identity(&self) -> StoreResult<Option<Identity>> {
        Ok(self.identity.clone())
    }

    fn save_identity(&mut self, identity: &Identity) -> StoreResult<()> {
        self.mutate();
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn contacts(&self) -> StoreResult<Vec<Contact>> {
        Ok(self.contacts.clone())
    }

    fn create_contact(&mut self, contact: &Contact) -> StoreResult<bool> {
        self.mutate();
        if self.has_contact(&contact.identity) {
            return Ok(false);
        }
        self.contacts.push(contact.clone());
        Ok(true)
    }

    fn groups(&self) -> StoreResult<Vec<(RowId, Group)>> {
        Ok(self.groups.clone())
    }

    fn create_group(&mut self, group: &Group) -> StoreResult<RowId> {
        self.mutate();
        let id = self.allocate();
        self.groups.push((id, group.clone()));
        Ok(id)
    }

    fn group_members(&self, group: RowId) -> StoreResult<Vec<String>> {
        Ok(self
            .group_members
            .iter()
            .filter(|m| m.group_id == group)
            .map(|m| m.identity.clone())
            .collect())
    }

    fn create_group_member(&mut self, member: &GroupMember) -> StoreResult<()> {
        self.mutate();
        if !self.has_group(member.group_id) {
            return Err(not_found(Table::Groups, member.group_id));
        }
        if !self.has_contact(&member.identity) {
            return Err(not_found(Table::Contacts, &member.identity));
        }
        if self.group_members.contains(member) {
            return Err(conflict(
                Table::GroupMembers,
                format!("{} already in group {}", member.identity, member.group_id),
            ));
        }
        self.group_members.push(member.clone());
        Ok(())
    }

    fn distribution_lists(&self) -> StoreResult<Vec<(RowId, DistributionList)>> {
        Ok(self.distribution_lists.clone())
    }

    fn create_distribution_list(&mut self, list: &DistributionList) -> StoreResult<RowId> {
        self.mutate();
        let id = self.allocate();
        self.distribution_lists.push((id, list.clone()));
        Ok(id)
    }

    fn distribution_list_members(&self, list: RowId) -> StoreResult<Vec<String>> {
        Ok(self
            .distribution_list_members
            .iter()
            .filter(|m| m.list_id == list)
            .map(|m| m.identity.clone())
            .collect())
    }

    fn create_distribution_list_member(
        &mut self,
        member: &DistributionListMember,
    ) -> StoreResult<()> {
        self.mutate();
        if !self.has_list(member.list_id) {
            return Err(not_found(Table::DistributionLists, member.list_id));
        }
        if !self.has_contact(&member.identity) {
            return Err(not_found(Table::Contacts, &member.identity));
        }
        if self.distribution_list_members.contains(member) {
            return Err(conflict(
                Table::DistributionListMembers,
                format!("{} already in list {}", member.identity, member.list_id),
            ));
        }
        self.distribution_list_members.push(member.clone());
        Ok(())
    }

    fn ballots(&self) -> StoreResult<Vec<(RowId, Ballot)>> {
        Ok(self.ballots.clone())
    }

    fn create_ballot(&mut self, ballot: &Ballot) -> StoreResult<RowId> {
        self.mutate();
        let id = self.allocate();
        self.ballots.push((id, ballot.clone()));
        Ok(id)
    }

    fn ballot_link(&self, ballot: RowId) -> StoreResult<Option<BallotTarget>> {
        Ok(self
            .ballot_links
            .iter()
            .find(|l| l.ballot_id == ballot)
            .map(|l| l.target.clone()))
    }

    fn create_ballot_link(&mut self, link: &BallotLink) -> StoreResult<()> {
        self.mutate();
        if !self.has_ballot(link.ballot_id) {
            return Err(not_found(Table::Ballots, link.ballot_id));
        }
        let parent_exists = match &link.target {
            BallotTarget::Group(id) => self.has_group(*id),
            BallotTarget::Contact(identity) => self.has_contact(identity),
        };
        if !parent_exists {
            return Err(not_found(Table::BallotLinks, format!("{:?}", link.target)));
        }
        if self.ballot_links.iter().any(|l| l.ballot_id == link.ballot_id) {
            return Err(conflict(
                Table::BallotLinks,
                format!("ballot {} already linked", link.ballot_id),
            ));
        }
        self.ballot_links.push(link.clone());
        Ok(())
    }

    fn ballot_choices(&self, ballot: RowId) -> StoreResult<Vec<(RowId, BallotChoice)>> {
        Ok(self
            .ballot_choices
            .iter()
            .filter(|(_, c)| c.ballot_id == ballot)
            .cloned()
            .collect())
    }

    fn create_ballot_choice(&mut self, choice: &BallotChoice) -> StoreResult<RowId> {
        self.mutate();
        if !self.has_ballot(choice.ballot_id) {
            return Err(not_found(Table::Ballots, choice.ballot_id));
        }
        let id = self.allocate();
        self.ballot_choices.push((id, choice.clone()));
        Ok(id)
    }

    fn ballot_votes(&self, ballot: RowId) -> StoreResult<Vec<BallotVote>> {
        Ok(self
            .ballot_votes
            .iter()
            .filter(|v| v.ballot_id == ballot)
            .cloned()
            .collect())
    }

    fn create_ballot_vote(&mut self, vote: &BallotVote) -> StoreResult<()> {
        self.mutate();
        let choice_matches = self
            .ballot_choices
            .iter()
            .any(|(id, c)| *id == vote.choice_id && c.ballot_id == vote.ballot_id);
        if !choice_matches {
            return Err(not_found(Table::BallotChoices, vote.choice_id));
        }
        self.ballot_votes.push(vote.clone());
        Ok(())
    }

    fn messages(&self, conversation: &Conversation) -> StoreResult<Vec<(RowId, Message)>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| &m.conversation == conversation)
            .map(|m| (m.id, m.message.clone()))
            .collect())
    }

    fn create_message(
        &mut self,
        conversation: &Conversation,
        message: &Message,
    ) -> StoreResult<RowId> {
        self.mutate();
        if !self.conversation_exists(conversation) {
            return Err(not_found(Table::Messages, format!("{conversation:?}")));
        }
        let id = self.allocate();
        self.messages.push(StoredMessage {
            id,
            conversation: conversation.clone(),
            message: message.clone(),
        });
        Ok(id)
    }

    fn reactions(&self, message: RowId) -> StoreResult<Vec<Reaction>> {
        Ok(self
            .reactions
            .iter()
            .filter(|r| r.message_id == message)
            .cloned()
            .collect())
    }

    fn create_reaction(&mut self, reaction: &Reaction) -> StoreResult<()> {
        self.mutate();
        if !self.messages.iter().any(|m| m.id == reaction.message_id) {
            return Err(not_found(Table::Messages, reaction.message_id));
        }
        let duplicate = self.reactions.iter().any(|r| {
            r.message_id == reaction.message_id
                && r.sender == reaction.sender
                && r.emoji == reaction.emoji
        });
        if duplicate {
            return Err(conflict(
                Table::Reactions,
                format!("{} already reacted {}", reaction.sender, reaction.emoji),
            ));
        }
        self.reactions.push(reaction.clone());
        Ok(())
    }

    fn nonces(&self) -> StoreResult<Vec<Nonce>> {
        Ok(self.nonces.clone())
    }

    fn create_nonces(&mut self, nonces: &[Nonce]) -> StoreResult<()> {
        self.mutate();
        self.nonces.extend_from_slice(nonces);
        Ok(())
    }
}

/// In-memory media files.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMedia {
    files: BTreeMap<MediaRef, Vec<u8>>,
    mutations: u64,
}

impl InMemoryMedia {
    /// Creates an empty media store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of mutating calls made so far.
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Returns the number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns the stored bytes of `media`.
    #[must_use]
    pub fn get(&self, media: &MediaRef) -> Option<&[u8]> {
        self.files.get(media).map(Vec::as_slice)
    }
}

impl MediaStore for InMemoryMedia {
    fn write(&mut self, media: &MediaRef, data: &mut dyn Read) -> StoreResult<u64> {
        self.mutations += 1;
        let mut buf = Vec::new();
        let written = data.read_to_end(&mut buf)?;
        self.files.insert(media.clone(), buf);
        Ok(written as u64)
    }

    fn read(&self, media: &MediaRef) -> StoreResult<Option<Box<dyn Read + '_>>> {
        Ok(self
            .files
            .get(media)
            .map(|data| Box::new(data.as_slice()) as Box<dyn Read + '_>))
    }

    fn delete_all(&mut self) -> StoreResult<()> {
        self.mutations += 1;
        self.files.clear();
        Ok(())
    }

    fn contains(&self, media: &MediaRef) -> StoreResult<bool> {
        Ok(self.files.contains_key(media))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AcquaintanceLevel, MessageKind, NotificationTrigger, UserState, VerificationLevel};

    fn contact(identity: &str) -> Contact {
        Contact {
            identity: identity.to_string(),
            public_key: vec![7; 32],
            verification: VerificationLevel::Unverified,
            first_name: None,
            last_name: None,
            nickname: None,
            hidden: false,
            acquaintance: AcquaintanceLevel::Direct,
            feature_mask: 0,
            read_receipts: None,
        }
    }

    fn group() -> Group {
        Group {
            api_group_id: "0011223344556677".into(),
            creator: "ECHOECHO".into(),
            name: Some("Echo".into()),
            created_at: 1,
            description: None,
            archived: false,
            user_state: UserState::Member,
            last_update: None,
            notification_trigger: NotificationTrigger::Default,
        }
    }

    fn text(body: &str) -> Message {
        Message {
            api_id: "aa".into(),
            outgoing: false,
            read: true,
            saved: true,
            state: None,
            kind: MessageKind::Text,
            body: Some(body.into()),
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
        }
    }

    #[test]
    fn contacts_are_keyed_by_identity() {
        let mut store = InMemoryStore::new();
        assert!(store.create_contact(&contact("ECHOECHO")).unwrap());
        assert!(!store.create_contact(&contact("ECHOECHO")).unwrap());
        assert_eq!(store.count(Table::Contacts).unwrap(), 1);
    }

    #[test]
    fn children_need_parents() {
        let mut store = InMemoryStore::new();
        let orphan = GroupMember {
            group_id: RowId(99),
            identity: "ECHOECHO".into(),
        };
        assert!(matches!(
            store.create_group_member(&orphan),
            Err(StoreError::NotFound { table: Table::Groups, .. })
        ));
        assert!(store
            .create_message(&Conversation::Group(RowId(99)), &text("hi"))
            .is_err());

        store.create_contact(&contact("ECHOECHO")).unwrap();
        let gid = store.create_group(&group()).unwrap();
        store
            .create_group_member(&GroupMember {
                group_id: gid,
                identity: "ECHOECHO".into(),
            })
            .unwrap();
        let mid = store
            .create_message(&Conversation::Group(gid), &text("hi"))
            .unwrap();
        assert_eq!(store.messages(&Conversation::Group(gid)).unwrap()[0].0, mid);
        assert_eq!(store.group_members(gid).unwrap(), vec!["ECHOECHO".to_string()]);
    }

    #[test]
    fn duplicate_reaction_conflicts() {
        let mut store = InMemoryStore::new();
        store.create_contact(&contact("ECHOECHO")).unwrap();
        let mid = store
            .create_message(&Conversation::Contact("ECHOECHO".into()), &text("hi"))
            .unwrap();
        let reaction = Reaction {
            message_id: mid,
            sender: "ECHOECHO".into(),
            emoji: "\u{1F44D}".into(),
            reacted_at: 5,
        };
        store.create_reaction(&reaction).unwrap();
        assert!(matches!(
            store.create_reaction(&reaction),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = InMemoryStore::new();
        store.create_contact(&contact("ECHOECHO")).unwrap();
        let gid = store.create_group(&group()).unwrap();
        store.save(&path).unwrap();
        assert!(!dir.path().join("store.json.tmp").exists());

        let loaded = InMemoryStore::load(&path).unwrap();
        assert_eq!(loaded.contacts().unwrap().len(), 1);
        assert_eq!(loaded.groups().unwrap()[0].0, gid);
        assert_eq!(loaded.mutations(), 0);
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.count(Table::Messages).unwrap(), 0);
    }

    #[test]
    fn media_roundtrip() {
        let mut media = InMemoryMedia::new();
        media.write_media(RowId(3), &mut &b"jpeg"[..]).unwrap();
        let mut out = Vec::new();
        media.read_media(RowId(3)).unwrap().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"jpeg");
        assert!(!media.contains(&MediaRef::MessageThumbnail(RowId(3))).unwrap());

        media.delete_all().unwrap();
        assert!(media.is_empty());
        assert_eq!(media.mutations(), 2);
    }
}
