//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chatvault_archive::ArchiveWriter;
use chatvault_core::{
    AcquaintanceLevel, Ballot, BallotAssessment, BallotChoice, BallotChoiceType, BallotKind,
    BallotLink, BallotState, BallotTarget, BallotVote, CollectingSink, CancelToken, Contact,
    Conversation, CoreResult, DistributionList, DistributionListMember, Group, GroupMember,
    Identity, InMemoryMedia, InMemoryStore, MediaRef, MediaStore, Message, MessageKind,
    MessageState, MessengerStore, Nonce, NonceScope, NotificationTrigger, Reaction,
    RestoreConfig, RestoreEngine, RestoreReport, RowId, UserState, VerificationLevel,
};
use std::path::{Path, PathBuf};

/// The user's own identity in every fixture.
pub const OWN: &str = "MYSELF01";

/// Identity row of [`OWN`].
pub const IDENTITY_TABLE: &str = "identity,private_key,nickname\nMYSELF01,0a0b0c,Me\n";

/// Builds an archive from literal entries.
pub struct ArchiveFixture {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveFixture {
    /// Starts an archive declaring `version`, with the [`OWN`] identity.
    pub fn new(version: u32) -> Self {
        Self {
            entries: vec![
                ("settings.csv".into(), format!("version\n{version}\n").into_bytes()),
                ("identity.csv".into(), IDENTITY_TABLE.as_bytes().to_vec()),
            ],
        }
    }

    /// Adds a table entry.
    pub fn table(mut self, name: &str, text: &str) -> Self {
        self.entries.push((name.to_string(), text.as_bytes().to_vec()));
        self
    }

    /// Adds a blob entry.
    pub fn blob(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.to_string(), data.to_vec()));
        self
    }

    /// Writes the archive into `dir`.
    pub fn write(&self, dir: &Path, password: Option<&str>) -> PathBuf {
        let path = dir.join("fixture.zip");
        let mut writer = ArchiveWriter::create(&path, password).unwrap();
        for (name, data) in &self.entries {
            let compress = name.ends_with(".csv");
            writer.add_entry(name, &mut data.as_slice(), compress).unwrap();
        }
        writer.finish().unwrap()
    }
}

/// Restores `path` into fresh stores.
pub fn restore(
    path: &Path,
    password: Option<&str>,
) -> (CoreResult<RestoreReport>, InMemoryStore, InMemoryMedia, CollectingSink) {
    restore_into(InMemoryStore::new(), InMemoryMedia::new(), path, password, CancelToken::new())
}

/// Restores `path` into the given stores.
pub fn restore_into(
    mut store: InMemoryStore,
    mut media: InMemoryMedia,
    path: &Path,
    password: Option<&str>,
    cancel: CancelToken,
) -> (CoreResult<RestoreReport>, InMemoryStore, InMemoryMedia, CollectingSink) {
    let sink = CollectingSink::new();
    let result = RestoreEngine::new(&mut store, &mut media, RestoreConfig::default())
        .run(path, password, cancel, &sink);
    (result, store, media, sink)
}

pub fn contact(identity: &str) -> Contact {
    Contact {
        identity: identity.to_string(),
        public_key: vec![0x42; 32],
        verification: VerificationLevel::ServerVerified,
        first_name: Some(format!("First {identity}")),
        last_name: None,
        nickname: Some(identity.to_lowercase()),
        hidden: false,
        acquaintance: AcquaintanceLevel::Direct,
        feature_mask: 0x0f,
        read_receipts: Some(true),
    }
}

pub fn message(api_id: &str, kind: MessageKind, outgoing: bool, sender: Option<&str>) -> Message {
    Message {
        api_id: api_id.to_string(),
        outgoing,
        read: true,
        saved: false,
        state: Some(if outgoing {
            MessageState::Delivered
        } else {
            MessageState::Read
        }),
        kind,
        body: Some(format!("body of {api_id}")),
        caption: None,
        status_message: false,
        queued: false,
        sender: sender.map(str::to_string),
        posted_at: Some(1_700_000_000_000),
        created_at: 1_700_000_000_500,
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

/// Live ids of the data created by [`seeded`].
pub struct Seeded {
    pub group: RowId,
    pub list: RowId,
    pub ballot: RowId,
    pub image_message: RowId,
    pub file_message: RowId,
}

/// A store with one of every entity kind and some media.
pub fn seeded() -> (InMemoryStore, InMemoryMedia, Seeded) {
    let mut store = InMemoryStore::new();
    let mut media = InMemoryMedia::new();

    store
        .save_identity(&Identity {
            identity: OWN.into(),
            private_key: vec![9; 32],
            nickname: Some("Me".into()),
        })
        .unwrap();
    for identity in ["ECHOECHO", "ALPHA001", "BRAVO002"] {
        assert!(store.create_contact(&contact(identity)).unwrap());
    }

    let group = store
        .create_group(&Group {
            api_group_id: "0102030405060708".into(),
            creator: "ECHOECHO".into(),
            name: Some("Weekend".into()),
            created_at: 1_600_000_000_000,
            description: Some("plans".into()),
            archived: false,
            user_state: UserState::Member,
            last_update: Some(1_700_000_000_000),
            notification_trigger: NotificationTrigger::Mentioned,
        })
        .unwrap();
    for identity in ["ECHOECHO", "ALPHA001"] {
        store
            .create_group_member(&GroupMember {
                group_id: group,
                identity: identity.into(),
            })
            .unwrap();
    }

    let list = store
        .create_distribution_list(&DistributionList {
            name: Some("Family".into()),
            created_at: 1_650_000_000_000,
            archived: true,
        })
        .unwrap();
    store
        .create_distribution_list_member(&DistributionListMember {
            list_id: list,
            identity: "BRAVO002".into(),
        })
        .unwrap();

    let ballot = store
        .create_ballot(&Ballot {
            api_ballot_id: "b-1".into(),
            creator: "ECHOECHO".into(),
            name: Some("Pizza?".into()),
            state: BallotState::Open,
            assessment: BallotAssessment::SingleChoice,
            kind: BallotKind::Intermediate,
            choice_type: BallotChoiceType::Text,
            created_at: 10,
            modified_at: 11,
            last_viewed_at: Some(12),
        })
        .unwrap();
    store
        .create_ballot_link(&BallotLink {
            ballot_id: ballot,
            target: BallotTarget::Group(group),
        })
        .unwrap();
    let yes = store
        .create_ballot_choice(&BallotChoice {
            ballot_id: ballot,
            api_choice_id: 1,
            name: "Yes".into(),
            vote_count: 1,
            order: 0,
            created_at: 10,
            modified_at: 10,
        })
        .unwrap();
    store
        .create_ballot_vote(&BallotVote {
            ballot_id: ballot,
            choice_id: yes,
            identity: "ALPHA001".into(),
            choice: 1,
            created_at: 13,
            modified_at: 13,
        })
        .unwrap();

    let echo = Conversation::Contact("ECHOECHO".into());
    let text = store
        .create_message(&echo, &message("m-text", MessageKind::Text, true, None))
        .unwrap();
    let image_message = store
        .create_message(&echo, &message("m-image", MessageKind::Image, false, None))
        .unwrap();
    let group_conv = Conversation::Group(group);
    let mut announce = message("m-ballot", MessageKind::Ballot, false, Some("ECHOECHO"));
    announce.ballot_id = Some(ballot);
    store.create_message(&group_conv, &announce).unwrap();
    let file_message = store
        .create_message(
            &group_conv,
            &message("m-file", MessageKind::File, true, None),
        )
        .unwrap();
    store
        .create_message(
            &Conversation::DistributionList(list),
            &message("m-list", MessageKind::Text, true, None),
        )
        .unwrap();

    store
        .create_reaction(&Reaction {
            message_id: text,
            sender: "ECHOECHO".into(),
            emoji: "\u{1F602}".into(),
            reacted_at: 1_700_000_001_000,
        })
        .unwrap();
    store
        .create_nonces(&[
            Nonce {
                scope: NonceScope::Csp,
                value: vec![1; 32],
            },
            Nonce {
                scope: NonceScope::D2d,
                value: vec![2; 32],
            },
        ])
        .unwrap();

    media
        .write(&MediaRef::OwnProfilePicture, &mut &b"own picture"[..])
        .unwrap();
    media
        .write(&MediaRef::ContactAvatar("ECHOECHO".into()), &mut &b"echo avatar"[..])
        .unwrap();
    media
        .write(&MediaRef::GroupAvatar(group), &mut &b"group avatar"[..])
        .unwrap();
    media
        .write(&MediaRef::MessageMedia(image_message), &mut &b"jpeg bytes"[..])
        .unwrap();
    media
        .write(&MediaRef::MessageThumbnail(image_message), &mut &b"thumb"[..])
        .unwrap();
    media
        .write(&MediaRef::MessageMedia(file_message), &mut &b"pdf bytes"[..])
        .unwrap();

    (
        store,
        media,
        Seeded {
            group,
            list,
            ballot,
            image_message,
            file_message,
        },
    )
}
