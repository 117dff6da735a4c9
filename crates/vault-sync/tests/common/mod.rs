//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use vault_core::{
    Action, Draft, ItemData, ItemKind, ItemRevision, ReplicaSnapshot, Share, ShareType,
    VaultContent, CONTENT_FORMAT_VERSION,
};
use vault_sync::protocol::{EncryptedItem, EncryptedShare, ShareEventList};
use vault_sync::{
    CacheStorage, CryptoProvider, CryptoSnapshot, MemoryCacheStorage, SessionCredentials,
    SessionProvider, StoreHandle, SyncCallbacks, SyncConfig, SyncContext, SyncError, SyncResult,
    VaultApi,
};

// =============================================================================
// API
// =============================================================================

pub enum Reply {
    Events(ShareEventList),
    Fail { status: u16, code: i64 },
}

#[derive(Default)]
pub struct FakeApi {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    polls: Mutex<Vec<(String, String)>>,
    latest: Mutex<HashMap<String, String>>,
    shares: Mutex<Vec<EncryptedShare>>,
    items: Mutex<HashMap<String, Vec<EncryptedItem>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the reply to the next poll of `share_id`. Once the queue is
    /// empty, polls answer with an unchanged watermark.
    pub fn script(&self, share_id: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(share_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_latest(&self, share_id: &str, event_id: &str) {
        self.latest
            .lock()
            .unwrap()
            .insert(share_id.to_string(), event_id.to_string());
    }

    pub fn add_share(&self, share: EncryptedShare, items: Vec<EncryptedItem>) {
        self.items
            .lock()
            .unwrap()
            .insert(share.share_id.clone(), items);
        self.shares.lock().unwrap().push(share);
    }

    /// Event ids polled for `share_id`, in order.
    pub fn polls_for(&self, share_id: &str) -> Vec<String> {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .filter(|(share, _)| share == share_id)
            .map(|(_, event_id)| event_id.clone())
            .collect()
    }
}

#[async_trait]
impl VaultApi for FakeApi {
    async fn share_events(&self, share_id: &str, event_id: &str) -> SyncResult<ShareEventList> {
        self.polls
            .lock()
            .unwrap()
            .push((share_id.to_string(), event_id.to_string()));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(share_id)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Events(events)) => Ok(events),
            Some(Reply::Fail { status, code }) => Err(SyncError::Api {
                status,
                code,
                message: "scripted failure".into(),
            }),
            None => Ok(events(event_id)),
        }
    }

    async fn latest_event_id(&self, share_id: &str) -> SyncResult<String> {
        self.latest
            .lock()
            .unwrap()
            .get(share_id)
            .cloned()
            .ok_or(SyncError::Api {
                status: 404,
                code: 2501,
                message: "unknown share".into(),
            })
    }

    async fn fetch_shares(&self) -> SyncResult<Vec<EncryptedShare>> {
        Ok(self.shares.lock().unwrap().clone())
    }

    async fn fetch_items(&self, share_id: &str) -> SyncResult<Vec<EncryptedItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(share_id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Crypto & Session
// =============================================================================

/// "Encrypts" by prefixing the lock token. Item content is the item name;
/// content `corrupt` cannot be opened.
#[derive(Default)]
pub struct FakeCrypto {
    pub hydrations: Mutex<Vec<bool>>,
    /// Report an empty key cache (`CryptoSnapshot::default()`).
    pub empty_key_cache: AtomicBool,
}

impl FakeCrypto {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CryptoProvider for FakeCrypto {
    fn open_item(&self, share_id: &str, item: &EncryptedItem) -> SyncResult<ItemRevision> {
        if item.content == "corrupt" {
            return Err(SyncError::Crypto("bad item key".into()));
        }

        Ok(ItemRevision {
            item_id: item.item_id.clone(),
            share_id: share_id.to_string(),
            revision: item.revision,
            state: item.item_state(),
            pinned: item.pinned,
            create_time: item.create_time,
            modify_time: item.modify_time,
            revision_time: item.revision_time,
            last_use_time: item.last_use_time,
            data: ItemData {
                kind: ItemKind::Login,
                name: item.content.clone(),
                payload: String::new(),
                alias_email: None,
            },
            alias_email: item.alias_email.clone(),
            content_format_version: item.content_format_version,
        })
    }

    fn open_share(&self, share: &EncryptedShare, event_id: &str) -> SyncResult<Share> {
        Ok(Share {
            share_id: share.share_id.clone(),
            vault_id: share.vault_id.clone(),
            target_type: if share.is_vault() {
                ShareType::Vault
            } else {
                ShareType::Item
            },
            target_id: share.target_id.clone(),
            event_id: event_id.to_string(),
            content: share.content.clone().map(|name| VaultContent {
                name,
                description: String::new(),
            }),
            owner: share.owner,
            shared: share.shared,
            create_time: share.create_time,
        })
    }

    fn encrypt_cache(&self, plaintext: &[u8], lock_token: Option<&str>) -> SyncResult<Vec<u8>> {
        let mut sealed = format!("{}|", lock_token.unwrap_or_default()).into_bytes();
        sealed.extend_from_slice(plaintext);
        Ok(sealed)
    }

    fn decrypt_cache(&self, ciphertext: &[u8], lock_token: Option<&str>) -> SyncResult<Vec<u8>> {
        let prefix = format!("{}|", lock_token.unwrap_or_default());
        ciphertext
            .strip_prefix(prefix.as_bytes())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SyncError::Crypto("cannot open cache".into()))
    }

    fn snapshot(&self) -> Option<CryptoSnapshot> {
        if self.empty_key_cache.load(Ordering::SeqCst) {
            return Some(CryptoSnapshot::default());
        }
        Some(CryptoSnapshot::new(json!(1)))
    }

    fn hydrate(&self, snapshot: Option<&CryptoSnapshot>) -> SyncResult<()> {
        self.hydrations.lock().unwrap().push(snapshot.is_some());
        Ok(())
    }
}

pub struct FakeSession {
    pub lock_token: Option<String>,
}

impl SessionProvider for FakeSession {
    fn credentials(&self) -> Option<SessionCredentials> {
        None
    }

    fn lock_token(&self) -> Option<String> {
        self.lock_token.clone()
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Records each callback together with whether the affected data was still
/// in the replica when it ran.
pub struct RecordingCallbacks {
    store: StoreHandle,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    pub fn new(store: StoreHandle) -> Arc<Self> {
        Arc::new(RecordingCallbacks {
            store,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SyncCallbacks for RecordingCallbacks {
    fn on_items_updated(&self) {
        self.calls.lock().unwrap().push("items_updated".into());
    }

    fn on_items_deleted(&self, share_id: &str, item_ids: &[String]) {
        let present = self.store.read(|state| {
            item_ids
                .iter()
                .all(|id| vault_core::selectors::select_item(state, share_id, id).is_some())
        });
        self.calls
            .lock()
            .unwrap()
            .push(format!("items_deleted:{}:{}:present={}", share_id, item_ids.join(","), present));
    }

    fn on_share_deleted(&self, share_id: &str) {
        let present = self
            .store
            .read(|state| vault_core::selectors::select_share(state, share_id).is_some());
        self.calls
            .lock()
            .unwrap()
            .push(format!("share_deleted:{}:present={}", share_id, present));
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn vault(share_id: &str, event_id: &str) -> Share {
    Share {
        share_id: share_id.into(),
        vault_id: format!("vault-{}", share_id),
        target_type: ShareType::Vault,
        target_id: format!("vault-{}", share_id),
        event_id: event_id.into(),
        content: Some(VaultContent {
            name: share_id.into(),
            description: String::new(),
        }),
        owner: true,
        shared: false,
        create_time: 1_700_000_000,
    }
}

pub fn item(share_id: &str, item_id: &str, revision: u64) -> ItemRevision {
    ItemRevision {
        item_id: item_id.into(),
        share_id: share_id.into(),
        revision,
        state: vault_core::ItemState::Active,
        pinned: false,
        create_time: 1_700_000_000,
        modify_time: 1_700_000_000,
        revision_time: 1_700_000_000,
        last_use_time: None,
        data: ItemData {
            kind: ItemKind::Login,
            name: item_id.into(),
            payload: String::new(),
            alias_email: None,
        },
        alias_email: None,
        content_format_version: CONTENT_FORMAT_VERSION,
    }
}

pub fn edit_draft(share_id: &str, item_id: &str, revision: u64) -> Draft {
    Draft::Edit {
        share_id: share_id.into(),
        item_id: item_id.into(),
        revision,
        form_data: Value::Null,
    }
}

/// `share-a` (evt-1) with items `a1` rev 3 and `a2` rev 1; `share-b`
/// (evt-7) empty.
pub fn snapshot() -> ReplicaSnapshot {
    let mut snapshot = ReplicaSnapshot::default();
    snapshot.shares.insert("share-a".into(), vault("share-a", "evt-1"));
    snapshot.shares.insert("share-b".into(), vault("share-b", "evt-7"));

    let items = snapshot.items.entry("share-a".into()).or_default();
    items.insert("a1".into(), item("share-a", "a1", 3));
    items.insert("a2".into(), item("share-a", "a2", 1));
    snapshot.items.insert("share-b".into(), Default::default());

    snapshot
}

pub fn events(latest_event_id: &str) -> ShareEventList {
    ShareEventList {
        latest_event_id: latest_event_id.to_string(),
        ..Default::default()
    }
}

pub fn encrypted_item(item_id: &str, revision: u64, content: &str) -> EncryptedItem {
    EncryptedItem {
        item_id: item_id.into(),
        revision,
        content_format_version: CONTENT_FORMAT_VERSION,
        content: content.into(),
        item_key: None,
        state: 1,
        pinned: false,
        alias_email: None,
        create_time: 1_700_000_000,
        modify_time: 1_700_000_100,
        revision_time: 1_700_000_100,
        last_use_time: None,
    }
}

pub fn encrypted_vault(share_id: &str, name: &str) -> EncryptedShare {
    EncryptedShare {
        share_id: share_id.into(),
        vault_id: format!("vault-{}", share_id),
        target_type: vault_sync::protocol::TARGET_TYPE_VAULT,
        target_id: format!("vault-{}", share_id),
        content: Some(name.into()),
        content_key_rotation: Some(1),
        owner: true,
        shared: false,
        create_time: 1_700_000_000,
    }
}

// =============================================================================
// Context
// =============================================================================

pub struct Harness {
    pub ctx: SyncContext,
    pub api: Arc<FakeApi>,
    pub crypto: Arc<FakeCrypto>,
    pub cache: Arc<MemoryCacheStorage>,
    pub callbacks: Arc<RecordingCallbacks>,
}

pub fn harness(snapshot: ReplicaSnapshot) -> Harness {
    harness_with(snapshot, SyncConfig::default(), Arc::new(MemoryCacheStorage::new()))
}

pub fn harness_with(
    snapshot: ReplicaSnapshot,
    config: SyncConfig,
    cache: Arc<MemoryCacheStorage>,
) -> Harness {
    let store = StoreHandle::from_snapshot(snapshot);
    let api = FakeApi::new();
    let crypto = FakeCrypto::new();
    let callbacks = RecordingCallbacks::new(store.clone());
    let session = Arc::new(FakeSession {
        lock_token: Some("lock".into()),
    });

    let ctx = SyncContext::new(
        store,
        config,
        api.clone(),
        crypto.clone(),
        session,
        cache.clone() as Arc<dyn CacheStorage>,
    )
    .with_callbacks(callbacks.clone());

    Harness {
        ctx,
        api,
        crypto,
        cache,
        callbacks,
    }
}

/// Every action received so far.
pub fn drain(rx: &mut broadcast::Receiver<Action>) -> Vec<Action> {
    let mut actions = Vec::new();
    while let Ok(action) = rx.try_recv() {
        actions.push(action);
    }
    actions
}

pub fn count(actions: &[Action], matches: impl Fn(&Action) -> bool) -> usize {
    actions.iter().filter(|a| matches(a)).count()
}
