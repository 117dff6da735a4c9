//! # Encrypted Cache
//!
//! Persists the settled replica between sessions and writes it back when
//! asked to.
//!
//! ## Cache Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Encrypted Cache                                  │
//! │                                                                         │
//! │  CacheStorage ──► EncryptedCache { ciphertext?, metadata? }            │
//! │                          │                                              │
//! │                          ▼  CryptoProvider::decrypt_cache(lock token)   │
//! │                   CachePayload (JSON)                                   │
//! │                   ├── state: ReplicaSnapshot   (settled, no guesses)   │
//! │                   └── snapshot: CryptoSnapshot (key cache)             │
//! │                          │                                              │
//! │                          ▼  sanitize_cache                              │
//! │                   DecryptedCache                                        │
//! │                                                                         │
//! │  WRITES (CacheWriter task)                                             │
//! │  ─────────────────────────                                             │
//! │  CacheRequest { throttle: true }  ──► write once the throttle elapses  │
//! │  CacheRequest { throttle: false } ──► write now                        │
//! │  CacheCancel                      ──► drop the pending write           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use vault_core::{Action, ActionKind, ReplicaSnapshot};
use vault_db::{CacheRepository, Database};

use crate::context::SyncContext;
use crate::crypto::{CryptoProvider, CryptoSnapshot};
use crate::error::{SyncError, SyncResult};

/// Bumped whenever [`CachePayload`] changes shape. Older caches are
/// discarded on read.
pub const CACHE_VERSION: u32 = 1;

/// Storage slot used by [`SqliteCacheStorage::new`].
pub const DEFAULT_CACHE_SLOT: &str = "replica";

// =============================================================================
// Cache Types
// =============================================================================

/// Metadata stored in clear next to the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,

    /// Epoch seconds.
    pub written_at: i64,
}

impl CacheMetadata {
    pub fn current() -> Self {
        CacheMetadata {
            version: CACHE_VERSION,
            written_at: Utc::now().timestamp(),
        }
    }
}

/// What a [`CacheStorage`] hands back. Both parts may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncryptedCache {
    pub ciphertext: Option<Vec<u8>>,
    pub metadata: Option<CacheMetadata>,
}

/// Plaintext layout of the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePayload {
    pub state: ReplicaSnapshot,

    #[serde(default)]
    pub snapshot: Option<CryptoSnapshot>,
}

/// A cache that decrypted and parsed cleanly.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedCache {
    pub state: ReplicaSnapshot,
    pub snapshot: CryptoSnapshot,
}

// =============================================================================
// Decryption
// =============================================================================

/// Decrypts and parses a stored cache.
///
/// Fails unless both the replica and the crypto snapshot are present.
pub fn decrypt_cached_state(
    cache: EncryptedCache,
    crypto: &dyn CryptoProvider,
    lock_token: Option<&str>,
) -> SyncResult<DecryptedCache> {
    let ciphertext = cache.ciphertext.ok_or(SyncError::CacheMissing)?;
    let metadata = cache
        .metadata
        .ok_or_else(|| SyncError::CacheCorrupted("missing metadata".into()))?;

    if metadata.version != CACHE_VERSION {
        return Err(SyncError::CacheCorrupted(format!(
            "unsupported cache version {}",
            metadata.version
        )));
    }

    let plaintext = crypto.decrypt_cache(&ciphertext, lock_token)?;
    let payload: CachePayload = serde_json::from_slice(&plaintext)?;
    let snapshot = payload
        .snapshot
        .ok_or_else(|| SyncError::CacheCorrupted("missing crypto snapshot".into()))?;

    Ok(DecryptedCache {
        state: payload.state,
        snapshot,
    })
}

/// Drops items and drafts that point at a share the cache does not hold.
pub fn sanitize_cache(mut cache: DecryptedCache) -> DecryptedCache {
    let state = &mut cache.state;
    let shares = &state.shares;

    let before = state.item_count();
    state.items.retain(|share_id, _| shares.contains_key(share_id));
    state.drafts.retain(|draft| match draft {
        vault_core::Draft::Edit { share_id, .. } => shares.contains_key(share_id),
        vault_core::Draft::New { .. } => true,
    });

    let dropped = before - state.item_count();
    if dropped > 0 {
        warn!(dropped, "Dropped cached items of unknown shares");
    }

    cache
}

// =============================================================================
// Cache Storage
// =============================================================================

/// Where the encrypted cache lives.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn read(&self) -> SyncResult<EncryptedCache>;

    async fn write(&self, ciphertext: Vec<u8>, metadata: CacheMetadata) -> SyncResult<()>;

    async fn clear(&self) -> SyncResult<()>;
}

/// In-memory storage. Counts writes.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    cache: Mutex<EncryptedCache>,
    writes: AtomicUsize,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: EncryptedCache) -> Self {
        MemoryCacheStorage {
            cache: Mutex::new(cache),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> EncryptedCache {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn read(&self) -> SyncResult<EncryptedCache> {
        Ok(self.current())
    }

    async fn write(&self, ciphertext: Vec<u8>, metadata: CacheMetadata) -> SyncResult<()> {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = EncryptedCache {
            ciphertext: Some(ciphertext),
            metadata: Some(metadata),
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = EncryptedCache::default();
        Ok(())
    }
}

/// SQLite-backed storage, one row per slot.
#[derive(Debug, Clone)]
pub struct SqliteCacheStorage {
    repo: CacheRepository,
    slot: String,
}

impl SqliteCacheStorage {
    pub fn new(db: &Database) -> Self {
        Self::with_slot(db, DEFAULT_CACHE_SLOT)
    }

    pub fn with_slot(db: &Database, slot: impl Into<String>) -> Self {
        SqliteCacheStorage {
            repo: db.cache(),
            slot: slot.into(),
        }
    }
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn read(&self) -> SyncResult<EncryptedCache> {
        let Some(blob) = self.repo.read(&self.slot).await? else {
            return Ok(EncryptedCache::default());
        };

        let metadata = match serde_json::from_str::<CacheMetadata>(&blob.metadata) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(slot = %self.slot, ?err, "Unreadable cache metadata");
                None
            }
        };

        Ok(EncryptedCache {
            ciphertext: Some(blob.ciphertext),
            metadata,
        })
    }

    async fn write(&self, ciphertext: Vec<u8>, metadata: CacheMetadata) -> SyncResult<()> {
        let metadata = serde_json::to_string(&metadata)?;
        self.repo.write(&self.slot, &ciphertext, &metadata).await?;
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        self.repo.clear(&self.slot).await?;
        Ok(())
    }
}

// =============================================================================
// Cache Writer
// =============================================================================

/// Seals the settled replica and stores it.
pub async fn write_cache(ctx: &SyncContext) -> SyncResult<()> {
    if ctx.session.is_locked() {
        return Err(SyncError::SessionLocked);
    }

    let _guard = ctx.cache_lock.lock().await;

    let payload = CachePayload {
        state: ctx.store.snapshot(),
        snapshot: ctx.crypto.snapshot(),
    };
    let plaintext = serde_json::to_vec(&payload)?;
    let lock_token = ctx.session.lock_token();
    let ciphertext = ctx.crypto.encrypt_cache(&plaintext, lock_token.as_deref())?;

    ctx.cache.write(ciphertext, CacheMetadata::current()).await?;

    debug!(items = payload.state.item_count(), "Cache written");
    Ok(())
}

/// Background task reacting to `CacheRequest` and `CacheCancel`.
pub struct CacheWriter {
    ctx: SyncContext,
    pending: Option<Instant>,
}

impl CacheWriter {
    /// Spawns the writer. It stops when the handle shuts it down or the
    /// store goes away.
    pub fn spawn(ctx: SyncContext) -> CacheWriterHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let rx = ctx
            .store
            .subscribe_kinds(&[ActionKind::CacheRequest, ActionKind::CacheCancel]);

        let writer = CacheWriter { ctx, pending: None };
        let task = tokio::spawn(writer.run(rx, shutdown_rx));

        CacheWriterHandle { shutdown_tx, task }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Action>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Cache writer started");

        loop {
            let pending = self.pending;
            let throttle = async move {
                match pending {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                action = rx.recv() => match action {
                    Some(Action::CacheRequest { throttle: true }) => {
                        if self.pending.is_none() {
                            self.pending = Some(Instant::now() + self.ctx.config.write_throttle());
                        }
                    }
                    Some(Action::CacheRequest { throttle: false }) => {
                        self.pending = None;
                        self.write().await;
                    }
                    Some(Action::CacheCancel) => {
                        if self.pending.take().is_some() {
                            debug!("Pending cache write cancelled");
                        }
                    }
                    Some(_) => {}
                    None => break,
                },

                _ = throttle => {
                    self.pending = None;
                    self.write().await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Cache writer received shutdown");
                    break;
                }
            }
        }

        info!("Cache writer stopped");
    }

    async fn write(&self) {
        if let Err(err) = write_cache(&self.ctx).await {
            match err {
                SyncError::SessionLocked => debug!("Session locked, cache write skipped"),
                other => error!(?other, "Cache write failed"),
            }
        }
    }
}

/// Handle for stopping a running [`CacheWriter`].
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer to stop and waits for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
