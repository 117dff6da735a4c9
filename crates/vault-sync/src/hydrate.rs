//! # Cache Hydrator
//!
//! Restores the replica from the encrypted cache, and runs the boot
//! sequence.
//!
//! ## Hydration Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Hydrate Worker                                  │
//! │                                                                         │
//! │  StateSync ──► (abort in-flight run: latest wins)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StopEventPolling ──► CacheCancel ──► debounce                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read (cache lock) ──► decrypt (lock token) ──► sanitize               │
//! │       │                                                                 │
//! │       ├── ok ──────► merge ──► crypto.hydrate ──► StateHydrate          │
//! │       └── failed ──► Allow:    keep in-memory replica                   │
//! │                      Escalate: on_error (CacheRequest { throttle: no }) │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StartEventPolling                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vault_core::{log_id, Action, ActionKind, ItemsByShareId, ReplicaSnapshot, SharesById};

use crate::cache::{decrypt_cached_state, sanitize_cache};
use crate::context::SyncContext;
use crate::error::SyncResult;

// =============================================================================
// Options
// =============================================================================

/// Combines the live replica with the cached one.
pub type MergeFn = fn(existing: ReplicaSnapshot, incoming: ReplicaSnapshot) -> ReplicaSnapshot;

/// What to do when the cache cannot be used.
#[derive(Clone, Copy)]
pub enum FailurePolicy {
    /// Keep going with the in-memory replica.
    Allow,

    /// Run the given hook.
    Escalate(fn(&SyncContext)),
}

#[derive(Clone, Copy)]
pub struct HydrateOptions {
    pub merge: MergeFn,
    pub failure: FailurePolicy,
}

impl HydrateOptions {
    pub fn allow_failure(merge: MergeFn) -> Self {
        HydrateOptions {
            merge,
            failure: FailurePolicy::Allow,
        }
    }

    pub fn escalate(merge: MergeFn, on_error: fn(&SyncContext)) -> Self {
        HydrateOptions {
            merge,
            failure: FailurePolicy::Escalate(on_error),
        }
    }
}

/// The cached replica replaces the live one.
pub fn incoming_wins(_existing: ReplicaSnapshot, incoming: ReplicaSnapshot) -> ReplicaSnapshot {
    incoming
}

/// Requests an immediate, unthrottled cache write.
pub fn request_cache_write(ctx: &SyncContext) {
    ctx.store.dispatch(Action::CacheRequest { throttle: false });
}

// =============================================================================
// Hydration
// =============================================================================

/// Tries to restore the replica from the cache.
///
/// Returns true only if a valid cache was decrypted and dispatched.
pub async fn hydrate_from_cache(ctx: &SyncContext, options: HydrateOptions) -> bool {
    match try_hydrate(ctx, options.merge).await {
        Ok(items) => {
            info!(items, "Hydrated from cache");
            true
        }
        Err(err) => {
            match options.failure {
                FailurePolicy::Allow => {
                    info!(?err, "Cache unavailable, keeping in-memory replica");
                    if let Err(err) = ctx.crypto.hydrate(None) {
                        warn!(?err, "Crypto hydration failed");
                    }
                }
                FailurePolicy::Escalate(on_error) => {
                    warn!(?err, "Cache hydration failed");
                    on_error(ctx);
                }
            }
            false
        }
    }
}

async fn try_hydrate(ctx: &SyncContext, merge: MergeFn) -> SyncResult<usize> {
    let encrypted = {
        let _guard = ctx.cache_lock.lock().await;
        ctx.cache.read().await?
    };

    let lock_token = ctx.session.lock_token();
    let cache = decrypt_cached_state(encrypted, ctx.crypto.as_ref(), lock_token.as_deref())?;
    let cache = sanitize_cache(cache);

    ctx.crypto.hydrate(Some(&cache.snapshot))?;

    let merged = merge(ctx.store.snapshot(), cache.state);
    let items = merged.item_count();
    ctx.store.dispatch(Action::state_hydrate(merged));

    Ok(items)
}

// =============================================================================
// Hydrate Worker
// =============================================================================

/// One `StateSync` run.
async fn hydrate_worker(ctx: SyncContext) {
    ctx.store.dispatch(Action::StopEventPolling);
    ctx.store.dispatch(Action::CacheCancel);

    tokio::time::sleep(ctx.config.hydrate_debounce()).await;

    hydrate_from_cache(
        &ctx,
        HydrateOptions::escalate(incoming_wins, request_cache_write),
    )
    .await;

    ctx.store.dispatch(Action::StartEventPolling);
}

/// Runs a hydration for every `StateSync`. A newer request aborts the
/// one still running.
pub struct Hydrator {
    ctx: SyncContext,
    current: Option<JoinHandle<()>>,
}

impl Hydrator {
    pub fn spawn(ctx: SyncContext) -> HydratorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let rx = ctx.store.subscribe_kinds(&[ActionKind::StateSync]);

        let hydrator = Hydrator { ctx, current: None };
        let task = tokio::spawn(hydrator.run(rx, shutdown_rx));

        HydratorHandle { shutdown_tx, task }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Action>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                action = rx.recv() => match action {
                    Some(Action::StateSync) => {
                        if let Some(previous) = self.current.take() {
                            if !previous.is_finished() {
                                debug!("Superseding in-flight hydration");
                            }
                            previous.abort();
                        }
                        self.current = Some(tokio::spawn(hydrate_worker(self.ctx.clone())));
                    }
                    Some(_) => {}
                    None => break,
                },

                _ = shutdown_rx.recv() => break,
            }
        }

        if let Some(current) = self.current.take() {
            current.abort();
        }
    }
}

pub struct HydratorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl HydratorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Boot
// =============================================================================

/// Restores the replica from the cache, or bootstraps it remotely, then
/// starts event polling.
///
/// Returns whether the replica came from the cache.
pub async fn boot(ctx: &SyncContext) -> SyncResult<bool> {
    let hydrated = hydrate_from_cache(ctx, HydrateOptions::allow_failure(incoming_wins)).await;

    if !hydrated {
        let (shares, items) = fetch_remote(ctx).await?;
        info!(shares = shares.len(), "Bootstrapped from remote");

        ctx.store.dispatch(Action::BootSuccess { shares, items });
        ctx.store.dispatch(Action::CacheRequest { throttle: true });
    }

    ctx.store.dispatch(Action::StartEventPolling);
    Ok(hydrated)
}

/// Fetches and opens every share and its items.
async fn fetch_remote(ctx: &SyncContext) -> SyncResult<(SharesById, ItemsByShareId)> {
    let mut shares = SharesById::new();
    let mut items = ItemsByShareId::new();

    for encrypted in ctx.api.fetch_shares().await? {
        let event_id = ctx.api.latest_event_id(&encrypted.share_id).await?;
        let share = ctx.crypto.open_share(&encrypted, &event_id)?;

        let mut share_items = BTreeMap::new();
        for encrypted_item in ctx.api.fetch_items(&share.share_id).await? {
            match ctx.crypto.open_item(&share.share_id, &encrypted_item) {
                Ok(item) => {
                    share_items.insert(item.item_id.clone(), item);
                }
                Err(err) => warn!(
                    share_id = %log_id(&share.share_id),
                    item_id = %log_id(&encrypted_item.item_id),
                    ?err,
                    "Skipping undecryptable item"
                ),
            }
        }

        items.insert(share.share_id.clone(), share_items);
        shares.insert(share.share_id.clone(), share);
    }

    Ok((shares, items))
}
