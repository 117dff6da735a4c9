//! # Share Event Channel
//!
//! One long-polling task per share, keeping the share's slice of the
//! replica in step with the server's event log.
//!
//! ## Channel Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Share Event Channel                               │
//! │                                                                         │
//! │  spawn_share_channel(share)                                            │
//! │        │                                                                │
//! │        ├──► fork: wakeup listener   WakeupPolling ──► poll now         │
//! │        ├──► fork: deletion waiter   VaultDeleteSuccess(share) ──► close│
//! │        ▼                                                                │
//! │  ┌───────────┐   event_id from replica, else latest-event endpoint     │
//! │  │  resolve  │                                                          │
//! │  └─────┬─────┘                                                          │
//! │        ▼                                                                │
//! │  ┌───────────┐  ok ──► on_event ──► sleep(interval | min if more)      │
//! │  │   poll    │  300004 ──► share disabled ──► close                    │
//! │  └─────┬─────┘  other ──► warn ──► sleep(max(interval, backoff))       │
//! │        │                                                                │
//! │        └──── loop until closed ◄── close() / wake() interrupt sleep    │
//! │                                                                         │
//! │  Closing cancels the poll and both forks together. A response that     │
//! │  lands after close is dropped.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vault_core::selectors::{select_event_id, select_share};
use vault_core::{log_id, Action, ActionKind};

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::protocol::ShareEventList;

// =============================================================================
// Channel Handle
// =============================================================================

/// Control handle for a running share channel.
pub struct ChannelHandle {
    share_id: String,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn share_id(&self) -> &str {
        &self.share_id
    }

    /// Stops polling. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Interrupts the current sleep so the next poll starts now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }

    /// Waits for the channel and its forks to finish.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// Starts polling `share_id`.
pub fn spawn_share_channel(ctx: SyncContext, share_id: impl Into<String>) -> ChannelHandle {
    let share_id = share_id.into();
    let cancel = CancellationToken::new();
    let wake = Arc::new(Notify::new());

    // Subscribed before spawning so no action dispatched from here on is missed.
    let wakeup_rx = ctx.store.subscribe_kinds(&[ActionKind::WakeupPolling]);
    let deletion_rx = ctx.store.subscribe_kinds(&[ActionKind::VaultDeleteSuccess]);

    let channel = ShareChannel {
        ctx,
        share_id: share_id.clone(),
        cancel: cancel.clone(),
        wake: wake.clone(),
    };
    let task = tokio::spawn(channel.run(wakeup_rx, deletion_rx));

    ChannelHandle {
        share_id,
        cancel,
        wake,
        task,
    }
}

// =============================================================================
// Channel Task
// =============================================================================

struct ShareChannel {
    ctx: SyncContext,
    share_id: String,
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

impl ShareChannel {
    async fn run(
        self,
        wakeup_rx: mpsc::UnboundedReceiver<Action>,
        deletion_rx: mpsc::UnboundedReceiver<Action>,
    ) {
        info!(share_id = %log_id(&self.share_id), "Start polling");

        let wakeup = tokio::spawn(wakeup_listener(
            wakeup_rx,
            self.wake.clone(),
            self.cancel.clone(),
        ));
        let deletion = tokio::spawn(deletion_waiter(
            deletion_rx,
            self.ctx.clone(),
            self.share_id.clone(),
            self.cancel.clone(),
        ));

        self.poll_loop().await;

        self.cancel.cancel();
        let _ = tokio::join!(wakeup, deletion);

        info!(share_id = %log_id(&self.share_id), "Closing channel");
    }

    async fn poll_loop(&self) {
        let Some(mut event_id) = self.resolve_event_id().await else {
            return;
        };

        let mut backoff = self.ctx.config.backoff();

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.poll(&event_id) => result,
            };

            if self.cancel.is_cancelled() {
                debug!(share_id = %log_id(&self.share_id), "Dropping result after close");
                return;
            }

            let delay = match result {
                Ok(events) => {
                    backoff.reset();
                    let cursor = events.cursor();
                    self.on_event(events);

                    if !cursor.event_id.is_empty() {
                        event_id = cursor.event_id;
                    }
                    next_delay(&self.ctx, cursor.more)
                }
                Err(err) if err.is_share_disabled() => {
                    self.on_share_disabled();
                    return;
                }
                Err(err) => {
                    warn!(share_id = %log_id(&self.share_id), ?err, "Polling failed");
                    let retry = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.ctx.config.poll_interval());
                    retry.max(self.ctx.config.poll_interval())
                }
            };

            if !self.sleep(delay).await {
                return;
            }
        }
    }

    /// Known watermark, else the server's current one.
    ///
    /// Returns `None` if the channel closed first.
    async fn resolve_event_id(&self) -> Option<String> {
        let known = self.ctx.store.read(|state| {
            select_share(state, &self.share_id)
                .map(|_| select_event_id(state, &self.share_id).map(str::to_owned))
        });

        let Some(known) = known else {
            info!(share_id = %log_id(&self.share_id), "Share not in replica");
            return None;
        };

        if let Some(event_id) = known {
            return Some(event_id);
        }

        let mut backoff = self.ctx.config.backoff();
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.with_timeout(self.ctx.api.latest_event_id(&self.share_id)) => result,
            };

            match result {
                Ok(event_id) => return Some(event_id),
                Err(err) if err.is_share_disabled() => {
                    self.on_share_disabled();
                    return None;
                }
                Err(err) => {
                    warn!(share_id = %log_id(&self.share_id), ?err, "Failed to fetch latest event id");
                    let retry = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.ctx.config.poll_interval());
                    if !self.sleep(retry).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn poll(&self, event_id: &str) -> SyncResult<ShareEventList> {
        debug!(
            share_id = %log_id(&self.share_id),
            event_id = %log_id(event_id),
            "Polling"
        );
        self.with_timeout(self.ctx.api.share_events(&self.share_id, event_id))
            .await
    }

    async fn with_timeout<T>(
        &self,
        request: impl std::future::Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        let limit = self.ctx.config.request_timeout();
        tokio::time::timeout(limit, request)
            .await
            .unwrap_or(Err(SyncError::Timeout(limit.as_secs())))
    }

    /// Sleeps for `delay` unless woken or closed. Returns false if closed.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.wake.notified() => {
                debug!(share_id = %log_id(&self.share_id), "Woken up");
                true
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    // =========================================================================
    // Event Handling
    // =========================================================================

    /// Applies one poll result.
    ///
    /// Callbacks run before the dispatches they announce.
    fn on_event(&self, events: ShareEventList) {
        let store = &self.ctx.store;
        let callbacks = &self.ctx.callbacks;
        let share_id = self.share_id.as_str();
        let event_id = events.latest_event_id.as_str();

        debug!(
            share_id = %log_id(share_id),
            event_id = %log_id(event_id),
            deleted = events.deleted_item_ids.len(),
            updated = events.updated_items.len(),
            "Event"
        );

        let current = store.read(|state| select_event_id(state, share_id).map(str::to_owned));
        let changed = current.as_deref() != Some(event_id);

        if !event_id.is_empty() && (changed || self.ctx.config.polling.dispatch_unchanged_watermark)
        {
            store.dispatch(Action::ShareEvent {
                share_id: share_id.to_string(),
                event_id: event_id.to_string(),
            });
        }

        if let Some(updated) = events.updated_share.as_ref().filter(|s| s.is_vault()) {
            match self.ctx.crypto.open_share(updated, event_id) {
                Ok(share) => store.dispatch(Action::ShareEditSync {
                    share_id: share.share_id.clone(),
                    share,
                }),
                Err(err) => warn!(share_id = %log_id(share_id), ?err, "Cannot open updated share"),
            }
        }

        let deleted = &events.deleted_item_ids;
        if !deleted.is_empty() {
            store.discard_drafts(share_id, Some(deleted.as_slice()));
            callbacks.on_items_deleted(share_id, deleted);
        }

        if events.items_mutated() {
            callbacks.on_items_updated();
        }

        for item_id in deleted {
            store.dispatch(Action::ItemDeleteSync {
                share_id: share_id.to_string(),
                item_id: item_id.clone(),
            });
        }

        for encrypted in &events.updated_items {
            match self.ctx.crypto.open_item(share_id, encrypted) {
                Ok(item) => store.dispatch(Action::ItemEditSync {
                    share_id: item.share_id.clone(),
                    item,
                }),
                Err(err) => warn!(
                    share_id = %log_id(share_id),
                    item_id = %log_id(&encrypted.item_id),
                    ?err,
                    "Skipping undecryptable item"
                ),
            }
        }

        for used in events.last_use_items.iter().flatten() {
            store.dispatch(Action::ItemUsedSync {
                share_id: share_id.to_string(),
                item_id: used.item_id.clone(),
                last_use_time: used.last_use_time,
            });
        }
    }

    /// The share was disabled or access revoked: terminal.
    fn on_share_disabled(&self) {
        info!(share_id = %log_id(&self.share_id), "Share disabled");
        self.cancel.cancel();

        let store = &self.ctx.store;
        let exists = store.read(|state| select_share(state, &self.share_id).is_some());
        if !exists {
            return;
        }

        self.ctx.callbacks.on_share_deleted(&self.share_id);
        self.ctx.callbacks.on_items_updated();
        store.discard_drafts(&self.share_id, None);
        store.dispatch(Action::ShareDeleteSync {
            share_id: self.share_id.clone(),
        });
    }
}

/// Delay before the next poll after a successful one.
fn next_delay(ctx: &SyncContext, more: bool) -> Duration {
    if more {
        ctx.config.min_poll_interval()
    } else {
        ctx.config.poll_interval()
    }
}

// =============================================================================
// Forked Tasks
// =============================================================================

/// Turns every `WakeupPolling` into an immediate poll.
async fn wakeup_listener(
    mut rx: mpsc::UnboundedReceiver<Action>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            action = rx.recv() => match action {
                Some(_) => wake.notify_one(),
                None => break,
            },
        }
    }
}

/// Closes the channel once its share is deleted locally.
async fn deletion_waiter(
    mut rx: mpsc::UnboundedReceiver<Action>,
    ctx: SyncContext,
    share_id: String,
    cancel: CancellationToken,
) {
    let deleted = loop {
        let action = tokio::select! {
            biased;
            _ = cancel.cancelled() => break false,
            action = rx.recv() => action,
        };

        match action {
            Some(action) if action.share_id() == Some(share_id.as_str()) => break true,
            Some(_) => continue,
            None => break false,
        }
    };

    if deleted {
        info!(share_id = %log_id(&share_id), "Share deleted");
        cancel.cancel();
        ctx.store.discard_drafts(&share_id, None);
    }
}
