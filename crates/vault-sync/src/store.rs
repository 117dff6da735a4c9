//! # Store Handle
//!
//! The single dispatch entry point around the replica.
//!
//! ## Dispatch Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          StoreHandle                                    │
//! │                                                                         │
//! │  task A ──┐                                                            │
//! │  task B ──┼──► dispatch(action) ──► write lock ──► ReplicaState.reduce │
//! │  task C ──┘                                │                           │
//! │                                            ▼                            │
//! │                  ┌─────────────────────────┴──────────────┐             │
//! │                  ▼                                        ▼              │
//! │     broadcast::Sender<Action>              kind-filtered mpsc senders  │
//! │     (observers, may lag)                   (lossless control signals)  │
//! │                                                   │                     │
//! │              ┌────────────────────────────────────┼──────────────┐      │
//! │              ▼                                    ▼              ▼      │
//! │         Supervisor                          EventChannel    CacheWriter │
//! │    (Start/StopEventPolling)           (WakeupPolling, delete) (Cache*)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Actions are reduced and delivered under the same lock, so every
//! subscriber observes them in reduce order. Broadcast subscribers drop
//! actions once they fall `ACTION_BUFFER` behind; kind subscribers never
//! drop one.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use vault_core::selectors::select_bound_drafts;
use vault_core::{log_id, Action, ActionKind, DraftTarget, ReplicaSnapshot, ReplicaState};

/// Buffered actions per broadcast subscriber before it starts lagging.
const ACTION_BUFFER: usize = 256;

/// A lossless subscription to some action kinds.
struct KindSubscriber {
    kinds: Vec<ActionKind>,
    tx: mpsc::UnboundedSender<Action>,
}

struct StoreInner {
    state: RwLock<ReplicaState>,
    actions: broadcast::Sender<Action>,
    subscribers: Mutex<Vec<KindSubscriber>>,
}

/// Cheaply cloneable handle to the shared replica.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

impl StoreHandle {
    pub fn new(state: ReplicaState) -> Self {
        let (actions, _) = broadcast::channel(ACTION_BUFFER);
        StoreHandle {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                actions,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn from_snapshot(snapshot: ReplicaSnapshot) -> Self {
        Self::new(ReplicaState::from_snapshot(snapshot))
    }

    /// Applies `action` and notifies every subscriber.
    pub fn dispatch(&self, action: Action) {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let kind = action.kind();
        debug!(?kind, "dispatch");
        state.reduce(&action);

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in subscribers.iter().filter(|sub| sub.kinds.contains(&kind)) {
            let _ = sub.tx.send(action.clone());
        }
        drop(subscribers);

        let _ = self.inner.actions.send(action);
    }

    /// Receives every action dispatched from now on. A slow receiver lags
    /// and skips actions.
    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.inner.actions.subscribe()
    }

    /// Receives every action of one of `kinds` dispatched from now on,
    /// without ever skipping one. Dropping the receiver unsubscribes.
    pub fn subscribe_kinds(&self, kinds: &[ActionKind]) -> mpsc::UnboundedReceiver<Action> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(KindSubscriber {
                kinds: kinds.to_vec(),
                tx,
            });
        rx
    }

    /// Runs `f` against the live replica.
    pub fn read<R>(&self, f: impl FnOnce(&ReplicaState) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Settled copy of the replica.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        self.read(ReplicaState::snapshot)
    }

    /// Discards every edit draft bound to `share_id`, or only those bound
    /// to one of `item_ids`.
    pub fn discard_drafts(&self, share_id: &str, item_ids: Option<&[String]>) -> usize {
        let bound = self.read(|state| select_bound_drafts(state, share_id, item_ids));
        let count = bound.len();

        for item in bound {
            self.dispatch(Action::DraftDiscard(DraftTarget::Edit(item)));
        }

        if count > 0 {
            debug!(share_id = %log_id(share_id), count, "Discarded drafts");
        }
        count
    }
}
