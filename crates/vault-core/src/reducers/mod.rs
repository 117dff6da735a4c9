//! # Reducers
//!
//! Registration tables mapping each [`ActionKind`] to the pure functions
//! that fold it into a slice of the replica.
//!
//! ## Replica Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ReplicaState                                   │
//! │                                                                         │
//! │   shares ─────────── Optimistic<SharesById>      (vault create/edit/   │
//! │                                                    delete chains)       │
//! │   items                                                                 │
//! │   ├── by_share_id ── Optimistic<ItemsByShareId>  (create/edit/move/    │
//! │   │                                                trash/restore/...)   │
//! │   ├── by_optimistic_id ── optimistic id ──► resolved UniqueItem        │
//! │   └── drafts ─────── Vec<Draft>                                        │
//! │                                                                         │
//! │   Every slice sees every action, one action at a time.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::actions::{Action, ActionKind};
use crate::optimistic::{Optimistic, OptimisticEngine, Reducer};
use crate::types::{Draft, ItemsByShareId, ReplicaSnapshot, SharesById, UniqueItem};

pub mod drafts;
pub mod items;
pub mod shares;

// =============================================================================
// Registry
// =============================================================================

/// A reducer for one slice, registered against one action kind.
pub type ReducerFn<S> = fn(&mut S, &Action);

/// Reducer table keyed by action kind.
///
/// Unregistered kinds leave the slice untouched.
pub struct ReducerRegistry<S> {
    handlers: HashMap<ActionKind, Vec<ReducerFn<S>>>,
}

impl<S> Default for ReducerRegistry<S> {
    fn default() -> Self {
        ReducerRegistry {
            handlers: HashMap::new(),
        }
    }
}

impl<S> ReducerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`.
    pub fn on(mut self, kind: ActionKind, handler: ReducerFn<S>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Registers `handler` for every kind in `kinds`.
    pub fn on_each(mut self, kinds: &[ActionKind], handler: ReducerFn<S>) -> Self {
        for kind in kinds {
            self = self.on(*kind, handler);
        }
        self
    }

    /// Returns true if some handler is registered for `kind`.
    pub fn handles(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl<S> Reducer<S, Action> for ReducerRegistry<S> {
    fn reduce(&self, state: &mut S, action: &Action) {
        if let Some(handlers) = self.handlers.get(&action.kind()) {
            for handler in handlers {
                handler(state, action);
            }
        }
    }

    fn handles(&self, action: &Action) -> bool {
        self.handlers.contains_key(&action.kind())
    }
}

// =============================================================================
// Replica State
// =============================================================================

/// Optimistic id ──► item it resolved to after success (or failure).
pub type ItemsByOptimisticId = BTreeMap<String, UniqueItem>;

#[derive(Debug, Clone, Default)]
pub struct ItemsState {
    pub by_share_id: Optimistic<ItemsByShareId, Action>,
    pub by_optimistic_id: ItemsByOptimisticId,
    pub drafts: Vec<Draft>,
}

/// The whole local replica.
///
/// Only ever mutated through [`ReplicaState::reduce`].
#[derive(Debug, Clone, Default)]
pub struct ReplicaState {
    pub shares: Optimistic<SharesById, Action>,
    pub items: ItemsState,
}

impl ReplicaState {
    pub fn from_snapshot(snapshot: ReplicaSnapshot) -> Self {
        ReplicaState {
            shares: Optimistic::new(snapshot.shares),
            items: ItemsState {
                by_share_id: Optimistic::new(snapshot.items),
                by_optimistic_id: BTreeMap::new(),
                drafts: snapshot.drafts,
            },
        }
    }

    /// Applies one action to every slice.
    pub fn reduce(&mut self, action: &Action) {
        root().reduce(self, action);
    }

    /// Live shares, pending guesses included.
    pub fn shares(&self) -> &SharesById {
        self.shares.state()
    }

    /// Live items, pending guesses included.
    pub fn items(&self) -> &ItemsByShareId {
        self.items.by_share_id.state()
    }

    /// Settled copy of the replica, without any pending guess.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        let root = root();
        ReplicaSnapshot {
            shares: root.shares.settled(&self.shares),
            items: root.items.settled(&self.items.by_share_id),
            drafts: self.items.drafts.clone(),
        }
    }
}

// =============================================================================
// Root Reducer
// =============================================================================

/// Combines the per-slice reducers.
pub struct RootReducer {
    shares: OptimisticEngine<SharesById, Action, ReducerRegistry<SharesById>>,
    items: OptimisticEngine<ItemsByShareId, Action, ReducerRegistry<ItemsByShareId>>,
    by_optimistic_id: ReducerRegistry<ItemsByOptimisticId>,
    drafts: ReducerRegistry<Vec<Draft>>,
}

impl RootReducer {
    fn new() -> Self {
        RootReducer {
            shares: OptimisticEngine::new(shares::matchers(), shares::registry()),
            items: OptimisticEngine::new(items::matchers(), items::registry()),
            by_optimistic_id: items::by_optimistic_id_registry(),
            drafts: drafts::registry(),
        }
    }

    pub fn reduce(&self, state: &mut ReplicaState, action: &Action) {
        self.shares.reduce(&mut state.shares, action);
        self.items.reduce(&mut state.items.by_share_id, action);
        self.by_optimistic_id
            .reduce(&mut state.items.by_optimistic_id, action);
        self.drafts.reduce(&mut state.items.drafts, action);
    }
}

static ROOT: LazyLock<RootReducer> = LazyLock::new(RootReducer::new);

/// The process-wide reducer tables.
pub fn root() -> &'static RootReducer {
    &ROOT
}
