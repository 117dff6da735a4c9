//! # Optimistic Store
//!
//! Generic engine that applies a local mutation immediately and later
//! reconciles it with the authoritative outcome, without ever losing the
//! ability to undo it.
//!
//! ## Chain Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Optimistic Chain (per key)                         │
//! │                                                                         │
//! │   initiate ──► checkpoint captured (first open chain only)             │
//! │      │         guess applied to live state                             │
//! │      ▼                                                                  │
//! │   fail* ─────► chain marked failed, revert target kept                 │
//! │      │                                                                  │
//! │      ├── commit ─► chain entries become permanent history              │
//! │      │             commit payload applied on top                       │
//! │      │                                                                  │
//! │      └── revert ─► chain entries dropped                               │
//! │                    live state = replay(checkpoint, remaining history)  │
//! │                                                                         │
//! │   No open chain left ─► checkpoint and history are discarded           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every action reduced while a chain is open is recorded, so a revert
//! replays server-sync actions that arrived in the meantime: authoritative
//! data is never lost when a guess is undone. A second `initiate` on a key
//! that is still open joins that chain, so reverting it lands on the state
//! captured before the *first* initiate.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

// =============================================================================
// Keys & Traits
// =============================================================================

/// Identifies one optimistic chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptimisticKey(String);

impl OptimisticKey {
    /// Chain key for an item (or a temporary item id) inside a share.
    pub fn item(share_id: &str, item_id: &str) -> Self {
        OptimisticKey(format!("item::{}::{}", share_id, item_id))
    }

    /// Chain key for a share-level mutation.
    pub fn share(share_id: &str) -> Self {
        OptimisticKey(format!("share::{}", share_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptimisticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Actions that can take part in an optimistic chain.
pub trait OptimisticAction: Clone {
    /// Key of the chain this action would belong to, if any.
    fn optimistic_key(&self) -> Option<OptimisticKey>;
}

/// A state transition function.
pub trait Reducer<S, A> {
    fn reduce(&self, state: &mut S, action: &A);

    /// Returns false if `action` can never change the state.
    fn handles(&self, _action: &A) -> bool {
        true
    }
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&mut S, &A),
{
    fn reduce(&self, state: &mut S, action: &A) {
        self(state, action)
    }
}

/// Pure predicate recognizing one kind of action.
pub type Matcher<A> = fn(&A) -> bool;

/// Role an action plays in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initiate,
    Fail,
    Commit,
    Revert,
}

// =============================================================================
// Matchers
// =============================================================================

/// Matcher set for one class of mutation (create, edit, move, ...).
pub struct OptimisticMatchers<A> {
    initiate: Vec<Matcher<A>>,
    fail: Vec<Matcher<A>>,
    commit: Vec<Matcher<A>>,
    revert: Vec<Matcher<A>>,
}

impl<A> OptimisticMatchers<A> {
    /// Starts a matcher set from the action that opens the chain.
    pub fn initiate(matcher: Matcher<A>) -> Self {
        OptimisticMatchers {
            initiate: vec![matcher],
            fail: Vec::new(),
            commit: Vec::new(),
            revert: Vec::new(),
        }
    }

    pub fn fail(mut self, matcher: Matcher<A>) -> Self {
        self.fail.push(matcher);
        self
    }

    pub fn commit(mut self, matcher: Matcher<A>) -> Self {
        self.commit.push(matcher);
        self
    }

    pub fn revert(mut self, matcher: Matcher<A>) -> Self {
        self.revert.push(matcher);
        self
    }

    fn phase(&self, action: &A) -> Option<Phase> {
        let any = |matchers: &[Matcher<A>]| matchers.iter().any(|m| m(action));

        if any(&self.initiate) {
            Some(Phase::Initiate)
        } else if any(&self.fail) {
            Some(Phase::Fail)
        } else if any(&self.commit) {
            Some(Phase::Commit)
        } else if any(&self.revert) {
            Some(Phase::Revert)
        } else {
            None
        }
    }
}

// =============================================================================
// Wrapped State
// =============================================================================

#[derive(Debug, Clone)]
struct HistoryEntry<A> {
    /// Open chain this entry belongs to. `None` once permanent.
    chain: Option<OptimisticKey>,
    action: A,
}

/// A state slice wrapped with optimistic bookkeeping.
#[derive(Debug, Clone)]
pub struct Optimistic<S, A> {
    state: S,
    checkpoint: Option<S>,
    history: Vec<HistoryEntry<A>>,
    failed: BTreeSet<OptimisticKey>,
}

impl<S: Default, A> Default for Optimistic<S, A> {
    fn default() -> Self {
        Optimistic::new(S::default())
    }
}

impl<S, A> Optimistic<S, A> {
    pub fn new(state: S) -> Self {
        Optimistic {
            state,
            checkpoint: None,
            history: Vec::new(),
            failed: BTreeSet::new(),
        }
    }

    /// Live state, including pending guesses.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns true while a chain is open for `key`.
    pub fn is_pending(&self, key: &OptimisticKey) -> bool {
        self.history
            .iter()
            .any(|entry| entry.chain.as_ref() == Some(key))
    }

    /// Returns true if the open chain for `key` received a failure.
    pub fn is_failed(&self, key: &OptimisticKey) -> bool {
        self.failed.contains(key)
    }

    /// Keys of every open chain.
    pub fn pending_keys(&self) -> BTreeSet<&OptimisticKey> {
        self.history
            .iter()
            .filter_map(|entry| entry.chain.as_ref())
            .collect()
    }

    /// Returns true if any chain is open.
    pub fn has_pending(&self) -> bool {
        self.checkpoint.is_some()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Applies actions to an [`Optimistic`] slice according to its matchers.
pub struct OptimisticEngine<S, A, R> {
    matchers: Vec<OptimisticMatchers<A>>,
    reducer: R,
    _state: PhantomData<fn(&mut S)>,
}

impl<S, A, R> OptimisticEngine<S, A, R>
where
    S: Clone,
    A: OptimisticAction,
    R: Reducer<S, A>,
{
    pub fn new(matchers: Vec<OptimisticMatchers<A>>, reducer: R) -> Self {
        OptimisticEngine {
            matchers,
            reducer,
            _state: PhantomData,
        }
    }

    /// The wrapped (non-optimistic) reducer.
    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Reduces one action. Never fails: a commit, fail or revert without an
    /// open chain is reduced as a plain action.
    pub fn reduce(&self, wrapped: &mut Optimistic<S, A>, action: &A) {
        match self.classify(action) {
            Some((Phase::Initiate, key)) => self.initiate(wrapped, key, action),
            Some((Phase::Fail, key)) if wrapped.is_pending(&key) => {
                self.fail(wrapped, key, action)
            }
            Some((Phase::Commit, key)) if wrapped.is_pending(&key) => {
                self.commit(wrapped, key, action)
            }
            Some((Phase::Revert, key)) if wrapped.is_pending(&key) => {
                self.revert(wrapped, key, action)
            }
            _ => self.passthrough(wrapped, action),
        }
    }

    /// State with every pending guess removed: checkpoint plus permanent
    /// history only.
    pub fn settled(&self, wrapped: &Optimistic<S, A>) -> S {
        match &wrapped.checkpoint {
            None => wrapped.state.clone(),
            Some(checkpoint) => self.replay(
                checkpoint,
                wrapped
                    .history
                    .iter()
                    .filter(|entry| entry.chain.is_none()),
            ),
        }
    }

    fn classify(&self, action: &A) -> Option<(Phase, OptimisticKey)> {
        let phase = self.matchers.iter().find_map(|m| m.phase(action))?;
        let key = action.optimistic_key()?;
        Some((phase, key))
    }

    fn initiate(&self, wrapped: &mut Optimistic<S, A>, key: OptimisticKey, action: &A) {
        if wrapped.checkpoint.is_none() {
            wrapped.checkpoint = Some(wrapped.state.clone());
        }

        wrapped.failed.remove(&key);
        self.reducer.reduce(&mut wrapped.state, action);
        wrapped.history.push(HistoryEntry {
            chain: Some(key),
            action: action.clone(),
        });
    }

    fn fail(&self, wrapped: &mut Optimistic<S, A>, key: OptimisticKey, action: &A) {
        self.reducer.reduce(&mut wrapped.state, action);
        wrapped.history.push(HistoryEntry {
            chain: Some(key.clone()),
            action: action.clone(),
        });
        wrapped.failed.insert(key);
    }

    fn commit(&self, wrapped: &mut Optimistic<S, A>, key: OptimisticKey, action: &A) {
        for entry in wrapped
            .history
            .iter_mut()
            .filter(|entry| entry.chain.as_ref() == Some(&key))
        {
            entry.chain = None;
        }

        wrapped.failed.remove(&key);
        self.passthrough(wrapped, action);
        Self::collapse(wrapped);
    }

    fn revert(&self, wrapped: &mut Optimistic<S, A>, key: OptimisticKey, action: &A) {
        let Some(checkpoint) = wrapped.checkpoint.take() else {
            self.passthrough(wrapped, action);
            return;
        };

        wrapped
            .history
            .retain(|entry| entry.chain.as_ref() != Some(&key));
        wrapped.failed.remove(&key);
        wrapped.history.push(HistoryEntry {
            chain: None,
            action: action.clone(),
        });

        wrapped.state = self.replay(&checkpoint, wrapped.history.iter());
        wrapped.checkpoint = Some(checkpoint);
        Self::collapse(wrapped);
    }

    fn passthrough(&self, wrapped: &mut Optimistic<S, A>, action: &A) {
        if !self.reducer.handles(action) {
            return;
        }

        self.reducer.reduce(&mut wrapped.state, action);

        if wrapped.checkpoint.is_some() {
            wrapped.history.push(HistoryEntry {
                chain: None,
                action: action.clone(),
            });
        }
    }

    fn replay<'a>(&self, base: &S, entries: impl Iterator<Item = &'a HistoryEntry<A>>) -> S
    where
        A: 'a,
    {
        let mut state = base.clone();
        for entry in entries {
            self.reducer.reduce(&mut state, &entry.action);
        }
        state
    }

    fn collapse(wrapped: &mut Optimistic<S, A>) {
        if wrapped.history.iter().all(|entry| entry.chain.is_none()) {
            wrapped.checkpoint = None;
            wrapped.history.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Counters = BTreeMap<&'static str, i64>;

    #[derive(Debug, Clone)]
    enum Op {
        Intent(&'static str, i64),
        Failure(&'static str),
        Success(&'static str, i64),
        Dismiss(&'static str),
        Server(&'static str, i64),
        Tick,
    }

    impl OptimisticAction for Op {
        fn optimistic_key(&self) -> Option<OptimisticKey> {
            let name = match self {
                Op::Intent(k, _) | Op::Failure(k) | Op::Success(k, _) | Op::Dismiss(k) => k,
                Op::Server(k, _) => k,
                Op::Tick => return None,
            };
            Some(OptimisticKey::item("share", name))
        }
    }

    fn reduce(state: &mut Counters, op: &Op) {
        match op {
            Op::Intent(k, v) | Op::Success(k, v) | Op::Server(k, v) => {
                state.insert(k, *v);
            }
            Op::Failure(_) | Op::Dismiss(_) | Op::Tick => {}
        }
    }

    /// Same reducer, declaring that ticks never touch the state.
    struct IgnoresTicks;

    impl Reducer<Counters, Op> for IgnoresTicks {
        fn reduce(&self, state: &mut Counters, op: &Op) {
            reduce(state, op)
        }

        fn handles(&self, op: &Op) -> bool {
            !matches!(op, Op::Tick)
        }
    }

    fn matchers() -> Vec<OptimisticMatchers<Op>> {
        vec![OptimisticMatchers::initiate(|op: &Op| matches!(op, Op::Intent(..)))
            .fail(|op| matches!(op, Op::Failure(_)))
            .commit(|op| matches!(op, Op::Success(..)))
            .revert(|op| matches!(op, Op::Dismiss(_)))]
    }

    fn engine() -> OptimisticEngine<Counters, Op, fn(&mut Counters, &Op)> {
        OptimisticEngine::new(matchers(), reduce as fn(&mut Counters, &Op))
    }

    fn seeded() -> Optimistic<Counters, Op> {
        Optimistic::new(BTreeMap::from([("a", 1), ("b", 10)]))
    }

    #[test]
    fn test_commit_after_failures_lands_on_payload() {
        let engine = engine();
        for fails in 0..4 {
            let mut wrapped = seeded();
            engine.reduce(&mut wrapped, &Op::Intent("a", 2));
            for _ in 0..fails {
                engine.reduce(&mut wrapped, &Op::Failure("a"));
            }
            engine.reduce(&mut wrapped, &Op::Success("a", 5));

            assert_eq!(wrapped.state()["a"], 5);
            assert!(!wrapped.has_pending());
            assert!(!wrapped.is_failed(&OptimisticKey::item("share", "a")));
        }
    }

    #[test]
    fn test_revert_after_failures_restores_pre_initiate_state() {
        let engine = engine();
        for fails in 0..4 {
            let mut wrapped = seeded();
            let before = wrapped.state().clone();

            engine.reduce(&mut wrapped, &Op::Intent("a", 2));
            for _ in 0..fails {
                engine.reduce(&mut wrapped, &Op::Failure("a"));
            }
            engine.reduce(&mut wrapped, &Op::Dismiss("a"));

            assert_eq!(wrapped.state(), &before);
            assert!(!wrapped.has_pending());
        }
    }

    #[test]
    fn test_failure_marks_chain_until_retry() {
        let engine = engine();
        let key = OptimisticKey::item("share", "a");
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Failure("a"));
        assert!(wrapped.is_failed(&key));
        assert_eq!(wrapped.state()["a"], 2);

        engine.reduce(&mut wrapped, &Op::Intent("a", 3));
        assert!(!wrapped.is_failed(&key));
        assert!(wrapped.is_pending(&key));
    }

    #[test]
    fn test_independent_chains_interleave() {
        let engine = engine();
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Intent("b", 20));
        engine.reduce(&mut wrapped, &Op::Dismiss("a"));

        assert_eq!(wrapped.state()["a"], 1);
        assert_eq!(wrapped.state()["b"], 20);
        assert!(wrapped.is_pending(&OptimisticKey::item("share", "b")));

        engine.reduce(&mut wrapped, &Op::Success("b", 21));
        assert_eq!(wrapped.state()["b"], 21);
        assert!(!wrapped.has_pending());
    }

    #[test]
    fn test_second_initiate_joins_chain_instead_of_stacking() {
        let engine = engine();
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Failure("a"));
        engine.reduce(&mut wrapped, &Op::Intent("a", 3));
        engine.reduce(&mut wrapped, &Op::Dismiss("a"));

        assert_eq!(wrapped.state()["a"], 1);
    }

    #[test]
    fn test_server_updates_survive_revert() {
        let engine = engine();
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Server("b", 99));
        engine.reduce(&mut wrapped, &Op::Server("a", 7));
        engine.reduce(&mut wrapped, &Op::Dismiss("a"));

        assert_eq!(wrapped.state()["a"], 7);
        assert_eq!(wrapped.state()["b"], 99);
    }

    #[test]
    fn test_resolution_without_open_chain_is_plain_reduce() {
        let engine = engine();
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Dismiss("a"));
        engine.reduce(&mut wrapped, &Op::Failure("a"));
        engine.reduce(&mut wrapped, &Op::Success("a", 4));

        assert_eq!(wrapped.state()["a"], 4);
        assert!(!wrapped.has_pending());
        assert!(!wrapped.is_failed(&OptimisticKey::item("share", "a")));
    }

    #[test]
    fn test_settled_excludes_pending_guesses() {
        let engine = engine();
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Server("b", 11));

        let settled = engine.settled(&wrapped);
        assert_eq!(settled["a"], 1);
        assert_eq!(settled["b"], 11);
        assert_eq!(wrapped.state()["a"], 2);
    }

    #[test]
    fn test_unhandled_actions_are_not_recorded() {
        let engine: OptimisticEngine<Counters, Op, IgnoresTicks> =
            OptimisticEngine::new(matchers(), IgnoresTicks);
        let mut wrapped = seeded();

        engine.reduce(&mut wrapped, &Op::Intent("a", 2));
        engine.reduce(&mut wrapped, &Op::Failure("a"));
        for _ in 0..1_000 {
            engine.reduce(&mut wrapped, &Op::Tick);
        }
        engine.reduce(&mut wrapped, &Op::Server("b", 11));

        assert_eq!(wrapped.history.len(), 3);
        assert_eq!(engine.settled(&wrapped)["b"], 11);

        engine.reduce(&mut wrapped, &Op::Dismiss("a"));
        assert_eq!(wrapped.state()["a"], 1);
        assert!(!wrapped.has_pending());
    }
}
