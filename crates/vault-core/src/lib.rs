//! # vault-core: Pure Replica Logic
//!
//! This crate is the **heart** of the vault replica. It holds every state
//! transition of the local copy of shares and items as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Vault Replica Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI layer (out of scope)                      │   │
//! │  │      dispatches intents ──► reads selectors                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        vault-sync (store handle, channels, hydrator)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Action                                 │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vault-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │  actions  │  │optimistic │  │  reducers  │  │ selectors │ │   │
//! │  │   │  Action   │  │ checkpoint│  │ items      │  │ watermark │ │   │
//! │  │   │  kinds    │  │ + replay  │  │ shares     │  │ drafts    │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO TIMERS • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Share, ItemRevision, Draft, snapshots)
//! - [`actions`] - The closed action union and its creators
//! - [`optimistic`] - Generic optimistic store engine
//! - [`reducers`] - Per-slice reducer tables and the replica state
//! - [`selectors`] - Read-only queries
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use vault_core::{Action, ReplicaSnapshot, ReplicaState};
//!
//! let mut state = ReplicaState::from_snapshot(ReplicaSnapshot::default());
//! state.reduce(&Action::EmptyTrashSuccess);
//!
//! assert_eq!(state.snapshot().item_count(), 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod actions;
pub mod error;
pub mod optimistic;
pub mod reducers;
pub mod selectors;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use actions::{Action, ActionKind};
pub use error::{CoreError, CoreResult};
pub use optimistic::{Optimistic, OptimisticKey};
pub use reducers::{ItemsState, ReplicaState};
pub use types::*;

// =============================================================================
// Crate-Level Helpers
// =============================================================================

/// Shortens an identifier for log output: `abcd…wxyz`.
///
/// Identifiers of 12 characters or less are returned unchanged.
pub fn log_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 12 {
        return id.to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_id() {
        assert_eq!(log_id("short"), "short");
        assert_eq!(log_id("0123456789abcdefgh"), "0123…efgh");
    }
}
