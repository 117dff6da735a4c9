//! # Error Types
//!
//! Domain errors for vault-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vault-core errors (this file)                                         │
//! │  └── CoreError        - Lookups and draft checks on the replica        │
//! │                                                                         │
//! │  vault-db errors (separate crate)                                      │
//! │  └── DbError          - Cache persistence failures                     │
//! │                                                                         │
//! │  vault-sync errors (separate crate)                                    │
//! │  └── SyncError        - Transport, crypto, cache, config failures      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reducers never return errors: an action either applies fully or is
//! ignored. `CoreError` is only produced by the checked helpers that
//! collaborators call before building an intent action.

use thiserror::Error;

/// Core replica errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Share is not part of the replica.
    #[error("Share not found: {0}")]
    ShareNotFound(String),

    /// Item is not part of the given share.
    #[error("Item {item_id} not found in share {share_id}")]
    ItemNotFound { share_id: String, item_id: String },

    /// The item was updated after the draft was opened.
    ///
    /// ## When This Occurs
    /// An edit draft bound to revision N is about to be saved while a sync
    /// event already brought revision N+1 into the replica.
    #[error("Draft for item {item_id} is stale: opened at revision {draft_revision}, current {current_revision}")]
    StaleDraft {
        item_id: String,
        draft_revision: u64,
        current_revision: u64,
    },
}

impl CoreError {
    pub fn item_not_found(share_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        CoreError::ItemNotFound {
            share_id: share_id.into(),
            item_id: item_id.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
