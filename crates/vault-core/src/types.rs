//! # Domain Types
//!
//! Replica entities shared by the reducers, the event channels and the
//! cache hydrator.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Replica Types                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Share       │   │  ItemRevision   │   │     Draft       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  share_id       │   │  share_id       │   │  New { kind }   │       │
//! │  │  event_id (wm)  │◄──│  item_id        │◄──│  Edit { share,  │       │
//! │  │  target_type    │   │  revision       │   │   item, rev }   │       │
//! │  │  content        │   │  state / data   │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ItemsByShareId:  share_id ──► item_id ──► ItemRevision                │
//! │  (item ids are only unique within a share, never globally)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Version tag written on every item revision created locally.
pub const CONTENT_FORMAT_VERSION: u32 = 1;

pub type ShareId = String;
pub type ItemId = String;

/// Items indexed by share first: item ids are only unique per share.
pub type ItemsByShareId = BTreeMap<ShareId, BTreeMap<ItemId, ItemRevision>>;

/// Shares indexed by id.
pub type SharesById = BTreeMap<ShareId, Share>;

// =============================================================================
// Share
// =============================================================================

/// What a share grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShareType {
    /// A full vault and every item inside it.
    Vault,
    /// A single item shared on its own.
    Item,
}

/// Decrypted vault metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VaultContent {
    pub name: String,
    pub description: String,
}

/// A server-managed collection of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Share {
    /// Unique share identifier.
    pub share_id: ShareId,

    /// Vault this share belongs to.
    pub vault_id: String,

    /// Vault or single-item share.
    pub target_type: ShareType,

    /// Id of the shared target (vault id or item id).
    pub target_id: String,

    /// Last event id applied locally. Empty when unknown.
    pub event_id: String,

    /// Vault metadata. `None` for item shares.
    pub content: Option<VaultContent>,

    /// Whether the current user owns this share.
    pub owner: bool,

    /// Whether the share has other members.
    pub shared: bool,

    /// Creation time (epoch seconds).
    pub create_time: i64,
}

impl Share {
    /// Returns true if this share targets a whole vault.
    pub fn is_vault(&self) -> bool {
        self.target_type == ShareType::Vault
    }

    /// Returns true if the watermark is known.
    pub fn has_event_id(&self) -> bool {
        !self.event_id.is_empty()
    }
}

// =============================================================================
// Items
// =============================================================================

/// Lifecycle state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Active,
    Trashed,
}

/// Item type, needed to route alias companions and `new` drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Login,
    Note,
    Alias,
    CreditCard,
    Identity,
}

/// Item content as handed over by the crypto layer.
///
/// `payload` stays opaque to the replica: only `kind`, `name` and the alias
/// address are ever inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemData {
    pub kind: ItemKind,
    pub name: String,
    pub payload: String,
    #[serde(default)]
    pub alias_email: Option<String>,
}

/// A single versioned item inside a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemRevision {
    pub item_id: ItemId,
    pub share_id: ShareId,

    /// Monotonically increasing revision number.
    pub revision: u64,

    pub state: ItemState,
    pub pinned: bool,

    /// Epoch seconds.
    pub create_time: i64,
    pub modify_time: i64,
    pub revision_time: i64,
    pub last_use_time: Option<i64>,

    pub data: ItemData,
    pub alias_email: Option<String>,
    pub content_format_version: u32,
}

impl ItemRevision {
    pub fn is_trashed(&self) -> bool {
        self.state == ItemState::Trashed
    }

    pub fn is_active(&self) -> bool {
        self.state == ItemState::Active
    }

    pub fn unique(&self) -> UniqueItem {
        UniqueItem {
            share_id: self.share_id.clone(),
            item_id: self.item_id.clone(),
        }
    }
}

/// `(share_id, item_id)` pair identifying one item in the replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UniqueItem {
    pub share_id: ShareId,
    pub item_id: ItemId,
}

impl UniqueItem {
    pub fn new(share_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        UniqueItem {
            share_id: share_id.into(),
            item_id: item_id.into(),
        }
    }
}

// =============================================================================
// Drafts
// =============================================================================

/// An unsaved edit buffer.
///
/// The bound `revision` of an `Edit` draft lets callers detect that the item
/// changed underneath the draft (see [`crate::selectors::is_draft_stale`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Draft {
    New {
        kind: ItemKind,
        #[ts(type = "unknown")]
        form_data: serde_json::Value,
    },
    Edit {
        share_id: ShareId,
        item_id: ItemId,
        revision: u64,
        #[ts(type = "unknown")]
        form_data: serde_json::Value,
    },
}

impl Draft {
    pub fn target(&self) -> DraftTarget {
        match self {
            Draft::New { .. } => DraftTarget::New,
            Draft::Edit {
                share_id, item_id, ..
            } => DraftTarget::Edit(UniqueItem::new(share_id.as_str(), item_id.as_str())),
        }
    }

    /// Returns true if this draft edits an item of `share_id`.
    pub fn is_bound_to_share(&self, share_id: &str) -> bool {
        matches!(self, Draft::Edit { share_id: s, .. } if s == share_id)
    }
}

/// Identifies the slot a draft occupies: one `new` slot, one slot per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DraftTarget {
    New,
    Edit(UniqueItem),
}

// =============================================================================
// Event Cursor
// =============================================================================

/// Position in a share's server event log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventCursor {
    /// Watermark to resume polling from.
    pub event_id: String,

    /// More events are immediately available.
    pub more: bool,
}

// =============================================================================
// Replica Snapshot
// =============================================================================

/// Plain, settled replica data: what gets cached and hydrated.
///
/// Pending optimistic guesses are never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplicaSnapshot {
    #[serde(default)]
    pub shares: SharesById,

    #[serde(default)]
    pub items: ItemsByShareId,

    #[serde(default)]
    pub drafts: Vec<Draft>,
}

impl ReplicaSnapshot {
    /// Total number of items across all shares.
    pub fn item_count(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }
}
