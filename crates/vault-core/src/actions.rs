//! # Actions
//!
//! The closed set of state transitions the replica understands.
//!
//! ## Action Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Action Sources                                  │
//! │                                                                         │
//! │   User intents          Event channels          Boot / cache           │
//! │   ────────────          ──────────────          ────────────           │
//! │   ItemCreationIntent    ShareEvent              BootSuccess            │
//! │   ItemEditIntent        ItemEditSync            StateHydrate           │
//! │   ItemMoveIntent        ItemDeleteSync          CacheRequest           │
//! │   VaultDeleteIntent     ShareDeleteSync         StartEventPolling      │
//! │          │                     │                        │               │
//! │          └─────────────────────┼────────────────────────┘               │
//! │                                ▼                                        │
//! │                     store dispatch (serialized)                         │
//! │                                ▼                                        │
//! │                   ReducerRegistry by ActionKind                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Actions serialize as `{ "type": ..., "payload": ... }` so they can cross
//! a process boundary unchanged.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::optimistic::{OptimisticAction, OptimisticKey};
use crate::types::{
    Draft, DraftTarget, ItemData, ItemId, ItemRevision, ItemsByShareId, ReplicaSnapshot, Share,
    ShareId, SharesById, UniqueItem, VaultContent,
};

/// Every action the replica reducers understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Action {
    // =========================================================================
    // Boot, sync & cache
    // =========================================================================
    /// Full remote bootstrap finished.
    BootSuccess {
        shares: SharesById,
        items: ItemsByShareId,
    },

    /// Full resynchronization finished. Replaces everything.
    SyncSuccess {
        shares: SharesById,
        items: ItemsByShareId,
    },

    /// New shares discovered. Merged into the replica.
    SharesSync {
        shares: SharesById,
        items: ItemsByShareId,
    },

    /// Replica restored from the encrypted cache.
    StateHydrate(Box<ReplicaSnapshot>),

    /// Request a hydration from the cache.
    StateSync,

    StartEventPolling,
    StopEventPolling,

    /// Force every open event channel to poll now.
    WakeupPolling,

    /// Persist the replica. `throttle: false` writes immediately.
    CacheRequest { throttle: bool },

    /// Abort any pending cache write.
    CacheCancel,

    // =========================================================================
    // Item creation
    // =========================================================================
    ItemCreationIntent {
        optimistic_id: String,
        share_id: ShareId,
        create_time: i64,
        data: ItemData,
    },
    ItemCreationFailure {
        optimistic_id: String,
        share_id: ShareId,
    },
    ItemCreationDismiss {
        optimistic_id: String,
        share_id: ShareId,
    },
    ItemCreationSuccess {
        optimistic_id: String,
        share_id: ShareId,
        item: ItemRevision,
        /// Companion alias item created alongside a login.
        alias: Option<ItemRevision>,
    },

    // =========================================================================
    // Item edit
    // =========================================================================
    ItemEditIntent {
        share_id: ShareId,
        item_id: ItemId,
        data: ItemData,
    },
    ItemEditFailure {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemEditDismiss {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemEditSuccess {
        share_id: ShareId,
        item: ItemRevision,
    },
    ItemEditSync {
        share_id: ShareId,
        item: ItemRevision,
    },

    // =========================================================================
    // Item move
    // =========================================================================
    /// Moves `item` into `share_id` under the temporary `optimistic_id`.
    ItemMoveIntent {
        item: ItemRevision,
        optimistic_id: String,
        share_id: ShareId,
        moved_at: i64,
    },
    ItemMoveSuccess {
        item: ItemRevision,
        optimistic_id: String,
        share_id: ShareId,
    },
    /// `item` is the original, still living in its source share.
    ItemMoveFailure {
        item: ItemRevision,
        optimistic_id: String,
        share_id: ShareId,
    },

    // =========================================================================
    // Item state flips & deletion
    // =========================================================================
    ItemTrashIntent {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemTrashSuccess {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemTrashFailure {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemRestoreIntent {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemRestoreSuccess {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemRestoreFailure {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemDeleteIntent {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemDeleteSuccess {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemDeleteFailure {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemDeleteSync {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemPinSuccess {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemUnpinSuccess {
        share_id: ShareId,
        item_id: ItemId,
    },
    ItemUsedSync {
        share_id: ShareId,
        item_id: ItemId,
        last_use_time: i64,
    },
    ItemAutofilled {
        share_id: ShareId,
        item_id: ItemId,
        at: i64,
    },

    // =========================================================================
    // Bulk item operations
    // =========================================================================
    EmptyTrashSuccess,
    RestoreTrashSuccess,
    VaultMoveAllItemsSuccess {
        share_id: ShareId,
        destination_share_id: ShareId,
        moved_items: Vec<ItemRevision>,
    },
    InviteAcceptSuccess {
        share: Share,
        items: Vec<ItemRevision>,
    },

    // =========================================================================
    // Shares & vaults
    // =========================================================================
    /// Advance a share's watermark.
    ShareEvent {
        share_id: ShareId,
        event_id: String,
    },
    ShareEditSync {
        share_id: ShareId,
        share: Share,
    },
    ShareDeleteSync {
        share_id: ShareId,
    },
    ShareLeaveSuccess {
        share_id: ShareId,
    },
    VaultCreationIntent {
        optimistic_id: String,
        content: VaultContent,
        create_time: i64,
    },
    VaultCreationFailure {
        optimistic_id: String,
    },
    VaultCreationDismiss {
        optimistic_id: String,
    },
    VaultCreationSuccess {
        optimistic_id: String,
        share: Share,
    },
    VaultEditIntent {
        share_id: ShareId,
        content: VaultContent,
    },
    VaultEditSuccess {
        share: Share,
    },
    VaultEditFailure {
        share_id: ShareId,
    },
    VaultDeleteIntent {
        share_id: ShareId,
    },
    VaultDeleteSuccess {
        share_id: ShareId,
    },
    VaultDeleteFailure {
        share_id: ShareId,
    },

    // =========================================================================
    // Drafts
    // =========================================================================
    DraftSave(Draft),
    DraftDiscard(DraftTarget),
    DraftsGarbageCollect,
}

/// Discriminant of an [`Action`], used as the reducer table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    BootSuccess,
    SyncSuccess,
    SharesSync,
    StateHydrate,
    StateSync,
    StartEventPolling,
    StopEventPolling,
    WakeupPolling,
    CacheRequest,
    CacheCancel,
    ItemCreationIntent,
    ItemCreationFailure,
    ItemCreationDismiss,
    ItemCreationSuccess,
    ItemEditIntent,
    ItemEditFailure,
    ItemEditDismiss,
    ItemEditSuccess,
    ItemEditSync,
    ItemMoveIntent,
    ItemMoveSuccess,
    ItemMoveFailure,
    ItemTrashIntent,
    ItemTrashSuccess,
    ItemTrashFailure,
    ItemRestoreIntent,
    ItemRestoreSuccess,
    ItemRestoreFailure,
    ItemDeleteIntent,
    ItemDeleteSuccess,
    ItemDeleteFailure,
    ItemDeleteSync,
    ItemPinSuccess,
    ItemUnpinSuccess,
    ItemUsedSync,
    ItemAutofilled,
    EmptyTrashSuccess,
    RestoreTrashSuccess,
    VaultMoveAllItemsSuccess,
    InviteAcceptSuccess,
    ShareEvent,
    ShareEditSync,
    ShareDeleteSync,
    ShareLeaveSuccess,
    VaultCreationIntent,
    VaultCreationFailure,
    VaultCreationDismiss,
    VaultCreationSuccess,
    VaultEditIntent,
    VaultEditSuccess,
    VaultEditFailure,
    VaultDeleteIntent,
    VaultDeleteSuccess,
    VaultDeleteFailure,
    DraftSave,
    DraftDiscard,
    DraftsGarbageCollect,
}

impl Action {
    /// Returns the discriminant used to route this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::BootSuccess { .. } => ActionKind::BootSuccess,
            Action::SyncSuccess { .. } => ActionKind::SyncSuccess,
            Action::SharesSync { .. } => ActionKind::SharesSync,
            Action::StateHydrate(_) => ActionKind::StateHydrate,
            Action::StateSync => ActionKind::StateSync,
            Action::StartEventPolling => ActionKind::StartEventPolling,
            Action::StopEventPolling => ActionKind::StopEventPolling,
            Action::WakeupPolling => ActionKind::WakeupPolling,
            Action::CacheRequest { .. } => ActionKind::CacheRequest,
            Action::CacheCancel => ActionKind::CacheCancel,
            Action::ItemCreationIntent { .. } => ActionKind::ItemCreationIntent,
            Action::ItemCreationFailure { .. } => ActionKind::ItemCreationFailure,
            Action::ItemCreationDismiss { .. } => ActionKind::ItemCreationDismiss,
            Action::ItemCreationSuccess { .. } => ActionKind::ItemCreationSuccess,
            Action::ItemEditIntent { .. } => ActionKind::ItemEditIntent,
            Action::ItemEditFailure { .. } => ActionKind::ItemEditFailure,
            Action::ItemEditDismiss { .. } => ActionKind::ItemEditDismiss,
            Action::ItemEditSuccess { .. } => ActionKind::ItemEditSuccess,
            Action::ItemEditSync { .. } => ActionKind::ItemEditSync,
            Action::ItemMoveIntent { .. } => ActionKind::ItemMoveIntent,
            Action::ItemMoveSuccess { .. } => ActionKind::ItemMoveSuccess,
            Action::ItemMoveFailure { .. } => ActionKind::ItemMoveFailure,
            Action::ItemTrashIntent { .. } => ActionKind::ItemTrashIntent,
            Action::ItemTrashSuccess { .. } => ActionKind::ItemTrashSuccess,
            Action::ItemTrashFailure { .. } => ActionKind::ItemTrashFailure,
            Action::ItemRestoreIntent { .. } => ActionKind::ItemRestoreIntent,
            Action::ItemRestoreSuccess { .. } => ActionKind::ItemRestoreSuccess,
            Action::ItemRestoreFailure { .. } => ActionKind::ItemRestoreFailure,
            Action::ItemDeleteIntent { .. } => ActionKind::ItemDeleteIntent,
            Action::ItemDeleteSuccess { .. } => ActionKind::ItemDeleteSuccess,
            Action::ItemDeleteFailure { .. } => ActionKind::ItemDeleteFailure,
            Action::ItemDeleteSync { .. } => ActionKind::ItemDeleteSync,
            Action::ItemPinSuccess { .. } => ActionKind::ItemPinSuccess,
            Action::ItemUnpinSuccess { .. } => ActionKind::ItemUnpinSuccess,
            Action::ItemUsedSync { .. } => ActionKind::ItemUsedSync,
            Action::ItemAutofilled { .. } => ActionKind::ItemAutofilled,
            Action::EmptyTrashSuccess => ActionKind::EmptyTrashSuccess,
            Action::RestoreTrashSuccess => ActionKind::RestoreTrashSuccess,
            Action::VaultMoveAllItemsSuccess { .. } => ActionKind::VaultMoveAllItemsSuccess,
            Action::InviteAcceptSuccess { .. } => ActionKind::InviteAcceptSuccess,
            Action::ShareEvent { .. } => ActionKind::ShareEvent,
            Action::ShareEditSync { .. } => ActionKind::ShareEditSync,
            Action::ShareDeleteSync { .. } => ActionKind::ShareDeleteSync,
            Action::ShareLeaveSuccess { .. } => ActionKind::ShareLeaveSuccess,
            Action::VaultCreationIntent { .. } => ActionKind::VaultCreationIntent,
            Action::VaultCreationFailure { .. } => ActionKind::VaultCreationFailure,
            Action::VaultCreationDismiss { .. } => ActionKind::VaultCreationDismiss,
            Action::VaultCreationSuccess { .. } => ActionKind::VaultCreationSuccess,
            Action::VaultEditIntent { .. } => ActionKind::VaultEditIntent,
            Action::VaultEditSuccess { .. } => ActionKind::VaultEditSuccess,
            Action::VaultEditFailure { .. } => ActionKind::VaultEditFailure,
            Action::VaultDeleteIntent { .. } => ActionKind::VaultDeleteIntent,
            Action::VaultDeleteSuccess { .. } => ActionKind::VaultDeleteSuccess,
            Action::VaultDeleteFailure { .. } => ActionKind::VaultDeleteFailure,
            Action::DraftSave(_) => ActionKind::DraftSave,
            Action::DraftDiscard(_) => ActionKind::DraftDiscard,
            Action::DraftsGarbageCollect => ActionKind::DraftsGarbageCollect,
        }
    }

    /// Returns true if this action is `kind`.
    pub fn is(&self, kind: ActionKind) -> bool {
        self.kind() == kind
    }

    /// Share this action targets, if it targets exactly one.
    pub fn share_id(&self) -> Option<&str> {
        match self {
            Action::ItemCreationIntent { share_id, .. }
            | Action::ItemCreationFailure { share_id, .. }
            | Action::ItemCreationDismiss { share_id, .. }
            | Action::ItemCreationSuccess { share_id, .. }
            | Action::ItemEditIntent { share_id, .. }
            | Action::ItemEditFailure { share_id, .. }
            | Action::ItemEditDismiss { share_id, .. }
            | Action::ItemEditSuccess { share_id, .. }
            | Action::ItemEditSync { share_id, .. }
            | Action::ItemMoveIntent { share_id, .. }
            | Action::ItemMoveSuccess { share_id, .. }
            | Action::ItemMoveFailure { share_id, .. }
            | Action::ItemTrashIntent { share_id, .. }
            | Action::ItemTrashSuccess { share_id, .. }
            | Action::ItemTrashFailure { share_id, .. }
            | Action::ItemRestoreIntent { share_id, .. }
            | Action::ItemRestoreSuccess { share_id, .. }
            | Action::ItemRestoreFailure { share_id, .. }
            | Action::ItemDeleteIntent { share_id, .. }
            | Action::ItemDeleteSuccess { share_id, .. }
            | Action::ItemDeleteFailure { share_id, .. }
            | Action::ItemDeleteSync { share_id, .. }
            | Action::ItemPinSuccess { share_id, .. }
            | Action::ItemUnpinSuccess { share_id, .. }
            | Action::ItemUsedSync { share_id, .. }
            | Action::ItemAutofilled { share_id, .. }
            | Action::VaultMoveAllItemsSuccess { share_id, .. }
            | Action::ShareEvent { share_id, .. }
            | Action::ShareEditSync { share_id, .. }
            | Action::ShareDeleteSync { share_id }
            | Action::ShareLeaveSuccess { share_id }
            | Action::VaultEditIntent { share_id, .. }
            | Action::VaultEditFailure { share_id }
            | Action::VaultDeleteIntent { share_id }
            | Action::VaultDeleteSuccess { share_id }
            | Action::VaultDeleteFailure { share_id } => Some(share_id.as_str()),
            Action::VaultEditSuccess { share } | Action::InviteAcceptSuccess { share, .. } => {
                Some(share.share_id.as_str())
            }
            _ => None,
        }
    }
}

impl OptimisticAction for Action {
    fn optimistic_key(&self) -> Option<OptimisticKey> {
        match self {
            Action::ItemCreationIntent {
                optimistic_id,
                share_id,
                ..
            }
            | Action::ItemCreationFailure {
                optimistic_id,
                share_id,
            }
            | Action::ItemCreationDismiss {
                optimistic_id,
                share_id,
            }
            | Action::ItemCreationSuccess {
                optimistic_id,
                share_id,
                ..
            }
            | Action::ItemMoveIntent {
                optimistic_id,
                share_id,
                ..
            }
            | Action::ItemMoveSuccess {
                optimistic_id,
                share_id,
                ..
            }
            | Action::ItemMoveFailure {
                optimistic_id,
                share_id,
                ..
            } => Some(OptimisticKey::item(share_id, optimistic_id)),

            Action::ItemEditIntent {
                share_id, item_id, ..
            }
            | Action::ItemEditFailure { share_id, item_id }
            | Action::ItemEditDismiss { share_id, item_id }
            | Action::ItemTrashIntent { share_id, item_id }
            | Action::ItemTrashSuccess { share_id, item_id }
            | Action::ItemTrashFailure { share_id, item_id }
            | Action::ItemRestoreIntent { share_id, item_id }
            | Action::ItemRestoreSuccess { share_id, item_id }
            | Action::ItemRestoreFailure { share_id, item_id }
            | Action::ItemDeleteIntent { share_id, item_id }
            | Action::ItemDeleteSuccess { share_id, item_id }
            | Action::ItemDeleteFailure { share_id, item_id } => {
                Some(OptimisticKey::item(share_id, item_id))
            }

            Action::ItemEditSuccess { share_id, item } => {
                Some(OptimisticKey::item(share_id, &item.item_id))
            }

            Action::VaultCreationIntent { optimistic_id, .. }
            | Action::VaultCreationFailure { optimistic_id }
            | Action::VaultCreationDismiss { optimistic_id }
            | Action::VaultCreationSuccess { optimistic_id, .. } => {
                Some(OptimisticKey::share(optimistic_id))
            }

            Action::VaultEditIntent { share_id, .. }
            | Action::VaultEditFailure { share_id }
            | Action::VaultDeleteIntent { share_id }
            | Action::VaultDeleteSuccess { share_id }
            | Action::VaultDeleteFailure { share_id } => Some(OptimisticKey::share(share_id)),

            Action::VaultEditSuccess { share } => Some(OptimisticKey::share(&share.share_id)),

            _ => None,
        }
    }
}

// =============================================================================
// Action Creators
// =============================================================================

/// Generates a temporary client-side id for creations and moves.
pub fn new_optimistic_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time in epoch seconds.
pub fn epoch() -> i64 {
    Utc::now().timestamp()
}

impl Action {
    /// Builds a creation intent with a fresh optimistic id.
    pub fn item_creation_intent(share_id: impl Into<String>, data: ItemData) -> Self {
        Action::ItemCreationIntent {
            optimistic_id: new_optimistic_id(),
            share_id: share_id.into(),
            create_time: epoch(),
            data,
        }
    }

    /// Builds a move intent of `item` into `destination`.
    pub fn item_move_intent(item: ItemRevision, destination: impl Into<String>) -> Self {
        Action::ItemMoveIntent {
            item,
            optimistic_id: new_optimistic_id(),
            share_id: destination.into(),
            moved_at: epoch(),
        }
    }

    pub fn item_autofilled(item: &UniqueItem) -> Self {
        Action::ItemAutofilled {
            share_id: item.share_id.clone(),
            item_id: item.item_id.clone(),
            at: epoch(),
        }
    }

    pub fn vault_creation_intent(content: VaultContent) -> Self {
        Action::VaultCreationIntent {
            optimistic_id: new_optimistic_id(),
            content,
            create_time: epoch(),
        }
    }

    pub fn state_hydrate(snapshot: ReplicaSnapshot) -> Self {
        Action::StateHydrate(Box::new(snapshot))
    }
}
