//! # Sync Callbacks
//!
//! Side effects the embedding application wants to run when remote
//! changes land. Each callback runs before the matching action is
//! dispatched, while the affected data is still in the replica.

/// Hooks invoked by event channels.
pub trait SyncCallbacks: Send + Sync {
    /// Items of some share were updated or deleted.
    fn on_items_updated(&self) {}

    /// `item_ids` of `share_id` are about to be removed.
    fn on_items_deleted(&self, _share_id: &str, _item_ids: &[String]) {}

    /// `share_id` is about to be removed.
    fn on_share_deleted(&self, _share_id: &str) {}
}

/// Callbacks that do nothing.
pub struct NoopCallbacks;

impl SyncCallbacks for NoopCallbacks {}
