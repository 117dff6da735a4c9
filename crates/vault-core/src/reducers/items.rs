//! # Items Reducer
//!
//! Folds user intents and server sync actions into `ItemsByShareId`.
//!
//! ## Optimistic Chains
//! ```text
//! ┌──────────────┬──────────────┬───────────┬──────────────┬────────────────────┐
//! │ mutation     │ initiate     │ fail      │ commit       │ revert             │
//! ├──────────────┼──────────────┼───────────┼──────────────┼────────────────────┤
//! │ creation     │ Intent       │ Failure   │ -            │ Success, Dismiss   │
//! │ edit         │ Intent       │ Failure   │ Success      │ Dismiss            │
//! │ move         │ Intent       │ -         │ Success      │ Failure            │
//! │ trash        │ Intent       │ -         │ Success      │ Failure            │
//! │ restore      │ Intent       │ -         │ Success      │ Failure            │
//! │ delete       │ Intent       │ -         │ Success      │ Failure            │
//! │ vault delete │ Intent       │ -         │ Success      │ Failure            │
//! └──────────────┴──────────────┴───────────┴──────────────┴────────────────────┘
//! ```
//!
//! A creation success *reverts* its chain: the temporary entry is dropped
//! by the replay and the server item is inserted by the success reducer.
//!
//! Server sync actions (`ItemEditSync`, `ItemDeleteSync`, `ItemUsedSync`)
//! are never part of a chain. They replace whatever is stored for their key
//! and are replayed on top of the checkpoint if a chain is later reverted.

use crate::actions::{Action, ActionKind};
use crate::optimistic::OptimisticMatchers;
use crate::reducers::{ItemsByOptimisticId, ReducerRegistry};
use crate::types::{
    ItemKind, ItemRevision, ItemState, ItemsByShareId, CONTENT_FORMAT_VERSION,
};

// =============================================================================
// Matchers
// =============================================================================

pub fn matchers() -> Vec<OptimisticMatchers<Action>> {
    vec![
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemCreationIntent))
            .fail(|a| a.is(ActionKind::ItemCreationFailure))
            .revert(|a| a.is(ActionKind::ItemCreationSuccess))
            .revert(|a| a.is(ActionKind::ItemCreationDismiss)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemEditIntent))
            .fail(|a| a.is(ActionKind::ItemEditFailure))
            .commit(|a| a.is(ActionKind::ItemEditSuccess))
            .revert(|a| a.is(ActionKind::ItemEditDismiss)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemMoveIntent))
            .commit(|a| a.is(ActionKind::ItemMoveSuccess))
            .revert(|a| a.is(ActionKind::ItemMoveFailure)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemTrashIntent))
            .commit(|a| a.is(ActionKind::ItemTrashSuccess))
            .revert(|a| a.is(ActionKind::ItemTrashFailure)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemRestoreIntent))
            .commit(|a| a.is(ActionKind::ItemRestoreSuccess))
            .revert(|a| a.is(ActionKind::ItemRestoreFailure)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::ItemDeleteIntent))
            .commit(|a| a.is(ActionKind::ItemDeleteSuccess))
            .revert(|a| a.is(ActionKind::ItemDeleteFailure)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::VaultDeleteIntent))
            .commit(|a| a.is(ActionKind::VaultDeleteSuccess))
            .revert(|a| a.is(ActionKind::VaultDeleteFailure)),
    ]
}

// =============================================================================
// Registry
// =============================================================================

pub fn registry() -> ReducerRegistry<ItemsByShareId> {
    ReducerRegistry::new()
        .on_each(
            &[ActionKind::BootSuccess, ActionKind::SyncSuccess],
            replace_all,
        )
        .on(ActionKind::SharesSync, merge_shares)
        .on(ActionKind::StateHydrate, hydrate)
        .on(ActionKind::ItemCreationIntent, create_optimistic)
        .on(ActionKind::ItemCreationSuccess, create_confirmed)
        .on(ActionKind::ItemEditIntent, edit_optimistic)
        .on_each(
            &[ActionKind::ItemEditSuccess, ActionKind::ItemEditSync],
            replace_item,
        )
        .on(ActionKind::ItemMoveIntent, move_optimistic)
        .on(ActionKind::ItemMoveSuccess, move_confirmed)
        .on_each(
            &[ActionKind::ItemTrashIntent, ActionKind::ItemTrashSuccess],
            trash_item,
        )
        .on_each(
            &[ActionKind::ItemRestoreIntent, ActionKind::ItemRestoreSuccess],
            restore_item,
        )
        .on_each(
            &[
                ActionKind::ItemDeleteIntent,
                ActionKind::ItemDeleteSuccess,
                ActionKind::ItemDeleteSync,
            ],
            delete_item,
        )
        .on_each(
            &[ActionKind::ItemPinSuccess, ActionKind::ItemUnpinSuccess],
            pin_item,
        )
        .on_each(
            &[ActionKind::ItemUsedSync, ActionKind::ItemAutofilled],
            touch_item,
        )
        .on(ActionKind::EmptyTrashSuccess, empty_trash)
        .on(ActionKind::RestoreTrashSuccess, restore_trash)
        .on_each(
            &[
                ActionKind::VaultDeleteIntent,
                ActionKind::VaultDeleteSuccess,
                ActionKind::ShareDeleteSync,
                ActionKind::ShareLeaveSuccess,
            ],
            drop_share,
        )
        .on(ActionKind::VaultMoveAllItemsSuccess, move_all_items)
        .on(ActionKind::InviteAcceptSuccess, accept_invite)
}

/// Records which item an optimistic id ended up as.
pub fn by_optimistic_id_registry() -> ReducerRegistry<ItemsByOptimisticId> {
    ReducerRegistry::new().on_each(
        &[
            ActionKind::ItemCreationSuccess,
            ActionKind::ItemMoveSuccess,
            ActionKind::ItemMoveFailure,
        ],
        resolve_optimistic_id,
    )
}

// =============================================================================
// Helpers
// =============================================================================

fn item_mut<'a>(
    state: &'a mut ItemsByShareId,
    share_id: &str,
    item_id: &str,
) -> Option<&'a mut ItemRevision> {
    state.get_mut(share_id)?.get_mut(item_id)
}

fn upsert(state: &mut ItemsByShareId, share_id: &str, item: ItemRevision) {
    state
        .entry(share_id.to_string())
        .or_default()
        .insert(item.item_id.clone(), item);
}

fn remove(state: &mut ItemsByShareId, share_id: &str, item_id: &str) {
    if let Some(items) = state.get_mut(share_id) {
        items.remove(item_id);
    }
}

fn set_state(state: &mut ItemsByShareId, share_id: &str, item_id: &str, next: ItemState) {
    if let Some(item) = item_mut(state, share_id, item_id) {
        item.state = next;
    }
}

// =============================================================================
// Boot & Sync
// =============================================================================

fn replace_all(state: &mut ItemsByShareId, action: &Action) {
    if let Action::BootSuccess { items, .. } | Action::SyncSuccess { items, .. } = action {
        *state = items.clone();
    }
}

fn merge_shares(state: &mut ItemsByShareId, action: &Action) {
    let Action::SharesSync { items, .. } = action else {
        return;
    };

    for (share_id, incoming) in items {
        state
            .entry(share_id.clone())
            .or_default()
            .extend(incoming.iter().map(|(id, item)| (id.clone(), item.clone())));
    }
}

fn hydrate(state: &mut ItemsByShareId, action: &Action) {
    if let Action::StateHydrate(snapshot) = action {
        *state = snapshot.items.clone();
    }
}

// =============================================================================
// Creation
// =============================================================================

fn create_optimistic(state: &mut ItemsByShareId, action: &Action) {
    let Action::ItemCreationIntent {
        optimistic_id,
        share_id,
        create_time,
        data,
    } = action
    else {
        return;
    };

    // A retry keeps bumping the revision so the entry stays recognizable.
    let revision = state
        .get(share_id)
        .and_then(|items| items.get(optimistic_id))
        .map_or(0, |existing| existing.revision + 1);

    let alias_email = match data.kind {
        ItemKind::Alias => data.alias_email.clone(),
        _ => None,
    };

    upsert(
        state,
        share_id,
        ItemRevision {
            item_id: optimistic_id.clone(),
            share_id: share_id.clone(),
            revision,
            state: ItemState::Active,
            pinned: false,
            create_time: *create_time,
            modify_time: *create_time,
            revision_time: *create_time,
            last_use_time: None,
            data: data.clone(),
            alias_email,
            content_format_version: CONTENT_FORMAT_VERSION,
        },
    );
}

fn create_confirmed(state: &mut ItemsByShareId, action: &Action) {
    let Action::ItemCreationSuccess {
        optimistic_id,
        share_id,
        item,
        alias,
    } = action
    else {
        return;
    };

    remove(state, share_id, optimistic_id);
    if let Some(alias) = alias {
        upsert(state, share_id, alias.clone());
    }
    upsert(state, share_id, item.clone());
}

// =============================================================================
// Edit
// =============================================================================

fn edit_optimistic(state: &mut ItemsByShareId, action: &Action) {
    let Action::ItemEditIntent {
        share_id,
        item_id,
        data,
    } = action
    else {
        return;
    };

    if let Some(item) = item_mut(state, share_id, item_id) {
        item.revision += 1;
        item.data = data.clone();
    }
}

fn replace_item(state: &mut ItemsByShareId, action: &Action) {
    if let Action::ItemEditSuccess { share_id, item } | Action::ItemEditSync { share_id, item } =
        action
    {
        upsert(state, share_id, item.clone());
    }
}

// =============================================================================
// Move
// =============================================================================

/// Delete from the source and create under the optimistic id in the
/// destination, in one transition.
fn move_optimistic(state: &mut ItemsByShareId, action: &Action) {
    let Action::ItemMoveIntent {
        item,
        optimistic_id,
        share_id,
        moved_at,
    } = action
    else {
        return;
    };

    remove(state, &item.share_id, &item.item_id);
    upsert(
        state,
        share_id,
        ItemRevision {
            item_id: optimistic_id.clone(),
            share_id: share_id.clone(),
            modify_time: *moved_at,
            ..item.clone()
        },
    );
}

fn move_confirmed(state: &mut ItemsByShareId, action: &Action) {
    let Action::ItemMoveSuccess {
        item,
        optimistic_id,
        share_id,
    } = action
    else {
        return;
    };

    remove(state, share_id, optimistic_id);
    upsert(state, share_id, item.clone());
}

// =============================================================================
// State Flips
// =============================================================================

fn trash_item(state: &mut ItemsByShareId, action: &Action) {
    if let Action::ItemTrashIntent { share_id, item_id }
    | Action::ItemTrashSuccess { share_id, item_id } = action
    {
        set_state(state, share_id, item_id, ItemState::Trashed);
    }
}

fn restore_item(state: &mut ItemsByShareId, action: &Action) {
    if let Action::ItemRestoreIntent { share_id, item_id }
    | Action::ItemRestoreSuccess { share_id, item_id } = action
    {
        set_state(state, share_id, item_id, ItemState::Active);
    }
}

fn delete_item(state: &mut ItemsByShareId, action: &Action) {
    if let Action::ItemDeleteIntent { share_id, item_id }
    | Action::ItemDeleteSuccess { share_id, item_id }
    | Action::ItemDeleteSync { share_id, item_id } = action
    {
        remove(state, share_id, item_id);
    }
}

fn pin_item(state: &mut ItemsByShareId, action: &Action) {
    let (share_id, item_id, pinned) = match action {
        Action::ItemPinSuccess { share_id, item_id } => (share_id, item_id, true),
        Action::ItemUnpinSuccess { share_id, item_id } => (share_id, item_id, false),
        _ => return,
    };

    if let Some(item) = item_mut(state, share_id, item_id) {
        item.pinned = pinned;
    }
}

fn touch_item(state: &mut ItemsByShareId, action: &Action) {
    let (share_id, item_id, at) = match action {
        Action::ItemUsedSync {
            share_id,
            item_id,
            last_use_time,
        } => (share_id, item_id, *last_use_time),
        Action::ItemAutofilled {
            share_id,
            item_id,
            at,
        } => (share_id, item_id, *at),
        _ => return,
    };

    if let Some(item) = item_mut(state, share_id, item_id) {
        item.last_use_time = Some(at);
    }
}

// =============================================================================
// Bulk Operations
// =============================================================================

fn empty_trash(state: &mut ItemsByShareId, _: &Action) {
    for items in state.values_mut() {
        items.retain(|_, item| !item.is_trashed());
    }
}

fn restore_trash(state: &mut ItemsByShareId, _: &Action) {
    for item in state.values_mut().flat_map(|items| items.values_mut()) {
        if item.is_trashed() {
            item.state = ItemState::Active;
        }
    }
}

fn drop_share(state: &mut ItemsByShareId, action: &Action) {
    if let Some(share_id) = action.share_id() {
        state.remove(share_id);
    }
}

fn move_all_items(state: &mut ItemsByShareId, action: &Action) {
    let Action::VaultMoveAllItemsSuccess {
        share_id,
        destination_share_id,
        moved_items,
    } = action
    else {
        return;
    };

    state.insert(share_id.clone(), Default::default());
    for item in moved_items {
        upsert(state, destination_share_id, item.clone());
    }
}

fn accept_invite(state: &mut ItemsByShareId, action: &Action) {
    let Action::InviteAcceptSuccess { share, items } = action else {
        return;
    };

    for item in items {
        upsert(state, &share.share_id, item.clone());
    }
}

// =============================================================================
// Optimistic Id Index
// =============================================================================

fn resolve_optimistic_id(state: &mut ItemsByOptimisticId, action: &Action) {
    match action {
        Action::ItemCreationSuccess {
            optimistic_id,
            item,
            ..
        }
        | Action::ItemMoveSuccess {
            optimistic_id,
            item,
            ..
        }
        | Action::ItemMoveFailure {
            optimistic_id,
            item,
            ..
        } => {
            state.insert(optimistic_id.clone(), item.unique());
        }
        _ => {}
    }
}
