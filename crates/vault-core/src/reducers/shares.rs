//! # Shares Reducer
//!
//! Keeps `SharesById` and every share's event watermark.
//!
//! Vault creation, edit and deletion are optimistic, keyed by share id
//! (by optimistic id for creations). Everything coming from an event
//! channel replaces local data unconditionally.

use crate::actions::{Action, ActionKind};
use crate::optimistic::OptimisticMatchers;
use crate::reducers::ReducerRegistry;
use crate::types::{Share, ShareType, SharesById};

pub fn matchers() -> Vec<OptimisticMatchers<Action>> {
    vec![
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::VaultCreationIntent))
            .fail(|a| a.is(ActionKind::VaultCreationFailure))
            .revert(|a| a.is(ActionKind::VaultCreationSuccess))
            .revert(|a| a.is(ActionKind::VaultCreationDismiss)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::VaultEditIntent))
            .commit(|a| a.is(ActionKind::VaultEditSuccess))
            .revert(|a| a.is(ActionKind::VaultEditFailure)),
        OptimisticMatchers::initiate(|a: &Action| a.is(ActionKind::VaultDeleteIntent))
            .commit(|a| a.is(ActionKind::VaultDeleteSuccess))
            .revert(|a| a.is(ActionKind::VaultDeleteFailure)),
    ]
}

pub fn registry() -> ReducerRegistry<SharesById> {
    ReducerRegistry::new()
        .on_each(
            &[ActionKind::BootSuccess, ActionKind::SyncSuccess],
            replace_all,
        )
        .on(ActionKind::SharesSync, merge_shares)
        .on(ActionKind::StateHydrate, hydrate)
        .on(ActionKind::ShareEvent, advance_watermark)
        .on_each(
            &[ActionKind::ShareEditSync, ActionKind::VaultEditSuccess],
            replace_share,
        )
        .on_each(
            &[
                ActionKind::ShareDeleteSync,
                ActionKind::ShareLeaveSuccess,
                ActionKind::VaultDeleteIntent,
                ActionKind::VaultDeleteSuccess,
            ],
            drop_share,
        )
        .on(ActionKind::VaultCreationIntent, create_optimistic)
        .on(ActionKind::VaultCreationSuccess, create_confirmed)
        .on(ActionKind::VaultEditIntent, edit_optimistic)
        .on(ActionKind::InviteAcceptSuccess, accept_invite)
}

/// Inserts `share`, keeping the known watermark when `share` carries none.
fn upsert(state: &mut SharesById, share: &Share) {
    let mut next = share.clone();
    if let Some(existing) = state.get(&share.share_id) {
        if !next.has_event_id() {
            next.event_id = existing.event_id.clone();
        }
    }
    state.insert(next.share_id.clone(), next);
}

fn replace_all(state: &mut SharesById, action: &Action) {
    if let Action::BootSuccess { shares, .. } | Action::SyncSuccess { shares, .. } = action {
        *state = shares.clone();
    }
}

fn merge_shares(state: &mut SharesById, action: &Action) {
    if let Action::SharesSync { shares, .. } = action {
        for share in shares.values() {
            upsert(state, share);
        }
    }
}

fn hydrate(state: &mut SharesById, action: &Action) {
    if let Action::StateHydrate(snapshot) = action {
        *state = snapshot.shares.clone();
    }
}

fn advance_watermark(state: &mut SharesById, action: &Action) {
    let Action::ShareEvent { share_id, event_id } = action else {
        return;
    };

    if let Some(share) = state.get_mut(share_id) {
        share.event_id = event_id.clone();
    }
}

fn replace_share(state: &mut SharesById, action: &Action) {
    if let Action::ShareEditSync { share, .. } | Action::VaultEditSuccess { share } = action {
        upsert(state, share);
    }
}

fn drop_share(state: &mut SharesById, action: &Action) {
    if let Some(share_id) = action.share_id() {
        state.remove(share_id);
    }
}

fn create_optimistic(state: &mut SharesById, action: &Action) {
    let Action::VaultCreationIntent {
        optimistic_id,
        content,
        create_time,
    } = action
    else {
        return;
    };

    state.insert(
        optimistic_id.clone(),
        Share {
            share_id: optimistic_id.clone(),
            vault_id: optimistic_id.clone(),
            target_type: ShareType::Vault,
            target_id: optimistic_id.clone(),
            event_id: String::new(),
            content: Some(content.clone()),
            owner: true,
            shared: false,
            create_time: *create_time,
        },
    );
}

fn create_confirmed(state: &mut SharesById, action: &Action) {
    let Action::VaultCreationSuccess {
        optimistic_id,
        share,
    } = action
    else {
        return;
    };

    state.remove(optimistic_id);
    upsert(state, share);
}

fn edit_optimistic(state: &mut SharesById, action: &Action) {
    let Action::VaultEditIntent { share_id, content } = action else {
        return;
    };

    if let Some(share) = state.get_mut(share_id) {
        share.content = Some(content.clone());
    }
}

fn accept_invite(state: &mut SharesById, action: &Action) {
    if let Action::InviteAcceptSuccess { share, .. } = action {
        upsert(state, share);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::fixtures::{snapshot, vault};
    use crate::reducers::ReplicaState;
    use crate::types::VaultContent;

    fn state() -> ReplicaState {
        ReplicaState::from_snapshot(snapshot())
    }

    #[test]
    fn test_share_event_is_idempotent() {
        let mut state = state();
        let event = Action::ShareEvent {
            share_id: "share-a".into(),
            event_id: "evt-2".into(),
        };

        state.reduce(&event);
        let once = state.snapshot();
        state.reduce(&event);

        assert_eq!(state.snapshot(), once);
        assert_eq!(state.shares()["share-a"].event_id, "evt-2");
    }

    #[test]
    fn test_share_event_for_unknown_share_is_ignored() {
        let mut state = state();
        state.reduce(&Action::ShareEvent {
            share_id: "share-x".into(),
            event_id: "evt-2".into(),
        });
        assert!(!state.shares().contains_key("share-x"));
    }

    #[test]
    fn test_edit_sync_keeps_watermark() {
        let mut state = state();
        let mut updated = vault("share-a", "");
        updated.content = Some(VaultContent {
            name: "Renamed".into(),
            description: String::new(),
        });

        state.reduce(&Action::ShareEditSync {
            share_id: "share-a".into(),
            share: updated,
        });

        let share = &state.shares()["share-a"];
        assert_eq!(share.event_id, "evt-1");
        assert_eq!(share.content.as_ref().map(|c| c.name.as_str()), Some("Renamed"));
    }

    #[test]
    fn test_vault_creation_success_replaces_placeholder() {
        let mut state = state();
        state.reduce(&Action::VaultCreationIntent {
            optimistic_id: "tmp-vault".into(),
            content: VaultContent::default(),
            create_time: 1_700_000_000,
        });
        assert!(state.shares().contains_key("tmp-vault"));

        state.reduce(&Action::VaultCreationSuccess {
            optimistic_id: "tmp-vault".into(),
            share: vault("share-c", "evt-1"),
        });

        assert!(!state.shares().contains_key("tmp-vault"));
        assert!(state.shares().contains_key("share-c"));
        assert!(!state.shares.has_pending());
    }

    #[test]
    fn test_vault_delete_failure_restores_share() {
        let mut state = state();
        state.reduce(&Action::VaultDeleteIntent {
            share_id: "share-a".into(),
        });
        assert!(!state.shares().contains_key("share-a"));

        state.reduce(&Action::VaultDeleteFailure {
            share_id: "share-a".into(),
        });
        assert_eq!(state.shares()["share-a"].event_id, "evt-1");
    }

    #[test]
    fn test_share_delete_sync_removes_share_and_items() {
        let mut state = state();
        state.reduce(&Action::ShareDeleteSync {
            share_id: "share-a".into(),
        });

        assert!(!state.shares().contains_key("share-a"));
        assert!(!state.items().contains_key("share-a"));
    }
}
