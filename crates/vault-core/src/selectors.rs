//! # Selectors
//!
//! Read-only queries over [`ReplicaState`]. Event channels use these to
//! read the watermark, and the UI layer uses them to flag failed
//! optimistic entries and stale drafts.

use crate::error::{CoreError, CoreResult};
use crate::optimistic::OptimisticKey;
use crate::reducers::ReplicaState;
use crate::types::{Draft, ItemRevision, Share, ShareId, UniqueItem};

// =============================================================================
// Shares
// =============================================================================

pub fn select_share<'a>(state: &'a ReplicaState, share_id: &str) -> Option<&'a Share> {
    state.shares().get(share_id)
}

pub fn select_share_checked<'a>(state: &'a ReplicaState, share_id: &str) -> CoreResult<&'a Share> {
    select_share(state, share_id).ok_or_else(|| CoreError::ShareNotFound(share_id.to_string()))
}

pub fn select_share_ids(state: &ReplicaState) -> Vec<ShareId> {
    state.shares().keys().cloned().collect()
}

/// Known watermark of a share, `None` if the share or its watermark is
/// missing.
pub fn select_event_id<'a>(state: &'a ReplicaState, share_id: &str) -> Option<&'a str> {
    select_share(state, share_id)
        .filter(|share| share.has_event_id())
        .map(|share| share.event_id.as_str())
}

pub fn is_share_pending(state: &ReplicaState, share_id: &str) -> bool {
    state.shares.is_pending(&OptimisticKey::share(share_id))
}

pub fn is_share_failed(state: &ReplicaState, share_id: &str) -> bool {
    state.shares.is_failed(&OptimisticKey::share(share_id))
}

// =============================================================================
// Items
// =============================================================================

pub fn select_item<'a>(
    state: &'a ReplicaState,
    share_id: &str,
    item_id: &str,
) -> Option<&'a ItemRevision> {
    state.items().get(share_id)?.get(item_id)
}

pub fn select_item_checked<'a>(
    state: &'a ReplicaState,
    share_id: &str,
    item_id: &str,
) -> CoreResult<&'a ItemRevision> {
    select_item(state, share_id, item_id).ok_or_else(|| CoreError::item_not_found(share_id, item_id))
}

pub fn select_items_for_share<'a>(
    state: &'a ReplicaState,
    share_id: &str,
) -> impl Iterator<Item = &'a ItemRevision> {
    state
        .items()
        .get(share_id)
        .into_iter()
        .flat_map(|items| items.values())
}

/// Item an optimistic id resolved to, once its creation or move settled.
pub fn select_resolved_optimistic_id<'a>(
    state: &'a ReplicaState,
    optimistic_id: &str,
) -> Option<&'a UniqueItem> {
    state.items.by_optimistic_id.get(optimistic_id)
}

pub fn is_item_pending(state: &ReplicaState, share_id: &str, item_id: &str) -> bool {
    state
        .items
        .by_share_id
        .is_pending(&OptimisticKey::item(share_id, item_id))
}

pub fn is_item_failed(state: &ReplicaState, share_id: &str, item_id: &str) -> bool {
    state
        .items
        .by_share_id
        .is_failed(&OptimisticKey::item(share_id, item_id))
}

// =============================================================================
// Drafts
// =============================================================================

pub fn select_drafts_for_share<'a>(
    state: &'a ReplicaState,
    share_id: &'a str,
) -> impl Iterator<Item = &'a Draft> {
    state
        .items
        .drafts
        .iter()
        .filter(move |draft| draft.is_bound_to_share(share_id))
}

/// Edit drafts bound to `share_id` and, if given, to one of `item_ids`.
pub fn select_bound_drafts(
    state: &ReplicaState,
    share_id: &str,
    item_ids: Option<&[String]>,
) -> Vec<UniqueItem> {
    state
        .items
        .drafts
        .iter()
        .filter_map(|draft| match draft {
            Draft::Edit {
                share_id: s,
                item_id,
                ..
            } if s == share_id => Some(UniqueItem::new(s.as_str(), item_id.as_str())),
            _ => None,
        })
        .filter(|unique| item_ids.map_or(true, |ids| ids.contains(&unique.item_id)))
        .collect()
}

/// Checks an edit draft against the replica.
///
/// A `new` draft is never stale.
pub fn check_draft(state: &ReplicaState, draft: &Draft) -> CoreResult<()> {
    let Draft::Edit {
        share_id,
        item_id,
        revision,
        ..
    } = draft
    else {
        return Ok(());
    };

    let current = select_item_checked(state, share_id, item_id)?;
    if current.revision > *revision {
        return Err(CoreError::StaleDraft {
            item_id: item_id.clone(),
            draft_revision: *revision,
            current_revision: current.revision,
        });
    }

    Ok(())
}

/// Returns true if the item an edit draft was opened against has since
/// moved on (or disappeared).
pub fn is_draft_stale(state: &ReplicaState, draft: &Draft) -> bool {
    check_draft(state, draft).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::reducers::fixtures::{item, snapshot};
    use serde_json::Value;

    fn edit_draft(item_id: &str, revision: u64) -> Draft {
        Draft::Edit {
            share_id: "share-a".into(),
            item_id: item_id.into(),
            revision,
            form_data: Value::Null,
        }
    }

    #[test]
    fn test_draft_becomes_stale_after_sync() {
        let mut state = ReplicaState::from_snapshot(snapshot());
        let draft = edit_draft("a1", 3);
        assert!(!is_draft_stale(&state, &draft));

        state.reduce(&Action::ItemEditSync {
            share_id: "share-a".into(),
            item: item("share-a", "a1", 4),
        });

        assert_eq!(
            check_draft(&state, &draft),
            Err(CoreError::StaleDraft {
                item_id: "a1".into(),
                draft_revision: 3,
                current_revision: 4,
            })
        );
    }

    #[test]
    fn test_draft_for_deleted_item_is_stale() {
        let mut state = ReplicaState::from_snapshot(snapshot());
        state.reduce(&Action::ItemDeleteSync {
            share_id: "share-a".into(),
            item_id: "a2".into(),
        });

        assert!(is_draft_stale(&state, &edit_draft("a2", 1)));
    }

    #[test]
    fn test_bound_drafts_filter_by_item() {
        let mut state = ReplicaState::from_snapshot(snapshot());
        state.reduce(&Action::DraftSave(edit_draft("a1", 3)));
        state.reduce(&Action::DraftSave(edit_draft("a2", 1)));

        assert_eq!(select_bound_drafts(&state, "share-a", None).len(), 2);
        assert_eq!(
            select_bound_drafts(&state, "share-a", Some(&["a2".to_string()])),
            vec![UniqueItem::new("share-a", "a2")]
        );
        assert_eq!(select_drafts_for_share(&state, "share-b").count(), 0);
    }

    #[test]
    fn test_event_id_requires_known_watermark() {
        let mut state = ReplicaState::from_snapshot(snapshot());
        assert_eq!(select_event_id(&state, "share-a"), Some("evt-1"));

        state.reduce(&Action::ShareEvent {
            share_id: "share-a".into(),
            event_id: String::new(),
        });
        assert_eq!(select_event_id(&state, "share-a"), None);
        assert!(select_share_checked(&state, "share-x").is_err());
    }
}
