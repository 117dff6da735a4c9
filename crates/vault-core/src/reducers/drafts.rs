//! # Drafts Reducer
//!
//! Keeps at most one `new` draft and at most one `edit` draft per item.
//! The most recently saved draft comes first.

use crate::actions::{Action, ActionKind};
use crate::reducers::ReducerRegistry;
use crate::types::{Draft, DraftTarget};

pub fn registry() -> ReducerRegistry<Vec<Draft>> {
    ReducerRegistry::new()
        .on(ActionKind::DraftSave, save)
        .on(ActionKind::DraftDiscard, discard)
        .on(ActionKind::DraftsGarbageCollect, |drafts, _| drafts.clear())
        .on(ActionKind::StateHydrate, hydrate)
}

/// Drops every draft occupying the slot of `target`.
fn sanitize(drafts: &mut Vec<Draft>, target: &DraftTarget) {
    drafts.retain(|draft| &draft.target() != target);
}

fn save(drafts: &mut Vec<Draft>, action: &Action) {
    if let Action::DraftSave(draft) = action {
        sanitize(drafts, &draft.target());
        drafts.insert(0, draft.clone());
    }
}

fn discard(drafts: &mut Vec<Draft>, action: &Action) {
    if let Action::DraftDiscard(target) = action {
        sanitize(drafts, target);
    }
}

fn hydrate(drafts: &mut Vec<Draft>, action: &Action) {
    if let Action::StateHydrate(snapshot) = action {
        *drafts = snapshot.drafts.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimistic::Reducer;
    use crate::types::{ItemKind, UniqueItem};
    use serde_json::json;

    fn edit(item_id: &str, revision: u64) -> Draft {
        Draft::Edit {
            share_id: "share-a".into(),
            item_id: item_id.into(),
            revision,
            form_data: json!({ "rev": revision }),
        }
    }

    fn new_draft(kind: ItemKind) -> Draft {
        Draft::New {
            kind,
            form_data: json!({}),
        }
    }

    #[test]
    fn test_single_new_draft() {
        let registry = registry();
        let mut drafts = Vec::new();

        registry.reduce(&mut drafts, &Action::DraftSave(new_draft(ItemKind::Login)));
        registry.reduce(&mut drafts, &Action::DraftSave(new_draft(ItemKind::Note)));

        assert_eq!(drafts, vec![new_draft(ItemKind::Note)]);
    }

    #[test]
    fn test_single_edit_draft_per_item() {
        let registry = registry();
        let mut drafts = Vec::new();

        registry.reduce(&mut drafts, &Action::DraftSave(edit("a1", 1)));
        registry.reduce(&mut drafts, &Action::DraftSave(edit("a2", 1)));
        registry.reduce(&mut drafts, &Action::DraftSave(new_draft(ItemKind::Login)));
        registry.reduce(&mut drafts, &Action::DraftSave(edit("a1", 2)));

        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0], edit("a1", 2));
    }

    #[test]
    fn test_discard_and_garbage_collect() {
        let registry = registry();
        let mut drafts = vec![edit("a1", 1), new_draft(ItemKind::Login)];

        registry.reduce(
            &mut drafts,
            &Action::DraftDiscard(DraftTarget::Edit(UniqueItem::new("share-a", "a1"))),
        );
        assert_eq!(drafts, vec![new_draft(ItemKind::Login)]);

        registry.reduce(&mut drafts, &Action::DraftsGarbageCollect);
        assert!(drafts.is_empty());
    }
}
