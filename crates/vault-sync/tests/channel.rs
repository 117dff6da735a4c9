mod common;

use std::time::Duration;

use common::*;
use vault_core::selectors::{select_event_id, select_item, select_share};
use vault_core::{Action, ActionKind, Draft, ItemKind};
use vault_sync::protocol::LastUseItem;
use vault_sync::{spawn_share_channel, SyncConfig, SHARE_DISABLED_CODE};

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn revoked_share_discards_bound_drafts_and_is_removed() {
    let mut snapshot = snapshot();
    snapshot.drafts = vec![
        edit_draft("share-a", "a1", 3),
        edit_draft("share-a", "a2", 1),
        Draft::New {
            kind: ItemKind::Note,
            form_data: serde_json::Value::Null,
        },
    ];
    let h = harness(snapshot);
    h.api.script(
        "share-a",
        Reply::Fail {
            status: 422,
            code: SHARE_DISABLED_CODE,
        },
    );

    let mut rx = h.ctx.store.subscribe();
    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    tokio::time::timeout(Duration::from_secs(5), channel.closed())
        .await
        .expect("channel closes itself");

    let actions = drain(&mut rx);
    assert_eq!(count(&actions, |a| a.is(ActionKind::DraftDiscard)), 2);
    assert_eq!(
        actions.last(),
        Some(&Action::ShareDeleteSync {
            share_id: "share-a".into()
        })
    );

    h.ctx.store.read(|state| {
        assert!(select_share(state, "share-a").is_none());
        assert!(state.items().get("share-a").is_none());
        assert!(matches!(state.items.drafts.as_slice(), [Draft::New { .. }]));
    });

    assert_eq!(
        h.callbacks.calls(),
        vec!["share_deleted:share-a:present=true", "items_updated"]
    );
    assert_eq!(h.api.polls_for("share-a").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unchanged_watermark_with_empty_delta_dispatches_nothing() {
    let h = harness(snapshot());
    let mut rx = h.ctx.store.subscribe();

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    channel.close();
    channel.closed().await;

    assert_eq!(h.api.polls_for("share-a"), vec!["evt-1"]);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn unchanged_watermark_dispatch_is_configurable() {
    let mut config = SyncConfig::default();
    config.polling.dispatch_unchanged_watermark = true;
    let h = harness_with(snapshot(), config, Default::default());
    let mut rx = h.ctx.store.subscribe();

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    channel.close();
    channel.closed().await;

    assert_eq!(
        drain(&mut rx),
        vec![Action::ShareEvent {
            share_id: "share-a".into(),
            event_id: "evt-1".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn new_watermark_is_dispatched_even_with_empty_delta() {
    let h = harness(snapshot());
    h.api.script("share-a", Reply::Events(events("evt-2")));
    let mut rx = h.ctx.store.subscribe();

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    channel.close();
    channel.closed().await;

    assert_eq!(count(&drain(&mut rx), |a| a.is(ActionKind::ShareEvent)), 1);
    assert_eq!(
        h.ctx.store.read(|s| select_event_id(s, "share-a").map(str::to_owned)),
        Some("evt-2".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn delta_is_applied_after_callbacks() {
    let h = harness(snapshot());
    h.ctx.store.dispatch(Action::DraftSave(edit_draft("share-a", "a2", 1)));

    let mut delta = events("evt-2");
    delta.deleted_item_ids = vec!["a2".into()];
    delta.updated_items = vec![
        encrypted_item("a1", 5, "renamed"),
        encrypted_item("a9", 1, "corrupt"),
    ];
    delta.last_use_items = Some(vec![LastUseItem {
        item_id: "a1".into(),
        last_use_time: 1_700_000_900,
    }]);
    h.api.script("share-a", Reply::Events(delta));

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    channel.close();
    channel.closed().await;

    assert_eq!(
        h.callbacks.calls(),
        vec!["items_deleted:share-a:a2:present=true", "items_updated"]
    );

    h.ctx.store.read(|state| {
        assert!(select_item(state, "share-a", "a2").is_none());
        assert!(state.items.drafts.is_empty());

        let a1 = select_item(state, "share-a", "a1").expect("a1 kept");
        assert_eq!(a1.revision, 5);
        assert_eq!(a1.data.name, "renamed");
        assert_eq!(a1.last_use_time, Some(1_700_000_900));

        assert!(select_item(state, "share-a", "a9").is_none());
    });
}

#[tokio::test(start_paused = true)]
async fn pending_events_repoll_after_min_interval() {
    let h = harness(snapshot());
    let mut first = events("evt-2");
    first.events_pending = true;
    h.api.script("share-a", Reply::Events(first));
    h.api.script("share-a", Reply::Events(events("evt-3")));

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;

    assert_eq!(h.api.polls_for("share-a"), vec!["evt-1", "evt-2"]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.api.polls_for("share-a").len(), 2);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.api.polls_for("share-a"), vec!["evt-1", "evt-2", "evt-3"]);

    channel.close();
    channel.closed().await;
}

#[tokio::test(start_paused = true)]
async fn wakeup_forces_immediate_poll() {
    let h = harness(snapshot());
    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    assert_eq!(h.api.polls_for("share-a").len(), 1);

    h.ctx.store.dispatch(Action::WakeupPolling);
    settle().await;
    assert_eq!(h.api.polls_for("share-a").len(), 2);

    channel.close();
    channel.closed().await;
}

#[tokio::test(start_paused = true)]
async fn transient_errors_keep_the_channel_open() {
    let h = harness(snapshot());
    h.api.script(
        "share-a",
        Reply::Fail {
            status: 503,
            code: 0,
        },
    );
    h.api.script("share-a", Reply::Events(events("evt-2")));

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;
    assert!(!channel.is_closed());
    assert_eq!(h.api.polls_for("share-a").len(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.api.polls_for("share-a"), vec!["evt-1", "evt-1"]);
    assert!(h.ctx.store.read(|s| select_share(s, "share-a").is_some()));

    channel.close();
    channel.closed().await;
}

#[tokio::test(start_paused = true)]
async fn local_vault_deletion_closes_the_channel() {
    let h = harness(snapshot());
    h.ctx.store.dispatch(Action::DraftSave(edit_draft("share-a", "a1", 3)));

    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;

    h.ctx.store.dispatch(Action::VaultDeleteSuccess {
        share_id: "share-a".into(),
    });
    tokio::time::timeout(Duration::from_secs(5), channel.closed())
        .await
        .expect("channel closes on deletion");

    assert!(h.ctx.store.read(|s| s.items.drafts.is_empty()));
    assert_eq!(h.api.polls_for("share-a").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deletion_is_seen_behind_a_burst_of_actions() {
    let h = harness(snapshot());
    let channel = spawn_share_channel(h.ctx.clone(), "share-a");
    settle().await;

    h.ctx.store.dispatch(Action::VaultDeleteSuccess {
        share_id: "share-a".into(),
    });
    for revision in 0..300 {
        h.ctx.store.dispatch(Action::ItemEditSync {
            share_id: "share-b".into(),
            item: item("share-b", "b1", revision),
        });
    }

    tokio::time::timeout(Duration::from_secs(5), channel.closed())
        .await
        .expect("channel closes on deletion");

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.api.polls_for("share-a").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_watermark_is_fetched_first() {
    let mut snapshot = snapshot();
    snapshot
        .shares
        .get_mut("share-b")
        .expect("share-b")
        .event_id
        .clear();
    let h = harness(snapshot);
    h.api.set_latest("share-b", "evt-40");

    let channel = spawn_share_channel(h.ctx.clone(), "share-b");
    settle().await;
    channel.close();
    channel.closed().await;

    assert_eq!(h.api.polls_for("share-b"), vec!["evt-40"]);
}

#[tokio::test(start_paused = true)]
async fn missing_share_never_polls() {
    let h = harness(snapshot());
    let channel = spawn_share_channel(h.ctx.clone(), "share-x");

    tokio::time::timeout(Duration::from_secs(5), channel.closed())
        .await
        .expect("channel ends immediately");
    assert!(h.api.polls_for("share-x").is_empty());
}
