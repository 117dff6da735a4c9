mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use vault_core::{Action, SharesById};
use vault_sync::{
    CacheWriter, MemoryCacheStorage, Supervisor, SyncConfig, SyncContextBuilder, SyncRuntime,
    SHARE_DISABLED_CODE,
};

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn throttled_cache_requests_coalesce_into_one_write() {
    let h = harness(snapshot());
    let writer = CacheWriter::spawn(h.ctx.clone());

    h.ctx.store.dispatch(Action::CacheRequest { throttle: true });
    h.ctx.store.dispatch(Action::CacheRequest { throttle: true });
    settle().await;
    assert_eq!(h.cache.write_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.cache.write_count(), 1);

    writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cache_cancel_drops_the_pending_write() {
    let h = harness(snapshot());
    let writer = CacheWriter::spawn(h.ctx.clone());

    h.ctx.store.dispatch(Action::CacheRequest { throttle: true });
    h.ctx.store.dispatch(Action::CacheCancel);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.cache.write_count(), 0);

    h.ctx.store.dispatch(Action::CacheRequest { throttle: false });
    settle().await;
    assert_eq!(h.cache.write_count(), 1);
    assert!(h.cache.current().ciphertext.is_some());

    writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn supervisor_opens_one_channel_per_share() {
    let h = harness(snapshot());
    let supervisor = Supervisor::spawn(h.ctx.clone());

    h.ctx.store.dispatch(Action::StartEventPolling);
    settle().await;

    let status = supervisor.status().await;
    assert!(status.polling);
    assert_eq!(status.active_channels, vec!["share-a", "share-b"]);
    assert_eq!(h.api.polls_for("share-a").len(), 1);
    assert_eq!(h.api.polls_for("share-b").len(), 1);

    supervisor.wake();
    settle().await;
    assert_eq!(h.api.polls_for("share-a").len(), 2);
    assert_eq!(h.api.polls_for("share-b").len(), 2);

    h.ctx.store.dispatch(Action::StopEventPolling);
    settle().await;

    let status = supervisor.status().await;
    assert!(!status.polling);
    assert!(status.active_channels.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.api.polls_for("share-a").len(), 2);

    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn supervisor_starts_behind_a_burst_of_actions() {
    let h = harness(snapshot());
    let supervisor = Supervisor::spawn(h.ctx.clone());

    for n in 0..300 {
        h.ctx.store.dispatch(Action::ShareEvent {
            share_id: "share-b".into(),
            event_id: format!("evt-{}", n),
        });
    }
    h.ctx.store.dispatch(Action::StartEventPolling);
    settle().await;

    let status = supervisor.status().await;
    assert!(status.polling);
    assert_eq!(status.active_channels, vec!["share-a", "share-b"]);
    assert_eq!(h.api.polls_for("share-b"), vec!["evt-299"]);

    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn supervisor_follows_new_and_revoked_shares() {
    let h = harness(snapshot());
    h.api.script(
        "share-b",
        Reply::Fail {
            status: 422,
            code: SHARE_DISABLED_CODE,
        },
    );
    let supervisor = Supervisor::spawn(h.ctx.clone());

    h.ctx.store.dispatch(Action::StartEventPolling);
    settle().await;

    let mut shares = SharesById::new();
    shares.insert("share-c".into(), vault("share-c", "evt-3"));
    h.ctx.store.dispatch(Action::SharesSync {
        shares,
        items: Default::default(),
    });
    settle().await;

    let status = supervisor.status().await;
    assert_eq!(status.active_channels, vec!["share-a", "share-c"]);
    assert_eq!(h.api.polls_for("share-c"), vec!["evt-3"]);

    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn runtime_boots_and_starts_polling() {
    let cache = Arc::new(MemoryCacheStorage::new());
    let api = FakeApi::new();
    api.add_share(encrypted_vault("s1", "Personal"), vec![encrypted_item("i1", 1, "bank")]);
    api.set_latest("s1", "evt-5");

    let ctx = SyncContextBuilder::new(SyncConfig::default())
        .with_api(api.clone())
        .with_crypto(FakeCrypto::new())
        .with_session(Arc::new(FakeSession { lock_token: None }))
        .with_cache(cache.clone())
        .build()
        .expect("context");

    let runtime = SyncRuntime::start(ctx).await.expect("runtime");
    assert!(!runtime.hydrated_from_cache());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(runtime.status().await.active_channels, vec!["s1"]);
    assert_eq!(api.polls_for("s1"), vec!["evt-5"]);
    assert_eq!(cache.write_count(), 1);

    runtime.shutdown().await;
}

#[test]
fn builder_requires_crypto_and_session() {
    let err = SyncContextBuilder::new(SyncConfig::default())
        .with_api(FakeApi::new())
        .build()
        .err()
        .expect("missing crypto");
    assert!(err.is_config_error());
}
