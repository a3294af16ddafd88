//! Reconciliation behavior over the background transaction feed.

use chrono::{Duration as ChronoDuration, Utc};
use openiap_client::{IapClient, RequestPurchaseProps, SessionMonitor};
use openiap_lib::test_utils::{
    product, subscription_transaction, transaction, verified, MockStoreService,
};
use openiap_lib::{EngineConfig, PurchaseCallOutcome, Verification};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

fn count_purchases(client: &IapClient) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    client.add_purchase_updated_listener(Arc::new(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    }));
    count
}

#[tokio::test]
async fn test_same_id_twice_inside_window_emits_once() {
    let store = Arc::new(MockStoreService::new());
    let client = IapClient::new(store.clone());
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    store.push_update(verified(transaction("txn.dup", "sku.a")));
    store.push_update(verified(transaction("txn.dup", "sku.a")));
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_pending_transactions().await.len(), 1);
}

#[tokio::test]
async fn test_id_reprocessed_after_window_eviction() {
    let store = Arc::new(MockStoreService::new());
    let config = EngineConfig::new().with_dedup_window(Duration::from_millis(40));
    let client = IapClient::with_config(store.clone(), config);
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    store.push_update(verified(transaction("txn.renew", "sku.sub")));
    settle().await;
    assert_eq!(emitted.load(Ordering::SeqCst), 1);

    // Past the window the same id is a legitimate new event (renewal resend).
    tokio::time::sleep(Duration::from_millis(60)).await;
    store.push_update(verified(transaction("txn.renew", "sku.sub")));
    settle().await;
    assert_eq!(emitted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_supersession_prefers_newer_group_transaction() {
    let store = Arc::new(MockStoreService::new());
    let client = IapClient::new(store.clone());
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    let upgrade = subscription_transaction(
        "txn.upgrade",
        "sku.pro",
        "group.tier",
        Utc::now(),
        ChronoDuration::days(30),
    );
    let stale = subscription_transaction(
        "txn.stale",
        "sku.basic",
        "group.tier",
        Utc::now() - ChronoDuration::hours(2),
        ChronoDuration::days(30),
    );

    store.push_update(verified(upgrade));
    store.push_update(verified(stale));
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 1, "stale tier never surfaces");
    let pending = client.get_pending_transactions().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].product_id, "sku.pro");
}

#[tokio::test]
async fn test_revoked_transaction_never_emits() {
    let store = Arc::new(MockStoreService::new());
    let client = IapClient::new(store.clone());
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    let mut refund = transaction("txn.refund", "sku.a");
    refund.revocation_date = Some(Utc::now());
    store.push_update(verified(refund));
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 0);
    assert!(client.get_pending_transactions().await.is_empty());
}

#[tokio::test]
async fn test_listener_and_purchase_race_emits_once() {
    // The same transaction observed through both the feed and the explicit
    // purchase path must surface exactly once, whichever wins the monitor.
    let store = Arc::new(MockStoreService::new());
    store.seed_products([product("sku.race")]);
    store.queue_purchase_outcome(Ok(PurchaseCallOutcome::Success {
        transaction: transaction("txn.race", "sku.race"),
        verification: Verification::Verified,
    }));

    let client = Arc::new(IapClient::new(store.clone()));
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    let request = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .request_purchase(RequestPurchaseProps::new("sku.race"))
                .await
        })
    };
    store.push_update(verified(transaction("txn.race", "sku.race")));

    request.await.unwrap().unwrap();
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_pending_transactions().await.len(), 1);
}

#[tokio::test]
async fn test_monitor_admission_race_has_single_winner() {
    // 100 tasks racing one id through the monitor: exactly one acceptance.
    let monitor = Arc::new(SessionMonitor::new(EngineConfig::DEFAULT_DEDUP_WINDOW));
    let tx = transaction("txn.contended", "sku.a");

    let mut joins = tokio::task::JoinSet::new();
    for _ in 0..100 {
        let monitor = Arc::clone(&monitor);
        let tx = tx.clone();
        joins.spawn(async move { monitor.admit(&tx, Instant::now()).await });
    }

    let mut accepted = 0;
    let mut duplicates = 0;
    while let Some(result) = joins.join_next().await {
        match result.unwrap() {
            openiap_client::Admission::Accepted => accepted += 1,
            openiap_client::Admission::Duplicate => duplicates += 1,
            openiap_client::Admission::Superseded => panic!("no group involved"),
        }
    }

    assert_eq!(accepted, 1, "exactly one task wins the monitor");
    assert_eq!(duplicates, 99);
}

#[tokio::test]
async fn test_disconnect_stops_feed_processing() {
    let store = Arc::new(MockStoreService::new());
    let client = IapClient::new(store.clone());
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    client.disconnect().await;
    // The old feed's consumer is gone; pushing into it reaches nobody.
    store.push_update(verified(transaction("txn.late", "sku.a")));
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 0);
    assert!(client.get_pending_transactions().await.is_empty());
}

#[tokio::test]
async fn test_reconnect_processes_fresh_feed() {
    let store = Arc::new(MockStoreService::new());
    let client = IapClient::new(store.clone());
    client.connect().await.unwrap();
    client.disconnect().await;
    client.connect().await.unwrap();
    let emitted = count_purchases(&client);

    store.push_update(verified(transaction("txn.fresh", "sku.a")));
    settle().await;

    assert_eq!(emitted.load(Ordering::SeqCst), 1);
}
