//! Resolver behavior against a scripted store.

use chrono::{Duration, Utc};
use openiap_lib::test_utils::{
    subscription_transaction, transaction, unverified, verified, MockStoreService,
};
use openiap_lib::{
    EngineConfig, ErrorCode, PriceIncreaseStatus, PurchaseError, SubscriptionPhase,
    SubscriptionStatusRecord,
};
use openiap_subscriptions::SubscriptionStateResolver;
use std::sync::Arc;

fn resolver(store: Arc<MockStoreService>) -> SubscriptionStateResolver {
    SubscriptionStateResolver::new(store, EngineConfig::default())
}

fn status_record(sku: &str, will_auto_renew: bool) -> SubscriptionStatusRecord {
    SubscriptionStatusRecord {
        product_id: sku.into(),
        phase: SubscriptionPhase::Subscribed,
        will_auto_renew,
        auto_renew_preference: None,
        grace_period_expiration: None,
        price_increase_status: None,
    }
}

#[tokio::test]
async fn test_subscription_expiring_in_three_days() {
    let store = Arc::new(MockStoreService::new());
    let purchased = Utc::now() - Duration::days(27);
    store.seed_entitlements([verified(subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        purchased,
        Duration::days(30),
    ))]);
    store.seed_subscription_status(
        "group.pro",
        Ok(vec![status_record("com.example.pro.monthly", true)]),
    );

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    assert_eq!(subs.len(), 1);
    let sub = &subs[0];
    assert!(sub.is_active);
    assert!(sub.will_expire_soon, "3 days out is inside the 7-day horizon");
    assert_eq!(sub.days_until_expiration, Some(3));
    assert!(sub.renewal_info.as_ref().unwrap().will_auto_renew);
}

#[tokio::test]
async fn test_expired_subscription_is_inactive() {
    let store = Arc::new(MockStoreService::new());
    let purchased = Utc::now() - Duration::days(40);
    store.seed_entitlements([verified(subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        purchased,
        Duration::days(30),
    ))]);

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    assert_eq!(subs.len(), 1);
    assert!(!subs[0].is_active);
    assert!(!subs[0].will_expire_soon, "already expired, not expiring soon");
    assert_eq!(subs[0].days_until_expiration, Some(-10));
}

#[tokio::test]
async fn test_status_query_failure_degrades_to_no_renewal_info() {
    let store = Arc::new(MockStoreService::new());
    store.seed_entitlements([verified(subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        Utc::now(),
        Duration::days(30),
    ))]);
    store.seed_subscription_status(
        "group.pro",
        Err(PurchaseError::from_code(ErrorCode::NetworkError)),
    );

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    assert_eq!(subs.len(), 1, "status failure must not fail the whole call");
    assert!(subs[0].is_active);
    assert!(subs[0].renewal_info.is_none());
}

#[tokio::test]
async fn test_pending_upgrade_surfaces_in_renewal_info() {
    let store = Arc::new(MockStoreService::new());
    store.seed_entitlements([verified(subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        Utc::now(),
        Duration::days(30),
    ))]);
    let mut record = status_record("com.example.pro.monthly", true);
    record.auto_renew_preference = Some("com.example.pro.yearly".into());
    record.price_increase_status = Some(PriceIncreaseStatus::Pending);
    store.seed_subscription_status("group.pro", Ok(vec![record]));

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    let info = subs[0].renewal_info.as_ref().unwrap();
    assert_eq!(
        info.auto_renew_preference.as_deref(),
        Some("com.example.pro.yearly")
    );
    assert_eq!(info.price_increase_status, Some(PriceIncreaseStatus::Pending));
}

#[tokio::test]
async fn test_filters_by_product_ids() {
    let store = Arc::new(MockStoreService::new());
    store.seed_entitlements([
        verified(subscription_transaction(
            "txn.1",
            "com.example.pro.monthly",
            "group.pro",
            Utc::now(),
            Duration::days(30),
        )),
        verified(subscription_transaction(
            "txn.2",
            "com.example.news.monthly",
            "group.news",
            Utc::now(),
            Duration::days(30),
        )),
    ]);

    let filter = vec!["com.example.news.monthly".to_string()];
    let subs = resolver(store)
        .get_active_subscriptions(Some(&filter))
        .await
        .unwrap();

    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].product_id, "com.example.news.monthly");
}

#[tokio::test]
async fn test_skips_unverified_revoked_and_one_time_entitlements() {
    let store = Arc::new(MockStoreService::new());
    let mut revoked = subscription_transaction(
        "txn.revoked",
        "com.example.pro.monthly",
        "group.pro",
        Utc::now(),
        Duration::days(30),
    );
    revoked.revocation_date = Some(Utc::now());
    store.seed_entitlements([
        unverified(
            subscription_transaction(
                "txn.bad",
                "com.example.pro.monthly",
                "group.pro",
                Utc::now(),
                Duration::days(30),
            ),
            "signature mismatch",
        ),
        verified(revoked),
        // One-time product, not a subscription view candidate.
        verified(transaction("txn.consumable", "com.example.coins")),
    ]);

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    assert!(subs.is_empty());
}

#[tokio::test]
async fn test_no_expiration_data_reads_as_active() {
    let store = Arc::new(MockStoreService::new());
    let mut tx = subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        Utc::now(),
        Duration::days(30),
    );
    tx.expiration_date = None;
    store.seed_entitlements([verified(tx)]);

    let subs = resolver(store)
        .get_active_subscriptions(None)
        .await
        .unwrap();

    assert!(subs[0].is_active);
    assert!(!subs[0].will_expire_soon);
    assert_eq!(subs[0].days_until_expiration, None);
}

#[tokio::test]
async fn test_has_active_subscriptions() {
    let store = Arc::new(MockStoreService::new());
    let purchased = Utc::now() - Duration::days(40);
    store.seed_entitlements([verified(subscription_transaction(
        "txn.1",
        "com.example.pro.monthly",
        "group.pro",
        purchased,
        Duration::days(30),
    ))]);

    let resolver = resolver(store);
    assert!(!resolver.has_active_subscriptions(None).await.unwrap());

    let other = Arc::new(MockStoreService::new());
    other.seed_entitlements([verified(subscription_transaction(
        "txn.2",
        "com.example.pro.monthly",
        "group.pro",
        Utc::now(),
        Duration::days(30),
    ))]);
    let resolver = SubscriptionStateResolver::new(other, EngineConfig::default());
    assert!(resolver.has_active_subscriptions(None).await.unwrap());
}
