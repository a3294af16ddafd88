//! Store connection lifecycle.
//!
//! `connect` is single-flight: overlapping callers join the one in-flight
//! attempt instead of starting duplicate work. `disconnect` bumps the session
//! epoch so an in-flight attempt notices and discards its results, then stops
//! the background listener cooperatively.

use crate::listener::TransactionListener;
use crate::state::SessionMonitor;
use openiap_lib::{
    ErrorCode, EventBus, Product, ProductCache, PurchaseError, Result, StoreService,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type ConnectSignal = watch::Receiver<Option<Result<()>>>;

struct ConnectionInner {
    store: Arc<dyn StoreService>,
    monitor: Arc<SessionMonitor>,
    cache: Arc<ProductCache>,
    events: EventBus,
    inflight: Mutex<Option<ConnectSignal>>,
    listener: Mutex<Option<TransactionListener>>,
    promoted_task: Mutex<Option<JoinHandle<()>>>,
    // The store-initiated purchase observer is wired at most once per
    // instance lifetime, even across repeated connects.
    observer_registered: AtomicBool,
}

/// Connect/disconnect lifecycle owner.
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

impl ConnectionManager {
    pub fn new(
        store: Arc<dyn StoreService>,
        monitor: Arc<SessionMonitor>,
        cache: Arc<ProductCache>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                store,
                monitor,
                cache,
                events,
                inflight: Mutex::new(None),
                listener: Mutex::new(None),
                promoted_task: Mutex::new(None),
                observer_registered: AtomicBool::new(false),
            }),
        }
    }

    /// Establish the store connection.
    ///
    /// Idempotent and single-flight: a caller arriving while an attempt is in
    /// flight waits for that attempt's result. A fresh call tears down any
    /// prior listener and cached state first, so repeated connects behave
    /// like a clean process restart.
    pub async fn connect(&self) -> Result<()> {
        let mut rx = {
            let mut inflight = self
                .inner
                .inflight
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match inflight.as_ref() {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *inflight = Some(rx.clone());
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let result = establish(&inner).await;
                        *inner.inflight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        loop {
            let settled = rx.borrow().clone();
            if let Some(result) = settled {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(PurchaseError::new(
                    ErrorCode::InitConnection,
                    "connect attempt was dropped before completing",
                ));
            }
        }
    }

    /// Tear the connection down.
    ///
    /// Cancels an in-flight connect (via the epoch bump), stops the listener
    /// worker cooperatively and clears all session caches. Results of
    /// platform calls still in flight are discarded by their callers once
    /// they notice the reset.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.monitor.bump_epoch().await;
        inner.monitor.set_initialized(false).await;

        let listener = inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.stop().await;
        }

        inner.cache.clear();
        inner.monitor.reset().await;
        tracing::info!("store connection closed");
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(task) = self
            .promoted_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            listener.abort();
        }
    }
}

/// One connect attempt, run by whichever caller opened the single-flight
/// window.
async fn establish(inner: &Arc<ConnectionInner>) -> Result<()> {
    let epoch = inner.monitor.epoch().await;

    // Start fresh: stop any prior worker and drop session state.
    let previous = inner
        .listener
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    if let Some(listener) = previous {
        listener.stop().await;
    }
    inner.cache.clear();
    inner.monitor.reset().await;
    inner.monitor.set_initialized(false).await;

    if !inner.store.can_make_payments().await {
        let err = PurchaseError::from_code(ErrorCode::IapNotAvailable);
        inner.events.emit_purchase_error(&err);
        tracing::warn!("device cannot make payments, staying disconnected");
        return Err(err);
    }

    if inner.monitor.epoch().await != epoch {
        return Err(cancelled());
    }

    let feed = inner.store.transaction_updates();
    let listener =
        TransactionListener::spawn(feed, Arc::clone(&inner.monitor), inner.events.clone());
    *inner.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);

    if !inner.observer_registered.swap(true, Ordering::SeqCst) {
        let intents = inner.store.promoted_purchase_intents();
        let task = spawn_promoted_forwarder(
            intents,
            Arc::clone(&inner.monitor),
            inner.events.clone(),
        );
        *inner
            .promoted_task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    if inner.monitor.epoch().await != epoch {
        let listener = inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.stop().await;
        }
        return Err(cancelled());
    }

    inner.monitor.set_initialized(true).await;
    tracing::info!("store connection initialized");
    Ok(())
}

fn cancelled() -> PurchaseError {
    PurchaseError::new(
        ErrorCode::ConnectionClosed,
        "connection was reset while initializing",
    )
}

/// Forward store-initiated purchase intents to the promoted-product channel.
///
/// Intents arriving while disconnected are dropped; the staged product is
/// only meaningful for a live session.
fn spawn_promoted_forwarder(
    mut intents: mpsc::UnboundedReceiver<Product>,
    monitor: Arc<SessionMonitor>,
    events: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(product) = intents.recv().await {
            if !monitor.is_initialized().await {
                tracing::debug!(
                    "dropping promoted product {} while disconnected",
                    product.id
                );
                continue;
            }
            tracing::debug!("store-initiated purchase intent for {}", product.id);
            monitor.set_promoted_product(product.clone()).await;
            events.emit_promoted_product(&product);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openiap_lib::test_utils::{product, MockStoreService};
    use openiap_lib::EngineConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn manager(store: Arc<MockStoreService>) -> (ConnectionManager, Arc<SessionMonitor>, EventBus) {
        let monitor = Arc::new(SessionMonitor::new(EngineConfig::DEFAULT_DEDUP_WINDOW));
        let cache = Arc::new(ProductCache::new());
        let events = EventBus::new();
        let manager = ConnectionManager::new(store, monitor.clone(), cache, events.clone());
        (manager, monitor, events)
    }

    #[tokio::test]
    async fn test_connect_initializes_session() {
        let store = Arc::new(MockStoreService::new());
        let (manager, monitor, _events) = manager(store);

        manager.connect().await.unwrap();
        assert!(monitor.is_initialized().await);
    }

    #[tokio::test]
    async fn test_connect_unavailable_device_emits_not_available() {
        let store = Arc::new(MockStoreService::new());
        store.set_can_make_payments(false);
        let (manager, monitor, events) = manager(store);

        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = errors.clone();
        events.add_error_listener(Arc::new(move |err| {
            assert_eq!(err.code, ErrorCode::IapNotAvailable);
            errors_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let err = manager.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::IapNotAvailable);
        assert_eq!(errors.load(Ordering::SeqCst), 1, "error is also broadcast");
        assert!(!monitor.is_initialized().await, "state stays disconnected");
    }

    #[tokio::test]
    async fn test_overlapping_connects_share_one_attempt() {
        let store = Arc::new(MockStoreService::new());
        let (manager, monitor, _events) = manager(store);
        let manager = Arc::new(manager);

        let mut joins = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let manager = manager.clone();
            joins.spawn(async move { manager.connect().await });
        }
        while let Some(result) = joins.join_next().await {
            result.unwrap().unwrap();
        }
        assert!(monitor.is_initialized().await);
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let store = Arc::new(MockStoreService::new());
        let (manager, monitor, _events) = manager(store.clone());

        manager.connect().await.unwrap();
        manager.disconnect().await;

        assert!(!monitor.is_initialized().await);
        assert!(monitor.pending_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_restarts_listener() {
        let store = Arc::new(MockStoreService::new());
        let (manager, monitor, _events) = manager(store.clone());

        manager.connect().await.unwrap();
        manager.disconnect().await;
        manager.connect().await.unwrap();

        // The new listener consumes a fresh feed.
        assert!(store.push_update(openiap_lib::test_utils::verified(
            openiap_lib::test_utils::transaction("txn.1", "sku.a"),
        )));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(monitor.pending_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_promoted_intent_forwarded_once_connected() {
        let store = Arc::new(MockStoreService::new());
        let (manager, monitor, events) = manager(store.clone());

        let promoted = Arc::new(AtomicUsize::new(0));
        let promoted_clone = promoted.clone();
        events.add_promoted_listener(Arc::new(move |_| {
            promoted_clone.fetch_add(1, Ordering::SeqCst);
        }));

        manager.connect().await.unwrap();
        assert!(store.push_promoted(product("sku.promoted")));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(promoted.load(Ordering::SeqCst), 1);
        assert_eq!(
            monitor.promoted_product().await.map(|p| p.id),
            Some("sku.promoted".to_string())
        );
    }
}
