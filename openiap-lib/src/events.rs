//! Purchase event channels.
//!
//! Three independent listener channels: purchase-updated, purchase-error and
//! promoted-product. Registration returns an opaque handle; removal is
//! idempotent and is the single code path whether called explicitly or via a
//! [`ListenerGuard`] going out of scope.
//!
//! # Thread Safety
//!
//! Listener registries use `RwLock` and recover from poisoning. Emission
//! snapshots the listener list first, so a listener registered mid-dispatch
//! does not receive the in-flight event, and every internal producer delivers
//! on the emitting task's context.

use crate::error::PurchaseError;
use crate::types::{Product, Purchase};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Callback receiving normalized purchases.
pub type PurchaseListener = Arc<dyn Fn(&Purchase) + Send + Sync>;
/// Callback receiving broadcast purchase errors.
pub type ErrorListener = Arc<dyn Fn(&PurchaseError) + Send + Sync>;
/// Callback receiving store-initiated (promoted) products.
pub type PromotedProductListener = Arc<dyn Fn(&Product) + Send + Sync>;

/// Which channel a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    PurchaseUpdated,
    PurchaseError,
    PromotedProduct,
}

/// Opaque subscription handle returned by the register functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: u64,
    channel: EventChannel,
}

impl ListenerHandle {
    /// The channel this handle was registered on.
    pub fn channel(&self) -> EventChannel {
        self.channel
    }
}

struct Registries {
    purchase: RwLock<HashMap<u64, PurchaseListener>>,
    error: RwLock<HashMap<u64, ErrorListener>>,
    promoted: RwLock<HashMap<u64, PromotedProductListener>>,
    next_id: AtomicU64,
}

/// The three-channel event bus.
///
/// Cheap to clone; clones share the same registries.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Registries>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registries {
                purchase: RwLock::new(HashMap::new()),
                error: RwLock::new(HashMap::new()),
                promoted: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a purchase-updated listener.
    pub fn add_purchase_listener(&self, listener: PurchaseListener) -> ListenerHandle {
        let id = self.next_id();
        let mut map = self
            .inner
            .purchase
            .write()
            .unwrap_or_else(|e| e.into_inner());
        map.insert(id, listener);
        ListenerHandle {
            id,
            channel: EventChannel::PurchaseUpdated,
        }
    }

    /// Register a purchase-error listener.
    pub fn add_error_listener(&self, listener: ErrorListener) -> ListenerHandle {
        let id = self.next_id();
        let mut map = self.inner.error.write().unwrap_or_else(|e| e.into_inner());
        map.insert(id, listener);
        ListenerHandle {
            id,
            channel: EventChannel::PurchaseError,
        }
    }

    /// Register a promoted-product listener.
    pub fn add_promoted_listener(&self, listener: PromotedProductListener) -> ListenerHandle {
        let id = self.next_id();
        let mut map = self
            .inner
            .promoted
            .write()
            .unwrap_or_else(|e| e.into_inner());
        map.insert(id, listener);
        ListenerHandle {
            id,
            channel: EventChannel::PromotedProduct,
        }
    }

    /// Remove a listener. Idempotent: removing a handle twice, or a handle
    /// whose guard already dropped, is a no-op.
    pub fn remove(&self, handle: ListenerHandle) {
        match handle.channel {
            EventChannel::PurchaseUpdated => {
                let mut map = self
                    .inner
                    .purchase
                    .write()
                    .unwrap_or_else(|e| e.into_inner());
                map.remove(&handle.id);
            }
            EventChannel::PurchaseError => {
                let mut map = self.inner.error.write().unwrap_or_else(|e| e.into_inner());
                map.remove(&handle.id);
            }
            EventChannel::PromotedProduct => {
                let mut map = self
                    .inner
                    .promoted
                    .write()
                    .unwrap_or_else(|e| e.into_inner());
                map.remove(&handle.id);
            }
        }
    }

    /// Wrap a handle so removal happens when the guard drops.
    pub fn guard(&self, handle: ListenerHandle) -> ListenerGuard {
        ListenerGuard {
            bus: self.clone(),
            handle: Some(handle),
        }
    }

    /// Emit a purchase-updated event to a snapshot of current listeners.
    pub fn emit_purchase_updated(&self, purchase: &Purchase) {
        let snapshot: Vec<PurchaseListener> = {
            let map = self
                .inner
                .purchase
                .read()
                .unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for listener in snapshot {
            listener(purchase);
        }
    }

    /// Emit a purchase-error event to a snapshot of current listeners.
    pub fn emit_purchase_error(&self, error: &PurchaseError) {
        let snapshot: Vec<ErrorListener> = {
            let map = self.inner.error.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for listener in snapshot {
            listener(error);
        }
    }

    /// Emit a promoted-product event to a snapshot of current listeners.
    pub fn emit_promoted_product(&self, product: &Product) {
        let snapshot: Vec<PromotedProductListener> = {
            let map = self
                .inner
                .promoted
                .read()
                .unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for listener in snapshot {
            listener(product);
        }
    }

    /// Listener counts per channel, for diagnostics.
    pub fn listener_count(&self, channel: EventChannel) -> usize {
        match channel {
            EventChannel::PurchaseUpdated => self
                .inner
                .purchase
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            EventChannel::PurchaseError => self
                .inner
                .error
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            EventChannel::PromotedProduct => self
                .inner
                .promoted
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped listener registration: removes the wrapped handle on drop.
///
/// Both `release` and drop converge on [`EventBus::remove`], exactly once.
pub struct ListenerGuard {
    bus: EventBus,
    handle: Option<ListenerHandle>,
}

impl ListenerGuard {
    /// Remove the listener now instead of at drop time.
    pub fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            self.bus.remove(handle);
        }
    }

    /// The wrapped handle.
    pub fn handle(&self) -> Option<ListenerHandle> {
        self.handle
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.bus.remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{PurchaseExtras, PurchaseState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_purchase(id: &str) -> Purchase {
        Purchase {
            id: id.into(),
            product_id: "com.example.premium".into(),
            transaction_date: 1,
            purchase_state: PurchaseState::Purchased,
            is_auto_renewing: false,
            quantity: 1,
            purchase_token: None,
            extras: PurchaseExtras::Ios {
                original_transaction_id: None,
                subscription_group_id: None,
                expiration_date: None,
                app_account_token: None,
            },
        }
    }

    #[test]
    fn test_emit_reaches_all_listeners() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.add_purchase_listener(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        bus.emit_purchase_updated(&test_purchase("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let handle = bus.add_purchase_listener(Arc::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.remove(handle);
        bus.remove(handle);
        bus.emit_purchase_updated(&test_purchase("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        {
            let handle = bus.add_error_listener(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }));
            let _guard = bus.guard(handle);
            bus.emit_purchase_error(&PurchaseError::from_code(ErrorCode::Unknown));
        }

        bus.emit_purchase_error(&PurchaseError::from_code(ErrorCode::Unknown));
        assert_eq!(count.load(Ordering::SeqCst), 1, "guard should remove at drop");
        assert_eq!(bus.listener_count(EventChannel::PurchaseError), 0);
    }

    #[test]
    fn test_mid_dispatch_registration_misses_emission() {
        let bus = EventBus::new();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let bus_clone = bus.clone();
        let late_calls_clone = late_calls.clone();
        bus.add_purchase_listener(Arc::new(move |_| {
            // Registering from inside a dispatch must not deliver the
            // in-flight event to the new listener.
            let late_calls = late_calls_clone.clone();
            bus_clone.add_purchase_listener(Arc::new(move |_| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        bus.emit_purchase_updated(&test_purchase("t1"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        bus.emit_purchase_updated(&test_purchase("t2"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channels_are_independent() {
        let bus = EventBus::new();
        let purchases = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let p = purchases.clone();
        bus.add_purchase_listener(Arc::new(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        }));
        let e = errors.clone();
        bus.add_error_listener(Arc::new(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit_purchase_error(&PurchaseError::from_code(ErrorCode::NetworkError));
        assert_eq!(purchases.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
