//! The host-facing store engine instance.
//!
//! One explicitly constructed [`IapClient`] per host; tests build isolated
//! instances with their own mock store instead of sharing globals. Every
//! operation that fails both returns the error and broadcasts it on the
//! purchase-error channel with an identical payload.

use crate::connection::ConnectionManager;
use crate::coordinator::{PurchaseRequestCoordinator, RequestPurchaseProps};
use crate::state::SessionMonitor;
use openiap_lib::{
    EngineConfig, ErrorCode, ErrorListener, EventBus, ListenerGuard, ListenerHandle, Product,
    ProductCache, PromotedProductListener, Purchase, PurchaseError, PurchaseListener,
    RefundStatus, Result, StoreService, TransactionUpdate,
};
use openiap_subscriptions::{ActiveSubscription, SubscriptionStateResolver};
use std::sync::Arc;

/// The OpenIAP engine facade.
pub struct IapClient {
    store: Arc<dyn StoreService>,
    events: EventBus,
    cache: Arc<ProductCache>,
    monitor: Arc<SessionMonitor>,
    connection: ConnectionManager,
    coordinator: PurchaseRequestCoordinator,
    resolver: SubscriptionStateResolver,
}

impl IapClient {
    /// Build a client over a store boundary with default tunables.
    pub fn new(store: Arc<dyn StoreService>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn StoreService>, config: EngineConfig) -> Self {
        let events = EventBus::new();
        let cache = Arc::new(ProductCache::new());
        let monitor = Arc::new(SessionMonitor::new(config.dedup_window));
        let connection = ConnectionManager::new(
            Arc::clone(&store),
            Arc::clone(&monitor),
            Arc::clone(&cache),
            events.clone(),
        );
        let coordinator = PurchaseRequestCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&monitor),
            events.clone(),
        );
        let resolver = SubscriptionStateResolver::new(Arc::clone(&store), config);
        Self {
            store,
            events,
            cache,
            monitor,
            connection,
            coordinator,
            resolver,
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a purchase-updated listener.
    pub fn add_purchase_updated_listener(&self, listener: PurchaseListener) -> ListenerHandle {
        self.events.add_purchase_listener(listener)
    }

    /// Register a purchase-error listener.
    pub fn add_purchase_error_listener(&self, listener: ErrorListener) -> ListenerHandle {
        self.events.add_error_listener(listener)
    }

    /// Register a promoted-product listener.
    pub fn add_promoted_product_listener(
        &self,
        listener: PromotedProductListener,
    ) -> ListenerHandle {
        self.events.add_promoted_listener(listener)
    }

    /// Remove a listener; idempotent.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.events.remove(handle)
    }

    /// Wrap a handle so removal happens when the guard drops.
    pub fn listener_guard(&self, handle: ListenerHandle) -> ListenerGuard {
        self.events.guard(handle)
    }

    /// The underlying event bus, for advanced wiring.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    // ------------------------------------------------------------------
    // Products and purchases
    // ------------------------------------------------------------------

    /// Fetch products by SKU list and cache them.
    pub async fn fetch_products(&self, skus: &[String]) -> Result<Vec<Product>> {
        if skus.is_empty() {
            return self.broadcast(Err(PurchaseError::from_code(ErrorCode::EmptySkuList)));
        }
        self.ensure_connected().await?;
        let products = self.broadcast(self.store.fetch_products(skus).await)?;
        self.cache.store_many(products.clone());
        Ok(products)
    }

    /// Run a purchase request to a terminal outcome.
    ///
    /// User cancellation, deferral and unknown outcomes reject with their
    /// respective codes; the coordinator broadcasts those rejections itself.
    pub async fn request_purchase(&self, props: RequestPurchaseProps) -> Result<Purchase> {
        self.ensure_connected().await?;
        self.coordinator.request_purchase(props).await
    }

    /// Finish a transaction by id and drop its pending record.
    ///
    /// Finishing an id with no pending record is not an error.
    pub async fn finish_transaction(&self, transaction_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        self.broadcast(self.store.finish_transaction(transaction_id).await)?;
        self.monitor.remove_pending(transaction_id).await;
        Ok(())
    }

    /// Currently-held entitlements as normalized purchases.
    pub async fn get_available_purchases(&self) -> Result<Vec<Purchase>> {
        self.ensure_connected().await?;
        let updates = self.broadcast(self.store.current_entitlements().await)?;
        Ok(normalize_feed(updates))
    }

    /// Full purchase history as normalized purchases.
    pub async fn get_purchase_histories(&self) -> Result<Vec<Purchase>> {
        self.ensure_connected().await?;
        let updates = self.broadcast(self.store.purchase_history().await)?;
        Ok(normalize_feed(updates))
    }

    /// Sync with the store, then re-read entitlements.
    pub async fn restore_purchases(&self) -> Result<Vec<Purchase>> {
        self.ensure_connected().await?;
        self.broadcast(self.store.sync().await)?;
        self.get_available_purchases().await
    }

    /// Transactions accepted but not yet finished.
    pub async fn get_pending_transactions(&self) -> Vec<Purchase> {
        self.monitor
            .pending_snapshot()
            .await
            .iter()
            .map(|pending| Purchase::from_transaction(&pending.transaction))
            .collect()
    }

    /// Finish every unfinished platform transaction and clear bookkeeping.
    ///
    /// Individual finish failures are logged and skipped; the sweep always
    /// runs to completion.
    pub async fn clear_transactions(&self) -> Result<()> {
        self.ensure_connected().await?;
        let unfinished = self.broadcast(self.store.unfinished_transactions().await)?;
        for update in unfinished {
            let id = update.transaction.id;
            if let Err(err) = self.store.finish_transaction(&id).await {
                tracing::warn!("failed to finish transaction {}: {}", id, err);
            }
        }
        self.monitor.clear_pending().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Promoted products
    // ------------------------------------------------------------------

    /// SKU of the store-initiated purchase intent, when one is staged.
    pub async fn get_promoted_product_id(&self) -> Option<String> {
        self.monitor.promoted_product().await.map(|p| p.id)
    }

    /// Purchase the staged promoted product.
    pub async fn buy_promoted_product(&self) -> Result<Purchase> {
        self.ensure_connected().await?;
        let promoted = match self.monitor.promoted_product().await {
            Some(product) => product,
            None => {
                return self.broadcast(Err(PurchaseError::developer(
                    "no promoted product is staged",
                )));
            }
        };
        self.coordinator
            .request_purchase(RequestPurchaseProps::new(promoted.id))
            .await
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Active-subscription views, optionally filtered to a SKU set.
    pub async fn get_active_subscriptions(
        &self,
        product_ids: Option<&[String]>,
    ) -> Result<Vec<ActiveSubscription>> {
        self.ensure_connected().await?;
        self.broadcast(self.resolver.get_active_subscriptions(product_ids).await)
    }

    /// Whether any subscription in the (optionally filtered) set is active.
    pub async fn has_active_subscriptions(&self, product_ids: Option<&[String]>) -> Result<bool> {
        self.ensure_connected().await?;
        self.broadcast(self.resolver.has_active_subscriptions(product_ids).await)
    }

    // ------------------------------------------------------------------
    // Capability-gated store surfaces
    // ------------------------------------------------------------------

    /// Open the platform refund flow for a SKU.
    pub async fn request_refund(&self, sku: &str) -> Result<RefundStatus> {
        self.ensure_connected().await?;
        self.require_capability(self.store.capabilities().refund_request, "refund request")?;
        self.broadcast(self.store.request_refund(sku).await)
    }

    /// Present the offer-code redemption surface.
    pub async fn present_code_redemption_sheet(&self) -> Result<()> {
        self.ensure_connected().await?;
        self.require_capability(self.store.capabilities().code_redemption, "code redemption")?;
        self.broadcast(self.store.present_code_redemption().await)
    }

    /// Present the manage-subscriptions surface.
    pub async fn show_manage_subscriptions(&self) -> Result<()> {
        self.ensure_connected().await?;
        self.require_capability(
            self.store.capabilities().manage_subscriptions,
            "manage subscriptions",
        )?;
        self.broadcast(self.store.show_manage_subscriptions().await)
    }

    /// Storefront country code.
    pub async fn get_storefront(&self) -> Result<String> {
        self.ensure_connected().await?;
        self.require_capability(self.store.capabilities().storefront, "storefront")?;
        self.broadcast(self.store.storefront_country().await)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn ensure_connected(&self) -> Result<()> {
        if self.monitor.is_initialized().await {
            Ok(())
        } else {
            self.broadcast(Err(PurchaseError::from_code(ErrorCode::InitConnection)))
        }
    }

    fn require_capability(&self, supported: bool, surface: &str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            self.broadcast(Err(PurchaseError::new(
                ErrorCode::FeatureNotSupported,
                format!("{} is not supported on this platform", surface),
            )))
        }
    }

    /// Broadcast the error half of a result on the error channel, unchanged.
    fn broadcast<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.events.emit_purchase_error(err);
        }
        result
    }
}

/// Normalize a batch of feed records, keeping only verified, non-revoked
/// transactions.
fn normalize_feed(updates: Vec<TransactionUpdate>) -> Vec<Purchase> {
    updates
        .into_iter()
        .filter_map(|update| {
            if !update.verification.is_verified() {
                tracing::warn!(
                    "dropping unverified record for {}",
                    update.transaction.product_id
                );
                return None;
            }
            if update.transaction.is_revoked() {
                return None;
            }
            Some(Purchase::from_transaction(&update.transaction))
        })
        .collect()
}
