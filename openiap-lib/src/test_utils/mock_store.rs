//! Scriptable mock store for engine tests.

use crate::error::{ErrorCode, PurchaseError};
use crate::Result;
use crate::store::{
    PurchaseCallOutcome, PurchaseOptions, RefundStatus, StoreCapabilities, StoreService,
    SubscriptionStatusRecord, TransactionUpdate,
};
use crate::types::Product;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-memory [`StoreService`] with scripted behavior.
///
/// Tests seed products, queue purchase outcomes and push transaction updates
/// into the feed; the mock records every purchase and finish call so
/// assertions can check what the engine actually asked the platform to do.
pub struct MockStoreService {
    capabilities: StoreCapabilities,
    can_make_payments: AtomicBool,
    products: Mutex<Vec<Product>>,
    purchase_outcomes: Mutex<VecDeque<Result<PurchaseCallOutcome>>>,
    entitlements: Mutex<Vec<TransactionUpdate>>,
    history: Mutex<Vec<TransactionUpdate>>,
    unfinished: Mutex<Vec<TransactionUpdate>>,
    statuses: Mutex<HashMap<String, Result<Vec<SubscriptionStatusRecord>>>>,
    storefront: Mutex<String>,
    feed_tx: Mutex<Option<mpsc::UnboundedSender<TransactionUpdate>>>,
    promoted_tx: Mutex<Option<mpsc::UnboundedSender<Product>>>,
    purchase_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    finished: Mutex<Vec<String>>,
}

impl MockStoreService {
    pub fn new() -> Self {
        Self {
            capabilities: StoreCapabilities::all(),
            can_make_payments: AtomicBool::new(true),
            products: Mutex::new(Vec::new()),
            purchase_outcomes: Mutex::new(VecDeque::new()),
            entitlements: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            unfinished: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            storefront: Mutex::new("USA".into()),
            feed_tx: Mutex::new(None),
            promoted_tx: Mutex::new(None),
            purchase_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Script whether the device can transact.
    pub fn set_can_make_payments(&self, value: bool) {
        self.can_make_payments.store(value, Ordering::SeqCst);
    }

    /// Seed the product catalog.
    pub fn seed_products(&self, products: impl IntoIterator<Item = Product>) {
        self.products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(products);
    }

    /// Queue the outcome of the next purchase call (FIFO).
    pub fn queue_purchase_outcome(&self, outcome: Result<PurchaseCallOutcome>) {
        self.purchase_outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    pub fn seed_entitlements(&self, updates: impl IntoIterator<Item = TransactionUpdate>) {
        self.entitlements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(updates);
    }

    pub fn seed_history(&self, updates: impl IntoIterator<Item = TransactionUpdate>) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(updates);
    }

    pub fn seed_unfinished(&self, updates: impl IntoIterator<Item = TransactionUpdate>) {
        self.unfinished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(updates);
    }

    /// Script the per-group status response.
    pub fn seed_subscription_status(
        &self,
        group_id: &str,
        response: Result<Vec<SubscriptionStatusRecord>>,
    ) {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(group_id.into(), response);
    }

    /// Push a transaction update into the live feed.
    ///
    /// Returns false when no consumer has taken the feed (or it was dropped).
    pub fn push_update(&self, update: TransactionUpdate) -> bool {
        let tx = self.feed_tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(sender) => sender.send(update).is_ok(),
            None => false,
        }
    }

    /// Push a store-initiated purchase intent.
    pub fn push_promoted(&self, product: Product) -> bool {
        let tx = self.promoted_tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(sender) => sender.send(product).is_ok(),
            None => false,
        }
    }

    /// Number of purchase calls the engine issued.
    pub fn purchase_call_count(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    /// Number of sync calls the engine issued.
    pub fn sync_call_count(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    /// Transaction ids the engine finished, in order.
    pub fn finished_ids(&self) -> Vec<String> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockStoreService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreService for MockStoreService {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    async fn can_make_payments(&self) -> bool {
        self.can_make_payments.load(Ordering::SeqCst)
    }

    async fn fetch_products(&self, skus: &[String]) -> Result<Vec<Product>> {
        let products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        Ok(products
            .iter()
            .filter(|p| skus.iter().any(|sku| sku == &p.id))
            .cloned()
            .collect())
    }

    async fn purchase(&self, options: &PurchaseOptions) -> Result<PurchaseCallOutcome> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .purchase_outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(outcome) => outcome,
            None => Err(PurchaseError::new(
                ErrorCode::ServiceError,
                format!("no scripted outcome for purchase of {}", options.sku),
            )),
        }
    }

    fn transaction_updates(&self) -> mpsc::UnboundedReceiver<TransactionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    fn promoted_purchase_intents(&self) -> mpsc::UnboundedReceiver<Product> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.promoted_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    async fn current_entitlements(&self) -> Result<Vec<TransactionUpdate>> {
        Ok(self
            .entitlements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn purchase_history(&self) -> Result<Vec<TransactionUpdate>> {
        Ok(self
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn unfinished_transactions(&self) -> Result<Vec<TransactionUpdate>> {
        Ok(self
            .unfinished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn finish_transaction(&self, transaction_id: &str) -> Result<()> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(transaction_id.into());
        self.unfinished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|u| u.transaction.id != transaction_id);
        Ok(())
    }

    async fn subscription_status(&self, group_id: &str) -> Result<Vec<SubscriptionStatusRecord>> {
        let statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        match statuses.get(group_id) {
            Some(response) => response.clone(),
            None => Ok(Vec::new()),
        }
    }

    async fn sync(&self) -> Result<()> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_refund(&self, _sku: &str) -> Result<RefundStatus> {
        Ok(RefundStatus::Success)
    }

    async fn present_code_redemption(&self) -> Result<()> {
        Ok(())
    }

    async fn show_manage_subscriptions(&self) -> Result<()> {
        Ok(())
    }

    async fn storefront_country(&self) -> Result<String> {
        Ok(self
            .storefront
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
