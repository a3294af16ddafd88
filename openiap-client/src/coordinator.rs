//! Purchase-request orchestration.
//!
//! Resolves the product, validates promotional-offer parameters strictly
//! before any platform call, invokes the store purchase entry point and
//! reconciles the outcome with the background listener through the session
//! monitor, so the same transaction id is only ever surfaced once no matter
//! which path observed it first.

use crate::offer;
use crate::state::{Admission, SessionMonitor};
use openiap_lib::{
    ErrorCode, EventBus, Product, ProductCache, PromotionalOffer, Purchase, PurchaseCallOutcome,
    PurchaseError, PurchaseOptions, Result, StoreService, Verification,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Host-facing purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPurchaseProps {
    pub sku: String,
    /// Defaults to 1; clamped to at least 1 at call time.
    pub quantity: u32,
    /// Correlation token forwarded opaquely to the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotional_offer: Option<PromotionalOffer>,
    /// Finish the transaction with the store immediately on success instead
    /// of leaving it pending for an explicit finish call.
    pub auto_finish: bool,
}

impl RequestPurchaseProps {
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            quantity: 1,
            app_account_token: None,
            promotional_offer: None,
            auto_finish: false,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_app_account_token(mut self, token: impl Into<String>) -> Self {
        self.app_account_token = Some(token.into());
        self
    }

    pub fn with_offer(mut self, offer: PromotionalOffer) -> Self {
        self.promotional_offer = Some(offer);
        self
    }

    pub fn with_auto_finish(mut self, auto_finish: bool) -> Self {
        self.auto_finish = auto_finish;
        self
    }
}

/// Orchestrates one purchase call against the store.
pub struct PurchaseRequestCoordinator {
    store: Arc<dyn StoreService>,
    cache: Arc<ProductCache>,
    monitor: Arc<SessionMonitor>,
    events: EventBus,
}

impl PurchaseRequestCoordinator {
    pub fn new(
        store: Arc<dyn StoreService>,
        cache: Arc<ProductCache>,
        monitor: Arc<SessionMonitor>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            cache,
            monitor,
            events,
        }
    }

    /// Run a purchase request to a terminal outcome.
    ///
    /// Every failure is both returned and broadcast on the error channel with
    /// an identical payload. A successful purchase emits purchase-updated at
    /// most once, even if the background listener saw the transaction first.
    pub async fn request_purchase(&self, props: RequestPurchaseProps) -> Result<Purchase> {
        let sku = props.sku.clone();
        if sku.is_empty() {
            return self.reject(PurchaseError::developer("sku must not be empty"));
        }

        if !self.monitor.begin_purchase(&sku).await {
            return self.reject(
                PurchaseError::new(
                    ErrorCode::PurchaseError,
                    format!("a purchase for {} is already in progress", sku),
                )
                .with_product(sku),
            );
        }

        let result = self.run(props).await;
        // The marker clears on every terminal outcome, including cancellation.
        self.monitor.end_purchase(&sku).await;

        match result {
            Ok(purchase) => Ok(purchase),
            Err(err) => self.reject(err),
        }
    }

    fn reject(&self, err: PurchaseError) -> Result<Purchase> {
        self.events.emit_purchase_error(&err);
        Err(err)
    }

    async fn run(&self, props: RequestPurchaseProps) -> Result<Purchase> {
        let product = self.resolve_product(&props.sku).await?;

        // Offer parameters are checked before the store is ever contacted; a
        // malformed offer is a configuration bug, not a purchase failure.
        if let Some(offer) = &props.promotional_offer {
            offer::validate(offer).map_err(|err| err.with_product(&props.sku))?;
        }

        let options = PurchaseOptions {
            sku: props.sku.clone(),
            quantity: props.quantity.max(1),
            app_account_token: props.app_account_token.clone(),
            offer: props.promotional_offer.clone(),
        };

        let outcome = match self.store.purchase(&options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = if props.promotional_offer.is_some() {
                    offer::elaborate_failure(err)
                } else {
                    err
                };
                return Err(err.with_product(&props.sku));
            }
        };

        match outcome {
            PurchaseCallOutcome::Success {
                transaction,
                verification,
            } => {
                if let Verification::Unverified { reason } = verification {
                    // Fail closed: an unverified record is never a completed
                    // purchase.
                    return Err(PurchaseError::validation(format!(
                        "purchase result failed verification: {}",
                        reason
                    ))
                    .with_product(&props.sku));
                }

                let purchase = Purchase::from_transaction(&transaction);
                match self.monitor.admit(&transaction, Instant::now()).await {
                    Admission::Accepted => self.events.emit_purchase_updated(&purchase),
                    Admission::Duplicate => {
                        tracing::debug!(
                            "transaction {} already surfaced by the listener",
                            transaction.id
                        );
                    }
                    Admission::Superseded => {
                        tracing::debug!(
                            "transaction {} superseded within its subscription group",
                            transaction.id
                        );
                    }
                }

                if props.auto_finish {
                    self.store.finish_transaction(&transaction.id).await?;
                    self.monitor.remove_pending(&transaction.id).await;
                }
                Ok(purchase)
            }
            PurchaseCallOutcome::UserCancelled => {
                Err(PurchaseError::user_cancelled(&product.id))
            }
            PurchaseCallOutcome::Pending => {
                // A valid terminal state for the caller, not a retry
                // candidate.
                Err(PurchaseError::from_code(ErrorCode::DeferredPayment).with_product(&product.id))
            }
            PurchaseCallOutcome::Unrecognized => {
                Err(PurchaseError::from_code(ErrorCode::Unknown).with_product(&product.id))
            }
        }
    }

    async fn resolve_product(&self, sku: &str) -> Result<Product> {
        if let Some(product) = self.cache.get(sku) {
            return Ok(product);
        }
        let fetched = self.store.fetch_products(&[sku.to_owned()]).await?;
        self.cache.store_many(fetched.clone());
        fetched
            .into_iter()
            .find(|product| product.id == sku)
            .ok_or_else(|| PurchaseError::sku_not_found(sku))
    }
}
