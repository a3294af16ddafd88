//! The platform store boundary.
//!
//! Everything the engine needs from the native purchasing service is behind
//! [`StoreService`], so tests and alternative platforms swap in their own
//! implementation. The trait is the producer side of the transaction-update
//! feed; the engine owns the consumer.

use crate::types::Product;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Raw platform transaction record as the store hands it over.
///
/// Richer than the normalized [`Purchase`](crate::types::Purchase): it keeps
/// the revocation and expiration data the reconciliation engine filters on.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreTransaction {
    /// Platform transaction id.
    pub id: String,
    /// SKU the transaction is for.
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub quantity: u32,
    /// Set when the store refunded or revoked the transaction.
    pub revocation_date: Option<DateTime<Utc>>,
    /// Subscription expiry, when the product is a subscription.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Subscription group, when the product belongs to one.
    pub subscription_group_id: Option<String>,
    /// Id of the first transaction in a renewal chain.
    pub original_transaction_id: Option<String>,
    /// Correlation token the host attached at purchase time.
    pub app_account_token: Option<String>,
    /// Whether the underlying product auto-renews.
    pub is_auto_renewable: bool,
    /// Opaque signed representation for server-side validation.
    pub verification_token: String,
}

impl StoreTransaction {
    /// True when the store has revoked (refunded) this transaction.
    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }
}

/// Authenticity verdict attached to every record the store pushes.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Verified,
    Unverified { reason: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// One element of the asynchronous transaction-update feed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub transaction: StoreTransaction,
    pub verification: Verification,
}

/// Signed discount grant parameters, exactly as supplied by the host.
///
/// Validated by the purchase coordinator before any platform call; the store
/// receives it only after the nonce parsed as a UUID and the signature as
/// base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalOffer {
    pub offer_id: String,
    pub key_id: String,
    /// Must parse as a UUID.
    pub nonce: String,
    /// Must decode as standard base64.
    pub signature: String,
    /// Epoch milliseconds at which the offer was signed.
    pub timestamp: i64,
}

/// Options for one purchase invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOptions {
    pub sku: String,
    pub quantity: u32,
    /// Correlation token forwarded to the store, opaque to the engine.
    pub app_account_token: Option<String>,
    pub offer: Option<PromotionalOffer>,
}

/// Outcome of a platform purchase call.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseCallOutcome {
    /// The store produced a transaction (verified or not).
    Success {
        transaction: StoreTransaction,
        verification: Verification,
    },
    /// The user dismissed the flow.
    UserCancelled,
    /// The purchase is deferred pending external approval.
    Pending,
    /// The platform returned something this engine does not recognize.
    Unrecognized,
}

/// Outcome of a refund request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Success,
    UserCancelled,
}

/// Renewal phase reported by the per-group status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionPhase {
    Subscribed,
    Expired,
    InBillingRetry,
    InGracePeriod,
    Revoked,
}

/// Price-increase consent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceIncreaseStatus {
    Agreed,
    Pending,
}

/// One member of a subscription group's status response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionStatusRecord {
    pub product_id: String,
    pub phase: SubscriptionPhase,
    pub will_auto_renew: bool,
    /// SKU the subscription switches to at next renewal, when an upgrade or
    /// crossgrade is pending.
    pub auto_renew_preference: Option<String>,
    pub grace_period_expiration: Option<DateTime<Utc>>,
    pub price_increase_status: Option<PriceIncreaseStatus>,
}

/// Which optional store surfaces the platform supports.
///
/// Selected at startup instead of compile-time branching; operations whose
/// capability is absent fail with `feature-not-supported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub promotional_offers: bool,
    pub refund_request: bool,
    pub code_redemption: bool,
    pub manage_subscriptions: bool,
    pub storefront: bool,
}

impl StoreCapabilities {
    /// Everything supported.
    pub fn all() -> Self {
        Self {
            promotional_offers: true,
            refund_request: true,
            code_redemption: true,
            manage_subscriptions: true,
            storefront: true,
        }
    }

    /// Nothing optional supported.
    pub fn none() -> Self {
        Self {
            promotional_offers: false,
            refund_request: false,
            code_redemption: false,
            manage_subscriptions: false,
            storefront: false,
        }
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// The native purchasing service, as seen by the reconciliation engine.
///
/// Implementations are the producer of the transaction-update feed and must
/// be safe to share across tasks. All round-trips are suspending operations;
/// the engine adds no timeout layer of its own.
#[async_trait]
pub trait StoreService: Send + Sync {
    /// Which optional surfaces this platform supports.
    fn capabilities(&self) -> StoreCapabilities;

    /// Whether this device can make payments at all.
    async fn can_make_payments(&self) -> bool;

    /// Look up products by SKU list.
    async fn fetch_products(&self, skus: &[String]) -> Result<Vec<Product>>;

    /// Invoke the platform purchase flow.
    async fn purchase(&self, options: &PurchaseOptions) -> Result<PurchaseCallOutcome>;

    /// The push feed of transaction updates (new purchases, renewals,
    /// upgrades). The receiver can be taken once per connection; dropping the
    /// sender ends the feed.
    fn transaction_updates(&self) -> mpsc::UnboundedReceiver<TransactionUpdate>;

    /// Store-initiated purchase intents (promoted products). Taken once per
    /// service lifetime.
    fn promoted_purchase_intents(&self) -> mpsc::UnboundedReceiver<Product>;

    /// Currently-held entitlements.
    async fn current_entitlements(&self) -> Result<Vec<TransactionUpdate>>;

    /// Full purchase history, newest first.
    async fn purchase_history(&self) -> Result<Vec<TransactionUpdate>>;

    /// Transactions delivered but not yet finished.
    async fn unfinished_transactions(&self) -> Result<Vec<TransactionUpdate>>;

    /// Mark a transaction finished with the store.
    async fn finish_transaction(&self, transaction_id: &str) -> Result<()>;

    /// Per-group subscription status, one record per group member.
    async fn subscription_status(&self, group_id: &str) -> Result<Vec<SubscriptionStatusRecord>>;

    /// Force an entitlement sync with the store.
    async fn sync(&self) -> Result<()>;

    /// Open the platform refund flow for a SKU.
    async fn request_refund(&self, sku: &str) -> Result<RefundStatus>;

    /// Present the offer-code redemption surface.
    async fn present_code_redemption(&self) -> Result<()>;

    /// Present the manage-subscriptions surface.
    async fn show_manage_subscriptions(&self) -> Result<()>;

    /// Storefront country code (ISO 3166-1 alpha-3).
    async fn storefront_country(&self) -> Result<String>;
}
