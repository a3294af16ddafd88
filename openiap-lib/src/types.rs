//! Normalized product and purchase model.
//!
//! Everything here crosses the host boundary, so field names are part of the
//! cross-platform OpenIAP contract: camelCase keys, platform-specific payloads
//! carried as a tagged union flattened into the parent map.

use crate::store::StoreTransaction;
use serde::{Deserialize, Serialize};

/// Classification of a store product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    Consumable,
    NonConsumable,
    AutoRenewableSubscription,
    NonRenewingSubscription,
}

impl ProductKind {
    /// Whether this product renews on its own.
    pub fn is_auto_renewable(self) -> bool {
        matches!(self, Self::AutoRenewableSubscription)
    }
}

/// Platform-specific product payload.
///
/// The variant tag is serialized under the fixed `platform` key so hosts can
/// match the shape exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum ProductExtras {
    #[serde(rename_all = "camelCase")]
    Ios {
        #[serde(skip_serializing_if = "Option::is_none")]
        subscription_group_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subscription_period: Option<String>,
        is_family_shareable: bool,
    },
    #[serde(rename_all = "camelCase")]
    Android {
        #[serde(skip_serializing_if = "Option::is_none")]
        base_plan_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        offer_token: Option<String>,
    },
}

/// A store product, normalized across platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Store product identifier (SKU).
    pub id: String,
    pub title: String,
    pub description: String,
    /// Localized price string as the store renders it.
    pub display_price: String,
    /// ISO currency code.
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    #[serde(flatten)]
    pub extras: ProductExtras,
}

/// Lifecycle state of a purchase as surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    Purchased,
    Pending,
    Restored,
    Deferred,
    Failed,
    Unknown,
}

/// Platform-specific purchase payload, flattened into the purchase map under
/// the fixed `platform` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PurchaseExtras {
    #[serde(rename_all = "camelCase")]
    Ios {
        #[serde(skip_serializing_if = "Option::is_none")]
        original_transaction_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subscription_group_id: Option<String>,
        /// Epoch milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        expiration_date: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        app_account_token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Android {
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        package_name: Option<String>,
        is_acknowledged: bool,
    },
}

/// A normalized purchase: an immutable snapshot of one platform transaction.
///
/// Never mutated after creation; renewals and upgrades arrive as new
/// transactions with their own ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    /// Platform transaction id.
    pub id: String,
    pub product_id: String,
    /// Epoch milliseconds.
    pub transaction_date: i64,
    pub purchase_state: PurchaseState,
    pub is_auto_renewing: bool,
    pub quantity: u32,
    /// Opaque verification token for server-side validation. The engine never
    /// interprets it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_token: Option<String>,
    #[serde(flatten)]
    pub extras: PurchaseExtras,
}

impl Purchase {
    /// Normalize a verified platform transaction into a purchase snapshot.
    pub fn from_transaction(tx: &StoreTransaction) -> Self {
        let state = if tx.revocation_date.is_some() {
            // Revoked records are filtered before normalization; this is the
            // honest state if one is converted anyway.
            PurchaseState::Failed
        } else {
            PurchaseState::Purchased
        };
        Self {
            id: tx.id.clone(),
            product_id: tx.product_id.clone(),
            transaction_date: tx.purchase_date.timestamp_millis(),
            purchase_state: state,
            is_auto_renewing: tx.is_auto_renewable,
            quantity: tx.quantity,
            purchase_token: Some(tx.verification_token.clone()),
            extras: PurchaseExtras::Ios {
                original_transaction_id: tx.original_transaction_id.clone(),
                subscription_group_id: tx.subscription_group_id.clone(),
                expiration_date: tx.expiration_date.map(|d| d.timestamp_millis()),
                app_account_token: tx.app_account_token.clone(),
            },
        }
    }
}
