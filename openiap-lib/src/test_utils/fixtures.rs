//! Fixtures and data generators for store records.

use crate::store::{StoreTransaction, TransactionUpdate, Verification};
use crate::types::{Product, ProductExtras, ProductKind};
use chrono::{DateTime, Duration, Utc};

/// A consumable product for the given SKU.
pub fn product(sku: &str) -> Product {
    Product {
        id: sku.into(),
        title: format!("Product {}", sku),
        description: format!("Description for {}", sku),
        display_price: "$0.99".into(),
        currency: "USD".into(),
        kind: ProductKind::Consumable,
        extras: ProductExtras::Ios {
            subscription_group_id: None,
            subscription_period: None,
            is_family_shareable: false,
        },
    }
}

/// An auto-renewable subscription product in the given group.
pub fn subscription_product(sku: &str, group: &str) -> Product {
    Product {
        id: sku.into(),
        title: format!("Subscription {}", sku),
        description: format!("Description for {}", sku),
        display_price: "$4.99".into(),
        currency: "USD".into(),
        kind: ProductKind::AutoRenewableSubscription,
        extras: ProductExtras::Ios {
            subscription_group_id: Some(group.into()),
            subscription_period: Some("P1M".into()),
            is_family_shareable: false,
        },
    }
}

/// A plain one-time transaction dated now.
pub fn transaction(id: &str, sku: &str) -> StoreTransaction {
    StoreTransaction {
        id: id.into(),
        product_id: sku.into(),
        purchase_date: Utc::now(),
        quantity: 1,
        revocation_date: None,
        expiration_date: None,
        subscription_group_id: None,
        original_transaction_id: None,
        app_account_token: None,
        is_auto_renewable: false,
        verification_token: format!("jws.{}", id),
    }
}

/// A subscription transaction in a group, purchased at `purchased` and
/// expiring `lifetime` later.
pub fn subscription_transaction(
    id: &str,
    sku: &str,
    group: &str,
    purchased: DateTime<Utc>,
    lifetime: Duration,
) -> StoreTransaction {
    StoreTransaction {
        id: id.into(),
        product_id: sku.into(),
        purchase_date: purchased,
        quantity: 1,
        revocation_date: None,
        expiration_date: Some(purchased + lifetime),
        subscription_group_id: Some(group.into()),
        original_transaction_id: Some(id.into()),
        app_account_token: None,
        is_auto_renewable: true,
        verification_token: format!("jws.{}", id),
    }
}

/// Wrap a transaction as a verified feed element.
pub fn verified(tx: StoreTransaction) -> TransactionUpdate {
    TransactionUpdate {
        transaction: tx,
        verification: Verification::Verified,
    }
}

/// Wrap a transaction as a feed element that failed verification.
pub fn unverified(tx: StoreTransaction, reason: &str) -> TransactionUpdate {
    TransactionUpdate {
        transaction: tx,
        verification: Verification::Unverified {
            reason: reason.into(),
        },
    }
}
