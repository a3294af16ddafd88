//! OpenIAP core library.
//!
//! Normalizes a platform's native purchasing capability into the stable
//! cross-platform OpenIAP purchase model. This crate holds the pieces every
//! other workspace crate builds on:
//!
//! - **Purchase model**: normalized [`Product`] and [`Purchase`] snapshots
//!   with platform payloads as tagged unions
//! - **Error taxonomy**: the closed [`ErrorCode`] vocabulary shared with the
//!   other platform implementations, plus the retry policy
//! - **Event bus**: the purchase-updated / purchase-error / promoted-product
//!   listener channels
//! - **Store boundary**: the [`StoreService`] trait the reconciliation engine
//!   consumes, mockable for tests
//!
//! The crate stays stateless beyond its caches; hosts construct and inject
//! instances rather than sharing globals.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod store;
pub mod types;

/// Test utilities for store-facing crates.
///
/// Only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::ProductCache;
pub use config::EngineConfig;
pub use error::{ErrorCode, PurchaseError};
pub use events::{
    ErrorListener, EventBus, EventChannel, ListenerGuard, ListenerHandle,
    PromotedProductListener, PurchaseListener,
};
pub use store::{
    PriceIncreaseStatus, PromotionalOffer, PurchaseCallOutcome, PurchaseOptions, RefundStatus,
    StoreCapabilities, StoreService, StoreTransaction, SubscriptionPhase,
    SubscriptionStatusRecord, TransactionUpdate, Verification,
};
pub use types::{Product, ProductExtras, ProductKind, Purchase, PurchaseExtras, PurchaseState};

/// Common result alias for OpenIAP operations.
pub type Result<T> = std::result::Result<T, PurchaseError>;
