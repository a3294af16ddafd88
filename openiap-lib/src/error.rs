//! Error taxonomy for OpenIAP operations.
//!
//! The error codes here are string constants shared with the other platform
//! implementations of the OpenIAP contract. They travel across the host
//! boundary verbatim, so renaming a code is a breaking protocol change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Canonical error codes for the cross-platform purchase contract.
///
/// The serialized (kebab-case) form of each variant is the wire constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Unclassified failure.
    Unknown,
    /// The user dismissed the purchase flow.
    UserCancelled,
    /// The user did something invalid (bad account state, parental controls).
    UserError,
    /// The purchase is awaiting external approval (Ask to Buy, SCA).
    DeferredPayment,
    /// The purchase flow was interrupted before completing.
    InterruptedPurchase,
    /// The requested SKU is unknown to the store.
    SkuNotFound,
    /// The promotional offer does not apply to the requested SKU.
    SkuOfferMismatch,
    /// The product exists but cannot currently be bought.
    ItemUnavailable,
    /// The product is already owned.
    AlreadyOwned,
    /// An operation referenced a product the user does not own.
    ItemNotOwned,
    /// Network-level failure reaching the store.
    NetworkError,
    /// Generic store service failure.
    ServiceError,
    /// Remote backend failure reported by the store.
    RemoteError,
    /// The store connection was closed mid-operation.
    ConnectionClosed,
    /// Entitlement sync with the store failed.
    SyncError,
    /// The connection has not been initialized (or initialization failed).
    InitConnection,
    /// The store service disconnected.
    ServiceDisconnected,
    /// In-app purchasing is not available on this device.
    IapNotAvailable,
    /// The transaction failed verification.
    TransactionValidationFailed,
    /// The receipt could not be produced or read.
    ReceiptFailed,
    /// Caller-side configuration bug (malformed offer, bad parameters).
    DeveloperError,
    /// A product query was issued with an empty SKU list.
    EmptySkuList,
    /// The platform does not support the requested capability.
    FeatureNotSupported,
    /// Generic purchase failure.
    PurchaseError,
    /// The billing service is unavailable.
    BillingUnavailable,
}

impl ErrorCode {
    /// The stable wire constant for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::UserCancelled => "user-cancelled",
            Self::UserError => "user-error",
            Self::DeferredPayment => "deferred-payment",
            Self::InterruptedPurchase => "interrupted-purchase",
            Self::SkuNotFound => "sku-not-found",
            Self::SkuOfferMismatch => "sku-offer-mismatch",
            Self::ItemUnavailable => "item-unavailable",
            Self::AlreadyOwned => "already-owned",
            Self::ItemNotOwned => "item-not-owned",
            Self::NetworkError => "network-error",
            Self::ServiceError => "service-error",
            Self::RemoteError => "remote-error",
            Self::ConnectionClosed => "connection-closed",
            Self::SyncError => "sync-error",
            Self::InitConnection => "init-connection",
            Self::ServiceDisconnected => "service-disconnected",
            Self::IapNotAvailable => "iap-not-available",
            Self::TransactionValidationFailed => "transaction-validation-failed",
            Self::ReceiptFailed => "receipt-failed",
            Self::DeveloperError => "developer-error",
            Self::EmptySkuList => "empty-sku-list",
            Self::FeatureNotSupported => "feature-not-supported",
            Self::PurchaseError => "purchase-error",
            Self::BillingUnavailable => "billing-unavailable",
        }
    }

    /// Default human-readable message for this code.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Unknown => "an unknown error occurred",
            Self::UserCancelled => "the user cancelled the purchase",
            Self::UserError => "the purchase was rejected due to the user's account state",
            Self::DeferredPayment => "the purchase is pending external approval",
            Self::InterruptedPurchase => "the purchase flow was interrupted",
            Self::SkuNotFound => "the requested product could not be found",
            Self::SkuOfferMismatch => "the promotional offer does not apply to this product",
            Self::ItemUnavailable => "the product is not available for purchase",
            Self::AlreadyOwned => "the product is already owned",
            Self::ItemNotOwned => "the product is not owned",
            Self::NetworkError => "a network error occurred while contacting the store",
            Self::ServiceError => "the store service reported an error",
            Self::RemoteError => "the store backend reported an error",
            Self::ConnectionClosed => "the store connection was closed",
            Self::SyncError => "entitlement sync with the store failed",
            Self::InitConnection => "the store connection is not initialized",
            Self::ServiceDisconnected => "the store service disconnected",
            Self::IapNotAvailable => "in-app purchasing is not available on this device",
            Self::TransactionValidationFailed => "the transaction failed verification",
            Self::ReceiptFailed => "the purchase receipt could not be processed",
            Self::DeveloperError => "invalid purchase configuration",
            Self::EmptySkuList => "no SKUs were provided",
            Self::FeatureNotSupported => "this feature is not supported on this platform",
            Self::PurchaseError => "the purchase failed",
            Self::BillingUnavailable => "the billing service is unavailable",
        }
    }

    /// Returns true if this error class is potentially recoverable by retrying.
    ///
    /// Only transient network/service categories qualify. User decisions,
    /// configuration bugs and validation failures never do.
    pub fn can_retry(self) -> bool {
        matches!(
            self,
            Self::NetworkError
                | Self::ServiceError
                | Self::RemoteError
                | Self::ConnectionClosed
                | Self::SyncError
                | Self::InitConnection
                | Self::ServiceDisconnected
        )
    }

    /// Suggested backoff before retry number `attempt`, if the code is
    /// retryable at all.
    ///
    /// Network and sync failures back off exponentially, generic service
    /// failures linearly, remote backend failures at a fixed interval.
    /// Connection-lifecycle failures back off exponentially too; callers
    /// should reconnect before retrying those.
    pub fn retry_delay(self, attempt: u32) -> Option<Duration> {
        // Cap the exponent so pathological attempt counts stay finite.
        let attempt = attempt.min(16);
        let secs = match self {
            Self::NetworkError | Self::SyncError => 2u64.saturating_pow(attempt),
            Self::ServiceError => u64::from(attempt) * 5,
            Self::RemoteError => 10,
            Self::ConnectionClosed | Self::InitConnection | Self::ServiceDisconnected => {
                2u64.saturating_pow(attempt)
            }
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error shape crossing the host boundary.
///
/// Every failure in the engine is represented this way, both when raised to
/// the immediate caller and when broadcast on the error channel. The two
/// copies always carry identical code, message and product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseError {
    /// Stable cross-platform code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// The SKU the failure relates to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl PurchaseError {
    /// Create an error with an explicit message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            product_id: None,
        }
    }

    /// Create an error carrying the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Attach the SKU this error relates to.
    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// The user dismissed the purchase flow.
    pub fn user_cancelled(product_id: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::UserCancelled).with_product(product_id)
    }

    /// Unknown SKU.
    pub fn sku_not_found(sku: impl Into<String>) -> Self {
        let sku = sku.into();
        Self::new(
            ErrorCode::SkuNotFound,
            format!("product not found: {}", sku),
        )
        .with_product(sku)
    }

    /// Caller-side configuration bug.
    pub fn developer(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeveloperError, message)
    }

    /// Transaction verification failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionValidationFailed, message)
    }

    /// Whether the failure is worth retrying.
    pub fn can_retry(&self) -> bool {
        self.code.can_retry()
    }

    /// Suggested backoff before retry number `attempt`.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        self.code.retry_delay(attempt)
    }
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.product_id {
            Some(sku) => write!(f, "[{}] {} ({})", self.code, self.message, sku),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for PurchaseError {}

impl From<serde_json::Error> for PurchaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::DeveloperError, err.to_string())
    }
}
