//! Promotional-offer parameter validation.
//!
//! Offers carry signed discount parameters the host assembled from its
//! server. A malformed parameter is a configuration bug on the caller's side,
//! so validation happens strictly before any platform call and failures carry
//! the developer-error code rather than a retryable purchase failure.

use base64::Engine as _;
use openiap_lib::{PromotionalOffer, PurchaseError, Result};
use uuid::Uuid;

/// Validate every offer parameter the platform will require.
pub(crate) fn validate(offer: &PromotionalOffer) -> Result<()> {
    if offer.offer_id.is_empty() {
        return Err(PurchaseError::developer("promotional offer id is empty"));
    }
    if offer.key_id.is_empty() {
        return Err(PurchaseError::developer("promotional offer key id is empty"));
    }
    if Uuid::parse_str(&offer.nonce).is_err() {
        return Err(PurchaseError::developer(format!(
            "promotional offer nonce is not a valid UUID: {}",
            offer.nonce
        )));
    }
    if base64::engine::general_purpose::STANDARD
        .decode(&offer.signature)
        .is_err()
    {
        return Err(PurchaseError::developer(
            "promotional offer signature is not valid base64",
        ));
    }
    if offer.timestamp <= 0 {
        return Err(PurchaseError::developer(format!(
            "promotional offer timestamp must be a positive integer, got {}",
            offer.timestamp
        )));
    }
    Ok(())
}

/// Wrap a platform-layer failure of an offer purchase with the usual causes.
///
/// The raw store error for a rejected offer is typically opaque, so the
/// message names what is wrong in practice before it reaches the host.
pub(crate) fn elaborate_failure(err: PurchaseError) -> PurchaseError {
    PurchaseError {
        code: err.code,
        message: format!(
            "{} (promotional offer purchases usually fail because the offer \
             signature is invalid, the nonce or signature use the wrong \
             encoding, or a sandbox subscription has not expired yet)",
            err.message
        ),
        product_id: err.product_id,
    }
}
