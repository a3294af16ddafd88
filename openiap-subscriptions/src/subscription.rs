//! Host-facing subscription views.
//!
//! Field names are part of the cross-platform OpenIAP contract; do not rename
//! them.

use openiap_lib::PriceIncreaseStatus;
use serde::{Deserialize, Serialize};

/// Renewal metadata for one subscription, from the per-group status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfo {
    /// Whether the subscription renews at the end of the current period.
    pub will_auto_renew: bool,
    /// SKU the subscription switches to at next renewal, when an upgrade or
    /// crossgrade is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renew_preference: Option<String>,
    /// End of the billing grace period, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_expiration: Option<i64>,
    /// Consent state for a pending price increase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_increase_status: Option<PriceIncreaseStatus>,
}

/// One entry of the active-subscriptions view.
///
/// Recomputed on every query from current entitlements; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    pub product_id: String,
    /// Expiration lies in the future, or the record carries no expiration
    /// data at all.
    pub is_active: bool,
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<i64>,
    /// Absent when the per-group status query failed or returned nothing for
    /// this SKU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<RenewalInfo>,
    /// Still active but inside the expiring-soon horizon.
    pub will_expire_soon: bool,
    /// Whole days until expiry, rounded; negative once expired. Absent when
    /// the record has no expiration data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until_expiration: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_contract() {
        let sub = ActiveSubscription {
            product_id: "com.example.pro.monthly".into(),
            is_active: true,
            expiration_date: Some(1_750_000_000_000),
            renewal_info: Some(RenewalInfo {
                will_auto_renew: true,
                auto_renew_preference: None,
                grace_period_expiration: None,
                price_increase_status: None,
            }),
            will_expire_soon: false,
            days_until_expiration: Some(14),
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["productId"], "com.example.pro.monthly");
        assert_eq!(json["willExpireSoon"], false);
        assert_eq!(json["daysUntilExpiration"], 14);
        assert_eq!(json["renewalInfo"]["willAutoRenew"], true);
        // Absent optionals are omitted, not null.
        assert!(json["renewalInfo"].get("gracePeriodExpiration").is_none());
    }
}
