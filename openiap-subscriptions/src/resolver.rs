//! Subscription-state resolution.
//!
//! Derives active/expiring/pending-upgrade views from current entitlements
//! and the per-group renewal status query. Every call recomputes from the
//! store; nothing here is cached.

use crate::subscription::{ActiveSubscription, RenewalInfo};
use chrono::{DateTime, Utc};
use openiap_lib::{EngineConfig, Result, StoreService, StoreTransaction};
use std::sync::Arc;

/// Resolves subscription state on demand.
pub struct SubscriptionStateResolver {
    store: Arc<dyn StoreService>,
    config: EngineConfig,
}

impl SubscriptionStateResolver {
    pub fn new(store: Arc<dyn StoreService>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Active-subscription views for the current entitlements, optionally
    /// filtered to a SKU set.
    ///
    /// Unverified or revoked entitlements are skipped with a warning; a
    /// failing per-group status query degrades that entry to
    /// `renewal_info: None` instead of failing the whole call.
    pub async fn get_active_subscriptions(
        &self,
        product_ids: Option<&[String]>,
    ) -> Result<Vec<ActiveSubscription>> {
        let now = Utc::now();
        let entitlements = self.store.current_entitlements().await?;

        let mut subscriptions = Vec::new();
        for update in entitlements {
            if !update.verification.is_verified() {
                tracing::warn!(
                    "skipping unverified entitlement for {}",
                    update.transaction.product_id
                );
                continue;
            }
            let tx = update.transaction;
            if tx.is_revoked() || !tx.is_auto_renewable {
                continue;
            }
            if let Some(filter) = product_ids {
                if !filter.iter().any(|sku| sku == &tx.product_id) {
                    continue;
                }
            }
            subscriptions.push(self.resolve_one(&tx, now).await);
        }
        Ok(subscriptions)
    }

    /// Whether any subscription in the (optionally filtered) set is active.
    pub async fn has_active_subscriptions(&self, product_ids: Option<&[String]>) -> Result<bool> {
        let subscriptions = self.get_active_subscriptions(product_ids).await?;
        Ok(subscriptions.iter().any(|sub| sub.is_active))
    }

    async fn resolve_one(&self, tx: &StoreTransaction, now: DateTime<Utc>) -> ActiveSubscription {
        // No expiration data reads as active: the store vouched for the
        // entitlement but gave us nothing to age it against.
        let is_active = tx.expiration_date.map_or(true, |exp| exp > now);
        let days_until_expiration = tx
            .expiration_date
            .map(|exp| round_days(exp.signed_duration_since(now)));
        let will_expire_soon = match tx.expiration_date {
            Some(exp) => {
                let horizon = chrono::Duration::from_std(self.config.expiring_soon)
                    .unwrap_or_else(|_| chrono::Duration::days(7));
                is_active && exp.signed_duration_since(now) < horizon
            }
            None => false,
        };

        let renewal_info = match &tx.subscription_group_id {
            Some(group) => self.fetch_renewal_info(group, &tx.product_id).await,
            None => None,
        };

        ActiveSubscription {
            product_id: tx.product_id.clone(),
            is_active,
            expiration_date: tx.expiration_date.map(|exp| exp.timestamp_millis()),
            renewal_info,
            will_expire_soon,
            days_until_expiration,
        }
    }

    async fn fetch_renewal_info(&self, group_id: &str, sku: &str) -> Option<RenewalInfo> {
        match self.store.subscription_status(group_id).await {
            Ok(records) => records
                .into_iter()
                .find(|record| record.product_id == sku)
                .map(|record| RenewalInfo {
                    will_auto_renew: record.will_auto_renew,
                    auto_renew_preference: record.auto_renew_preference,
                    grace_period_expiration: record
                        .grace_period_expiration
                        .map(|d| d.timestamp_millis()),
                    price_increase_status: record.price_increase_status,
                }),
            Err(err) => {
                tracing::warn!(
                    "subscription status query failed for group {}: {}",
                    group_id,
                    err
                );
                None
            }
        }
    }
}

/// Round a duration to whole days, so "expires in 2 days 23:59:59" reads as
/// 3 days the way the store UI presents it.
fn round_days(duration: chrono::Duration) -> i64 {
    (duration.num_seconds() as f64 / 86_400.0).round() as i64
}
