//! # OpenIAP Subscriptions
//!
//! Subscription-state resolution on top of the store boundary: active
//! subscription views, renewal metadata and expiry arithmetic.
//!
//! The resolver never caches; every query re-reads current entitlements so
//! the view tracks renewals and upgrades the background listener may have
//! observed in the meantime.

pub mod resolver;
pub mod subscription;

pub use resolver::SubscriptionStateResolver;
pub use subscription::{ActiveSubscription, RenewalInfo};

pub use openiap_lib::Result;
