//! Test utilities for the OpenIAP workspace.
//!
//! Provides fixtures for products and transactions plus a fully scriptable
//! [`MockStoreService`] that the engine and subscription crates drive their
//! integration tests against.

mod fixtures;
mod mock_store;

pub use fixtures::{
    product, subscription_product, subscription_transaction, transaction, unverified,
    verified,
};

pub use mock_store::MockStoreService;
