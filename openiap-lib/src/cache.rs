//! In-memory product cache.
//!
//! SKU → [`Product`] map shared between the fetch path and the purchase
//! coordinator.
//!
//! # Thread Safety
//!
//! Uses `RwLock` and recovers from poisoning, so a panicking reader elsewhere
//! never wedges the cache.

use crate::types::Product;
use std::collections::HashMap;
use std::sync::RwLock;

/// Concurrency-safe SKU → product map.
pub struct ProductCache {
    products: RwLock<HashMap<String, Product>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a batch of products.
    pub fn store_many(&self, products: impl IntoIterator<Item = Product>) {
        let mut map = self.products.write().unwrap_or_else(|e| e.into_inner());
        for product in products {
            map.insert(product.id.clone(), product);
        }
    }

    /// Look up a product by SKU.
    pub fn get(&self, sku: &str) -> Option<Product> {
        let map = self.products.read().unwrap_or_else(|e| e.into_inner());
        map.get(sku).cloned()
    }

    /// All cached products, in no particular order.
    pub fn all(&self) -> Vec<Product> {
        let map = self.products.read().unwrap_or_else(|e| e.into_inner());
        map.values().cloned().collect()
    }

    /// Remove one SKU. Returns the removed product if it was cached.
    pub fn remove(&self, sku: &str) -> Option<Product> {
        let mut map = self.products.write().unwrap_or_else(|e| e.into_inner());
        map.remove(sku)
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut map = self.products.write().unwrap_or_else(|e| e.into_inner());
        map.clear();
    }

    pub fn contains(&self, sku: &str) -> bool {
        let map = self.products.read().unwrap_or_else(|e| e.into_inner());
        map.contains_key(sku)
    }

    pub fn len(&self) -> usize {
        let map = self.products.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProductCache {
    fn default() -> Self {
        Self::new()
    }
}
