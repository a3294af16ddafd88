//! Serialized session state.
//!
//! Every piece of mutable shared state in the engine lives behind one monitor
//! with a single lock: pending transactions, the processed-id set, the
//! per-group supersession record, in-progress purchase markers, the staged
//! promoted product and the initialization flag. The background listener and
//! an explicit purchase call may observe the same transaction id
//! concurrently; whichever gets through [`SessionMonitor::admit`] first wins
//! and the other becomes a no-op.

use crate::dedup::ProcessedIdSet;
use chrono::{DateTime, Utc};
use openiap_lib::{Product, StoreTransaction};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio::sync::Mutex;

/// A transaction accepted but not yet finished with the store.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub id: String,
    pub transaction: StoreTransaction,
    pub stored_at: Instant,
}

/// Result of offering a transaction to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First observation; caller should emit the purchase.
    Accepted,
    /// The id was processed inside the dedup window; no-op.
    Duplicate,
    /// A newer transaction for a different product in the same subscription
    /// group was already observed; no-op.
    Superseded,
}

struct GroupLatest {
    product_id: String,
    purchase_date: DateTime<Utc>,
}

struct SessionState {
    processed: ProcessedIdSet,
    pending: HashMap<String, PendingTransaction>,
    group_latest: HashMap<String, GroupLatest>,
    in_progress: HashSet<String>,
    promoted_product: Option<Product>,
    initialized: bool,
    epoch: u64,
}

/// The single serialized-access owner of engine state.
pub struct SessionMonitor {
    state: Mutex<SessionState>,
}

impl SessionMonitor {
    pub fn new(dedup_window: std::time::Duration) -> Self {
        Self {
            state: Mutex::new(SessionState {
                processed: ProcessedIdSet::new(dedup_window),
                pending: HashMap::new(),
                group_latest: HashMap::new(),
                in_progress: HashSet::new(),
                promoted_product: None,
                initialized: false,
                epoch: 0,
            }),
        }
    }

    /// Offer a transaction for processing.
    ///
    /// Applies supersession then deduplication atomically; on acceptance the
    /// id is marked processed and the transaction recorded pending. The
    /// supersession check is best-effort: concurrent renewals in one group
    /// can race, and the check only guards against stale arrivals that are
    /// older than something already seen.
    pub async fn admit(&self, tx: &StoreTransaction, now: Instant) -> Admission {
        let mut state = self.state.lock().await;

        if let Some(group) = &tx.subscription_group_id {
            if let Some(latest) = state.group_latest.get(group) {
                if latest.product_id != tx.product_id && latest.purchase_date > tx.purchase_date {
                    return Admission::Superseded;
                }
            }
        }

        if !state.processed.check_and_mark(&tx.id, now) {
            return Admission::Duplicate;
        }

        if let Some(group) = &tx.subscription_group_id {
            let newer = state
                .group_latest
                .get(group)
                .map_or(true, |latest| tx.purchase_date >= latest.purchase_date);
            if newer {
                state.group_latest.insert(
                    group.clone(),
                    GroupLatest {
                        product_id: tx.product_id.clone(),
                        purchase_date: tx.purchase_date,
                    },
                );
            }
        }

        state.pending.insert(
            tx.id.clone(),
            PendingTransaction {
                id: tx.id.clone(),
                transaction: tx.clone(),
                stored_at: now,
            },
        );
        Admission::Accepted
    }

    /// Remove a pending transaction after an explicit finish.
    pub async fn remove_pending(&self, id: &str) -> Option<PendingTransaction> {
        let mut state = self.state.lock().await;
        state.pending.remove(id)
    }

    /// Snapshot of all pending transactions.
    pub async fn pending_snapshot(&self) -> Vec<PendingTransaction> {
        let state = self.state.lock().await;
        state.pending.values().cloned().collect()
    }

    /// Full-clear sweep of pending bookkeeping.
    pub async fn clear_pending(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
    }

    /// Mark a SKU as having a purchase in flight. Returns false when one
    /// already is.
    pub async fn begin_purchase(&self, sku: &str) -> bool {
        let mut state = self.state.lock().await;
        state.in_progress.insert(sku.to_owned())
    }

    /// Clear a SKU's in-progress marker.
    pub async fn end_purchase(&self, sku: &str) {
        let mut state = self.state.lock().await;
        state.in_progress.remove(sku);
    }

    pub async fn set_promoted_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        state.promoted_product = Some(product);
    }

    pub async fn promoted_product(&self) -> Option<Product> {
        let state = self.state.lock().await;
        state.promoted_product.clone()
    }

    pub async fn set_initialized(&self, value: bool) {
        let mut state = self.state.lock().await;
        state.initialized = value;
    }

    pub async fn is_initialized(&self) -> bool {
        let state = self.state.lock().await;
        state.initialized
    }

    /// Current reset generation.
    pub async fn epoch(&self) -> u64 {
        let state = self.state.lock().await;
        state.epoch
    }

    /// Start a new generation; in-flight work from older generations discards
    /// its results when it notices the bump.
    pub async fn bump_epoch(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.epoch
    }

    /// Drop all session collections. The epoch and initialization flag are
    /// managed separately by the connection lifecycle.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.processed.clear();
        state.pending.clear();
        state.group_latest.clear();
        state.in_progress.clear();
        state.promoted_product = None;
    }
}
