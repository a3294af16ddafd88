//! Background consumer of the store's transaction-update feed.
//!
//! The feed is unbounded and arrival order is unspecified: new purchases,
//! renewals and upgrades can arrive at any time, including while an explicit
//! purchase call for the same transaction is in flight. Each update runs the
//! verification / revocation / supersession / dedup pipeline and only
//! survivors are emitted as purchase-updated events.
//!
//! The worker shuts down cooperatively: a watch signal from `disconnect`, or
//! the store dropping the feed sender, both end the loop without leaking the
//! task.

use crate::state::{Admission, SessionMonitor};
use openiap_lib::{
    EventBus, Purchase, PurchaseError, TransactionUpdate, Verification,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Handle to the running feed consumer.
pub struct TransactionListener {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TransactionListener {
    /// Spawn the consumer over a freshly taken feed receiver.
    pub fn spawn(
        mut feed: mpsc::UnboundedReceiver<TransactionUpdate>,
        monitor: Arc<SessionMonitor>,
        events: EventBus,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("transaction listener stopping");
                            break;
                        }
                    }
                    update = feed.recv() => match update {
                        Some(update) => process_update(update, &monitor, &events).await,
                        None => {
                            tracing::debug!("transaction feed closed by store");
                            break;
                        }
                    },
                }
            }
        });
        Self { shutdown, handle }
    }

    /// Cooperative stop: signal the worker and wait for it to drain.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }

    /// Hard stop, for teardown paths that cannot await.
    pub fn abort(self) {
        self.handle.abort();
    }
}

/// Run one update through the reconciliation pipeline.
///
/// A failure here never stops the loop; bad individual transactions are
/// reported on the error channel and dropped.
async fn process_update(update: TransactionUpdate, monitor: &SessionMonitor, events: &EventBus) {
    let TransactionUpdate {
        transaction,
        verification,
    } = update;

    if let Verification::Unverified { reason } = verification {
        tracing::warn!(
            "transaction {} failed verification: {}",
            transaction.id,
            reason
        );
        let err = PurchaseError::validation(format!(
            "transaction {} failed verification: {}",
            transaction.id, reason
        ))
        .with_product(transaction.product_id);
        events.emit_purchase_error(&err);
        return;
    }

    if transaction.is_revoked() {
        // Refunded. Never surfaces as a purchase.
        tracing::debug!("dropping revoked transaction {}", transaction.id);
        return;
    }

    match monitor.admit(&transaction, Instant::now()).await {
        Admission::Accepted => {
            let purchase = Purchase::from_transaction(&transaction);
            tracing::debug!(
                "accepted transaction {} for {}",
                transaction.id,
                transaction.product_id
            );
            events.emit_purchase_updated(&purchase);
        }
        Admission::Duplicate => {
            tracing::debug!("suppressing duplicate transaction {}", transaction.id);
        }
        Admission::Superseded => {
            tracing::debug!(
                "skipping superseded transaction {} for {}",
                transaction.id,
                transaction.product_id
            );
        }
    }
}
