//! # OpenIAP Client Engine
//!
//! The transaction reconciliation engine behind the OpenIAP store bridge:
//! connection lifecycle, the background transaction-update consumer with
//! deduplication and subscription-group supersession, pending-transaction
//! bookkeeping and purchase-request orchestration.
//!
//! The entry point is [`IapClient`]: one explicitly constructed instance per
//! host, wired over any [`StoreService`](openiap_lib::StoreService)
//! implementation.
//!
//! # Concurrency
//!
//! All mutable engine state sits behind one serialized monitor
//! ([`state::SessionMonitor`]). The background listener and an explicit
//! purchase call may observe the same transaction concurrently; the first
//! through the monitor wins and the other becomes a no-op, so emission is
//! idempotent regardless of arrival order.

pub mod client;
pub mod connection;
pub mod coordinator;
pub mod dedup;
pub mod listener;
mod offer;
pub mod state;

pub use client::IapClient;
pub use connection::ConnectionManager;
pub use coordinator::{PurchaseRequestCoordinator, RequestPurchaseProps};
pub use dedup::ProcessedIdSet;
pub use listener::TransactionListener;
pub use state::{Admission, PendingTransaction, SessionMonitor};

pub use openiap_lib::Result;
