//! Reconciliation of the local database with a versioned remote.
//!
//! This module decides between push, pull and no-op on the latest
//! modification instants, and executes the resulting transfer.

pub mod decision;
pub mod engine;
pub mod transfer;

pub use decision::{DecisionKind, SyncDecision};
pub use engine::{sync_all, LocalSummary, ReconcileState, Reconciler, SyncOutcome, SyncPlan, SyncRequest};
pub use transfer::{conflict_path, PullPolicy, TransferExecutor, TransferReport};
