//! Keeping the store in step with the remote sources.
//!
//! - [`Reconciler`]: merges one fetched batch into the store
//! - [`FreshnessPolicy`]: decides per read whether to sync, read the store,
//!   or fall back to the remote
//! - [`filter`]: the read-time due-task view

pub mod filter;
pub mod freshness;
pub mod reconcile;

pub use filter::{due_view, DUE_TASK_LIMIT};
pub use freshness::{DataSource, FreshnessPolicy, ServeMeta, Served};
pub use reconcile::{ReconcileReport, Reconciler, SyncSummary};
