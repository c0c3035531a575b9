//! Local SQLite store for cached words, quotations and tasks.
//!
//! This module provides the [`Store`] (record tables plus sync metadata) and
//! the lazily opened [`StoreHandle`] the rest of the crate shares.
//!
//! Tables:
//! - `words`, `quotations`: merged by natural key, `created_at` preserved
//! - `tasks`: replaced wholesale on every sync
//! - `sync_metadata`: last sync time and row count per kind

pub mod metadata;
pub mod schema;
pub mod store;
pub mod table;

pub use metadata::SyncInfo;
pub use store::{CacheInfo, Store, StoreHandle};
pub use table::{CachedRecord, UpsertCounts, UpsertOutcome};
