//! Core library for dashcache.
//!
//! A local SQLite cache for the words, quotations and tasks shown on a
//! personal dashboard, kept in step with their remote sources:
//!
//! - API client and field mapping for the remote sources (`api`)
//! - The record store and sync metadata (`cache`)
//! - Reconciliation and the read-side freshness policy (`sync`)
//! - Data models (`models`)
//! - Configuration (`config`)

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod sync;

pub use api::{FetchError, HttpFetcher, RemoteFetcher};
pub use cache::{Store, StoreHandle};
pub use config::Config;
pub use error::{Error, Result, StorageError, ValidationError};
pub use models::RecordKind;
pub use sync::FreshnessPolicy;
