//! Remote sources for the cache.
//!
//! The core only talks to the [`RemoteFetcher`] trait. [`HttpFetcher`] is the
//! implementation that reads the word and quotation sheets and the task
//! service over HTTP; [`mapping`] turns their heterogeneous payloads into the
//! canonical record types.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod mapping;

pub use client::HttpFetcher;
pub use error::FetchError;
pub use fetcher::RemoteFetcher;
