//! Error taxonomy for the cache core.
//!
//! Three families matter to callers:
//!
//! - [`ValidationError`]: a record is missing a required field. Batches skip
//!   the record and keep going; single writes reject it.
//! - [`FetchError`]: the remote source could not produce a batch. The store is
//!   left untouched and the read path may fall back.
//! - [`StorageError`]: SQLite or the store handle failed. Always surfaced.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::api::FetchError;
use crate::models::RecordKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Sqlite(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} record is missing required field '{field}'")]
    MissingField {
        kind: RecordKind,
        field: &'static str,
    },

    #[error("{kind} record has an invalid '{field}' field: {reason}")]
    InvalidField {
        kind: RecordKind,
        field: &'static str,
        reason: String,
    },

    #[error("unknown record kind: {0}")]
    UnknownKind(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is closed")]
    Closed,

    #[error("store lock poisoned by a panicked writer")]
    Poisoned,

    #[error("schema migration failed: {0}")]
    Migration(String),
}
