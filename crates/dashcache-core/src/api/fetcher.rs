use std::future::Future;

use serde_json::Value;

use super::FetchError;
use crate::models::RecordKind;

/// A source of raw remote records for one or more record kinds.
///
/// Implementations return the records exactly as the remote shaped them;
/// normalization happens in [`crate::api::mapping`]. A failure of any kind
/// (transport, status, malformed payload, explicit error field) is reported
/// as a [`FetchError`] and never partially applied.
pub trait RemoteFetcher {
    /// Fetch the complete remote set for `kind`.
    fn fetch(&self, kind: RecordKind)
        -> impl Future<Output = Result<Vec<Value>, FetchError>> + Send;

    /// Fetch the remote's own small sample for `kind` (a few random words,
    /// a single quotation). Sources without a sample endpoint return the
    /// full set.
    fn fetch_sample(
        &self,
        kind: RecordKind,
    ) -> impl Future<Output = Result<Vec<Value>, FetchError>> + Send {
        self.fetch(kind)
    }
}
