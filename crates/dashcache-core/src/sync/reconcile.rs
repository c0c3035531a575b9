//! Reconciliation of a freshly fetched remote batch into the store.
//!
//! # Algorithm
//!
//! 1. Normalize every raw record through the kind's field mapping, skipping
//!    (and logging) records that fail validation
//! 2. Open one write transaction
//! 3. Words and quotations: upsert by natural key, counting inserts and updates.
//!    Tasks: clear the table, then write the batch (snapshot-replace)
//! 4. Record the sync time and resulting row count in the same transaction
//! 5. Commit; any storage error rolls the whole pass back

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::mapping::{normalize_batch, normalize_quotation, normalize_task, normalize_word};
use crate::api::{FetchError, RemoteFetcher};
use crate::cache::{metadata, table, CachedRecord, Store, UpsertCounts};
use crate::error::{Error, Result};
use crate::models::{Quotation, RecordKind, Task, Word};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub kind: RecordKind,
    /// Raw records received from the remote
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records dropped by validation
    pub skipped: usize,
    /// Rows in the table after the pass
    pub record_count: usize,
    pub synced_at: DateTime<Utc>,
}

/// Applies remote batches to a [`Store`].
pub struct Reconciler<'a> {
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Merge `batch` into the store for `kind`.
    pub fn reconcile(&self, kind: RecordKind, batch: &[Value]) -> Result<ReconcileReport> {
        self.reconcile_at(kind, batch, Utc::now())
    }

    pub fn reconcile_at(
        &self,
        kind: RecordKind,
        batch: &[Value],
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport> {
        let (counts, skipped, record_count) = match kind {
            RecordKind::Word => {
                let (drafts, skipped) = normalize_batch(kind, batch, normalize_word);
                let (counts, total) = self.merge::<Word>(&drafts, now)?;
                (counts, skipped, total)
            }
            RecordKind::Quotation => {
                let (drafts, skipped) = normalize_batch(kind, batch, normalize_quotation);
                let (counts, total) = self.merge::<Quotation>(&drafts, now)?;
                (counts, skipped, total)
            }
            RecordKind::Task => {
                let (tasks, skipped) = normalize_batch(kind, batch, normalize_task);
                let total = self.replace::<Task>(&tasks, now)?;
                let counts = UpsertCounts {
                    inserted: total,
                    updated: 0,
                };
                (counts, skipped, total)
            }
        };

        let report = ReconcileReport {
            kind,
            fetched: batch.len(),
            inserted: counts.inserted,
            updated: counts.updated,
            skipped,
            record_count,
            synced_at: now,
        };
        info!(
            kind = %kind,
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            total = report.record_count,
            "Reconciled"
        );
        Ok(report)
    }

    /// Fetch the full remote set for `kind` and reconcile it.
    ///
    /// The store is not touched when the fetch fails. An empty word or
    /// quotation batch counts as a failed fetch; an empty task batch is a
    /// valid snapshot and clears the table.
    pub async fn sync<F: RemoteFetcher>(
        &self,
        kind: RecordKind,
        fetcher: &F,
    ) -> Result<ReconcileReport> {
        debug!(kind = %kind, "Fetching remote batch");
        let batch = fetcher.fetch(kind).await?;
        if batch.is_empty() && !kind.is_snapshot() {
            return Err(Error::Fetch(FetchError::EmptyBatch(kind)));
        }
        self.reconcile(kind, &batch)
    }

    fn merge<R: CachedRecord>(
        &self,
        drafts: &[R::Draft],
        now: DateTime<Utc>,
    ) -> Result<(UpsertCounts, usize)> {
        Ok(self.store.with_transaction(|tx| {
            let counts = table::upsert_many::<R>(tx, drafts, now)?;
            let total = table::count(tx, R::KIND)?;
            metadata::record_sync(tx, R::KIND, total, now)?;
            Ok((counts, total))
        })?)
    }

    fn replace<R: CachedRecord>(&self, drafts: &[R::Draft], now: DateTime<Utc>) -> Result<usize> {
        Ok(self.store.with_transaction(|tx| {
            let total = table::replace_all::<R>(tx, drafts, now)?;
            metadata::record_sync(tx, R::KIND, total, now)?;
            Ok(total)
        })?)
    }
}

/// Serializable outcome of an explicit sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub kind: RecordKind,
    pub success: bool,
    /// Records received from the remote in this pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncSummary {
    pub fn succeeded(report: &ReconcileReport) -> Self {
        Self {
            kind: report.kind,
            success: true,
            synced: Some(report.fetched),
            inserted: Some(report.inserted),
            updated: Some(report.updated),
            timestamp: report.synced_at,
            error: None,
        }
    }

    pub fn failed(kind: RecordKind, error: &Error) -> Self {
        Self {
            kind,
            success: false,
            synced: None,
            inserted: None,
            updated: None,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}
