//! Freshness policy: decides whether a read is served from the store, from a
//! just-completed sync, or straight from the remote.
//!
//! For every read:
//! 1. An empty table triggers one reconciliation pass
//! 2. The answer is read from the store
//! 3. If that pass failed and the table is still empty, the full remote set
//!    is fetched and served without being written
//!
//! Task reads can also force a pass; a failed forced pass serves whatever the
//! store holds, flagged stale.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, warn};

use super::filter::due_view;
use super::reconcile::{Reconciler, SyncSummary};
use crate::api::mapping::Records;
use crate::api::{FetchError, RemoteFetcher};
use crate::cache::{CacheInfo, Store, StoreHandle, SyncInfo};
use crate::error::{Error, Result};
use crate::models::{Quotation, RecordKind, Task, Word};

/// Where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Sampled or filtered from the store
    ServerCache,
    /// The whole stored table
    ServerCacheAll,
    /// The store had nothing for this kind
    ServerCacheEmpty,
    /// Fetched from the remote because the store could not be populated
    RemoteDirect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeMeta {
    pub source: DataSource,
    /// Rows stored for the kind at read time
    pub count: usize,
    /// Tasks left after the due view was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_count: Option<usize>,
    pub last_sync: Option<DateTime<Utc>>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// Data handed to a reader together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<T> {
    pub data: T,
    pub meta: ServeMeta,
}

impl<T> Served<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            data: f(self.data),
            meta: self.meta,
        }
    }
}

pub struct FreshnessPolicy<F> {
    store: Arc<StoreHandle>,
    fetcher: F,
}

impl<F: RemoteFetcher> FreshnessPolicy<F> {
    pub fn new(store: Arc<StoreHandle>, fetcher: F) -> Self {
        Self { store, fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Up to `n` distinct random words.
    pub async fn random_words(&self, n: usize) -> Result<Served<Vec<Word>>> {
        self.read_through(
            RecordKind::Word,
            DataSource::ServerCache,
            |store| store.random::<Word>(n),
            |records| sample(records.into_words(), n),
        )
        .await
    }

    pub async fn all_words(&self) -> Result<Served<Vec<Word>>> {
        self.read_through(
            RecordKind::Word,
            DataSource::ServerCacheAll,
            |store| store.all::<Word>(),
            Records::into_words,
        )
        .await
    }

    pub async fn random_quotation(&self) -> Result<Served<Option<Quotation>>> {
        let served = self
            .read_through(
                RecordKind::Quotation,
                DataSource::ServerCache,
                |store| store.random::<Quotation>(1),
                |records| sample(records.into_quotations(), 1),
            )
            .await?;
        Ok(served.map(|quotations| quotations.into_iter().next()))
    }

    pub async fn all_quotations(&self) -> Result<Served<Vec<Quotation>>> {
        self.read_through(
            RecordKind::Quotation,
            DataSource::ServerCacheAll,
            |store| store.all::<Quotation>(),
            Records::into_quotations,
        )
        .await
    }

    /// Tasks due today or earlier, as of the local calendar day in UTC.
    pub async fn due_tasks(&self, force_refresh: bool) -> Result<Served<Vec<Task>>> {
        self.due_tasks_on(Utc::now().date_naive(), force_refresh)
            .await
    }

    pub async fn due_tasks_on(
        &self,
        today: NaiveDate,
        force_refresh: bool,
    ) -> Result<Served<Vec<Task>>> {
        let mut served = if force_refresh {
            self.refresh_tasks().await?
        } else {
            self.read_through(
                RecordKind::Task,
                DataSource::ServerCache,
                |store| store.all::<Task>(),
                Records::into_tasks,
            )
            .await?
        };

        served.data = due_view(served.data, today);
        served.meta.filtered_count = Some(served.data.len());
        Ok(served)
    }

    /// Run one reconciliation pass for `kind` on request. Fetch failures are
    /// reported in the summary; storage failures are returned as errors.
    pub async fn sync(&self, kind: RecordKind) -> Result<SyncSummary> {
        let store = self.store.get().await?;
        match Reconciler::new(store).sync(kind, &self.fetcher).await {
            Ok(report) => Ok(SyncSummary::succeeded(&report)),
            Err(err @ Error::Fetch(_)) => {
                warn!(kind = %kind, error = %err, "Sync failed");
                Ok(SyncSummary::failed(kind, &err))
            }
            Err(err) => Err(err),
        }
    }

    /// Remote data for `kind` without touching the store: the remote's own
    /// sample, or the full set when `all` is set.
    pub async fn direct(&self, kind: RecordKind, all: bool) -> Result<Records> {
        let batch = if all {
            self.fetcher.fetch(kind).await?
        } else {
            self.fetcher.fetch_sample(kind).await?
        };
        Ok(Records::from_batch(kind, &batch, Utc::now()))
    }

    pub async fn sync_info(&self, kind: RecordKind) -> Result<Option<SyncInfo>> {
        self.store.get().await?.sync_info(kind)
    }

    pub async fn words_cache_info(&self) -> Result<CacheInfo> {
        self.store.get().await?.words_cache_info()
    }

    /// Reconcile `kind` if its table is empty. Returns the fetch error of a
    /// failed pass; storage errors are returned as errors.
    async fn populate_if_empty(
        &self,
        store: &Store,
        kind: RecordKind,
    ) -> Result<Option<FetchError>> {
        if store.count(kind)? > 0 {
            return Ok(None);
        }
        debug!(kind = %kind, "Store empty, reconciling");
        match Reconciler::new(store).sync(kind, &self.fetcher).await {
            Ok(_) => Ok(None),
            Err(Error::Fetch(err)) => {
                warn!(kind = %kind, error = %err, "Reconciliation of empty store failed");
                Ok(Some(err))
            }
            Err(err) => Err(err),
        }
    }

    async fn read_through<T>(
        &self,
        kind: RecordKind,
        source: DataSource,
        read: impl FnOnce(&Store) -> Result<Vec<T>>,
        fallback: impl FnOnce(Records) -> Vec<T>,
    ) -> Result<Served<Vec<T>>> {
        let store = self.store.get().await?;
        let sync_error = self.populate_if_empty(store, kind).await?;
        let count = store.count(kind)?;
        let last_sync = store.sync_info(kind)?.map(|info| info.last_sync);

        if let Some(err) = sync_error {
            if count == 0 {
                warn!(kind = %kind, "Serving remote data directly");
                let batch = self.fetcher.fetch(kind).await?;
                let data = fallback(Records::from_batch(kind, &batch, Utc::now()));
                return Ok(Served {
                    meta: ServeMeta {
                        source: DataSource::RemoteDirect,
                        count,
                        filtered_count: None,
                        last_sync,
                        stale: false,
                        sync_error: Some(err.to_string()),
                    },
                    data,
                });
            }
        }

        let data = read(store)?;
        Ok(Served {
            meta: ServeMeta {
                source: if count == 0 {
                    DataSource::ServerCacheEmpty
                } else {
                    source
                },
                count,
                filtered_count: None,
                last_sync,
                stale: false,
                sync_error: None,
            },
            data,
        })
    }

    async fn refresh_tasks(&self) -> Result<Served<Vec<Task>>> {
        let store = self.store.get().await?;
        let sync_error = match Reconciler::new(store)
            .sync(RecordKind::Task, &self.fetcher)
            .await
        {
            Ok(_) => None,
            Err(Error::Fetch(err)) => {
                warn!(error = %err, "Task refresh failed, serving stored tasks");
                Some(err.to_string())
            }
            Err(err) => return Err(err),
        };

        let tasks = store.all::<Task>()?;
        let count = tasks.len();
        let last_sync = store.sync_info(RecordKind::Task)?.map(|info| info.last_sync);
        Ok(Served {
            meta: ServeMeta {
                source: if count == 0 {
                    DataSource::ServerCacheEmpty
                } else {
                    DataSource::ServerCache
                },
                count,
                filtered_count: None,
                last_sync,
                stale: sync_error.is_some(),
                sync_error,
            },
            data: tasks,
        })
    }
}

/// Up to `n` items drawn without replacement.
fn sample<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    items.shuffle(&mut rand::thread_rng());
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewQuotation;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one fixed batch, failing the first `failures` calls.
    struct FakeFetcher {
        batch: Vec<Value>,
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn serving(batch: Vec<Value>) -> Self {
            Self {
                batch,
                failures: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(failures: usize, batch: Vec<Value>) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Self::serving(batch)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteFetcher for FakeFetcher {
        async fn fetch(&self, _kind: RecordKind) -> std::result::Result<Vec<Value>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(FetchError::ServerError("remote down".into()));
            }
            Ok(self.batch.clone())
        }
    }

    fn policy(fetcher: FakeFetcher) -> FreshnessPolicy<FakeFetcher> {
        FreshnessPolicy::new(Arc::new(StoreHandle::in_memory()), fetcher)
    }

    async fn store_of(policy: &FreshnessPolicy<FakeFetcher>) -> &Store {
        policy.store.get().await.unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_reconciles_once() {
        let policy = policy(FakeFetcher::serving(vec![
            json!({"word": "lull", "definition": "a pause"}),
        ]));

        let served = policy.all_words().await.unwrap();
        assert_eq!(policy.fetcher().calls(), 1);
        assert_eq!(served.data.len(), 1);
        assert_eq!(served.data[0].word, "lull");
        assert_eq!(served.meta.source, DataSource::ServerCacheAll);
        assert_eq!(served.meta.count, 1);
        assert!(served.meta.last_sync.is_some());

        let info = policy.sync_info(RecordKind::Word).await.unwrap().unwrap();
        assert_eq!(info.record_count, 1);

        // Populated now, so no second fetch.
        let served = policy.random_words(3).await.unwrap();
        assert_eq!(policy.fetcher().calls(), 1);
        assert_eq!(served.data.len(), 1);
        assert_eq!(served.meta.source, DataSource::ServerCache);
    }

    #[tokio::test]
    async fn test_failed_sync_falls_back_to_remote() {
        let policy = policy(FakeFetcher::failing(
            1,
            vec![json!({"quotation": "A", "who": "X"})],
        ));

        let served = policy.random_quotation().await.unwrap();
        assert_eq!(policy.fetcher().calls(), 2);
        assert_eq!(served.meta.source, DataSource::RemoteDirect);
        assert!(served.meta.sync_error.is_some());
        let quotation = served.data.unwrap();
        assert_eq!(quotation.text, "A");
        assert_eq!(quotation.id, None);

        assert_eq!(store_of(&policy).await.count(RecordKind::Quotation).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_surfaced() {
        let policy = policy(FakeFetcher::failing(2, vec![]));
        let err = policy.all_quotations().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::ServerError(_))));
    }

    #[tokio::test]
    async fn test_fallback_sample_is_bounded() {
        let batch = (0..10).map(|i| json!({"word": format!("w{i}")})).collect();
        let policy = policy(FakeFetcher::failing(1, batch));

        let served = policy.random_words(4).await.unwrap();
        assert_eq!(served.meta.source, DataSource::RemoteDirect);
        assert_eq!(served.data.len(), 4);
        let unique: HashSet<_> = served.data.iter().map(|w| w.word.clone()).collect();
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn test_populated_store_is_served_without_fetch() {
        let policy = policy(FakeFetcher::failing(usize::MAX, vec![]));
        store_of(&policy)
            .await
            .upsert_one::<Quotation>(&NewQuotation::new("Stored", None))
            .unwrap();

        let served = policy.all_quotations().await.unwrap();
        assert_eq!(policy.fetcher().calls(), 0);
        assert_eq!(served.data.len(), 1);
        assert!(!served.meta.stale);
    }

    #[tokio::test]
    async fn test_forced_refresh_failure_serves_stored_tasks() {
        let policy = policy(FakeFetcher::failing(1, vec![]));
        let stored: Vec<_> = (1..=5)
            .map(|day| Task::new(format!("t{day}"), "stored").with_due(&format!("2024-03-0{day}")))
            .collect();
        store_of(&policy).await.replace_all::<Task>(&stored).unwrap();

        let served = policy.due_tasks_on(today(), true).await.unwrap();
        assert_eq!(policy.fetcher().calls(), 1);
        assert_eq!(served.data.len(), 5);
        assert!(served.meta.stale);
        assert!(served.meta.sync_error.is_some());
        assert_eq!(served.meta.count, 5);
        assert_eq!(served.meta.filtered_count, Some(5));
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_snapshot() {
        let policy = policy(FakeFetcher::serving(vec![
            json!({"id": "new", "content": "fresh", "due": {"date": "2024-03-14"}}),
            json!({"id": "later", "content": "not yet", "due": {"date": "2024-04-01"}}),
        ]));
        store_of(&policy)
            .await
            .replace_all::<Task>(&[Task::new("old", "gone").with_due("2024-03-01")])
            .unwrap();

        let served = policy.due_tasks_on(today(), true).await.unwrap();
        let ids: Vec<_> = served.data.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
        assert!(!served.meta.stale);
        assert_eq!(served.meta.count, 2);
        assert_eq!(served.meta.filtered_count, Some(1));
    }

    #[tokio::test]
    async fn test_task_view_does_not_mutate_store() {
        let tasks: Vec<_> = (1..=20)
            .map(|i| json!({"id": i.to_string(), "content": "x", "due": {"date": "2024-03-01"}}))
            .chain([json!({"id": "undated", "content": "someday"})])
            .collect();
        let policy = policy(FakeFetcher::serving(tasks));

        let served = policy.due_tasks_on(today(), false).await.unwrap();
        assert_eq!(served.data.len(), 16);
        assert_eq!(served.meta.count, 21);
        assert_eq!(store_of(&policy).await.count(RecordKind::Task).unwrap(), 21);
    }

    #[tokio::test]
    async fn test_empty_task_snapshot_is_not_a_failure() {
        let policy = policy(FakeFetcher::serving(vec![]));
        let served = policy.due_tasks_on(today(), false).await.unwrap();
        assert!(served.data.is_empty());
        assert_eq!(served.meta.source, DataSource::ServerCacheEmpty);
        assert!(served.meta.sync_error.is_none());
        assert_eq!(policy.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_tasks_are_filtered() {
        let policy = policy(FakeFetcher::failing(
            1,
            vec![
                json!({"id": "due", "content": "x", "due": {"date": "2024-03-10"}}),
                json!({"id": "future", "content": "y", "due": {"date": "2024-05-10"}}),
            ],
        ));
        let served = policy.due_tasks_on(today(), false).await.unwrap();
        assert_eq!(served.meta.source, DataSource::RemoteDirect);
        assert_eq!(served.data.len(), 1);
        assert_eq!(served.data[0].id, "due");
    }

    #[tokio::test]
    async fn test_sync_reports_fetch_failure() {
        let policy = policy(FakeFetcher::failing(1, vec![]));
        let summary = policy.sync(RecordKind::Word).await.unwrap();
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("remote down"));
        assert_eq!(store_of(&policy).await.count(RecordKind::Word).unwrap(), 0);

        let policy2 = FreshnessPolicy::new(
            Arc::new(StoreHandle::in_memory()),
            FakeFetcher::serving(vec![json!({"word": "a"}), json!({"word": "b"})]),
        );
        let summary = policy2.sync(RecordKind::Word).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.synced, Some(2));
        assert_eq!(summary.inserted, Some(2));
    }

    #[tokio::test]
    async fn test_direct_does_not_touch_store() {
        let policy = policy(FakeFetcher::serving(vec![json!({"word": "fresh"})]));
        let records = policy.direct(RecordKind::Word, false).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records, Records::Words(_)));
        assert!(!policy.store.is_open());
    }
}
