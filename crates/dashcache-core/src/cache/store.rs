use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::metadata::{self, SyncInfo};
use super::schema;
use super::table::{self, CachedRecord, UpsertCounts, UpsertOutcome};
use crate::error::{Result, StorageError};
use crate::models::{RecordKind, Word};

/// The local record store: one SQLite database holding the record tables and
/// the sync metadata.
///
/// All access goes through a single connection behind a mutex, so every
/// transaction runs alone. `Store` is `Sync` and meant to be shared by
/// reference for the lifetime of the process.
pub struct Store {
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Open (creating if needed) a file-backed store and migrate its schema.
    pub fn open(path: &Path) -> std::result::Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let version = schema::migrate(&mut conn)?;
        info!(path = %path.display(), journal_mode = %mode, version, "Store opened");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> std::result::Result<Self, StorageError> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Option<Connection>>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Run `f` against the connection outside of an explicit transaction.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> std::result::Result<T, StorageError>,
    ) -> std::result::Result<T, StorageError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Run `f` inside one write transaction. The transaction commits only if
    /// `f` succeeds; any error rolls every write in it back.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> std::result::Result<T, StorageError>,
    ) -> std::result::Result<T, StorageError> {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Close the underlying database file. Later operations fail with
    /// [`StorageError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> std::result::Result<(), StorageError> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
            debug!("Store closed");
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self.with_connection(schema::current_version)?)
    }

    // ===== Records =====

    pub fn all<R: CachedRecord>(&self) -> Result<Vec<R>> {
        Ok(self.with_connection(table::all::<R>)?)
    }

    pub fn get<R: CachedRecord>(&self, key: &str) -> Result<Option<R>> {
        Ok(self.with_connection(|conn| table::get::<R>(conn, key))?)
    }

    pub fn random<R: CachedRecord>(&self, n: usize) -> Result<Vec<R>> {
        Ok(self.with_connection(|conn| table::random::<R>(conn, n))?)
    }

    pub fn count(&self, kind: RecordKind) -> Result<usize> {
        Ok(self.with_connection(|conn| table::count(conn, kind))?)
    }

    pub fn clear(&self, kind: RecordKind) -> Result<()> {
        let removed = self.with_transaction(|tx| table::clear(tx, kind))?;
        debug!(%kind, removed, "Cleared table");
        Ok(())
    }

    pub fn upsert_one<R: CachedRecord>(&self, draft: &R::Draft) -> Result<UpsertOutcome> {
        self.upsert_one_at::<R>(draft, Utc::now())
    }

    pub fn upsert_one_at<R: CachedRecord>(
        &self,
        draft: &R::Draft,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        R::validate(draft)?;
        Ok(self.with_transaction(|tx| table::upsert_one::<R>(tx, draft, now))?)
    }

    /// Upsert every draft in one transaction. A draft failing validation
    /// rejects the whole call before anything is written.
    pub fn upsert_many<R: CachedRecord>(&self, drafts: &[R::Draft]) -> Result<UpsertCounts> {
        self.upsert_many_at::<R>(drafts, Utc::now())
    }

    pub fn upsert_many_at<R: CachedRecord>(
        &self,
        drafts: &[R::Draft],
        now: DateTime<Utc>,
    ) -> Result<UpsertCounts> {
        for draft in drafts {
            R::validate(draft)?;
        }
        Ok(self.with_transaction(|tx| table::upsert_many::<R>(tx, drafts, now))?)
    }

    /// Replace the whole table with `drafts` in one transaction.
    pub fn replace_all<R: CachedRecord>(&self, drafts: &[R::Draft]) -> Result<usize> {
        for draft in drafts {
            R::validate(draft)?;
        }
        let now = Utc::now();
        Ok(self.with_transaction(|tx| table::replace_all::<R>(tx, drafts, now))?)
    }

    // ===== Sync Metadata =====

    pub fn record_sync(&self, kind: RecordKind, record_count: usize) -> Result<()> {
        let now = Utc::now();
        Ok(self.with_transaction(|tx| metadata::record_sync(tx, kind, record_count, now))?)
    }

    pub fn sync_info(&self, kind: RecordKind) -> Result<Option<SyncInfo>> {
        Ok(self.with_connection(|conn| metadata::sync_info(conn, kind))?)
    }

    // ===== Word Cache Info =====

    pub fn words_cache_info(&self) -> Result<CacheInfo> {
        Ok(self.with_connection(|conn| {
            Ok(CacheInfo {
                count: table::count(conn, Word::KIND)?,
                last_cached: table::words_last_cached(conn)?,
            })
        })?)
    }
}

/// Row count and newest write time of the words table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub count: usize,
    pub last_cached: Option<DateTime<Utc>>,
}

/// Lazily opened, process-wide store.
///
/// The database is opened on the first [`get`](StoreHandle::get); concurrent
/// first callers wait on the same initialization and all receive the same
/// store. A failed open is returned to the caller and retried on the next
/// `get`.
pub struct StoreHandle {
    location: Option<PathBuf>,
    cell: OnceCell<Store>,
}

impl StoreHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(path.into()),
            cell: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: None,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> std::result::Result<&Store, StorageError> {
        self.cell
            .get_or_try_init(|| async {
                match &self.location {
                    Some(path) => Store::open(path),
                    None => Store::open_in_memory(),
                }
            })
            .await
    }

    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    /// Close the store if it was ever opened.
    pub fn close(&self) -> std::result::Result<(), StorageError> {
        match self.cell.get() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ValidationError};
    use crate::models::{NewQuotation, NewWord, Quotation, Task};
    use chrono::Duration;
    use std::collections::HashSet;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn test_upsert_word_keeps_created_at_and_advances_updated_at() {
        let store = store();
        let t0 = Utc::now() - Duration::minutes(10);
        let t1 = t0 + Duration::minutes(5);

        let outcome = store
            .upsert_one_at::<Word>(&NewWord::new("lull", Some("a pause")), t0)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let outcome = store
            .upsert_one_at::<Word>(&NewWord::new("lull", Some("a calm interval")), t1)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let word = store.get::<Word>("lull").unwrap().unwrap();
        assert_eq!(word.definition.as_deref(), Some("a calm interval"));
        assert_eq!(word.created_at, t0);
        assert_eq!(word.updated_at, t1);
        assert_eq!(word.cached_at, t1);
        assert_eq!(store.count(RecordKind::Word).unwrap(), 1);
    }

    #[test]
    fn test_word_key_is_case_sensitive() {
        let store = store();
        store.upsert_one::<Word>(&NewWord::new("Lull", None)).unwrap();
        store.upsert_one::<Word>(&NewWord::new("lull", None)).unwrap();
        assert_eq!(store.count(RecordKind::Word).unwrap(), 2);
        assert!(store.get::<Word>("LULL").unwrap().is_none());
    }

    #[test]
    fn test_upsert_quotation_by_text() {
        let store = store();
        let t0 = Utc::now() - Duration::hours(1);
        store
            .upsert_one_at::<Quotation>(&NewQuotation::new("A", Some("X")), t0)
            .unwrap();
        let before = store.get::<Quotation>("A").unwrap().unwrap();

        store
            .upsert_one_at::<Quotation>(&NewQuotation::new("A", Some("Y")), t0 + Duration::minutes(1))
            .unwrap();
        let after = store.get::<Quotation>("A").unwrap().unwrap();

        assert_eq!(after.author.as_deref(), Some("Y"));
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.id, before.id);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn test_upsert_without_key_is_validation_error() {
        let store = store();
        let err = store
            .upsert_one::<Quotation>(&NewQuotation::new("  ", None))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField { field: "text", .. })
        ));

        let drafts = vec![NewWord::new("ok", None), NewWord::new("", None)];
        assert!(matches!(
            store.upsert_many::<Word>(&drafts),
            Err(Error::Validation(_))
        ));
        assert_eq!(store.count(RecordKind::Word).unwrap(), 0);
    }

    #[test]
    fn test_task_without_content_is_rejected() {
        let store = store();
        let err = store.upsert_one::<Task>(&Task::new("1", " ")).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField { field: "content", .. })
        ));

        let err = store
            .replace_all::<Task>(&[Task::new("1", "ok"), Task::new("", "no id")])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField { field: "id", .. })
        ));

        assert!(store
            .upsert_many::<Task>(&[Task::new("2", "")])
            .is_err());
        assert_eq!(store.count(RecordKind::Task).unwrap(), 0);
    }

    #[test]
    fn test_all_orders_newest_first() {
        let store = store();
        let base = Utc::now() - Duration::days(1);
        for (i, w) in ["first", "second", "third"].iter().enumerate() {
            store
                .upsert_one_at::<Word>(&NewWord::new(*w, None), base + Duration::minutes(i as i64))
                .unwrap();
        }
        let words: Vec<_> = store.all::<Word>().unwrap().into_iter().map(|w| w.word).collect();
        assert_eq!(words, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_tasks_order_by_due_then_priority() {
        let store = store();
        let tasks = vec![
            Task::new("a", "later").with_due("2024-02-01").with_priority(4),
            Task::new("b", "undated").with_priority(4),
            Task::new("c", "soon low").with_due("2024-01-01").with_priority(1),
            Task::new("d", "soon high").with_due("2024-01-01").with_priority(4),
        ];
        store.replace_all::<Task>(&tasks).unwrap();
        let ids: Vec<_> = store.all::<Task>().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_random_returns_distinct_and_caps_at_table_size() {
        let store = store();
        let drafts: Vec<_> = (0..5).map(|i| NewWord::new(format!("w{i}"), None)).collect();
        store.upsert_many::<Word>(&drafts).unwrap();

        let sample = store.random::<Word>(10).unwrap();
        assert_eq!(sample.len(), 5);
        let unique: HashSet<_> = sample.iter().map(|w| w.word.clone()).collect();
        assert_eq!(unique.len(), 5);

        assert_eq!(store.random::<Word>(3).unwrap().len(), 3);
        assert!(store.random::<Task>(3).unwrap().is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = store();
        store.upsert_one::<Word>(&NewWord::new("x", None)).unwrap();
        store.clear(RecordKind::Word).unwrap();
        store.clear(RecordKind::Word).unwrap();
        assert_eq!(store.count(RecordKind::Word).unwrap(), 0);
    }

    #[test]
    fn test_upsert_many_counts() {
        let store = store();
        store.upsert_one::<Word>(&NewWord::new("old", None)).unwrap();
        let counts = store
            .upsert_many::<Word>(&[NewWord::new("old", Some("d")), NewWord::new("new", None)])
            .unwrap();
        assert_eq!(counts, UpsertCounts { inserted: 1, updated: 1 });
    }

    #[test]
    fn test_sync_metadata_last_write_wins() {
        let store = store();
        assert!(store.sync_info(RecordKind::Quotation).unwrap().is_none());

        store.record_sync(RecordKind::Quotation, 10).unwrap();
        let first = store.sync_info(RecordKind::Quotation).unwrap().unwrap();
        store.record_sync(RecordKind::Quotation, 7).unwrap();
        let second = store.sync_info(RecordKind::Quotation).unwrap().unwrap();

        assert_eq!(first.record_count, 10);
        assert_eq!(second.record_count, 7);
        assert!(second.last_sync >= first.last_sync);
        assert!(store.sync_info(RecordKind::Word).unwrap().is_none());
    }

    #[test]
    fn test_words_cache_info() {
        let store = store();
        assert_eq!(
            store.words_cache_info().unwrap(),
            CacheInfo { count: 0, last_cached: None }
        );
        let t = Utc::now() - Duration::minutes(3);
        store.upsert_one_at::<Word>(&NewWord::new("a", None), t - Duration::minutes(1)).unwrap();
        store.upsert_one_at::<Word>(&NewWord::new("b", None), t).unwrap();
        let info = store.words_cache_info().unwrap();
        assert_eq!(info.count, 2);
        assert_eq!(info.last_cached, Some(t));
    }

    #[test]
    fn test_file_store_persists_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("homepage.db");

        let store = Store::open(&path).unwrap();
        store.upsert_one::<Word>(&NewWord::new("persist", None)).unwrap();
        assert_eq!(store.schema_version().unwrap(), schema::SCHEMA_VERSION);
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.count(RecordKind::Word),
            Err(Error::Storage(StorageError::Closed))
        ));

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.get::<Word>("persist").unwrap().is_some());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let err = Store::open(dir.path()).err().unwrap();
        assert!(matches!(
            err,
            StorageError::Open { .. } | StorageError::Sqlite(_) | StorageError::Migration(_)
        ));
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("homepage.db")).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    let drafts: Vec<_> = (0..25)
                        .map(|i| NewWord::new(format!("w{writer}-{i}"), None))
                        .collect();
                    store.upsert_many::<Word>(&drafts).unwrap();
                });
            }
        });

        assert_eq!(store.count(RecordKind::Word).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_handle_opens_once() {
        let dir = tempfile::tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("homepage.db"));
        assert!(!handle.is_open());

        let first = handle.get().await.unwrap() as *const Store;
        let second = handle.get().await.unwrap() as *const Store;
        assert_eq!(first, second);
        assert!(handle.is_open());

        handle.close().unwrap();
        let store = handle.get().await.unwrap();
        assert!(matches!(
            store.count(RecordKind::Word),
            Err(Error::Storage(StorageError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_close_before_open_is_noop() {
        let handle = StoreHandle::in_memory();
        handle.close().unwrap();
        assert!(!handle.is_open());
    }
}
