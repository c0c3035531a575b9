//! Per-kind table definitions and the connection-level operations shared by
//! all of them.
//!
//! Every function here takes a `&Connection` so it can run either on its own
//! or inside a caller's transaction (a `Transaction` derefs to a
//! `Connection`). Atomicity is the caller's job; see
//! [`Store::with_transaction`](super::Store::with_transaction).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{StorageError, ValidationError};
use crate::models::{Due, NewQuotation, NewWord, Quotation, RecordKind, Task, Word};

/// A record kind with a table in the store.
pub trait CachedRecord: Sized {
    /// What callers hand to the store to write a record.
    type Draft;

    const KIND: RecordKind;
    /// Natural key column; also the field name reported on validation errors.
    const KEY_COLUMN: &'static str;
    const SELECT: &'static str;
    const ORDER_BY: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn draft_key(draft: &Self::Draft) -> &str;

    /// Reject a draft that cannot be written on its own.
    fn validate(draft: &Self::Draft) -> Result<(), ValidationError> {
        require(Self::KIND, Self::KEY_COLUMN, Self::draft_key(draft))
    }

    /// Insert or update by natural key. Must leave `created_at` untouched on
    /// an existing row.
    fn upsert(conn: &Connection, draft: &Self::Draft, now: DateTime<Utc>) -> rusqlite::Result<()>;
}

impl CachedRecord for Word {
    type Draft = NewWord;

    const KIND: RecordKind = RecordKind::Word;
    const KEY_COLUMN: &'static str = "word";
    const SELECT: &'static str =
        "SELECT word, definition, created_at, updated_at, cached_at FROM words";
    const ORDER_BY: &'static str = "created_at DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Word {
            word: row.get(0)?,
            definition: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            cached_at: row.get(4)?,
        })
    }

    fn draft_key(draft: &NewWord) -> &str {
        &draft.word
    }

    fn upsert(conn: &Connection, draft: &NewWord, now: DateTime<Utc>) -> rusqlite::Result<()> {
        conn.prepare_cached(
            "INSERT INTO words (word, definition, created_at, updated_at, cached_at)
             VALUES (?1, ?2, ?3, ?3, ?3)
             ON CONFLICT(word) DO UPDATE SET
                definition = excluded.definition,
                updated_at = excluded.updated_at,
                cached_at = excluded.cached_at",
        )?
        .execute(params![draft.word, draft.definition, now])?;
        Ok(())
    }
}

impl CachedRecord for Quotation {
    type Draft = NewQuotation;

    const KIND: RecordKind = RecordKind::Quotation;
    const KEY_COLUMN: &'static str = "text";
    const SELECT: &'static str =
        "SELECT id, text, author, source, created_at, updated_at FROM quotations";
    const ORDER_BY: &'static str = "created_at DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Quotation {
            id: row.get(0)?,
            text: row.get(1)?,
            author: row.get(2)?,
            source: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn draft_key(draft: &NewQuotation) -> &str {
        &draft.text
    }

    fn upsert(conn: &Connection, draft: &NewQuotation, now: DateTime<Utc>) -> rusqlite::Result<()> {
        conn.prepare_cached(
            "INSERT INTO quotations (text, author, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(text) DO UPDATE SET
                author = excluded.author,
                source = excluded.source,
                updated_at = excluded.updated_at",
        )?
        .execute(params![draft.text, draft.author, draft.source, now])?;
        Ok(())
    }
}

impl CachedRecord for Task {
    type Draft = Task;

    const KIND: RecordKind = RecordKind::Task;
    const KEY_COLUMN: &'static str = "id";
    const SELECT: &'static str = "SELECT id, content, completed, priority, url, due_date, due_string, project, synced_at FROM tasks";
    // Undated tasks sort after dated ones.
    const ORDER_BY: &'static str = "due_date IS NULL, due_date ASC, priority DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let due_date: Option<String> = row.get(5)?;
        let due_string: Option<String> = row.get(6)?;
        Ok(Task {
            id: row.get(0)?,
            content: row.get(1)?,
            completed: row.get(2)?,
            priority: row.get(3)?,
            url: row.get(4)?,
            due: due_date.map(|date| Due {
                date,
                string: due_string,
            }),
            project: row.get(7)?,
            synced_at: Some(row.get(8)?),
        })
    }

    fn draft_key(draft: &Task) -> &str {
        &draft.id
    }

    fn validate(task: &Task) -> Result<(), ValidationError> {
        require(Self::KIND, Self::KEY_COLUMN, &task.id)?;
        require(Self::KIND, "content", &task.content)
    }

    fn upsert(conn: &Connection, task: &Task, now: DateTime<Utc>) -> rusqlite::Result<()> {
        let (due_date, due_string) = match &task.due {
            Some(due) => (Some(due.date.as_str()), due.string.as_deref()),
            None => (None, None),
        };
        conn.prepare_cached(
            "INSERT INTO tasks (id, content, completed, priority, url, due_date, due_string, project, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                completed = excluded.completed,
                priority = excluded.priority,
                url = excluded.url,
                due_date = excluded.due_date,
                due_string = excluded.due_string,
                project = excluded.project,
                synced_at = excluded.synced_at",
        )?
        .execute(params![
            task.id,
            task.content,
            task.completed,
            task.priority,
            task.url,
            due_date,
            due_string,
            task.project,
            now,
        ])?;
        Ok(())
    }
}

fn require(kind: RecordKind, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { kind, field });
    }
    Ok(())
}

/// Whether an upsert created a row or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertCounts {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

pub fn all<R: CachedRecord>(conn: &Connection) -> Result<Vec<R>, StorageError> {
    let sql = format!("{} ORDER BY {}", R::SELECT, R::ORDER_BY);
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = stmt
        .query_map([], |row| R::from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn get<R: CachedRecord>(conn: &Connection, key: &str) -> Result<Option<R>, StorageError> {
    let sql = format!("{} WHERE {} = ?1", R::SELECT, R::KEY_COLUMN);
    let record = conn
        .prepare_cached(&sql)?
        .query_row([key], |row| R::from_row(row))
        .optional()?;
    Ok(record)
}

/// Up to `n` distinct records, sampled uniformly across the whole table.
pub fn random<R: CachedRecord>(conn: &Connection, n: usize) -> Result<Vec<R>, StorageError> {
    let sql = format!("{} ORDER BY RANDOM() LIMIT ?1", R::SELECT);
    let limit = i64::try_from(n).unwrap_or(i64::MAX);
    let records = conn
        .prepare_cached(&sql)?
        .query_map([limit], |row| R::from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn exists<R: CachedRecord>(conn: &Connection, key: &str) -> Result<bool, StorageError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?1",
        R::KIND.table(),
        R::KEY_COLUMN
    );
    let found = conn
        .prepare_cached(&sql)?
        .query_row([key], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub fn count(conn: &Connection, kind: RecordKind) -> Result<usize, StorageError> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

pub fn clear(conn: &Connection, kind: RecordKind) -> Result<usize, StorageError> {
    let sql = format!("DELETE FROM {}", kind.table());
    Ok(conn.execute(&sql, [])?)
}

/// Check for an existing row, then upsert. Run inside a transaction so the
/// classification matches what was written.
pub fn upsert_one<R: CachedRecord>(
    conn: &Connection,
    draft: &R::Draft,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, StorageError> {
    let existed = exists::<R>(conn, R::draft_key(draft))?;
    R::upsert(conn, draft, now)?;
    Ok(if existed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

pub fn upsert_many<R: CachedRecord>(
    conn: &Connection,
    drafts: &[R::Draft],
    now: DateTime<Utc>,
) -> Result<UpsertCounts, StorageError> {
    let mut counts = UpsertCounts::default();
    for draft in drafts {
        counts.record(upsert_one::<R>(conn, draft, now)?);
    }
    Ok(counts)
}

/// Snapshot-replace: drop every row of the kind, then write `drafts`.
/// Returns the number of rows in the table afterwards.
pub fn replace_all<R: CachedRecord>(
    conn: &Connection,
    drafts: &[R::Draft],
    now: DateTime<Utc>,
) -> Result<usize, StorageError> {
    clear(conn, R::KIND)?;
    for draft in drafts {
        R::upsert(conn, draft, now)?;
    }
    count(conn, R::KIND)
}

/// Newest `cached_at` across the words table.
pub fn words_last_cached(conn: &Connection) -> Result<Option<DateTime<Utc>>, StorageError> {
    let last: Option<DateTime<Utc>> =
        conn.query_row("SELECT MAX(cached_at) FROM words", [], |row| row.get(0))?;
    Ok(last)
}
