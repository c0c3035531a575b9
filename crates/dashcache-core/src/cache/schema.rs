//! Versioned schema for the SQLite store.
//!
//! The version lives in `PRAGMA user_version`. Each step only adds tables or
//! indexes; existing tables are never altered, so any older database can be
//! brought forward in place.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StorageError;

/// Latest schema version this build knows how to create.
pub const SCHEMA_VERSION: i64 = 2;

/// Version 1: the record tables and the sync metadata table.
const V1_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS words (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        word TEXT NOT NULL UNIQUE,
        definition TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        cached_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS quotations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL UNIQUE,
        author TEXT,
        source TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        priority INTEGER NOT NULL DEFAULT 1,
        url TEXT,
        due_date TEXT,
        due_string TEXT,
        project TEXT,
        synced_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sync_metadata (
        table_name TEXT PRIMARY KEY,
        last_sync TEXT NOT NULL,
        record_count INTEGER NOT NULL DEFAULT 0
    );
";

/// Version 2: secondary orderings used by the read paths.
const V2_ORDERING_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_words_created_at ON words(created_at);
    CREATE INDEX IF NOT EXISTS idx_quotations_created_at ON quotations(created_at);
    CREATE INDEX IF NOT EXISTS idx_tasks_due_priority ON tasks(due_date, priority);
";

const MIGRATIONS: &[(i64, &str)] = &[(1, V1_TABLES), (2, V2_ORDERING_INDEXES)];

pub fn current_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &mut Connection) -> Result<i64, StorageError> {
    migrate_to(conn, SCHEMA_VERSION)
}

/// Apply every step above the current version up to and including `target`.
/// Each step commits together with its version bump.
pub fn migrate_to(conn: &mut Connection, target: i64) -> Result<i64, StorageError> {
    let version = current_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    for &(step, sql) in MIGRATIONS {
        if step <= version || step > target {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| StorageError::Migration(format!("step {}: {}", step, e)))?;
        tx.pragma_update(None, "user_version", step)?;
        tx.commit()?;
        info!(version = step, "Applied schema migration");
    }

    let version = current_version(conn)?;
    debug!(version, "Schema up to date");
    Ok(version)
}
