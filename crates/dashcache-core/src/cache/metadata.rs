//! Sync metadata: one row per record kind recording when it was last
//! reconciled and how many rows the table held afterwards.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::models::RecordKind;

/// Consider a kind stale an hour after its last sync.
const SYNC_STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub kind: RecordKind,
    pub last_sync: DateTime<Utc>,
    pub record_count: usize,
}

impl SyncInfo {
    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.last_sync).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > SYNC_STALE_MINUTES
    }
}

/// Overwrite the metadata row for `kind`, creating it if absent.
pub fn record_sync(
    conn: &Connection,
    kind: RecordKind,
    record_count: usize,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO sync_metadata (table_name, last_sync, record_count)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
            last_sync = excluded.last_sync,
            record_count = excluded.record_count",
    )?
    .execute(params![kind.table(), now, record_count as i64])?;
    Ok(())
}

pub fn sync_info(conn: &Connection, kind: RecordKind) -> Result<Option<SyncInfo>, StorageError> {
    let info = conn
        .prepare_cached("SELECT last_sync, record_count FROM sync_metadata WHERE table_name = ?1")?
        .query_row([kind.table()], |row| {
            let record_count: i64 = row.get(1)?;
            Ok(SyncInfo {
                kind,
                last_sync: row.get(0)?,
                record_count: record_count.max(0) as usize,
            })
        })
        .optional()?;
    Ok(info)
}
