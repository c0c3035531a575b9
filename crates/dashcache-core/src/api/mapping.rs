//! Field mapping from remote payloads to the canonical record types.
//!
//! Each remote source names its fields differently (the quotations sheet says
//! `quotation`/`who`, older exports say `text`/`author`). Rather than chains of
//! fallbacks at every use site, each source gets one table listing, for every
//! canonical field, the remote names to try in order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ValidationError;
use crate::models::{Due, NewQuotation, NewWord, Quotation, RecordKind, Task, Word};

/// One canonical field and the remote names it may arrive under.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub field: &'static str,
    pub remote: &'static [&'static str],
}

pub type FieldMap = &'static [FieldMapping];

pub const WORD_SHEET_FIELDS: FieldMap = &[
    FieldMapping { field: "word", remote: &["word"] },
    FieldMapping { field: "definition", remote: &["definition"] },
];

pub const QUOTATION_SHEET_FIELDS: FieldMap = &[
    FieldMapping { field: "text", remote: &["quotation", "text"] },
    FieldMapping { field: "author", remote: &["who", "author"] },
    FieldMapping { field: "source", remote: &["source"] },
];

pub const TASK_SERVICE_FIELDS: FieldMap = &[
    FieldMapping { field: "id", remote: &["id"] },
    FieldMapping { field: "content", remote: &["content"] },
    FieldMapping { field: "completed", remote: &["checked", "completed", "is_completed"] },
    FieldMapping { field: "priority", remote: &["priority"] },
    FieldMapping { field: "url", remote: &["url"] },
    FieldMapping { field: "due", remote: &["due"] },
    FieldMapping { field: "project", remote: &["project", "project_id"] },
];

/// The first non-null remote value for a canonical field.
fn lookup<'a>(map: FieldMap, raw: &'a Value, field: &str) -> Option<&'a Value> {
    let mapping = map.iter().find(|m| m.field == field)?;
    mapping
        .remote
        .iter()
        .filter_map(|name| raw.get(name))
        .find(|value| !value.is_null())
}

/// A trimmed, non-empty string. Numbers are accepted and rendered, since
/// ids and sheet cells are not always typed as strings.
fn text(map: FieldMap, raw: &Value, field: &str) -> Option<String> {
    let value = match lookup(map, raw, field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn required(
    map: FieldMap,
    raw: &Value,
    kind: RecordKind,
    field: &'static str,
) -> Result<String, ValidationError> {
    text(map, raw, field).ok_or(ValidationError::MissingField { kind, field })
}

pub fn normalize_word(raw: &Value) -> Result<NewWord, ValidationError> {
    let map = WORD_SHEET_FIELDS;
    Ok(NewWord {
        word: required(map, raw, RecordKind::Word, "word")?,
        definition: text(map, raw, "definition"),
    })
}

pub fn normalize_quotation(raw: &Value) -> Result<NewQuotation, ValidationError> {
    let map = QUOTATION_SHEET_FIELDS;
    Ok(NewQuotation {
        text: required(map, raw, RecordKind::Quotation, "text")?,
        author: text(map, raw, "author"),
        source: text(map, raw, "source"),
    })
}

pub fn normalize_task(raw: &Value) -> Result<Task, ValidationError> {
    let map = TASK_SERVICE_FIELDS;
    let kind = RecordKind::Task;

    let completed = match lookup(map, raw, "completed") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(other) => {
            return Err(ValidationError::InvalidField {
                kind,
                field: "completed",
                reason: format!("expected boolean, got {other}"),
            })
        }
    };

    let priority = match lookup(map, raw, "priority") {
        None => 1,
        Some(value) => value.as_i64().ok_or_else(|| ValidationError::InvalidField {
            kind,
            field: "priority",
            reason: format!("expected integer, got {value}"),
        })?,
    };

    let due = lookup(map, raw, "due").and_then(|due| {
        let date = due.get("date")?.as_str()?.trim();
        if date.is_empty() {
            return None;
        }
        Some(Due {
            date: date.to_string(),
            string: due
                .get("string")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    });

    Ok(Task {
        id: required(map, raw, kind, "id")?,
        content: required(map, raw, kind, "content")?,
        completed,
        priority,
        url: text(map, raw, "url"),
        due,
        project: text(map, raw, "project"),
        synced_at: None,
    })
}

/// Normalize a batch, logging and counting records that fail validation.
pub fn normalize_batch<T>(
    kind: RecordKind,
    batch: &[Value],
    normalize: impl Fn(&Value) -> Result<T, ValidationError>,
) -> (Vec<T>, usize) {
    let mut records = Vec::with_capacity(batch.len());
    let mut skipped = 0;
    for (index, raw) in batch.iter().enumerate() {
        match normalize(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(kind = %kind, index, error = %e, "Skipping invalid remote record");
            }
        }
    }
    (records, skipped)
}

/// Normalized records of one kind, as served without touching the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Records {
    Words(Vec<Word>),
    Quotations(Vec<Quotation>),
    Tasks(Vec<Task>),
}

impl Records {
    /// Normalize a raw batch into stamped, unstored records.
    pub fn from_batch(kind: RecordKind, batch: &[Value], now: DateTime<Utc>) -> Self {
        match kind {
            RecordKind::Word => {
                let (words, _) = normalize_batch(kind, batch, normalize_word);
                Records::Words(
                    words
                        .into_iter()
                        .map(|w| Word::from_new(w, now))
                        .collect(),
                )
            }
            RecordKind::Quotation => {
                let (quotations, _) = normalize_batch(kind, batch, normalize_quotation);
                Records::Quotations(
                    quotations
                        .into_iter()
                        .map(|q| Quotation::from_new(q, now))
                        .collect(),
                )
            }
            RecordKind::Task => {
                let (tasks, _) = normalize_batch(kind, batch, normalize_task);
                Records::Tasks(
                    tasks
                        .into_iter()
                        .map(|t| Task {
                            synced_at: Some(now),
                            ..t
                        })
                        .collect(),
                )
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Records::Words(v) => v.len(),
            Records::Quotations(v) => v.len(),
            Records::Tasks(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_words(self) -> Vec<Word> {
        match self {
            Records::Words(words) => words,
            _ => Vec::new(),
        }
    }

    pub fn into_quotations(self) -> Vec<Quotation> {
        match self {
            Records::Quotations(quotations) => quotations,
            _ => Vec::new(),
        }
    }

    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            Records::Tasks(tasks) => tasks,
            _ => Vec::new(),
        }
    }
}
