use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Due information as reported by the task service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    /// `YYYY-MM-DD`, possibly followed by a time component.
    pub date: String,
    /// Human-readable form, e.g. "every monday".
    pub string: Option<String>,
}

/// A task from the task-management service.
///
/// Tasks are stored as a point-in-time snapshot, so the same type is used
/// before and after storage; `synced_at` is filled in by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
    pub url: Option<String>,
    pub due: Option<Due>,
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

/// Lowest priority on the task service's 1-4 scale.
fn default_priority() -> i64 {
    1
}

impl Task {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            completed: false,
            priority: default_priority(),
            url: None,
            due: None,
            project: None,
            synced_at: None,
        }
    }

    pub fn with_due(mut self, date: &str) -> Self {
        self.due = Some(Due {
            date: date.to_string(),
            string: None,
        });
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Calendar date the task is due, if it has one that parses.
    pub fn due_date(&self) -> Option<NaiveDate> {
        let due = self.due.as_ref()?;
        let day = due.date.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}
