use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The three record kinds the cache knows how to store and reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Word,
    Quotation,
    Task,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Word, RecordKind::Quotation, RecordKind::Task];

    /// Table holding this kind. Also the key of its sync metadata row.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Word => "words",
            RecordKind::Quotation => "quotations",
            RecordKind::Task => "tasks",
        }
    }

    /// Whether reconciliation replaces the whole table instead of merging.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, RecordKind::Task)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for RecordKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "word" | "words" => Ok(RecordKind::Word),
            "quotation" | "quotations" => Ok(RecordKind::Quotation),
            "task" | "tasks" | "todoist_tasks" => Ok(RecordKind::Task),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!("words".parse::<RecordKind>().unwrap(), RecordKind::Word);
        assert_eq!("Quotation".parse::<RecordKind>().unwrap(), RecordKind::Quotation);
        assert_eq!("todoist_tasks".parse::<RecordKind>().unwrap(), RecordKind::Task);
        assert!("weather".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_only_tasks_are_snapshots() {
        let snapshots: Vec<_> = RecordKind::ALL.iter().filter(|k| k.is_snapshot()).collect();
        assert_eq!(snapshots, vec![&RecordKind::Task]);
    }
}
