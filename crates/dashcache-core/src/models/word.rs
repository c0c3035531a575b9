use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A word as normalized from the word-of-the-day sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWord {
    pub word: String,
    pub definition: Option<String>,
}

impl NewWord {
    pub fn new(word: impl Into<String>, definition: Option<&str>) -> Self {
        Self {
            word: word.into(),
            definition: definition.map(str::to_string),
        }
    }
}

/// A cached word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub word: String,
    pub definition: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

impl Word {
    /// Build an unstored word, stamping every timestamp with `now`.
    pub fn from_new(new: NewWord, now: DateTime<Utc>) -> Self {
        Self {
            word: new.word,
            definition: new.definition,
            created_at: now,
            updated_at: now,
            cached_at: now,
        }
    }
}
