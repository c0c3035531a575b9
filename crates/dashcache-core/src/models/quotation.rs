use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A quotation as normalized from the quotations sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuotation {
    pub text: String,
    pub author: Option<String>,
    pub source: Option<String>,
}

impl NewQuotation {
    pub fn new(text: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            text: text.into(),
            author: author.map(str::to_string),
            source: None,
        }
    }
}

/// A cached quotation.
///
/// `text` is the identity used for de-duplication. `id` is the storage
/// surrogate and is absent for quotations served straight from the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub text: String,
    pub author: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn from_new(new: NewQuotation, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            text: new.text,
            author: new.author,
            source: new.source,
            created_at: now,
            updated_at: now,
        }
    }
}
