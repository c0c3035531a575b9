//! Data models for the cached record kinds.
//!
//! - `Word`: word-of-the-day entries keyed by the word text
//! - `Quotation`: quotations keyed by their text
//! - `Task`: task-service items keyed by the external task id
//!
//! `New*` types are the canonical shape produced by normalizing a remote
//! record; the stored types add the timestamps the store maintains.

pub mod kind;
pub mod quotation;
pub mod task;
pub mod word;

pub use kind::RecordKind;
pub use quotation::{NewQuotation, Quotation};
pub use task::{Due, Task};
pub use word::{NewWord, Word};
