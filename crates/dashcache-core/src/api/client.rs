//! HTTP fetcher for the word sheet, the quotation sheet and the task service.
//!
//! The two sheets are web-app endpoints that return a JSON array when asked
//! for everything (`all=true` / `action=getAll`) and a small random sample
//! otherwise. The task service is paginated with a cursor.

use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FetchError, RemoteFetcher};
use crate::config::Config;
use crate::models::RecordKind;

// ============================================================================
// Constants
// ============================================================================

/// Task listing endpoint of the task-management service.
const TASKS_URL: &str = "https://api.todoist.com/api/v1/tasks";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on task pages, in case the service keeps handing out cursors.
const MAX_TASK_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default, alias = "nextCursor")]
    next_cursor: Option<String>,
}

/// HTTP-backed [`RemoteFetcher`].
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    word_api_url: Option<String>,
    quotation_api_url: Option<String>,
    task_token: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher with no sources configured.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            word_api_url: None,
            quotation_api_url: None,
            task_token: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let mut fetcher = Self::new(config.request_timeout())?;
        fetcher.word_api_url = config.word_api_url.clone();
        fetcher.quotation_api_url = config.quotation_api_url.clone();
        fetcher.task_token = config.todoist_token.clone();
        Ok(fetcher)
    }

    fn source_url(&self, kind: RecordKind) -> Result<&str, FetchError> {
        let url = match kind {
            RecordKind::Word => self.word_api_url.as_deref(),
            RecordKind::Quotation => self.quotation_api_url.as_deref(),
            RecordKind::Task => Some(TASKS_URL),
        };
        url.ok_or(FetchError::NotConfigured(kind))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, FetchError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FetchError::from_status(status, &body))
        }
    }

    async fn get_json(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .get(url)
                .query(query)
                .header(header::ACCEPT, "application/json");
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        FetchError::InvalidResponse(format!("unparseable JSON from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(FetchError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn fetch_sheet(&self, kind: RecordKind, sample: bool) -> Result<Vec<Value>, FetchError> {
        let base = self.source_url(kind)?;
        let url = if sample {
            base.to_string()
        } else {
            match kind {
                RecordKind::Word => with_query(base, "all=true"),
                _ => with_query(base, "action=getAll"),
            }
        };
        debug!(%kind, sample, "Fetching from sheet");

        let payload = self.get_json(&url, None, &[]).await?;
        let batch = batch_from_payload(kind, payload, sample)?;
        debug!(%kind, count = batch.len(), "Received records from sheet");
        Ok(batch)
    }

    async fn fetch_tasks(&self) -> Result<Vec<Value>, FetchError> {
        let token = self
            .task_token
            .as_deref()
            .ok_or(FetchError::NotConfigured(RecordKind::Task))?;

        let mut tasks = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_TASK_PAGES {
            let query: Vec<(&str, &str)> = match cursor.as_deref() {
                Some(c) => vec![("cursor", c)],
                None => Vec::new(),
            };
            let payload = self.get_json(TASKS_URL, Some(token), &query).await?;
            if let Some(message) = error_indicator(&payload) {
                return Err(FetchError::Upstream(message));
            }
            let page_data: TaskPage = serde_json::from_value(payload)
                .map_err(|e| FetchError::InvalidResponse(format!("unexpected task page: {}", e)))?;

            debug!(page, count = page_data.results.len(), "Received task page");
            tasks.extend(page_data.results);

            match page_data.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tasks),
            }
        }

        warn!(pages = MAX_TASK_PAGES, "Task pagination did not terminate, using what was fetched");
        Ok(tasks)
    }
}

impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, kind: RecordKind) -> Result<Vec<Value>, FetchError> {
        match kind {
            RecordKind::Word | RecordKind::Quotation => self.fetch_sheet(kind, false).await,
            RecordKind::Task => self.fetch_tasks().await,
        }
    }

    async fn fetch_sample(&self, kind: RecordKind) -> Result<Vec<Value>, FetchError> {
        match kind {
            RecordKind::Word | RecordKind::Quotation => self.fetch_sheet(kind, true).await,
            RecordKind::Task => self.fetch_tasks().await,
        }
    }
}

/// Append a query parameter, respecting any query already on the URL.
fn with_query(url: &str, param: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, param)
}

/// The message of an explicit `{"error": ...}` payload, if present.
fn error_indicator(payload: &Value) -> Option<String> {
    let error = payload.as_object()?.get("error")?;
    if error.is_null() || error == &Value::Bool(false) {
        return None;
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

/// Interpret a sheet payload as a batch of raw records.
///
/// Arrays are the batch. Objects carrying an `error` field are upstream
/// failures. A lone object is only acceptable from sample endpoints, which
/// return a single record.
pub(crate) fn batch_from_payload(
    kind: RecordKind,
    payload: Value,
    allow_single: bool,
) -> Result<Vec<Value>, FetchError> {
    if let Some(message) = error_indicator(&payload) {
        return Err(FetchError::Upstream(message));
    }
    match payload {
        Value::Array(records) => Ok(records),
        Value::Object(_) if allow_single => Ok(vec![payload]),
        other => Err(FetchError::InvalidResponse(format!(
            "expected an array of {}, got {}",
            kind,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
