//! Fetch types and traits
//!
//! Defines the page source abstraction and the configuration of the HTTP
//! implementation.

use crate::error::{Error, Result};
use crate::types::{BackoffType, Cursor, PageResult, QueryKey};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Source of pages for a paginated list
///
/// Calling `fetch` again with the same cursor and key must be safe.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    /// Fetch the page at `cursor` of the list identified by `query`
    async fn fetch(&self, cursor: Cursor, query: &QueryKey) -> Result<PageResult<T>>;
}

// ============================================================================
// Response Layout
// ============================================================================

/// Where the page fields live in a JSON response body
///
/// Paths are dotted object paths, optionally prefixed with `$.`. The
/// defaults match the common `{ content, number, last }` page envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    /// Path to the array of items
    #[serde(default = "default_items_path")]
    pub items_path: String,

    /// Path to the boolean "last page" flag
    #[serde(default = "default_last_path")]
    pub last_path: String,

    /// Path to the page number; when absent the requested cursor is used
    #[serde(default = "default_number_path")]
    pub number_path: Option<String>,
}

fn default_items_path() -> String {
    "content".to_string()
}

fn default_last_path() -> String {
    "last".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_number_path() -> Option<String> {
    Some("number".to_string())
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            items_path: default_items_path(),
            last_path: default_last_path(),
            number_path: default_number_path(),
        }
    }
}

impl PageLayout {
    /// Build a page out of a response body
    pub fn extract<T: DeserializeOwned>(
        &self,
        body: &Value,
        requested: Cursor,
    ) -> Result<PageResult<T>> {
        let items = lookup(body, &self.items_path)
            .filter(|v| v.is_array())
            .ok_or_else(|| {
                Error::decode(format!("no item array at '{}'", self.items_path))
            })?;
        let items: Vec<T> = serde_json::from_value(items.clone())
            .map_err(|e| Error::decode(format!("items at '{}': {e}", self.items_path)))?;

        let is_last = lookup(body, &self.last_path)
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::decode(format!("no boolean at '{}'", self.last_path)))?;

        let number = match &self.number_path {
            Some(path) => match lookup(body, path) {
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| Error::decode(format!("'{path}' is not a page number")))?,
                None => requested,
            },
            None => requested,
        };

        Ok(PageResult::new(number, items, is_last))
    }
}

/// Follow a dotted path into a JSON value
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    path.split('.')
        .try_fold(value, |current, part| match current {
            Value::Object(map) => map.get(part),
            _ => None,
        })
}

// ============================================================================
// HTTP Fetcher Config
// ============================================================================

/// Configuration for [`HttpPageFetcher`](super::HttpPageFetcher)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpFetcherConfig {
    /// Endpoint returning one page per request
    pub url: String,

    /// Query parameter carrying the cursor
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Query parameter carrying the page size
    #[serde(default)]
    pub size_param: Option<String>,

    /// Page size sent with `size_param`
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Names for the numeric query variables, by position; variables
    /// without a name are sent as repeated `variables`
    #[serde(default)]
    pub variable_params: Vec<String>,

    /// Query parameter carrying the first string variable
    #[serde(default = "default_content_param")]
    pub content_param: Option<String>,

    /// Response layout
    #[serde(default)]
    pub layout: PageLayout,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of retries for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff strategy between retries
    #[serde(default)]
    pub backoff: BackoffType,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Request rate cap
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

fn default_page_param() -> String {
    "page".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_content_param() -> Option<String> {
    Some("content".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl HttpFetcherConfig {
    /// Create a config for `url` with defaults everywhere else
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_param: default_page_param(),
            size_param: None,
            page_size: None,
            variable_params: Vec::new(),
            content_param: default_content_param(),
            layout: PageLayout::default(),
            headers: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff: BackoffType::default(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            requests_per_second: None,
        }
    }

    /// Send the page size as `param`
    #[must_use]
    pub fn page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.size_param = Some(param.into());
        self.page_size = Some(size);
        self
    }

    /// Name the numeric variables, by position
    #[must_use]
    pub fn variable_params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.variable_params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set retry behaviour
    #[must_use]
    pub fn retries(mut self, max_retries: u32, backoff: BackoffType, initial: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self.initial_backoff_ms = initial.as_millis() as u64;
        self
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::invalid_value("fetcher.url", "cannot be empty"));
        }
        url::Url::parse(&self.url)?;

        if self.page_param.trim().is_empty() {
            return Err(Error::invalid_value("fetcher.page_param", "cannot be empty"));
        }

        match (&self.size_param, self.page_size) {
            (Some(_), None) => {
                return Err(Error::invalid_value(
                    "fetcher.page_size",
                    "required when size_param is set",
                ))
            }
            (_, Some(0)) => {
                return Err(Error::invalid_value(
                    "fetcher.page_size",
                    "must be greater than zero",
                ))
            }
            _ => {}
        }

        if self.timeout_secs == 0 {
            return Err(Error::invalid_value(
                "fetcher.timeout_secs",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}
