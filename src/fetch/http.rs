//! HTTP page fetcher with retry and throttling
//!
//! Requests one page per call from a JSON endpoint. The cursor and the
//! query key are mapped onto query parameters; the response body is mapped
//! onto a [`PageResult`] through a [`PageLayout`](super::PageLayout).

use super::throttle::Throttle;
use super::types::{HttpFetcherConfig, PageFetcher};
use crate::error::{Error, Result};
use crate::types::{BackoffType, Cursor, PageResult, QueryKey};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

/// Name used for numeric variables that have no configured parameter name
const UNNAMED_VARIABLE_PARAM: &str = "variables";

/// Page fetcher backed by a JSON HTTP endpoint
pub struct HttpPageFetcher<T> {
    client: Client,
    config: HttpFetcherConfig,
    throttle: Option<Throttle>,
    _items: PhantomData<fn() -> T>,
}

impl<T> HttpPageFetcher<T> {
    /// Create a fetcher from a validated config
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("infinite-pager/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let throttle = config.requests_per_second.map(Throttle::per_second);

        Ok(Self {
            client,
            config,
            throttle,
            _items: PhantomData,
        })
    }

    /// Fetcher configuration
    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    /// Query parameters for one page request
    pub fn query_params(&self, cursor: Cursor, query: &QueryKey) -> Vec<(String, String)> {
        let mut params = vec![(self.config.page_param.clone(), cursor.to_string())];

        if let (Some(param), Some(size)) = (&self.config.size_param, self.config.page_size) {
            params.push((param.clone(), size.to_string()));
        }

        for (i, value) in query.variables.iter().enumerate() {
            let name = self
                .config
                .variable_params
                .get(i)
                .map_or(UNNAMED_VARIABLE_PARAM, String::as_str);
            params.push((name.to_string(), value.to_string()));
        }

        if let (Some(param), Some(content)) = (&self.config.content_param, query.content()) {
            params.push((param.clone(), content.to_string()));
        }

        params
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let initial = Duration::from_millis(self.config.initial_backoff_ms);
        let delay = match self.config.backoff {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial * (attempt + 1),
            BackoffType::Exponential => initial * 2u32.saturating_pow(attempt),
        };

        std::cmp::min(delay, Duration::from_millis(self.config.max_backoff_ms))
    }

    /// GET one page body, retrying retryable failures
    async fn get_body(&self, params: &[(String, String)]) -> Result<Value> {
        let max_retries = self.config.max_retries;
        let mut last_error = None;
        let mut attempt = 0;

        while attempt <= max_retries {
            if let Some(ref throttle) = self.throttle {
                throttle.acquire().await;
            }

            let mut req = self.client.get(&self.config.url).query(params);
            for (key, value) in &self.config.headers {
                req = req.header(key.as_str(), value.as_str());
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() || status.is_server_error() {
                        let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                            retry_after(&response).unwrap_or_else(|| self.calculate_backoff(attempt))
                        } else {
                            self.calculate_backoff(attempt)
                        };

                        let body = response.text().await.unwrap_or_default();
                        let error = if status == StatusCode::TOO_MANY_REQUESTS {
                            Error::RateLimited {
                                retry_after_seconds: delay.as_secs(),
                            }
                        } else {
                            Error::http_status(status.as_u16(), body)
                        };

                        if !error.is_retryable() {
                            return Err(error);
                        }

                        if attempt < max_retries {
                            warn!(
                                "Page request failed with {}, attempt {}/{}, retrying in {:?}",
                                status.as_u16(),
                                attempt + 1,
                                max_retries + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        last_error = Some(error);
                        attempt += 1;
                        continue;
                    }

                    debug!("Page request succeeded: {}", self.config.url);
                    return Ok(response.json::<Value>().await?);
                }
                Err(e) => {
                    let error = if e.is_timeout() {
                        Error::Timeout {
                            timeout_ms: self.config.timeout().as_millis() as u64,
                        }
                    } else {
                        Error::Http(e)
                    };

                    if !error.is_retryable() || attempt >= max_retries {
                        return Err(error);
                    }

                    let delay = self.calculate_backoff(attempt);
                    warn!(
                        "Page request error ({error}), attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(error);
                    attempt += 1;
                }
            }
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_retries }))
    }
}

#[async_trait]
impl<T> PageFetcher<T> for HttpPageFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, cursor: Cursor, query: &QueryKey) -> Result<PageResult<T>> {
        let params = self.query_params(cursor, query);
        debug!(cursor, query = %query, "Fetching page");

        let body = self.get_body(&params).await?;
        self.config.layout.extract(&body, cursor)
    }
}

impl<T> std::fmt::Debug for HttpPageFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPageFetcher")
            .field("config", &self.config)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

/// Delay requested by a `retry-after` header
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}
