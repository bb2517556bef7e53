// Jikan API extractor

use crate::config::JikanConfig;
use crate::error::{EtlError, Result};
use crate::extract::models::{JikanAnime, SearchResponse};
use crate::extract::{RateLimiter, RetryPolicy};
use crate::jobs::{JobDefinition, ANIME_SEARCH_ENDPOINT};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait applied on HTTP 429 when the response has no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Why pagination ended for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The API reported no further page
    LastPage,
    /// The job's `max_pages` was reached
    PageCap,
    /// A page body did not match the response schema
    ParseFailure,
    /// A page request still failed after retries, or failed terminally
    RequestFailure,
}

impl StopReason {
    /// Whether pagination ended before the dataset was exhausted
    pub fn is_degraded(self) -> bool {
        matches!(self, StopReason::ParseFailure | StopReason::RequestFailure)
    }
}

/// Everything collected for one job, in page order
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub items: Vec<JikanAnime>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
}

/// Paginated, rate-limited, retrying client for the Jikan API
pub struct JikanExtractor {
    client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl JikanExtractor {
    /// Create an extractor with its own rate limiter
    pub fn new(config: &JikanConfig) -> Result<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_delay));
        Self::with_rate_limiter(config, rate_limiter)
    }

    /// Create an extractor that spaces its requests through a shared limiter
    pub fn with_rate_limiter(config: &JikanConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            retry: config.retry,
        })
    }

    /// Fetch every page of a job.
    ///
    /// Request and parse failures end pagination and return what was already
    /// collected; only an unsupported endpoint is reported as an error.
    pub async fn fetch(&self, job: &JobDefinition) -> Result<ExtractOutcome> {
        if job.endpoint != ANIME_SEARCH_ENDPOINT {
            return Err(EtlError::UnsupportedEndpoint(job.endpoint.clone()));
        }

        Ok(self.fetch_anime_search(job).await)
    }

    async fn fetch_anime_search(&self, job: &JobDefinition) -> ExtractOutcome {
        let url = format!("{}{}", self.base_url, job.endpoint);
        let mut items = Vec::new();
        let mut pages_fetched = 0;
        let mut page = 1;

        let stop_reason = loop {
            let query = job.query_for_page(page);

            let body = match self.request_with_retry(&url, &query).await {
                Ok(body) => body,
                Err(e) => {
                    error!(job_name = %job.name, page, error = %e, "Page request failed, stopping pagination");
                    break StopReason::RequestFailure;
                },
            };

            let response: SearchResponse = match serde_json::from_str(&body) {
                Ok(response) => response,
                Err(e) => {
                    error!(job_name = %job.name, page, error = %e, "Failed to parse Jikan response");
                    break StopReason::ParseFailure;
                },
            };

            pages_fetched += 1;
            let page_count = response.data.len();
            items.extend(response.data);

            info!(
                job_name = %job.name,
                page,
                anime_count = page_count,
                total_count = items.len(),
                has_next = response.pagination.has_next_page,
                "Fetched anime page"
            );

            if !response.pagination.has_next_page {
                break StopReason::LastPage;
            }
            if job.max_pages.is_some_and(|max| page >= max) {
                info!(job_name = %job.name, max_pages = page, "Reached max pages limit");
                break StopReason::PageCap;
            }

            page += 1;
        };

        ExtractOutcome {
            items,
            pages_fetched,
            stop_reason,
        }
    }

    async fn request_with_retry(&self, url: &str, query: &[(String, String)]) -> Result<String> {
        self.retry
            .run(url, |attempt| async move {
                debug!(url, attempt, "Making Jikan API request");
                self.request_once(url, query).await
            })
            .await
    }

    /// One rate-limited GET, classified by status
    async fn request_once(&self, url: &str, query: &[(String, String)]) -> Result<String> {
        self.rate_limiter.wait().await;

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_from(response.headers());

            warn!(url, retry_after_secs = retry_after.as_secs(), "Rate limited by Jikan API");
            tokio::time::sleep(retry_after).await;
            return Err(EtlError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(EtlError::ServerStatus {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(EtlError::ClientStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "Jikan API request successful");

        Ok(body)
    }

    /// Single rate-limited request to the API root, no retries
    pub async fn ping(&self) -> Result<()> {
        self.rate_limiter.wait().await;

        let status = self.client.get(&self.base_url).send().await?.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(EtlError::ServerStatus {
                status: status.as_u16(),
            })
        } else {
            Err(EtlError::ClientStatus {
                status: status.as_u16(),
            })
        }
    }
}

/// Wait requested by a 429 response; whole seconds only, else the default
fn retry_after_from(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
