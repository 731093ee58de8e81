//! Concurrent OHPM registry catalog fetcher.
//!
//! Fetches the first page to learn the page count, then fans the remaining
//! pages out across a bounded worker pool. Results are written into one slot
//! per page and reassembled in page order, so the output sequence does not
//! depend on completion order.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use ohpmatlas_shared::{AtlasError, FetchConfig, Result};

use crate::normalize::RawEntry;

/// User-Agent string for registry requests.
const USER_AGENT: &str = concat!("ohpm-atlas/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of a completed catalog fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Raw entries in page order.
    pub entries: Vec<RawEntry>,
    /// Pages actually fetched.
    pub pages_fetched: usize,
    /// Total package count reported by the registry on page 1.
    pub total_reported: u64,
    /// True when the max-pages cap cut the fetch short (completeness
    /// warning, not a failure).
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Top-level search response: `{ "body": { "rows": [...], "pages": N, "total": M } }`.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    body: Option<PageBody>,
}

/// One page of results from the search endpoint.
#[derive(Debug, Default, Deserialize)]
struct PageBody {
    #[serde(default)]
    rows: Vec<RawEntry>,
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    total: u64,
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// HTTP client for the paginated registry search API.
pub struct RegistryClient {
    config: FetchConfig,
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl RegistryClient {
    /// Create a new client with the given fetch configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AtlasError::Network(format!("failed to build HTTP client: {e}")))?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limit));

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    /// Fetch the complete catalog.
    ///
    /// Retrieves page 1 to learn the total page count, then fetches the
    /// remaining pages concurrently (bounded by `concurrency`, paced by the
    /// rate limiter). Fails if any page cannot be retrieved after retries.
    #[instrument(skip_all, fields(base_url = %self.config.base_url))]
    pub async fn fetch_all(&self) -> Result<FetchOutcome> {
        let first =
            fetch_page_with_retry(&self.client, &self.config, &self.limiter, 1).await?;

        let reported_pages = first.pages.max(1);
        let total_reported = first.total;

        let mut truncated = false;
        let mut page_count = reported_pages;
        if self.config.max_pages > 0 && page_count > self.config.max_pages {
            warn!(
                reported_pages,
                max_pages = self.config.max_pages,
                "registry reports more pages than the safety cap, truncating"
            );
            truncated = true;
            page_count = self.config.max_pages;
        }

        info!(
            total_reported,
            pages = page_count,
            concurrency = self.config.concurrency,
            rate_limit = self.config.rate_limit,
            "starting catalog fetch"
        );

        // One slot per page; tasks report (page, rows) and results are
        // reassembled by index, never in arrival order.
        let mut slots: Vec<Option<Vec<RawEntry>>> = vec![None; page_count as usize];
        slots[0] = Some(first.rows);

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));
        let mut handles = Vec::new();

        for page in 2..=page_count {
            let client = self.client.clone();
            let config = self.config.clone();
            let limiter = self.limiter.clone();
            let sem = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let body = fetch_page_with_retry(&client, &config, &limiter, page).await?;
                Ok::<(u32, Vec<RawEntry>), AtlasError>((page, body.rows))
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok((page, rows))) => {
                    debug!(page, rows = rows.len(), "page fetched");
                    slots[(page - 1) as usize] = Some(rows);
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(AtlasError::Network(format!("fetch task failed: {e}")));
                }
            }
        }

        let mut entries = Vec::with_capacity(total_reported as usize);
        let mut pages_fetched = 0;
        for slot in slots {
            if let Some(rows) = slot {
                pages_fetched += 1;
                entries.extend(rows);
            }
        }

        info!(
            entries = entries.len(),
            pages_fetched, truncated, "catalog fetch complete"
        );

        Ok(FetchOutcome {
            entries,
            pages_fetched,
            total_reported,
            truncated,
        })
    }
}

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Interval pacer shared by all fetch tasks.
///
/// Each acquire claims the next free send slot under the lock and sleeps
/// until it arrives, keeping the request rate at or under the ceiling
/// regardless of task interleaving. A ceiling of 0 disables pacing.
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<tokio::time::Instant>,
}

impl RateLimiter {
    fn new(requests_per_sec: u32) -> Self {
        let interval = if requests_per_sec == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(requests_per_sec))
        };
        Self {
            interval,
            next_slot: Mutex::new(tokio::time::Instant::now()),
        }
    }

    async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(tokio::time::Instant::now());
            *next = slot + self.interval;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

// ---------------------------------------------------------------------------
// Page fetching & retry policy
// ---------------------------------------------------------------------------

/// Per-attempt failure classification.
enum FetchError {
    /// Timeout, connection failure, 5xx, or unreadable body — retried.
    Transient(String),
    /// HTTP 429 with an optional retry-after hint — retried with the hint.
    RateLimited(Option<u64>),
    /// Non-retryable (4xx other than 429, missing body) — fails the run.
    Fatal(AtlasError),
}

/// Fetch a single page, retrying transient failures with exponential backoff.
async fn fetch_page_with_retry(
    client: &Client,
    config: &FetchConfig,
    limiter: &RateLimiter,
    page: u32,
) -> Result<PageBody> {
    let mut attempt: u32 = 0;
    loop {
        limiter.acquire().await;

        let err = match fetch_page(client, config, page).await {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        match err {
            FetchError::Fatal(e) => return Err(e),
            FetchError::Transient(msg) => {
                if attempt >= config.max_retries {
                    return Err(AtlasError::Network(format!(
                        "{msg} (gave up after {} attempts)",
                        attempt + 1
                    )));
                }
                let delay = backoff_delay(config.retry_base_ms, attempt);
                warn!(
                    page,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "transient fetch error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            FetchError::RateLimited(hint) => {
                if attempt >= config.max_retries {
                    return Err(AtlasError::RateLimited {
                        retry_after_secs: hint,
                    });
                }
                let delay = hint
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff_delay(config.retry_base_ms, attempt));
                warn!(
                    page,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "registry throttled the request, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        attempt += 1;
    }
}

/// Exponential backoff: `base × 2^attempt`, capped at 2^6.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(6)))
}

/// Issue one request for the given page and classify the outcome.
async fn fetch_page(
    client: &Client,
    config: &FetchConfig,
    page: u32,
) -> std::result::Result<PageBody, FetchError> {
    let response = client
        .get(&config.base_url)
        .query(&[
            ("condition", String::new()),
            ("pageNum", page.to_string()),
            ("pageSize", config.page_size.to_string()),
            ("sortedType", "popularity".into()),
            ("isHomePage", "false".into()),
        ])
        .send()
        .await
        .map_err(|e| FetchError::Transient(format!("page {page}: {e}")))?;

    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let hint = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(FetchError::RateLimited(hint));
    }

    if status.is_server_error() {
        return Err(FetchError::Transient(format!("page {page}: HTTP {status}")));
    }

    if !status.is_success() {
        return Err(FetchError::Fatal(AtlasError::Network(format!(
            "page {page}: HTTP {status}"
        ))));
    }

    let envelope: SearchResponse = response
        .json()
        .await
        .map_err(|e| FetchError::Transient(format!("page {page}: body read failed: {e}")))?;

    envelope.body.ok_or_else(|| {
        FetchError::Fatal(AtlasError::validation(format!(
            "page {page}: response missing `body`"
        )))
    })
}

#[cfg(test)]
mod client_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> FetchConfig {
        FetchConfig {
            base_url,
            page_size: 2,
            concurrency: 4,
            rate_limit: 0,
            max_pages: 50,
            timeout_secs: 5,
            max_retries: 2,
            retry_base_ms: 10,
        }
    }

    fn page_json(names: &[&str], pages: u32, total: u64) -> serde_json::Value {
        let rows: Vec<_> = names
            .iter()
            .map(|n| json!({"name": n, "description": format!("{n} description")}))
            .collect();
        json!({"body": {"rows": rows, "pages": pages, "total": total}})
    }

    async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(query_param("pageNum", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_all_paginates_to_completion() {
        let server = MockServer::start().await;
        mount_page(&server, 1, page_json(&["a1", "a2"], 3, 5)).await;
        mount_page(&server, 2, page_json(&["b1", "b2"], 3, 5)).await;
        mount_page(&server, 3, page_json(&["c1"], 3, 5)).await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let outcome = client.fetch_all().await.unwrap();

        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(outcome.total_reported, 5);
        assert!(!outcome.truncated);

        // Page order, not arrival order.
        let names: Vec<_> = outcome
            .entries
            .iter()
            .map(|e| e.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a1", "a2", "b1", "b2", "c1"]);
    }

    #[tokio::test]
    async fn fetch_all_single_page() {
        let server = MockServer::start().await;
        mount_page(&server, 1, page_json(&["only"], 1, 1)).await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let outcome = client.fetch_all().await.unwrap();

        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(outcome.entries.len(), 1);
    }

    #[tokio::test]
    async fn retries_transient_server_error() {
        let server = MockServer::start().await;

        // First attempt on page 1 fails with a 500, the retry succeeds.
        Mock::given(method("GET"))
            .and(query_param("pageNum", "1"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_page(&server, 1, page_json(&["after-retry"], 1, 1)).await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let outcome = client.fetch_all().await.unwrap();
        assert_eq!(outcome.entries[0].name.as_deref(), Some("after-retry"));
    }

    #[tokio::test]
    async fn exhausted_retries_escalate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let err = client.fetch_all().await.unwrap_err();
        assert!(matches!(err, AtlasError::Network(_)));
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let err = client.fetch_all().await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn honors_retry_after_on_429() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("pageNum", "1"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_page(&server, 1, page_json(&["throttled-then-ok"], 1, 1)).await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let outcome = client.fetch_all().await.unwrap();
        assert_eq!(
            outcome.entries[0].name.as_deref(),
            Some("throttled-then-ok")
        );
    }

    #[tokio::test]
    async fn max_pages_cap_truncates_with_warning() {
        let server = MockServer::start().await;
        mount_page(&server, 1, page_json(&["p1"], 10, 20)).await;
        mount_page(&server, 2, page_json(&["p2"], 10, 20)).await;

        let mut config = test_config(server.uri());
        config.max_pages = 2;

        let client = RegistryClient::new(config).unwrap();
        let outcome = client.fetch_all().await.unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.entries.len(), 2);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(100); // 10ms interval
        let start = std::time::Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        // First slot is immediate; three more are spaced 10ms apart.
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn rate_limiter_disabled_at_zero() {
        let limiter = RateLimiter::new(0);
        let start = std::time::Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
