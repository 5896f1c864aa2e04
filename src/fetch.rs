//! The HTTP fetch seam: a minimal trait plus stacking decorators.
//!
//! Every network read in the collection phase goes through [`Fetch`], so
//! scrapers and the date resolver can be tested against scripted fixtures
//! instead of live sites. Production composes the stack as
//! `RetryFetch<GatedFetch<HttpFetcher>>` per (country, source): retries on
//! the outside so every attempt is individually rate-gated and deadline
//! checked.

use crate::error::FetchError;
use crate::models::SourceTag;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Browser-like user agent; several of the sites refuse default client UAs.
pub const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

/// Asynchronous text-over-HTTP fetch.
///
/// Implementations return the response body as a string; non-success
/// statuses are errors, not bodies.
pub trait Fetch {
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// Direct (unkeyed) limiter, one per news source.
pub type SourceLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One rate limiter per source host, shared across all per-country fetch
/// stacks so country concurrency never multiplies the request rate seen by
/// any single site.
pub struct SourceGates {
    gates: HashMap<SourceTag, Arc<SourceLimiter>>,
}

impl SourceGates {
    /// Build gates that allow one request per `interval` per source.
    pub fn new(interval: Duration) -> Self {
        let quota = Quota::with_period(interval).expect("rate-limit interval must be non-zero");
        let gates = SourceTag::ALL
            .into_iter()
            .map(|tag| (tag, Arc::new(RateLimiter::direct(quota))))
            .collect();
        Self { gates }
    }

    pub fn gate(&self, source: SourceTag) -> Arc<SourceLimiter> {
        Arc::clone(&self.gates[&source])
    }
}

/// Real fetcher backed by a shared [`reqwest::Client`].
///
/// Sends a browser-like header set; a 406 response gets one same-call retry
/// with a minimal header set, which some CDN fronts accept when the full
/// set trips their content negotiation.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }

    fn minimal_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut response = self
            .client
            .get(url)
            .headers(Self::browser_headers())
            .send()
            .await?;

        if response.status().as_u16() == 406 {
            debug!(%url, "406 with browser headers; retrying with minimal headers");
            response = self
                .client
                .get(url)
                .headers(Self::minimal_headers())
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Decorator that waits on the source's rate gate and enforces the run
/// deadline before delegating.
pub struct GatedFetch<T> {
    inner: T,
    gate: Arc<SourceLimiter>,
    deadline: Option<Instant>,
}

impl<T> GatedFetch<T> {
    pub fn new(inner: T, gate: Arc<SourceLimiter>, deadline: Option<Instant>) -> Self {
        Self {
            inner,
            gate,
            deadline,
        }
    }
}

impl<T> Fetch for GatedFetch<T>
where
    T: Fetch,
{
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(FetchError::Cancelled);
            }
        }
        self.gate.until_ready().await;
        self.inner.get(url).await
    }
}

/// Decorator that retries transient failures with exponential backoff.
///
/// Attempts are capped, delays double from `base_delay` up to `max_delay`,
/// and a 0-250ms jitter is added so parallel workers don't thunder in sync.
/// Non-retryable errors (4xx other than 429, cancellation) return
/// immediately.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, 3, Duration::from_millis(500), Duration::from_secs(10))
    }

    pub fn with_policy(
        inner: T,
        max_attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= self.max_attempts {
                        error!(%url, attempts = attempt, error = %e, "Retries exhausted");
                        return Err(e);
                    }
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);
                    warn!(
                        %url,
                        attempt,
                        max = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
