//! Rate-limited, retrying, cache-aware page fetcher.
//!
//! Every network request the engine makes goes through [`Fetcher`]. A fetch:
//! 1. returns the cached copy without a request when it is younger than the TTL,
//! 2. otherwise waits its turn on the shared request clock,
//! 3. sends a GET carrying `If-Modified-Since` / `If-None-Match` when a
//!    stale copy exists, reusing that copy on 304,
//! 4. retries non-success responses and transport errors with a fixed delay.

pub mod cache;
pub mod throttle;

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{
    HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT,
};
use reqwest::StatusCode;

pub use cache::{CachedPage, PageCache};
pub use throttle::RequestThrottle;

use crate::types::{HarvestError, HarvestResult};

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("listing-harvest/", env!("CARGO_PKG_VERSION"));

/// Cached pages younger than this are served without a request.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fetch behaviour: retries, spacing, identity, timeouts, cache freshness.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Minimum spacing between outbound requests.
    pub min_request_interval: Duration,
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            min_request_interval: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Result of a single attempt that reached the server.
enum Attempt {
    Fetched(CachedPage),
    NotModified,
}

/// HTTP fetcher owning the request clock and the page cache.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
    cache: PageCache,
    throttle: RequestThrottle,
}

impl Fetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: FetchConfig) -> HarvestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            cache: PageCache::new(),
            throttle: RequestThrottle::new(),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Fetch a URL with the fetcher's own configuration.
    pub async fn fetch(&self, url: &str) -> HarvestResult<String> {
        self.fetch_with(url, &self.config).await
    }

    /// Fetch a URL with an explicit configuration.
    ///
    /// The request clock and cache are shared regardless of `config`.
    pub async fn fetch_with(&self, url: &str, config: &FetchConfig) -> HarvestResult<String> {
        let cached = self.cache.get(url);
        if let Some(page) = &cached {
            if page.is_fresh(config.cache_ttl) {
                tracing::debug!("cache hit for {url} (age {:?})", page.age());
                return Ok(page.content.clone());
            }
        }

        self.throttle.wait_turn(config.min_request_interval).await;

        let attempts = config.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::debug!(
                    "retrying {url} in {:?} (attempt {attempt}/{attempts})",
                    config.retry_delay
                );
                tokio::time::sleep(config.retry_delay).await;
                self.throttle.stamp().await;
            }

            match self.attempt(url, config, cached.as_ref()).await {
                Ok(Attempt::Fetched(page)) => {
                    let content = page.content.clone();
                    self.cache.put(page);
                    return Ok(content);
                }
                Ok(Attempt::NotModified) => match self.cache.touch(url) {
                    Some(page) => {
                        tracing::debug!("{url} not modified, reusing cached copy");
                        return Ok(page.content);
                    }
                    None => last_error = "304 Not Modified without a cached copy".to_string(),
                },
                Err(message) => {
                    tracing::debug!("attempt {attempt}/{attempts} for {url} failed: {message}");
                    last_error = message;
                }
            }
        }

        tracing::warn!("giving up on {url} after {attempts} attempt(s): {last_error}");
        Err(HarvestError::Fetch {
            url: url.to_string(),
            attempts,
            message: last_error,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        config: &FetchConfig,
        cached: Option<&CachedPage>,
    ) -> Result<Attempt, String> {
        let mut request = self
            .client
            .get(url)
            .timeout(config.timeout)
            .header(USER_AGENT, config.user_agent.as_str());

        if let Some(page) = cached {
            if let Some(last_modified) = &page.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
            if let Some(etag) = &page.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(Attempt::NotModified);
        }
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let last_modified = header(LAST_MODIFIED);
        let etag = header(ETAG);

        let content = response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {e}"))?;

        Ok(Attempt::Fetched(CachedPage {
            url: url.to_string(),
            content,
            last_modified,
            etag,
            last_checked_at: Utc::now(),
        }))
    }
}
