//! Page cache: fetched content keyed by URL with freshness tracking.
//!
//! Entries are never evicted on read: a stale entry still supplies the
//! conditional-request metadata (`Last-Modified` / `ETag`) for the next
//! network call, and its content is reused on a 304 response.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A cached copy of one fetched URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub url: String,
    pub content: String,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    /// When the content was last confirmed against the origin.
    pub last_checked_at: DateTime<Utc>,
}

impl CachedPage {
    /// Time since the content was last confirmed.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.last_checked_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the page can be served without touching the network.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// URL-keyed page cache owned by a single fetcher.
///
/// Reads return copies so callers never hold the lock.
#[derive(Debug, Default)]
pub struct PageCache {
    entries: Mutex<HashMap<String, CachedPage>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedPage>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("page cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Get the cached page for a URL, fresh or not.
    pub fn get(&self, url: &str) -> Option<CachedPage> {
        self.lock().get(url).cloned()
    }

    /// Get the cached page only when it is younger than `ttl`.
    pub fn get_fresh(&self, url: &str, ttl: Duration) -> Option<CachedPage> {
        self.get(url).filter(|page| page.is_fresh(ttl))
    }

    /// Store or overwrite the entry for `page.url`.
    pub fn put(&self, page: CachedPage) {
        self.lock().insert(page.url.clone(), page);
    }

    /// Mark an entry as confirmed now (after a 304) and return it.
    pub fn touch(&self, url: &str) -> Option<CachedPage> {
        let mut entries = self.lock();
        let page = entries.get_mut(url)?;
        page.last_checked_at = Utc::now();
        Some(page.clone())
    }

    /// Remove one entry.
    pub fn invalidate(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove entries older than `ttl`, returning how many were dropped.
    pub fn cleanup_expired(&self, ttl: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, page| page.is_fresh(ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, checked: DateTime<Utc>) -> CachedPage {
        CachedPage {
            url: url.to_string(),
            content: format!("body of {url}"),
            last_modified: None,
            etag: Some("\"v1\"".to_string()),
            last_checked_at: checked,
        }
    }

    #[test]
    fn test_put_and_get() {
        let cache = PageCache::new();
        cache.put(page("https://a.test/", Utc::now()));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("https://a.test/").unwrap().content,
            "body of https://a.test/"
        );
        assert!(cache.get("https://b.test/").is_none());
    }

    #[test]
    fn test_freshness() {
        let cache = PageCache::new();
        let day = Duration::from_secs(24 * 3600);
        cache.put(page("https://fresh.test/", Utc::now()));
        cache.put(page(
            "https://stale.test/",
            Utc::now() - chrono::Duration::hours(25),
        ));

        assert!(cache.get_fresh("https://fresh.test/", day).is_some());
        assert!(cache.get_fresh("https://stale.test/", day).is_none());
        // Stale entries stay available for conditional requests.
        assert!(cache.get("https://stale.test/").is_some());
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        let cache = PageCache::new();
        cache.put(page("https://a.test/", Utc::now()));
        assert!(cache.get_fresh("https://a.test/", Duration::ZERO).is_none());
    }

    #[test]
    fn test_touch_refreshes_timestamp() {
        let cache = PageCache::new();
        let old = Utc::now() - chrono::Duration::hours(30);
        cache.put(page("https://a.test/", old));

        let touched = cache.touch("https://a.test/").unwrap();
        assert!(touched.last_checked_at > old);
        assert!(cache
            .get_fresh("https://a.test/", Duration::from_secs(3600))
            .is_some());
        assert!(cache.touch("https://missing.test/").is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = PageCache::new();
        cache.put(page("https://a.test/", Utc::now()));
        cache.put(page("https://b.test/", Utc::now() - chrono::Duration::hours(48)));

        let removed = cache.cleanup_expired(Duration::from_secs(24 * 3600));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("https://a.test/").is_some());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = PageCache::new();
        cache.put(page("https://a.test/", Utc::now()));
        cache.put(page("https://b.test/", Utc::now()));

        assert!(cache.invalidate("https://a.test/"));
        assert!(!cache.invalidate("https://a.test/"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
