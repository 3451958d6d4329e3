//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit value (CLI flag),
//! then environment variable, then default.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::FetchConfig;
use crate::types::{HarvestError, HarvestResult};

pub const ENV_DB: &str = "LISTING_HARVEST_DB";
pub const ENV_CATALOG: &str = "LISTING_HARVEST_CATALOG";
pub const ENV_MIN_INTERVAL_MS: &str = "LISTING_HARVEST_MIN_INTERVAL_MS";
pub const ENV_MAX_RETRIES: &str = "LISTING_HARVEST_MAX_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "LISTING_HARVEST_RETRY_DELAY_MS";
pub const ENV_TIMEOUT_MS: &str = "LISTING_HARVEST_TIMEOUT_MS";
pub const ENV_USER_AGENT: &str = "LISTING_HARVEST_USER_AGENT";

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// SQLite database holding the accumulated set.
    pub db_path: PathBuf,
    /// Catalog file; `None` uses the embedded catalog.
    pub catalog_path: Option<PathBuf>,
    pub fetch: FetchConfig,
}

impl HarvestConfig {
    /// Resolve from explicit values and the process environment.
    pub fn resolve(db: Option<&str>, catalog: Option<&str>) -> HarvestResult<Self> {
        Self::resolve_with(db, catalog, |key| std::env::var(key).ok())
    }

    /// Resolve with a custom variable lookup.
    pub fn resolve_with(
        db: Option<&str>,
        catalog: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> HarvestResult<Self> {
        let db_path = match db.map(str::to_string).or_else(|| env(ENV_DB)) {
            Some(path) => PathBuf::from(path),
            None => resolve_default_db_path(&env),
        };
        let catalog_path = catalog
            .map(str::to_string)
            .or_else(|| env(ENV_CATALOG))
            .map(PathBuf::from);

        let mut fetch = FetchConfig::default();
        if let Some(ms) = parse_env::<u64>(&env, ENV_MIN_INTERVAL_MS)? {
            fetch.min_request_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env::<u32>(&env, ENV_MAX_RETRIES)? {
            fetch.max_retries = n;
        }
        if let Some(ms) = parse_env::<u64>(&env, ENV_RETRY_DELAY_MS)? {
            fetch.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>(&env, ENV_TIMEOUT_MS)? {
            fetch.timeout = Duration::from_millis(ms);
        }
        if let Some(agent) = env(ENV_USER_AGENT).filter(|a| !a.trim().is_empty()) {
            fetch.user_agent = agent;
        }

        Ok(Self {
            db_path,
            catalog_path,
            fetch,
        })
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> HarvestResult<Option<T>> {
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HarvestError::Config(format!("{key}: cannot parse '{raw}'"))),
    }
}

/// `./.listing-harvest/listings.db` when it exists, else under `$HOME`.
fn resolve_default_db_path(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let local = PathBuf::from(".listing-harvest/listings.db");
    if local.exists() {
        return local;
    }

    let home = env("HOME")
        .or_else(|| env("USERPROFILE"))
        .unwrap_or_else(|| ".".to_string());
    PathBuf::from(home)
        .join(".listing-harvest")
        .join("listings.db")
}
