//! Core data types for sources, listing records, and errors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractorSpec;

/// How a source delivers its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// JSON HTTP API.
    Api,
    /// HTML page scraped with pattern extraction.
    Scrape,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Scrape => write!(f, "scrape"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_pages() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// One entry of the static source catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower runs sooner.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// URL template. `{page}`, `{per_page}` and `{offset}` are substituted per page.
    pub endpoint: String,
    pub extractor: ExtractorSpec,
}

impl SourceDescriptor {
    /// Create an enabled single-page source with priority 0.
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        endpoint: impl Into<String>,
        extractor: ExtractorSpec,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            priority: 0,
            max_pages: default_max_pages(),
            per_page: default_per_page(),
            endpoint: endpoint.into(),
            extractor,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_pages(mut self, max_pages: u32, per_page: u32) -> Self {
        self.max_pages = max_pages;
        self.per_page = per_page;
        self
    }

    /// Resolve the endpoint template for a 1-based page number.
    pub fn page_url(&self, page: u32) -> String {
        let offset = page.saturating_sub(1).saturating_mul(self.per_page);
        self.endpoint
            .replace("{page}", &page.to_string())
            .replace("{per_page}", &self.per_page.to_string())
            .replace("{offset}", &offset.to_string())
    }
}

/// A business record as produced by one extraction, before identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Prefecture or other coarse location.
    #[serde(default, alias = "prefecture", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capital: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_listed: Option<bool>,
    #[serde(default)]
    pub source_name: String,
    /// Source-specific attributes with no dedicated field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CandidateRecord {
    /// Create a record carrying only a name and its source.
    pub fn new(name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_name: source_name.into(),
            ..Self::default()
        }
    }
}

/// True when an optional text field holds something other than whitespace.
pub(crate) fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// A record in the durable accumulated set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedRecord {
    #[serde(flatten)]
    pub record: CandidateRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analyzed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eeat_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl AccumulatedRecord {
    /// Wrap a candidate with no analysis attached.
    pub fn new(record: CandidateRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            record,
            last_analyzed: None,
            overall_score: None,
            technical_score: None,
            eeat_score: None,
            content_score: None,
            created_at,
        }
    }

    pub fn analyzed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_analyzed = Some(at);
        self
    }

    pub fn with_overall_score(mut self, score: f64) -> Self {
        self.overall_score = Some(score);
        self
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

impl From<CandidateRecord> for AccumulatedRecord {
    fn from(record: CandidateRecord) -> Self {
        Self::new(record, Utc::now())
    }
}

/// Errors that can occur in the harvesting engine.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Fetch failed for {url} after {attempts} attempt(s): {message}")]
    Fetch {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for HarvestError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
