//! Extraction: turning fetched content into candidate records.
//!
//! A [`SourceExtractor`] is a pure function of its input: no network, no
//! cache, no panics. Content it cannot understand yields an empty `Vec`,
//! which is not an error.
//!
//! Two declarative implementations ship with the crate and are built from a
//! source's [`ExtractorSpec`]:
//! - [`JsonApiExtractor`] maps JSON pointers onto record fields,
//! - [`PatternExtractor`] runs a ranked cascade of regex strategies.

pub mod json_api;
pub mod pattern;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use json_api::{JsonApiExtractor, JsonExtractorSpec};
pub use pattern::{PatternExtractor, PatternExtractorSpec, PatternStrategy};

use crate::types::{CandidateRecord, HarvestError, HarvestResult};

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    /// Source name, stamped onto every record.
    pub source: &'a str,
    /// 1-based page number.
    pub page: u32,
    /// URL the content was fetched from.
    pub url: &'a str,
}

/// Capability turning raw content of one source into candidate records.
pub trait SourceExtractor: Send + Sync {
    fn extract(&self, content: &str, ctx: &ExtractContext<'_>) -> Vec<CandidateRecord>;
}

/// Declarative extractor configuration carried by a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    Json(JsonExtractorSpec),
    Pattern(PatternExtractorSpec),
}

impl ExtractorSpec {
    /// Build the extractor, validating pointers and compiling patterns.
    pub fn build(&self) -> HarvestResult<Arc<dyn SourceExtractor>> {
        Ok(match self {
            Self::Json(spec) => Arc::new(JsonApiExtractor::new(spec.clone())?),
            Self::Pattern(spec) => Arc::new(PatternExtractor::new(spec)?),
        })
    }
}

/// Record fields a declarative extractor can fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordField {
    Name,
    Address,
    Location,
    Industry,
    Phone,
    Website,
    Description,
    Employees,
    Capital,
    Established,
    Listed,
    Extra(String),
}

impl RecordField {
    pub(crate) fn parse(field: &str) -> HarvestResult<Self> {
        Ok(match field {
            "name" => Self::Name,
            "address" => Self::Address,
            "location" | "prefecture" => Self::Location,
            "industry" => Self::Industry,
            "phone" => Self::Phone,
            "website" => Self::Website,
            "description" => Self::Description,
            "employees" | "employee_count" => Self::Employees,
            "capital" => Self::Capital,
            "established" | "established_date" => Self::Established,
            "listed" | "is_listed" => Self::Listed,
            other => match other.strip_prefix("extra.") {
                Some(key) if !key.is_empty() => Self::Extra(key.to_string()),
                _ => {
                    return Err(HarvestError::Config(format!(
                        "unknown record field '{other}'"
                    )))
                }
            },
        })
    }

    /// Write a cleaned value into the record. Empty values are ignored.
    pub(crate) fn assign(&self, record: &mut CandidateRecord, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let text = Some(value.to_string());
        match self {
            Self::Name => record.name = value.to_string(),
            Self::Address => record.address = text,
            Self::Location => record.location = text,
            Self::Industry => record.industry = text,
            Self::Phone => record.phone = text,
            Self::Website => record.website = text,
            Self::Description => record.description = text,
            Self::Employees => record.employee_count = parse_count(value),
            Self::Capital => record.capital = text,
            Self::Established => record.established_date = text,
            Self::Listed => record.is_listed = parse_flag(value),
            Self::Extra(key) => {
                record.extra.insert(key.clone(), value.to_string());
            }
        }
    }
}

/// Digits of a loosely formatted count: `約1,200名` → 1200.
pub(crate) fn parse_count(value: &str) -> Option<u32> {
    let digits: String = value
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - 0xFEE0),
            _ => None,
        })
        .collect();
    digits.parse().ok()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "listed" | "上場" => Some(true),
        "false" | "0" | "no" | "unlisted" | "非上場" => Some(false),
        _ => None,
    }
}
