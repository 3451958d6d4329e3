//! Static source catalog.
//!
//! The catalog is loaded once (embedded default or a JSON file) and
//! validated up front, so a bad pattern or a duplicate name fails at load
//! rather than halfway through a run. Only `enabled` changes afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult, SourceDescriptor};

const DEFAULT_CATALOG: &str = include_str!("default_sources.json");

/// Ordered collection of source descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    sources: Vec<SourceDescriptor>,
}

impl Catalog {
    /// Build a catalog from descriptors, validating them.
    pub fn new(sources: Vec<SourceDescriptor>) -> HarvestResult<Self> {
        let catalog = Self { sources };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> HarvestResult<Self> {
        Self::from_json(DEFAULT_CATALOG)
    }

    /// Parse `{"sources": [...]}`.
    pub fn from_json(json: &str) -> HarvestResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| HarvestError::Config(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> HarvestResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            "loaded {} source(s) from {}",
            catalog.sources.len(),
            path.display()
        );
        Ok(catalog)
    }

    fn validate(&self) -> HarvestResult<()> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(HarvestError::Config("source with empty name".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(HarvestError::Config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if source.max_pages == 0 {
                return Err(HarvestError::Config(format!(
                    "source '{}': max_pages must be at least 1",
                    source.name
                )));
            }
            if source.endpoint.trim().is_empty() {
                return Err(HarvestError::Config(format!(
                    "source '{}': endpoint is empty",
                    source.name
                )));
            }
            source.extractor.build().map_err(|e| {
                HarvestError::Config(format!("source '{}': {e}", source.name))
            })?;
        }
        Ok(())
    }

    /// Sources sorted by ascending priority; ties keep catalog order.
    pub fn list_sources(&self) -> Vec<SourceDescriptor> {
        let mut sources = self.sources.clone();
        sources.sort_by_key(|s| s.priority);
        sources
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Enable or disable a source by name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> HarvestResult<()> {
        let source = self
            .sources
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| HarvestError::InvalidInput(format!("unknown source '{name}'")))?;
        source.enabled = enabled;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractorSpec, JsonExtractorSpec, PatternExtractorSpec, PatternStrategy};
    use crate::types::SourceKind;

    fn source(name: &str, priority: i32, enabled: bool) -> SourceDescriptor {
        SourceDescriptor::new(
            name,
            SourceKind::Api,
            format!("https://{name}.test/"),
            ExtractorSpec::Json(JsonExtractorSpec::default()),
        )
        .with_priority(priority)
        .with_enabled(enabled)
    }

    #[test]
    fn test_embedded_catalog_is_valid() {
        let catalog = Catalog::embedded().unwrap();
        assert!(!catalog.is_empty());
        let priorities: Vec<_> = catalog.list_sources().iter().map(|s| s.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_priority_order_is_stable() {
        let catalog = Catalog::new(vec![
            source("a", 1, true),
            source("b", 2, false),
            source("c", 1, true),
        ])
        .unwrap();
        let names: Vec<_> = catalog.list_sources().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["a", "c", "b"]);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_sources() {
        assert!(Catalog::new(vec![source("a", 1, true), source("a", 2, true)]).is_err());
        assert!(Catalog::new(vec![source(" ", 1, true)]).is_err());
        assert!(Catalog::new(vec![source("a", 1, true).with_pages(0, 10)]).is_err());

        let bad_regex = SourceDescriptor::new(
            "scrape",
            SourceKind::Scrape,
            "https://x.test/",
            ExtractorSpec::Pattern(PatternExtractorSpec {
                strategies: vec![PatternStrategy::new("(?P<name>[")],
            }),
        );
        let err = Catalog::new(vec![bad_regex]).unwrap_err();
        assert!(err.to_string().contains("scrape"));
    }

    #[test]
    fn test_set_enabled() {
        let mut catalog = Catalog::new(vec![source("a", 1, true)]).unwrap();
        catalog.set_enabled("a", false).unwrap();
        assert!(!catalog.get("a").unwrap().enabled);
        assert!(catalog.set_enabled("missing", true).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"{"sources":[{"name":"x","kind":"api","endpoint":"https://x.test/",
                "extractor":{"kind":"json","items_pointer":"/items"}}]}"#,
        )
        .unwrap();
        let catalog = Catalog::from_path(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(Catalog::from_path(&dir.path().join("missing.json")).is_err());
    }
}
