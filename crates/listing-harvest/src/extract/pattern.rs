//! Pattern extractor: a ranked cascade of regex strategies over page text.
//!
//! Unstructured listing pages rarely share one layout, so each source
//! carries several strategies. They are tried in order and the first one
//! producing at least one named record wins; later strategies are not run.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ExtractContext, RecordField, SourceExtractor};
use crate::types::{CandidateRecord, HarvestError, HarvestResult};

/// One regex strategy. Named groups select the record fields they fill;
/// a `name` group is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStrategy {
    /// Label used in logs.
    #[serde(default)]
    pub label: Option<String>,
    pub pattern: String,
}

impl PatternStrategy {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            label: None,
            pattern: pattern.into(),
        }
    }
}

/// Declarative configuration of a [`PatternExtractor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternExtractorSpec {
    #[serde(default)]
    pub strategies: Vec<PatternStrategy>,
}

#[derive(Debug)]
struct CompiledStrategy {
    label: String,
    regex: Regex,
    /// Capture group name and the field it fills.
    groups: Vec<(String, RecordField)>,
}

/// Extractor for HTML or plain-text listing pages.
#[derive(Debug)]
pub struct PatternExtractor {
    strategies: Vec<CompiledStrategy>,
}

impl PatternExtractor {
    /// Compile every strategy. Invalid regexes and strategies without a
    /// `name` group are configuration errors.
    pub fn new(spec: &PatternExtractorSpec) -> HarvestResult<Self> {
        let mut strategies = Vec::with_capacity(spec.strategies.len());

        for (idx, strategy) in spec.strategies.iter().enumerate() {
            let label = strategy
                .label
                .clone()
                .unwrap_or_else(|| format!("strategy #{}", idx + 1));

            let regex = Regex::new(&strategy.pattern)
                .map_err(|e| HarvestError::Config(format!("{label}: invalid pattern: {e}")))?;

            let mut groups = Vec::new();
            for group in regex.capture_names().flatten() {
                let field = RecordField::parse(group)
                    .unwrap_or_else(|_| RecordField::Extra(group.to_string()));
                groups.push((group.to_string(), field));
            }

            if !groups.iter().any(|(_, field)| *field == RecordField::Name) {
                return Err(HarvestError::Config(format!(
                    "{label}: pattern has no (?P<name>...) group"
                )));
            }

            strategies.push(CompiledStrategy {
                label,
                regex,
                groups,
            });
        }

        Ok(Self { strategies })
    }

    fn run_strategy(
        strategy: &CompiledStrategy,
        content: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<CandidateRecord> {
        let base = Url::parse(ctx.url).ok();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for caps in strategy.regex.captures_iter(content) {
            let mut record = CandidateRecord::new("", ctx.source);
            for (group, field) in &strategy.groups {
                let Some(m) = caps.name(group) else {
                    continue;
                };
                let mut text = clean_text(m.as_str());
                if *field == RecordField::Website {
                    text = resolve_link(base.as_ref(), &text);
                }
                field.assign(&mut record, &text);
            }

            if record.name.is_empty() || !seen.insert(record.name.clone()) {
                continue;
            }
            records.push(record);
        }

        records
    }
}

impl SourceExtractor for PatternExtractor {
    fn extract(&self, content: &str, ctx: &ExtractContext<'_>) -> Vec<CandidateRecord> {
        for strategy in &self.strategies {
            let records = Self::run_strategy(strategy, content, ctx);
            if !records.is_empty() {
                tracing::debug!(
                    "{}: {} matched {} record(s) on page {}",
                    ctx.source,
                    strategy.label,
                    records.len(),
                    ctx.page
                );
                return records;
            }
        }
        Vec::new()
    }
}

fn tag_regex() -> Option<&'static Regex> {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

/// Strip tags, decode common entities and collapse whitespace.
pub(crate) fn clean_text(raw: &str) -> String {
    let stripped = match tag_regex() {
        Some(tags) => tags.replace_all(raw, " ").into_owned(),
        None => raw.to_string(),
    };
    let decoded = unescape_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape_entities(s: &str) -> String {
    // &amp; last so "&amp;lt;" decodes to "&lt;", not "<".
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Resolve a possibly relative link against the page URL.
fn resolve_link(base: Option<&Url>, link: &str) -> String {
    if link.is_empty() || Url::parse(link).is_ok() {
        return link.to_string();
    }
    base.and_then(|b| b.join(link).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <ul>
          <li class="co"><a href="/companies/acme">Acme &amp; Sons</a>
              <span class="pref">大阪府</span><span class="emp">約1,200名</span></li>
          <li class="co"><a href="https://beta.test/">Beta <b>Corp</b></a>
              <span class="pref">東京都</span><span class="emp">-</span></li>
        </ul>
    "#;

    fn ctx() -> ExtractContext<'static> {
        ExtractContext {
            source: "directory",
            page: 2,
            url: "https://dir.test/list?page=2",
        }
    }

    fn spec(patterns: &[&str]) -> PatternExtractorSpec {
        PatternExtractorSpec {
            strategies: patterns.iter().map(|p| PatternStrategy::new(*p)).collect(),
        }
    }

    #[test]
    fn test_first_matching_strategy_wins() {
        let ex = PatternExtractor::new(&spec(&[
            r#"<div class="card">(?P<name>[^<]+)</div>"#,
            r#"(?s)<li class="co"><a href="(?P<website>[^"]+)">(?P<name>.*?)</a>\s*<span class="pref">(?P<location>[^<]+)</span><span class="emp">(?P<employees>[^<]*)</span>"#,
            r#"<li class="co">(?P<name>[^<]+)"#,
        ]))
        .unwrap();

        let records = ex.extract(PAGE, &ctx());
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].name, "Acme & Sons");
        assert_eq!(
            records[0].website.as_deref(),
            Some("https://dir.test/companies/acme")
        );
        assert_eq!(records[0].location.as_deref(), Some("大阪府"));
        assert_eq!(records[0].employee_count, Some(1200));
        assert_eq!(records[0].source_name, "directory");

        assert_eq!(records[1].name, "Beta Corp");
        assert_eq!(records[1].website.as_deref(), Some("https://beta.test/"));
        assert_eq!(records[1].employee_count, None);
    }

    #[test]
    fn test_no_match_is_empty() {
        let ex = PatternExtractor::new(&spec(&[r"<h1>(?P<name>[^<]+)</h1>"])).unwrap();
        assert!(ex.extract(PAGE, &ctx()).is_empty());
        assert!(ex.extract("", &ctx()).is_empty());
    }

    #[test]
    fn test_duplicate_names_on_one_page_are_collapsed() {
        let ex = PatternExtractor::new(&spec(&[r"<b>(?P<name>[^<]+)</b>"])).unwrap();
        let records = ex.extract("<b>Acme</b><b>Acme</b><b>Beta</b>", &ctx());
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Acme", "Beta"]);
    }

    #[test]
    fn test_unknown_group_lands_in_extra() {
        let ex = PatternExtractor::new(&spec(&[r"(?P<name>\w+):(?P<ticker>\d+)"])).unwrap();
        let records = ex.extract("Acme:7203", &ctx());
        assert_eq!(records[0].extra["ticker"], "7203");
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(PatternExtractor::new(&spec(&[r"(?P<name>[unclosed"])).is_err());
        assert!(PatternExtractor::new(&spec(&[r"(?P<phone>\d+)"])).is_err());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  A&nbsp;<br/>\n B&amp;C "), "A B&C");
        assert_eq!(clean_text("&amp;lt;"), "&lt;");
    }
}
