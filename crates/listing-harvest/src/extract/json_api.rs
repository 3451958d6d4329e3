//! JSON API extractor: maps JSON pointers inside each item onto record fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExtractContext, RecordField, SourceExtractor};
use crate::types::{CandidateRecord, HarvestError, HarvestResult};

/// Field names used when a spec carries no explicit mapping. Later entries
/// win, so `location` overrides the `prefecture` fallback when both exist.
const DEFAULT_FIELDS: &[&str] = &[
    "name",
    "address",
    "prefecture",
    "location",
    "industry",
    "phone",
    "website",
    "description",
    "employee_count",
    "capital",
    "established_date",
    "is_listed",
];

/// Declarative configuration of a [`JsonApiExtractor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonExtractorSpec {
    /// Pointer to the array of items. Empty means the document root.
    #[serde(default)]
    pub items_pointer: String,
    /// Record field -> pointer inside one item. Empty maps every record
    /// field from the item key of the same name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Extractor for JSON API responses.
#[derive(Debug)]
pub struct JsonApiExtractor {
    items_pointer: String,
    fields: Vec<(RecordField, String)>,
}

impl JsonApiExtractor {
    pub fn new(spec: JsonExtractorSpec) -> HarvestResult<Self> {
        check_pointer(&spec.items_pointer)?;

        let fields = if spec.fields.is_empty() {
            DEFAULT_FIELDS
                .iter()
                .map(|field| Ok((RecordField::parse(field)?, format!("/{field}"))))
                .collect::<HarvestResult<Vec<_>>>()?
        } else {
            let mut fields = Vec::with_capacity(spec.fields.len());
            for (field, pointer) in &spec.fields {
                check_pointer(pointer)?;
                fields.push((RecordField::parse(field)?, pointer.clone()));
            }
            fields
        };

        if !fields.iter().any(|(field, _)| *field == RecordField::Name) {
            return Err(HarvestError::Config(
                "json extractor has no mapping for 'name'".to_string(),
            ));
        }

        Ok(Self {
            items_pointer: spec.items_pointer,
            fields,
        })
    }

    fn record_from(&self, item: &Value, source: &str) -> Option<CandidateRecord> {
        let mut record = CandidateRecord::new("", source);
        for (field, pointer) in &self.fields {
            if let Some(text) = item.pointer(pointer).and_then(scalar_text) {
                field.assign(&mut record, &text);
            }
        }
        (!record.name.trim().is_empty()).then_some(record)
    }
}

impl SourceExtractor for JsonApiExtractor {
    fn extract(&self, content: &str, ctx: &ExtractContext<'_>) -> Vec<CandidateRecord> {
        let document: Value = match serde_json::from_str(content) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("{}: page {} is not valid JSON: {e}", ctx.source, ctx.page);
                return Vec::new();
            }
        };

        let Some(Value::Array(items)) = document.pointer(&self.items_pointer) else {
            tracing::debug!(
                "{}: no item array at '{}' on page {}",
                ctx.source,
                self.items_pointer,
                ctx.page
            );
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| self.record_from(item, ctx.source))
            .collect()
    }
}

fn check_pointer(pointer: &str) -> HarvestResult<()> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(HarvestError::Config(format!(
            "invalid JSON pointer '{pointer}': must be empty or start with '/'"
        )))
    }
}

/// Text form of a scalar; objects, arrays and null yield nothing.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExtractContext<'static> {
        ExtractContext {
            source: "registry",
            page: 1,
            url: "https://api.test/companies",
        }
    }

    fn extractor(items: &str, fields: &[(&str, &str)]) -> JsonApiExtractor {
        JsonApiExtractor::new(JsonExtractorSpec {
            items_pointer: items.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_maps_nested_pointers() {
        let ex = extractor(
            "/data/items",
            &[
                ("name", "/company/name"),
                ("location", "/company/pref"),
                ("employees", "/stats/staff"),
                ("is_listed", "/listed"),
                ("extra.corporate_number", "/id"),
            ],
        );
        let body = r#"{"data":{"items":[
            {"company":{"name":"Acme","pref":"Osaka"},"stats":{"staff":120},"listed":true,"id":1234567890123},
            {"company":{"name":"  "}},
            {"company":{"name":"Beta"}}
        ]}}"#;

        let records = ex.extract(body, &ctx());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Acme");
        assert_eq!(records[0].location.as_deref(), Some("Osaka"));
        assert_eq!(records[0].employee_count, Some(120));
        assert_eq!(records[0].is_listed, Some(true));
        assert_eq!(records[0].extra["corporate_number"], "1234567890123");
        assert_eq!(records[0].source_name, "registry");
        assert_eq!(records[1].name, "Beta");
    }

    #[test]
    fn test_default_field_mapping_at_root() {
        let ex = JsonApiExtractor::new(JsonExtractorSpec::default()).unwrap();
        let records = ex.extract(
            r#"[{"name":"Acme","website":"https://acme.test","unmapped":"x"}]"#,
            &ctx(),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].website.as_deref(), Some("https://acme.test"));
        assert!(records[0].extra.is_empty());
    }

    #[test]
    fn test_default_mapping_falls_back_to_prefecture() {
        let ex = JsonApiExtractor::new(JsonExtractorSpec::default()).unwrap();
        let records = ex.extract(
            r#"[
                {"name":"Acme","prefecture":"東京都"},
                {"name":"Beta","prefecture":"大阪府","location":"Osaka"}
            ]"#,
            &ctx(),
        );
        assert_eq!(records[0].location.as_deref(), Some("東京都"));
        assert_eq!(records[1].location.as_deref(), Some("Osaka"));
    }

    #[test]
    fn test_malformed_input_degrades_to_empty() {
        let ex = extractor("/items", &[("name", "/name")]);
        assert!(ex.extract("<html>not json</html>", &ctx()).is_empty());
        assert!(ex.extract(r#"{"items":{"name":"x"}}"#, &ctx()).is_empty());
        assert!(ex.extract(r#"{"other":[]}"#, &ctx()).is_empty());
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let no_name = JsonApiExtractor::new(JsonExtractorSpec {
            items_pointer: String::new(),
            fields: [("phone".to_string(), "/tel".to_string())].into(),
        });
        assert!(no_name.is_err());

        let bad_pointer = JsonApiExtractor::new(JsonExtractorSpec {
            items_pointer: "items".to_string(),
            fields: BTreeMap::new(),
        });
        assert!(bad_pointer.is_err());
    }
}
