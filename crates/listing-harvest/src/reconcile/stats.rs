//! Aggregate counts over the accumulated listing set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{has_text, AccumulatedRecord};

/// Bucket for records without an industry or location.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Aggregate counts over the accumulated set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingStats {
    pub total_count: usize,
    pub with_website: usize,
    pub without_website: usize,
    pub by_industry: BTreeMap<String, usize>,
    pub by_location: BTreeMap<String, usize>,
}

impl ListingStats {
    pub fn from_records(records: &[AccumulatedRecord]) -> Self {
        let mut stats = Self {
            total_count: records.len(),
            ..Self::default()
        };

        for acc in records {
            let r = &acc.record;
            if has_text(&r.website) {
                stats.with_website += 1;
            } else {
                stats.without_website += 1;
            }
            *stats.by_industry.entry(bucket(&r.industry)).or_default() += 1;
            *stats.by_location.entry(bucket(&r.location)).or_default() += 1;
        }

        stats
    }
}

fn bucket(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_BUCKET.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateRecord;
    use chrono::Utc;

    #[test]
    fn test_counts_and_buckets() {
        let mut a = CandidateRecord::new("A", "s");
        a.website = Some("https://a.test".into());
        a.industry = Some("IT".into());
        a.location = Some("Tokyo".into());
        let mut b = CandidateRecord::new("B", "s");
        b.industry = Some("IT".into());
        let c = CandidateRecord::new("C", "s");

        let records: Vec<_> = [a, b, c]
            .into_iter()
            .map(|r| AccumulatedRecord::new(r, Utc::now()))
            .collect();
        let stats = ListingStats::from_records(&records);

        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.with_website, 1);
        assert_eq!(stats.without_website, 2);
        assert_eq!(stats.by_industry["IT"], 2);
        assert_eq!(stats.by_industry[UNKNOWN_BUCKET], 1);
        assert_eq!(stats.by_location["Tokyo"], 1);
        assert_eq!(stats.by_location[UNKNOWN_BUCKET], 2);
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(ListingStats::from_records(&[]), ListingStats::default());
    }
}
