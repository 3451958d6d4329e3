//! Conflict resolution between an accumulated record and an incoming one
//! with the same identity key.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::types::{has_text, AccumulatedRecord};

/// Descriptions this short carry no information.
const MIN_DESCRIPTION_LEN: usize = 10;

/// Count of populated detail fields. A website is worth two.
pub fn richness(record: &AccumulatedRecord) -> u32 {
    let r = &record.record;
    let mut score = 0;
    if has_text(&r.website) {
        score += 2;
    }
    if has_text(&r.phone) {
        score += 1;
    }
    if has_text(&r.address) {
        score += 1;
    }
    if description_len(record) > MIN_DESCRIPTION_LEN {
        score += 1;
    }
    if has_text(&r.established_date) {
        score += 1;
    }
    if r.employee_count.is_some() {
        score += 1;
    }
    if has_text(&r.capital) {
        score += 1;
    }
    score
}

fn description_len(record: &AccumulatedRecord) -> usize {
    record
        .record
        .description
        .as_deref()
        .map(|d| d.trim().chars().count())
        .unwrap_or(0)
}

/// Missing analysis timestamps compare as the Unix epoch.
fn analyzed(record: &AccumulatedRecord) -> DateTime<Utc> {
    record.last_analyzed.unwrap_or_default()
}

/// Whether `incoming` should replace `existing`.
///
/// A strictly newer analysis always wins and an older one never does. On
/// equal timestamps the richer record wins; a tie keeps the existing one.
pub fn should_replace(existing: &AccumulatedRecord, incoming: &AccumulatedRecord) -> bool {
    match analyzed(incoming).cmp(&analyzed(existing)) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => richness(incoming) > richness(existing),
    }
}

/// Fold `incoming` into `existing` after [`should_replace`] said yes.
///
/// Existing values survive unless the incoming record has a non-empty
/// value for a detail field or a strictly longer description. Scores and
/// the analysis timestamp come from the incoming record when present.
pub fn merge_into(existing: &mut AccumulatedRecord, incoming: AccumulatedRecord) {
    let incoming_description_len = description_len(&incoming);
    let existing_description_len = description_len(existing);
    let dst = &mut existing.record;
    let src = incoming.record;

    take_text(&mut dst.website, src.website);
    take_text(&mut dst.phone, src.phone);
    take_text(&mut dst.address, src.address);
    take_text(&mut dst.established_date, src.established_date);
    take_text(&mut dst.capital, src.capital);
    if src.employee_count.is_some() {
        dst.employee_count = src.employee_count;
    }
    if incoming_description_len > existing_description_len {
        dst.description = src.description;
    }

    // Gaps only; these never overwrite.
    if !has_text(&dst.industry) && has_text(&src.industry) {
        dst.industry = src.industry;
    }
    if dst.is_listed.is_none() {
        dst.is_listed = src.is_listed;
    }
    for (key, value) in src.extra {
        dst.extra.entry(key).or_insert(value);
    }

    if incoming.last_analyzed.is_some() {
        existing.last_analyzed = incoming.last_analyzed;
    }
    if incoming.overall_score.is_some() {
        existing.overall_score = incoming.overall_score;
    }
    if incoming.technical_score.is_some() {
        existing.technical_score = incoming.technical_score;
    }
    if incoming.eeat_score.is_some() {
        existing.eeat_score = incoming.eeat_score;
    }
    if incoming.content_score.is_some() {
        existing.content_score = incoming.content_score;
    }
}

fn take_text(dst: &mut Option<String>, src: Option<String>) {
    if has_text(&src) {
        *dst = src;
    }
}
