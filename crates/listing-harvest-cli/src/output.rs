//! Plain-text rendering for terminal output.

use std::fmt::Write;

use chrono::Local;
use listing_harvest::{BackgroundFetchStatus, ListingStats, ProgressEvent, SourceDescriptor};

/// One line per source, in run order.
pub fn sources_table(sources: &[SourceDescriptor]) -> String {
    let width = sources.iter().map(|s| s.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<width$}  {:<6}  {:>8}  {:>5}  {:>8}  ENABLED\n",
        "NAME", "KIND", "PRIORITY", "PAGES", "PER_PAGE"
    );
    for s in sources {
        let _ = writeln!(
            out,
            "{:<width$}  {:<6}  {:>8}  {:>5}  {:>8}  {}",
            s.name,
            s.kind.to_string(),
            s.priority,
            s.max_pages,
            s.per_page,
            if s.enabled { "yes" } else { "no" }
        );
    }
    out
}

pub fn stats_text(stats: &ListingStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Listings:        {}", stats.total_count);
    let _ = writeln!(out, "  with website:  {}", stats.with_website);
    let _ = writeln!(out, "  no website:    {}", stats.without_website);

    for (title, buckets) in [
        ("By industry", &stats.by_industry),
        ("By location", &stats.by_location),
    ] {
        if buckets.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{title}:");
        let mut rows: Vec<_> = buckets.iter().collect();
        rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (bucket, count) in rows {
            let _ = writeln!(out, "  {bucket:<20} {count}");
        }
    }
    out
}

/// `[completed/total] message`.
pub fn progress_line(event: &ProgressEvent) -> String {
    let (completed, total) = event.event.counts();
    format!("[{completed}/{total}] {}", event.event.message())
}

/// Summary printed after a run.
pub fn status_summary(status: &BackgroundFetchStatus, max_errors: usize) -> String {
    let mut out = format!(
        "Run {}: {}/{} source(s) at {}\n",
        status.state,
        status.completed_sources,
        status.total_sources,
        status
            .last_update
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if !status.errors.is_empty() {
        let shown = status.errors.len().min(max_errors);
        let _ = writeln!(
            out,
            "{} error(s){}:",
            status.errors.len(),
            if shown < status.errors.len() {
                format!(", last {shown}")
            } else {
                String::new()
            }
        );
        for error in &status.errors[status.errors.len() - shown..] {
            let _ = writeln!(out, "  - {error}");
        }
    }
    out
}
