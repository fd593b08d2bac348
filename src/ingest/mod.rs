// src/ingest/mod.rs
pub mod adapter;
pub mod config;
pub mod embedded;
pub mod fetch;
pub mod orchestrator;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod taxonomy;
pub mod text;
pub mod timezone;
pub mod types;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashSet;

use crate::ingest::types::NormalizedEvent;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Events returned by adapters.");
        describe_counter!(
            "ingest_new_events_total",
            "Events seen for the first time under their (source, id) key."
        );
        describe_counter!(
            "ingest_diagnostics_total",
            "Partial-failure diagnostics recorded by adapters."
        );
        describe_counter!(
            "ingest_source_failures_total",
            "Sources whose orchestration failed outright."
        );
        describe_counter!("ingest_http_errors_total", "Upstream HTTP failures.");
        describe_counter!("ingest_runs_total", "Completed scrape runs.");
        describe_counter!(
            "ingest_trigger_rejected_total",
            "Triggers rejected because a run was already in progress."
        );
        describe_histogram!(
            "ingest_source_duration_ms",
            "Per-source scrape + reconcile time in milliseconds."
        );
        describe_gauge!("ingest_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// HTML fragment → plain text: decode entities, drop tags, collapse whitespace.
pub fn strip_html(s: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());
    let without_tags = RE_TAGS.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&without_tags).to_string();
    collapse_whitespace(&decoded)
}

pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Empty or whitespace-only strings become `None`.
pub fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Parse the timestamp spellings upstream APIs use.
///
/// Accepts RFC 3339 with offset, `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// without offset (read as UTC), and bare dates (UTC midnight).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Ids that occur more than once in one adapter's output.
pub fn duplicate_ids(events: &[NormalizedEvent]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for ev in events {
        if !seen.insert(ev.source_event_id.as_str()) && !dups.contains(&ev.source_event_id) {
            dups.push(ev.source_event_id.clone());
        }
    }
    dups
}

/// Keep the first event per id, preserving order. Returns how many were dropped.
pub fn dedup_by_id(events: &mut Vec<NormalizedEvent>) -> usize {
    let before = events.len();
    let mut seen: HashSet<String> = HashSet::new();
    events.retain(|ev| seen.insert(ev.source_event_id.clone()));
    before - events.len()
}
