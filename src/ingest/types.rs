// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a [`Source`].
pub type SourceId = u64;

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Protocol family of an upstream source. Selects the adapter for custom sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    ApiJson,
    IcsFeed,
    HtmlScrape,
}

/// Rolling status record, rewritten by the orchestrator after every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_scrape_events: u64,
    pub last_scrape_new: u64,
    pub last_scrape_duration_secs: f64,
    pub total_events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub slug: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub enabled: bool,
    pub is_built_in: bool,
    #[serde(default)]
    pub status: SourceStatus,
}

/// Creation payload used when seeding sources by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSeed {
    pub slug: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub is_built_in: bool,
}

/// What an adapter emits for one upstream record.
///
/// `(source, source_event_id)` is the dedup key: two runs producing the same
/// id describe the same real-world event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub source_event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub description_html: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub timezone: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub url: Option<String>,
    pub ticket_url: Option<String>,
    pub image_url: Option<String>,
    pub cost: Option<String>,
    pub is_canceled: bool,
    pub is_online: bool,
    pub event_type: Option<String>,
    pub audience: Option<String>,
    pub subjects: Vec<String>,
    pub department: Option<String>,
    /// Adapter-specific upstream context, kept for post-hoc debugging.
    pub raw_data: serde_json::Value,
}

impl NormalizedEvent {
    /// Minimal event with every flag set explicitly; adapters fill the rest.
    pub fn new(
        source_event_id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            source_event_id: source_event_id.into(),
            title: title.into(),
            description: None,
            description_html: None,
            start_time,
            end_time: None,
            is_all_day: false,
            timezone: DEFAULT_TIMEZONE.to_string(),
            location: None,
            address: None,
            latitude: None,
            longitude: None,
            url: None,
            ticket_url: None,
            image_url: None,
            cost: None,
            is_canceled: false,
            is_online: false,
            event_type: None,
            audience: None,
            subjects: Vec::new(),
            department: None,
            raw_data: serde_json::Value::Null,
        }
    }
}

/// Stored form of a [`NormalizedEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub id: u64,
    pub source_id: SourceId,
    #[serde(flatten)]
    pub event: NormalizedEvent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of one adapter invocation. Never persisted as such.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeRunResult {
    pub events: Vec<NormalizedEvent>,
    pub errors: Vec<String>,
}

/// Figures recorded on a source after a run that reached reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub finished_at: DateTime<Utc>,
    pub events_seen: u64,
    pub new_events: u64,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub total_events: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Completed(RunStats),
    /// Orchestration itself failed; only the error text is refreshed.
    Failed { error: String },
}
