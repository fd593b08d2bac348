// src/ingest/providers/uc_berkeley.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::Fetcher;
use crate::ingest::providers::{fetch_json_page, flag, id_string, null_as_default, UC_BERKELEY};
use crate::ingest::taxonomy::normalize_event_type;
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};
use crate::ingest::{non_empty, parse_instant};

const API_URL: &str = "https://events.berkeley.edu/live/json/events/page";

#[derive(Debug, Deserialize)]
struct ApiPage {
    meta: Meta,
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct BerkeleyEvent {
    id: Value,
    title: String,
    url: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    date_utc: Option<String>,
    date_iso: Option<String>,
    date2_utc: Option<String>,
    date2_iso: Option<String>,
    is_all_day: Option<Value>,
    is_canceled: Option<Value>,
    is_online: Option<Value>,
    online_url: Option<String>,
    cost: Option<String>,
    timezone: Option<String>,
    location: Option<String>,
}

/// LiveWhale JSON feed.
pub struct UcBerkeleyAdapter {
    fetcher: Arc<dyn Fetcher>,
}

/// "Category | Title" only splits when the prefix is a known event type.
fn split_category(title: &str) -> (Option<&'static str>, &str) {
    static RE_PIPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s*\|\s*(.+)$").unwrap());
    if let Some(caps) = RE_PIPE.captures(title) {
        if let (Some(kind), Some(rest)) = (normalize_event_type(&caps[1]), caps.get(2)) {
            return (Some(kind), rest.as_str().trim());
        }
    }
    (None, title.trim())
}

fn first_present(a: Option<&str>, b: Option<&str>) -> Option<String> {
    non_empty(a).or_else(|| non_empty(b))
}

impl UcBerkeleyAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn normalize(raw: Value, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
        let e: BerkeleyEvent = match serde_json::from_value(raw.clone()) {
            Ok(e) => e,
            Err(err) => {
                let id = raw.get("id").and_then(id_string).unwrap_or_default();
                diag.push(format!("Failed to parse event {id}: {err}"));
                return None;
            }
        };
        let id = id_string(&e.id)?;
        let start_raw = first_present(e.date_utc.as_deref(), e.date_iso.as_deref())?;
        let Some(start) = parse_instant(&start_raw) else {
            diag.push(format!("Failed to parse event {id}: bad start {start_raw:?}"));
            return None;
        };

        let (event_type, title) = split_category(&e.title);

        let mut ev = NormalizedEvent::new(id, title, start);
        ev.event_type = event_type.map(str::to_string);
        ev.description = first_present(e.summary.as_deref(), e.description.as_deref());
        ev.end_time = first_present(e.date2_utc.as_deref(), e.date2_iso.as_deref())
            .as_deref()
            .and_then(parse_instant);
        ev.is_all_day = flag(e.is_all_day.as_ref());
        ev.is_canceled = flag(e.is_canceled.as_ref());
        ev.is_online = flag(e.is_online.as_ref());
        ev.timezone = non_empty(e.timezone.as_deref()).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        ev.location = non_empty(e.location.as_deref());
        ev.url = non_empty(e.url.as_deref());
        ev.ticket_url = non_empty(e.online_url.as_deref());
        ev.cost = non_empty(e.cost.as_deref());
        ev.raw_data = raw;
        Some(ev)
    }
}

#[async_trait]
impl SourceAdapter for UcBerkeleyAdapter {
    fn slug(&self) -> &str {
        UC_BERKELEY
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let mut out = Vec::new();
        let mut page = 1u32;
        let mut total_pages = 1u32;

        while page <= total_pages {
            let url = format!("{API_URL}/{page}");
            let position = format!("on page {page}");
            let Some(data) =
                fetch_json_page::<ApiPage>(self.fetcher.as_ref(), &url, &position, page == 1, diag).await?
            else {
                break;
            };
            total_pages = data.meta.total_pages;
            out.extend(data.data.into_iter().filter_map(|raw| Self::normalize(raw, diag)));
            page += 1;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::StubFetcher;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": 99001,
            "title": "Lecture | Quantum Computing Frontiers",
            "url": "https://events.berkeley.edu/events/quantum",
            "description": "A talk about quantum computing",
            "summary": "Brief summary",
            "date_utc": "2026-04-10T18:00:00Z",
            "date2_utc": "2026-04-10T19:30:00Z",
            "is_all_day": 0,
            "is_canceled": 0,
            "is_online": 0,
            "cost": "Free",
            "timezone": "America/Los_Angeles",
            "location": "Wheeler Hall 150"
        })
    }

    async fn run(events: Vec<Value>) -> crate::ingest::types::ScrapeRunResult {
        let body = json!({ "meta": { "total_pages": 1, "page": 1 }, "data": events });
        UcBerkeleyAdapter::new(Arc::new(StubFetcher::always(body.to_string())))
            .scrape()
            .await
    }

    #[test]
    fn category_prefix_must_be_known() {
        assert_eq!(split_category("Exhibit | Modern Sculpture"), (Some("exhibition"), "Modern Sculpture"));
        assert_eq!(
            split_category("Berkeley Graduate Conference | Keynote Address"),
            (None, "Berkeley Graduate Conference | Keynote Address")
        );
        assert_eq!(split_category("Simple Event Title"), (None, "Simple Event Title"));
    }

    #[tokio::test]
    async fn normalizes_complete_event() {
        let out = run(vec![sample()]).await;
        assert!(out.errors.is_empty());
        let ev = &out.events[0];
        assert_eq!(ev.source_event_id, "99001");
        assert_eq!(ev.title, "Quantum Computing Frontiers");
        assert_eq!(ev.event_type.as_deref(), Some("lecture"));
        assert_eq!(ev.description.as_deref(), Some("Brief summary"));
        assert_eq!(ev.cost.as_deref(), Some("Free"));
        assert!(ev.end_time.is_some());
        assert!(!ev.is_all_day && !ev.is_canceled && !ev.is_online);
    }

    #[tokio::test]
    async fn integer_flags_fallbacks_and_timezone() {
        let mut a = sample();
        a["is_all_day"] = json!(1);
        a["is_canceled"] = json!(1);
        a["is_online"] = json!(1);
        a["summary"] = json!("");
        a["timezone"] = json!("America/New_York");
        a["date_utc"] = Value::Null;
        a["date_iso"] = json!("2026-04-10T11:00:00-07:00");
        a["date2_utc"] = Value::Null;

        let mut b = sample();
        b["id"] = json!(2);
        b["date_utc"] = Value::Null;
        b.as_object_mut().unwrap().remove("timezone");

        let out = run(vec![a, b]).await;
        assert_eq!(out.events.len(), 1, "event without any start is dropped");
        let ev = &out.events[0];
        assert!(ev.is_all_day && ev.is_canceled && ev.is_online);
        assert_eq!(ev.description.as_deref(), Some("A talk about quantum computing"));
        assert_eq!(ev.timezone, "America/New_York");
        assert_eq!(ev.start_time.to_rfc3339(), "2026-04-10T18:00:00+00:00");
        assert!(ev.end_time.is_none());
    }

    #[tokio::test]
    async fn api_error_yields_single_diagnostic() {
        let out = UcBerkeleyAdapter::new(Arc::new(StubFetcher::failing(500))).scrape().await;
        assert!(out.events.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("500"));
    }
}
