// src/ingest/providers/shoreline.rs
//! Live Nation venue page for Shoreline Amphitheatre. The event list only
//! exists inside the React Server Component payload pushed by inline scripts.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::embedded::{extract_balanced_json_array, unescape_script_string};
use crate::ingest::fetch::{Fetcher, RequestProfile};
use crate::ingest::providers::{coordinate, null_as_default, SHORELINE_AMPHITHEATRE};
use crate::ingest::taxonomy::normalize_event_type;
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};
use crate::ingest::{non_empty, parse_instant};

const VENUE_URL: &str = "https://www.livenation.com/venue/KovZpZA6ta1A/shoreline-amphitheatre-events";
const VENUE_DISCOVERY_ID: &str = "KovZpZA6ta1A";

const LOCATION: &str = "Shoreline Amphitheatre";
const ADDRESS: &str = "One Amphitheatre Parkway, Mountain View, CA 94043";
const LATITUDE: f64 = 37.426718;
const LONGITUDE: f64 = -122.080722;

const PREFERRED_IMAGE: &str = "RETINA_PORTRAIT_16_9";

static RSC_CHUNK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)self\.__next_f\.push\(\[1,"(.*?)"\]\)</script>"#).unwrap());

#[derive(Debug, Deserialize)]
struct LiveNationEvent {
    discovery_id: String,
    name: String,
    url: Option<String>,
    timezone: Option<String>,
    start_datetime_utc: String,
    status_code: Option<String>,
    genre: Option<String>,
    segment: Option<String>,
    is_virtual: Option<bool>,
    venue: Option<Venue>,
    #[serde(default, deserialize_with = "null_as_default")]
    artists: Vec<Artist>,
    #[serde(default, deserialize_with = "null_as_default")]
    images: Vec<Image>,
    image: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    discovery_id: Option<String>,
    location: Option<VenueLocation>,
}

#[derive(Debug, Deserialize)]
struct VenueLocation {
    latitude: Option<Value>,
    longitude: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
    identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    url: Option<String>,
}

/// Raw event objects from the first RSC chunk that carries event data.
pub(crate) fn extract_rsc_events(html: &str, diag: &mut Diagnostics) -> Vec<Value> {
    for caps in RSC_CHUNK.captures_iter(html) {
        let chunk = &caps[1];
        if !chunk.contains("event_data_type") {
            continue;
        }
        let unescaped = unescape_script_string(chunk);
        let Some(array) = extract_balanced_json_array(&unescaped, r#""data":[{"#) else {
            continue;
        };
        match serde_json::from_str::<Vec<Value>>(array) {
            Ok(events) => return events,
            Err(e) => diag.push(format!("Failed to parse event JSON: {e}")),
        }
    }
    diag.push("No event data found in LiveNation page RSC payload");
    Vec::new()
}

/// Regular events at this venue; other venues and non-REGULAR types are dropped.
fn is_listed_here(raw: &Value) -> bool {
    if raw.get("type").and_then(Value::as_str) != Some("REGULAR") {
        return false;
    }
    match raw.pointer("/venue/discovery_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id == VENUE_DISCOVERY_ID,
        _ => true,
    }
}

fn event_type(segment: Option<&str>, genre: Option<&str>) -> Option<&'static str> {
    let segment = segment?;
    if segment.eq_ignore_ascii_case("music") {
        return Some("concert");
    }
    genre
        .and_then(normalize_event_type)
        .or_else(|| normalize_event_type(segment))
}

fn normalize(raw: Value, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
    let e: LiveNationEvent = match serde_json::from_value(raw.clone()) {
        Ok(e) => e,
        Err(err) => {
            let id = raw.get("discovery_id").and_then(Value::as_str).unwrap_or_default();
            diag.push(format!("Failed to parse event {id}: {err}"));
            return None;
        }
    };
    let Some(start) = parse_instant(&e.start_datetime_utc) else {
        diag.push(format!(
            "Failed to parse event {}: bad start {:?}",
            e.discovery_id, e.start_datetime_utc
        ));
        return None;
    };

    let genre = e.genre.as_deref().map(str::to_lowercase);
    let segment = e.segment.as_deref().map(str::to_lowercase);
    let mut subjects: Vec<String> = genre.iter().cloned().collect();
    if let Some(seg) = segment.filter(|s| Some(s) != genre.as_ref()) {
        subjects.push(seg);
    }
    subjects.extend(e.artists.iter().map(|a| a.name.to_lowercase()));

    let location = e.venue.as_ref().and_then(|v| v.location.as_ref());
    let image_url = e
        .images
        .iter()
        .find(|img| img.identifier.as_deref() == Some(PREFERRED_IMAGE))
        .map(|img| img.url.clone())
        .or_else(|| e.image.as_ref().and_then(|i| non_empty(i.url.as_deref())));

    let mut ev = NormalizedEvent::new(e.discovery_id, e.name, start);
    ev.timezone = non_empty(e.timezone.as_deref()).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    ev.location = Some(LOCATION.to_string());
    ev.address = Some(ADDRESS.to_string());
    ev.latitude = location.and_then(|l| coordinate(l.latitude.as_ref())).or(Some(LATITUDE));
    ev.longitude = location.and_then(|l| coordinate(l.longitude.as_ref())).or(Some(LONGITUDE));
    ev.url = non_empty(e.url.as_deref());
    ev.ticket_url = ev.url.clone();
    ev.image_url = image_url;
    ev.is_canceled = e.status_code.as_deref() == Some("cancelled");
    ev.is_online = e.is_virtual.unwrap_or(false);
    ev.event_type = event_type(e.segment.as_deref(), e.genre.as_deref()).map(str::to_string);
    ev.subjects = subjects;
    ev.raw_data = raw;
    Some(ev)
}

pub struct ShorelineAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl ShorelineAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SourceAdapter for ShorelineAdapter {
    fn slug(&self) -> &str {
        SHORELINE_AMPHITHEATRE
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let html = self
            .fetcher
            .get_text(VENUE_URL, RequestProfile::Browser)
            .await
            .context("LiveNation page request failed")?;

        Ok(extract_rsc_events(&html, diag)
            .into_iter()
            .filter(is_listed_here)
            .filter_map(|raw| normalize(raw, diag))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::StubFetcher;
    use serde_json::json;

    fn live_event(id: &str, name: &str) -> Value {
        json!({
            "event_data_type": "event",
            "discovery_id": id,
            "name": name,
            "slug": "slug",
            "url": format!("https://www.livenation.com/event/{id}"),
            "type": "REGULAR",
            "start_date_local": "2026-06-20",
            "timezone": "America/Los_Angeles",
            "start_datetime_utc": "2026-06-21T02:30:00Z",
            "status_code": "onsale",
            "genre": "Rock",
            "segment": "Music",
            "venue": {
                "discovery_id": VENUE_DISCOVERY_ID,
                "name": "Shoreline Amphitheatre",
                "location": { "latitude": 37.4267, "longitude": -122.0807 }
            },
            "artists": [{ "name": "The Band" }],
            "images": [
                { "url": "https://img/small.jpg", "identifier": "SMALL", "width": 1, "height": 1 },
                { "url": "https://img/retina.jpg", "identifier": PREFERRED_IMAGE, "width": 2, "height": 2 }
            ]
        })
    }

    /// Wrap events the way the venue page embeds them: JSON escaped into a JS string.
    fn page(events: Vec<Value>) -> String {
        let payload = json!({ "venueEvents": { "data": events, "total": 3 } }).to_string();
        let escaped = payload.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "<html><script>self.__next_f.push([1,\"0:[\\\"$\\\",\\\"html\\\"]\"])</script>\
             <script>self.__next_f.push([1,\"{escaped}\"])</script></html>"
        )
    }

    #[test]
    fn segment_and_genre_mapping() {
        assert_eq!(event_type(Some("Music"), Some("Rock")), Some("concert"));
        assert_eq!(event_type(Some("Arts & Theatre"), Some("Theatre")), Some("performance"));
        assert_eq!(event_type(Some("Sports"), Some("Baseball")), Some("sports"));
        assert_eq!(event_type(None, Some("Theatre")), None);
    }

    #[tokio::test]
    async fn extracts_regular_events_at_this_venue() {
        let mut parking = live_event("P1", "Parking Pass");
        parking["type"] = json!("PARKING");
        let mut elsewhere = live_event("X1", "Other Venue Show");
        elsewhere["venue"]["discovery_id"] = json!("KovZ917Other");
        let mut quoted = live_event("Q1", "Say \"Hello\" Tour");
        quoted["status_code"] = json!("cancelled");
        quoted["venue"] = Value::Null;
        quoted["images"] = json!([]);
        quoted["image"] = json!({ "url": "https://img/fallback.jpg" });

        let html = page(vec![live_event("E1", "Summer Show"), parking, elsewhere, quoted]);
        let out = ShorelineAdapter::new(Arc::new(StubFetcher::always(html))).scrape().await;

        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.events.len(), 2);

        let show = &out.events[0];
        assert_eq!(show.source_event_id, "E1");
        assert_eq!(show.start_time.to_rfc3339(), "2026-06-21T02:30:00+00:00");
        assert_eq!(show.image_url.as_deref(), Some("https://img/retina.jpg"));
        assert_eq!(show.ticket_url, show.url);
        assert_eq!(show.event_type.as_deref(), Some("concert"));
        assert_eq!(show.subjects, vec!["rock", "music", "the band"]);
        assert_eq!(show.latitude, Some(37.4267));

        let quoted = &out.events[1];
        assert_eq!(quoted.title, "Say \"Hello\" Tour");
        assert!(quoted.is_canceled);
        assert_eq!(quoted.image_url.as_deref(), Some("https://img/fallback.jpg"));
        assert_eq!(quoted.latitude, Some(LATITUDE));
        assert_eq!(quoted.location.as_deref(), Some(LOCATION));
    }

    #[tokio::test]
    async fn page_without_payload_is_a_diagnostic() {
        let out = ShorelineAdapter::new(Arc::new(StubFetcher::always("<html></html>")))
            .scrape()
            .await;
        assert!(out.events.is_empty());
        assert_eq!(out.errors, vec!["No event data found in LiveNation page RSC payload".to_string()]);
    }

    #[tokio::test]
    async fn page_failure_is_fatal() {
        let out = ShorelineAdapter::new(Arc::new(StubFetcher::failing(403))).scrape().await;
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].starts_with("Fatal scraper error: LiveNation page request failed"));
        assert!(out.errors[0].contains("403"));
    }
}
