// src/ingest/providers/stanford.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::Fetcher;
use crate::ingest::providers::{coordinate, fetch_json_page, id_string, null_as_default, STANFORD};
use crate::ingest::taxonomy::normalize_event_type;
use crate::ingest::types::NormalizedEvent;
use crate::ingest::{non_empty, parse_instant};

const API_URL: &str = "https://events.stanford.edu/api/2/events";
const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default, deserialize_with = "null_as_default")]
    events: Vec<Value>,
    page: PageInfo,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    /// Total number of pages, not events.
    total: u32,
}

#[derive(Debug, Deserialize)]
struct Item {
    event: StanfordEvent,
}

#[derive(Debug, Deserialize)]
struct StanfordEvent {
    id: Value,
    title: String,
    description_text: Option<String>,
    description: Option<String>,
    location_name: Option<String>,
    room_number: Option<String>,
    address: Option<String>,
    geo: Option<Geo>,
    localist_url: Option<String>,
    ticket_url: Option<String>,
    ticket_cost: Option<String>,
    free: Option<bool>,
    photo_url: Option<String>,
    experience: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    event_instances: Vec<InstanceWrapper>,
    filters: Option<Filters>,
    #[serde(default, deserialize_with = "null_as_default")]
    departments: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Geo {
    latitude: Option<Value>,
    longitude: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InstanceWrapper {
    event_instance: Instance,
}

#[derive(Debug, Deserialize)]
struct Instance {
    start: Option<String>,
    end: Option<String>,
    all_day: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct Filters {
    #[serde(default, deserialize_with = "null_as_default")]
    event_types: Vec<Named>,
    #[serde(default, deserialize_with = "null_as_default")]
    event_audience: Vec<Named>,
    #[serde(default, deserialize_with = "null_as_default")]
    event_subject: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

/// Localist JSON API, page-number pagination.
pub struct StanfordAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl StanfordAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn normalize(raw: Value, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
        let item: Item = match serde_json::from_value(raw.clone()) {
            Ok(item) => item,
            Err(e) => {
                let id = raw.pointer("/event/id").and_then(id_string).unwrap_or_default();
                diag.push(format!("Failed to parse event {id}: {e}"));
                return None;
            }
        };
        let e = item.event;
        let id = id_string(&e.id)?;

        // Only the first instance of a recurring event is kept.
        let instance = e.event_instances.into_iter().next()?.event_instance;
        let start_raw = instance.start?;
        let Some(start) = parse_instant(&start_raw) else {
            diag.push(format!("Failed to parse event {id}: bad start {start_raw:?}"));
            return None;
        };

        let location = [e.location_name.as_deref(), e.room_number.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let filters = e.filters.unwrap_or_default();
        let geo = e.geo.as_ref();

        let mut ev = NormalizedEvent::new(id, e.title, start);
        ev.description = non_empty(e.description_text.as_deref());
        ev.description_html = non_empty(e.description.as_deref());
        ev.end_time = instance.end.as_deref().and_then(parse_instant);
        ev.is_all_day = instance.all_day.unwrap_or(false);
        ev.location = non_empty(Some(location.as_str()));
        ev.address = non_empty(e.address.as_deref());
        ev.latitude = geo.and_then(|g| coordinate(g.latitude.as_ref()));
        ev.longitude = geo.and_then(|g| coordinate(g.longitude.as_ref()));
        ev.url = non_empty(e.localist_url.as_deref());
        ev.ticket_url = non_empty(e.ticket_url.as_deref());
        ev.image_url = non_empty(e.photo_url.as_deref());
        ev.cost = if e.free.unwrap_or(false) {
            Some("Free".to_string())
        } else {
            non_empty(e.ticket_cost.as_deref())
        };
        ev.is_canceled = e.status.as_deref() == Some("canceled");
        ev.is_online = matches!(e.experience.as_deref(), Some("virtual") | Some("hybrid"));
        ev.event_type = filters
            .event_types
            .first()
            .and_then(|t| normalize_event_type(&t.name))
            .map(str::to_string);
        ev.audience = filters.event_audience.first().and_then(|a| non_empty(Some(a.name.as_str())));
        ev.subjects = filters.event_subject.into_iter().map(|s| s.name).collect();
        ev.department = e.departments.first().and_then(|d| non_empty(Some(d.name.as_str())));
        ev.raw_data = raw;
        Some(ev)
    }
}

#[async_trait]
impl SourceAdapter for StanfordAdapter {
    fn slug(&self) -> &str {
        STANFORD
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let mut out = Vec::new();
        let mut page = 1u32;
        let mut total_pages = 1u32;

        while page <= total_pages {
            let url = format!("{API_URL}?page={page}&per_page={PER_PAGE}");
            let position = format!("on page {page}");
            let Some(data) =
                fetch_json_page::<ApiPage>(self.fetcher.as_ref(), &url, &position, page == 1, diag).await?
            else {
                break;
            };
            total_pages = data.page.total;
            out.extend(data.events.into_iter().filter_map(|raw| Self::normalize(raw, diag)));
            page += 1;
        }

        Ok(out)
    }
}
