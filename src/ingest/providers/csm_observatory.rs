// src/ingest/providers/csm_observatory.rs
//! College of San Mateo astronomy: Jazz Under the Stars on the observatory
//! page, The Sky Tonight shows and SMCAS talks on the planetarium page.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::collapse_whitespace;
use crate::ingest::fetch::{Fetcher, RequestProfile};
use crate::ingest::providers::CSM_OBSERVATORY;
use crate::ingest::text::{parse_clock_range, parse_month_day};
use crate::ingest::timezone::{local_date, pacific};
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};

const OBSERVATORY_URL: &str = "https://collegeofsanmateo.edu/astronomy/observatory.asp";
const PLANETARIUM_URL: &str = "https://collegeofsanmateo.edu/astronomy/planetarium.asp";

const OBSERVATORY_LOCATION: &str = "College of San Mateo Observatory, Building 36, 4th Floor";
const PLANETARIUM_LOCATION: &str = "College of San Mateo Planetarium, Building 36";
const ADDRESS: &str = "1700 W Hillsdale Blvd, San Mateo, CA 94402";
const LATITUDE: f64 = 37.5385;
const LONGITUDE: f64 = -122.4651;

const JAZZ_TITLE: &str = "Jazz Under the Stars";
const JAZZ_DESCRIPTION: &str = "Free public stargazing event at the College of San Mateo Observatory. \
Enjoy jazz music while viewing celestial objects through telescopes. Weather permitting.";
const SHOW_TITLE: &str = "The Sky Tonight";
const SHOW_DESCRIPTION: &str = "Planetarium show at the College of San Mateo covering the current night sky.";
const SMCAS_TITLE: &str = "SMCAS Monthly Meeting";
const SMCAS_DESCRIPTION: &str =
    "Monthly meeting of the San Mateo County Astronomical Society with a guest speaker.";

// Planetarium programs run 7-9pm.
const PLANETARIUM_START: (u32, u32) = (19, 0);
const PLANETARIUM_END: (u32, u32) = (21, 0);

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    row.select(&CELL)
        .map(|td| collapse_whitespace(&td.text().collect::<String>()))
        .collect()
}

fn is_tbd(s: &str) -> bool {
    s.is_empty() || s.to_ascii_lowercase().contains("tbd")
}

fn venue_event(
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &str,
    url: &str,
) -> NormalizedEvent {
    let mut ev = NormalizedEvent::new(id, title, start);
    ev.end_time = Some(end);
    ev.location = Some(location.to_string());
    ev.address = Some(ADDRESS.to_string());
    ev.latitude = Some(LATITUDE);
    ev.longitude = Some(LONGITUDE);
    ev.url = Some(url.to_string());
    ev.cost = Some("Free".to_string());
    ev.audience = Some("public".to_string());
    ev
}

/// One schedule row: `Jan 24 | 7:00-9:00PM`.
fn jazz_row(date_text: &str, time_text: &str, year: i32) -> Option<NormalizedEvent> {
    if is_tbd(time_text) {
        return None;
    }
    let (month, day) = parse_month_day(date_text)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let ((sh, sm), (eh, em)) = parse_clock_range(time_text)?;
    let start = pacific(year, month, day, sh, sm)?;
    let end = pacific(year, month, day, eh, em)?;

    let mut ev = venue_event(
        format!("csm-jazz-{date}"),
        JAZZ_TITLE.to_string(),
        start,
        end,
        OBSERVATORY_LOCATION,
        OBSERVATORY_URL,
    );
    ev.description = Some(JAZZ_DESCRIPTION.to_string());
    ev.event_type = Some("astronomy".to_string());
    ev.subjects = vec!["astronomy".into(), "jazz".into(), "stargazing".into()];
    ev.raw_data = json!({ "dateText": date_text, "timeText": time_text });
    Some(ev)
}

pub(crate) fn parse_observatory(html: &str, year: i32) -> Vec<NormalizedEvent> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for table in doc.select(&TABLE) {
        for row in table.select(&ROW).skip(1) {
            let cells = cell_texts(row);
            if cells.len() < 2 {
                continue;
            }
            out.extend(jazz_row(&cells[0], &cells[1], year));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Program {
    SkyTonight,
    Smcas,
}

impl Program {
    /// Tables are told apart by their second header cell.
    fn from_header(cells: &[String]) -> Option<Self> {
        match cells.get(1)?.to_ascii_lowercase().as_str() {
            "title" => Some(Program::SkyTonight),
            "speaker" => Some(Program::Smcas),
            _ => None,
        }
    }
}

fn planetarium_row(program: Program, date_text: &str, detail: &str, year: i32) -> Option<NormalizedEvent> {
    // Rows like "No Show in February" carry no day and are skipped.
    let (month, day) = parse_month_day(date_text)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let start = pacific(year, month, day, PLANETARIUM_START.0, PLANETARIUM_START.1)?;
    let end = pacific(year, month, day, PLANETARIUM_END.0, PLANETARIUM_END.1)?;
    let detail = (!is_tbd(detail)).then_some(detail);

    let (id, title, description, event_type, subjects) = match program {
        Program::SkyTonight => (
            format!("csm-planetarium-{date}"),
            detail.map_or_else(|| SHOW_TITLE.to_string(), |t| format!("{SHOW_TITLE}: {t}")),
            SHOW_DESCRIPTION,
            "astronomy",
            vec!["astronomy", "planetarium"],
        ),
        Program::Smcas => (
            format!("csm-smcas-{date}"),
            detail.map_or_else(|| SMCAS_TITLE.to_string(), |s| format!("SMCAS: {s}")),
            SMCAS_DESCRIPTION,
            "lecture",
            vec!["astronomy", "planetarium", "smcas"],
        ),
    };

    let mut ev = venue_event(id, title, start, end, PLANETARIUM_LOCATION, PLANETARIUM_URL);
    ev.description = Some(description.to_string());
    ev.event_type = Some(event_type.to_string());
    ev.subjects = subjects.into_iter().map(str::to_string).collect();
    ev.raw_data = json!({ "dateText": date_text, "detail": detail });
    Some(ev)
}

pub(crate) fn parse_planetarium(html: &str, year: i32) -> Vec<NormalizedEvent> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for table in doc.select(&TABLE) {
        let mut rows = table.select(&ROW);
        let Some(program) = rows.next().and_then(|h| Program::from_header(&cell_texts(h))) else {
            continue;
        };
        for row in rows {
            let cells = cell_texts(row);
            if cells.len() < 2 {
                continue;
            }
            out.extend(planetarium_row(program, &cells[0], &cells[1], year));
        }
    }
    out
}

/// Both pages are scraped independently; one failing leaves the other intact.
pub struct CsmObservatoryAdapter {
    fetcher: Arc<dyn Fetcher>,
    now: Option<DateTime<Utc>>,
}

impl CsmObservatoryAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, now: None }
    }

    /// Pin the clock used to pick the schedule year.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn year(&self) -> i32 {
        local_date(DEFAULT_TIMEZONE, self.now.unwrap_or_else(Utc::now)).year()
    }
}

#[async_trait]
impl SourceAdapter for CsmObservatoryAdapter {
    fn slug(&self) -> &str {
        CSM_OBSERVATORY
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let year = self.year();
        let mut events = Vec::new();

        match self.fetcher.get_text(OBSERVATORY_URL, RequestProfile::Plain).await {
            Ok(html) => events.extend(parse_observatory(&html, year)),
            Err(e) => diag.push(format!("Observatory page: {e}")),
        }
        match self.fetcher.get_text(PLANETARIUM_URL, RequestProfile::Plain).await {
            Ok(html) => events.extend(parse_planetarium(&html, year)),
            Err(e) => diag.push(format!("Planetarium page: {e}")),
        }

        Ok(events)
    }
}
