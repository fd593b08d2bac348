// src/ingest/providers/ics.rs
//! iCalendar feeds: any user-submitted ICS source, plus Cal Bears athletics.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::{Fetcher, RequestProfile};
use crate::ingest::providers::CAL_BEARS;
use crate::ingest::taxonomy::infer_audience;
use crate::ingest::text::unescape_ics_text;
use crate::ingest::timezone::{local_to_instant, pacific};
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};

const CAL_BEARS_URL: &str = "https://calbears.com/calendar.ashx/calendar.ics";
pub const UNTITLED: &str = "Untitled Event";

/// Resolved DTSTART/DTEND.
struct IcsTime {
    instant: DateTime<Utc>,
    is_date: bool,
}

fn resolve_naive(naive: NaiveDateTime, zone: &str) -> Option<DateTime<Utc>> {
    local_to_instant(
        zone,
        naive.year(),
        naive.month(),
        naive.day(),
        naive.hour(),
        naive.minute(),
    )
}

fn resolve_date(date: NaiveDate) -> Option<DateTime<Utc>> {
    pacific(date.year(), date.month(), date.day(), 0, 0)
}

/// TZID values resolve through the zone database; floating times are read
/// as Pacific; unknown zone names fall back to Pacific too.
fn resolve_time(dt: DatePerhapsTime) -> Option<IcsTime> {
    let (instant, is_date) = match dt {
        DatePerhapsTime::Date(date) => (resolve_date(date)?, true),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => (dt, false),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            (resolve_naive(naive, DEFAULT_TIMEZONE)?, false)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let instant = resolve_naive(date_time, &tzid)
                .or_else(|| resolve_naive(date_time, DEFAULT_TIMEZONE))?;
            (instant, false)
        }
    };
    Some(IcsTime { instant, is_date })
}

fn text_prop(value: Option<&str>) -> Option<String> {
    value
        .map(|v| unescape_ics_text(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_vevent(ev: &Event, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
    let summary = text_prop(ev.get_summary());
    let Some(uid) = ev.get_uid().map(str::trim).filter(|u| !u.is_empty()) else {
        diag.push(format!(
            "Skipped VEVENT without UID: {}",
            summary.as_deref().unwrap_or(UNTITLED)
        ));
        return None;
    };
    let Some(start) = ev.get_start().and_then(resolve_time) else {
        tracing::debug!(target: "ingest", uid, "VEVENT without usable DTSTART skipped");
        return None;
    };
    let end = ev.get_end().and_then(resolve_time);

    let mut out = NormalizedEvent::new(uid, summary.clone().unwrap_or_else(|| UNTITLED.to_string()), start.instant);
    out.end_time = end.map(|e| e.instant);
    out.is_all_day = start.is_date;
    out.location = text_prop(ev.get_location());
    out.description = text_prop(ev.get_description());
    out.url = ev
        .property_value("URL")
        .map(|u| html_escape::decode_html_entities(u.trim()).to_string())
        .filter(|u| !u.is_empty());
    out.raw_data = json!({
        "uid": uid,
        "summary": summary,
        "location": ev.get_location(),
        "start": ev.property_value("DTSTART"),
        "end": ev.property_value("DTEND"),
    });
    Some(out)
}

/// Every VEVENT with a UID and a resolvable DTSTART; other components are ignored.
pub fn parse_feed(ics: &str, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
    let calendar: Calendar = ics
        .parse()
        .map_err(|e| anyhow!("invalid iCalendar data: {e}"))?;
    Ok(calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(ev) => normalize_vevent(ev, diag),
            _ => None,
        })
        .collect())
}

async fn fetch_feed(fetcher: &dyn Fetcher, url: &str) -> Result<String> {
    fetcher
        .get_text(url, RequestProfile::Plain)
        .await
        .context("ICS feed request failed")
}

/// Adapter for any ICS-kind source without a dedicated implementation.
pub struct GenericIcsAdapter {
    fetcher: Arc<dyn Fetcher>,
    slug: String,
    url: String,
}

impl GenericIcsAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>, slug: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            slug: slug.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for GenericIcsAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let body = fetch_feed(self.fetcher.as_ref(), &self.url).await?;
        let mut events = parse_feed(&body, diag)?;
        for ev in &mut events {
            let text = format!("{} {}", ev.title, ev.description.as_deref().unwrap_or_default());
            ev.audience = infer_audience(&text);
        }
        Ok(events)
    }
}

// Ordered: the women's/men's variants must win over the bare sport name.
static SPORT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"women's basketball",
        r"men's basketball",
        r"baseball",
        r"softball",
        r"football",
        r"women's soccer",
        r"men's soccer",
        r"volleyball",
        r"swimming",
        r"track & field",
        r"gymnastics",
        r"tennis",
        r"water polo",
        r"lacrosse",
        r"rowing",
        r"golf",
        r"rugby",
        r"field hockey",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

/// Sport named in a game title, as written in the title.
pub fn extract_sport(summary: &str) -> Option<String> {
    SPORT_PATTERNS
        .iter()
        .find_map(|re| re.find(summary))
        .map(|m| m.as_str().to_string())
}

/// Cal athletics schedule: every game is `sports`, tagged with its sport.
pub struct CalBearsAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl CalBearsAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SourceAdapter for CalBearsAdapter {
    fn slug(&self) -> &str {
        CAL_BEARS
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let body = fetch_feed(self.fetcher.as_ref(), CAL_BEARS_URL).await?;
        let mut events = parse_feed(&body, diag)?;
        for ev in &mut events {
            ev.event_type = Some("sports".to_string());
            ev.subjects = extract_sport(&ev.title).into_iter().collect();
        }
        Ok(events)
    }
}
