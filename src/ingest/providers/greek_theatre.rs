// src/ingest/providers/greek_theatre.rs
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::collapse_whitespace;
use crate::ingest::fetch::{Fetcher, RequestProfile};
use crate::ingest::providers::GREEK_THEATRE;
use crate::ingest::text::{infer_year, month_from_name, parse_clock};
use crate::ingest::timezone::{local_date, pacific};
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};

const CALENDAR_URL: &str = "https://thegreekberkeley.com/calendar/";
const EVENT_BASE: &str = "https://thegreekberkeley.com/events/";

const LOCATION: &str = "Greek Theatre";
const ADDRESS: &str = "2001 Gayley Road, Berkeley, CA 94720";
const LATITUDE: f64 = 37.8741;
const LONGITUDE: f64 = -122.2538;

// Listings drop the year; dates further back than this roll into next year.
const PAST_GRACE_DAYS: i64 = 60;
const DEFAULT_SHOW_TIME: (u32, u32) = (19, 0);

static EVENT_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href*="/events/"]"#).unwrap());
static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, h3").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static TICKETMASTER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="ticketmaster.com"]"#).unwrap());
static TICKETS: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href*="tickets"]"#).unwrap());

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:mon|tue|wed|thu|fri|sat|sun)\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+(\d{1,2})\b")
        .unwrap()
});
static RE_SHOW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)show:\s*(\d{1,2}:\d{2}\s*[ap]m)").unwrap());
static RE_DOORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)doors:\s*(\d{1,2}:\d{2}\s*[ap]m)").unwrap());

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .find_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Nearest enclosing block that holds the rest of an event card.
fn card_container(link: ElementRef<'_>) -> Option<ElementRef<'_>> {
    link.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| matches!(el.value().name(), "div" | "article" | "section" | "li"))
}

/// Event slug for links into the venue's own event pages.
fn event_slug(href: &str) -> Option<String> {
    if !href.contains("thegreekberkeley.com/events/") && !href.starts_with("/events/") {
        return None;
    }
    let (_, rest) = href.rsplit_once("/events/")?;
    let slug = rest.trim_end_matches('/');
    (!slug.is_empty()).then(|| slug.to_string())
}

fn show_time(text: &str) -> (u32, u32) {
    RE_SHOW
        .captures(text)
        .or_else(|| RE_DOORS.captures(text))
        .and_then(|c| parse_clock(&c[1]))
        .unwrap_or(DEFAULT_SHOW_TIME)
}

pub(crate) fn parse_calendar(html: &str, today: NaiveDate) -> Vec<NormalizedEvent> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for link in doc.select(&EVENT_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        // Every card links to its event page more than once.
        let Some(slug) = event_slug(href) else {
            continue;
        };
        if !seen.insert(slug.clone()) {
            continue;
        }
        let Some(container) = card_container(link) else {
            continue;
        };

        let link_text = element_text(link);
        let title = first_text(link, &HEADING)
            .or_else(|| first_text(container, &HEADING))
            .or_else(|| {
                (!link_text.is_empty() && link_text != "More Info" && link_text != "Buy Tickets")
                    .then_some(link_text)
            });
        let Some(title) = title else {
            continue;
        };

        let text = element_text(container);
        let Some(date) = RE_DATE.captures(&text) else {
            continue;
        };
        let Some(month) = month_from_name(&date[1]) else {
            continue;
        };
        let Ok(day) = date[2].parse::<u32>() else {
            continue;
        };
        let Some(year) = infer_year(today, month, day, PAST_GRACE_DAYS) else {
            continue;
        };
        let (hour, minute) = show_time(&text);
        let Some(start) = pacific(year, month, day, hour, minute) else {
            continue;
        };

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{EVENT_BASE}{slug}")
        };
        let ticket_url = first_attr(container, &TICKETMASTER, "href")
            .or_else(|| first_attr(container, &TICKETS, "href"))
            .unwrap_or_else(|| url.clone());
        let image_url = first_attr(link, &IMG, "src").or_else(|| first_attr(container, &IMG, "src"));
        let sold_out = text.to_lowercase().contains("sold out");

        let mut ev = NormalizedEvent::new(slug.clone(), title.clone(), start);
        ev.location = Some(LOCATION.to_string());
        ev.address = Some(ADDRESS.to_string());
        ev.latitude = Some(LATITUDE);
        ev.longitude = Some(LONGITUDE);
        ev.url = Some(url);
        ev.ticket_url = Some(ticket_url);
        ev.image_url = image_url;
        ev.cost = sold_out.then(|| "Sold Out".to_string());
        ev.event_type = Some("concert".to_string());
        ev.audience = Some("public".to_string());
        ev.subjects = vec![title.to_lowercase()];
        ev.raw_data = json!({ "eventSlug": slug, "dateText": &date[0] });
        out.push(ev);
    }
    out
}

/// Calendar page of the Greek Theatre in Berkeley. A failed page load is fatal.
pub struct GreekTheatreAdapter {
    fetcher: Arc<dyn Fetcher>,
    now: Option<DateTime<Utc>>,
}

impl GreekTheatreAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, now: None }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

#[async_trait]
impl SourceAdapter for GreekTheatreAdapter {
    fn slug(&self) -> &str {
        GREEK_THEATRE
    }

    async fn fetch_and_parse(&self, _diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let html = self
            .fetcher
            .get_text(CALENDAR_URL, RequestProfile::Browser)
            .await
            .context("Greek Theatre page request failed")?;
        let today = local_date(DEFAULT_TIMEZONE, self.now.unwrap_or_else(Utc::now));
        Ok(parse_calendar(&html, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::StubFetcher;
    use chrono::{Datelike, TimeZone, Timelike};
    use chrono_tz::America::Los_Angeles;

    const SAMPLE_HTML: &str = r#"
<html><body>
<div class="events-list">
  <div class="event-card">
    <a href="https://thegreekberkeley.com/events/royel-otis-260416">
      <img src="https://thegreekberkeley.com/wp-content/uploads/2025/12/RoyelOtis-353x192.png" alt="Royel Otis">
      <h3>Royel Otis</h3>
    </a>
    <div>Thu Apr 16</div>
    <div>Greek Theatre</div>
    <div>Berkeley, CA</div>
    <div>Doors: 5:30 pm Show: 7:00 pm</div>
    <a href="https://www.ticketmaster.com/royel-otis-berkeley-04-16-2026/event/1C006389A5AD90C2">Buy Tickets</a>
    <a href="https://thegreekberkeley.com/events/royel-otis-260416">More Info</a>
  </div>
  <div class="event-card">
    <a href="https://thegreekberkeley.com/events/lewis-capaldi-260503/">
      <h3>Lewis Capaldi</h3>
    </a>
    <div>Sun May 03</div>
    <div>Doors: 6:00 pm Show: 7:30 pm</div>
  </div>
  <div class="event-card">
    <a href="/events/sold-out-show-260610"><h3>Sold Out Show</h3></a>
    <div>Wed Jun 10</div>
    <div>Doors: 6:30 pm</div>
    <div>Sold Out!</div>
  </div>
  <div class="event-card">
    <a href="https://thegreekberkeley.com/events/no-date"><h3>Mystery Guest</h3></a>
    <div>Date to be announced</div>
  </div>
  <div class="event-card">
    <a href="https://www.ticketmaster.com/events/elsewhere">Elsewhere</a>
  </div>
</div>
</body></html>"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn local(dt: DateTime<Utc>) -> chrono::DateTime<chrono_tz::Tz> {
        dt.with_timezone(&Los_Angeles)
    }

    #[test]
    fn slugs_only_for_venue_links() {
        assert_eq!(event_slug("https://thegreekberkeley.com/events/a-b/").as_deref(), Some("a-b"));
        assert_eq!(event_slug("/events/x").as_deref(), Some("x"));
        assert_eq!(event_slug("https://www.ticketmaster.com/events/elsewhere"), None);
        assert_eq!(event_slug("/events/"), None);
    }

    #[test]
    fn parses_cards() {
        let events = parse_calendar(SAMPLE_HTML, today());
        assert_eq!(events.len(), 3);

        let first = &events[0];
        assert_eq!(first.source_event_id, "royel-otis-260416");
        assert_eq!(first.title, "Royel Otis");
        assert_eq!(first.url.as_deref(), Some("https://thegreekberkeley.com/events/royel-otis-260416"));
        assert!(first.ticket_url.as_deref().unwrap().contains("ticketmaster.com"));
        assert!(first.image_url.as_deref().unwrap().ends_with("RoyelOtis-353x192.png"));
        assert_eq!(first.event_type.as_deref(), Some("concert"));
        assert_eq!(first.subjects, vec!["royel otis"]);
        let start = local(first.start_time);
        assert_eq!((start.year(), start.month(), start.day()), (2026, 4, 16));
        assert_eq!((start.hour(), start.minute()), (19, 0));

        let second = &events[1];
        assert_eq!(second.source_event_id, "lewis-capaldi-260503");
        assert_eq!(second.ticket_url, second.url);
        assert_eq!((local(second.start_time).hour(), local(second.start_time).minute()), (19, 30));

        let third = &events[2];
        assert_eq!(third.url.as_deref(), Some("https://thegreekberkeley.com/events/sold-out-show-260610"));
        assert_eq!(third.cost.as_deref(), Some("Sold Out"));
        // Doors time is used when no show time is printed.
        assert_eq!(local(third.start_time).hour(), 18);
    }

    #[test]
    fn dates_well_in_the_past_roll_to_next_year() {
        let late_year = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        let events = parse_calendar(SAMPLE_HTML, late_year);
        assert_eq!(local(events[0].start_time).year(), 2027);
    }

    #[tokio::test]
    async fn page_failure_is_fatal() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let out = GreekTheatreAdapter::new(Arc::new(StubFetcher::failing(503)))
            .with_now(now)
            .scrape()
            .await;
        assert!(out.events.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("503"));
    }

    #[tokio::test]
    async fn empty_page_yields_nothing() {
        let out = GreekTheatreAdapter::new(Arc::new(StubFetcher::always("<html><body><p>No events scheduled</p></body></html>")))
            .scrape()
            .await;
        assert!(out.events.is_empty());
        assert!(out.errors.is_empty());
    }
}
