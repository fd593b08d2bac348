// src/ingest/providers/cal_academy.rs
//! California Academy of Sciences daily calendar, one page per day.
//!
//! The site sets a session cookie on its landing page and tends to answer
//! cookieless or rapid-fire requests with errors, so the adapter warms the
//! cookie store first and stops early once several days in a row fail.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::{Fetcher, RequestProfile};
use crate::ingest::providers::CAL_ACADEMY;
use crate::ingest::taxonomy::{first_keyword_match, normalize_event_type};
use crate::ingest::text::parse_clock;
use crate::ingest::timezone::{local_date, pacific};
use crate::ingest::types::{NormalizedEvent, DEFAULT_TIMEZONE};
use crate::ingest::collapse_whitespace;

const BASE_URL: &str = "https://www.calacademy.org";
const LANDING_PATH: &str = "/daily-calendar";
const CALENDAR_PATH: &str = "/daily-calendar-view";

const VENUE: &str = "California Academy of Sciences";
const ADDRESS: &str = "55 Music Concourse Dr, San Francisco, CA 94118";
const LATITUDE: f64 = 37.7699;
const LONGITUDE: f64 = -122.4661;

pub const DAYS_AHEAD: i64 = 30;
pub const MAX_CONSECUTIVE_FAILURES: usize = 5;
const DEFAULT_TIME: (u32, u32) = (10, 0);

static ROWS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".view-content .views-row, .view-content .event-item, .view-content > div").unwrap()
});
static EVENT_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href*="/events/"]"#).unwrap());
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, .time, .views-field-field-time, time").unwrap());
static LOCATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".location, .field-name-field-location").unwrap());
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, .field-name-body, .description").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

static RE_CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d{1,2}(?::\d{2})?\s*[ap]\.?m\.?").unwrap());
static RE_MUSEUM_HOURS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^museum\s+(opens?|closes?)").unwrap());

const TYPE_RULES: &[(&[&str], &str)] = &[
    (&["planetarium", "stars"], "astronomy"),
    (&["lecture", "talk"], "lecture"),
    (&["film", "screen"], "film"),
    (&["exhibit"], "exhibition"),
    (&["workshop", "class"], "workshop"),
];

fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).map(text_of).find(|t| !t.is_empty())
}

fn infer_type(title: &str, description: Option<&str>) -> Option<&'static str> {
    normalize_event_type(title).or_else(|| {
        let combined = format!("{title} {}", description.unwrap_or_default()).to_lowercase();
        first_keyword_match(&combined, TYPE_RULES)
    })
}

/// Path part of an event href, with any scheme and host removed.
fn event_path(href: &str) -> &str {
    match href.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
        None => href,
    }
}

/// Fields read from one calendar row or bare link.
struct Listing<'a> {
    href: &'a str,
    title: String,
    time: (u32, u32),
    time_text: Option<String>,
    room: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
}

struct DayParser {
    date: NaiveDate,
    seen: HashSet<String>,
    out: Vec<NormalizedEvent>,
}

impl DayParser {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, l: Listing<'_>) {
        if l.title.is_empty() || RE_MUSEUM_HOURS.is_match(&l.title) {
            return;
        }
        let path = event_path(l.href);
        let date_str = self.date.format("%Y-%m-%d").to_string();
        // The same session can be linked twice on a day.
        if !self.seen.insert(format!("{path}::{date_str}")) {
            return;
        }
        let d = self.date;
        let Some(start) = pacific(d.year(), d.month(), d.day(), l.time.0, l.time.1) else {
            return;
        };

        let id_stem = path.trim_start_matches("/events/").replace('/', "-");
        let url = if l.href.starts_with("http") {
            l.href.to_string()
        } else {
            format!("{BASE_URL}{path}")
        };

        let mut ev = NormalizedEvent::new(format!("{id_stem}::{date_str}"), l.title.clone(), start);
        ev.event_type = infer_type(&l.title, l.description.as_deref()).map(str::to_string);
        ev.location = Some(match &l.room {
            Some(room) => format!("{VENUE} - {room}"),
            None => VENUE.to_string(),
        });
        ev.address = Some(ADDRESS.to_string());
        ev.latitude = Some(LATITUDE);
        ev.longitude = Some(LONGITUDE);
        ev.url = Some(url);
        ev.image_url = l.image_url;
        ev.subjects = l.room.iter().map(|r| r.to_lowercase()).collect();
        ev.raw_data = json!({
            "date": date_str,
            "timeText": l.time_text,
            "href": l.href,
            "location": l.room,
        });
        ev.description = l.description;
        self.out.push(ev);
    }
}

/// Events on one day page. Rows are preferred; pages without the row
/// container fall back to every event link at the default time.
pub(crate) fn parse_day(html: &str, date: NaiveDate) -> Vec<NormalizedEvent> {
    let doc = Html::parse_document(html);
    let mut day = DayParser::new(date);
    let rows: Vec<_> = doc.select(&ROWS).collect();

    if rows.is_empty() {
        for link in doc.select(&EVENT_LINK) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            day.push(Listing {
                href,
                title: text_of(link),
                time: DEFAULT_TIME,
                time_text: None,
                room: None,
                description: None,
                image_url: None,
            });
        }
        return day.out;
    }

    for row in rows {
        let Some(link) = row.select(&EVENT_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let time_text = first_text(row, &TIME).or_else(|| {
            RE_CLOCK
                .find(&text_of(row))
                .map(|m| m.as_str().to_string())
        });
        let time = time_text.as_deref().and_then(parse_clock).unwrap_or(DEFAULT_TIME);
        day.push(Listing {
            href,
            title: text_of(link),
            time,
            time_text,
            room: first_text(row, &LOCATION),
            description: first_text(row, &DESCRIPTION),
            image_url: row
                .select(&IMG)
                .find_map(|img| img.value().attr("src"))
                .map(str::to_string),
        });
    }
    day.out
}

pub struct CalAcademyAdapter {
    fetcher: Arc<dyn Fetcher>,
    now: Option<DateTime<Utc>>,
}

impl CalAcademyAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, now: None }
    }

    /// Pin the first calendar day.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

#[async_trait]
impl SourceAdapter for CalAcademyAdapter {
    fn slug(&self) -> &str {
        CAL_ACADEMY
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let landing = format!("{BASE_URL}{LANDING_PATH}");
        if let Err(e) = self.fetcher.get_text(&landing, RequestProfile::Browser).await {
            tracing::debug!(target: "ingest", source = CAL_ACADEMY, error = %e, "session prefetch failed");
        }

        let today = local_date(DEFAULT_TIMEZONE, self.now.unwrap_or_else(Utc::now));
        let mut events = Vec::new();
        let mut consecutive_failures = 0usize;

        for offset in 0..DAYS_AHEAD {
            let date = today + Duration::days(offset);
            let date_str = date.format("%Y-%m-%d");
            let url = format!("{BASE_URL}{CALENDAR_PATH}/{date_str}");

            match self.fetcher.get_text(&url, RequestProfile::Browser).await {
                Ok(html) => {
                    consecutive_failures = 0;
                    events.extend(parse_day(&html, date));
                }
                Err(e) => {
                    consecutive_failures += 1;
                    match e.status() {
                        Some(status) => diag.push(format!("Calendar page {date_str} returned {status}")),
                        None => diag.push(format!("Failed to scrape {date_str}: {e}")),
                    }
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        diag.push(format!(
                            "Stopped after {consecutive_failures} consecutive failed calendar pages; \
                             the site is likely blocking automated requests"
                        ));
                        break;
                    }
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::{FetchError, StubFetcher};
    use chrono::{TimeZone, Timelike};
    use chrono_tz::America::Los_Angeles;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day_html(rows: &[(&str, &str, &str, &str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(time, title, href, room, desc)| {
                format!(
                    r#"<div class="events-container">
      <h3>{time}</h3>
      <div class="views-field-title"><span class="field-content"><a href="{href}">{title}</a></span></div>
      <div class="views-field-location"><div class="field-content location">{room}</div></div>
      <p>{desc}</p>
    </div>"#
                )
            })
            .collect();
        format!(
            r#"<html><body><div class="view view-daily-calendar"><div class="view-content">{rows}</div></div></body></html>"#
        )
    }

    fn sample_day() -> String {
        day_html(&[
            (
                "10:30 a.m.",
                "Planetarium Show: Living Worlds",
                "/events/planetarium/living-worlds",
                "Planetarium",
                "Explore the search for life beyond Earth in our state-of-the-art planetarium.",
            ),
            (
                "11:30 a.m.",
                "Earthquake Exhibit Tour",
                "/events/tours/earthquake-exhibit",
                "Earthquake Gallery",
                "Guided tour of the earthquake exhibit.",
            ),
            (
                "1 p.m.",
                "Science Lecture: Ocean Ecosystems",
                "https://www.calacademy.org/events/lectures/ocean-ecosystems",
                "Forum Theater",
                "A lecture on the health of our ocean ecosystems.",
            ),
            ("9:30 a.m.", "Museum Opens", "/events/museum-hours/museum-opens-1", "Entrance", ""),
            (
                "1 p.m.",
                "Science Lecture: Ocean Ecosystems",
                "/events/lectures/ocean-ecosystems",
                "Forum Theater",
                "Repeated link.",
            ),
        ])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 19, 0, 0).unwrap()
    }

    #[test]
    fn parses_rows() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let events = parse_day(&sample_day(), date);
        assert_eq!(events.len(), 3, "museum hours and repeats are skipped");

        let planetarium = &events[0];
        assert_eq!(planetarium.source_event_id, "planetarium-living-worlds::2026-05-01");
        assert_eq!(planetarium.url.as_deref(), Some("https://www.calacademy.org/events/planetarium/living-worlds"));
        assert_eq!(planetarium.location.as_deref(), Some("California Academy of Sciences - Planetarium"));
        assert_eq!(planetarium.subjects, vec!["planetarium"]);
        assert_eq!(planetarium.event_type.as_deref(), Some("astronomy"));
        let local = planetarium.start_time.with_timezone(&Los_Angeles);
        assert_eq!((local.hour(), local.minute()), (10, 30));

        assert_eq!(events[1].event_type.as_deref(), Some("exhibition"));
        assert_eq!(events[2].event_type.as_deref(), Some("lecture"));
        assert_eq!(events[2].start_time.with_timezone(&Los_Angeles).hour(), 13);
        assert_eq!(events[2].source_event_id, "lectures-ocean-ecosystems::2026-05-01");
    }

    #[test]
    fn title_field_is_not_taken_for_room() {
        let html = r#"<html><body><div class="view-content"><div class="events-container">
            <h3>2 p.m.</h3>
            <div class="views-field-title"><span class="field-content"><a href="/events/talks/coral">Coral Talk</a></span></div>
        </div></div></body></html>"#;
        let date = NaiveDate::from_ymd_opt(2026, 5, 3).unwrap();
        let events = parse_day(html, date);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location.as_deref(), Some(VENUE));
        assert!(events[0].subjects.is_empty());
    }

    #[test]
    fn bare_links_fallback() {
        let html = r#"<html><body><ul>
            <li><a href="/events/nightlife/thursday">NightLife</a></li>
            <li><a href="/events/museum-hours/close">Museum Closes</a></li>
        </ul></body></html>"#;
        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let events = parse_day(html, date);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location.as_deref(), Some(VENUE));
        assert_eq!(events[0].start_time.with_timezone(&Los_Angeles).hour(), 10);
    }

    #[tokio::test]
    async fn walks_thirty_days_after_prefetch() {
        let stub = Arc::new(StubFetcher::always(sample_day()));
        let out = CalAcademyAdapter::new(stub.clone()).with_now(now()).scrape().await;

        assert!(out.errors.is_empty());
        assert_eq!(out.events.len(), 3 * DAYS_AHEAD as usize);
        assert!(crate::ingest::duplicate_ids(&out.events).is_empty());

        let urls = stub.requested();
        assert_eq!(urls.len(), 1 + DAYS_AHEAD as usize);
        assert_eq!(urls[0], "https://www.calacademy.org/daily-calendar");
        assert_eq!(urls[1], "https://www.calacademy.org/daily-calendar-view/2026-05-01");
        assert_eq!(urls[30], "https://www.calacademy.org/daily-calendar-view/2026-05-30");
    }

    #[tokio::test]
    async fn isolated_day_failures_are_partial() {
        let calls = AtomicUsize::new(0);
        let body = sample_day();
        let stub = StubFetcher::new(move |url| {
            // Call 1 is the prefetch; calls 2 and 3 are the first two days.
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(FetchError::Status { url: url.to_string(), status: 500 })
            } else {
                Ok(body.clone())
            }
        });
        let out = CalAcademyAdapter::new(Arc::new(stub)).with_now(now()).scrape().await;
        assert_eq!(out.events.len(), 3 * 28);
        assert_eq!(
            out.errors,
            vec![
                "Calendar page 2026-05-01 returned 500".to_string(),
                "Calendar page 2026-05-02 returned 500".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn aborts_after_consecutive_failures() {
        let stub = Arc::new(StubFetcher::failing(403));
        let out = CalAcademyAdapter::new(stub.clone()).with_now(now()).scrape().await;

        assert!(out.events.is_empty());
        assert_eq!(out.errors.len(), MAX_CONSECUTIVE_FAILURES + 1);
        assert!(out.errors.last().unwrap().contains("blocking automated requests"));
        assert_eq!(stub.call_count(), 1 + MAX_CONSECUTIVE_FAILURES);
    }
}
