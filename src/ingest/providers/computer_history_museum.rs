// src/ingest/providers/computer_history_museum.rs
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::{FetchError, Fetcher, RequestProfile};
use crate::ingest::providers::COMPUTER_HISTORY_MUSEUM;
use crate::ingest::taxonomy::{first_keyword_match, normalize_event_type};
use crate::ingest::text::{month_from_name, parse_clock};
use crate::ingest::timezone::pacific;
use crate::ingest::types::NormalizedEvent;
use crate::ingest::{collapse_whitespace, non_empty};

const BASE_URL: &str = "https://computerhistory.org";
const EVENTS_URL: &str = "https://computerhistory.org/events/";

const LOCATION: &str = "Computer History Museum";
const ADDRESS: &str = "1401 N. Shoreline Blvd, Mountain View, CA 94043";
const LATITUDE: f64 = 37.4143;
const LONGITUDE: f64 = -122.0777;

const MAX_PARAGRAPHS: usize = 3;
const MIN_PARAGRAPH_LEN: usize = 30;

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href*="/events/"]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static TICKET_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="eventbrite.com"], a[href*="ticket"]"#).unwrap());
static OG_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());

static RE_DETAIL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/events/([a-z0-9-]+)/?$").unwrap());
// "March 11, 2026 7:00 pm", optionally followed by an en/em-dash or hyphen and an end time.
static RE_DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([a-z]+)\s+(\d{1,2}),?\s+(\d{4})\s+(\d{1,2}(?::\d{2})?\s*[ap]m)(?:\s*[\x{2013}\x{2014}-]\s*(\d{1,2}(?::\d{2})?\s*[ap]m))?",
    )
    .unwrap()
});
static RE_EVENTBRITE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"eventId['":\s]+['"]?(\d{10,})"#).unwrap());

const TYPE_RULES: &[(&[&str], &str)] = &[
    (&["exhibit"], "exhibition"),
    (&["film", "screening"], "film"),
    (&["workshop", "hands-on"], "workshop"),
    (&["concert", "music"], "concert"),
];

fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn meta_content(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .find_map(|m| m.value().attr("content"))
        .and_then(|c| non_empty(Some(c)))
}

/// Host-relative path with any trailing slash dropped; the dedup key for detail pages.
fn canonical_path(href: &str) -> &str {
    let path = match href.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => href,
    };
    path.trim_end_matches('/')
}

/// Unique detail-page URLs linked from the listing, in page order.
pub(crate) fn parse_listing(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for link in doc.select(&LINK) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if !RE_DETAIL_PATH.is_match(href) {
            continue;
        }
        if !seen.insert(canonical_path(href).to_string()) {
            continue;
        }
        urls.push(if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{BASE_URL}{href}")
        });
    }
    urls
}

struct DateRange {
    text: String,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

fn parse_date_range(page_text: &str) -> Option<DateRange> {
    let caps = RE_DATE_TIME.captures(page_text)?;
    let month = month_from_name(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let (h, m) = parse_clock(&caps[4])?;
    let start = pacific(year, month, day, h, m)?;
    let end = caps
        .get(5)
        .and_then(|t| parse_clock(t.as_str()))
        .and_then(|(h, m)| pacific(year, month, day, h, m));
    Some(DateRange {
        text: caps[0].to_string(),
        start,
        end,
    })
}

fn description(doc: &Html) -> Option<String> {
    meta_content(doc, &OG_DESCRIPTION).or_else(|| {
        let paragraphs: Vec<String> = doc
            .select(&PARAGRAPH)
            .map(text_of)
            .filter(|t| t.len() > MIN_PARAGRAPH_LEN)
            .take(MAX_PARAGRAPHS)
            .collect();
        non_empty(Some(paragraphs.join(" ").as_str()))
    })
}

/// Eventbrite checkout widget first, then any ticket-looking link.
fn ticket_url(doc: &Html) -> Option<String> {
    let scripts: String = doc.select(&SCRIPT).map(|s| s.text().collect::<String>()).collect();
    if let Some(caps) = RE_EVENTBRITE_ID.captures(&scripts) {
        return Some(format!("https://www.eventbrite.com/e/{}", &caps[1]));
    }
    doc.select(&TICKET_LINK)
        .find_map(|a| a.value().attr("href"))
        .and_then(|h| non_empty(Some(h)))
}

/// Most museum programs are talks.
fn infer_type(title: &str, description: Option<&str>) -> &'static str {
    normalize_event_type(title)
        .or_else(|| {
            let text = format!("{title} {}", description.unwrap_or_default()).to_lowercase();
            first_keyword_match(&text, TYPE_RULES)
        })
        .unwrap_or("lecture")
}

pub(crate) fn parse_detail(html: &str, url: &str, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
    let slug = url.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())?;
    let doc = Html::parse_document(html);

    let title = doc
        .select(&H1)
        .map(text_of)
        .find(|t| !t.is_empty())
        .or_else(|| {
            meta_content(&doc, &OG_TITLE).map(|t| t.trim_end_matches(" - CHM").trim().to_string())
        })
        .filter(|t| !t.is_empty())?;

    let page_text = doc.select(&BODY).next().map(text_of).unwrap_or_default();
    let Some(range) = parse_date_range(&page_text) else {
        diag.push(format!("Could not parse date/time for {slug}"));
        return None;
    };

    let description = description(&doc);
    let mut ev = NormalizedEvent::new(slug, title, range.start);
    ev.end_time = range.end;
    ev.event_type = Some(infer_type(&ev.title, description.as_deref()).to_string());
    ev.description = description;
    ev.location = Some(LOCATION.to_string());
    ev.address = Some(ADDRESS.to_string());
    ev.latitude = Some(LATITUDE);
    ev.longitude = Some(LONGITUDE);
    ev.url = Some(url.to_string());
    ev.ticket_url = ticket_url(&doc);
    ev.image_url = meta_content(&doc, &OG_IMAGE);
    ev.audience = Some("public".to_string());
    ev.raw_data = json!({ "slug": slug, "dateTimeText": range.text, "url": url });
    Some(ev)
}

/// Listing page, then one request per event page.
pub struct ChmAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl ChmAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SourceAdapter for ChmAdapter {
    fn slug(&self) -> &str {
        COMPUTER_HISTORY_MUSEUM
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let listing = self
            .fetcher
            .get_text(EVENTS_URL, RequestProfile::Plain)
            .await
            .context("Events listing request failed")?;
        let urls = parse_listing(&listing);

        let mut events = Vec::new();
        for url in urls {
            match self.fetcher.get_text(&url, RequestProfile::Plain).await {
                Ok(html) => events.extend(parse_detail(&html, &url, diag)),
                Err(FetchError::Status { status, .. }) => {
                    diag.push(format!("Event page {url} returned {status}"))
                }
                Err(e) => diag.push(format!("Failed to scrape {url}: {e}")),
            }
        }
        Ok(events)
    }
}
