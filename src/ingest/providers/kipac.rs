// src/ingest/providers/kipac.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::Fetcher;
use crate::ingest::providers::{fetch_json_page, null_as_default, KIPAC};
use crate::ingest::taxonomy::first_keyword_match;
use crate::ingest::types::NormalizedEvent;
use crate::ingest::{non_empty, parse_instant, strip_html};

const BASE_URL: &str = "https://kipac.stanford.edu";
const PAGE_SIZE: u64 = 50;

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<Value>,
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Meta {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct Node {
    id: String,
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    status: bool,
    title: String,
    body: Option<Body>,
    path: Option<PathAlias>,
    su_event_alt_loc: Option<String>,
    su_event_date_time: Option<DateRange>,
}

#[derive(Debug, Deserialize)]
struct Body {
    value: Option<String>,
    processed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PathAlias {
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateRange {
    value: Option<String>,
    end_value: Option<String>,
}

static RE_ONLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)zoom\.us|teams\.microsoft|webex").unwrap());

const TYPE_RULES: &[(&[&str], &str)] = &[
    (&["tea talk"], "lecture"),
    (&["colloqui"], "conference"),
    (&["thesis defense"], "lecture"),
    (&["workshop"], "workshop"),
    (&["conference"], "conference"),
];

/// Institute talks are lectures unless the title says otherwise.
fn infer_event_type(title: &str) -> &'static str {
    first_keyword_match(&title.to_lowercase(), TYPE_RULES).unwrap_or("lecture")
}

/// Drupal JSON:API node listing, offset pagination.
pub struct KipacAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl KipacAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn normalize(raw: Value, diag: &mut Diagnostics) -> Option<NormalizedEvent> {
        let node: Node = match serde_json::from_value(raw.clone()) {
            Ok(n) => n,
            Err(e) => {
                let id = raw.get("id").and_then(Value::as_str).unwrap_or_default();
                diag.push(format!("Failed to parse event {id}: {e}"));
                return None;
            }
        };
        let a = node.attributes;
        if !a.status {
            return None;
        }
        let range = a.su_event_date_time?;
        let start_raw = non_empty(range.value.as_deref())?;
        let Some(start) = parse_instant(&start_raw) else {
            diag.push(format!("Failed to parse event {}: bad start {start_raw:?}", node.id));
            return None;
        };

        let body_html = a
            .body
            .and_then(|b| non_empty(b.value.as_deref()).or_else(|| non_empty(b.processed.as_deref())));

        let mut ev = NormalizedEvent::new(node.id, a.title.trim(), start);
        ev.description = body_html.as_deref().map(strip_html).filter(|s| !s.is_empty());
        ev.is_online = body_html.as_deref().is_some_and(|h| RE_ONLINE.is_match(h));
        ev.description_html = body_html;
        ev.end_time = range.end_value.as_deref().and_then(parse_instant);
        ev.location = non_empty(a.su_event_alt_loc.as_deref());
        ev.url = a
            .path
            .and_then(|p| non_empty(p.alias.as_deref()))
            .map(|alias| format!("{BASE_URL}{alias}"));
        ev.event_type = Some(infer_event_type(&ev.title).to_string());
        ev.audience = Some("academic".to_string());
        ev.department = Some("KIPAC".to_string());
        ev.raw_data = raw;
        Some(ev)
    }
}

#[async_trait]
impl SourceAdapter for KipacAdapter {
    fn slug(&self) -> &str {
        KIPAC
    }

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let mut out = Vec::new();
        let mut offset = 0u64;
        let mut total = u64::MAX;

        while offset < total {
            let url = format!(
                "{BASE_URL}/jsonapi/node/stanford_event?page[limit]={PAGE_SIZE}&page[offset]={offset}"
            );
            let position = format!("at offset {offset}");
            let Some(data) =
                fetch_json_page::<ApiPage>(self.fetcher.as_ref(), &url, &position, offset == 0, diag).await?
            else {
                break;
            };
            total = data.meta.count;
            out.extend(data.data.into_iter().filter_map(|raw| Self::normalize(raw, diag)));
            offset += PAGE_SIZE;
        }

        Ok(out)
    }
}
