// src/ingest/providers/mod.rs
pub mod cal_academy;
pub mod computer_history_museum;
pub mod csm_observatory;
pub mod greek_theatre;
pub mod ics;
pub mod kipac;
pub mod shoreline;
pub mod stanford;
pub mod uc_berkeley;

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ingest::adapter::{Diagnostics, SourceAdapter};
use crate::ingest::fetch::{FetchError, Fetcher, RequestProfile};
use crate::ingest::orchestrator::AdapterRegistry;
use crate::ingest::types::{Source, SourceKind, SourceSeed};

pub const STANFORD: &str = "stanford";
pub const UC_BERKELEY: &str = "uc-berkeley";
pub const CAL_BEARS: &str = "cal-bears";
pub const CSM_OBSERVATORY: &str = "csm-observatory";
pub const SHORELINE_AMPHITHEATRE: &str = "shoreline-amphitheatre";
pub const GREEK_THEATRE: &str = "greek-theatre";
pub const CAL_ACADEMY: &str = "cal-academy";
pub const COMPUTER_HISTORY_MUSEUM: &str = "computer-history-museum";
pub const KIPAC: &str = "kipac";

/// `(slug, name, kind, url)` for every built-in source.
pub const BUILT_IN_SOURCES: &[(&str, &str, SourceKind, &str)] = &[
    (STANFORD, "Stanford Events", SourceKind::ApiJson, "https://events.stanford.edu/api/2/events"),
    (UC_BERKELEY, "UC Berkeley Events", SourceKind::ApiJson, "https://events.berkeley.edu/live/json/events/"),
    (CAL_BEARS, "Cal Bears Athletics", SourceKind::IcsFeed, "https://calbears.com/calendar.ashx/calendar.ics"),
    (CSM_OBSERVATORY, "CSM Observatory", SourceKind::HtmlScrape, "https://collegeofsanmateo.edu/astronomy/observatory.asp"),
    (
        SHORELINE_AMPHITHEATRE,
        "Shoreline Amphitheatre",
        SourceKind::HtmlScrape,
        "https://www.livenation.com/venue/KovZpZA6ta1A/shoreline-amphitheatre-events",
    ),
    (GREEK_THEATRE, "Greek Theatre Berkeley", SourceKind::HtmlScrape, "https://thegreekberkeley.com/calendar/"),
    (CAL_ACADEMY, "Cal Academy of Sciences", SourceKind::HtmlScrape, "https://www.calacademy.org/daily-calendar"),
    (
        COMPUTER_HISTORY_MUSEUM,
        "Computer History Museum",
        SourceKind::HtmlScrape,
        "https://computerhistory.org/events/",
    ),
    (KIPAC, "KIPAC Stanford", SourceKind::ApiJson, "https://kipac.stanford.edu/jsonapi/node/stanford_event"),
];

pub fn built_in_seeds() -> Vec<SourceSeed> {
    BUILT_IN_SOURCES
        .iter()
        .map(|(slug, name, kind, url)| SourceSeed {
            slug: (*slug).to_string(),
            name: (*name).to_string(),
            kind: *kind,
            url: (*url).to_string(),
            is_built_in: true,
        })
        .collect()
}

/// Adapter lookup: built-in slugs first, then any ICS-kind source.
pub struct BuiltinRegistry {
    fetcher: Arc<dyn Fetcher>,
}

impl BuiltinRegistry {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl AdapterRegistry for BuiltinRegistry {
    fn adapter_for(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
        let f = self.fetcher.clone();
        let adapter: Arc<dyn SourceAdapter> = match source.slug.as_str() {
            STANFORD => Arc::new(stanford::StanfordAdapter::new(f)),
            UC_BERKELEY => Arc::new(uc_berkeley::UcBerkeleyAdapter::new(f)),
            CAL_BEARS => Arc::new(ics::CalBearsAdapter::new(f)),
            CSM_OBSERVATORY => Arc::new(csm_observatory::CsmObservatoryAdapter::new(f)),
            SHORELINE_AMPHITHEATRE => Arc::new(shoreline::ShorelineAdapter::new(f)),
            GREEK_THEATRE => Arc::new(greek_theatre::GreekTheatreAdapter::new(f)),
            CAL_ACADEMY => Arc::new(cal_academy::CalAcademyAdapter::new(f)),
            COMPUTER_HISTORY_MUSEUM => Arc::new(computer_history_museum::ChmAdapter::new(f)),
            KIPAC => Arc::new(kipac::KipacAdapter::new(f)),
            _ if source.kind == SourceKind::IcsFeed => {
                Arc::new(ics::GenericIcsAdapter::new(f, source.slug.clone(), source.url.clone()))
            }
            other => bail!("No adapter available for source: {other}"),
        };
        Ok(adapter)
    }
}

/// One page of a paginated JSON API.
///
/// A non-2xx status ends pagination with a diagnostic. Transport and decode
/// failures are fatal on the first page and end pagination on later pages,
/// keeping what was already collected.
pub(crate) async fn fetch_json_page<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
    position: &str,
    first: bool,
    diag: &mut Diagnostics,
) -> Result<Option<T>> {
    let body = match fetcher.get_text(url, RequestProfile::Plain).await {
        Ok(body) => body,
        Err(FetchError::Status { status, .. }) => {
            diag.push(format!("API returned {status} {position}"));
            return Ok(None);
        }
        Err(e) if first => return Err(e.into()),
        Err(e) => {
            diag.push(format!("Stopped paginating {position}: {e}"));
            return Ok(None);
        }
    };
    match serde_json::from_str::<T>(&body) {
        Ok(page) => Ok(Some(page)),
        Err(e) if first => Err(anyhow::Error::new(e).context(format!("decoding response {position}"))),
        Err(e) => {
            diag.push(format!("Undecodable response {position}: {e}"));
            Ok(None)
        }
    }
}

// --- lenient JSON field helpers shared by the API adapters ---

/// `null` and a missing field both become the type's default.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Ids arrive as numbers or strings depending on the upstream.
pub(crate) fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `1`, `true` and `"1"` are set; everything else is unset.
pub(crate) fn flag(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|i| i != 0),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

/// Coordinates come as JSON numbers or decimal strings.
pub(crate) fn coordinate(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
