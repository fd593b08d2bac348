// src/ingest/fetch.rs
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use thiserror::Error;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("reading body of {url} failed: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How a request presents itself upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    Plain,
    /// Browser-like headers for venue pages that reject bare clients.
    Browser,
}

/// Narrow HTTP seam used by every adapter.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body; non-2xx is [`FetchError::Status`].
    async fn get_text(&self, url: &str, profile: RequestProfile) -> Result<String, FetchError>;
}

/// Shared reqwest client with a cookie jar, so a landing-page prefetch
/// carries its session into later requests.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
        headers
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_text(&self, url: &str, profile: RequestProfile) -> Result<String, FetchError> {
        let mut req = self.client.get(url);
        if profile == RequestProfile::Browser {
            req = req.headers(Self::browser_headers());
        }

        let resp = req.send().await.map_err(|e| {
            counter!("ingest_http_errors_total").increment(1);
            tracing::debug!(target: "ingest", error = ?e, url, "http transport error");
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            counter!("ingest_http_errors_total").increment(1);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

type Responder = dyn Fn(&str) -> Result<String, FetchError> + Send + Sync;

// --- Test helper ---
/// Fetcher answering from a closure and recording every requested URL.
pub struct StubFetcher {
    responder: Box<Responder>,
    pub calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same body for every URL.
    pub fn always(body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(move |_| Ok(body.clone()))
    }

    /// Every request fails with the given status.
    pub fn failing(status: u16) -> Self {
        Self::new(move |url| {
            Err(FetchError::Status {
                url: url.to_string(),
                status,
            })
        })
    }

    /// Every request fails before reaching a server.
    pub fn unreachable(message: &'static str) -> Self {
        Self::new(move |url| {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: message.to_string(),
            })
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn requested(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn get_text(&self, url: &str, _profile: RequestProfile) -> Result<String, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        (self.responder)(url)
    }
}
