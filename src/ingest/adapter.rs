// src/ingest/adapter.rs
use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;

use crate::ingest::types::{NormalizedEvent, ScrapeRunResult};
use crate::ingest::{dedup_by_id, duplicate_ids};

/// Partial-failure messages collected while one adapter runs.
#[derive(Debug)]
pub struct Diagnostics {
    slug: String,
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "ingest", source = %self.slug, "{message}");
        counter!("ingest_diagnostics_total").increment(1);
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// One implementation per upstream source.
///
/// `fetch_and_parse` reports a fatal problem (nothing retrievable) by
/// returning `Err`, and partial problems by pushing onto `diag` and carrying
/// on. Callers go through [`SourceAdapter::scrape`], which never fails.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn slug(&self) -> &str;

    async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>>;

    async fn scrape(&self) -> ScrapeRunResult {
        let mut diag = Diagnostics::new(self.slug());
        let events = match self.fetch_and_parse(&mut diag).await {
            Ok(mut events) => {
                let dups = duplicate_ids(&events);
                if !dups.is_empty() {
                    dedup_by_id(&mut events);
                    diag.push(format!("Dropped repeated event ids: {}", dups.join(", ")));
                }
                events
            }
            Err(e) => {
                diag.push(format!("Fatal scraper error: {e:#}"));
                Vec::new()
            }
        };

        tracing::info!(
            target: "ingest",
            source = self.slug(),
            events = events.len(),
            errors = diag.len(),
            "scrape finished"
        );

        ScrapeRunResult {
            events,
            errors: diag.into_messages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Failing;

    #[async_trait]
    impl SourceAdapter for Failing {
        fn slug(&self) -> &str {
            "failing"
        }
        async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
            diag.push("first page had a bad record");
            anyhow::bail!("upstream returned 503")
        }
    }

    struct Partial;

    #[async_trait]
    impl SourceAdapter for Partial {
        fn slug(&self) -> &str {
            "partial"
        }
        async fn fetch_and_parse(&self, diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
            diag.push("skipped one");
            Ok(vec![NormalizedEvent::new("a", "A", Utc::now())])
        }
    }

    struct Repeating;

    #[async_trait]
    impl SourceAdapter for Repeating {
        fn slug(&self) -> &str {
            "repeating"
        }
        async fn fetch_and_parse(&self, _diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
            let t = Utc::now();
            Ok(vec![
                NormalizedEvent::new("x", "first", t),
                NormalizedEvent::new("x", "again", t),
                NormalizedEvent::new("y", "other", t),
            ])
        }
    }

    #[tokio::test]
    async fn repeated_ids_are_collapsed() {
        let out = Repeating.scrape().await;
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].title, "first");
        assert_eq!(out.errors, vec!["Dropped repeated event ids: x".to_string()]);
    }

    #[tokio::test]
    async fn fatal_error_becomes_diagnostic() {
        let out = Failing.scrape().await;
        assert!(out.events.is_empty());
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors[1].starts_with("Fatal scraper error"));
        assert!(out.errors[1].contains("503"));
    }

    #[tokio::test]
    async fn partial_diagnostics_keep_events() {
        let out = Partial.scrape().await;
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.errors, vec!["skipped one".to_string()]);
    }
}
