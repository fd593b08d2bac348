// src/ingest/orchestrator.rs
//! One ingestion run: every enabled source scraped concurrently, results
//! reconciled into the store, status recorded per source.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::task::JoinSet;

use crate::ingest::adapter::SourceAdapter;
use crate::ingest::ensure_metrics_described;
use crate::ingest::store::EventStore;
use crate::ingest::types::{RunStats, ScrapeRunResult, Source, SourceId, SourceSeed, StatusUpdate};

/// Picks the adapter for a stored source.
pub trait AdapterRegistry: Send + Sync {
    fn adapter_for(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>>;
}

/// Outcome for one source within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub slug: String,
    pub events_seen: u64,
    pub new_events: u64,
    pub errors: Vec<String>,
    /// The run never reached a completed status (no adapter, or reconciliation failed).
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn events_seen(&self) -> u64 {
        self.sources.iter().map(|s| s.events_seen).sum()
    }

    pub fn new_events(&self) -> u64 {
        self.sources.iter().map(|s| s.new_events).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.failed).count()
    }

    pub fn source(&self, slug: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.slug == slug)
    }
}

/// Run the adapter on its own task so a panic inside it becomes a fatal
/// diagnostic instead of tearing down the source's orchestration.
async fn scrape_isolated(adapter: Arc<dyn SourceAdapter>) -> ScrapeRunResult {
    let slug = adapter.slug().to_string();
    match tokio::spawn(async move { adapter.scrape().await }).await {
        Ok(result) => result,
        Err(e) => {
            let reason = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            tracing::error!(target: "ingest", source = %slug, reason = %reason, "adapter panicked");
            counter!("ingest_diagnostics_total").increment(1);
            ScrapeRunResult {
                events: Vec::new(),
                errors: vec![format!("Fatal scraper error: adapter panicked: {reason}")],
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn EventStore>,
    registry: Arc<dyn AdapterRegistry>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn EventStore>, registry: Arc<dyn AdapterRegistry>) -> Self {
        ensure_metrics_described();
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Create every seed whose slug is not on file yet. Existing sources keep
    /// their name, URL and enabled flag. Returns how many were created.
    pub async fn seed_sources(&self, seeds: &[SourceSeed]) -> Result<usize> {
        let mut created = 0;
        for seed in seeds {
            let (_, was_created) = self
                .store
                .upsert_source_by_slug(seed)
                .await
                .with_context(|| format!("seeding source {}", seed.slug))?;
            if was_created {
                created += 1;
            }
        }
        tracing::info!(target: "ingest", seeds = seeds.len(), created, "sources seeded");
        Ok(created)
    }

    /// Scrape one source and record its status. Never returns an error: every
    /// failure ends up in the report and on the source's `last_error`.
    pub async fn scrape_source(&self, source: &Source) -> SourceReport {
        let started = Instant::now();
        tracing::info!(target: "ingest", source = %source.slug, "scraping");

        let adapter = match self.registry.adapter_for(source) {
            Ok(a) => a,
            Err(e) => return self.record_failure(source, format!("{e:#}"), Vec::new()).await,
        };

        let result = scrape_isolated(adapter).await;
        match self.reconcile(source, &result, started).await {
            Ok((events_seen, new_events)) => SourceReport {
                source_id: source.id,
                slug: source.slug.clone(),
                events_seen,
                new_events,
                errors: result.errors,
                failed: false,
            },
            Err(e) => self.record_failure(source, format!("{e:#}"), result.errors).await,
        }
    }

    /// Upsert every event, then write the completed status.
    async fn reconcile(
        &self,
        source: &Source,
        result: &ScrapeRunResult,
        started: Instant,
    ) -> Result<(u64, u64)> {
        // New-vs-updated is judged against the ids on file before this run.
        let existing: HashSet<String> = self
            .store
            .list_local_ids_for_source(source.id)
            .await
            .context("listing stored event ids")?
            .into_iter()
            .collect();

        let mut new_events = 0u64;
        for event in &result.events {
            if !existing.contains(&event.source_event_id) {
                new_events += 1;
            }
            self.store
                .upsert_event(source.id, event)
                .await
                .with_context(|| format!("upserting event {}", event.source_event_id))?;
        }

        let duration_secs = started.elapsed().as_secs_f64();
        let total_events = self
            .store
            .count_events_for_source(source.id)
            .await
            .context("counting stored events")?;
        let events_seen = result.events.len() as u64;

        let stats = RunStats {
            finished_at: Utc::now(),
            events_seen,
            new_events,
            duration_secs,
            error: (!result.errors.is_empty()).then(|| result.errors.join("; ")),
            total_events,
        };
        self.store
            .update_source_status(source.id, &StatusUpdate::Completed(stats))
            .await
            .context("updating source status")?;

        counter!("ingest_events_total", "source" => source.slug.clone()).increment(events_seen);
        counter!("ingest_new_events_total", "source" => source.slug.clone()).increment(new_events);
        histogram!("ingest_source_duration_ms", "source" => source.slug.clone())
            .record(duration_secs * 1000.0);

        tracing::info!(
            target: "ingest",
            source = %source.slug,
            events = events_seen,
            new = new_events,
            total = total_events,
            errors = result.errors.len(),
            duration_secs,
            "source reconciled"
        );
        Ok((events_seen, new_events))
    }

    async fn record_failure(&self, source: &Source, error: String, mut errors: Vec<String>) -> SourceReport {
        tracing::error!(target: "ingest", source = %source.slug, error = %error, "source run failed");
        counter!("ingest_source_failures_total", "source" => source.slug.clone()).increment(1);

        let update = StatusUpdate::Failed { error: error.clone() };
        if let Err(e) = self.store.update_source_status(source.id, &update).await {
            tracing::error!(target: "ingest", source = %source.slug, error = %e, "could not record failure");
        }
        errors.push(error);
        SourceReport {
            source_id: source.id,
            slug: source.slug.clone(),
            events_seen: 0,
            new_events: 0,
            errors,
            failed: true,
        }
    }

    /// Scrape every enabled source concurrently. Only failing to list the
    /// sources is an error; per-source problems are in the report.
    pub async fn scrape_all(&self) -> Result<RunReport> {
        let started = Instant::now();
        let sources = self
            .store
            .list_enabled_sources()
            .await
            .context("listing enabled sources")?;
        tracing::info!(target: "ingest", sources = sources.len(), "scrape run started");

        let mut tasks = JoinSet::new();
        for source in sources {
            let this = self.clone();
            tasks.spawn(async move { this.scrape_source(&source).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(target: "ingest", error = %e, "scrape task panicked"),
            }
        }
        reports.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let report = RunReport {
            sources: reports,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            sources = report.sources.len(),
            events = report.events_seen(),
            new = report.new_events(),
            failed = report.failed_sources(),
            duration_secs = report.duration_secs,
            "scrape run complete"
        );
        Ok(report)
    }
}
