//! Lecture Seeker ingestion worker: seeds sources, scrapes them on a fixed
//! schedule, and serves the trigger/health control surface.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lecture_seeker::api::{self, AppState};
use lecture_seeker::config::WorkerConfig;
use lecture_seeker::ingest::config::{load_custom_sources_default, load_custom_sources_from};
use lecture_seeker::ingest::fetch::HttpFetcher;
use lecture_seeker::ingest::orchestrator::Orchestrator;
use lecture_seeker::ingest::providers::{built_in_seeds, BuiltinRegistry};
use lecture_seeker::ingest::scheduler::ScrapeScheduler;
use lecture_seeker::ingest::store::MemoryStore;
use lecture_seeker::metrics::Metrics;

/// `LOG_FORMAT=json` for structured output, compact text otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lecture_seeker=info,ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = WorkerConfig::from_env();
    tracing::info!(?cfg, "worker starting");

    let metrics = Metrics::init()?;

    let store = Arc::new(match &cfg.store_snapshot_path {
        Some(path) => MemoryStore::with_snapshot(path)?,
        None => MemoryStore::new(),
    });
    let fetcher = Arc::new(HttpFetcher::new(cfg.http_timeout())?);
    let orchestrator = Orchestrator::new(store, Arc::new(BuiltinRegistry::new(fetcher)));
    let scheduler = ScrapeScheduler::new(orchestrator);

    let mut seeds = built_in_seeds();
    let custom = match &cfg.custom_sources_path {
        Some(path) => load_custom_sources_from(path)?,
        None => load_custom_sources_default()?,
    };
    tracing::info!(custom = custom.len(), "custom sources loaded");
    seeds.extend(custom);

    match lecture_seeker::prime(&scheduler, &seeds).await {
        Ok(Some(report)) => tracing::info!(
            events = report.events_seen(),
            new = report.new_events(),
            failed = report.failed_sources(),
            "initial scrape complete"
        ),
        Ok(None) => tracing::info!("initial scrape skipped: run in progress"),
        Err(e) => tracing::error!(error = %e, "initial scrape failed"),
    }

    let _periodic = scheduler.spawn_periodic(cfg.scrape_interval());
    tracing::info!(hours = cfg.scrape_interval_hours, "periodic scrape scheduled");

    let app = api::router(AppState { scheduler }, Some(&metrics));
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "control surface listening");
    axum::serve(listener, app).await.context("serving control surface")?;
    Ok(())
}
