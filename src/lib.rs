// src/lib.rs
// Public library surface for the worker binary and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;

pub use crate::api::router;

use anyhow::Result;

use crate::ingest::orchestrator::RunReport;
use crate::ingest::scheduler::ScrapeScheduler;
use crate::ingest::types::SourceSeed;

/// Start-up sequence before the schedule and control surface come up:
/// seed sources, then one scrape under the shared running flag.
/// Returns `None` if a run was already holding the flag.
pub async fn prime(scheduler: &ScrapeScheduler, seeds: &[SourceSeed]) -> Result<Option<RunReport>> {
    scheduler.orchestrator().seed_sources(seeds).await?;
    match scheduler.run_exclusive().await {
        Some(report) => report.map(Some),
        None => Ok(None),
    }
}
