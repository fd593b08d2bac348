// src/ingest/scheduler.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::ingest::orchestrator::{Orchestrator, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

/// Clears the running flag when the run ends, however it ends.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the single "a run is in progress" flag shared by the periodic
/// schedule and on-demand triggers. A second run is rejected, never queued.
#[derive(Clone)]
pub struct ScrapeScheduler {
    orchestrator: Orchestrator,
    running: Arc<AtomicBool>,
}

impl ScrapeScheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(self.running.clone()))
    }

    /// Run now on the current task. `None` when another run holds the flag.
    pub async fn run_exclusive(&self) -> Option<Result<RunReport>> {
        let _guard = self.acquire()?;
        Some(self.run().await)
    }

    /// Start a run in the background, or report that one is in progress.
    pub fn try_trigger(&self) -> TriggerOutcome {
        let Some(guard) = self.acquire() else {
            counter!("ingest_trigger_rejected_total").increment(1);
            tracing::info!(target: "ingest", "trigger rejected: scrape already in progress");
            return TriggerOutcome::AlreadyRunning;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = this.run().await {
                tracing::error!(target: "ingest", error = %e, "triggered scrape failed");
            }
        });
        TriggerOutcome::Started
    }

    async fn run(&self) -> Result<RunReport> {
        let report = self.orchestrator.scrape_all().await?;
        if let Err(e) = self.orchestrator.store().flush().await {
            tracing::warn!(target: "ingest", error = %e, "store flush after run failed");
        }
        Ok(report)
    }

    /// Fixed-interval schedule. The first tick fires one full period from now;
    /// a tick that lands during a run is skipped.
    pub fn spawn_periodic(&self, every: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match this.run_exclusive().await {
                    None => {
                        tracing::info!(target: "ingest", "scheduled tick skipped: run in progress")
                    }
                    Some(Err(e)) => {
                        tracing::error!(target: "ingest", error = %e, "scheduled scrape failed")
                    }
                    Some(Ok(_)) => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::adapter::SourceAdapter;
    use crate::ingest::orchestrator::AdapterRegistry;
    use crate::ingest::store::MemoryStore;
    use crate::ingest::types::Source;

    struct Empty;

    impl AdapterRegistry for Empty {
        fn adapter_for(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
            anyhow::bail!("No adapter available for source: {}", source.slug)
        }
    }

    fn scheduler() -> ScrapeScheduler {
        ScrapeScheduler::new(Orchestrator::new(Arc::new(MemoryStore::new()), Arc::new(Empty)))
    }

    #[tokio::test]
    async fn guard_releases_flag() {
        let s = scheduler();
        let guard = s.acquire().unwrap();
        assert!(s.is_running());
        assert!(s.acquire().is_none());
        assert!(s.run_exclusive().await.is_none());
        drop(guard);
        assert!(!s.is_running());

        let report = s.run_exclusive().await.unwrap().unwrap();
        assert!(report.sources.is_empty());
        assert!(!s.is_running());
    }

    struct Counting(std::sync::atomic::AtomicUsize);

    impl AdapterRegistry for Counting {
        fn adapter_for(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("No adapter available for source: {}", source.slug)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_waits_one_period_before_first_run() {
        use crate::ingest::store::EventStore;
        use crate::ingest::types::{SourceKind, SourceSeed};

        let store = Arc::new(MemoryStore::new());
        store
            .upsert_source_by_slug(&SourceSeed {
                slug: "x".into(),
                name: "X".into(),
                kind: SourceKind::HtmlScrape,
                url: "https://example.com".into(),
                is_built_in: false,
            })
            .await
            .unwrap();
        let registry = Arc::new(Counting(Default::default()));
        let s = ScrapeScheduler::new(Orchestrator::new(store, registry.clone()));
        let handle = s.spawn_periodic(Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(registry.0.load(Ordering::SeqCst), 1);
        assert!(!s.is_running());
        handle.abort();
    }
}
