// tests/store_snapshot.rs
//
// The in-memory store survives a restart through its JSON snapshot, and
// the start-up sequence seeds before the first run.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use lecture_seeker::ingest::adapter::{Diagnostics, SourceAdapter};
use lecture_seeker::ingest::orchestrator::{AdapterRegistry, Orchestrator};
use lecture_seeker::ingest::providers::{built_in_seeds, STANFORD};
use lecture_seeker::ingest::scheduler::ScrapeScheduler;
use lecture_seeker::ingest::store::{EventStore, MemoryStore};
use lecture_seeker::ingest::types::{NormalizedEvent, Source};

struct TwoTalks;

#[async_trait]
impl SourceAdapter for TwoTalks {
    fn slug(&self) -> &str {
        "two-talks"
    }

    async fn fetch_and_parse(&self, _diag: &mut Diagnostics) -> Result<Vec<NormalizedEvent>> {
        let t = Utc.with_ymd_and_hms(2026, 4, 2, 2, 30, 0).unwrap();
        let mut a = NormalizedEvent::new("t-1", "Black Holes", t);
        a.event_type = Some("lecture".into());
        Ok(vec![a, NormalizedEvent::new("t-2", "Exoplanets", t)])
    }
}

struct OnlyStanford;

impl AdapterRegistry for OnlyStanford {
    fn adapter_for(&self, source: &Source) -> Result<Arc<dyn SourceAdapter>> {
        if source.slug == STANFORD {
            Ok(Arc::new(TwoTalks))
        } else {
            anyhow::bail!("No adapter available for source: {}", source.slug)
        }
    }
}

#[tokio::test]
async fn prime_seeds_runs_and_snapshot_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/store.json");

    let store = Arc::new(MemoryStore::with_snapshot(&path).unwrap());
    let scheduler = ScrapeScheduler::new(Orchestrator::new(store.clone(), Arc::new(OnlyStanford)));

    let report = lecture_seeker::prime(&scheduler, &built_in_seeds())
        .await
        .unwrap()
        .expect("initial run");
    assert_eq!(report.sources.len(), 9);
    assert_eq!(report.events_seen(), 2);
    assert_eq!(report.failed_sources(), 8);
    assert!(path.exists(), "run should flush the snapshot");

    let reloaded = MemoryStore::with_snapshot(&path).unwrap();
    assert_eq!(reloaded.list_sources().await.len(), 9);
    let stanford = reloaded.get_source_by_slug(STANFORD).await.unwrap();
    assert!(stanford.is_built_in);
    assert_eq!(stanford.status.total_events, 2);
    assert_eq!(reloaded.count_events_for_source(stanford.id).await.unwrap(), 2);
    let rows = reloaded.events_for_source(stanford.id).await;
    assert_eq!(rows[0].event.event_type.as_deref(), Some("lecture"));

    // Ids keep counting from where the snapshot left off.
    let (extra, created) = reloaded
        .upsert_source_by_slug(&lecture_seeker::ingest::types::SourceSeed {
            slug: "extra".into(),
            name: "Extra".into(),
            kind: lecture_seeker::ingest::types::SourceKind::IcsFeed,
            url: "https://example.com/x.ics".into(),
            is_built_in: false,
        })
        .await
        .unwrap();
    assert!(created);
    assert_eq!(extra.id, 10);
}
