// src/ingest/store.rs
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ingest::types::{
    NormalizedEvent, PersistedEvent, Source, SourceId, SourceSeed, SourceStatus, StatusUpdate,
};

/// CRUD surface the orchestrator needs from persistent storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list_enabled_sources(&self) -> Result<Vec<Source>>;

    /// Create the source if no source has this slug. An existing source is
    /// returned untouched; the flag says whether a row was created.
    async fn upsert_source_by_slug(&self, seed: &SourceSeed) -> Result<(Source, bool)>;

    async fn list_local_ids_for_source(&self, source_id: SourceId) -> Result<Vec<String>>;

    /// Insert or fully overwrite by `(source_id, source_event_id)`.
    /// Returns `true` when a new row was created.
    async fn upsert_event(&self, source_id: SourceId, event: &NormalizedEvent) -> Result<bool>;

    async fn count_events_for_source(&self, source_id: SourceId) -> Result<u64>;

    async fn update_source_status(&self, source_id: SourceId, update: &StatusUpdate) -> Result<()>;

    /// Persist buffered state after a run. Stores that write through need nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_source_id: SourceId,
    next_event_id: u64,
    sources: BTreeMap<SourceId, Source>,
    events: Vec<PersistedEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    next_source_id: SourceId,
    next_event_id: u64,
    sources: BTreeMap<SourceId, Source>,
    events: HashMap<(SourceId, String), PersistedEvent>,
}

impl Inner {
    fn from_snapshot(s: Snapshot) -> Self {
        let events = s
            .events
            .into_iter()
            .map(|e| ((e.source_id, e.event.source_event_id.clone()), e))
            .collect();
        Self {
            next_source_id: s.next_source_id,
            next_event_id: s.next_event_id,
            sources: s.sources,
            events,
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut events: Vec<PersistedEvent> = self.events.values().cloned().collect();
        events.sort_by_key(|e| e.id);
        Snapshot {
            next_source_id: self.next_source_id,
            next_event_id: self.next_event_id,
            sources: self.sources.clone(),
            events,
        }
    }
}

/// In-process reference store, optionally backed by a JSON snapshot file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it exists; later [`MemoryStore::save`] calls write back to it.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading store snapshot {}", path.display()))?;
            let snap: Snapshot = serde_json::from_str(&raw)
                .with_context(|| format!("parsing store snapshot {}", path.display()))?;
            tracing::info!(
                sources = snap.sources.len(),
                events = snap.events.len(),
                path = %path.display(),
                "store snapshot loaded"
            );
            Inner::from_snapshot(snap)
        } else {
            Inner::default()
        };
        Ok(Self {
            inner: RwLock::new(inner),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write the snapshot atomically (temp file + rename). No-op without a path.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let json = {
            let inner = self.inner.read().await;
            serde_json::to_string_pretty(&inner.to_snapshot())?
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming snapshot into {}", path.display()))?;
        Ok(())
    }

    pub async fn get_source_by_slug(&self, slug: &str) -> Option<Source> {
        let inner = self.inner.read().await;
        inner.sources.values().find(|s| s.slug == slug).cloned()
    }

    pub async fn list_sources(&self) -> Vec<Source> {
        self.inner.read().await.sources.values().cloned().collect()
    }

    pub async fn set_enabled(&self, source_id: SourceId, enabled: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(src) = inner.sources.get_mut(&source_id) else {
            bail!("source {source_id} not found");
        };
        src.enabled = enabled;
        Ok(())
    }

    /// Remove a source and its events. Built-in sources are refused.
    pub async fn delete_source(&self, source_id: SourceId) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.sources.get(&source_id) {
            None => bail!("source {source_id} not found"),
            Some(s) if s.is_built_in => bail!("cannot delete built-in source {}", s.slug),
            Some(_) => {}
        }
        inner.sources.remove(&source_id);
        inner.events.retain(|(sid, _), _| *sid != source_id);
        Ok(())
    }

    pub async fn events_for_source(&self, source_id: SourceId) -> Vec<PersistedEvent> {
        let inner = self.inner.read().await;
        let mut out: Vec<PersistedEvent> = inner
            .events
            .iter()
            .filter(|((sid, _), _)| *sid == source_id)
            .map(|(_, e)| e.clone())
            .collect();
        out.sort_by(|a, b| a.event.start_time.cmp(&b.event.start_time).then(a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        let inner = self.inner.read().await;
        Ok(inner.sources.values().filter(|s| s.enabled).cloned().collect())
    }

    async fn upsert_source_by_slug(&self, seed: &SourceSeed) -> Result<(Source, bool)> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.sources.values().find(|s| s.slug == seed.slug) {
            return Ok((existing.clone(), false));
        }
        inner.next_source_id += 1;
        let source = Source {
            id: inner.next_source_id,
            slug: seed.slug.clone(),
            name: seed.name.clone(),
            kind: seed.kind,
            url: seed.url.clone(),
            enabled: true,
            is_built_in: seed.is_built_in,
            status: SourceStatus::default(),
        };
        inner.sources.insert(source.id, source.clone());
        Ok((source, true))
    }

    async fn list_local_ids_for_source(&self, source_id: SourceId) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .keys()
            .filter(|(sid, _)| *sid == source_id)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn upsert_event(&self, source_id: SourceId, event: &NormalizedEvent) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.sources.contains_key(&source_id) {
            bail!("source {source_id} not found");
        }
        let now = Utc::now();
        let key = (source_id, event.source_event_id.clone());
        if let Some(row) = inner.events.get_mut(&key) {
            row.event = event.clone();
            row.updated_at = now;
            return Ok(false);
        }
        inner.next_event_id += 1;
        let row = PersistedEvent {
            id: inner.next_event_id,
            source_id,
            event: event.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.events.insert(key, row);
        Ok(true)
    }

    async fn count_events_for_source(&self, source_id: SourceId) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.events.keys().filter(|(sid, _)| *sid == source_id).count() as u64)
    }

    async fn update_source_status(&self, source_id: SourceId, update: &StatusUpdate) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(src) = inner.sources.get_mut(&source_id) else {
            bail!("source {source_id} not found");
        };
        match update {
            StatusUpdate::Completed(stats) => {
                src.status = SourceStatus {
                    last_scraped_at: Some(stats.finished_at),
                    last_error: stats.error.clone(),
                    last_scrape_events: stats.events_seen,
                    last_scrape_new: stats.new_events,
                    last_scrape_duration_secs: stats.duration_secs,
                    total_events: stats.total_events,
                };
            }
            StatusUpdate::Failed { error } => {
                src.status.last_error = Some(error.clone());
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.save().await
    }
}
