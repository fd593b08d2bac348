// src/ingest/config.rs
//! User-supplied ICS feeds, seeded next to the built-in catalogue.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::text::slugify;
use crate::ingest::types::{SourceKind, SourceSeed};

pub const ENV_PATH: &str = "CUSTOM_SOURCES_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct CustomSource {
    pub name: String,
    pub url: String,
    /// Defaults to the slugified name.
    #[serde(default)]
    pub slug: Option<String>,
}

/// Load custom sources from an explicit path. Supports TOML or JSON formats.
pub fn load_custom_sources_from(path: &Path) -> Result<Vec<SourceSeed>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading custom sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_custom_sources(&content, ext.as_str())
}

/// Load custom sources using env var + fallbacks:
/// 1) $CUSTOM_SOURCES_PATH
/// 2) config/custom_sources.toml
/// 3) config/custom_sources.json
pub fn load_custom_sources_default() -> Result<Vec<SourceSeed>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_custom_sources_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/custom_sources.toml");
    if toml_p.exists() {
        return load_custom_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/custom_sources.json");
    if json_p.exists() {
        return load_custom_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_custom_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSeed>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported custom sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<SourceSeed>> {
    #[derive(Deserialize)]
    struct TomlSources {
        #[serde(default)]
        sources: Vec<CustomSource>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(clean_list(v.sources))
}

fn parse_json(s: &str) -> Result<Vec<SourceSeed>> {
    let v: Vec<CustomSource> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop incomplete entries, keep the first entry per slug.
fn clean_list(items: Vec<CustomSource>) -> Vec<SourceSeed> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let name = it.name.trim();
        let url = it.url.trim();
        if name.is_empty() || url.is_empty() {
            continue;
        }
        let slug = match it.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => slugify(s),
            None => slugify(name),
        };
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        out.push(SourceSeed {
            slug,
            name: name.to_string(),
            kind: SourceKind::IcsFeed,
            url: url.to_string(),
            is_built_in: false,
        });
    }
    out
}
