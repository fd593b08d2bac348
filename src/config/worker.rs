// src/config/worker.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn default_interval_hours() -> u64 {
    6
}
/// One year; anything longer is treated as a typo.
const MAX_INTERVAL_HOURS: u64 = 24 * 365;

fn default_port() -> u16 {
    3001
}
fn default_http_timeout_secs() -> u64 {
    30
}

/// Runtime settings for the worker binary, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Hours between scheduled runs, between 1 and one year.
    pub scrape_interval_hours: u64,
    pub port: u16,
    pub http_timeout_secs: u64,
    /// JSON snapshot of the in-memory store; `None` keeps data in memory only.
    pub store_snapshot_path: Option<PathBuf>,
    /// Explicit custom sources file. Unset falls back to `config/custom_sources.*`.
    pub custom_sources_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scrape_interval_hours: default_interval_hours(),
            port: default_port(),
            http_timeout_secs: default_http_timeout_secs(),
            store_snapshot_path: None,
            custom_sources_path: None,
        }
    }
}

impl WorkerConfig {
    /// Unparseable values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let interval = parse_var("SCRAPE_INTERVAL_HOURS", default_interval_hours())
            .clamp(1, MAX_INTERVAL_HOURS);
        Self {
            scrape_interval_hours: interval,
            port: parse_var("WORKER_PORT", default_port()),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", default_http_timeout_secs()).max(1),
            store_snapshot_path: path_var("STORE_SNAPSHOT_PATH"),
            custom_sources_path: path_var(crate::ingest::config::ENV_PATH),
        }
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_hours.saturating_mul(3600))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 5] = [
        "SCRAPE_INTERVAL_HOURS",
        "WORKER_PORT",
        "HTTP_TIMEOUT_SECS",
        "STORE_SNAPSHOT_PATH",
        "CUSTOM_SOURCES_PATH",
    ];

    fn clear() {
        for k in KEYS {
            env::remove_var(k);
        }
    }

    #[serial_test::serial]
    #[test]
    fn defaults_without_env() {
        clear();
        let cfg = WorkerConfig::from_env();
        assert_eq!(cfg, WorkerConfig::default());
        assert_eq!(cfg.scrape_interval(), Duration::from_secs(6 * 3600));
    }

    #[serial_test::serial]
    #[test]
    fn reads_and_clamps_env() {
        clear();
        env::set_var("SCRAPE_INTERVAL_HOURS", "0");
        env::set_var("WORKER_PORT", "8080");
        env::set_var("HTTP_TIMEOUT_SECS", "soon");
        env::set_var("STORE_SNAPSHOT_PATH", " data/store.json ");
        let cfg = WorkerConfig::from_env();
        clear();

        assert_eq!(cfg.scrape_interval_hours, 1);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.store_snapshot_path, Some(PathBuf::from("data/store.json")));
        assert_eq!(cfg.custom_sources_path, None);
    }

    #[serial_test::serial]
    #[test]
    fn huge_interval_is_capped() {
        clear();
        env::set_var("SCRAPE_INTERVAL_HOURS", u64::MAX.to_string());
        let cfg = WorkerConfig::from_env();
        clear();

        assert_eq!(cfg.scrape_interval_hours, MAX_INTERVAL_HOURS);
        assert_eq!(cfg.scrape_interval(), Duration::from_secs(MAX_INTERVAL_HOURS * 3600));
    }
}
