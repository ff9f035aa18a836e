// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvester configuration.
//!
//! Values come from built-in defaults, then an optional JSON file, then
//! `LEXICON_*` environment variables.

use crate::error::{HarvestError, Result};
use crate::harvester::schemas;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Floor for every periodic interval, so a deadline never re-arms at `now`.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables of one harvester session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarvestConfig {
    /// Identifies the target app in relay payloads and endpoints.
    pub organ_id: String,
    /// Harvest root selectors, most specific first.
    pub harvest_roots: Vec<String>,
    /// Any of these matching means the host page is ready.
    pub readiness_markers: Vec<String>,
    pub poll_interval_ms: u64,
    /// Failed readiness probes before giving up.
    pub max_retries: u32,
    pub rescan_debounce_ms: u64,
    pub flush_delay_ms: u64,
    pub snapshot_interval_ms: u64,
    pub query_poll_interval_ms: u64,
    /// Emit periodic debug snapshots.
    pub debug: bool,
    /// Base URL of the HTTP relay, when records leave the process.
    pub relay_url: Option<String>,
    /// Upper bound on one relay POST.
    pub relay_timeout_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            organ_id: "whatsapp".into(),
            harvest_roots: schemas::harvest_roots(),
            readiness_markers: schemas::readiness_markers(),
            poll_interval_ms: 1_000,
            max_retries: 60,
            rescan_debounce_ms: 300,
            flush_delay_ms: 500,
            snapshot_interval_ms: 5_000,
            query_poll_interval_ms: 500,
            debug: false,
            relay_url: None,
            relay_timeout_ms: 3_000,
        }
    }
}

impl HarvestConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
                let config: Self = serde_json::from_str(&raw)
                    .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
                config.validate()?;
                config
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LEXICON_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("LEXICON_ORGAN_ID").filter(|v| !v.is_empty()) {
            self.organ_id = id;
        }
        if let Some(raw) = lookup("LEXICON_MAX_RETRIES") {
            self.max_retries = parse_number("LEXICON_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("LEXICON_POLL_MS") {
            self.poll_interval_ms = parse_number("LEXICON_POLL_MS", &raw)?;
        }
        if let Some(raw) = lookup("LEXICON_FLUSH_MS") {
            self.flush_delay_ms = parse_number("LEXICON_FLUSH_MS", &raw)?;
        }
        if let Some(raw) = lookup("LEXICON_DEBUG") {
            self.debug = matches!(raw.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(url) = lookup("LEXICON_RELAY_URL").filter(|v| !v.is_empty()) {
            self.relay_url = Some(url);
        }
        if let Some(raw) = lookup("LEXICON_RELAY_TIMEOUT_MS") {
            self.relay_timeout_ms = parse_number("LEXICON_RELAY_TIMEOUT_MS", &raw)?;
        }
        self.validate()
    }

    /// Reject periodic intervals and timeouts of zero.
    pub fn validate(&self) -> Result<()> {
        let periodic = [
            ("pollIntervalMs", self.poll_interval_ms),
            ("snapshotIntervalMs", self.snapshot_interval_ms),
            ("queryPollIntervalMs", self.query_poll_interval_ms),
            ("relayTimeoutMs", self.relay_timeout_ms),
        ];
        match periodic.iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(HarvestError::Config(format!("{name} must be greater than zero"))),
            None => Ok(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_INTERVAL)
    }

    pub fn rescan_debounce(&self) -> Duration {
        Duration::from_millis(self.rescan_debounce_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms).max(MIN_INTERVAL)
    }

    pub fn query_poll_interval(&self) -> Duration {
        Duration::from_millis(self.query_poll_interval_ms).max(MIN_INTERVAL)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms).max(MIN_INTERVAL)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| HarvestError::Config(format!("{key} must be a number, got '{raw}'")))
}

/// Resolve the pattern database path: explicit, then `LEXICON_PATTERN_DB`,
/// then `~/.lexicon/patterns.db`.
pub fn resolve_store_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(env_path) = std::env::var("LEXICON_PATTERN_DB") {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lexicon")
        .join("patterns.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.rescan_debounce(), Duration::from_millis(300));
        assert_eq!(config.flush_delay(), Duration::from_millis(500));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(5));
        assert_eq!(config.query_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.relay_timeout(), Duration::from_secs(3));
        assert!(config.readiness_markers.contains(&"#pane-side".to_string()));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("LEXICON_ORGAN_ID", "telegram"),
            ("LEXICON_MAX_RETRIES", "3"),
            ("LEXICON_POLL_MS", "250"),
            ("LEXICON_DEBUG", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = HarvestConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.organ_id, "telegram");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.poll_interval_ms, 250);
        assert!(config.debug);
        assert_eq!(config.flush_delay_ms, 500);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = HarvestConfig::default();
        let err = config
            .apply_overrides(|key| (key == "LEXICON_POLL_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "E_CONFIG");
    }

    #[test]
    fn test_zero_interval_is_config_error() {
        let mut config = HarvestConfig::default();
        let err = config
            .apply_overrides(|key| (key == "LEXICON_POLL_MS").then(|| "0".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "E_CONFIG");
        assert!(err.to_string().contains("pollIntervalMs"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(&path, r#"{"queryPollIntervalMs": 0}"#).unwrap();
        let err = HarvestConfig::load(Some(&path)).unwrap_err();
        assert_eq!(err.code(), "E_CONFIG");
        assert!(err.to_string().contains("queryPollIntervalMs"));
    }

    #[test]
    fn test_interval_getters_never_return_zero() {
        let config = HarvestConfig {
            poll_interval_ms: 0,
            snapshot_interval_ms: 0,
            query_poll_interval_ms: 0,
            ..HarvestConfig::default()
        };
        assert_eq!(config.poll_interval(), MIN_INTERVAL);
        assert_eq!(config.snapshot_interval(), MIN_INTERVAL);
        assert_eq!(config.query_poll_interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(&path, r#"{"organId": "slack", "flushDelayMs": 200}"#).unwrap();

        let config: HarvestConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.organ_id, "slack");
        assert_eq!(config.flush_delay_ms, 200);
        assert_eq!(config.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_explicit_store_path_wins() {
        let path = resolve_store_path(Some(Path::new("/tmp/p.db")));
        assert_eq!(path, PathBuf::from("/tmp/p.db"));
    }
}
