//! Engine configuration (§3 "Ambient addition — EngineConfig", §4.J): a
//! layered CLI-flags-plus-optional-TOML-file setup, matching the corpus's
//! `serde`+`toml` ambient stack. The `Engine` itself only ever sees an
//! [`EngineConfig`] value; it has no knowledge of files or flags.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Tunable knobs for one [`crate::engine::Engine`] run.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Minimum spacing the CLI front-end sleeps between cycles. The engine's
    /// own cycle rate is otherwise gated purely by the barrier protocol.
    pub poll_interval: Duration,
    /// How long the coordinator waits for the first event of a cycle before
    /// concluding the cycle is empty.
    pub drain_timeout: Duration,
    /// `tracing_subscriber::EnvFilter` directive string.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(1),
            log_filter: "info".to_string(),
        }
    }
}

/// On-disk representation of an optional TOML config file. Every field is
/// optional; absent fields keep [`EngineConfig::default`]'s value.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    poll_interval_ms: Option<u64>,
    drain_timeout_ms: Option<u64>,
    log_filter: Option<String>,
}

impl EngineConfig {
    /// Loads overrides from `path` (TOML) on top of [`EngineConfig::default`].
    /// A missing file is not an error — callers only invoke this when a
    /// `--config` path was actually supplied.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawConfig = toml::from_str(&text)
            .map_err(|e| crate::error::Error::SpecInvalid(format!("invalid config file: {e}")))?;

        let mut config = Self::default();
        if let Some(ms) = raw.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.drain_timeout_ms {
            config.drain_timeout = Duration::from_millis(ms);
        }
        if let Some(filter) = raw.log_filter {
            config.log_filter = filter;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn load_applies_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locksync.toml");
        std::fs::write(&path, "drain_timeout_ms = 250\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.drain_timeout, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locksync.toml");
        std::fs::write(&path, "poll_interval_ms = [this is not toml").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
