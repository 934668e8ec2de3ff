//! Worker configuration
//!
//! Defaults come from environment variables (`PACKAGE_WORKER_*`) with
//! built-in fallbacks; a TOML file can override any subset of keys.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overall budget for one inner action (a selector walk, a lifecycle phase).
pub const INNER_ACTION_TIMEOUT_MS: u64 = 30_000;
/// Budget for one remote check inside the selector walk.
pub const REMOTE_CHECK_TIMEOUT_MS: u64 = 10_000;
/// Pause between the two source version reads of the stability check.
pub const SOURCE_PACKAGE_STABILITY_THRESHOLD_MS: u64 = 4_000;
/// Sources untouched for longer than this skip the stability wait.
pub const STABILITY_BYPASS_AGE_SECS: u64 = 6 * 60 * 60;
/// Minimum spacing between emitted progress events.
pub const PROGRESS_INTERVAL_MS: u64 = 500;

/// Timing knobs for the worker engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub inner_action_timeout_ms: u64,
    pub remote_check_timeout_ms: u64,
    pub source_package_stability_threshold_ms: u64,
    pub stability_bypass_age_secs: u64,
    pub progress_interval_ms: u64,
    /// Budget for a job's cancel/cleanup callback.
    pub cancel_timeout_ms: u64,
}

fn env_u64(name: &str, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let inner_action_timeout_ms =
            env_u64("PACKAGE_WORKER_INNER_ACTION_TIMEOUT_MS", INNER_ACTION_TIMEOUT_MS);
        Self {
            inner_action_timeout_ms,
            remote_check_timeout_ms: env_u64(
                "PACKAGE_WORKER_REMOTE_CHECK_TIMEOUT_MS",
                REMOTE_CHECK_TIMEOUT_MS,
            ),
            source_package_stability_threshold_ms: env_u64(
                "PACKAGE_WORKER_SOURCE_STABILITY_THRESHOLD_MS",
                SOURCE_PACKAGE_STABILITY_THRESHOLD_MS,
            ),
            stability_bypass_age_secs: STABILITY_BYPASS_AGE_SECS,
            progress_interval_ms: PROGRESS_INTERVAL_MS,
            cancel_timeout_ms: env_u64("PACKAGE_WORKER_CANCEL_TIMEOUT_MS", inner_action_timeout_ms),
        }
    }
}

impl WorkerConfig {
    /// Parse a TOML document; keys not present keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: WorkerConfig =
            toml::from_str(source).context("Failed to parse worker config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read worker config {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Invalid worker config {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.inner_action_timeout_ms == 0 {
            anyhow::bail!("inner_action_timeout_ms must be greater than zero");
        }
        if self.remote_check_timeout_ms == 0 {
            anyhow::bail!("remote_check_timeout_ms must be greater than zero");
        }
        if self.progress_interval_ms == 0 {
            anyhow::bail!("progress_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn inner_action_timeout(&self) -> Duration {
        Duration::from_millis(self.inner_action_timeout_ms)
    }

    pub fn remote_check_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_check_timeout_ms)
    }

    pub fn source_package_stability_threshold(&self) -> Duration {
        Duration::from_millis(self.source_package_stability_threshold_ms)
    }

    pub fn stability_bypass_age(&self) -> Duration {
        Duration::from_secs(self.stability_bypass_age_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.stability_bypass_age(), Duration::from_secs(21_600));
        assert_eq!(config.progress_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WorkerConfig::from_toml_str(
            r#"
            source_package_stability_threshold_ms = 1000
            progress_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.source_package_stability_threshold_ms, 1000);
        assert_eq!(config.progress_interval_ms, 250);
        assert_eq!(config.stability_bypass_age_secs, STABILITY_BYPASS_AGE_SECS);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = WorkerConfig::from_toml_str("inner_action_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("inner_action_timeout_ms"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "remote_check_timeout_ms = 2500").unwrap();
        let config = WorkerConfig::load(file.path()).unwrap();
        assert_eq!(config.remote_check_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = WorkerConfig::load("/nonexistent/worker.toml").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read worker config"));
    }
}
