//! Global configuration types.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! database location, engine defaults, the job worker and logging.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.stepwise/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// SQLite URL. Defaults to `stepwise.db` inside the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Execution engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry limit assigned to every new step execution.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
        }
    }
}

/// Job worker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How often the queue is polled for due jobs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum jobs claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum jobs running at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Jobs left Running longer than this are assumed orphaned and requeued
    /// when a worker starts.
    #[serde(default = "default_stale_job_timeout_secs")]
    pub stale_job_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> u32 {
    16
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_stale_job_timeout_secs() -> u64 {
    300
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            stale_job_timeout_secs: default_stale_job_timeout_secs(),
        }
    }
}

/// Log output options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.engine.default_max_retries, 3);
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert_eq!(config.worker.max_concurrent_jobs, 8);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.default_max_retries, 3);
        assert_eq!(config.worker.batch_size, 16);
        assert_eq!(config.worker.stale_job_timeout_secs, 300);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///tmp/flows.db"

[engine]
default_max_retries = 5

[worker]
poll_interval_ms = 250
max_concurrent_jobs = 2

[logging]
json = true
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:///tmp/flows.db"));
        assert_eq!(config.engine.default_max_retries, 5);
        assert_eq!(config.worker.poll_interval_ms, 250);
        assert_eq!(config.worker.max_concurrent_jobs, 2);
        assert_eq!(config.worker.batch_size, 16);
        assert!(config.logging.json);
        assert!(!config.logging.otel);
    }
}
