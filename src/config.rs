//! Pipeline configuration. Loaded once at startup from JSON; every section has defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Two-column TSV asset (CODE, REFERENCE) joined against `AD`
    pub reference_path: PathBuf,
    /// Ingestion buffer thresholds and shard timers
    pub ingest: IngestConfig,
    /// Durable batch store
    pub storage: StorageConfig,
    /// Tumbling window parameters
    pub window: WindowConfig,
    /// Metrics sink delivery
    pub sink: SinkConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Seal a batch once its first record is this old (seconds)
    pub flush_interval_secs: u64,
    /// Seal a batch once it holds this many uncompressed bytes
    pub flush_size_bytes: u64,
    /// Unflushed bytes above which `submit` throttles
    pub max_buffered_bytes: u64,
    /// Caller pause before resubmitting a throttled record (ms)
    pub throttle_retry_ms: u64,
    /// Shard timer driving age-based sealing and window closing (ms)
    pub tick_ms: u64,
    /// Bound on the graceful drain of outstanding flushes (seconds)
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the batch store
    pub root_dir: PathBuf,
    /// Key prefix under the root, e.g. `raw-data/`
    pub prefix: String,
    /// gzip level 0-9
    pub compression_level: u32,
    /// First retry delay of a failed flush (ms)
    pub retry_base_ms: u64,
    /// Upper bound on the flush retry delay (ms)
    pub retry_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Tumbling window width (seconds)
    pub width_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Metrics endpoint; when absent counts are written to stdout as JSON lines
    pub endpoint: Option<String>,
    /// Metric namespace sent with every datum
    pub namespace: String,
    /// Attempts per Windowed Count before it is dropped
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from("data/referential.tsv"),
            ingest: IngestConfig::default(),
            storage: StorageConfig::default(),
            window: WindowConfig::default(),
            sink: SinkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
            flush_size_bytes: 128 * MIB,
            max_buffered_bytes: 256 * MIB,
            throttle_retry_ms: 50,
            tick_ms: 1000,
            drain_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(".bidflow"),
            prefix: "raw-data/".to_string(),
            compression_level: 6,
            retry_base_ms: 200,
            retry_max_ms: 10_000,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { width_secs: 30 }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: "BidRequestExperiment".to_string(),
            max_attempts: 5,
            backoff_base_ms: 200,
            backoff_max_ms: 10_000,
            timeout_secs: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl IngestConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn throttle_retry(&self) -> Duration {
        Duration::from_millis(self.throttle_retry_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl WindowConfig {
    pub fn width(&self) -> Duration {
        Duration::from_secs(self.width_secs)
    }
}

impl PipelineConfig {
    /// Load from a JSON file; a missing file yields defaults, a broken one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width_secs == 0 {
            return Err(ConfigError::Invalid("window.width_secs must be > 0".into()));
        }
        if self.ingest.flush_interval_secs == 0 || self.ingest.flush_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "ingest flush thresholds must be > 0".into(),
            ));
        }
        if self.ingest.max_buffered_bytes < self.ingest.flush_size_bytes {
            return Err(ConfigError::Invalid(format!(
                "ingest.max_buffered_bytes ({}) is below ingest.flush_size_bytes ({})",
                self.ingest.max_buffered_bytes, self.ingest.flush_size_bytes
            )));
        }
        if self.sink.max_attempts == 0 {
            return Err(ConfigError::Invalid("sink.max_attempts must be >= 1".into()));
        }
        if self.storage.compression_level > 9 {
            return Err(ConfigError::Invalid(
                "storage.compression_level must be 0-9".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let c: PipelineConfig =
            serde_json::from_str(r#"{"window":{"width_secs":10},"sink":{"max_attempts":2}}"#)
                .unwrap();
        assert_eq!(c.window.width_secs, 10);
        assert_eq!(c.sink.max_attempts, 2);
        assert_eq!(c.sink.namespace, "BidRequestExperiment");
        assert_eq!(c.ingest.flush_interval_secs, 60);
        assert_eq!(c.ingest.flush_size_bytes, 128 * MIB);
    }

    #[test]
    fn rejects_zero_window() {
        let mut c = PipelineConfig::default();
        c.window.width_secs = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_hard_cap_below_flush_size() {
        let mut c = PipelineConfig::default();
        c.ingest.max_buffered_bytes = c.ingest.flush_size_bytes - 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bidflow.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
