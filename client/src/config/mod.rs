//! Configuration management

use anyhow::{Context, Result};
use measure::constants::*;
use measure::geo::Coordinates;
use measure::{DialScale, DisplayUnit};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub display_unit: DisplayUnit,
    #[serde(default)]
    pub dial_scale: DialScale,
}

/// Static stand-in for a location provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_catalog_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_download_duration_ms")]
    pub download_duration_ms: u64,
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "default_download_chunk_sizes")]
    pub download_chunk_sizes: Vec<u64>,
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
    #[serde(default = "default_upload_duration_ms")]
    pub upload_duration_ms: u64,
    #[serde(default = "default_upload_chunk_size")]
    pub upload_chunk_size: u64,
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    #[serde(default = "default_upload_failure_limit")]
    pub upload_failure_limit: u32,
    #[serde(default = "default_decay_ms")]
    pub decay_ms: u64,
    #[serde(default = "default_decay_steps")]
    pub decay_steps: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_database_path() -> String {
    "speedgauge.db".to_string()
}

fn default_catalog_url() -> String {
    "https://www.speedtest.net/api/js/servers?engine=js&limit=20".to_string()
}

fn default_catalog_timeout_ms() -> u64 {
    5000
}

fn default_settle_ms() -> u64 {
    SETTLE_MS
}

fn default_ping_count() -> u32 {
    PING_COUNT
}

fn default_ping_timeout_ms() -> u64 {
    PING_TIMEOUT_MS
}

fn default_ping_interval_ms() -> u64 {
    PING_INTERVAL_MS
}

fn default_download_duration_ms() -> u64 {
    DOWNLOAD_DURATION_MS
}

fn default_download_concurrency() -> usize {
    DOWNLOAD_CONCURRENCY
}

fn default_download_chunk_sizes() -> Vec<u64> {
    DOWNLOAD_CHUNK_SIZES.to_vec()
}

fn default_download_timeout_ms() -> u64 {
    DOWNLOAD_TIMEOUT_MS
}

fn default_upload_duration_ms() -> u64 {
    UPLOAD_DURATION_MS
}

fn default_upload_chunk_size() -> u64 {
    UPLOAD_CHUNK_SIZE
}

fn default_upload_timeout_ms() -> u64 {
    UPLOAD_TIMEOUT_MS
}

fn default_upload_failure_limit() -> u32 {
    UPLOAD_FAILURE_LIMIT
}

fn default_decay_ms() -> u64 {
    DECAY_MS
}

fn default_decay_steps() -> u32 {
    DECAY_STEPS
}

fn default_history_capacity() -> usize {
    HISTORY_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_public_ip_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            display_unit: DisplayUnit::default(),
            dial_scale: DialScale::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout_ms: default_catalog_timeout_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            ping_count: default_ping_count(),
            ping_timeout_ms: default_ping_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            download_duration_ms: default_download_duration_ms(),
            download_concurrency: default_download_concurrency(),
            download_chunk_sizes: default_download_chunk_sizes(),
            download_timeout_ms: default_download_timeout_ms(),
            upload_duration_ms: default_upload_duration_ms(),
            upload_chunk_size: default_upload_chunk_size(),
            upload_timeout_ms: default_upload_timeout_ms(),
            upload_failure_limit: default_upload_failure_limit(),
            decay_ms: default_decay_ms(),
            decay_steps: default_decay_steps(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            public_ip_url: default_public_ip_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        config.pipeline.normalize();

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

impl LocationConfig {
    /// User location snapshot, present only when both coordinates are set
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

impl PipelineConfig {
    /// Repair values that would stall a run
    fn normalize(&mut self) {
        self.download_concurrency = self.download_concurrency.max(1);
        self.download_chunk_sizes.retain(|&size| size > 0);
        if self.download_chunk_sizes.is_empty() {
            self.download_chunk_sizes = default_download_chunk_sizes();
        }
        self.upload_chunk_size = self.upload_chunk_size.max(1);
        self.upload_failure_limit = self.upload_failure_limit.max(1);
        self.history_capacity = self.history_capacity.max(1);
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn download_duration(&self) -> Duration {
        Duration::from_millis(self.download_duration_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn upload_duration(&self) -> Duration {
        Duration::from_millis(self.upload_duration_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn decay(&self) -> Duration {
        Duration::from_millis(self.decay_ms)
    }
}
