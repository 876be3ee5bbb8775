//! Node configuration for the abyss curse service.
//!
//! [`NodeConfig`] carries the data directory, logging, timer cadences and the
//! [`RegionConfig`] snapshot. It loads from an optional TOML file layered
//! with `ABYSS_`-prefixed environment variables, `__` separating nested
//! keys (`ABYSS_REGION__RADIUS=12`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use abyss_core::constants::{
    DEFAULT_AUTOSAVE_INTERVAL, DEFAULT_EXPIRY_INTERVAL, DEFAULT_SAMPLE_INTERVAL,
};
use abyss_core::error::ConfigError;
use abyss_core::region::RegionConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ABYSS";

/// Configuration for a node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "abyss_curse=trace").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    /// Keep state in memory only.
    pub ephemeral: bool,
    pub sample_interval_ms: u64,
    pub expiry_interval_ms: u64,
    pub autosave_interval_secs: u64,
    pub region: RegionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("abyss");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            ephemeral: false,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL.as_millis() as u64,
            expiry_interval_ms: DEFAULT_EXPIRY_INTERVAL.as_millis() as u64,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL.as_secs(),
            region: RegionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `path` (required when given) layered with the process
    /// environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load with an explicit environment source. Tests pass a fixed map.
    pub fn load_with_env(
        path: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let cfg: NodeConfig = builder
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural checks: non-zero cadences plus the region checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cadences = [
            ("sample_interval_ms", self.sample_interval_ms),
            ("expiry_interval_ms", self.expiry_interval_ms),
            ("autosave_interval_secs", self.autosave_interval_secs),
        ];
        if let Some((field, _)) = cadences.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidValue { field: *field, reason: "must be non-zero".into() });
        }
        self.region.validate()
    }

    /// Path to the RocksDB curse data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("cursedata")
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_interval_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}
