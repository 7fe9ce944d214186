use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_types::ValidatorError;

/// Configuration for a Vigil validator node.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Directory holding the node's state database (Sled).
    pub storage_path: PathBuf,

    /// Workers drawn per forward round.
    pub sample_size: usize,

    /// EMA weight given to the newest round, in `[0, 1]`.
    pub moving_average_alpha: f64,

    /// Blocks between registry syncs.
    pub sync_interval_blocks: u64,

    /// Blocks between liveness probes.
    pub healthcheck_blocks: u64,

    /// Blocks between volume sampling rounds.
    pub volume_blocks: u64,

    /// Wall-clock length of one block; also the sleep between loop iterations.
    pub block_time_ms: u64,

    /// Per-call timeout for worker requests.
    pub forward_timeout_ms: u64,

    /// How long shutdown waits for each loop before abandoning it.
    pub shutdown_grace_ms: u64,

    /// Blocks that must pass since the last on-ledger weight update before publishing again.
    pub epoch_length: u64,

    pub disable_set_weights: bool,

    /// When set, no requests are sent to workers at all.
    pub networking_disabled: bool,

    /// Refresh the trending query list every epoch.
    pub auto_update: bool,

    /// Number of trending queries kept after each refresh.
    pub trending_query_limit: usize,

    /// Workers drawn per volume sampling round.
    pub volume_sample_size: usize,

    /// Items requested from each worker during volume sampling.
    pub volume_item_count: u32,

    /// Optional port for the Prometheus metrics http endpoint.
    pub metrics_port: Option<u16>,

    /// Optional log level string (e.g., "info", "debug", "vigil_runtime=trace").
    pub log_level: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("state"),
            sample_size: 10,
            moving_average_alpha: 0.1,
            sync_interval_blocks: 6,
            healthcheck_blocks: 100,
            volume_blocks: 10,
            block_time_ms: 12_000,
            forward_timeout_ms: 15_000,
            shutdown_grace_ms: 5_000,
            epoch_length: 100,
            disable_set_weights: false,
            networking_disabled: false,
            auto_update: true,
            trending_query_limit: 10,
            volume_sample_size: 10,
            volume_item_count: 100,
            metrics_port: None,
            log_level: None,
        }
    }
}

impl ValidatorConfig {
    /// Load validator configuration from a TOML file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        tracing::info!("Attempting to load validator config from: {:?}", path_ref);
        let text = fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read validator config file at {:?}: {}", path_ref, e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse validator config from TOML at {:?}: {}", path_ref, e))?;
        config.validate()?;
        tracing::info!("Successfully loaded validator config from: {:?}", path_ref);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidatorError> {
        if !(0.0..=1.0).contains(&self.moving_average_alpha) {
            return Err(ValidatorError::InvalidConfig(format!(
                "moving_average_alpha must be within [0, 1], got {}",
                self.moving_average_alpha
            )));
        }
        if self.sample_size == 0 {
            return Err(ValidatorError::InvalidConfig("sample_size must be positive".into()));
        }
        if self.block_time_ms == 0 {
            return Err(ValidatorError::InvalidConfig("block_time_ms must be positive".into()));
        }
        for (name, blocks) in [
            ("sync_interval_blocks", self.sync_interval_blocks),
            ("healthcheck_blocks", self.healthcheck_blocks),
            ("volume_blocks", self.volume_blocks),
        ] {
            if blocks == 0 {
                return Err(ValidatorError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
