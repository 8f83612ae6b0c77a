// src/harvest/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::transport::RetryPolicy;

const ENV_PATH: &str = "HARVEST_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/harvest.toml";

/// Run tunables. Every field has a production default; a TOML file may
/// override any subset of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Portal root; probed once before dispatch and used as the Referer.
    pub portal_root: String,
    /// Metric endpoint receiving the per-task form POST.
    pub metric_url: String,
    /// Approach-volume metric type code.
    pub metric_type_id: String,
    /// Portal reporting granularity code, in minutes.
    pub bin_size: String,
    /// Admission gate: max tasks with an in-flight call.
    pub concurrency: usize,
    /// Tasks dispatched together before the inter-batch pause.
    pub batch_size: usize,
    pub batch_pause_secs: u64,
    /// Small pre-call delay smoothing burst arrival within a batch.
    pub task_jitter_ms: u64,
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub call_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            portal_root: "https://traffic.dot.ga.gov/ATSPM/".to_string(),
            metric_url: "https://traffic.dot.ga.gov/ATSPM/DefaultCharts/GetApproachVolumeMetric"
                .to_string(),
            metric_type_id: "7".to_string(),
            bin_size: "15".to_string(),
            concurrency: 10,
            batch_size: 50,
            batch_pause_secs: 5,
            task_jitter_ms: 100,
            max_attempts: 3,
            backoff_base: 1.5,
            call_timeout_secs: 30,
            pool_max_idle_per_host: 5,
        }
    }
}

impl HarvestConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }

    pub fn task_jitter(&self) -> Duration {
        Duration::from_millis(self.task_jitter_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
        }
    }
}

/// Load config from an explicit TOML path.
pub fn load_config_from(path: &Path) -> Result<HarvestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading harvest config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $HARVEST_CONFIG_PATH
/// 2) config/harvest.toml
/// 3) built-in defaults
pub fn load_config_default() -> Result<HarvestConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("HARVEST_CONFIG_PATH points to non-existent path"));
    }
    let default_p = PathBuf::from(DEFAULT_PATH);
    if default_p.exists() {
        return load_config_from(&default_p);
    }
    Ok(HarvestConfig::default())
}
