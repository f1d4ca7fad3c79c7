// src/config.rs

//! Manages bus configuration: loading, defaults, and validation.

use crate::core::broker::{CACHE_TOPIC, DeliveryMode};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Configuration of one coherence bus instance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BusConfig {
    /// Threshold above which bulk relation events collapse into a reset.
    #[serde(default = "default_maximum_relation_size")]
    pub maximum_relation_size: usize,

    /// Broker delivery mode for outgoing events.
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Length of the statistics reporting window.
    #[serde(default = "default_stats_period", with = "humantime_serde")]
    pub stats_period: Duration,

    /// Minimum new-maximum latency (in milliseconds) that triggers an
    /// immediate log line outside the periodic summary.
    #[serde(default = "default_stats_log_max_threshold_ms")]
    pub stats_log_max_threshold_ms: u64,

    /// The pub/sub destination all nodes share.
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_maximum_relation_size() -> usize {
    10_000
}

fn default_stats_period() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_stats_log_max_threshold_ms() -> u64 {
    10
}

fn default_topic() -> String {
    CACHE_TOPIC.to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            maximum_relation_size: default_maximum_relation_size(),
            delivery_mode: DeliveryMode::default(),
            stats_period: default_stats_period(),
            stats_log_max_threshold_ms: default_stats_log_max_threshold_ms(),
            topic: default_topic(),
        }
    }
}

impl BusConfig {
    /// Creates a new `BusConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: BusConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(anyhow!("topic cannot be empty"));
        }

        if self.maximum_relation_size == 0 {
            warn!(
                "maximum_relation_size is 0: every bulk relation event will collapse into a reset."
            );
        }

        if self.stats_period.is_zero() {
            warn!("stats_period is zero: statistics will flush on every tick.");
        }

        Ok(())
    }
}
