//! Session configuration
//!
//! Loaded from TOML. Every field has a built-in default so a missing file or
//! a partial file still yields a usable configuration.
//!
//! ```toml
//! event_capacity = 100
//!
//! [sync]
//! gate = "elapsed"          # or "always"
//! interval_secs = 86400
//!
//! [hysteresis]
//! policy = "miss_counter"   # or "timeout"
//! miss_threshold = 2
//! drop_window_ms = 1500
//!
//! [pipeline]
//! strategy_order = ["image_search", "barcode_decode"]
//!
//! [scan]
//! enabled = ["image", "ean13", "qrcode"]
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use vrs_common::config::{load_or_default, load_toml, CONFIG_ENV_VAR};
use vrs_common::{OutcomeKind, ScanOptions};

use crate::error::{Error, Result};
use crate::pipeline::Strategy;
use crate::stabilizer::HysteresisPolicy;
use crate::sync::SyncGate;

/// Upper bound for time-based settings (ten years)
const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub hysteresis: HysteresisConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Broadcast capacity of the session event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Sync gating configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub gate: SyncGateKind,

    /// Minimum time between completed syncs under the elapsed gate
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncGateKind {
    #[default]
    Elapsed,
    Always,
}

/// Lock hysteresis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    #[serde(default)]
    pub policy: HysteresisKind,

    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,

    #[serde(default = "default_drop_window_ms")]
    pub drop_window_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HysteresisKind {
    #[default]
    MissCounter,
    Timeout,
}

/// Recognition pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Strategies run after lock verification, first success wins
    #[serde(default = "default_strategy_order")]
    pub strategy_order: Vec<Strategy>,
}

/// Enabled outcome kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_enabled_kinds")]
    pub enabled: Vec<OutcomeKind>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_event_capacity() -> usize {
    100
}

fn default_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_miss_threshold() -> u32 {
    2
}

fn default_drop_window_ms() -> u64 {
    1500
}

fn default_strategy_order() -> Vec<Strategy> {
    vec![Strategy::ImageSearch, Strategy::BarcodeDecode]
}

fn default_enabled_kinds() -> Vec<OutcomeKind> {
    ScanOptions::default().kinds()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            hysteresis: HysteresisConfig::default(),
            pipeline: PipelineConfig::default(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gate: SyncGateKind::default(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            policy: HysteresisKind::default(),
            miss_threshold: default_miss_threshold(),
            drop_window_ms: default_drop_window_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy_order: default_strategy_order(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_kinds(),
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

impl SessionConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let config: SessionConfig = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file (CLI → `VRS_CONFIG` → user config dir) and
    /// load it, falling back to defaults when none exists
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        let config: SessionConfig = load_or_default(cli_arg, CONFIG_ENV_VAR)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.hysteresis.miss_threshold == 0 {
            return Err(Error::InvalidConfig(
                "hysteresis.miss_threshold must be at least 1".to_string(),
            ));
        }
        if self.hysteresis.drop_window_ms == 0 {
            return Err(Error::InvalidConfig(
                "hysteresis.drop_window_ms must be greater than 0".to_string(),
            ));
        }
        if self.hysteresis.drop_window_ms / 1000 > MAX_INTERVAL_SECS {
            return Err(Error::InvalidConfig(
                "hysteresis.drop_window_ms is too large".to_string(),
            ));
        }
        if self.sync.interval_secs > MAX_INTERVAL_SECS {
            return Err(Error::InvalidConfig(
                "sync.interval_secs is too large".to_string(),
            ));
        }

        let order = &self.pipeline.strategy_order;
        if order.is_empty() {
            return Err(Error::InvalidConfig(
                "pipeline.strategy_order must not be empty".to_string(),
            ));
        }
        let unique: HashSet<_> = order.iter().collect();
        if unique.len() != order.len() {
            return Err(Error::InvalidConfig(
                "pipeline.strategy_order contains duplicates".to_string(),
            ));
        }

        if self.scan_options().is_empty() {
            return Err(Error::InvalidConfig(
                "scan.enabled must name at least one outcome kind".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::from_kinds(self.scan.enabled.iter().copied())
    }

    pub fn sync_gate(&self) -> SyncGate {
        match self.sync.gate {
            SyncGateKind::Elapsed => SyncGate::Elapsed {
                interval: chrono::Duration::seconds(
                    self.sync.interval_secs.min(MAX_INTERVAL_SECS) as i64,
                ),
            },
            SyncGateKind::Always => SyncGate::Always,
        }
    }

    pub fn hysteresis_policy(&self) -> HysteresisPolicy {
        match self.hysteresis.policy {
            HysteresisKind::MissCounter => HysteresisPolicy::MissCounter {
                threshold: self.hysteresis.miss_threshold,
            },
            HysteresisKind::Timeout => HysteresisPolicy::Timeout {
                drop_window: chrono::Duration::milliseconds(
                    self.hysteresis.drop_window_ms.min(MAX_INTERVAL_SECS * 1000) as i64,
                ),
            },
        }
    }
}
