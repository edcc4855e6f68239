//! Mock server configuration
//!
//! Read from `<config_dir>/nfc/mock.toml` or the file given by `--config` /
//! `NFC_MOCK_CONFIG`. Command-line flags override file values.

use nfc_common::config::LoggingConfig;
use nfc_common::time::{millis_to_duration, scale_duration};
use nfc_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "mock.toml";
pub const CONFIG_ENV_VAR: &str = "NFC_MOCK_CONFIG";
pub const DEFAULT_PORT: u16 = 5000;

/// Operations a failure can be injected into, keyed by these names
pub const OPERATIONS: [&str; 6] = [
    "start_recording",
    "stop_recording",
    "train",
    "start_inference",
    "stop_inference",
    "status",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub port: u16,
    /// Multiplier for the nominal per-operation latencies; 0 disables them
    pub latency_scale: f64,
    /// Period of pushed predictions while inference runs
    pub push_interval_ms: u64,
    /// Push bare label indices instead of JSON prediction messages
    pub push_binary: bool,
    /// Accuracy reported by `/train`
    pub accuracy: f64,
    /// Operation name to the error message it always fails with
    pub failures: BTreeMap<String, String>,
    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: "nfc_mock=info,tower_http=debug".to_string(),
        file: None,
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            latency_scale: 1.0,
            push_interval_ms: 2000,
            push_binary: false,
            accuracy: 0.95,
            failures: BTreeMap::new(),
            logging: default_logging(),
        }
    }
}

impl MockConfig {
    /// Zero latency and a fast push period, for tests
    pub fn instant() -> Self {
        Self {
            latency_scale: 0.0,
            push_interval_ms: 20,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latency_scale.is_finite() || self.latency_scale < 0.0 {
            return Err(Error::Config(format!(
                "latency_scale must be a non-negative number, got {}",
                self.latency_scale
            )));
        }
        if self.push_interval_ms == 0 {
            return Err(Error::Config("push_interval_ms must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(Error::Config(format!(
                "accuracy must be within [0, 1], got {}",
                self.accuracy
            )));
        }
        if let Some(unknown) = self.failures.keys().find(|k| !OPERATIONS.contains(&k.as_str())) {
            return Err(Error::Config(format!(
                "failures.{} is not an operation (expected one of {:?})",
                unknown, OPERATIONS
            )));
        }
        Ok(())
    }

    /// Scaled latency of an operation
    pub fn latency(&self, operation: &str) -> Duration {
        let nominal_ms = match operation {
            "start_recording" => 200,
            "stop_recording" => 300,
            "train" => 2000,
            "start_inference" => 400,
            "stop_inference" => 200,
            "status" => 150,
            _ => 0,
        };
        scale_duration(millis_to_duration(nominal_ms), self.latency_scale)
    }

    pub fn failure(&self, operation: &str) -> Option<&str> {
        self.failures.get(operation).map(String::as_str)
    }

    pub fn push_interval(&self) -> Duration {
        millis_to_duration(self.push_interval_ms)
    }
}
