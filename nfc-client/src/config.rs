//! Client configuration
//!
//! Loaded from `<config_dir>/nfc/client.toml` (or the file named by
//! `--config` / `NFC_CLIENT_CONFIG`), then overridden by command-line flags
//! and their environment variables.

use crate::calibration::DEFAULT_RECORDING_SECS;
use crate::orchestrator::OrchestratorOptions;
use nfc_common::api::{DEFAULT_API_BASE_URL, DEFAULT_WS_URL};
use nfc_common::config::LoggingConfig;
use nfc_common::time::millis_to_duration;
use nfc_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Config file name under the platform config directory
pub const CONFIG_FILE_NAME: &str = "client.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NFC_CLIENT_CONFIG";

/// Which Model Service binding to compose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Request/response calls plus status polling
    #[default]
    Http,
    /// Request/response calls plus pushed predictions
    Websocket,
    /// In-process simulated service
    Simulated,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Http => write!(f, "http"),
            Backend::Websocket => write!(f, "websocket"),
            Backend::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub backend: Backend,
    pub api_base_url: String,
    pub ws_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Http,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            poll_interval_ms: 100,
            request_timeout_ms: 30_000,
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        millis_to_duration(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        millis_to_duration(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub recording_secs: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            recording_secs: DEFAULT_RECORDING_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub discard_out_of_order: bool,
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service: ServiceConfig,
    pub calibration: CalibrationConfig,
    pub inference: InferenceConfig,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            calibration: CalibrationConfig::default(),
            inference: InferenceConfig::default(),
            logging: LoggingConfig {
                level: "nfc_client=info".to_string(),
                file: None,
            },
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<Backend>,
    pub api_base_url: Option<String>,
    pub ws_url: Option<String>,
    pub recording_secs: Option<u32>,
    pub log_level: Option<String>,
}

impl ClientConfig {
    /// Apply command-line / environment overrides on top of the file values
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.service.backend = backend;
        }
        if let Some(url) = overrides.api_base_url {
            self.service.api_base_url = url;
        }
        if let Some(url) = overrides.ws_url {
            self.service.ws_url = url;
        }
        if let Some(secs) = overrides.recording_secs {
            self.calibration.recording_secs = secs;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.calibration.recording_secs == 0 {
            return Err(Error::Config(
                "calibration.recording_secs must be at least 1".to_string(),
            ));
        }
        if self.service.poll_interval_ms == 0 {
            return Err(Error::Config(
                "service.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.service.request_timeout_ms == 0 {
            return Err(Error::Config(
                "service.request_timeout_ms must be at least 1".to_string(),
            ));
        }

        match self.service.backend {
            Backend::Http => require_scheme("service.api_base_url", &self.service.api_base_url, &["http://", "https://"]),
            Backend::Websocket => {
                require_scheme("service.api_base_url", &self.service.api_base_url, &["http://", "https://"])?;
                require_scheme("service.ws_url", &self.service.ws_url, &["ws://", "wss://"])
            }
            Backend::Simulated => Ok(()),
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            recording_secs: self.calibration.recording_secs,
            discard_out_of_order: self.inference.discard_out_of_order,
        }
    }
}

fn require_scheme(key: &str, url: &str, schemes: &[&str]) -> Result<()> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must start with one of {:?}, got '{}'",
            key, schemes, url
        )))
    }
}
