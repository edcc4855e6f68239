//! Configuration file resolution and logging setup
//!
//! Both binaries follow the same bootstrap order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing default config file is not an error: the binary logs a warning
//! and starts with compiled defaults. A config file named explicitly on the
//! command line or in the environment must exist.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "nfc";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `debug`, `nfc_client=trace,reqwest=warn`, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a config file was found and how it was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Named on the command line or in the environment
    pub explicit: bool,
}

/// Default config file path for the platform, e.g. `~/.config/nfc/client.toml`
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(file_name))
}

/// Resolve which config file to read
///
/// Returns `None` only when no explicit path was given and the platform has
/// no config directory.
pub fn locate_config(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<ConfigLocation> {
    if let Some(path) = cli_arg {
        return Some(ConfigLocation {
            path: path.to_path_buf(),
            explicit: true,
        });
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(ConfigLocation {
                path: PathBuf::from(path),
                explicit: true,
            });
        }
    }

    default_config_path(file_name).map(|path| ConfigLocation {
        path,
        explicit: false,
    })
}

/// Load a TOML config file, degrading to defaults when the default file is absent
pub fn load_toml<T>(location: Option<&ConfigLocation>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(location) = location else {
        warn!("No config directory available, using compiled defaults");
        return Ok(T::default());
    };

    if !location.path.exists() {
        if location.explicit {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                location.path.display()
            )));
        }
        warn!(
            "Config file {} not found, using compiled defaults",
            location.path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(&location.path)?;
    let parsed = toml::from_str::<T>(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse {}: {}",
            location.path.display(),
            e
        ))
    })?;

    info!("Loaded configuration from {}", location.path.display());
    Ok(parsed)
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| {
            Error::Config(format!("Invalid log level '{}': {}", logging.level, e))
        })?,
    };

    let result = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Failed to initialize tracing: {}", e)))
}
