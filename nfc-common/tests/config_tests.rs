//! Tests for config file resolution and graceful degradation
//!
//! Tests that manipulate environment variables are marked #[serial] so they
//! never race with each other.

use nfc_common::config::{load_toml, locate_config, ConfigLocation, LoggingConfig};
use nfc_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    port: u16,
    #[serde(default)]
    logging: LoggingConfig,
}

const ENV_VAR: &str = "NFC_COMMON_TEST_CONFIG";

#[test]
#[serial]
fn test_env_var_overrides_default_location() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let location = locate_config(None, ENV_VAR, "client.toml").unwrap();
    assert!(location.explicit);
    assert_eq!(location.path, PathBuf::from("/tmp/from-env.toml"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    let location = locate_config(Some(&cli), ENV_VAR, "client.toml").unwrap();
    assert_eq!(location.path, cli);

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(ENV_VAR, "");

    if let Some(location) = locate_config(None, ENV_VAR, "client.toml") {
        assert!(!location.explicit);
        assert!(location.path.ends_with("nfc/client.toml"));
    }

    env::remove_var(ENV_VAR);
}

#[test]
fn test_load_valid_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
port = 5001

[logging]
level = "debug"
"#
    )
    .unwrap();

    let location = ConfigLocation {
        path: file.path().to_path_buf(),
        explicit: true,
    };
    let config: SampleConfig = load_toml(Some(&location)).unwrap();
    assert_eq!(config.port, 5001);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.file.is_none());
}

#[test]
fn test_load_invalid_toml_reports_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let location = ConfigLocation {
        path: file.path().to_path_buf(),
        explicit: false,
    };
    let result: Result<SampleConfig, Error> = load_toml(Some(&location));
    match result {
        Err(Error::Config(message)) => assert!(message.contains("Failed to parse")),
        other => panic!("expected config error, got {:?}", other),
    }
}
