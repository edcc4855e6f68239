//! Client configuration loading: file, environment and overrides

use nfc_client::config::{Backend, ClientConfig, ConfigOverrides, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use nfc_client::service::{self, ModelService};
use nfc_common::config::{load_toml, locate_config};
use serial_test::serial;
use std::env;
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_config_file_from_env_var() {
    let file = write_config(
        r#"
        [service]
        backend = "simulated"

        [calibration]
        recording_secs = 4

        [inference]
        discard_out_of_order = true
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let location = locate_config(None, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let config: ClientConfig = load_toml(location.as_ref()).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.service.backend, Backend::Simulated);
    assert_eq!(config.calibration.recording_secs, 4);
    assert!(config.orchestrator_options().discard_out_of_order);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_command_line_beats_file() {
    let file = write_config(
        r#"
        [service]
        backend = "websocket"
        api_base_url = "http://10.0.0.5:5000/api"
        "#,
    );

    let location = locate_config(Some(file.path()), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let config = load_toml::<ClientConfig>(location.as_ref())
        .unwrap()
        .apply(ConfigOverrides {
            backend: Some(Backend::Http),
            ..Default::default()
        });

    assert_eq!(config.service.backend, Backend::Http);
    assert_eq!(config.service.api_base_url, "http://10.0.0.5:5000/api");
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    let file = write_config("[service]\nbackend = 42\n");
    let location = locate_config(Some(file.path()), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    assert!(load_toml::<ClientConfig>(location.as_ref()).is_err());
}

#[tokio::test]
async fn test_every_backend_composes() {
    for backend in [Backend::Http, Backend::Websocket, Backend::Simulated] {
        let mut config = ClientConfig::default();
        config.service.backend = backend;
        let service = service::from_config(&config.service).unwrap();
        assert_eq!(service.name(), backend.to_string());
    }
}
