//! Calibration console (nfc-client) - Main entry point
//!
//! Composes the configured Model Service binding with the orchestrator,
//! reads commands from stdin and renders session events as they happen.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nfc_client::config::{Backend, ClientConfig, ConfigOverrides, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use nfc_client::console::{self, ConsoleCommand};
use nfc_client::orchestrator::{Command, Orchestrator};
use nfc_client::service;
use nfc_common::config::{init_tracing, load_toml, locate_config};
use nfc_common::events::EventBus;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

/// Command-line arguments for nfc-client
#[derive(Parser, Debug)]
#[command(name = "nfc-client")]
#[command(about = "Feature calibration and live inference console")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/nfc/client.toml)
    #[arg(short, long, env = "NFC_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Model Service binding
    #[arg(short, long, value_enum, env = "NFC_BACKEND")]
    backend: Option<Backend>,

    /// Base URL of the Model Service HTTP API
    #[arg(long, env = "NFC_API_URL")]
    api_url: Option<String>,

    /// WebSocket URL for pushed predictions
    #[arg(long, env = "NFC_WS_URL")]
    ws_url: Option<String>,

    /// Recording countdown length in seconds
    #[arg(long)]
    recording_secs: Option<u32>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            backend: self.backend,
            api_base_url: self.api_url.clone(),
            ws_url: self.ws_url.clone(),
            recording_secs: self.recording_secs,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let location = locate_config(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let config = load_toml::<ClientConfig>(location.as_ref())
        .context("Failed to load configuration")?
        .apply(args.overrides());

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Starting nfc-client v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    config.validate().context("Invalid configuration")?;
    info!(backend = %config.service.backend, "Model Service binding selected");

    let service = service::from_config(&config.service).context("Failed to create Model Service binding")?;
    let events = EventBus::default();
    let renderer = tokio::spawn(render_events(events.subscribe()));

    let mut orchestrator = Orchestrator::new(service, config.orchestrator_options(), events);
    let (commands, command_rx) = mpsc::channel(32);
    let engine = tokio::spawn(async move { orchestrator.run(command_rx).await });

    println!("{}", console::HELP);

    tokio::select! {
        result = read_commands(&commands) => result?,
        _ = shutdown_signal() => {}
    }

    let _ = commands.send(Command::Shutdown).await;
    engine.await.context("Orchestrator task failed")?;
    renderer.abort();

    info!("nfc-client stopped");
    Ok(())
}

/// Forward stdin lines to the orchestrator until `quit` or end of input
async fn read_commands(commands: &mpsc::Sender<Command>) -> Result<()> {
    let mut lines = stdin_lines();

    while let Some(line) = lines.recv().await {
        let parsed = match console::parse_line(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match parsed {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Status => {
                let (reply, snapshot) = oneshot::channel();
                if commands.send(Command::Snapshot(reply)).await.is_err() {
                    break;
                }
                if let Ok(snapshot) = snapshot.await {
                    println!("{}", console::render_snapshot(&snapshot));
                }
            }
            other => {
                if let Some(command) = other.into_command() {
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Stdin lines read on a dedicated thread
///
/// A detached thread does not hold up process exit while blocked on input.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn render_events(mut events: broadcast::Receiver<nfc_common::events::CalibrationEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = console::render_event(&event) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Console fell behind the event stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
