//! Mock Model Service (nfc-mock) - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nfc_common::config::{init_tracing, load_toml, locate_config};
use nfc_mock::config::{CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use nfc_mock::{build_router, AppState, MockConfig};
use tokio::signal;
use tracing::{info, warn};

/// Command-line arguments for nfc-mock
#[derive(Parser, Debug)]
#[command(name = "nfc-mock")]
#[command(about = "Mock Model Service for the calibration client")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/nfc/mock.toml)
    #[arg(short, long, env = "NFC_MOCK_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port to listen on
    #[arg(short, long, env = "NFC_MOCK_PORT")]
    port: Option<u16>,

    /// Multiplier for simulated latencies (0 disables them)
    #[arg(long)]
    latency_scale: Option<f64>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let location = locate_config(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let mut config = load_toml::<MockConfig>(location.as_ref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(scale) = args.latency_scale {
        config.latency_scale = scale;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Starting nfc-mock v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    config.validate().context("Invalid configuration")?;
    for (operation, message) in &config.failures {
        warn!(operation = %operation, message = %message, "Failure injection active");
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let app = build_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("nfc-mock stopped");
    Ok(())
}

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
