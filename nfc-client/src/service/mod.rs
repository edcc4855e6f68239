//! Model Service abstraction
//!
//! The orchestration core talks to recording, training and inference through
//! the `ModelService` trait only. Bindings are chosen at composition time:
//! - `HttpModelService`: request/response calls, predictions by status polling
//! - `WebSocketModelService`: same calls, predictions pushed over a WebSocket
//! - `SimulatedModelService`: in-process double for tests and offline demos
//!
//! The core assumes nothing beyond "calls return success or error" and
//! "predictions arrive asynchronously, zero or more times, in any order".

pub mod feed;
pub mod http;
pub mod simulated;
pub mod websocket;

pub use feed::{FeedItem, PredictionFeed};
pub use http::HttpModelService;
pub use simulated::{SimulatedConfig, SimulatedModelService};
pub use websocket::WebSocketModelService;

use crate::config::{Backend, ServiceConfig};
use async_trait::async_trait;
use nfc_common::Prediction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Model Service failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The service answered with an error envelope
    #[error("{0}")]
    Rejected(String),

    /// Network or channel failure
    #[error("{0}")]
    Transport(String),

    /// Reply could not be understood
    #[error("Malformed reply: {0}")]
    Protocol(String),
}

/// Model Service operations, used for logging and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    StartRecording,
    StopRecording,
    Train,
    StartInference,
    StopInference,
    Status,
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::StartRecording => "start_recording",
            Operation::StopRecording => "stop_recording",
            Operation::Train => "train",
            Operation::StartInference => "start_inference",
            Operation::StopInference => "stop_inference",
            Operation::Status => "status",
            Operation::Subscribe => "subscribe",
        };
        f.write_str(name)
    }
}

/// Result of a successful training call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Accuracy reported by the service, when it reports one
    pub accuracy: Option<f64>,
    /// Features the model was trained on
    pub features: Vec<String>,
}

/// Model Service view of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub recording: bool,
    pub inference: bool,
    pub model_trained: bool,
    pub features: Vec<String>,
    pub latest_prediction: Option<Prediction>,
}

/// External system performing recording, training and inference
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Short binding name for logs
    fn name(&self) -> &'static str;

    async fn start_recording(&self, feature: &str) -> Result<(), ServiceError>;

    async fn stop_recording(&self) -> Result<(), ServiceError>;

    async fn train(&self) -> Result<TrainingReport, ServiceError>;

    async fn start_inference(&self) -> Result<(), ServiceError>;

    async fn stop_inference(&self) -> Result<(), ServiceError>;

    async fn status(&self) -> Result<ServiceStatus, ServiceError>;

    /// Open the prediction subscription
    ///
    /// Dropping the returned feed releases the subscription.
    async fn subscribe(&self) -> Result<PredictionFeed, ServiceError>;
}

/// Compose the binding selected in the configuration
pub fn from_config(config: &ServiceConfig) -> Result<Arc<dyn ModelService>, ServiceError> {
    let service: Arc<dyn ModelService> = match config.backend {
        Backend::Http => Arc::new(HttpModelService::new(
            config.api_base_url.clone(),
            config.request_timeout(),
            config.poll_interval(),
        )?),
        Backend::Websocket => {
            let control = HttpModelService::new(
                config.api_base_url.clone(),
                config.request_timeout(),
                config.poll_interval(),
            )?;
            Arc::new(WebSocketModelService::new(control, config.ws_url.clone()))
        }
        Backend::Simulated => Arc::new(SimulatedModelService::new(SimulatedConfig::demo())),
    };
    Ok(service)
}
