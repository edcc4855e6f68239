//! # NFC Client
//!
//! Calibration and inference orchestration for the Neural Feature
//! Calibration workflow: register features, record a timed sample of each,
//! train once everything is calibrated, then stream live predictions.
//!
//! The Model Service doing the actual work sits behind the `ModelService`
//! trait; HTTP polling, WebSocket push and an in-process simulation are
//! interchangeable bindings.

pub mod calibration;
pub mod config;
pub mod console;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod service;
pub mod training;

pub use error::{CalibrationError, Result};
pub use orchestrator::{Command, Orchestrator, OrchestratorOptions, SessionSnapshot};
pub use service::{ModelService, ServiceError};
