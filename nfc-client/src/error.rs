//! Error types for nfc-client
//!
//! `CalibrationError` is what a user action (or an asynchronous completion)
//! fails with. Its `Display` text is exactly what lands in the error banner.

use thiserror::Error;

/// Calibration session error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Feature name empty or already registered
    #[error("Feature name is empty or already registered: '{0}'")]
    DuplicateFeature(String),

    /// Feature is not in the registry
    #[error("Unknown feature: '{0}'")]
    UnknownFeature(String),

    /// A recording session (or its start call) is already pending
    #[error("Recording already in progress for '{0}'")]
    AlreadyRecording(String),

    /// Feature is the target of the active recording session
    #[error("Cannot remove '{0}' while it is being recorded")]
    FeatureRecording(String),

    /// Not every registered feature is calibrated (or none is registered)
    #[error("All features must be calibrated before training")]
    NotCalibrated,

    /// A training call is already in flight
    #[error("Training already in progress")]
    AlreadyTraining,

    /// Inference requires a trained model
    #[error("Model must be trained before starting inference")]
    NotTrained,

    /// Inference must be stopped first
    #[error("Stop inference before recording or training")]
    InferenceRunning,

    /// Re-entrant toggle while a start/stop call is outstanding
    #[error("Another transition is already in progress")]
    TransitionInProgress,

    /// Model Service failure, message surfaced verbatim
    #[error("{0}")]
    Service(String),

    /// Prediction channel lost
    #[error("Connection to model service lost: {0}")]
    Connectivity(String),
}

/// Convenience Result type using CalibrationError
pub type Result<T> = std::result::Result<T, CalibrationError>;
