//! Session state type definitions
//!
//! Phase enums shared by the orchestrator, its snapshot and the event stream.

use serde::{Deserialize, Serialize};

/// Phase of the active recording session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    /// Countdown running
    Active,
    /// Countdown reached zero, completion being applied
    Completing,
}

impl std::fmt::Display for RecordingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingPhase::Active => write!(f, "active"),
            RecordingPhase::Completing => write!(f, "completing"),
        }
    }
}

/// Training lifecycle
///
/// `Idle -> InFlight -> Done`, or back to `Idle` when the Model Service
/// rejects the request. Retraining from `Done` re-enters `InFlight`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Idle,
    InFlight,
    Done,
}

impl std::fmt::Display for TrainingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingState::Idle => write!(f, "idle"),
            TrainingState::InFlight => write!(f, "in-flight"),
            TrainingState::Done => write!(f, "done"),
        }
    }
}

/// Inference loop phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InferencePhase {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl InferencePhase {
    /// Whether a start or stop call is outstanding
    pub fn is_transitioning(&self) -> bool {
        matches!(self, InferencePhase::Starting | InferencePhase::Stopping)
    }
}

impl std::fmt::Display for InferencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferencePhase::Stopped => write!(f, "stopped"),
            InferencePhase::Starting => write!(f, "starting"),
            InferencePhase::Active => write!(f, "active"),
            InferencePhase::Stopping => write!(f, "stopping"),
        }
    }
}
