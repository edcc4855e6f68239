//! Event types for the NFC event system
//!
//! The orchestrator publishes a `CalibrationEvent` after every state change.
//! Renderers (the console, tests) subscribe through the `EventBus` instead
//! of polling the orchestrator.

mod session_types;

pub use session_types::{InferencePhase, RecordingPhase, TrainingState};

use crate::api::types::Prediction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Calibration session events
///
/// Serialized with an internal `type` tag so a JSON renderer can dispatch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CalibrationEvent {
    /// Feature registered
    FeatureAdded {
        feature: String,
        timestamp: DateTime<Utc>,
    },

    /// Feature and its calibration mark removed
    FeatureRemoved {
        feature: String,
        timestamp: DateTime<Utc>,
    },

    /// Model Service accepted the recording and the countdown began
    RecordingStarted {
        session_id: Uuid,
        feature: String,
        seconds_remaining: u32,
        timestamp: DateTime<Utc>,
    },

    /// One second of the countdown elapsed
    RecordingTick {
        session_id: Uuid,
        feature: String,
        seconds_remaining: u32,
        timestamp: DateTime<Utc>,
    },

    /// Countdown completed and the feature is marked calibrated
    FeatureCalibrated {
        session_id: Uuid,
        feature: String,
        timestamp: DateTime<Utc>,
    },

    /// Recording stopped before completion; no calibration mark
    RecordingCancelled {
        session_id: Uuid,
        feature: String,
        timestamp: DateTime<Utc>,
    },

    /// Training request issued
    TrainingStarted {
        features: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Training succeeded
    TrainingCompleted {
        accuracy: Option<f64>,
        features: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Training rejected by the Model Service
    TrainingFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Inference loop phase changed
    InferenceStateChanged {
        old_state: InferencePhase,
        new_state: InferencePhase,
        timestamp: DateTime<Utc>,
    },

    /// Latest prediction replaced
    PredictionUpdated {
        prediction: Prediction,
        timestamp: DateTime<Utc>,
    },

    /// Error banner set
    ErrorRaised {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Error banner cleared by a new user action
    ErrorCleared { timestamp: DateTime<Utc> },

    /// Model Service status refreshed
    ServiceStatusUpdated {
        recording: bool,
        inference: bool,
        model_trained: bool,
        features_recorded: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl CalibrationEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            CalibrationEvent::FeatureAdded { .. } => "FeatureAdded",
            CalibrationEvent::FeatureRemoved { .. } => "FeatureRemoved",
            CalibrationEvent::RecordingStarted { .. } => "RecordingStarted",
            CalibrationEvent::RecordingTick { .. } => "RecordingTick",
            CalibrationEvent::FeatureCalibrated { .. } => "FeatureCalibrated",
            CalibrationEvent::RecordingCancelled { .. } => "RecordingCancelled",
            CalibrationEvent::TrainingStarted { .. } => "TrainingStarted",
            CalibrationEvent::TrainingCompleted { .. } => "TrainingCompleted",
            CalibrationEvent::TrainingFailed { .. } => "TrainingFailed",
            CalibrationEvent::InferenceStateChanged { .. } => "InferenceStateChanged",
            CalibrationEvent::PredictionUpdated { .. } => "PredictionUpdated",
            CalibrationEvent::ErrorRaised { .. } => "ErrorRaised",
            CalibrationEvent::ErrorCleared { .. } => "ErrorCleared",
            CalibrationEvent::ServiceStatusUpdated { .. } => "ServiceStatusUpdated",
        }
    }
}

/// Broadcast channel for calibration events
///
/// Cloning an `EventBus` shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CalibrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers that fall more than `capacity` events behind skip
    /// the oldest events (tokio broadcast lag semantics).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CalibrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CalibrationEvent,
    ) -> Result<usize, broadcast::error::SendError<CalibrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CalibrationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
