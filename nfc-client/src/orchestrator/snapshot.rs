//! Serialisable view of the whole session, for renderers

use super::Orchestrator;
use crate::calibration::{Feature, RecordingSession};
use crate::service::{ServiceStatus, TrainingReport};
use nfc_common::events::{InferencePhase, TrainingState};
use nfc_common::Prediction;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub features: Vec<Feature>,
    pub fully_calibrated: bool,
    pub recording: Option<RecordingSession>,
    /// Feature whose recording start is awaiting the Model Service
    pub recording_requested: Option<String>,
    pub training: TrainingState,
    pub model_trained: bool,
    pub training_report: Option<TrainingReport>,
    pub inference: InferencePhase,
    pub last_prediction: Option<Prediction>,
    pub error: Option<String>,
    pub service_status: Option<ServiceStatus>,
    /// Whether a train control should be offered
    pub can_train: bool,
    /// Whether an inference toggle should be offered
    pub can_toggle_inference: bool,
}

impl Orchestrator {
    pub fn snapshot(&self) -> SessionSnapshot {
        let fully_calibrated = self.registry.is_fully_calibrated();
        let recording_busy = self.calibration.is_busy();
        let inference = self.inference.phase();
        let training_in_flight = self.training.is_in_flight();

        let can_train = fully_calibrated
            && !training_in_flight
            && !recording_busy
            && inference == InferencePhase::Stopped;
        let can_toggle_inference = match inference {
            InferencePhase::Active => true,
            InferencePhase::Stopped => {
                self.training.model_trained() && fully_calibrated && !training_in_flight && !recording_busy
            }
            InferencePhase::Starting | InferencePhase::Stopping => false,
        };

        let recording_requested = if self.calibration.is_starting() {
            self.calibration.target().map(str::to_string)
        } else {
            None
        };

        SessionSnapshot {
            features: self.registry.features().to_vec(),
            fully_calibrated,
            recording: self.calibration.session().cloned(),
            recording_requested,
            training: self.training.state(),
            model_trained: self.training.model_trained(),
            training_report: self.training.last_report().cloned(),
            inference,
            last_prediction: self.inference.last_prediction().cloned(),
            error: self.error.as_ref().map(|e| e.to_string()),
            service_status: self.service_status.clone(),
            can_train,
            can_toggle_inference,
        }
    }
}
