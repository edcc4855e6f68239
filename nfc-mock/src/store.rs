//! Mock Model Service session state
//!
//! One `MockStore` per server instance, owned by `AppState`. The rules
//! mirror what a real acquisition backend enforces; messages are the ones
//! clients display verbatim.

use chrono::{DateTime, Utc};
use nfc_common::api::{PredictionField, ReplyStatus, StatusReply};
use nfc_common::Prediction;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

pub const MSG_FEATURE_REQUIRED: &str = "Feature name is required";
pub const MSG_ALREADY_RECORDING: &str = "Recording already in progress";
pub const MSG_NO_TRAINING_DATA: &str = "No training data files found!";
pub const MSG_NOT_TRAINED: &str = "Model has not been trained";
pub const MSG_INFERENCE_RUNNING: &str = "Inference already running";

/// Confidence range of generated predictions
const CONFIDENCE_RANGE: std::ops::Range<f64> = 0.6..1.0;

#[derive(Debug, Clone, Default)]
pub struct MockStore {
    recorded: Vec<String>,
    recording: Option<String>,
    model_trained: bool,
    inference_active: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_recording(&mut self, feature: &str) -> Result<(), &'static str> {
        let feature = feature.trim();
        if feature.is_empty() {
            return Err(MSG_FEATURE_REQUIRED);
        }
        if self.recording.is_some() {
            return Err(MSG_ALREADY_RECORDING);
        }

        self.recording = Some(feature.to_string());
        if !self.recorded.iter().any(|f| f == feature) {
            self.recorded.push(feature.to_string());
        }
        Ok(())
    }

    /// Stop whatever is recording; returns the feature that was recording
    pub fn stop_recording(&mut self) -> Option<String> {
        self.recording.take()
    }

    /// Train on everything recorded so far
    pub fn train(&mut self) -> Result<Vec<String>, &'static str> {
        if self.recorded.is_empty() {
            return Err(MSG_NO_TRAINING_DATA);
        }
        self.model_trained = true;
        Ok(self.recorded.clone())
    }

    pub fn start_inference(&mut self) -> Result<(), &'static str> {
        if !self.model_trained {
            return Err(MSG_NOT_TRAINED);
        }
        if self.inference_active {
            return Err(MSG_INFERENCE_RUNNING);
        }
        self.inference_active = true;
        Ok(())
    }

    pub fn stop_inference(&mut self) {
        self.inference_active = false;
    }

    pub fn recorded(&self) -> &[String] {
        &self.recorded
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn model_trained(&self) -> bool {
        self.model_trained
    }

    pub fn inference_active(&self) -> bool {
        self.inference_active
    }

    /// Feature name to binary index, in recording order
    pub fn feature_map(&self) -> BTreeMap<String, u32> {
        self.recorded
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index as u32))
            .collect()
    }

    /// A random prediction over the recorded features, while inference runs
    pub fn random_prediction<R: Rng>(&self, rng: &mut R, at: DateTime<Utc>) -> Option<Prediction> {
        if !self.inference_active {
            return None;
        }
        let feature = self
            .recorded
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| "none".to_string());
        Some(Prediction::observed(feature, rng.gen_range(CONFIDENCE_RANGE), at))
    }

    pub fn status<R: Rng>(&self, rng: &mut R, at: DateTime<Utc>) -> StatusReply {
        StatusReply {
            status: ReplyStatus::Success,
            recording: self.is_recording(),
            inference: self.inference_active,
            model_trained: self.model_trained,
            features_recorded: self.recorded.clone(),
            total_features: self.recorded.len(),
            prediction: self.random_prediction(rng, at).map(PredictionField::Full),
            ..StatusReply::waiting()
        }
    }
}
