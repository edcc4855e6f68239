//! Model Service request/response types
//!
//! Every reply carries a `status` discriminator (`success`, `error`,
//! `waiting`, `prediction`) and an optional human-readable `message`.
//! Error replies are delivered with HTTP 200 as well, so callers inspect
//! the envelope rather than the status code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reply status discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
    Waiting,
    /// Status reply carrying a label-only prediction
    Prediction,
    /// Any discriminator this build does not know about
    #[serde(other)]
    Unknown,
}

/// A single predicted feature with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted feature name
    pub feature: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// When the Model Service produced the prediction
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
}

impl Prediction {
    /// Create a prediction observed now, clamping confidence into [0, 1]
    pub fn new(feature: impl Into<String>, confidence: f64) -> Self {
        Self::observed(feature, confidence, Utc::now())
    }

    /// Create a prediction with an explicit observation time
    pub fn observed(feature: impl Into<String>, confidence: f64, observed_at: DateTime<Utc>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            feature: feature.into(),
            confidence,
            observed_at,
        }
    }

    /// Reject payloads that cannot be displayed meaningfully
    pub fn validate(self) -> Result<Self, String> {
        if self.feature.is_empty() {
            return Err("prediction has an empty feature name".to_string());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "prediction confidence {} outside [0, 1]",
                self.confidence
            ));
        }
        Ok(self)
    }
}

/// Generic acknowledgement reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            status: ReplyStatus::Success,
            message: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
        }
    }

    /// Collapse the envelope into a Result carrying the error message
    pub fn into_result(self) -> Result<(), String> {
        match self.status {
            ReplyStatus::Error => Err(error_message(self.message)),
            _ => Ok(()),
        }
    }
}

/// Body of `POST /record/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRecordingRequest {
    #[serde(default)]
    pub feature: String,
}

/// Reply of `POST /train`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl TrainReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
            accuracy: None,
            features: Vec::new(),
        }
    }
}

/// Reply of `GET /features`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Prediction field of a status reply
///
/// The mock backend reports a full prediction object; the signal acquisition
/// backend reports only the majority label plus vote counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionField {
    Full(Prediction),
    Label(String),
}

/// Reply of `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub inference: bool,
    #[serde(default)]
    pub model_trained: bool,
    #[serde(default)]
    pub features_recorded: Vec<String>,
    #[serde(default)]
    pub total_features: usize,
    #[serde(default)]
    pub prediction: Option<PredictionField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_prediction: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
}

impl StatusReply {
    /// Empty "nothing new" reply
    pub fn waiting() -> Self {
        Self {
            status: ReplyStatus::Waiting,
            message: None,
            recording: false,
            inference: false,
            model_trained: false,
            features_recorded: Vec::new(),
            total_features: 0,
            prediction: None,
            binary_prediction: None,
            counts: BTreeMap::new(),
            samples: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
            ..Self::waiting()
        }
    }

    /// Error message when the reply is an error envelope
    pub fn error_message(&self) -> Option<String> {
        match self.status {
            ReplyStatus::Error => Some(error_message(self.message.clone())),
            _ => None,
        }
    }

    /// Normalise whatever prediction the reply carries
    ///
    /// Label-only predictions take their confidence from the label's share
    /// of the vote `counts` (1.0 when no counts were sent) and are stamped
    /// with `received_at`.
    pub fn latest_prediction(&self, received_at: DateTime<Utc>) -> Option<Prediction> {
        match self.prediction.as_ref()? {
            PredictionField::Full(prediction) => Some(prediction.clone()),
            PredictionField::Label(label) => {
                let total: u64 = self.counts.values().sum();
                let confidence = match (self.counts.get(label), total) {
                    (Some(votes), total) if total > 0 => *votes as f64 / total as f64,
                    _ => 1.0,
                };
                Some(Prediction::observed(label.clone(), confidence, received_at))
            }
        }
    }
}

/// Reply of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// Unsolicited message pushed over the WebSocket channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// A live prediction
    Prediction { data: Prediction },
    /// Feature name to binary index map, sent on connect
    Features { features: BTreeMap<String, u32> },
    /// Service-side failure notice
    Error { message: String },
}

fn error_message(message: Option<String>) -> String {
    message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ack_error_into_result() {
        let ack: Ack = serde_json::from_value(json!({
            "status": "error",
            "message": "Recording already in progress"
        }))
        .unwrap();
        assert_eq!(
            ack.into_result(),
            Err("Recording already in progress".to_string())
        );
    }

    #[test]
    fn test_ack_error_without_message() {
        let ack: Ack = serde_json::from_value(json!({ "status": "error" })).unwrap();
        assert_eq!(ack.into_result(), Err("Unknown error".to_string()));
    }

    #[test]
    fn test_ack_success_ignores_extra_fields() {
        let ack: Ack = serde_json::from_value(json!({
            "status": "success",
            "message": "Recording started for grip",
            "feature": "grip"
        }))
        .unwrap();
        assert!(ack.into_result().is_ok());
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let ack: Ack = serde_json::from_value(json!({ "status": "busy" })).unwrap();
        assert_eq!(ack.status, ReplyStatus::Unknown);
    }

    #[test]
    fn test_prediction_clamps_confidence() {
        assert_eq!(Prediction::new("grip", 1.7).confidence, 1.0);
        assert_eq!(Prediction::new("grip", -0.2).confidence, 0.0);
        assert_eq!(Prediction::new("grip", f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_prediction_validate_rejects_out_of_range() {
        let raw: Prediction = serde_json::from_value(json!({
            "feature": "grip",
            "confidence": 1.5,
            "timestamp": "2024-05-01T12:00:00.000Z"
        }))
        .unwrap();
        assert!(raw.validate().is_err());
    }

    #[test]
    fn test_status_with_full_prediction() {
        let reply: StatusReply = serde_json::from_value(json!({
            "status": "success",
            "recording": false,
            "inference": true,
            "model_trained": true,
            "features_recorded": ["grip", "fist"],
            "total_features": 2,
            "prediction": {
                "feature": "grip",
                "confidence": 0.82,
                "timestamp": "2024-05-01T12:00:00.000Z"
            }
        }))
        .unwrap();

        let prediction = reply.latest_prediction(Utc::now()).unwrap();
        assert_eq!(prediction.feature, "grip");
        assert_eq!(prediction.confidence, 0.82);
        assert_eq!(reply.features_recorded.len(), 2);
    }

    #[test]
    fn test_status_with_label_prediction_uses_vote_share() {
        let reply: StatusReply = serde_json::from_value(json!({
            "status": "prediction",
            "prediction": "fist",
            "binary_prediction": 1,
            "counts": { "fist": 30, "grip": 10 },
            "samples": 40
        }))
        .unwrap();

        let prediction = reply.latest_prediction(Utc::now()).unwrap();
        assert_eq!(prediction.feature, "fist");
        assert!((prediction.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_waiting_status_has_no_prediction() {
        let reply: StatusReply = serde_json::from_value(json!({ "status": "waiting" })).unwrap();
        assert!(reply.latest_prediction(Utc::now()).is_none());
        assert!(reply.error_message().is_none());
    }

    #[test]
    fn test_push_message_tagging() {
        let message: PushMessage = serde_json::from_value(json!({
            "type": "features",
            "features": { "grip": 0, "fist": 1 }
        }))
        .unwrap();
        match message {
            PushMessage::Features { features } => assert_eq!(features.get("fist"), Some(&1)),
            other => panic!("unexpected message: {:?}", other),
        }

        let text = serde_json::to_string(&PushMessage::Error {
            message: "No data received".to_string(),
        })
        .unwrap();
        assert!(text.contains("\"type\":\"error\""));
    }
}
