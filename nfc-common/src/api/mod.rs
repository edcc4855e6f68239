//! Model Service API definitions
//!
//! Route paths and JSON bodies shared by the HTTP client binding and the
//! mock server, so both sides agree on the wire format by construction.

pub mod types;

pub use types::{
    Ack, FeaturesReply, HealthReply, Prediction, PredictionField, PushMessage, ReplyStatus,
    StartRecordingRequest, StatusReply, TrainReply,
};

/// Default base URL of the HTTP Model Service API
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api";

/// Default WebSocket push endpoint
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:5000/ws";

/// Route paths relative to the API base URL
pub mod routes {
    pub const RECORD_START: &str = "/record/start";
    pub const RECORD_STOP: &str = "/record/stop";
    pub const TRAIN: &str = "/train";
    pub const INFERENCE_START: &str = "/inference/start";
    pub const INFERENCE_STOP: &str = "/inference/stop";
    pub const STATUS: &str = "/status";
    pub const FEATURES: &str = "/features";
}
