//! Request handlers
//!
//! Each operation sleeps its configured latency, then applies any injected
//! failure before touching the store.

use super::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{body::Bytes, extract::State, Json};
use nfc_common::api::{
    Ack, FeaturesReply, HealthReply, ReplyStatus, StartRecordingRequest, StatusReply, TrainReply,
};
use tracing::{debug, info};

/// Sleep the operation's latency and fail it if configured to
async fn enter(state: &AppState, operation: &str) -> ApiResult<()> {
    let latency = state.config.latency(operation);
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    match state.config.failure(operation) {
        Some(message) => {
            info!(operation, message, "Injected failure");
            Err(ApiError::Rejected(message.to_string()))
        }
        None => Ok(()),
    }
}

pub async fn health() -> Json<HealthReply> {
    Json(HealthReply {
        status: "ok".to_string(),
        module: "nfc-mock".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/record/start
///
/// A missing or malformed body is treated as a missing feature name.
pub async fn start_recording(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Ack>> {
    enter(&state, "start_recording").await?;

    let feature = serde_json::from_slice::<StartRecordingRequest>(&body)
        .map(|request| request.feature)
        .unwrap_or_default();
    let feature = feature.trim().to_string();

    state.store.write().await.start_recording(&feature)?;
    info!(feature = %feature, "Recording started");
    Ok(Json(Ack::success_with(format!("Recording started for {}", feature))))
}

/// POST /api/record/stop
pub async fn stop_recording(State(state): State<AppState>) -> ApiResult<Json<Ack>> {
    enter(&state, "stop_recording").await?;

    match state.store.write().await.stop_recording() {
        Some(feature) => {
            info!(feature = %feature, "Recording stopped");
            Ok(Json(Ack::success_with(format!("Recording stopped for {}", feature))))
        }
        None => Ok(Json(Ack::success_with("No recording in progress"))),
    }
}

/// POST /api/train
pub async fn train(State(state): State<AppState>) -> ApiResult<Json<TrainReply>> {
    enter(&state, "train").await?;

    let features = state.store.write().await.train()?;
    info!(features = ?features, "Model trained");
    Ok(Json(TrainReply {
        status: ReplyStatus::Success,
        message: Some("Model trained successfully".to_string()),
        accuracy: Some(state.config.accuracy),
        features,
    }))
}

/// POST /api/inference/start
pub async fn start_inference(State(state): State<AppState>) -> ApiResult<Json<Ack>> {
    enter(&state, "start_inference").await?;

    state.store.write().await.start_inference()?;
    info!("Inference started");
    Ok(Json(Ack::success_with("Inference started")))
}

/// POST /api/inference/stop
pub async fn stop_inference(State(state): State<AppState>) -> ApiResult<Json<Ack>> {
    enter(&state, "stop_inference").await?;

    state.store.write().await.stop_inference();
    info!("Inference stopped");
    Ok(Json(Ack::success_with("Inference stopped")))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusReply>> {
    enter(&state, "status").await?;

    let store = state.store.read().await;
    let reply = store.status(&mut rand::thread_rng(), nfc_common::time::now());
    debug!(inference = reply.inference, "Status served");
    Ok(Json(reply))
}

/// GET /api/features
pub async fn features(State(state): State<AppState>) -> Json<FeaturesReply> {
    Json(FeaturesReply {
        status: ReplyStatus::Success,
        message: None,
        features: state.store.read().await.recorded().to_vec(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
