//! HTTP and WebSocket surface of the mock Model Service

pub mod handlers;
pub mod ws;

use crate::config::MockConfig;
use crate::store::MockStore;
use axum::{
    routing::{get, post},
    Router,
};
use nfc_common::api::routes;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<MockStore>>,
    pub config: Arc<MockConfig>,
}

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(MockStore::new())),
            config: Arc::new(config),
        }
    }
}

/// Build the router: `/health`, `/api/*` and `/ws`
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(routes::RECORD_START, post(handlers::start_recording))
        .route(routes::RECORD_STOP, post(handlers::stop_recording))
        .route(routes::TRAIN, post(handlers::train))
        .route(routes::INFERENCE_START, post(handlers::start_inference))
        .route(routes::INFERENCE_STOP, post(handlers::stop_inference))
        .route(routes::STATUS, get(handlers::status))
        .route(routes::FEATURES, get(handlers::features));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .route("/ws", get(ws::ws_handler))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
