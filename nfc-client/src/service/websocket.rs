//! WebSocket push Model Service binding
//!
//! Recording, training and inference control go through the HTTP API; the
//! prediction subscription is a WebSocket on which the service pushes
//! JSON messages tagged by `type`.

use super::{FeedItem, HttpModelService, ModelService, PredictionFeed, ServiceError, ServiceStatus, TrainingReport};
use async_trait::async_trait;
use futures::StreamExt;
use nfc_common::api::PushMessage;
use nfc_common::Prediction;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Model Service with pushed predictions
#[derive(Debug, Clone)]
pub struct WebSocketModelService {
    control: HttpModelService,
    ws_url: String,
}

impl WebSocketModelService {
    pub fn new(control: HttpModelService, ws_url: impl Into<String>) -> Self {
        Self {
            control,
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl ModelService for WebSocketModelService {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn start_recording(&self, feature: &str) -> Result<(), ServiceError> {
        self.control.start_recording(feature).await
    }

    async fn stop_recording(&self) -> Result<(), ServiceError> {
        self.control.stop_recording().await
    }

    async fn train(&self) -> Result<TrainingReport, ServiceError> {
        self.control.train().await
    }

    async fn start_inference(&self) -> Result<(), ServiceError> {
        self.control.start_inference().await
    }

    async fn stop_inference(&self) -> Result<(), ServiceError> {
        self.control.stop_inference().await
    }

    async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        self.control.status().await
    }

    async fn subscribe(&self) -> Result<PredictionFeed, ServiceError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ServiceError::Transport(format!("WebSocket connect failed: {}", e)))?;
        info!(url = %self.ws_url, "Prediction WebSocket connected");

        let (tx, rx) = PredictionFeed::channel();
        let producer = tokio::spawn(async move {
            let (_sink, mut stream) = socket.split();
            let mut decoder = PushDecoder::default();

            loop {
                let item = match stream.next().await {
                    Some(Ok(Message::Text(text))) => match decoder.decode(&text) {
                        Some(item) => item,
                        None => continue,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = tx.send(Err(ServiceError::Transport(format!("WebSocket {}", reason)))).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(ServiceError::Transport(e.to_string()))).await;
                        return;
                    }
                    None => {
                        let _ = tx
                            .send(Err(ServiceError::Transport("WebSocket stream ended".to_string())))
                            .await;
                        return;
                    }
                };

                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Ok(PredictionFeed::with_producer(rx, producer))
    }
}

/// Turns pushed text frames into feed items
#[derive(Debug, Default)]
struct PushDecoder {
    /// Binary index to feature name, from the latest `features` message
    labels: BTreeMap<u32, String>,
}

impl PushDecoder {
    fn decode(&mut self, text: &str) -> Option<FeedItem> {
        let trimmed = text.trim();

        if let Ok(index) = trimmed.parse::<u32>() {
            return match self.labels.get(&index) {
                Some(feature) => Some(Ok(Prediction::new(feature.clone(), 1.0))),
                None => {
                    warn!(index, "Binary prediction without a feature map, dropped");
                    None
                }
            };
        }

        match serde_json::from_str::<PushMessage>(trimmed) {
            Ok(PushMessage::Prediction { data }) => Some(data.validate().map_err(ServiceError::Protocol)),
            Ok(PushMessage::Features { features }) => {
                debug!(count = features.len(), "Feature map received");
                self.labels = features.into_iter().map(|(name, index)| (index, name)).collect();
                None
            }
            Ok(PushMessage::Error { message }) => Some(Err(ServiceError::Rejected(message))),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognised push message");
                None
            }
        }
    }
}
