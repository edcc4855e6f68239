//! HTTP + JSON Model Service binding
//!
//! Request/response operations map onto the `/api` routes. Predictions are
//! obtained by polling `GET /status` from a background task owned by the
//! returned `PredictionFeed`.

use super::{FeedItem, ModelService, PredictionFeed, ServiceError, ServiceStatus, TrainingReport};
use async_trait::async_trait;
use nfc_common::api::{routes, Ack, PredictionField, ReplyStatus, StartRecordingRequest, StatusReply, TrainReply};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("nfc-client/", env!("CARGO_PKG_VERSION"));

/// Model Service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpModelService {
    http_client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpModelService {
    /// Create a binding for the API rooted at `base_url` (e.g. `http://host:5000/api`)
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    async fn read_reply<T: DeserializeOwned>(
        &self,
        route: &str,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        match serde_json::from_str::<T>(&body) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(ServiceError::Rejected(format!(
                "{} returned HTTP {}",
                route,
                status.as_u16()
            ))),
            Err(e) => Err(ServiceError::Protocol(format!("{}: {}", route, e))),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        route: &str,
        body: Option<&StartRecordingRequest>,
    ) -> Result<T, ServiceError> {
        let mut request = self.http_client.post(self.url(route));
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(route, "POST");
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        self.read_reply(route, response).await
    }

    async fn post_ack(&self, route: &str, body: Option<&StartRecordingRequest>) -> Result<(), ServiceError> {
        let ack: Ack = self.post(route, body).await?;
        ack.into_result().map_err(ServiceError::Rejected)
    }

    /// Raw `GET /status` reply
    pub async fn fetch_status(&self) -> Result<StatusReply, ServiceError> {
        let response = self
            .http_client
            .get(self.url(routes::STATUS))
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        self.read_reply(routes::STATUS, response).await
    }
}

#[async_trait]
impl ModelService for HttpModelService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn start_recording(&self, feature: &str) -> Result<(), ServiceError> {
        let body = StartRecordingRequest {
            feature: feature.to_string(),
        };
        self.post_ack(routes::RECORD_START, Some(&body)).await
    }

    async fn stop_recording(&self) -> Result<(), ServiceError> {
        self.post_ack(routes::RECORD_STOP, None).await
    }

    async fn train(&self) -> Result<TrainingReport, ServiceError> {
        let reply: TrainReply = self.post(routes::TRAIN, None).await?;
        match reply.status {
            ReplyStatus::Success => Ok(TrainingReport {
                accuracy: reply.accuracy,
                features: reply.features,
            }),
            _ => Err(ServiceError::Rejected(
                reply
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Training failed".to_string()),
            )),
        }
    }

    async fn start_inference(&self) -> Result<(), ServiceError> {
        self.post_ack(routes::INFERENCE_START, None).await
    }

    async fn stop_inference(&self) -> Result<(), ServiceError> {
        self.post_ack(routes::INFERENCE_STOP, None).await
    }

    async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let reply = self.fetch_status().await?;
        if let Some(message) = reply.error_message() {
            return Err(ServiceError::Rejected(message));
        }
        Ok(ServiceStatus {
            recording: reply.recording,
            inference: reply.inference,
            model_trained: reply.model_trained,
            latest_prediction: reply.latest_prediction(nfc_common::time::now()),
            features: reply.features_recorded,
        })
    }

    async fn subscribe(&self) -> Result<PredictionFeed, ServiceError> {
        let (tx, rx) = PredictionFeed::channel();
        let producer = tokio::spawn(poll_status(self.clone(), tx));
        Ok(PredictionFeed::with_producer(rx, producer))
    }
}

/// Identity of a reported prediction, for suppressing repeated polls
type PredictionKey = (Option<PredictionField>, BTreeMap<String, u64>);

async fn poll_status(service: HttpModelService, tx: mpsc::Sender<FeedItem>) {
    let mut ticker = tokio::time::interval(service.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_key: Option<PredictionKey> = None;

    loop {
        ticker.tick().await;

        let reply = match service.fetch_status().await {
            Ok(reply) => reply,
            Err(ServiceError::Transport(message)) => {
                warn!(%message, "Status polling lost the Model Service");
                let _ = tx.send(Err(ServiceError::Transport(message))).await;
                return;
            }
            Err(other) => {
                if tx.send(Err(other)).await.is_err() {
                    return;
                }
                continue;
            }
        };

        if let Some(message) = reply.error_message() {
            if tx.send(Err(ServiceError::Rejected(message))).await.is_err() {
                return;
            }
            continue;
        }

        let key = (reply.prediction.clone(), reply.counts.clone());
        if key.0.is_none() || last_key.as_ref() == Some(&key) {
            continue;
        }

        if let Some(prediction) = reply.latest_prediction(nfc_common::time::now()) {
            debug!(feature = %prediction.feature, confidence = prediction.confidence, "Polled prediction");
            last_key = Some(key);
            if tx.send(Ok(prediction)).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service = HttpModelService::new(
            "http://127.0.0.1:5000/api/",
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(service.url(routes::STATUS), "http://127.0.0.1:5000/api/status");
    }

    #[test]
    fn test_zero_poll_interval_is_raised() {
        let service =
            HttpModelService::new("http://localhost/api", Duration::from_secs(1), Duration::ZERO)
                .unwrap();
        assert!(service.poll_interval() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 9 (discard) is closed on test hosts
        let service = HttpModelService::new(
            "http://127.0.0.1:9/api",
            Duration::from_secs(2),
            Duration::from_millis(100),
        )
        .unwrap();

        let result = service.start_recording("grip").await;
        assert!(matches!(result, Err(ServiceError::Transport(_))));
    }
}
