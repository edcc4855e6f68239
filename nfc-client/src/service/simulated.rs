//! In-process Model Service double
//!
//! Keeps its own session state behind an `Arc`, so every test (or demo run)
//! constructs an isolated instance. Tests drive it through:
//! - per-operation latency (combine with paused tokio time)
//! - persistent or one-shot failure injection
//! - call counters
//! - manual prediction pushes and connection severing
//!
//! With `auto_predictions` set, each subscription also receives random
//! predictions drawn from the recorded features.

use super::{FeedItem, ModelService, Operation, PredictionFeed, ServiceError, ServiceStatus, TrainingReport};
use async_trait::async_trait;
use nfc_common::Prediction;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Behaviour knobs of the simulated service
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Latency applied to operations without an explicit entry
    pub default_latency: Duration,
    /// Per-operation latency overrides
    pub latencies: BTreeMap<Operation, Duration>,
    /// Accuracy reported by `train`
    pub accuracy: f64,
    /// Period of random predictions pushed to subscribers, if any
    pub auto_predictions: Option<Duration>,
}

impl SimulatedConfig {
    /// Every call resolves on the next scheduler turn
    pub fn instant() -> Self {
        Self {
            default_latency: Duration::ZERO,
            latencies: BTreeMap::new(),
            accuracy: 0.95,
            auto_predictions: None,
        }
    }

    /// Latencies of the demo backend (train is the slow one)
    pub fn demo() -> Self {
        let latencies = BTreeMap::from([
            (Operation::StartRecording, Duration::from_millis(200)),
            (Operation::StopRecording, Duration::from_millis(300)),
            (Operation::Train, Duration::from_millis(2000)),
            (Operation::StartInference, Duration::from_millis(400)),
            (Operation::StopInference, Duration::from_millis(200)),
            (Operation::Status, Duration::from_millis(150)),
        ]);
        Self {
            default_latency: Duration::ZERO,
            latencies,
            accuracy: 0.95,
            auto_predictions: Some(Duration::from_secs(2)),
        }
    }

    pub fn with_latency(mut self, operation: Operation, latency: Duration) -> Self {
        self.latencies.insert(operation, latency);
        self
    }

    pub fn with_auto_predictions(mut self, period: Duration) -> Self {
        self.auto_predictions = Some(period);
        self
    }

    fn latency(&self, operation: Operation) -> Duration {
        self.latencies
            .get(&operation)
            .copied()
            .unwrap_or(self.default_latency)
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self::instant()
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Always(String),
    Once(String),
}

#[derive(Debug, Default)]
struct SimulatedState {
    recorded: Vec<String>,
    recording: Option<String>,
    model_trained: bool,
    inference: bool,
    latest: Option<Prediction>,
    failures: HashMap<Operation, Failure>,
    calls: HashMap<Operation, usize>,
    subscribers: Vec<mpsc::Sender<FeedItem>>,
}

/// Simulated Model Service
#[derive(Debug, Clone)]
pub struct SimulatedModelService {
    config: Arc<SimulatedConfig>,
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedModelService {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every call of `operation` fail with `message`
    pub fn fail(&self, operation: Operation, message: impl Into<String>) {
        self.state()
            .failures
            .insert(operation, Failure::Always(message.into()));
    }

    /// Make the next call of `operation` fail with `message`
    pub fn fail_once(&self, operation: Operation, message: impl Into<String>) {
        self.state()
            .failures
            .insert(operation, Failure::Once(message.into()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Number of calls issued for `operation` so far
    pub fn calls(&self, operation: Operation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Subscriptions whose feed is still held by a consumer
    pub fn active_subscriptions(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    /// Deliver `prediction` to every live subscription
    pub fn push_prediction(&self, prediction: Prediction) {
        self.push_item(Ok(prediction.clone()));
        self.state().latest = Some(prediction);
    }

    /// Deliver an error notice to every live subscription
    pub fn push_error(&self, message: impl Into<String>) {
        self.push_item(Err(ServiceError::Rejected(message.into())));
    }

    /// Drop all subscriptions as if the connection was lost
    pub fn sever(&self) {
        let subscribers = std::mem::take(&mut self.state().subscribers);
        for tx in subscribers {
            let _ = tx.try_send(Err(ServiceError::Transport("connection severed".to_string())));
        }
    }

    pub fn recorded_features(&self) -> Vec<String> {
        self.state().recorded.clone()
    }

    fn push_item(&self, item: FeedItem) {
        let mut state = self.state();
        state.subscribers.retain(|tx| !tx.is_closed());
        for tx in &state.subscribers {
            if tx.try_send(item.clone()).is_err() {
                debug!("Simulated subscriber lagging, prediction dropped");
            }
        }
    }

    /// Count the call, wait out the latency, then apply injected failures
    async fn enter(&self, operation: Operation) -> Result<(), ServiceError> {
        *self.state().calls.entry(operation).or_insert(0) += 1;

        let latency = self.config.latency(operation);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        match state.failures.get(&operation).cloned() {
            Some(Failure::Always(message)) => Err(ServiceError::Rejected(message)),
            Some(Failure::Once(message)) => {
                state.failures.remove(&operation);
                Err(ServiceError::Rejected(message))
            }
            None => Ok(()),
        }
    }
}

impl Default for SimulatedModelService {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

#[async_trait]
impl ModelService for SimulatedModelService {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn start_recording(&self, feature: &str) -> Result<(), ServiceError> {
        self.enter(Operation::StartRecording).await?;
        self.state().recording = Some(feature.to_string());
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), ServiceError> {
        self.enter(Operation::StopRecording).await?;
        let mut state = self.state();
        if let Some(feature) = state.recording.take() {
            if !state.recorded.contains(&feature) {
                state.recorded.push(feature);
            }
        }
        Ok(())
    }

    async fn train(&self) -> Result<TrainingReport, ServiceError> {
        self.enter(Operation::Train).await?;
        let mut state = self.state();
        state.model_trained = true;
        Ok(TrainingReport {
            accuracy: Some(self.config.accuracy),
            features: state.recorded.clone(),
        })
    }

    async fn start_inference(&self) -> Result<(), ServiceError> {
        self.enter(Operation::StartInference).await?;
        let mut state = self.state();
        if state.inference {
            return Err(ServiceError::Rejected("Inference already running".to_string()));
        }
        state.inference = true;
        Ok(())
    }

    async fn stop_inference(&self) -> Result<(), ServiceError> {
        self.enter(Operation::StopInference).await?;
        let mut state = self.state();
        state.inference = false;
        state.latest = None;
        Ok(())
    }

    async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        self.enter(Operation::Status).await?;
        let state = self.state();
        Ok(ServiceStatus {
            recording: state.recording.is_some(),
            inference: state.inference,
            model_trained: state.model_trained,
            features: state.recorded.clone(),
            latest_prediction: state.latest.clone(),
        })
    }

    async fn subscribe(&self) -> Result<PredictionFeed, ServiceError> {
        self.enter(Operation::Subscribe).await?;
        let (tx, rx) = PredictionFeed::channel();

        let Some(period) = self.config.auto_predictions else {
            self.state().subscribers.push(tx);
            return Ok(PredictionFeed::from_receiver(rx));
        };

        self.state().subscribers.push(tx.clone());
        let service = self.clone();
        let producer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(prediction) = service.random_prediction() else {
                    continue;
                };
                service.state().latest = Some(prediction.clone());
                if tx.send(Ok(prediction)).await.is_err() {
                    return;
                }
            }
        });
        Ok(PredictionFeed::with_producer(rx, producer))
    }
}

impl SimulatedModelService {
    fn random_prediction(&self) -> Option<Prediction> {
        let recorded = self.recorded_features();
        let mut rng = rand::thread_rng();
        let feature = recorded.choose(&mut rng)?;
        Some(Prediction::new(feature.clone(), rng.gen_range(0.6..1.0)))
    }
}
