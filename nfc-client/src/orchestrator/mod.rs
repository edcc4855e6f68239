//! Orchestrator: the composed calibration state machine
//!
//! Owns the registry, the calibration controller, the training gate and the
//! inference loop, and enforces the rules that span them:
//! - a feature cannot be removed while it is the recording target
//! - recording, training and inference exclude one another
//! - every user action clears the error banner first; every failure sets it
//!   and leaves the rest of the state as it was
//!
//! User actions are synchronous: they validate, mutate, and start whatever
//! Model Service call they need in the background. Completions, timer
//! ticks and predictions come back as `Signal`s applied by `step`, one at a
//! time, so no state is ever mutated concurrently.

pub mod dispatch;
mod snapshot;

pub use snapshot::SessionSnapshot;

use crate::calibration::{CalibrationController, FeatureRegistry, RecordingSession, TickOutcome, DEFAULT_RECORDING_SECS};
use crate::error::{CalibrationError, Result};
use crate::inference::InferenceLoop;
use crate::service::ModelService;
use crate::training::TrainingGate;
use dispatch::{ServiceLink, Signal, SignalSink};
use nfc_common::events::{CalibrationEvent, EventBus, InferencePhase, TrainingState};
use nfc_common::time::now;
use nfc_common::Prediction;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Session tuning
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Countdown length of one recording
    pub recording_secs: u32,
    /// Ignore predictions older than the one displayed
    pub discard_out_of_order: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            recording_secs: DEFAULT_RECORDING_SECS,
            discard_out_of_order: false,
        }
    }
}

/// Request sent to a running orchestrator
#[derive(Debug)]
pub enum Command {
    AddFeature(String),
    RemoveFeature(String),
    StartRecording(String),
    CancelRecording,
    Train,
    ToggleInference,
    RefreshStatus,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

pub struct Orchestrator {
    registry: FeatureRegistry,
    calibration: CalibrationController,
    training: TrainingGate,
    inference: InferenceLoop,
    error: Option<CalibrationError>,
    service_status: Option<crate::service::ServiceStatus>,
    service: Arc<dyn ModelService>,
    sink: SignalSink,
    signals: mpsc::UnboundedReceiver<Signal>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn ModelService>, options: OrchestratorOptions, events: EventBus) -> Self {
        let (sink, signals) = SignalSink::new();
        let link = ServiceLink::new(service.clone(), sink.clone());
        info!(
            backend = service.name(),
            recording_secs = options.recording_secs,
            "Orchestrator created"
        );

        Self {
            registry: FeatureRegistry::new(),
            calibration: CalibrationController::new(link.clone(), options.recording_secs),
            training: TrainingGate::new(link.clone()),
            inference: InferenceLoop::new(link, options.discard_out_of_order),
            error: None,
            service_status: None,
            service,
            sink,
            signals,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn error(&self) -> Option<&CalibrationError> {
        self.error.as_ref()
    }

    pub fn recording_session(&self) -> Option<&RecordingSession> {
        self.calibration.session()
    }

    pub fn training_state(&self) -> TrainingState {
        self.training.state()
    }

    pub fn model_trained(&self) -> bool {
        self.training.model_trained()
    }

    pub fn inference_phase(&self) -> InferencePhase {
        self.inference.phase()
    }

    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.inference.last_prediction()
    }

    /// Model Service calls whose results have not been applied yet
    pub fn pending_calls(&self) -> usize {
        self.sink.pending_calls()
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    pub fn add_feature(&mut self, name: &str) -> Result<()> {
        let name = name.trim().to_string();
        self.act("add", |o| {
            o.registry.add(&name)?;
            info!(feature = %name, "Feature added");
            o.emit(CalibrationEvent::FeatureAdded {
                feature: name.clone(),
                timestamp: now(),
            });
            Ok(())
        })
    }

    /// Remove a feature; refused while it is being recorded
    pub fn remove_feature(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        self.act("remove", |o| {
            if o.calibration.target() == Some(name) {
                return Err(CalibrationError::FeatureRecording(name.to_string()));
            }
            if o.registry.remove(name) {
                info!(feature = name, "Feature removed");
                o.emit(CalibrationEvent::FeatureRemoved {
                    feature: name.to_string(),
                    timestamp: now(),
                });
            }
            Ok(())
        })
    }

    pub fn start_recording(&mut self, feature: &str) -> Result<()> {
        let feature = feature.trim();
        self.act("record", |o| {
            if o.training.is_in_flight() {
                return Err(CalibrationError::AlreadyTraining);
            }
            if o.inference.phase() != InferencePhase::Stopped {
                return Err(CalibrationError::InferenceRunning);
            }
            o.calibration.start_recording(&o.registry, feature)
        })
    }

    /// Abort the active recording without calibrating the feature
    pub fn cancel_recording(&mut self) -> Result<()> {
        self.act("cancel", |o| {
            if let Some(session) = o.calibration.cancel_recording()? {
                o.emit(CalibrationEvent::RecordingCancelled {
                    session_id: session.id,
                    feature: session.feature,
                    timestamp: now(),
                });
            }
            Ok(())
        })
    }

    pub fn train(&mut self) -> Result<()> {
        self.act("train", |o| {
            if !o.registry.is_fully_calibrated() {
                return Err(CalibrationError::NotCalibrated);
            }
            if let Some(feature) = o.calibration.target() {
                return Err(CalibrationError::AlreadyRecording(feature.to_string()));
            }
            if o.inference.phase() != InferencePhase::Stopped {
                return Err(CalibrationError::InferenceRunning);
            }
            o.training.train(&o.registry)?;
            o.emit(CalibrationEvent::TrainingStarted {
                features: o.registry.names(),
                timestamp: now(),
            });
            Ok(())
        })
    }

    /// Start inference when stopped, stop it when active
    pub fn toggle_inference(&mut self) -> Result<()> {
        self.act("infer", |o| {
            if o.inference.phase() == InferencePhase::Stopped {
                if o.training.is_in_flight() {
                    return Err(CalibrationError::AlreadyTraining);
                }
                if let Some(feature) = o.calibration.target() {
                    return Err(CalibrationError::AlreadyRecording(feature.to_string()));
                }
            }
            o.inference
                .toggle(o.training.model_trained(), o.registry.is_fully_calibrated())
        })
    }

    /// Ask the Model Service for its status once
    pub fn refresh_status(&mut self) -> Result<()> {
        self.act("status", |o| {
            let service = o.service.clone();
            o.sink.spawn_call(async move {
                let result = service.status().await;
                Signal::StatusResolved { result }
            });
            Ok(())
        })
    }

    fn act<T>(&mut self, action: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.error.take().is_some() {
            self.emit(CalibrationEvent::ErrorCleared { timestamp: now() });
        }

        let before = self.inference.phase();
        let result = f(self);
        self.note_inference_phase(before);

        if let Err(e) = &result {
            warn!(action, error = %e, "Action failed");
            self.raise(e.clone());
        }
        result
    }

    // ------------------------------------------------------------------
    // Signal processing
    // ------------------------------------------------------------------

    /// Wait for one internal signal and apply it
    pub async fn step(&mut self) {
        if let Some(signal) = self.signals.recv().await {
            self.apply(signal);
        }
    }

    /// Apply signals until no service call is outstanding and no countdown runs
    pub async fn settle(&mut self) {
        while self.sink.pending_calls() > 0 || self.calibration.is_busy() {
            self.step().await;
        }
    }

    /// Serve commands until `Shutdown` (or the sender is dropped), then shut down
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Orchestrator running");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                },
                Some(signal) = self.signals.recv() => self.apply(signal),
            }
        }
        self.shutdown().await;
    }

    /// Release timers and subscriptions; stop remote activity best-effort
    pub async fn shutdown(&mut self) {
        let was_recording = self.calibration.halt();
        let was_inferring = self.inference.halt();

        if was_recording {
            if let Err(e) = self.service.stop_recording().await {
                warn!(error = %e, "Stop recording on shutdown failed");
            }
        }
        if was_inferring {
            if let Err(e) = self.service.stop_inference().await {
                warn!(error = %e, "Stop inference on shutdown failed");
            }
        }
        info!("Orchestrator shut down");
    }

    fn execute(&mut self, command: Command) {
        // Failures are already on the error banner and the event bus
        let _ = match command {
            Command::AddFeature(name) => self.add_feature(&name),
            Command::RemoveFeature(name) => self.remove_feature(&name),
            Command::StartRecording(name) => self.start_recording(&name),
            Command::CancelRecording => self.cancel_recording(),
            Command::Train => self.train(),
            Command::ToggleInference => self.toggle_inference(),
            Command::RefreshStatus => self.refresh_status(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };
    }

    fn apply(&mut self, signal: Signal) {
        if signal.is_call_result() {
            self.sink.resolve_call();
        }

        let before = self.inference.phase();
        let outcome = match signal {
            Signal::RecordingStartResolved { feature, result } => {
                match self.calibration.on_start_resolved(&feature, result) {
                    Ok(None) => Ok(()),
                    Ok(Some(session)) => {
                        let event = CalibrationEvent::RecordingStarted {
                            session_id: session.id,
                            feature: session.feature.clone(),
                            seconds_remaining: session.seconds_remaining,
                            timestamp: now(),
                        };
                        info!(feature = %feature, "Recording started");
                        self.emit(event);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Signal::TimerTick { generation } => {
                self.apply_tick(generation);
                Ok(())
            }
            Signal::RecordingStopResolved { feature, result } => {
                self.calibration.on_stop_resolved(&feature, result)
            }
            Signal::TrainingResolved { result } => match self.training.on_resolved(result) {
                Ok(report) => {
                    let event = CalibrationEvent::TrainingCompleted {
                        accuracy: report.accuracy,
                        features: report.features.clone(),
                        timestamp: now(),
                    };
                    self.emit(event);
                    Ok(())
                }
                Err(e) => {
                    self.emit(CalibrationEvent::TrainingFailed {
                        message: e.to_string(),
                        timestamp: now(),
                    });
                    Err(e)
                }
            },
            Signal::InferenceStartResolved { generation, result } => {
                self.inference.on_start_resolved(generation, result)
            }
            Signal::InferenceStopResolved { result } => self.inference.on_stop_resolved(result),
            Signal::InferenceReleased { result } => {
                if let Err(e) = result {
                    warn!(error = %e, "Stop after connectivity loss failed");
                }
                Ok(())
            }
            Signal::Feed { generation, item } => match self.inference.on_feed(generation, item) {
                Ok(Some(prediction)) => {
                    let event = CalibrationEvent::PredictionUpdated {
                        prediction: prediction.clone(),
                        timestamp: now(),
                    };
                    self.emit(event);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
            Signal::FeedClosed { generation } => self.inference.on_feed_closed(generation),
            Signal::StatusResolved { result } => self.apply_status(result),
        };
        self.note_inference_phase(before);

        if let Err(e) = outcome {
            error!(error = %e, "Model Service failure");
            self.raise(e);
        }
    }

    fn apply_tick(&mut self, generation: u64) {
        match self.calibration.on_tick(&mut self.registry, generation) {
            TickOutcome::Counting(session) => self.emit(CalibrationEvent::RecordingTick {
                session_id: session.id,
                feature: session.feature,
                seconds_remaining: session.seconds_remaining,
                timestamp: now(),
            }),
            TickOutcome::Completed(session) => {
                self.emit(CalibrationEvent::RecordingTick {
                    session_id: session.id,
                    feature: session.feature.clone(),
                    seconds_remaining: 0,
                    timestamp: now(),
                });
                self.emit(CalibrationEvent::FeatureCalibrated {
                    session_id: session.id,
                    feature: session.feature,
                    timestamp: now(),
                });
            }
            TickOutcome::Stale => debug!(generation, "Stale tick ignored"),
        }
    }

    /// A status error only matters while recording, and never resets it
    fn apply_status(
        &mut self,
        result: std::result::Result<crate::service::ServiceStatus, crate::service::ServiceError>,
    ) -> Result<()> {
        match result {
            Ok(status) => {
                self.emit(CalibrationEvent::ServiceStatusUpdated {
                    recording: status.recording,
                    inference: status.inference,
                    model_trained: status.model_trained,
                    features_recorded: status.features.clone(),
                    timestamp: now(),
                });
                self.service_status = Some(status);
                Ok(())
            }
            Err(e) if self.calibration.is_busy() => Err(CalibrationError::Service(e.to_string())),
            Err(e) => {
                warn!(error = %e, "Status request failed while idle");
                Ok(())
            }
        }
    }

    fn note_inference_phase(&mut self, before: InferencePhase) {
        let after = self.inference.phase();
        if after != before {
            self.emit(CalibrationEvent::InferenceStateChanged {
                old_state: before,
                new_state: after,
                timestamp: now(),
            });
        }
    }

    fn raise(&mut self, error: CalibrationError) {
        self.emit(CalibrationEvent::ErrorRaised {
            message: error.to_string(),
            timestamp: now(),
        });
        self.error = Some(error);
    }

    fn emit(&self, event: CalibrationEvent) {
        debug!(event = event.event_type(), "Event");
        self.events.emit_lossy(event);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.service.name())
            .field("features", &self.registry.len())
            .field("inference", &self.inference.phase())
            .field("error", &self.error)
            .finish()
    }
}
