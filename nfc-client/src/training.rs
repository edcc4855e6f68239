//! Training Gate
//!
//! Training is offered only once every registered feature is calibrated,
//! and at most one training call is in flight.

use crate::calibration::FeatureRegistry;
use crate::error::{CalibrationError, Result};
use crate::orchestrator::dispatch::{ServiceLink, Signal};
use crate::service::{ServiceError, TrainingReport};
use nfc_common::events::TrainingState;
use tracing::{info, warn};

#[derive(Debug)]
pub struct TrainingGate {
    state: TrainingState,
    model_trained: bool,
    last_report: Option<TrainingReport>,
    link: ServiceLink,
}

impl TrainingGate {
    pub fn new(link: ServiceLink) -> Self {
        Self {
            state: TrainingState::Idle,
            model_trained: false,
            last_report: None,
            link,
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn model_trained(&self) -> bool {
        self.model_trained
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == TrainingState::InFlight
    }

    pub fn last_report(&self) -> Option<&TrainingReport> {
        self.last_report.as_ref()
    }

    /// Issue the training call
    ///
    /// Fails with `NotCalibrated` unless the registry is fully calibrated,
    /// then with `AlreadyTraining` while a previous call is outstanding.
    pub fn train(&mut self, registry: &FeatureRegistry) -> Result<()> {
        if !registry.is_fully_calibrated() {
            return Err(CalibrationError::NotCalibrated);
        }
        if self.state == TrainingState::InFlight {
            return Err(CalibrationError::AlreadyTraining);
        }

        self.state = TrainingState::InFlight;
        info!(features = registry.len(), "Training requested");
        let service = self.link.service.clone();
        self.link.sink.spawn_call(async move {
            let result = service.train().await;
            Signal::TrainingResolved { result }
        });
        Ok(())
    }

    /// Apply the training reply
    pub fn on_resolved(
        &mut self,
        result: std::result::Result<TrainingReport, ServiceError>,
    ) -> Result<&TrainingReport> {
        match result {
            Ok(report) => {
                info!(accuracy = ?report.accuracy, features = ?report.features, "Model trained");
                self.state = TrainingState::Done;
                self.model_trained = true;
                Ok(&*self.last_report.insert(report))
            }
            Err(e) => {
                warn!(error = %e, "Training failed");
                self.state = TrainingState::Idle;
                Err(CalibrationError::Service(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::dispatch::SignalSink;
    use crate::service::{Operation, SimulatedModelService};
    use std::sync::Arc;

    fn gate() -> (TrainingGate, SimulatedModelService, tokio::sync::mpsc::UnboundedReceiver<Signal>) {
        let service = SimulatedModelService::default();
        let (sink, rx) = SignalSink::new();
        (TrainingGate::new(ServiceLink::new(Arc::new(service.clone()), sink)), service, rx)
    }

    fn calibrated(names: &[&str]) -> FeatureRegistry {
        let mut registry = FeatureRegistry::new();
        for name in names {
            registry.add(name).unwrap();
            registry.mark_calibrated(name);
        }
        registry
    }

    #[tokio::test]
    async fn test_empty_registry_not_calibrated() {
        let (mut gate, service, _rx) = gate();
        assert_eq!(gate.train(&FeatureRegistry::new()), Err(CalibrationError::NotCalibrated));
        assert!(!gate.model_trained());
        assert_eq!(gate.state(), TrainingState::Idle);
        tokio::task::yield_now().await;
        assert_eq!(service.calls(Operation::Train), 0);
    }

    #[tokio::test]
    async fn test_second_train_rejected_while_in_flight() {
        let (mut gate, service, mut rx) = gate();
        let registry = calibrated(&["grip"]);

        gate.train(&registry).unwrap();
        assert_eq!(gate.train(&registry), Err(CalibrationError::AlreadyTraining));

        let Some(Signal::TrainingResolved { result }) = rx.recv().await else {
            panic!("expected training reply");
        };
        gate.on_resolved(result).unwrap();
        assert_eq!(service.calls(Operation::Train), 1);
        assert!(gate.model_trained());
        assert_eq!(gate.state(), TrainingState::Done);
    }

    #[tokio::test]
    async fn test_failure_reverts_to_idle_with_message() {
        let (mut gate, service, mut rx) = gate();
        service.fail(Operation::Train, "No training data files found!");

        gate.train(&calibrated(&["grip"])).unwrap();
        let Some(Signal::TrainingResolved { result }) = rx.recv().await else {
            panic!("expected training reply");
        };

        let err = gate.on_resolved(result).unwrap_err();
        assert_eq!(err.to_string(), "No training data files found!");
        assert_eq!(gate.state(), TrainingState::Idle);
        assert!(!gate.model_trained());
    }
}
