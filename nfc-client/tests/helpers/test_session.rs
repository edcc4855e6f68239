//! Orchestrator harness over the simulated Model Service

use nfc_client::service::{SimulatedConfig, SimulatedModelService};
use nfc_client::{Orchestrator, OrchestratorOptions};
use nfc_common::events::{CalibrationEvent, EventBus};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct TestSession {
    pub orchestrator: Orchestrator,
    pub service: SimulatedModelService,
    events: broadcast::Receiver<CalibrationEvent>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_config(SimulatedConfig::instant(), OrchestratorOptions::default())
    }

    pub fn with_config(config: SimulatedConfig, options: OrchestratorOptions) -> Self {
        let service = SimulatedModelService::new(config);
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let orchestrator = Orchestrator::new(Arc::new(service.clone()), options, bus);
        Self {
            orchestrator,
            service,
            events,
        }
    }

    /// Add and fully record each feature
    pub async fn calibrate(&mut self, features: &[&str]) {
        for feature in features {
            self.orchestrator.add_feature(feature).expect("add feature");
            self.orchestrator
                .start_recording(feature)
                .expect("start recording");
            self.orchestrator.settle().await;
        }
        assert!(self.orchestrator.registry().is_fully_calibrated());
    }

    /// Calibrate and train
    pub async fn trained(&mut self, features: &[&str]) {
        self.calibrate(features).await;
        self.orchestrator.train().expect("train");
        self.orchestrator.settle().await;
        assert!(self.orchestrator.model_trained());
    }

    /// Trained with inference running
    pub async fn inferring(&mut self, features: &[&str]) {
        self.trained(features).await;
        self.orchestrator.toggle_inference().expect("start inference");
        self.orchestrator.settle().await;
    }

    /// Everything emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<CalibrationEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn count(events: &[CalibrationEvent], event_type: &str) -> usize {
        events
            .iter()
            .filter(|event| event.event_type() == event_type)
            .count()
    }
}
