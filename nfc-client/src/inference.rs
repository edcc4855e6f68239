//! Inference Loop
//!
//! Phases: `stopped -> starting -> active -> stopping -> stopped`.
//!
//! Starting issues `startInference` and then opens the prediction
//! subscription; the feed is handed to a forwarder task that queues each
//! item as a `Signal::Feed`. At most one forwarder exists. Stopping aborts
//! the forwarder at once (dropping the feed releases the subscription),
//! clears the last prediction and only then calls `stopInference`; the
//! loop reaches `stopped` whatever that call answers.
//!
//! Feed items are tagged with a generation so that anything queued by a
//! released subscription is ignored.
//!
//! Losing the prediction channel stops the loop locally and sends a
//! best-effort `stopInference`, so the service does not keep inference
//! running on its own. A later start waits for that stop to land first.

use crate::error::{CalibrationError, Result};
use crate::orchestrator::dispatch::{ServiceLink, Signal};
use crate::service::{FeedItem, PredictionFeed, ServiceError};
use nfc_common::events::InferencePhase;
use nfc_common::Prediction;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct InferenceLoop {
    phase: InferencePhase,
    last_prediction: Option<Prediction>,
    generation: u64,
    forwarder: Option<JoinHandle<()>>,
    /// Fires once the stop issued after a channel loss has finished
    release: Option<oneshot::Receiver<()>>,
    discard_out_of_order: bool,
    link: ServiceLink,
}

impl InferenceLoop {
    pub fn new(link: ServiceLink, discard_out_of_order: bool) -> Self {
        Self {
            phase: InferencePhase::Stopped,
            last_prediction: None,
            generation: 0,
            forwarder: None,
            release: None,
            discard_out_of_order,
            link,
        }
    }

    pub fn phase(&self) -> InferencePhase {
        self.phase
    }

    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.last_prediction.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Start when stopped, stop when active
    ///
    /// Starting requires a trained model and a fully calibrated registry.
    /// While a start or stop call is outstanding the toggle is refused with
    /// `TransitionInProgress`.
    pub fn toggle(&mut self, model_trained: bool, fully_calibrated: bool) -> Result<()> {
        match self.phase {
            InferencePhase::Starting | InferencePhase::Stopping => {
                Err(CalibrationError::TransitionInProgress)
            }
            InferencePhase::Stopped => {
                if !model_trained {
                    return Err(CalibrationError::NotTrained);
                }
                if !fully_calibrated {
                    return Err(CalibrationError::NotCalibrated);
                }
                self.begin_start();
                Ok(())
            }
            InferencePhase::Active => {
                self.begin_stop();
                Ok(())
            }
        }
    }

    fn begin_start(&mut self) {
        self.generation += 1;
        self.phase = InferencePhase::Starting;
        let generation = self.generation;
        let service = self.link.service.clone();
        let release = self.release.take();
        info!("Starting inference");

        self.link.sink.spawn_call(async move {
            if let Some(release) = release {
                let _ = release.await;
            }
            let result = match service.start_inference().await {
                Err(e) => Err(CalibrationError::Service(e.to_string())),
                Ok(()) => match service.subscribe().await {
                    Ok(feed) => Ok(feed),
                    Err(e) => {
                        warn!(error = %e, "Prediction subscription failed, stopping inference");
                        if let Err(stop_err) = service.stop_inference().await {
                            debug!(error = %stop_err, "Best-effort stop failed");
                        }
                        Err(CalibrationError::Connectivity(e.to_string()))
                    }
                },
            };
            Signal::InferenceStartResolved { generation, result }
        });
    }

    fn begin_stop(&mut self) {
        self.release_subscription();
        self.phase = InferencePhase::Stopping;
        info!("Stopping inference");

        let service = self.link.service.clone();
        self.link.sink.spawn_call(async move {
            let result = service.stop_inference().await;
            Signal::InferenceStopResolved { result }
        });
    }

    /// Apply the combined start + subscribe reply
    pub fn on_start_resolved(
        &mut self,
        generation: u64,
        result: std::result::Result<PredictionFeed, CalibrationError>,
    ) -> Result<()> {
        if generation != self.generation || self.phase != InferencePhase::Starting {
            debug!(generation, "Dropping stale inference start reply");
            return Ok(());
        }

        match result {
            Ok(feed) => {
                self.phase = InferencePhase::Active;
                self.forwarder = Some(self.spawn_forwarder(feed));
                info!("Inference active");
                Ok(())
            }
            Err(e) => {
                self.phase = InferencePhase::Stopped;
                Err(e)
            }
        }
    }

    fn spawn_forwarder(&self, mut feed: PredictionFeed) -> JoinHandle<()> {
        let sink = self.link.sink.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            while let Some(item) = feed.recv().await {
                if !sink.send(Signal::Feed { generation, item }) {
                    return;
                }
            }
            sink.send(Signal::FeedClosed { generation });
        })
    }

    /// Apply one subscription item
    ///
    /// Returns the new latest prediction, or `None` when the item was
    /// ignored. Rejections are surfaced while staying active; a transport
    /// failure takes the loop offline.
    pub fn on_feed(&mut self, generation: u64, item: FeedItem) -> Result<Option<&Prediction>> {
        if generation != self.generation || self.phase != InferencePhase::Active {
            return Ok(None);
        }

        match item {
            Ok(prediction) => {
                if self.discard_out_of_order {
                    if let Some(last) = &self.last_prediction {
                        if prediction.observed_at < last.observed_at {
                            debug!(feature = %prediction.feature, "Discarding out-of-order prediction");
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(&*self.last_prediction.insert(prediction)))
            }
            Err(ServiceError::Transport(message)) => {
                self.go_offline();
                Err(CalibrationError::Connectivity(message))
            }
            Err(e) => {
                warn!(error = %e, "Model Service reported an inference error");
                Err(CalibrationError::Service(e.to_string()))
            }
        }
    }

    /// The subscription ended without an error item
    pub fn on_feed_closed(&mut self, generation: u64) -> Result<()> {
        if generation != self.generation || self.phase != InferencePhase::Active {
            return Ok(());
        }
        self.go_offline();
        Err(CalibrationError::Connectivity("prediction stream ended".to_string()))
    }

    /// Apply the stop reply; the loop is stopped either way
    pub fn on_stop_resolved(&mut self, result: std::result::Result<(), ServiceError>) -> Result<()> {
        if self.phase == InferencePhase::Stopping {
            self.phase = InferencePhase::Stopped;
            info!("Inference stopped");
        }
        result.map_err(|e| {
            warn!(error = %e, "Model Service failed to stop inference");
            CalibrationError::Service(e.to_string())
        })
    }

    /// Release everything without calling the Model Service
    ///
    /// Returns whether the service still believes inference is running.
    pub fn halt(&mut self) -> bool {
        let was_running = matches!(self.phase, InferencePhase::Active | InferencePhase::Starting);
        self.release_subscription();
        self.phase = InferencePhase::Stopped;
        was_running
    }

    fn go_offline(&mut self) {
        warn!("Prediction channel lost, inference stopped");
        self.release_subscription();
        self.phase = InferencePhase::Stopped;

        let (done, release) = oneshot::channel();
        self.release = Some(release);
        let service = self.link.service.clone();
        self.link.sink.spawn_call(async move {
            let result = service.stop_inference().await;
            let _ = done.send(());
            Signal::InferenceReleased { result }
        });
    }

    fn release_subscription(&mut self) {
        self.generation += 1;
        self.last_prediction = None;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for InferenceLoop {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::dispatch::SignalSink;
    use crate::service::{ModelService, Operation, SimulatedConfig, SimulatedModelService};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn inference_loop(discard: bool) -> (InferenceLoop, SimulatedModelService, UnboundedReceiver<Signal>) {
        inference_loop_with(SimulatedConfig::instant(), discard)
    }

    fn inference_loop_with(
        config: SimulatedConfig,
        discard: bool,
    ) -> (InferenceLoop, SimulatedModelService, UnboundedReceiver<Signal>) {
        let service = SimulatedModelService::new(config);
        let (sink, rx) = SignalSink::new();
        let link = ServiceLink::new(Arc::new(service.clone()), sink);
        (InferenceLoop::new(link, discard), service, rx)
    }

    async fn activate(inference: &mut InferenceLoop, rx: &mut UnboundedReceiver<Signal>) {
        inference.toggle(true, true).unwrap();
        let Some(Signal::InferenceStartResolved { generation, result }) = rx.recv().await else {
            panic!("expected start reply");
        };
        inference.on_start_resolved(generation, result).unwrap();
        assert_eq!(inference.phase(), InferencePhase::Active);
    }

    async fn next_feed(rx: &mut UnboundedReceiver<Signal>) -> (u64, FeedItem) {
        match rx.recv().await {
            Some(Signal::Feed { generation, item }) => (generation, item),
            other => panic!("expected a feed item, got {:?}", other),
        }
    }

    async fn next_release(rx: &mut UnboundedReceiver<Signal>) -> std::result::Result<(), ServiceError> {
        loop {
            match rx.recv().await {
                Some(Signal::InferenceReleased { result }) => return result,
                Some(Signal::Feed { .. }) | Some(Signal::FeedClosed { .. }) => continue,
                other => panic!("expected the release stop, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_toggle_requires_trained_model() {
        let (mut inference, service, _rx) = inference_loop(false);
        assert_eq!(inference.toggle(false, true), Err(CalibrationError::NotTrained));
        assert_eq!(inference.phase(), InferencePhase::Stopped);
        tokio::task::yield_now().await;
        assert_eq!(service.calls(Operation::StartInference), 0);
    }

    #[tokio::test]
    async fn test_reentrant_toggle_refused_while_starting() {
        let (mut inference, _service, _rx) = inference_loop(false);
        inference.toggle(true, true).unwrap();
        assert_eq!(inference.phase(), InferencePhase::Starting);
        assert_eq!(inference.toggle(true, true), Err(CalibrationError::TransitionInProgress));
    }

    #[tokio::test]
    async fn test_start_failure_returns_to_stopped() {
        let (mut inference, service, mut rx) = inference_loop(false);
        service.fail(Operation::StartInference, "Model has not been trained");

        inference.toggle(true, true).unwrap();
        let Some(Signal::InferenceStartResolved { generation, result }) = rx.recv().await else {
            panic!("expected start reply");
        };
        let err = inference.on_start_resolved(generation, result).unwrap_err();
        assert_eq!(err, CalibrationError::Service("Model has not been trained".to_string()));
        assert_eq!(inference.phase(), InferencePhase::Stopped);
        assert!(!inference.is_subscribed());
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_connectivity() {
        let (mut inference, service, mut rx) = inference_loop(false);
        service.fail(Operation::Subscribe, "socket refused");

        inference.toggle(true, true).unwrap();
        let Some(Signal::InferenceStartResolved { generation, result }) = rx.recv().await else {
            panic!("expected start reply");
        };
        let err = inference.on_start_resolved(generation, result).unwrap_err();
        assert!(matches!(err, CalibrationError::Connectivity(_)));
        assert_eq!(service.calls(Operation::StopInference), 1);
    }

    #[tokio::test]
    async fn test_latest_prediction_wins() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;

        service.push_prediction(Prediction::new("grip", 0.82));
        service.push_prediction(Prediction::new("fist", 0.65));
        for _ in 0..2 {
            let (generation, item) = next_feed(&mut rx).await;
            inference.on_feed(generation, item).unwrap();
        }

        let last = inference.last_prediction().unwrap();
        assert_eq!(last.feature, "fist");
        assert!((last.confidence - 0.65).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_out_of_order_discard_when_enabled() {
        let (mut inference, service, mut rx) = inference_loop(true);
        activate(&mut inference, &mut rx).await;

        let now = Utc::now();
        service.push_prediction(Prediction::observed("grip", 0.9, now));
        service.push_prediction(Prediction::observed("fist", 0.7, now - ChronoDuration::seconds(1)));
        for _ in 0..2 {
            let (generation, item) = next_feed(&mut rx).await;
            inference.on_feed(generation, item).unwrap();
        }

        assert_eq!(inference.last_prediction().unwrap().feature, "grip");
    }

    #[tokio::test]
    async fn test_stop_releases_subscription_and_clears_prediction() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;

        service.push_prediction(Prediction::new("grip", 0.82));
        let (generation, item) = next_feed(&mut rx).await;
        inference.on_feed(generation, item).unwrap();

        inference.toggle(true, true).unwrap();
        assert_eq!(inference.phase(), InferencePhase::Stopping);
        assert!(inference.last_prediction().is_none());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(service.active_subscriptions(), 0);

        // A queued item from the old subscription is ignored
        assert_eq!(inference.on_feed(generation, Ok(Prediction::new("fist", 0.5))), Ok(None));

        let Some(Signal::InferenceStopResolved { result }) = rx.recv().await else {
            panic!("expected stop reply");
        };
        inference.on_stop_resolved(result).unwrap();
        assert_eq!(inference.phase(), InferencePhase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_failure_still_stops() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;
        service.fail(Operation::StopInference, "stop failed");

        inference.toggle(true, true).unwrap();
        let Some(Signal::InferenceStopResolved { result }) = rx.recv().await else {
            panic!("expected stop reply");
        };
        assert!(inference.on_stop_resolved(result).is_err());
        assert_eq!(inference.phase(), InferencePhase::Stopped);
    }

    #[tokio::test]
    async fn test_transport_loss_goes_offline() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;

        service.sever();
        let (generation, item) = next_feed(&mut rx).await;
        let err = inference.on_feed(generation, item).unwrap_err();

        assert!(matches!(err, CalibrationError::Connectivity(_)));
        assert_eq!(inference.phase(), InferencePhase::Stopped);
        assert!(inference.last_prediction().is_none());

        let result = next_release(&mut rx).await;
        assert!(result.is_ok());
        assert_eq!(service.calls(Operation::StopInference), 1);
    }

    #[tokio::test]
    async fn test_closed_feed_releases_service_side_inference() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;

        let generation = inference.generation;
        assert!(inference.on_feed_closed(generation).is_err());
        assert_eq!(inference.phase(), InferencePhase::Stopped);

        let result = next_release(&mut rx).await;
        assert!(result.is_ok());
        assert!(!service.status().await.unwrap().inference);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_release_stop() {
        let config = SimulatedConfig::instant().with_latency(Operation::StopInference, Duration::from_millis(500));
        let (mut inference, service, mut rx) = inference_loop_with(config, false);
        activate(&mut inference, &mut rx).await;

        let generation = inference.generation;
        inference.on_feed_closed(generation).unwrap_err();
        inference.toggle(true, true).unwrap();

        // The slow stop lands before the start is issued
        let result = next_release(&mut rx).await;
        assert!(result.is_ok());

        let Some(Signal::InferenceStartResolved { generation, result }) = rx.recv().await else {
            panic!("expected start reply");
        };
        inference.on_start_resolved(generation, result).unwrap();
        assert_eq!(inference.phase(), InferencePhase::Active);
        assert_eq!(service.calls(Operation::StartInference), 2);
    }

    #[tokio::test]
    async fn test_rejected_item_keeps_loop_active() {
        let (mut inference, service, mut rx) = inference_loop(false);
        activate(&mut inference, &mut rx).await;

        service.push_error("sensor glitch");
        let (generation, item) = next_feed(&mut rx).await;
        let err = inference.on_feed(generation, item).unwrap_err();

        assert_eq!(err, CalibrationError::Service("sensor glitch".to_string()));
        assert_eq!(inference.phase(), InferencePhase::Active);
    }
}
