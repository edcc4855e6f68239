//! Internal signals and the plumbing that delivers them
//!
//! Service calls, the recording ticker and prediction forwarders run as
//! tokio tasks. None of them touch session state: each reports back with a
//! `Signal`, and the orchestrator applies signals one at a time. That keeps
//! every state mutation on a single logical thread of control.

use crate::error::CalibrationError;
use crate::service::{FeedItem, ModelService, PredictionFeed, ServiceError, ServiceStatus, TrainingReport};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Completion or notification delivered to the orchestrator
#[derive(Debug)]
pub enum Signal {
    RecordingStartResolved {
        feature: String,
        result: Result<(), ServiceError>,
    },
    RecordingStopResolved {
        feature: String,
        result: Result<(), ServiceError>,
    },
    TimerTick {
        generation: u64,
    },
    TrainingResolved {
        result: Result<TrainingReport, ServiceError>,
    },
    InferenceStartResolved {
        generation: u64,
        result: Result<PredictionFeed, CalibrationError>,
    },
    InferenceStopResolved {
        result: Result<(), ServiceError>,
    },
    /// Best-effort stop issued after the prediction channel was lost
    InferenceReleased {
        result: Result<(), ServiceError>,
    },
    Feed {
        generation: u64,
        item: FeedItem,
    },
    FeedClosed {
        generation: u64,
    },
    StatusResolved {
        result: Result<ServiceStatus, ServiceError>,
    },
}

impl Signal {
    /// Whether this signal answers a call started with `SignalSink::spawn_call`
    pub fn is_call_result(&self) -> bool {
        matches!(
            self,
            Signal::RecordingStartResolved { .. }
                | Signal::RecordingStopResolved { .. }
                | Signal::TrainingResolved { .. }
                | Signal::InferenceStartResolved { .. }
                | Signal::InferenceStopResolved { .. }
                | Signal::InferenceReleased { .. }
                | Signal::StatusResolved { .. }
        )
    }
}

/// Sending half of the signal queue, shared by every component
#[derive(Debug, Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<Signal>,
    pending: Arc<AtomicUsize>,
}

impl SignalSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
        };
        (sink, rx)
    }

    /// Queue a signal; false when the orchestrator is gone
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }

    /// Run a service call in the background and queue its result
    pub fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Signal> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let signal = call.await;
            trace!(?signal, "Service call resolved");
            let _ = tx.send(signal);
        });
    }

    /// Mark one call result as applied
    pub fn resolve_call(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Service calls whose results have not been applied yet
    pub fn pending_calls(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// A component's handle on the Model Service plus the signal queue
#[derive(Clone)]
pub struct ServiceLink {
    pub service: Arc<dyn ModelService>,
    pub sink: SignalSink,
}

impl ServiceLink {
    pub fn new(service: Arc<dyn ModelService>, sink: SignalSink) -> Self {
        Self { service, sink }
    }
}

impl std::fmt::Debug for ServiceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLink")
            .field("service", &self.service.name())
            .field("pending_calls", &self.sink.pending_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_call_tracks_pending() {
        let (sink, mut rx) = SignalSink::new();
        sink.spawn_call(async { Signal::StatusResolved { result: Err(ServiceError::Transport("x".into())) } });
        assert_eq!(sink.pending_calls(), 1);

        let signal = rx.recv().await.unwrap();
        assert!(signal.is_call_result());
        sink.resolve_call();
        assert_eq!(sink.pending_calls(), 0);

        sink.resolve_call();
        assert_eq!(sink.pending_calls(), 0);
    }

    #[test]
    fn test_ticks_are_not_call_results() {
        assert!(!Signal::TimerTick { generation: 1 }.is_call_result());
        assert!(!Signal::FeedClosed { generation: 1 }.is_call_result());
    }
}
