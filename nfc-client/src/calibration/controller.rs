//! Calibration Controller
//!
//! Sequences a recording around the Model Service and the timer:
//! 1. `start_recording` asks the service to start; nothing changes locally
//!    until it answers
//! 2. on success the countdown begins
//! 3. when the countdown completes the feature is marked calibrated at once
//!    and `stop_recording` is issued; the stop reply only reports errors
//!
//! Timer completion and the stop reply are separate signals. The timer is
//! authoritative for the calibration mark.

use super::registry::FeatureRegistry;
use super::timer::{RecordingSession, RecordingTimer, TickOutcome};
use crate::error::{CalibrationError, Result};
use crate::orchestrator::dispatch::{ServiceLink, Signal};
use crate::service::ServiceError;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CalibrationController {
    timer: RecordingTimer,
    /// Feature whose start call is in flight
    pending_start: Option<String>,
    link: ServiceLink,
}

impl CalibrationController {
    pub fn new(link: ServiceLink, recording_secs: u32) -> Self {
        let timer = RecordingTimer::new(link.sink.clone(), recording_secs);
        Self {
            timer,
            pending_start: None,
            link,
        }
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.timer.session()
    }

    pub fn recording_secs(&self) -> u32 {
        self.timer.duration_secs()
    }

    /// Feature being started or recorded, if any
    pub fn target(&self) -> Option<&str> {
        self.pending_start
            .as_deref()
            .or_else(|| self.timer.session().map(|s| s.feature.as_str()))
    }

    pub fn is_busy(&self) -> bool {
        self.target().is_some()
    }

    pub fn is_starting(&self) -> bool {
        self.pending_start.is_some()
    }

    /// Ask the Model Service to start recording `feature`
    pub fn start_recording(&mut self, registry: &FeatureRegistry, feature: &str) -> Result<()> {
        if !registry.contains(feature) {
            return Err(CalibrationError::UnknownFeature(feature.to_string()));
        }
        if let Some(busy) = self.target() {
            return Err(CalibrationError::AlreadyRecording(busy.to_string()));
        }

        self.pending_start = Some(feature.to_string());
        let service = self.link.service.clone();
        let feature = feature.to_string();
        info!(feature = %feature, "Requesting recording start");
        self.link.sink.spawn_call(async move {
            let result = service.start_recording(&feature).await;
            Signal::RecordingStartResolved { feature, result }
        });
        Ok(())
    }

    /// Apply the start reply; on success the countdown is running
    ///
    /// Returns `None` for a reply nobody is waiting for any more.
    pub fn on_start_resolved(
        &mut self,
        feature: &str,
        result: std::result::Result<(), ServiceError>,
    ) -> Result<Option<&RecordingSession>> {
        if self.pending_start.as_deref() != Some(feature) {
            debug!(feature, "Dropping stale recording start reply");
            return Ok(None);
        }
        self.pending_start = None;

        if let Err(e) = result {
            warn!(feature, error = %e, "Model Service refused to start recording");
            return Err(CalibrationError::Service(e.to_string()));
        }

        self.timer.start(feature).map(Some)
    }

    /// Apply a countdown tick; completion marks the feature calibrated
    pub fn on_tick(&mut self, registry: &mut FeatureRegistry, generation: u64) -> TickOutcome {
        let outcome = self.timer.on_tick(generation);
        match &outcome {
            TickOutcome::Counting(session) => {
                debug!(feature = %session.feature, remaining = session.seconds_remaining, "Tick");
            }
            TickOutcome::Completed(session) => {
                info!(feature = %session.feature, "Countdown complete");
                self.request_stop(&session.feature);
                registry.mark_calibrated(&session.feature);
            }
            TickOutcome::Stale => {}
        }
        outcome
    }

    /// Apply the stop reply; only failures matter
    pub fn on_stop_resolved(&self, feature: &str, result: std::result::Result<(), ServiceError>) -> Result<()> {
        result.map_err(|e| {
            warn!(feature, error = %e, "Model Service failed to stop recording");
            CalibrationError::Service(e.to_string())
        })
    }

    /// Abort the active recording without calibrating
    ///
    /// Returns the cancelled session, or `None` when nothing was recording.
    /// Refused while the start call is still in flight.
    pub fn cancel_recording(&mut self) -> Result<Option<RecordingSession>> {
        if self.pending_start.is_some() {
            return Err(CalibrationError::TransitionInProgress);
        }

        let Some(session) = self.timer.stop() else {
            return Ok(None);
        };
        info!(feature = %session.feature, "Recording cancelled");
        self.request_stop(&session.feature);
        Ok(Some(session))
    }

    /// Forget any recording locally
    ///
    /// Returns whether the Model Service may still be recording.
    pub fn halt(&mut self) -> bool {
        let starting = self.pending_start.take().is_some();
        let recording = self.timer.stop().is_some();
        starting || recording
    }

    fn request_stop(&self, feature: &str) {
        let service = self.link.service.clone();
        let feature = feature.to_string();
        self.link.sink.spawn_call(async move {
            let result = service.stop_recording().await;
            Signal::RecordingStopResolved { feature, result }
        });
    }
}
