//! Recording Timer
//!
//! One countdown at a time. A background ticker queues `Signal::TimerTick`
//! once per period, tagged with the generation of the session it belongs
//! to; the orchestrator hands each tick back to `on_tick`. Ticks from a
//! stopped or replaced session carry an old generation and are ignored,
//! so a cancelled countdown can never touch the next one.

use crate::error::{CalibrationError, Result};
use crate::orchestrator::dispatch::{Signal, SignalSink};
use nfc_common::events::RecordingPhase;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

/// Default countdown length in seconds
pub const DEFAULT_RECORDING_SECS: u32 = 15;

/// The active countdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSession {
    pub id: Uuid,
    pub feature: String,
    pub seconds_remaining: u32,
    pub phase: RecordingPhase,
}

/// What a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Tick of a session that no longer exists
    Stale,
    /// Countdown still running
    Counting(RecordingSession),
    /// Countdown reached zero; the session is gone
    Completed(RecordingSession),
}

#[derive(Debug)]
pub struct RecordingTimer {
    duration_secs: u32,
    tick_period: Duration,
    session: Option<RecordingSession>,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
    sink: SignalSink,
}

impl RecordingTimer {
    pub fn new(sink: SignalSink, duration_secs: u32) -> Self {
        Self::with_tick_period(sink, duration_secs, Duration::from_secs(1))
    }

    pub fn with_tick_period(sink: SignalSink, duration_secs: u32, tick_period: Duration) -> Self {
        Self {
            duration_secs: duration_secs.max(1),
            tick_period,
            session: None,
            generation: 0,
            ticker: None,
            sink,
        }
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a countdown for `feature`
    ///
    /// Refused with `AlreadyRecording` while any session exists; the running
    /// session is left untouched.
    pub fn start(&mut self, feature: &str) -> Result<&RecordingSession> {
        if let Some(active) = &self.session {
            return Err(CalibrationError::AlreadyRecording(active.feature.clone()));
        }

        self.generation += 1;
        let generation = self.generation;
        let period = self.tick_period;
        let sink = self.sink.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                if !sink.send(Signal::TimerTick { generation }) {
                    break;
                }
            }
        }));

        debug!(feature, seconds = self.duration_secs, generation, "Countdown started");
        Ok(&*self.session.insert(RecordingSession {
            id: Uuid::new_v4(),
            feature: feature.to_string(),
            seconds_remaining: self.duration_secs,
            phase: RecordingPhase::Active,
        }))
    }

    /// Apply one queued tick
    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation {
            return TickOutcome::Stale;
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Stale;
        };
        if session.phase != RecordingPhase::Active {
            return TickOutcome::Stale;
        }

        session.seconds_remaining = session.seconds_remaining.saturating_sub(1);
        if session.seconds_remaining > 0 {
            return TickOutcome::Counting(session.clone());
        }

        session.phase = RecordingPhase::Completing;
        self.release_ticker();
        match self.session.take() {
            Some(finished) => TickOutcome::Completed(finished),
            None => TickOutcome::Stale,
        }
    }

    /// Cancel the countdown without completing it
    ///
    /// Returns the cancelled session, if there was one. Safe to call at any time.
    pub fn stop(&mut self) -> Option<RecordingSession> {
        self.release_ticker();
        self.session.take()
    }

    fn release_ticker(&mut self) {
        self.generation += 1;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for RecordingTimer {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn next_tick(rx: &mut UnboundedReceiver<Signal>) -> u64 {
        match rx.recv().await {
            Some(Signal::TimerTick { generation }) => generation,
            other => panic!("expected a tick, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifteen_ticks_then_one_completion() {
        let (sink, mut rx) = SignalSink::new();
        let mut timer = RecordingTimer::new(sink, DEFAULT_RECORDING_SECS);
        timer.start("grip").unwrap();

        let mut counting = 0;
        let mut completions = 0;
        let mut last_remaining = DEFAULT_RECORDING_SECS;
        while timer.is_active() {
            let generation = next_tick(&mut rx).await;
            match timer.on_tick(generation) {
                TickOutcome::Counting(session) => {
                    assert_eq!(session.seconds_remaining, last_remaining - 1);
                    last_remaining = session.seconds_remaining;
                    counting += 1;
                }
                TickOutcome::Completed(session) => {
                    assert_eq!(session.seconds_remaining, 0);
                    assert_eq!(session.phase, RecordingPhase::Completing);
                    completions += 1;
                }
                TickOutcome::Stale => panic!("unexpected stale tick"),
            }
        }

        assert_eq!(counting + completions, 15);
        assert_eq!(completions, 1);

        // Ticker is gone: nothing more arrives
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_refused_and_first_untouched() {
        let (sink, mut rx) = SignalSink::new();
        let mut timer = RecordingTimer::new(sink, 15);
        timer.start("grip").unwrap();

        let generation = next_tick(&mut rx).await;
        timer.on_tick(generation);
        assert_eq!(timer.session().unwrap().seconds_remaining, 14);

        let err = timer.start("fist").unwrap_err();
        assert_eq!(err, CalibrationError::AlreadyRecording("grip".to_string()));
        assert_eq!(timer.session().unwrap().seconds_remaining, 14);
        assert_eq!(timer.session().unwrap().feature, "grip");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_queued_ticks() {
        let (sink, mut rx) = SignalSink::new();
        let mut timer = RecordingTimer::new(sink, 15);
        timer.start("grip").unwrap();

        let old_generation = next_tick(&mut rx).await;
        let cancelled = timer.stop().unwrap();
        assert_eq!(cancelled.feature, "grip");
        assert_eq!(timer.on_tick(old_generation), TickOutcome::Stale);

        // A fresh countdown is not shortened by the cancelled one
        timer.start("fist").unwrap();
        assert_eq!(timer.on_tick(old_generation), TickOutcome::Stale);
        assert_eq!(timer.session().unwrap().seconds_remaining, 15);
    }

    #[tokio::test]
    async fn test_stop_without_session_is_harmless() {
        let (sink, _rx) = SignalSink::new();
        let mut timer = RecordingTimer::new(sink, 15);
        assert!(timer.stop().is_none());
        assert!(timer.stop().is_none());
    }

    #[tokio::test]
    async fn test_zero_duration_is_raised_to_one() {
        let (sink, _rx) = SignalSink::new();
        let timer = RecordingTimer::new(sink, 0);
        assert_eq!(timer.duration_secs(), 1);
    }
}
