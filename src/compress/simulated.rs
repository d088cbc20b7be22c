//! Time-based progress estimate for batched requests
//!
//! A batched request gives no signal until the whole response arrives, so each
//! file gets a timer that walks its progress towards [`SIMULATED_CEILING`]
//! at a rate derived from a static duration estimate. The remaining percent
//! is left to the terminal event.

use super::progress::{ProgressEvent, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Highest value a simulated timer will ever report
pub const SIMULATED_CEILING: u8 = 95;

/// Rate parameters of the simulated timers
#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    /// Expected duration of the whole request
    pub estimated_duration: Duration,
    /// Timer cadence
    pub tick: Duration,
}

impl SimulationProfile {
    pub fn new(estimated_duration: Duration, tick: Duration) -> Self {
        Self {
            estimated_duration,
            tick,
        }
    }

    /// Progress added per tick: `95 / estimate × cadence`
    pub fn step(&self) -> f64 {
        let estimate_ms = self.estimated_duration.as_secs_f64() * 1000.0;
        if estimate_ms <= 0.0 {
            return f64::from(SIMULATED_CEILING);
        }
        let tick_ms = self.tick.as_secs_f64() * 1000.0;
        f64::from(SIMULATED_CEILING) / estimate_ms * tick_ms
    }
}

/// Owner of the per-file timers of one batch request.
///
/// Timers are aborted by [`SimulatedProgress::shutdown`] and, failing that,
/// when the value is dropped, so no timer outlives the request it belongs to.
pub struct SimulatedProgress {
    timers: JoinSet<()>,
}

impl SimulatedProgress {
    /// Start one timer per index
    pub fn start(
        indices: impl IntoIterator<Item = usize>,
        sink: Arc<ProgressSink>,
        profile: SimulationProfile,
    ) -> Self {
        let mut timers = JoinSet::new();
        let step = profile.step();

        for index in indices {
            let sink = sink.clone();
            timers.spawn(run_timer(index, sink, step, profile.tick));
        }

        tracing::debug!(
            target: "compress::simulated",
            timers = timers.len(),
            step,
            tick_ms = profile.tick.as_millis() as u64,
            "Started simulated progress"
        );

        Self { timers }
    }

    /// Number of timers not yet finished
    pub fn active(&self) -> usize {
        self.timers.len()
    }

    /// Abort every timer and wait until all of them are gone
    pub async fn shutdown(mut self) {
        self.timers.abort_all();
        while self.timers.join_next().await.is_some() {}
        tracing::debug!(target: "compress::simulated", "Simulated progress stopped");
    }
}

impl Drop for SimulatedProgress {
    fn drop(&mut self) {
        if !self.timers.is_empty() {
            tracing::trace!(target: "compress::simulated", timers = self.timers.len(), "Aborting simulated progress timers");
            self.timers.abort_all();
        }
    }
}

async fn run_timer(index: usize, sink: Arc<ProgressSink>, step: f64, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    interval.tick().await;

    let ceiling = f64::from(SIMULATED_CEILING);
    let mut progress = 0.0_f64;
    let mut reported = 0u8;

    loop {
        interval.tick().await;
        progress = (progress + step).min(ceiling);

        let whole = progress.floor() as u8;
        if whole > reported {
            reported = whole;
            if !sink.emit(ProgressEvent::processing(index, whole)) {
                // File already finished or the sink was closed
                break;
            }
        }

        if reported >= SIMULATED_CEILING {
            break;
        }
    }
}
