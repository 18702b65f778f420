//! Heartbeat tracking
//!
//! [`BeatTracker`] feeds infrared samples through a [`BeatDetector`], turns the
//! interval between consecutive beats into an instantaneous rate, and keeps
//! the plausible ones in a [`RateWindow`] whose mean is the reported BPM.

mod detector;
mod window;

use embassy_time::{Duration, Instant};
use log::{debug, info};
use thiserror_no_std::Error;

use crate::app_state::Severity;
use crate::config::{MAX_PLAUSIBLE_BPM, MIN_PLAUSIBLE_BPM, RATE_WINDOW_SIZE};

pub use detector::*;
pub use window::*;

const MS_PER_MINUTE: u64 = 60_000;

/// A beat whose instantaneous rate was accepted into the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    pub at: Instant,
    pub interval: Duration,
    pub bpm: u32,
}

/// Why a detected beat did not produce a reading.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatRejection {
    #[error("beat arrived with no measurable interval")]
    ZeroInterval,
    #[error("instantaneous rate {bpm} BPM outside plausible range")]
    Implausible { bpm: u32 },
}

impl BeatRejection {
    pub const fn severity(&self) -> Severity {
        Severity::Discarded
    }
}

pub struct BeatTracker<D> {
    detector: D,
    window: RateWindow<RATE_WINDOW_SIZE>,
    last_beat: Instant,
}

impl<D: BeatDetector> BeatTracker<D> {
    /// The first beat is measured from boot.
    pub const fn new(detector: D) -> Self {
        Self {
            detector,
            window: RateWindow::new(),
            last_beat: Instant::from_ticks(0),
        }
    }

    /// Feed one infrared sample taken at `now`.
    pub fn on_sample(&mut self, now: Instant, intensity: u32) -> Option<BeatEvent> {
        if !self.detector.check(intensity) {
            return None;
        }

        match self.record_beat(now) {
            Ok(event) => {
                info!("Heartbeat detected! BPM: {}", event.bpm);
                Some(event)
            }
            Err(rejection) => {
                debug!("Beat discarded: {}", rejection);
                None
            }
        }
    }

    /// Account for a beat at `now` without consulting the detector.
    ///
    /// The beat timestamp always advances, even when the reading is rejected.
    pub fn record_beat(&mut self, now: Instant) -> Result<BeatEvent, BeatRejection> {
        let interval = now
            .checked_duration_since(self.last_beat)
            .unwrap_or(Duration::from_ticks(0));
        self.last_beat = now;

        let interval_ms = interval.as_millis();
        if interval_ms == 0 {
            return Err(BeatRejection::ZeroInterval);
        }

        let bpm = u32::try_from(MS_PER_MINUTE / interval_ms).unwrap_or(u32::MAX);
        if bpm <= MIN_PLAUSIBLE_BPM || bpm >= MAX_PLAUSIBLE_BPM {
            return Err(BeatRejection::Implausible { bpm });
        }

        self.window.push(bpm);
        Ok(BeatEvent {
            at: now,
            interval,
            bpm,
        })
    }

    /// Mean of the accepted readings in the window; 0 means no data yet.
    pub fn current_average_bpm(&self) -> u32 {
        self.window.average()
    }

    pub fn window(&self) -> &RateWindow<RATE_WINDOW_SIZE> {
        &self.window
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}
