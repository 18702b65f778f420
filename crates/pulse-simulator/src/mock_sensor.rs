//! Synthetic MAX30102 stand-in.

use std::time::Instant;

use pulse_core::sensors::{LedCurrents, PpgSample, PpgSensor, SensorError};

/// Infrared DC level with a finger on the sensor.
const FINGER_DC: f64 = 85_000.0;
/// Infrared level with nothing on the sensor (ambient light only).
const AMBIENT_DC: f64 = 3_000.0;
const PULSE_AMPLITUDE: f64 = 320.0;
/// Red channel relative to infrared.
const RED_RATIO: f64 = 0.78;

/// Heart rate wanders between these bounds.
const BPM_LOW: f64 = 60.0;
const BPM_HIGH: f64 = 90.0;
const BPM_DRIFT_PERIOD_SECS: f64 = 90.0;

/// The finger comes off for `FINGER_OFF_SECS` at the end of every cycle.
const FINGER_CYCLE_SECS: f64 = 60.0;
const FINGER_OFF_SECS: f64 = 5.0;

const NOISE_COUNTS: f64 = 12.0;

/// Generates a PPG waveform whose rate drifts slowly over time.
pub struct SyntheticPpg {
    start: Instant,
    last_read: f64,
    phase: f64,
    noise_state: u32,
    leds: Option<LedCurrents>,
}

impl SyntheticPpg {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_read: 0.0,
            phase: 0.0,
            noise_state: 0x1234_5678,
            leds: None,
        }
    }

    /// Target heart rate at `t` seconds.
    pub fn bpm_at(t: f64) -> f64 {
        let mid = (BPM_LOW + BPM_HIGH) / 2.0;
        let swing = (BPM_HIGH - BPM_LOW) / 2.0;
        mid + swing * (2.0 * std::f64::consts::PI * t / BPM_DRIFT_PERIOD_SECS).sin()
    }

    pub fn finger_present_at(t: f64) -> bool {
        t % FINGER_CYCLE_SECS < FINGER_CYCLE_SECS - FINGER_OFF_SECS
    }

    /// Small uniform noise from a xorshift generator.
    fn noise(&mut self) -> f64 {
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (f64::from(x) / f64::from(u32::MAX) - 0.5) * 2.0 * NOISE_COUNTS
    }

    /// Advance to `t` seconds and produce one sample.
    pub fn sample_at(&mut self, t: f64) -> PpgSample {
        let dt = (t - self.last_read).max(0.0);
        self.last_read = t;
        self.phase = (self.phase + dt * Self::bpm_at(t) / 60.0).fract();

        let angle = 2.0 * std::f64::consts::PI * self.phase;
        // Systolic peak plus a smaller harmonic; still one rising crossing per beat.
        let pulse = angle.sin() + 0.3 * (2.0 * angle).sin();

        let (dc, amplitude) = if Self::finger_present_at(t) {
            (FINGER_DC, PULSE_AMPLITUDE)
        } else {
            (AMBIENT_DC, 0.0)
        };

        let infrared = dc + amplitude * pulse + self.noise();
        let red = RED_RATIO * (dc + amplitude * pulse) + self.noise();
        PpgSample::new(infrared.max(0.0) as u32, red.max(0.0) as u32)
    }
}

impl Default for SyntheticPpg {
    fn default() -> Self {
        Self::new()
    }
}

impl PpgSensor for SyntheticPpg {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        log::info!("Synthetic PPG sensor ready");
        Ok(())
    }

    async fn configure(&mut self, leds: LedCurrents) -> Result<(), SensorError> {
        log::debug!(
            "LED amplitudes: red {:#04x}, IR {:#04x}",
            leds.red,
            leds.infrared
        );
        self.leds = Some(leds);
        Ok(())
    }

    async fn read(&mut self) -> Result<PpgSample, SensorError> {
        if self.leds.is_none() {
            return Err(SensorError::ReadFailed {
                sensor: "synthetic PPG",
                operation: "read sample",
                details: "sensor not configured",
            });
        }
        let t = self.start.elapsed().as_secs_f64();
        Ok(self.sample_at(t))
    }
}
