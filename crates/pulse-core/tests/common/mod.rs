//! Hand-written fakes shared by the scenario tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;

use pulse_core::config::{CollectorEndpoint, DeviceId, ReconnectPolicy};
use pulse_core::heart_rate::{BeatTracker, PbaBeatDetector};
use pulse_core::indicator::StatusLed;
use pulse_core::node::HeartRateNode;
use pulse_core::sensors::{LedCurrents, PpgSample, PpgSensor, SensorError};
use pulse_core::telemetry::{Clock, LinkError, TelemetryLink, TelemetryReporter};

/// Synthetic PPG waveform: `dc` plus a sine of `amplitude` counts at `bpm`,
/// sampled every 10 ms. Exactly periodic when 6000 is divisible by `bpm`.
pub fn ppg_wave(n: u64, bpm: u64, dc: f64, amplitude: f64) -> u32 {
    let samples_per_beat = 6000 / bpm;
    let phase = (n % samples_per_beat) as f64 / samples_per_beat as f64;
    (dc + amplitude * (2.0 * core::f64::consts::PI * phase).sin()) as u32
}

/// Sensor that replays a generated waveform, one sample per read.
pub struct WaveSensor {
    pub present: bool,
    pub next: u64,
    pub bpm: u64,
    pub dc: f64,
    pub fail_reads: VecDeque<bool>,
    pub configured_with: Option<LedCurrents>,
}

impl WaveSensor {
    pub fn new(bpm: u64, dc: f64) -> Self {
        Self {
            present: true,
            next: 0,
            bpm,
            dc,
            fail_reads: VecDeque::new(),
            configured_with: None,
        }
    }
}

impl PpgSensor for WaveSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::NotDetected { sensor: "MAX30102" })
        }
    }

    async fn configure(&mut self, leds: LedCurrents) -> Result<(), SensorError> {
        self.configured_with = Some(leds);
        Ok(())
    }

    async fn read(&mut self) -> Result<PpgSample, SensorError> {
        if self.fail_reads.pop_front().unwrap_or(false) {
            return Err(SensorError::ReadFailed {
                sensor: "MAX30102",
                operation: "read FIFO",
                details: "I2C communication error",
            });
        }
        let n = self.next;
        self.next += 1;
        let infrared = ppg_wave(n, self.bpm, self.dc, 300.0);
        let red = ppg_wave(n, self.bpm, self.dc * 0.8, 200.0);
        Ok(PpgSample::new(infrared, red))
    }
}

#[derive(Default)]
pub struct FakeLink {
    pub up: bool,
    pub reconnect_failures: usize,
    pub reconnect_calls: usize,
    pub datagrams: Vec<(CollectorEndpoint, String)>,
}

impl TelemetryLink for FakeLink {
    fn is_up(&self) -> bool {
        self.up
    }

    fn signal_strength(&self) -> i32 {
        -55
    }

    async fn reconnect(&mut self) -> Result<(), LinkError> {
        self.reconnect_calls += 1;
        if self.reconnect_failures > 0 {
            self.reconnect_failures -= 1;
            return Err(LinkError::AssociationFailed);
        }
        self.up = true;
        Ok(())
    }

    async fn send(
        &mut self,
        endpoint: &CollectorEndpoint,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let text = String::from_utf8(payload.to_vec()).map_err(|_| LinkError::Io)?;
        self.datagrams.push((*endpoint, text));
        Ok(())
    }
}

/// Returns immediately, remembering what was asked for.
#[derive(Default)]
pub struct InstantDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

#[derive(Default)]
pub struct FakePin {
    pub high: bool,
    pub writes: usize,
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}

/// Clock that never moves; the scenarios pass time to `cycle` explicitly.
#[derive(Default)]
pub struct StoppedClock;

impl Clock for StoppedClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(0)
    }
}

pub type TestNode =
    HeartRateNode<WaveSensor, PbaBeatDetector, FakeLink, InstantDelay, FakePin, StoppedClock>;

pub fn endpoint() -> CollectorEndpoint {
    CollectorEndpoint {
        addr: core::net::Ipv4Addr::new(192, 168, 1, 100),
        port: 8888,
    }
}

pub fn node(sensor: WaveSensor, link: FakeLink) -> TestNode {
    let mut device_id = DeviceId::new();
    device_id.push_str("device_1").unwrap();

    let reporter = TelemetryReporter::new(
        link,
        InstantDelay::default(),
        StoppedClock,
        endpoint(),
        device_id,
        Duration::from_millis(1000),
        ReconnectPolicy::default(),
    );
    HeartRateNode::new(
        sensor,
        BeatTracker::new(PbaBeatDetector::new()),
        reporter,
        StatusLed::new(FakePin::default()),
    )
}
