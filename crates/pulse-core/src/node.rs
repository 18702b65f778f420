//! Polling-cycle orchestration
//!
//! [`HeartRateNode`] owns the sensor, the beat tracker, the telemetry reporter
//! and the status LED. Each [`HeartRateNode::cycle`] takes one sample snapshot
//! and hands the same values to beat tracking and telemetry.

use embassy_time::Instant;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{error, info, trace, warn};

use crate::app_state::{NodeError, NodeRunState};
use crate::heart_rate::{BeatDetector, BeatEvent, BeatTracker};
use crate::indicator::StatusLed;
use crate::sensors::{FingerContact, LedCurrents, PpgSample, PpgSensor, SensorError};
use crate::telemetry::{
    Clock, TelemetryError, TelemetryInput, TelemetryLink, TelemetryReporter, TickOutcome,
};

/// Everything that happened in one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub sample: PpgSample,
    pub contact: FingerContact,
    pub beat: Option<BeatEvent>,
    pub telemetry: Result<TickOutcome, TelemetryError>,
}

pub struct HeartRateNode<S, D, L, W, P, C> {
    sensor: S,
    tracker: BeatTracker<D>,
    reporter: TelemetryReporter<L, W, C>,
    led: StatusLed<P>,
    state: NodeRunState,
    last_contact: Option<FingerContact>,
}

impl<S, D, L, W, P, C> HeartRateNode<S, D, L, W, P, C>
where
    S: PpgSensor,
    D: BeatDetector,
    L: TelemetryLink,
    W: DelayNs,
    P: OutputPin,
    C: Clock,
{
    pub fn new(
        sensor: S,
        tracker: BeatTracker<D>,
        reporter: TelemetryReporter<L, W, C>,
        led: StatusLed<P>,
    ) -> Self {
        Self {
            sensor,
            tracker,
            reporter,
            led,
            state: NodeRunState::Uninitialized,
            last_contact: None,
        }
    }

    /// Bring up the sensor, then the link.
    ///
    /// A sensor failure leaves the node in [`NodeRunState::Fault`]; the caller
    /// is expected to hand over to [`Self::fault_loop`]. A link that cannot be
    /// established is not fatal, the reporter retries at each report slot.
    pub async fn start(&mut self, leds: LedCurrents) -> Result<(), NodeError> {
        info!("Initializing MAX30102...");
        if let Err(e) = self.bring_up_sensor(leds).await {
            error!("MAX30102 not available: {}", e);
            self.state = NodeRunState::Fault;
            return Err(e.into());
        }
        self.state = NodeRunState::SensorReady;
        info!("Sensor configured");

        if let Err(e) = self.reporter.connect(&mut self.led).await {
            warn!("Starting without a link: {}", e);
        }

        self.state = NodeRunState::Running;
        Ok(())
    }

    async fn bring_up_sensor(&mut self, leds: LedCurrents) -> Result<(), SensorError> {
        self.sensor.initialize().await?;
        self.sensor.configure(leds).await
    }

    /// One polling cycle at time `now`.
    ///
    /// A sensor read failure drops the whole cycle. Telemetry failures are
    /// reported in [`CycleReport::telemetry`] and never stop the node.
    pub async fn cycle(&mut self, now: Instant) -> Result<CycleReport, NodeError> {
        let sample = match self.sensor.read().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Dropping cycle: {}", e);
                self.led.poll(now);
                return Err(e.into());
            }
        };

        let contact = sample.contact();
        self.log_contact(contact, &sample);

        let beat = self.tracker.on_sample(now, sample.infrared);
        if beat.is_some() {
            self.led.beat_pulse(now);
        }
        self.led.poll(now);

        let input = TelemetryInput {
            bpm: self.tracker.current_average_bpm(),
            sample,
        };
        let telemetry = self.reporter.tick(now, &input, &mut self.led).await;

        Ok(CycleReport {
            sample,
            contact,
            beat,
            telemetry,
        })
    }

    fn log_contact(&mut self, contact: FingerContact, sample: &PpgSample) {
        trace!("{} (IR {}, red {})", contact.label(), sample.infrared, sample.red);
        if self.last_contact != Some(contact) {
            info!("{}: IR value {}", contact.label(), sample.infrared);
            self.last_contact = Some(contact);
        }
    }

    /// Blink the fault pattern forever.
    pub async fn fault_loop(&mut self, delay: &mut impl DelayNs) -> ! {
        self.state = NodeRunState::Fault;
        self.led.fault_loop(delay).await
    }

    pub fn run_state(&self) -> NodeRunState {
        self.state
    }

    pub fn current_average_bpm(&self) -> u32 {
        self.tracker.current_average_bpm()
    }

    pub fn tracker(&self) -> &BeatTracker<D> {
        &self.tracker
    }

    pub fn reporter(&self) -> &TelemetryReporter<L, W, C> {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut TelemetryReporter<L, W, C> {
        &mut self.reporter
    }

    pub fn led(&self) -> &StatusLed<P> {
        &self.led
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
