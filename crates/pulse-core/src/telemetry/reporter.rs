//! Fixed-cadence telemetry reporter
//!
//! [`TelemetryReporter::tick`] is called every polling cycle and gates itself
//! on a reporting grid. When a slot is due it either sends one datagram or, if
//! the link is down, spends the cycle re-establishing it with bounded
//! exponential backoff. Missed slots are never caught up.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use super::{Clock, LinkIndicator, TelemetryError, TelemetryLink, TelemetrySample};
use crate::app_state::LinkState;
use crate::config::{CollectorEndpoint, DeviceId, ReconnectPolicy};
use crate::sensors::PpgSample;

/// What the reporter needs from the current polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryInput {
    /// Averaged BPM, 0 when no beat has been accepted yet.
    pub bpm: u32,
    pub sample: PpgSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No report slot was due.
    Idle,
    /// One datagram of `bytes` bytes went out.
    Sent { bytes: usize },
}

pub struct TelemetryReporter<L, W, C> {
    link: L,
    delay: W,
    clock: C,
    endpoint: CollectorEndpoint,
    device_id: DeviceId,
    interval: Duration,
    policy: ReconnectPolicy,

    link_state: LinkState,
    last_send: Option<Instant>,
    next_due: Instant,
    datagrams_sent: u32,
    cycles_dropped: u32,
}

impl<L: TelemetryLink, W: DelayNs, C: Clock> TelemetryReporter<L, W, C> {
    /// The first slot falls one interval after boot.
    pub fn new(
        link: L,
        delay: W,
        clock: C,
        endpoint: CollectorEndpoint,
        device_id: DeviceId,
        interval: Duration,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            link,
            delay,
            clock,
            endpoint,
            device_id,
            interval,
            policy,
            link_state: LinkState::Disconnected,
            last_send: None,
            next_due: Instant::from_ticks(0) + interval,
            datagrams_sent: 0,
            cycles_dropped: 0,
        }
    }

    /// Initial association at start-up.
    pub async fn connect(
        &mut self,
        indicator: &mut impl LinkIndicator,
    ) -> Result<(), TelemetryError> {
        if self.link.is_up() {
            self.link_state = LinkState::Connected;
            indicator.linked();
            return Ok(());
        }
        self.reestablish(indicator).await
    }

    pub async fn tick(
        &mut self,
        now: Instant,
        input: &TelemetryInput,
        indicator: &mut impl LinkIndicator,
    ) -> Result<TickOutcome, TelemetryError> {
        if now < self.next_due {
            return Ok(TickOutcome::Idle);
        }

        if !self.link.is_up() {
            warn!("Link down at report slot, skipping send");
            self.link_state = LinkState::Disconnected;
            indicator.disconnected();
            self.cycles_dropped = self.cycles_dropped.saturating_add(1);

            let result = self.reestablish(indicator).await;
            // Slots that went by while blocked in reconnect are skipped.
            let resumed = self.clock.now().max(now);
            self.next_due = self.next_slot_after(resumed);

            return match result {
                Ok(()) => Err(TelemetryError::LinkDown { restored: true }),
                Err(e) => Err(e),
            };
        }

        self.link_state = LinkState::Connected;
        // At most one datagram per interval, even if this one fails.
        self.next_due = now + self.interval;

        let report = TelemetrySample::new(
            &self.device_id,
            input.bpm,
            now.as_millis(),
            self.link.signal_strength(),
            input.sample,
        );
        let payload = match report.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.cycles_dropped = self.cycles_dropped.saturating_add(1);
                return Err(e);
            }
        };

        if let Err(e) = self.link.send(&self.endpoint, &payload).await {
            error!("Telemetry send to {} failed: {}", self.endpoint, e);
            self.cycles_dropped = self.cycles_dropped.saturating_add(1);
            return Err(TelemetryError::Send(e));
        }

        self.last_send = Some(now);
        self.datagrams_sent = self.datagrams_sent.saturating_add(1);
        debug!(
            "Sent {} bytes to {} (bpm {})",
            payload.len(),
            self.endpoint,
            input.bpm
        );
        Ok(TickOutcome::Sent {
            bytes: payload.len(),
        })
    }

    async fn reestablish(
        &mut self,
        indicator: &mut impl LinkIndicator,
    ) -> Result<(), TelemetryError> {
        let attempts = self.policy.max_attempts;

        for attempt in 0..attempts {
            indicator.connecting();
            info!("Reconnecting (attempt {}/{})", attempt + 1, attempts);

            match self.link.reconnect().await {
                Ok(()) => {
                    self.link_state = LinkState::Connected;
                    indicator.linked();
                    info!("Link restored");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    if attempt + 1 < attempts {
                        self.delay.delay_ms(self.policy.backoff_ms(attempt)).await;
                    }
                }
            }
        }

        self.link_state = LinkState::Disconnected;
        indicator.disconnected();
        error!("Link not restored after {} attempts", attempts);
        Err(TelemetryError::ReconnectExhausted { attempts })
    }

    /// First grid slot strictly after `now`.
    fn next_slot_after(&self, now: Instant) -> Instant {
        let interval = self.interval.as_ticks().max(1);
        let behind = now.as_ticks().saturating_sub(self.next_due.as_ticks());
        let skipped = behind / interval + 1;
        self.next_due + Duration::from_ticks(skipped * interval)
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn last_send_time(&self) -> Option<Instant> {
        self.last_send
    }

    pub fn next_report_at(&self) -> Instant {
        self.next_due
    }

    pub fn datagrams_sent(&self) -> u32 {
        self.datagrams_sent
    }

    pub fn cycles_dropped(&self) -> u32 {
        self.cycles_dropped
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::vec::Vec;

    use embassy_futures::block_on;

    use super::*;
    use crate::telemetry::LinkError;

    #[derive(Default)]
    struct FakeLink {
        up: bool,
        /// Results handed out by successive reconnect calls; empty means success.
        reconnect_results: Vec<Result<(), LinkError>>,
        reconnect_calls: usize,
        send_error: Option<LinkError>,
        sent: Vec<Vec<u8>>,
        /// Time each reconnect call spends blocked.
        reconnect_cost: Duration,
        clock: ManualClock,
    }

    /// Shared synthetic time; the link advances it while reconnecting.
    #[derive(Clone)]
    struct ManualClock(Rc<Cell<Instant>>);

    impl Default for ManualClock {
        fn default() -> Self {
            Self(Rc::new(Cell::new(Instant::from_ticks(0))))
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    impl TelemetryLink for FakeLink {
        fn is_up(&self) -> bool {
            self.up
        }

        fn signal_strength(&self) -> i32 {
            -61
        }

        async fn reconnect(&mut self) -> Result<(), LinkError> {
            self.reconnect_calls += 1;
            let clock = &self.clock.0;
            clock.set(clock.get() + self.reconnect_cost);
            let result = if self.reconnect_results.is_empty() {
                Ok(())
            } else {
                self.reconnect_results.remove(0)
            };
            self.up = result.is_ok();
            result
        }

        async fn send(
            &mut self,
            _endpoint: &CollectorEndpoint,
            payload: &[u8],
        ) -> Result<(), LinkError> {
            if let Some(e) = self.send_error {
                return Err(e);
            }
            self.sent.push(payload.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits_ms.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    #[derive(Default)]
    struct Transitions {
        connecting: usize,
        linked: usize,
        disconnected: usize,
    }

    impl LinkIndicator for Transitions {
        fn connecting(&mut self) {
            self.connecting += 1;
        }

        fn linked(&mut self) {
            self.linked += 1;
        }

        fn disconnected(&mut self) {
            self.disconnected += 1;
        }
    }

    type TestReporter = TelemetryReporter<FakeLink, RecordingDelay, ManualClock>;

    fn reporter(link: FakeLink) -> TestReporter {
        let mut device_id = DeviceId::new();
        device_id.push_str("device_1").unwrap();
        let clock = link.clock.clone();
        TelemetryReporter::new(
            link,
            RecordingDelay::default(),
            clock,
            CollectorEndpoint {
                addr: core::net::Ipv4Addr::new(192, 168, 1, 100),
                port: 8888,
            },
            device_id,
            Duration::from_millis(1000),
            ReconnectPolicy::default(),
        )
    }

    fn up_link() -> FakeLink {
        FakeLink {
            up: true,
            ..FakeLink::default()
        }
    }

    const INPUT: TelemetryInput = TelemetryInput {
        bpm: 72,
        sample: PpgSample::new(81_234, 60_321),
    };

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_first_slot_is_one_interval_after_boot() {
        let mut reporter = reporter(up_link());
        let mut led = Transitions::default();

        let idle = block_on(reporter.tick(at(999), &INPUT, &mut led)).unwrap();
        assert_eq!(idle, TickOutcome::Idle);

        let sent = block_on(reporter.tick(at(1000), &INPUT, &mut led)).unwrap();
        assert!(matches!(sent, TickOutcome::Sent { .. }));
        assert_eq!(reporter.last_send_time(), Some(at(1000)));
        assert_eq!(reporter.next_report_at(), at(2000));
    }

    #[test]
    fn test_payload_contents() {
        let mut reporter = reporter(up_link());
        let mut led = Transitions::default();

        block_on(reporter.tick(at(5000), &INPUT, &mut led)).unwrap();

        let payload = &reporter.link().sent[0];
        assert_eq!(
            core::str::from_utf8(payload).unwrap(),
            r#"{"user":"device_1","bpm":72,"timestamp":5000,"signal_strength":-61,"ir_value":81234,"red_value":60321,"finger_detected":true,"sensor_type":"MAX30102"}"#
        );
    }

    #[test]
    fn test_one_datagram_per_interval_under_fast_polling() {
        let mut reporter = reporter(up_link());
        let mut led = Transitions::default();

        // Poll every 10 ms for 5 s.
        for ms in (0..5000).step_by(10) {
            block_on(reporter.tick(at(ms), &INPUT, &mut led)).unwrap();
        }

        assert_eq!(reporter.link().sent.len(), 4, "slots at 1000, 2000, 3000, 4000");
        assert_eq!(reporter.datagrams_sent(), 4);
    }

    #[test]
    fn test_link_down_skips_send_and_reconnects_once() {
        let mut reporter = reporter(up_link());
        let mut led = Transitions::default();

        block_on(reporter.tick(at(1000), &INPUT, &mut led)).unwrap();
        reporter.link_mut().up = false;

        let err = block_on(reporter.tick(at(2000), &INPUT, &mut led)).unwrap_err();
        assert_eq!(err, TelemetryError::LinkDown { restored: true });
        assert_eq!(reporter.link().reconnect_calls, 1);
        assert_eq!(reporter.link().sent.len(), 1, "no datagram while down");
        assert_eq!(reporter.last_send_time(), Some(at(1000)), "last send not advanced");
        assert_eq!(reporter.link_state(), LinkState::Connected);
        assert_eq!(led.disconnected, 1);
        assert_eq!(led.connecting, 1);
        assert_eq!(led.linked, 1);

        // No catch-up on the following cycle.
        let idle = block_on(reporter.tick(at(2010), &INPUT, &mut led)).unwrap();
        assert_eq!(idle, TickOutcome::Idle);

        // Next natural slot proceeds.
        assert_eq!(reporter.next_report_at(), at(3000));
        let sent = block_on(reporter.tick(at(3000), &INPUT, &mut led)).unwrap();
        assert!(matches!(sent, TickOutcome::Sent { .. }));
        assert_eq!(reporter.link().sent.len(), 2);
        assert_eq!(reporter.cycles_dropped(), 1);
    }

    #[test]
    fn test_late_outage_skips_consumed_slots() {
        let mut reporter = reporter(FakeLink::default());
        let mut led = Transitions::default();

        // The poll arrives 2.5 intervals after the due slot.
        let _ = block_on(reporter.tick(at(3500), &INPUT, &mut led));
        assert_eq!(reporter.next_report_at(), at(4000));
    }

    #[test]
    fn test_reconnect_is_bounded_with_backoff() {
        let link = FakeLink {
            up: false,
            reconnect_results: std::vec![Err(LinkError::AssociationFailed); 5],
            ..FakeLink::default()
        };
        let mut reporter = reporter(link);
        let mut led = Transitions::default();

        let err = block_on(reporter.tick(at(1000), &INPUT, &mut led)).unwrap_err();
        assert_eq!(err, TelemetryError::ReconnectExhausted { attempts: 5 });
        assert_eq!(reporter.link().reconnect_calls, 5);
        assert_eq!(reporter.delay.waits_ms, [500, 1000, 2000, 4000]);
        assert_eq!(led.connecting, 5);
        assert_eq!(led.linked, 0);
        assert_eq!(led.disconnected, 2, "once when found down, once when given up");
        assert_eq!(reporter.link_state(), LinkState::Disconnected);
        assert_eq!(reporter.last_send_time(), None);
    }

    #[test]
    fn test_reconnect_succeeds_after_failures() {
        let link = FakeLink {
            up: false,
            reconnect_results: std::vec![Err(LinkError::Timeout), Err(LinkError::NoAddress)],
            ..FakeLink::default()
        };
        let mut reporter = reporter(link);
        let mut led = Transitions::default();

        block_on(reporter.connect(&mut led)).unwrap();
        assert_eq!(reporter.link().reconnect_calls, 3);
        assert_eq!(reporter.delay.waits_ms, [500, 1000]);
        assert_eq!(reporter.link_state(), LinkState::Connected);
    }

    #[test]
    fn test_connect_when_already_up() {
        let mut reporter = reporter(up_link());
        let mut led = Transitions::default();

        block_on(reporter.connect(&mut led)).unwrap();
        assert_eq!(reporter.link().reconnect_calls, 0);
        assert_eq!(led.linked, 1);
    }

    #[test]
    fn test_send_failure_still_consumes_the_slot() {
        let link = FakeLink {
            up: true,
            send_error: Some(LinkError::Io),
            ..FakeLink::default()
        };
        let mut reporter = reporter(link);
        let mut led = Transitions::default();

        let err = block_on(reporter.tick(at(1000), &INPUT, &mut led)).unwrap_err();
        assert_eq!(err, TelemetryError::Send(LinkError::Io));
        assert_eq!(reporter.last_send_time(), None);
        assert_eq!(reporter.next_report_at(), at(2000));

        let idle = block_on(reporter.tick(at(1500), &INPUT, &mut led)).unwrap();
        assert_eq!(idle, TickOutcome::Idle);
    }

    #[test]
    fn test_slots_passed_while_reconnecting_are_skipped() {
        let link = FakeLink {
            up: true,
            reconnect_cost: Duration::from_millis(1500),
            ..FakeLink::default()
        };
        let mut reporter = reporter(link);
        let mut led = Transitions::default();

        block_on(reporter.tick(at(1000), &INPUT, &mut led)).unwrap();
        reporter.link_mut().up = false;
        reporter.link().clock.0.set(at(2000));

        // Reconnect blocks from 2000 until 3500.
        let err = block_on(reporter.tick(at(2000), &INPUT, &mut led)).unwrap_err();
        assert_eq!(err, TelemetryError::LinkDown { restored: true });
        assert_eq!(reporter.next_report_at(), at(4000));

        let idle = block_on(reporter.tick(at(3510), &INPUT, &mut led)).unwrap();
        assert_eq!(idle, TickOutcome::Idle, "no send right after recovery");

        let sent = block_on(reporter.tick(at(4000), &INPUT, &mut led)).unwrap();
        assert!(matches!(sent, TickOutcome::Sent { .. }));
        assert_eq!(reporter.link().sent.len(), 2);
    }
}
