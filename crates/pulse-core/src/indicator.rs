//! Single status LED
//!
//! One output pin carries every state the node can be in:
//!
//! | State      | Pattern                                  |
//! |------------|------------------------------------------|
//! | Offline    | steady off                               |
//! | Connecting | toggles once per reconnect attempt       |
//! | Linked     | steady on                                |
//! | Beat       | inverted for 50 ms, then restored        |
//! | Fault      | toggles every 100 ms forever             |
//!
//! The beat pulse is non-blocking: [`StatusLed::beat_pulse`] inverts the
//! output and [`StatusLed::poll`] restores it once the pulse has elapsed.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::warn;

use crate::config::{BEAT_PULSE_MS, FAULT_BLINK_MS};
use crate::telemetry::LinkIndicator;

pub struct StatusLed<P> {
    pin: P,
    /// Level the LED returns to after a beat pulse.
    steady: bool,
    /// Level currently driven on the pin.
    output: bool,
    pulse_until: Option<Instant>,
}

impl<P: OutputPin> StatusLed<P> {
    /// Starts dark.
    pub fn new(pin: P) -> Self {
        let mut led = Self {
            pin,
            steady: false,
            output: true,
            pulse_until: None,
        };
        led.drive(false);
        led
    }

    fn drive(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.output = on,
            Err(e) => warn!("Status LED write failed: {:?}", e),
        }
    }

    /// Set the steady level, cancelling any pulse in progress.
    pub fn set(&mut self, on: bool) {
        self.steady = on;
        self.pulse_until = None;
        self.drive(on);
    }

    pub fn toggle(&mut self) {
        self.set(!self.steady);
    }

    /// Level currently on the pin.
    pub fn is_lit(&self) -> bool {
        self.output
    }

    pub fn is_pulsing(&self) -> bool {
        self.pulse_until.is_some()
    }

    /// Invert the LED for one beat. A beat during a pulse extends it.
    pub fn beat_pulse(&mut self, now: Instant) {
        self.pulse_until = Some(now + Duration::from_millis(BEAT_PULSE_MS));
        self.drive(!self.steady);
    }

    /// Restore the steady level once a beat pulse has run its course.
    pub fn poll(&mut self, now: Instant) {
        match self.pulse_until {
            Some(until) if now >= until => {
                self.pulse_until = None;
                self.drive(self.steady);
            }
            _ => {}
        }
    }

    /// One half-period of the fault pattern.
    pub async fn fault_step(&mut self, delay: &mut impl DelayNs) {
        self.toggle();
        delay.delay_ms(FAULT_BLINK_MS).await;
    }

    /// Blink the fault pattern until power is removed.
    pub async fn fault_loop(&mut self, delay: &mut impl DelayNs) -> ! {
        loop {
            self.fault_step(delay).await;
        }
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> LinkIndicator for StatusLed<P> {
    fn connecting(&mut self) {
        self.toggle();
    }

    fn linked(&mut self) {
        self.set(true);
    }

    fn disconnected(&mut self) {
        self.set(false);
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;
    use std::vec::Vec;

    use embassy_futures::block_on;
    use embedded_hal::digital::ErrorType;

    use super::*;

    #[derive(Default)]
    struct FakePin {
        levels: Vec<bool>,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.levels.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.levels.push(true);
            Ok(())
        }
    }

    struct CountingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits_ms.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    #[test]
    fn test_starts_dark() {
        let led = StatusLed::new(FakePin::default());
        assert!(!led.is_lit());
        assert_eq!(led.release().levels, [false]);
    }

    #[test]
    fn test_connecting_toggles_per_attempt() {
        let mut led = StatusLed::new(FakePin::default());
        led.connecting();
        led.connecting();
        led.connecting();
        assert!(led.is_lit());
        assert_eq!(led.release().levels, [false, true, false, true]);
    }

    #[test]
    fn test_linked_is_steady_on() {
        let mut led = StatusLed::new(FakePin::default());
        led.connecting();
        led.connecting();
        led.linked();
        assert!(led.is_lit());
    }

    #[test]
    fn test_giving_up_after_odd_attempts_goes_dark() {
        let mut led = StatusLed::new(FakePin::default());
        for _ in 0..5 {
            led.connecting();
        }
        assert!(led.is_lit(), "odd number of toggles leaves it lit");

        led.disconnected();
        assert!(!led.is_lit());
        assert!(!led.is_pulsing());
    }

    #[test]
    fn test_beat_pulse_inverts_then_restores() {
        let mut led = StatusLed::new(FakePin::default());
        led.linked();

        let t0 = Instant::from_millis(10_000);
        led.beat_pulse(t0);
        assert!(!led.is_lit(), "pulse inverts a lit LED");

        led.poll(t0 + Duration::from_millis(49));
        assert!(!led.is_lit(), "still within the pulse");

        led.poll(t0 + Duration::from_millis(50));
        assert!(led.is_lit(), "restored after 50 ms");
        assert!(!led.is_pulsing());
    }

    #[test]
    fn test_beat_pulse_on_dark_led_flashes_on() {
        let mut led = StatusLed::new(FakePin::default());
        let t0 = Instant::from_millis(500);
        led.beat_pulse(t0);
        assert!(led.is_lit());
        led.poll(t0 + Duration::from_millis(60));
        assert!(!led.is_lit());
    }

    #[test]
    fn test_fault_pattern_blinks_every_100_ms() {
        let mut led = StatusLed::new(FakePin::default());
        let mut delay = CountingDelay {
            waits_ms: Vec::new(),
        };

        for _ in 0..4 {
            block_on(led.fault_step(&mut delay));
        }

        assert_eq!(delay.waits_ms, [100, 100, 100, 100]);
        assert_eq!(led.release().levels, [false, true, false, true, false]);
    }
}
