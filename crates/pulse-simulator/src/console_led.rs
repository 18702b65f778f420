//! Status LED rendered as log lines.

use core::convert::Infallible;
use std::thread;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::debug;

/// Logs each level change of the status LED.
#[derive(Default)]
pub struct ConsoleLed {
    lit: Option<bool>,
}

impl ConsoleLed {
    fn show(&mut self, lit: bool) {
        if self.lit != Some(lit) {
            debug!("LED {}", if lit { "on" } else { "off" });
            self.lit = Some(lit);
        }
    }
}

impl ErrorType for ConsoleLed {
    type Error = Infallible;
}

impl OutputPin for ConsoleLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.show(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.show(true);
        Ok(())
    }
}

/// Blocking delay; the simulator runs one cycle at a time on a single thread.
pub struct SleepDelay;

impl DelayNs for SleepDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    async fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
