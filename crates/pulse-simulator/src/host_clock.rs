//! Wall-clock time since simulator start, as an embassy `Instant`.

use std::time::Instant as StdInstant;

use embassy_time::Instant;
use pulse_core::telemetry::Clock;

#[derive(Clone, Copy)]
pub struct HostClock {
    started: StdInstant,
}

impl HostClock {
    pub fn start() -> Self {
        Self {
            started: StdInstant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.started.elapsed().as_micros() as u64)
    }
}
