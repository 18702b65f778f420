//! Host UDP link with scheduled outages.

use std::net::{SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use log::{info, warn};

use pulse_core::config::CollectorEndpoint;
use pulse_core::telemetry::{LinkError, TelemetryLink};

/// Reconnect attempts that fail before an outage clears.
const FAILED_ATTEMPTS_PER_OUTAGE: u8 = 1;

pub struct HostUdpLink {
    socket: UdpSocket,
    started: Instant,
    /// Outage cadence; `None` keeps the link up forever.
    drop_every: Option<Duration>,
    next_drop: Option<Instant>,
    failures_left: u8,
    associated: bool,
}

impl HostUdpLink {
    pub fn bind(drop_every: Option<Duration>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        info!("Telemetry socket bound to {}", socket.local_addr()?);

        let started = Instant::now();
        Ok(Self {
            socket,
            started,
            drop_every,
            next_drop: drop_every.map(|every| started + every),
            failures_left: 0,
            associated: false,
        })
    }

    fn outage_due(&self) -> bool {
        self.next_drop.is_some_and(|at| Instant::now() >= at)
    }
}

impl TelemetryLink for HostUdpLink {
    fn is_up(&self) -> bool {
        self.associated && !self.outage_due()
    }

    fn signal_strength(&self) -> i32 {
        // Slow wobble around -58 dBm.
        let t = self.started.elapsed().as_secs_f64();
        -58 + (6.0 * (t / 20.0).sin()) as i32
    }

    async fn reconnect(&mut self) -> Result<(), LinkError> {
        if self.outage_due() {
            warn!("Simulated outage in progress");
            self.associated = false;
            self.failures_left = FAILED_ATTEMPTS_PER_OUTAGE;
            self.next_drop = self.drop_every.map(|every| Instant::now() + every);
        }

        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(LinkError::AssociationFailed);
        }

        self.associated = true;
        info!("Simulated link associated");
        Ok(())
    }

    async fn send(
        &mut self,
        endpoint: &CollectorEndpoint,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let remote = SocketAddrV4::new(endpoint.addr, endpoint.port);
        match self.socket.send_to(payload, remote) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("UDP send to {} failed: {}", remote, e);
                Err(LinkError::Io)
            }
        }
    }
}
