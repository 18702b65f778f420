//! Telemetry payload, link abstraction and the fixed-cadence reporter

mod reporter;

use alloc::vec::Vec;

use embassy_time::Instant;
use log::error;
use serde::Serialize;
use thiserror_no_std::Error;

use crate::config::{CollectorEndpoint, FINGER_PRESENT_THRESHOLD, SENSOR_MODEL};
use crate::sensors::PpgSample;

pub use reporter::*;

/// Failures reported by a [`TelemetryLink`] implementation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("Wi-Fi credentials are not configured")]
    NotConfigured,
    #[error("Failed to associate with the access point")]
    AssociationFailed,
    #[error("No IPv4 address acquired")]
    NoAddress,
    #[error("Link operation timed out")]
    Timeout,
    #[error("Socket I/O failed")]
    Io,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Link down at report time (restored: {restored})")]
    LinkDown { restored: bool },
    #[error("Link not restored after {attempts} attempts")]
    ReconnectExhausted { attempts: u8 },
    #[error("Datagram send failed: {0}")]
    Send(LinkError),
    #[error("Failed to encode telemetry payload")]
    Encode,
}

/// One report as it goes on the wire.
///
/// Serializes to a flat JSON object. Field order is the wire order.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySample<'a> {
    #[serde(rename = "user")]
    pub device_id: &'a str,
    pub bpm: u32,
    /// Milliseconds since boot.
    pub timestamp: u64,
    /// RSSI in dBm.
    pub signal_strength: i32,
    #[serde(rename = "ir_value")]
    pub infrared: u32,
    #[serde(rename = "red_value")]
    pub red: u32,
    pub finger_detected: bool,
    pub sensor_type: &'static str,
}

impl<'a> TelemetrySample<'a> {
    pub fn new(
        device_id: &'a str,
        bpm: u32,
        timestamp: u64,
        signal_strength: i32,
        sample: PpgSample,
    ) -> Self {
        Self {
            device_id,
            bpm,
            timestamp,
            signal_strength,
            infrared: sample.infrared,
            red: sample.red,
            finger_detected: sample.infrared >= FINGER_PRESENT_THRESHOLD,
            sensor_type: SENSOR_MODEL,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TelemetryError> {
        serde_json::to_vec(self).map_err(|e| {
            error!("Telemetry encode failed: {}", e);
            TelemetryError::Encode
        })
    }
}

/// Datagram transport to the collector.
pub trait TelemetryLink {
    /// Whether the link can carry a datagram right now.
    fn is_up(&self) -> bool;

    /// Received signal strength in dBm, 0 when unknown.
    fn signal_strength(&self) -> i32;

    /// One attempt at bringing the link back.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Best-effort, unacknowledged send.
    fn send(
        &mut self,
        endpoint: &CollectorEndpoint,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), LinkError>>;
}

/// Visible feedback for link transitions.
pub trait LinkIndicator {
    /// Called once per re-establishment attempt.
    fn connecting(&mut self);

    /// Called when the link is usable again.
    fn linked(&mut self);

    /// Called when the link is found down and when re-establishment gives up.
    fn disconnected(&mut self);
}

/// Source of the current time for code that blocks across a polling cycle.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let reading = PpgSample::new(81_234, 60_321);
        let sample = TelemetrySample::new("device_1", 72, 5000, -61, reading);
        let json = sample.encode().unwrap();

        assert_eq!(
            core::str::from_utf8(&json).unwrap(),
            r#"{"user":"device_1","bpm":72,"timestamp":5000,"signal_strength":-61,"ir_value":81234,"red_value":60321,"finger_detected":true,"sensor_type":"MAX30102"}"#
        );
    }

    #[test]
    fn test_no_finger_regardless_of_bpm() {
        let reading = PpgSample::new(15_000, 12_000);
        let sample = TelemetrySample::new("device_1", 88, 1000, -50, reading);
        assert!(!sample.finger_detected);

        let json = sample.encode().unwrap();
        let text = core::str::from_utf8(&json).unwrap();
        assert!(text.contains(r#""finger_detected":false"#), "payload was {}", text);
        assert!(text.contains(r#""bpm":88"#));
    }

    #[test]
    fn test_finger_threshold_is_inclusive() {
        let sample = TelemetrySample::new("d", 0, 0, 0, PpgSample::new(20_000, 0));
        assert!(sample.finger_detected);
    }
}
