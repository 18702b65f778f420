//! Node-wide run state and error types for pulse

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::sensors::SensorError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRunState {
    Uninitialized,
    SensorReady,
    Running,
    /// Sensor bring-up failed; the node only blinks the fault pattern.
    Fault,
}

/// Whether the telemetry link was usable at the last check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// How the node reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stop normal operation and show the fault pattern forever.
    Fatal,
    /// Drop this cycle's output and carry on.
    Transient,
    /// Drop the reading silently.
    Discarded,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    #[error("Sensor error: {0}")]
    Sensor(SensorError),
    #[error("Telemetry error: {0}")]
    Telemetry(TelemetryError),
    #[error("Configuration error: {0}")]
    Config(ConfigError),
}

impl NodeError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Sensor(e) => e.severity(),
            Self::Telemetry(_) => Severity::Transient,
            Self::Config(_) => Severity::Fatal,
        }
    }
}

impl From<SensorError> for NodeError {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}

impl From<TelemetryError> for NodeError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<ConfigError> for NodeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
