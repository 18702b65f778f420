mod max30102;

use thiserror_no_std::Error;

use crate::app_state::Severity;
use crate::config::{DEFAULT_LED_AMPLITUDE, FINGER_PRESENT_THRESHOLD, GOOD_CONTACT_THRESHOLD};

pub use max30102::*;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not detected on the bus")]
    NotDetected { sensor: &'static str },
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out waiting to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

impl SensorError {
    /// Bring-up failures are unrecoverable; anything after that only costs a cycle.
    pub fn severity(&self) -> Severity {
        match self {
            Self::NotDetected { .. } | Self::InitializationFailed { .. } => Severity::Fatal,
            Self::ReadFailed { .. } | Self::Timeout { .. } => Severity::Transient,
        }
    }
}

/// One infrared and one red reading taken from the same FIFO entry.
///
/// Taken once per polling cycle and shared by beat tracking and telemetry so
/// both see the same values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpgSample {
    pub infrared: u32,
    pub red: u32,
}

impl PpgSample {
    pub const fn new(infrared: u32, red: u32) -> Self {
        Self { infrared, red }
    }

    pub fn contact(&self) -> FingerContact {
        FingerContact::classify(self.infrared)
    }
}

/// Diagnostic classification of how well a finger covers the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerContact {
    Absent,
    Weak,
    Good,
}

impl FingerContact {
    pub const fn classify(infrared: u32) -> Self {
        if infrared < FINGER_PRESENT_THRESHOLD {
            Self::Absent
        } else if infrared < GOOD_CONTACT_THRESHOLD {
            Self::Weak
        } else {
            Self::Good
        }
    }

    pub const fn is_detected(self) -> bool {
        !matches!(self, Self::Absent)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Absent => "no finger detected - place finger on sensor",
            Self::Weak => "weak finger contact - press firmer",
            Self::Good => "good finger contact",
        }
    }
}

/// LED drive amplitudes written to the sensor's pulse-amplitude registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCurrents {
    pub red: u8,
    pub infrared: u8,
}

impl Default for LedCurrents {
    fn default() -> Self {
        Self {
            red: DEFAULT_LED_AMPLITUDE,
            infrared: DEFAULT_LED_AMPLITUDE,
        }
    }
}

/// Trait for PPG front-ends.
pub trait PpgSensor {
    /// Check the part is present and put it in a known state.
    fn initialize(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Apply acquisition settings and LED drive currents.
    fn configure(&mut self, leds: LedCurrents) -> impl Future<Output = Result<(), SensorError>>;

    /// Read the newest sample.
    fn read(&mut self) -> impl Future<Output = Result<PpgSample, SensorError>>;
}
