//! Node configuration
//!
//! Static settings loaded once at start-up: Wi-Fi credentials, the collector
//! endpoint, the device identity, reporting cadence and reconnect policy.
//! Firmware builds fill this from build-time environment variables; the
//! simulator can also parse it from JSON.

use core::net::Ipv4Addr;
use core::str::FromStr;

use log::{LevelFilter, error};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const POLL_INTERVAL_MS: u64 = 10;
pub const REPORT_INTERVAL_MS: u64 = 1000;
pub const BEAT_PULSE_MS: u64 = 50;
pub const FAULT_BLINK_MS: u32 = 100;

// ---------------------------------------------------------------------------
// Heart rate
// ---------------------------------------------------------------------------
pub const RATE_WINDOW_SIZE: usize = 4;
/// Exclusive lower bound for an accepted instantaneous reading.
pub const MIN_PLAUSIBLE_BPM: u32 = 40;
/// Exclusive upper bound for an accepted instantaneous reading.
pub const MAX_PLAUSIBLE_BPM: u32 = 200;

// ---------------------------------------------------------------------------
// Finger contact (raw infrared counts)
// ---------------------------------------------------------------------------
pub const FINGER_PRESENT_THRESHOLD: u32 = 20_000;
pub const GOOD_CONTACT_THRESHOLD: u32 = 50_000;

// ---------------------------------------------------------------------------
// Sensor bus
// ---------------------------------------------------------------------------
pub const I2C_FREQUENCY_KHZ: u32 = 400;
pub const SENSOR_MODEL: &str = "MAX30102";
pub const DEFAULT_LED_AMPLITUDE: u8 = 0x1F;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------
pub const DEFAULT_COLLECTOR_HOST: &str = "192.168.1.100";
pub const DEFAULT_COLLECTOR_PORT: u16 = 8888;
pub const DEFAULT_DEVICE_ID: &str = "device_1";
pub const DEVICE_ID_CAPACITY: usize = 32;

/// Owned device identity, bounded so it fits without an allocator.
pub type DeviceId = heapless::String<DEVICE_ID_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration could not be parsed")]
    Parse,
    #[error("Collector host is not an IPv4 address")]
    InvalidCollectorHost,
    #[error("Collector port must be non-zero")]
    InvalidCollectorPort,
    #[error("Device id must not be empty")]
    EmptyDeviceId,
    #[error("Device id exceeds {max} bytes")]
    DeviceIdTooLong { max: usize },
    #[error("Unknown log level")]
    InvalidLogLevel,
    #[error("Report interval must be non-zero")]
    ZeroReportInterval,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub collector: CollectorConfig<'a>,
    pub device: DeviceConfig<'a>,
    pub timing: TimingConfig,
    pub reconnect: ReconnectPolicy,
    pub log_level: &'a str,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            internet: InternetConfig::default(),
            collector: CollectorConfig::default(),
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
            reconnect: ReconnectPolicy::default(),
            log_level: "info",
        }
    }
}

impl<'a> Config<'a> {
    /// Parse a configuration document. Missing sections keep their defaults.
    pub fn from_json(json: &'a str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| {
            error!("Config parse failed: {}", e);
            ConfigError::Parse
        })
    }

    /// Check every derived value once so start-up fails early.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collector.endpoint()?;
        self.device.id()?;
        self.timing.check()?;
        self.log_filter()?;
        Ok(())
    }

    pub fn log_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(self.log_level).map_err(|_| ConfigError::InvalidLogLevel)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl InternetConfig<'_> {
    /// An empty SSID means the link cannot be brought up.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectorConfig<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl Default for CollectorConfig<'_> {
    fn default() -> Self {
        Self {
            host: DEFAULT_COLLECTOR_HOST,
            port: DEFAULT_COLLECTOR_PORT,
        }
    }
}

impl CollectorConfig<'_> {
    pub fn endpoint(&self) -> Result<CollectorEndpoint, ConfigError> {
        let addr = Ipv4Addr::from_str(self.host).map_err(|_| ConfigError::InvalidCollectorHost)?;
        if self.port == 0 {
            return Err(ConfigError::InvalidCollectorPort);
        }
        Ok(CollectorEndpoint {
            addr,
            port: self.port,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceConfig<'a> {
    pub id: &'a str,
}

impl Default for DeviceConfig<'_> {
    fn default() -> Self {
        Self {
            id: DEFAULT_DEVICE_ID,
        }
    }
}

impl DeviceConfig<'_> {
    pub fn id(&self) -> Result<DeviceId, ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        let mut id = DeviceId::new();
        id.push_str(self.id).map_err(|_| ConfigError::DeviceIdTooLong {
            max: DEVICE_ID_CAPACITY,
        })?;
        Ok(id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between polling cycles.
    pub poll_interval_ms: u64,
    /// Spacing of telemetry report slots.
    pub report_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            report_interval_ms: REPORT_INTERVAL_MS,
        }
    }
}

impl TimingConfig {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.report_interval_ms == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        Ok(())
    }
}

/// Bounded retry policy for bringing the link back.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u8,
    pub initial_backoff_ms: u32,
    pub max_backoff_ms: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl ReconnectPolicy {
    /// Wait after the failed attempt `attempt` (0-based): doubles each time,
    /// capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: u8) -> u32 {
        let factor = 1u32.checked_shl(u32::from(attempt)).unwrap_or(u32::MAX);
        self.initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

/// Where telemetry datagrams are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorEndpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl core::fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
