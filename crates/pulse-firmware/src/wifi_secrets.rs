//! Settings baked in at build time from `.env` (see `build.rs`).

use core::str::FromStr;

use pulse_core::config::{
    CollectorConfig, Config, ConfigError, DeviceConfig, InternetConfig,
};

macro_rules! env_or {
    ($key:literal, $default:expr) => {
        match option_env!($key) {
            Some(value) => value,
            None => $default,
        }
    };
}

pub const WIFI_SSID: &str = env_or!("WIFI_SSID", "");
pub const WIFI_PASSWORD: &str = env_or!("WIFI_PASSWORD", "");
pub const COLLECTOR_HOST: &str =
    env_or!("COLLECTOR_HOST", pulse_core::config::DEFAULT_COLLECTOR_HOST);
pub const COLLECTOR_PORT: &str = env_or!("COLLECTOR_PORT", "8888");
pub const DEVICE_ID: &str = env_or!("DEVICE_ID", pulse_core::config::DEFAULT_DEVICE_ID);
pub const LOG_LEVEL: &str = env_or!("LOG_LEVEL", "info");

/// Assemble and validate the node configuration.
pub fn config() -> Result<Config<'static>, ConfigError> {
    let port = u16::from_str(COLLECTOR_PORT).map_err(|_| ConfigError::InvalidCollectorPort)?;

    let config = Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        collector: CollectorConfig {
            host: COLLECTOR_HOST,
            port,
        },
        device: DeviceConfig { id: DEVICE_ID },
        log_level: LOG_LEVEL,
        ..Config::default()
    };
    config.validate()?;
    Ok(config)
}
