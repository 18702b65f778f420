//! Pin and bus setup for the pulse node

use embassy_time::Instant;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::Config as I2cConfig;
use esp_hal::time::Rate;
use pulse_core::config::I2C_FREQUENCY_KHZ;
use pulse_core::telemetry::Clock;

pub type SensorBus = esp_hal::i2c::master::I2c<'static, esp_hal::Async>;

/// Initialize the I2C bus the MAX30102 hangs off
///
/// The bus speed is fixed here; the sensor driver never changes it.
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO8<'static>,
    scl: esp_hal::peripherals::GPIO9<'static>,
) -> SensorBus {
    esp_hal::i2c::master::I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )
    .expect("I2C0 rejected the bus configuration")
    .with_sda(sda)
    .with_scl(scl)
    .into_async()
}

/// Status LED on GPIO2, starting dark.
pub fn status_led(pin: esp_hal::peripherals::GPIO2<'static>) -> Output<'static> {
    Output::new(pin, Level::Low, OutputConfig::default())
}

/// The embassy time driver, started by `esp_rtos::start`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
