//! MAX30102 pulse oximeter driver
//!
//! Register-level driver over an async I2C bus. The part runs in SpO2 mode so
//! each FIFO entry carries a red and an infrared reading captured together.

use core::fmt::Debug;

use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

use super::{LedCurrents, PpgSample, PpgSensor, SensorError};

const SENSOR: &str = "MAX30102";

/// Fixed 7-bit bus address.
pub const MAX30102_ADDRESS: u8 = 0x57;

const REG_FIFO_WR_PTR: u8 = 0x04;
const REG_OVF_COUNTER: u8 = 0x05;
const REG_FIFO_RD_PTR: u8 = 0x06;
const REG_FIFO_DATA: u8 = 0x07;
const REG_FIFO_CONFIG: u8 = 0x08;
const REG_MODE_CONFIG: u8 = 0x09;
const REG_SPO2_CONFIG: u8 = 0x0A;
const REG_LED1_PA: u8 = 0x0C; // red
const REG_LED2_PA: u8 = 0x0D; // infrared
const REG_PART_ID: u8 = 0xFF;
const PART_ID_EXPECTED: u8 = 0x15;

const MODE_RESET: u8 = 0x40;
const MODE_SPO2: u8 = 0x03;

const FIFO_SAMPLE_AVERAGE_4: u8 = 0x40;
const FIFO_ROLLOVER_EN: u8 = 0x10;

const SPO2_ADC_RANGE_4096: u8 = 0x20;
const SPO2_SAMPLE_RATE_400: u8 = 0x0C;
const SPO2_PULSE_WIDTH_411: u8 = 0x03;

const FIFO_DEPTH: usize = 32;
const FIFO_PTR_MASK: u8 = 0x1F;
const BYTES_PER_SAMPLE: usize = 6;
const SAMPLE_MASK: u32 = 0x3_FFFF; // 18-bit ADC words
const RESET_POLL_LIMIT: usize = 100;

pub struct Max30102<I> {
    i2c: I,
    last: PpgSample,
}

impl<I: I2c> Max30102<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            last: PpgSample::default(),
        }
    }

    /// Give the bus back, e.g. to inspect it in tests.
    pub fn release(self) -> I {
        self.i2c
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(MAX30102_ADDRESS, &[register, value]).await
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(MAX30102_ADDRESS, &[register], &mut buf)
            .await?;
        Ok(buf[0])
    }

    async fn write_config(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.write_register(register, value).await.map_err(|e| {
            error!("MAX30102 write to {:#04x} failed: {:?}", register, e);
            SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "Failed to write configuration register",
            }
        })
    }

    /// Decode one FIFO entry: red word first, then infrared.
    fn decode(entry: &[u8]) -> PpgSample {
        let word = |b: &[u8]| {
            ((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])) & SAMPLE_MASK
        };
        PpgSample {
            red: word(&entry[0..3]),
            infrared: word(&entry[3..6]),
        }
    }
}

fn read_failed<E: Debug>(operation: &'static str) -> impl FnOnce(E) -> SensorError {
    move |e| {
        error!("MAX30102 failed to {}: {:?}", operation, e);
        SensorError::ReadFailed {
            sensor: SENSOR,
            operation,
            details: "I2C communication error",
        }
    }
}

impl<I: I2c> PpgSensor for Max30102<I> {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        let part_id = self.read_register(REG_PART_ID).await.map_err(|e| {
            error!("MAX30102 part id read failed: {:?}", e);
            SensorError::NotDetected { sensor: SENSOR }
        })?;

        if part_id != PART_ID_EXPECTED {
            error!("MAX30102 unexpected part id {:#04x}", part_id);
            return Err(SensorError::NotDetected { sensor: SENSOR });
        }

        self.write_config(REG_MODE_CONFIG, MODE_RESET).await?;

        for _ in 0..RESET_POLL_LIMIT {
            let mode = self.read_register(REG_MODE_CONFIG).await.map_err(|e| {
                error!("MAX30102 reset poll failed: {:?}", e);
                SensorError::InitializationFailed {
                    sensor: SENSOR,
                    details: "Failed to poll soft reset",
                }
            })?;
            if mode & MODE_RESET == 0 {
                info!("MAX30102 found and reset");
                return Ok(());
            }
        }

        Err(SensorError::InitializationFailed {
            sensor: SENSOR,
            details: "Soft reset did not complete",
        })
    }

    async fn configure(&mut self, leds: LedCurrents) -> Result<(), SensorError> {
        self.write_config(REG_FIFO_CONFIG, FIFO_SAMPLE_AVERAGE_4 | FIFO_ROLLOVER_EN)
            .await?;
        self.write_config(REG_MODE_CONFIG, MODE_SPO2).await?;
        self.write_config(
            REG_SPO2_CONFIG,
            SPO2_ADC_RANGE_4096 | SPO2_SAMPLE_RATE_400 | SPO2_PULSE_WIDTH_411,
        )
        .await?;
        self.write_config(REG_LED1_PA, leds.red).await?;
        self.write_config(REG_LED2_PA, leds.infrared).await?;

        self.write_config(REG_FIFO_WR_PTR, 0).await?;
        self.write_config(REG_OVF_COUNTER, 0).await?;
        self.write_config(REG_FIFO_RD_PTR, 0).await?;

        info!(
            "MAX30102 configured (SpO2 mode, 400 Hz / 4, LED red {:#04x} IR {:#04x})",
            leds.red, leds.infrared
        );
        Ok(())
    }

    async fn read(&mut self) -> Result<PpgSample, SensorError> {
        let write_ptr = self
            .read_register(REG_FIFO_WR_PTR)
            .await
            .map_err(read_failed("read FIFO write pointer"))?;
        let read_ptr = self
            .read_register(REG_FIFO_RD_PTR)
            .await
            .map_err(read_failed("read FIFO read pointer"))?;

        let overflow = self
            .read_register(REG_OVF_COUNTER)
            .await
            .map_err(read_failed("read FIFO overflow counter"))?;

        // A full FIFO has equal pointers; only the overflow counter tells it from empty.
        let pending = if overflow != 0 {
            debug!("MAX30102 FIFO overflowed, {} samples lost", overflow);
            FIFO_DEPTH
        } else {
            usize::from(write_ptr.wrapping_sub(read_ptr) & FIFO_PTR_MASK)
        };
        if pending == 0 {
            return Ok(self.last);
        }

        let len = pending * BYTES_PER_SAMPLE;
        let mut buf = [0u8; FIFO_DEPTH * BYTES_PER_SAMPLE];
        self.i2c
            .write_read(MAX30102_ADDRESS, &[REG_FIFO_DATA], &mut buf[..len])
            .await
            .map_err(read_failed("drain FIFO"))?;

        if pending > 1 {
            debug!("MAX30102 drained {} FIFO entries", pending);
        }
        if let Some(newest) = buf[..len].chunks_exact(BYTES_PER_SAMPLE).last() {
            self.last = Self::decode(newest);
        }
        Ok(self.last)
    }
}
