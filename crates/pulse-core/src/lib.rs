//! Hardware-independent core library for pulse-rs
//!
//! This crate contains all platform-agnostic logic for the pulse heart rate
//! node: the PPG sensor trait and MAX30102 driver, beat detection and BPM
//! averaging, the fixed-cadence UDP telemetry reporter, status LED patterns,
//! configuration, and the polling-cycle orchestration that ties them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod heart_rate;
pub mod indicator;
pub mod node;
pub mod sensors;
pub mod telemetry;
