//! ESP32-S3 firmware-specific modules for pulse-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ESP32 peripheral initialization, the Wi-Fi + UDP telemetry link,
//! and build-time credential management.

#![no_std]

extern crate alloc;

pub mod hardware;
pub mod wifi_link;
pub mod wifi_secrets;
