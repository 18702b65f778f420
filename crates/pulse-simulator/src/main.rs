//! Desktop simulator for the pulse-rs heart rate node.
//!
//! Runs the real `HeartRateNode` from pulse-core against a synthetic PPG
//! sensor, a host UDP socket and a console LED, so the beat pipeline and the
//! telemetry reporter can be exercised without hardware.
//!
//! # Environment
//!
//! | Variable                   | Meaning                                         |
//! |----------------------------|-------------------------------------------------|
//! | `PULSE_CONFIG`             | path to a JSON config file (overrides the rest) |
//! | `COLLECTOR_HOST`           | collector IPv4 address                          |
//! | `COLLECTOR_PORT`           | collector UDP port                              |
//! | `DEVICE_ID`                | value of the `user` field                       |
//! | `LOG_LEVEL`                | default log level when `RUST_LOG` is unset      |
//! | `SIM_LINK_DROP_EVERY_SECS` | knock the link out periodically                 |
//! | `SIM_LISTEN`               | `1` to run a loopback collector                 |
//! | `SIM_DURATION_SECS`        | stop after this many seconds                    |
//!
//! A `.env` file in the working directory is loaded first.

mod console_led;
mod host_clock;
mod mock_sensor;
mod udp_link;

use std::env;
use std::fs;
use std::net::UdpSocket;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use embassy_futures::block_on;
use log::{error, info, warn};

use pulse_core::app_state::Severity;
use pulse_core::config::{CollectorConfig, Config, ConfigError, DeviceConfig};
use pulse_core::heart_rate::{BeatTracker, PbaBeatDetector};
use pulse_core::indicator::StatusLed;
use pulse_core::node::HeartRateNode;
use pulse_core::sensors::LedCurrents;
use pulse_core::telemetry::{Clock, TelemetryReporter, TickOutcome};

use console_led::{ConsoleLed, SleepDelay};
use host_clock::HostClock;
use mock_sensor::SyntheticPpg;
use udp_link::HostUdpLink;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Owned copies of the environment so `Config` can borrow from them.
struct EnvSettings {
    collector_host: Option<String>,
    collector_port: Option<String>,
    device_id: Option<String>,
    log_level: Option<String>,
}

impl EnvSettings {
    fn read() -> Self {
        Self {
            collector_host: env::var("COLLECTOR_HOST").ok(),
            collector_port: env::var("COLLECTOR_PORT").ok(),
            device_id: env::var("DEVICE_ID").ok(),
            log_level: env::var("LOG_LEVEL").ok(),
        }
    }

    fn config(&self) -> Result<Config<'_>, ConfigError> {
        let defaults = Config::default();
        let port = match &self.collector_port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidCollectorPort)?,
            None => defaults.collector.port,
        };

        Ok(Config {
            collector: CollectorConfig {
                host: self
                    .collector_host
                    .as_deref()
                    .unwrap_or(defaults.collector.host),
                port,
            },
            device: DeviceConfig {
                id: self.device_id.as_deref().unwrap_or(defaults.device.id),
            },
            log_level: self.log_level.as_deref().unwrap_or(defaults.log_level),
            ..defaults
        })
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    let secs = env::var(key).ok()?.parse::<u64>().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

// ---------------------------------------------------------------------------
// Loopback collector
// ---------------------------------------------------------------------------

/// Bind the collector port locally and log every datagram that arrives.
fn spawn_collector(port: u16) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    info!("Loopback collector listening on {}", socket.local_addr()?);

    thread::spawn(move || {
        let mut buf = [0u8; 1024];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    info!(
                        "collector <- {}: {}",
                        from,
                        String::from_utf8_lossy(&buf[..len])
                    );
                }
                Err(e) => {
                    warn!("Collector receive failed: {}", e);
                    return;
                }
            }
        }
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let _ = dotenvy::dotenv();

    let file_text = env::var("PULSE_CONFIG")
        .ok()
        .map(|path| fs::read_to_string(&path).map_err(|e| (path, e)));
    let env_settings = EnvSettings::read();

    let config = match &file_text {
        Some(Ok(text)) => Config::from_json(text),
        Some(Err(_)) => Err(ConfigError::Parse),
        None => env_settings.config(),
    }
    .and_then(|config| config.validate().map(|()| config));

    let default_level = config.as_ref().map_or("info", |c| c.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Some(Err((path, e))) = &file_text {
        error!("Cannot read {}: {}", path, e);
    }
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    info!("Starting pulse-rs simulator");

    // `validate` has already checked these.
    let (endpoint, device_id) = match (config.collector.endpoint(), config.device.id()) {
        (Ok(endpoint), Ok(device_id)) => (endpoint, device_id),
        (Err(e), _) | (_, Err(e)) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if env::var("SIM_LISTEN").is_ok_and(|v| v == "1") {
        if !endpoint.addr.is_loopback() {
            warn!(
                "Loopback collector enabled but datagrams go to {}; set COLLECTOR_HOST=127.0.0.1",
                endpoint
            );
        }
        if let Err(e) = spawn_collector(endpoint.port) {
            error!("Cannot start loopback collector: {}", e);
            process::exit(1);
        }
    }

    let drop_every = env_secs("SIM_LINK_DROP_EVERY_SECS");
    if let Some(every) = drop_every {
        info!("Link outage every {} s", every.as_secs());
    }
    let link = match HostUdpLink::bind(drop_every) {
        Ok(link) => link,
        Err(e) => {
            error!("Cannot open telemetry socket: {}", e);
            process::exit(1);
        }
    };

    let clock = HostClock::start();
    let reporter = TelemetryReporter::new(
        link,
        SleepDelay,
        clock,
        endpoint,
        device_id,
        embassy_time::Duration::from_millis(config.timing.report_interval_ms),
        config.reconnect,
    );
    let mut node = HeartRateNode::new(
        SyntheticPpg::new(),
        BeatTracker::new(PbaBeatDetector::new()),
        reporter,
        StatusLed::new(ConsoleLed::default()),
    );

    if let Err(e) = block_on(node.start(LedCurrents::default())) {
        if e.severity() == Severity::Fatal {
            error!("Sensor bring-up failed: {}", e);
            block_on(node.fault_loop(&mut SleepDelay));
        }
        warn!("Start-up degraded: {}", e);
    }
    info!("Sending telemetry to {} as {}", endpoint, config.device.id);

    // -----------------------------------------------------------------------
    // Polling loop
    // -----------------------------------------------------------------------
    let poll = Duration::from_millis(config.timing.poll_interval_ms);
    let run_for = env_secs("SIM_DURATION_SECS");

    loop {
        let cycle_start = Instant::now();
        let now = clock.now();

        match block_on(node.cycle(now)) {
            Ok(report) => {
                if let Ok(TickOutcome::Sent { bytes }) = report.telemetry {
                    info!(
                        "Report: {} BPM, IR {} ({} bytes)",
                        node.current_average_bpm(),
                        report.sample.infrared,
                        bytes
                    );
                }
            }
            Err(e) => warn!("Cycle dropped: {}", e),
        }

        if run_for.is_some_and(|limit| clock.elapsed() >= limit) {
            break;
        }

        let elapsed = cycle_start.elapsed();
        if elapsed < poll {
            thread::sleep(poll - elapsed);
        }
    }

    let reporter = node.reporter();
    info!(
        "Simulator exiting: {} datagrams sent, {} report slots dropped",
        reporter.datagrams_sent(),
        reporter.cycles_dropped()
    );
}
