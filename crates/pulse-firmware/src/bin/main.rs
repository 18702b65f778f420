#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{LevelFilter, debug, error, info, warn};
use static_cell::StaticCell;

use pulse_core::app_state::Severity;
use pulse_core::heart_rate::{BeatTracker, PbaBeatDetector};
use pulse_core::indicator::StatusLed;
use pulse_core::node::HeartRateNode;
use pulse_core::sensors::{LedCurrents, Max30102};
use pulse_core::telemetry::TelemetryReporter;
use pulse_firmware::hardware;
use pulse_firmware::wifi_link::{EspWifiLink, UdpBuffers};
use pulse_firmware::wifi_secrets;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "the node owns the sensor, link and reporter for the life of the program"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Trace);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let mut led = StatusLed::new(hardware::status_led(peripherals.GPIO2));

    let settings = match wifi_secrets::config() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid build configuration: {}", e);
            led.fault_loop(&mut Delay).await
        }
    };
    log::set_max_level(settings.log_filter().unwrap_or(LevelFilter::Info));
    info!("Heart rate node starting");

    // Derived values were checked by `validate`, these cannot fail.
    let (endpoint, device_id) = match (settings.collector.endpoint(), settings.device.id()) {
        (Ok(endpoint), Ok(device_id)) => (endpoint, device_id),
        _ => led.fault_loop(&mut Delay).await,
    };

    // Radio and network stack
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner
        .spawn(net_task(runner))
        .expect("Failed to spawn network task");

    static UDP_BUFFERS: StaticCell<UdpBuffers> = StaticCell::new();
    let link = match EspWifiLink::new(
        wifi_controller,
        stack,
        UDP_BUFFERS.init(UdpBuffers::new()),
        settings.internet.clone(),
    ) {
        Ok(link) => link,
        Err(e) => {
            error!("Telemetry link unavailable: {}", e);
            led.fault_loop(&mut Delay).await
        }
    };

    // Sensor and pipeline
    let i2c = hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9);
    let reporter = TelemetryReporter::new(
        link,
        Delay,
        hardware::SystemClock,
        endpoint,
        device_id,
        Duration::from_millis(settings.timing.report_interval_ms),
        settings.reconnect,
    );
    let mut node = HeartRateNode::new(
        Max30102::new(i2c),
        BeatTracker::new(PbaBeatDetector::new()),
        reporter,
        led,
    );

    if let Err(e) = node.start(LedCurrents::default()).await {
        if e.severity() == Severity::Fatal {
            error!("MAX30102 was not found. Please check wiring/power.");
            node.fault_loop(&mut Delay).await;
        }
        warn!("Start-up degraded: {}", e);
    }
    info!("Sending telemetry to {}", endpoint);

    let poll = Duration::from_millis(settings.timing.poll_interval_ms);
    loop {
        match node.cycle(Instant::now()).await {
            Ok(report) => {
                if let Err(e) = report.telemetry {
                    debug!("Report slot dropped: {}", e);
                }
            }
            Err(e) => warn!("Cycle dropped: {}", e),
        }
        Timer::after(poll).await;
    }
}
