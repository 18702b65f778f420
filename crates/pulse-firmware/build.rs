//! Exports `.env` settings as compile-time environment variables.
//!
//! The firmware has no filesystem, so Wi-Fi credentials and the collector
//! address are baked in at build time and read back with `option_env!`.

const EXPORTED: [&str; 6] = [
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "COLLECTOR_HOST",
    "COLLECTOR_PORT",
    "DEVICE_ID",
    "LOG_LEVEL",
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    match dotenvy::dotenv() {
        Ok(path) => println!("cargo:rerun-if-changed={}", path.display()),
        Err(_) => println!("cargo:warning=No .env file found, using built-in defaults"),
    }

    for key in EXPORTED {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
