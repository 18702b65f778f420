//! Wi-Fi station + UDP socket as a [`TelemetryLink`]
//!
//! The radio is driven by `esp-radio`; the IP side is an `embassy-net` stack
//! whose runner task must be spawned by the caller. One UDP socket, bound to
//! an ephemeral port, carries every datagram.

use alloc::string::ToString;

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiStaState};
use log::{error, info, warn};

use pulse_core::config::{CollectorEndpoint, InternetConfig};
use pulse_core::telemetry::{LinkError, TelemetryLink};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const DHCP_TIMEOUT: Duration = Duration::from_secs(10);

const META_SLOTS: usize = 4;
const RX_BUFFER_SIZE: usize = 256;
const TX_BUFFER_SIZE: usize = 1024;

/// Socket storage; must outlive the link, so it normally lives in a `StaticCell`.
pub struct UdpBuffers {
    rx_meta: [PacketMetadata; META_SLOTS],
    rx: [u8; RX_BUFFER_SIZE],
    tx_meta: [PacketMetadata; META_SLOTS],
    tx: [u8; TX_BUFFER_SIZE],
}

impl UdpBuffers {
    pub const fn new() -> Self {
        Self {
            rx_meta: [PacketMetadata::EMPTY; META_SLOTS],
            rx: [0; RX_BUFFER_SIZE],
            tx_meta: [PacketMetadata::EMPTY; META_SLOTS],
            tx: [0; TX_BUFFER_SIZE],
        }
    }
}

impl Default for UdpBuffers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EspWifiLink<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    socket: UdpSocket<'a>,
    credentials: InternetConfig<'a>,
}

impl<'a> EspWifiLink<'a> {
    pub fn new(
        controller: WifiController<'a>,
        stack: Stack<'a>,
        buffers: &'a mut UdpBuffers,
        credentials: InternetConfig<'a>,
    ) -> Result<Self, LinkError> {
        let UdpBuffers {
            rx_meta,
            rx,
            tx_meta,
            tx,
        } = buffers;
        let mut socket = UdpSocket::new(stack, rx_meta, rx, tx_meta, tx);
        socket.bind(0).map_err(|e| {
            error!("Failed to bind UDP socket: {:?}", e);
            LinkError::Io
        })?;

        Ok(Self {
            controller,
            stack,
            socket,
            credentials,
        })
    }

    async fn ensure_started(&mut self) -> Result<(), LinkError> {
        if matches!(self.controller.is_started(), Ok(true)) {
            return Ok(());
        }

        let mode = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(self.credentials.ssid.to_string())
                .with_password(self.credentials.password.to_string()),
        );
        self.controller.set_config(&mode).map_err(|e| {
            error!("Wi-Fi configuration rejected: {:?}", e);
            LinkError::AssociationFailed
        })?;
        self.controller.start_async().await.map_err(|e| {
            error!("Wi-Fi start failed: {:?}", e);
            LinkError::AssociationFailed
        })?;
        info!("Wi-Fi started");
        Ok(())
    }
}

impl TelemetryLink for EspWifiLink<'_> {
    fn is_up(&self) -> bool {
        matches!(esp_radio::wifi::sta_state(), WifiStaState::Connected) && self.stack.is_config_up()
    }

    fn signal_strength(&self) -> i32 {
        self.controller.rssi().unwrap_or(0)
    }

    async fn reconnect(&mut self) -> Result<(), LinkError> {
        if !self.credentials.is_configured() {
            return Err(LinkError::NotConfigured);
        }
        self.ensure_started().await?;

        info!("Connecting to {}...", self.credentials.ssid);
        match with_timeout(JOIN_TIMEOUT, self.controller.connect_async()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Association failed: {:?}", e);
                return Err(LinkError::AssociationFailed);
            }
            Err(_) => return Err(LinkError::Timeout),
        }

        with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up())
            .await
            .map_err(|_| LinkError::NoAddress)?;

        if let Some(v4) = self.stack.config_v4() {
            info!("WiFi connected! IP address: {}", v4.address);
        }
        Ok(())
    }

    async fn send(
        &mut self,
        endpoint: &CollectorEndpoint,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let remote = IpEndpoint::new(IpAddress::Ipv4(endpoint.addr), endpoint.port);
        self.socket.send_to(payload, remote).await.map_err(|e| {
            warn!("UDP send failed: {:?}", e);
            LinkError::Io
        })
    }
}
