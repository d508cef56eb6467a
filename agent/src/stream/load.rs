//! Best-effort synthetic UDP load towards the destination node.

use alloc::sync::Arc;
use core::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};
use std::io;

use rand::Rng as _;
use thiserror::Error as ThisError;
use tokio::{net::UdpSocket, sync::Mutex, time};
use tracing::{debug, error, info, warn};

use crate::{
    config::LoadConfig,
    net::{NetControl, NetError},
};

#[derive(Debug, ThisError)]
pub enum LoadError {
    #[error("interface {0} has no IPv4 address")]
    NoAddress(String),
    #[error("failed to look up interface address")]
    Net(#[from] NetError),
    #[error("failed to bind load socket")]
    Bind(#[source] io::Error),
    #[error("failed to send datagram")]
    Send(#[source] io::Error),
}

#[derive(Debug)]
struct Slot {
    interface: String,
    socket: Option<UdpSocket>,
}

/// Paced datagram sender whose source interface can be switched at runtime.
#[derive(Debug)]
pub struct LoadGenerator<N> {
    net: Arc<N>,
    config: LoadConfig,
    destination: SocketAddrV4,
    slot: Mutex<Slot>,
}

impl<N: NetControl> LoadGenerator<N> {
    #[must_use]
    pub fn new(net: Arc<N>, config: LoadConfig, destination: Ipv4Addr, interface: &str) -> Self {
        let destination = SocketAddrV4::new(destination, config.port);
        Self {
            net,
            config,
            destination,
            slot: Mutex::new(Slot {
                interface: interface.to_string(),
                socket: None,
            }),
        }
    }

    /// Switches the source interface; the next send binds a fresh socket.
    pub async fn update(&self, interface: &str) {
        let mut slot = self.slot.lock().await;
        slot.interface = interface.to_string();
        slot.socket = None;
        info!(interface, "Load generator retargeted");
    }

    /// Sends datagrams forever at the configured pace.
    pub async fn run(&self) {
        let Some(pace) = self.config.pacing_interval() else {
            error!(
                bitrate = self.config.bitrate_mbps,
                "Load generator has no usable pacing interval"
            );
            return;
        };
        info!(
            destination = %self.destination,
            ?pace,
            size = self.config.packet_size,
            "Load generator running"
        );
        let mut ticker = time::interval(pace);
        let mut payload = vec![0_u8; self.config.packet_size];
        loop {
            ticker.tick().await;
            rand::rng().fill(payload.as_mut_slice());
            if let Err(e) = self.send_once(&payload).await {
                warn!("Load generator: {e}, retrying in 1s");
                time::sleep(Duration::from_secs(1)).await;
                ticker.reset();
            }
        }
    }

    /// Sends one datagram, binding a socket first if needed. Returns the source address used.
    async fn send_once(&self, payload: &[u8]) -> Result<SocketAddr, LoadError> {
        let mut slot = self.slot.lock().await;
        let socket = match slot.socket.take() {
            Some(socket) => socket,
            None => self.bind(&slot.interface).await?,
        };
        socket
            .send_to(payload, self.destination)
            .await
            .map_err(LoadError::Send)?;
        let local = socket.local_addr().map_err(LoadError::Send)?;
        slot.socket = Some(socket);
        Ok(local)
    }

    async fn bind(&self, interface: &str) -> Result<UdpSocket, LoadError> {
        let ip = self
            .net
            .interface_ipv4(interface)
            .await?
            .ok_or_else(|| LoadError::NoAddress(interface.to_string()))?;
        let socket = UdpSocket::bind(SocketAddrV4::new(ip, 0))
            .await
            .map_err(LoadError::Bind)?;
        if self.config.bind_to_device {
            bind_to_device(&socket, interface);
        }
        debug!(interface, %ip, "Load socket bound");
        Ok(socket)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_to_device(socket: &UdpSocket, interface: &str) {
    use nix::sys::socket::{setsockopt, sockopt::BindToDevice};
    use std::ffi::OsString;

    if let Err(e) = setsockopt(socket, BindToDevice, &OsString::from(interface)) {
        warn!(interface, "SO_BINDTODEVICE failed, relying on source address only: {e}");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_to_device(_socket: &UdpSocket, interface: &str) {
    debug!(interface, "SO_BINDTODEVICE unsupported on this platform");
}
