//! Configuration data types for the agent.
//!
//! Every tunable has a serde default, so a minimal file only needs `[node]`, `[server]`,
//! the access point table and the destination table.

use alloc::sync::Arc;
use core::{net::Ipv4Addr, time::Duration};
use std::collections::HashMap;

use linkshift_common::MacAddr;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error as ThisError;

/// Identity of this node and the peer it streams to.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node identity reported to, and matched against, the control server.
    pub id: u32,
    /// Id into the `[[destinations]]` table selecting where media and load traffic go.
    pub destination: u32,
}

/// Control-channel connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// WebSocket URL of the control server, e.g. `ws://10.100.30.241:6789/ws`.
    pub url: String,
    /// Optional bearer token sent on the upgrade request.
    #[serde(default)]
    pub token: Option<Arc<SecretString>>,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_telemetry_secs")]
    pub telemetry_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Names of the two interfaces traffic can be steered onto.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InterfacesConfig {
    #[serde(default = "default_wired")]
    pub wired: String,
    #[serde(default = "default_wireless")]
    pub wireless: String,
}

impl Default for InterfacesConfig {
    fn default() -> Self {
        Self {
            wired: default_wired(),
            wireless: default_wireless(),
        }
    }
}

/// A wireless attachment point the server may direct us to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct AccessPoint {
    /// Small positive index used by the server in handover commands.
    pub id: u32,
    pub bssid: MacAddr,
}

/// A node that media and load traffic can be sent to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub id: u32,
    pub ip: Ipv4Addr,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    /// Quiet period after a handover during which no scan is triggered.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Time the radio gets to collect beacons between trigger and result collection.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Only keep scan results for this SSID.
    #[serde(default)]
    pub ssid: Option<String>,
    /// Restrict the scan to these channel frequencies (MHz).
    #[serde(default)]
    pub frequencies: Vec<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            settle_ms: default_settle_ms(),
            ssid: None,
            frequencies: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HandoverConfig {
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_attempts")]
    pub confirm_attempts: u32,
    #[serde(default = "default_attempts")]
    pub address_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            confirm_attempts: default_attempts(),
            address_attempts: default_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// How the radio-management utility is invoked.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Program and leading arguments, e.g. `["sudo", "wpa_cli", "-i", "wlan0"]`.
    #[serde(default = "default_radio_command")]
    pub command: Vec<String>,
    /// Network block that gets pinned to the target BSSID after a roam.
    #[serde(default)]
    pub network_id: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            command: default_radio_command(),
            network_id: 0,
        }
    }
}

/// How the route-table utility is invoked.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    #[serde(default = "default_route_command")]
    pub command: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            command: default_route_command(),
        }
    }
}

/// The externally-launched media pipeline.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MediaConfig {
    #[serde(default = "do_enable")]
    pub enabled: bool,
    #[serde(default = "default_media_program")]
    pub program: String,
    #[serde(default = "default_media_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_media_port")]
    pub port: u16,
    /// How long a stopping pipeline gets after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: do_enable(),
            program: default_media_program(),
            device: default_media_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            port: default_media_port(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

/// The synthetic best-effort UDP load.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoadConfig {
    #[serde(default = "do_enable")]
    pub enabled: bool,
    #[serde(default = "default_load_port")]
    pub port: u16,
    #[serde(default = "default_bitrate_mbps")]
    pub bitrate_mbps: f64,
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Pin the socket to the interface with `SO_BINDTODEVICE` (needs `CAP_NET_RAW`).
    #[serde(default = "do_enable")]
    pub bind_to_device: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: do_enable(),
            port: default_load_port(),
            bitrate_mbps: default_bitrate_mbps(),
            packet_size: default_packet_size(),
            bind_to_device: do_enable(),
        }
    }
}

impl LoadConfig {
    /// Gap between datagrams needed to hit the target bitrate.
    ///
    /// `None` when the bitrate gives no usable gap: zero because it is too high, or not
    /// representable because it is too low.
    #[must_use]
    pub fn pacing_interval(&self) -> Option<Duration> {
        #[expect(
            clippy::cast_precision_loss,
            reason = "packet sizes are far below 2^52"
        )]
        let bits = (self.packet_size * 8) as f64;
        Duration::try_from_secs_f64(bits / (self.bitrate_mbps * 1e6))
            .ok()
            .filter(|gap| !gap.is_zero())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Do not report while the node is not associated with any configured access point.
    #[serde(default = "do_enable")]
    pub skip_when_unassociated: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            skip_when_unassociated: do_enable(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// Shell command run when the server requests a restart.
    #[serde(default = "default_reboot_command")]
    pub reboot_command: String,
    /// Upper bound for any single radio or route utility invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            reboot_command: default_reboot_command(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Root config structure for the agent.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub node: NodeConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub interfaces: InterfacesConfig,
    /// Interface name to gateway override, consulted before the interface's default route.
    #[serde(default)]
    pub gateways: HashMap<String, Ipv4Addr>,
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub handover: HandoverConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Largest UDP payload that fits an IPv4 datagram.
pub const MAX_DATAGRAM: usize = 65_507;

/// Semantic problems with an otherwise well-formed config file.
#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("destination {0} is not listed in [[destinations]]")]
    UnknownDestination(u32),
    #[error("access point id 0 is reserved for the wired interface")]
    ReservedAccessPointId,
    #[error("access point id {0} is listed more than once")]
    DuplicateAccessPoint(u32),
    #[error("load bitrate {0} Mbit/s gives no usable pacing interval")]
    InvalidBitrate(f64),
    #[error("load packet size must be between 1 and {MAX_DATAGRAM} bytes")]
    InvalidPacketSize,
    #[error("{0} must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("{0} must allow at least one attempt")]
    ZeroAttempts(&'static str),
    #[error("backoff base ({base}s) exceeds the cap ({cap}s)")]
    InvalidBackoff { base: u64, cap: u64 },
    #[error("{0} command must name a program")]
    EmptyCommand(&'static str),
}

impl AgentConfig {
    /// Checks the cross-field invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination().is_none() {
            return Err(ConfigError::UnknownDestination(self.node.destination));
        }

        let mut seen = Vec::with_capacity(self.access_points.len());
        for ap in &self.access_points {
            if ap.id == 0 {
                return Err(ConfigError::ReservedAccessPointId);
            }
            if seen.contains(&ap.id) {
                return Err(ConfigError::DuplicateAccessPoint(ap.id));
            }
            seen.push(ap.id);
        }

        if !(1..=MAX_DATAGRAM).contains(&self.load.packet_size) {
            return Err(ConfigError::InvalidPacketSize);
        }
        if !(self.load.bitrate_mbps.is_finite() && self.load.bitrate_mbps > 0.0)
            || self.load.pacing_interval().is_none()
        {
            return Err(ConfigError::InvalidBitrate(self.load.bitrate_mbps));
        }

        let periods = [
            ("server.keepalive_secs", self.server.keepalive_secs),
            ("server.telemetry_secs", self.server.telemetry_secs),
            ("server.backoff_base_secs", self.server.backoff_base_secs),
            ("server.connect_timeout_secs", self.server.connect_timeout_secs),
            ("scan.interval_secs", self.scan.interval_secs),
            ("system.tool_timeout_secs", self.system.tool_timeout_secs),
        ];
        if let Some(&(name, _)) = periods.iter().find(|&&(_, value)| value == 0) {
            return Err(ConfigError::ZeroPeriod(name));
        }
        if self.handover.confirm_attempts == 0 {
            return Err(ConfigError::ZeroAttempts("handover.confirm_attempts"));
        }
        if self.handover.address_attempts == 0 {
            return Err(ConfigError::ZeroAttempts("handover.address_attempts"));
        }
        if self.server.backoff_base_secs > self.server.backoff_cap_secs {
            return Err(ConfigError::InvalidBackoff {
                base: self.server.backoff_base_secs,
                cap: self.server.backoff_cap_secs,
            });
        }
        if self.radio.command.is_empty() {
            return Err(ConfigError::EmptyCommand("radio"));
        }
        if self.routing.command.is_empty() {
            return Err(ConfigError::EmptyCommand("routing"));
        }
        Ok(())
    }

    /// Address media and load traffic are sent to.
    #[must_use]
    pub fn destination(&self) -> Option<Ipv4Addr> {
        self.destinations
            .iter()
            .find(|d| d.id == self.node.destination)
            .map(|d| d.ip)
    }

    #[must_use]
    pub fn access_point(&self, id: u32) -> Option<&AccessPoint> {
        self.access_points.iter().find(|ap| ap.id == id)
    }
}

fn default_wired() -> String {
    "eth0".to_string()
}

fn default_wireless() -> String {
    "wlan0".to_string()
}

const fn default_keepalive_secs() -> u64 {
    20
}

const fn default_telemetry_secs() -> u64 {
    10
}

const fn default_backoff_base_secs() -> u64 {
    2
}

const fn default_backoff_cap_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_scan_interval_secs() -> u64 {
    10
}

const fn default_cooldown_secs() -> u64 {
    3
}

const fn default_settle_ms() -> u64 {
    2000
}

const fn default_lock_timeout_secs() -> u64 {
    5
}

const fn default_attempts() -> u32 {
    10
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_radio_command() -> Vec<String> {
    vec!["sudo".to_string(), "wpa_cli".to_string()]
}

fn default_route_command() -> Vec<String> {
    vec!["sudo".to_string(), "ip".to_string()]
}

const fn do_enable() -> bool {
    true
}

fn default_media_program() -> String {
    "gst-launch-1.0".to_string()
}

fn default_media_device() -> String {
    "/dev/video0".to_string()
}

const fn default_width() -> u32 {
    1920
}

const fn default_height() -> u32 {
    1080
}

const fn default_fps() -> u32 {
    30
}

const fn default_media_port() -> u16 {
    5000
}

const fn default_stop_grace_ms() -> u64 {
    2000
}

const fn default_load_port() -> u16 {
    5001
}

const fn default_bitrate_mbps() -> f64 {
    15.0
}

const fn default_packet_size() -> usize {
    1200
}

fn default_reboot_command() -> String {
    "sudo reboot".to_string()
}

const fn default_tool_timeout_secs() -> u64 {
    10
}
