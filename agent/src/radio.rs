//! Link-layer control through the radio-management utility (`wpa_cli`).
//!
//! The rest of the agent only sees the [`Radio`] trait; [`WpaCli`] is the production
//! implementation and tests substitute an in-memory fake.

use core::{future::Future, time::Duration};

use linkshift_common::MacAddr;
use tracing::{debug, warn};

use crate::{
    commands::{Tool, ToolError},
    config::RadioConfig,
};

/// What the radio currently reports about its association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioStatus {
    pub bssid: Option<MacAddr>,
    pub ssid: Option<String>,
    pub wpa_state: Option<String>,
}

/// One row of the scan table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub bssid: MacAddr,
    pub frequency: u32,
    /// Signal level in dBm.
    pub signal: f64,
    pub ssid: String,
}

/// The link-layer operations the controller needs.
pub trait Radio: Send + Sync + 'static {
    /// Current association.
    fn status(&self) -> impl Future<Output = Result<RadioStatus, ToolError>> + Send;

    /// Triggers a background scan; results appear later in [`Radio::scan_results`].
    fn scan(&self) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// The most recent scan table.
    fn scan_results(&self) -> impl Future<Output = Result<Vec<ScanEntry>, ToolError>> + Send;

    /// Directs the radio to associate with `target`.
    fn roam(&self, target: MacAddr) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Pins the active profile to `target` and disables background scanning on it.
    fn lock(&self, target: MacAddr) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// [`Radio`] backed by `wpa_cli`.
#[derive(Debug, Clone)]
pub struct WpaCli {
    tool: Tool,
    network_id: String,
    frequencies: Vec<String>,
}

impl WpaCli {
    #[must_use]
    pub fn new(config: &RadioConfig, frequencies: &[u32], tool_limit: Duration) -> Self {
        Self {
            tool: Tool::new(config.command.clone(), tool_limit),
            network_id: config.network_id.to_string(),
            frequencies: frequencies.iter().map(u32::to_string).collect(),
        }
    }
}

impl Radio for WpaCli {
    async fn status(&self) -> Result<RadioStatus, ToolError> {
        let reply = self.tool.run(&["status"]).await?;
        Ok(parse_status(&reply))
    }

    async fn scan(&self) -> Result<(), ToolError> {
        let mut args = vec!["scan"];
        if !self.frequencies.is_empty() {
            args.push("freq");
            args.extend(self.frequencies.iter().map(String::as_str));
        }
        self.tool.run_checked(&args).await.map(drop)
    }

    async fn scan_results(&self) -> Result<Vec<ScanEntry>, ToolError> {
        let reply = self.tool.run(&["scan_results"]).await?;
        Ok(parse_scan_results(&reply))
    }

    async fn roam(&self, target: MacAddr) -> Result<(), ToolError> {
        let target = target.to_string();
        self.tool.run_checked(&["roam", &target]).await.map(drop)
    }

    async fn lock(&self, target: MacAddr) -> Result<(), ToolError> {
        let target = target.to_string();
        self.tool
            .run_checked(&["set_network", &self.network_id, "bssid", &target])
            .await?;
        self.tool
            .run_checked(&["set_network", &self.network_id, "bgscan", ""])
            .await?;
        debug!(%target, "BSSID locked and bgscan disabled");
        Ok(())
    }
}

/// Parses `wpa_cli status` output (`key=value` lines).
#[must_use]
pub fn parse_status(reply: &str) -> RadioStatus {
    let mut status = RadioStatus::default();
    for line in reply.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "bssid" => match value.parse() {
                Ok(mac) => status.bssid = Some(mac),
                Err(e) => warn!(value, "Ignoring unparsable bssid in status: {e}"),
            },
            "ssid" => status.ssid = Some(value.to_string()),
            "wpa_state" => status.wpa_state = Some(value.to_string()),
            _ => {}
        }
    }
    status
}

/// Parses `wpa_cli scan_results` output.
///
/// The first line is a header; rows are `bssid  frequency  signal  flags  ssid`, tab
/// separated, where the SSID may contain spaces. Rows that cannot be parsed are skipped.
#[must_use]
pub fn parse_scan_results(reply: &str) -> Vec<ScanEntry> {
    reply
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                fields = line.split_whitespace().collect();
            }
            let (bssid, frequency, signal) = match *fields.as_slice() {
                [b, f, s, ..] => (b, f, s),
                _ => return None,
            };
            let ssid = fields.get(4..).map(|rest| rest.join(" ")).unwrap_or_default();
            Some(ScanEntry {
                bssid: bssid.trim().parse().ok()?,
                frequency: frequency.trim().parse().ok()?,
                signal: signal.trim().parse().ok()?,
                ssid: ssid.trim().to_string(),
            })
        })
        .collect()
}
