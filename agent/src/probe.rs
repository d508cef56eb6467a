//! One-shot diagnostics: what the agent would see right now.

use core::{
    fmt::{self, Write as _},
    net::Ipv4Addr,
    time::Duration,
};

use eyre::WrapErr as _;

use crate::{
    config::AgentConfig,
    net::NetControl,
    radio::{Radio, RadioStatus, ScanEntry},
};

/// Queries the radio and interfaces and renders a human-readable summary.
///
/// # Errors
///
/// Returns an error if the radio or the interface table cannot be queried.
pub async fn probe<R: Radio, N: NetControl>(
    config: &AgentConfig,
    radio: &R,
    net: &N,
) -> eyre::Result<String> {
    let status = radio.status().await.wrap_err("Failed to query radio status")?;
    let wired = net
        .interface_ipv4(&config.interfaces.wired)
        .await
        .wrap_err("Failed to read wired address")?;
    let wireless = net
        .interface_ipv4(&config.interfaces.wireless)
        .await
        .wrap_err("Failed to read wireless address")?;

    radio.scan().await.wrap_err("Failed to trigger scan")?;
    tokio::time::sleep(Duration::from_millis(config.scan.settle_ms)).await;
    let table = radio
        .scan_results()
        .await
        .wrap_err("Failed to read scan results")?;

    let addr = |ip: Option<Ipv4Addr>| ip.map_or_else(|| "-".to_string(), |ip| ip.to_string());
    let mut out = String::new();
    writeln!(out, "node        {}", config.node.id)?;
    writeln!(out, "{:<11} {}", config.interfaces.wired, addr(wired))?;
    writeln!(out, "{:<11} {}", config.interfaces.wireless, addr(wireless))?;
    render_status(&mut out, &status)?;
    render_table(&mut out, config, &table)?;
    Ok(out)
}

fn render_status(out: &mut String, status: &RadioStatus) -> fmt::Result {
    writeln!(
        out,
        "radio       {} {} ({})",
        status.bssid.map_or_else(|| "unassociated".to_string(), |b| b.to_string()),
        status.ssid.as_deref().unwrap_or("-"),
        status.wpa_state.as_deref().unwrap_or("unknown"),
    )
}

fn render_table(out: &mut String, config: &AgentConfig, table: &[ScanEntry]) -> fmt::Result {
    writeln!(out, "scan        {} entries", table.len())?;
    for entry in table {
        let ap = config
            .access_points
            .iter()
            .find(|ap| ap.bssid == entry.bssid)
            .map_or_else(|| "-".to_string(), |ap| ap.id.to_string());
        writeln!(
            out,
            "  ap {ap:>2}  {}  {:>5} MHz  {:>6.1} dBm  {}",
            entry.bssid, entry.frequency, entry.signal, entry.ssid
        )?;
    }
    Ok(())
}
