//! Link-quality reports for the control server.

use core::fmt;

use chrono::{DateTime, TimeZone};
use linkshift_common::{ConnectionReport, TelemetryData, TelemetryReport, UNOBSERVED_RSSI};

use crate::{app::Attachment, config::AccessPoint, quality::QualitySnapshot};

/// Wall-clock format the server expects.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry per configured access point, in table order.
///
/// An access point counts as connected only while traffic is bound to the wireless
/// interface through it.
#[must_use]
pub fn connections(
    access_points: &[AccessPoint],
    wireless: &str,
    attachment: &Attachment,
    quality: &QualitySnapshot,
) -> Vec<ConnectionReport> {
    let bound = (attachment.interface == wireless)
        .then_some(attachment.link_address)
        .flatten();
    access_points
        .iter()
        .map(|ap| ConnectionReport {
            gateway_id: ap.id,
            mac_address: ap.bssid.to_string(),
            connected: (bound == Some(ap.bssid)).to_string(),
            rssi: quality.get(&ap.bssid).copied().unwrap_or(UNOBSERVED_RSSI),
        })
        .collect()
}

/// Builds the report, or `None` if it should be skipped because no access point is
/// connected and `skip_when_unassociated` is set.
#[must_use]
pub fn build_report<Tz: TimeZone>(
    node_id: u32,
    connections: Vec<ConnectionReport>,
    skip_when_unassociated: bool,
    now: &DateTime<Tz>,
) -> Option<TelemetryReport>
where
    Tz::Offset: fmt::Display,
{
    if skip_when_unassociated && connections.iter().all(|c| c.connected != "true") {
        return None;
    }
    Some(TelemetryReport {
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        data: TelemetryData {
            robot_id: node_id,
            connections,
        },
    })
}
