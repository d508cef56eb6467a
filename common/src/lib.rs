//! Types shared between the node agent and whatever speaks to it over the control channel.
//!
//! This crate provides:
//! - The control-channel event envelope and payload types
//! - A link-layer (BSSID) address type with case-insensitive semantics

mod mac;
mod protocol;

pub use mac::*;
pub use protocol::*;

/// Header carrying the node identity on the control-channel upgrade request.
pub const NODE_ID_HEADER: &str = "x-robot-id";

/// RSSI reported for access points that were never observed in a scan.
pub const UNOBSERVED_RSSI: f64 = -100.0;
