//! Link-layer address handling.
//!
//! BSSIDs arrive from configuration, from the radio utility and from the control server in
//! whatever case the producer felt like. Parsing them into [`MacAddr`] makes comparison
//! case-insensitive by construction.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error as ThisError;

/// A 48-bit hardware address, e.g. the BSSID of an access point radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

/// Why a string could not be parsed as a [`MacAddr`].
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum MacParseError {
    #[error("expected 6 colon-separated octets, got {0}")]
    WrongLength(usize),
    #[error("invalid octet {0:?}")]
    InvalidOctet(String),
}

impl MacAddr {
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(MacParseError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(MacParseError::InvalidOctet((*part).to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::InvalidOctet((*part).to_string()))?;
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
