//! Control-channel protocol types.
//!
//! Every frame on the control channel is a JSON [`Envelope`] naming an event and carrying an
//! arbitrary JSON payload. Known payloads are modelled below; the remote server is not under
//! our control, so inbound payloads are decoded leniently.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

// Macro to define the enum from variant => string mappings
macro_rules! define_enum_with_str {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            /// The on-the-wire event name.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match *self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    _ => Err(()),
                }
            }
        }
    };
}

define_enum_with_str! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Named events exchanged with the control server.
    pub enum EventName {
        /// Link quality / attachment snapshot, node to server.
        Telemetry => "robot_ss_data",
        /// Liveness ping, node to server.
        Keepalive => "robot_keepalive",
        /// Handover directive, server to node.
        Command => "command",
        /// Restart request, server to node.
        Reboot => "reboot",
        /// Session established.
        Connect => "connect",
        /// Session lost.
        Disconnect => "disconnect",
    }
}

/// One frame on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Wraps a serializable payload under the given event name.
    pub fn new<T: Serialize>(event: EventName, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.as_str().to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// The known event this frame carries, if any.
    #[must_use]
    pub fn name(&self) -> Option<EventName> {
        self.event.parse().ok()
    }

    /// Decodes the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// A value the server may send either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    /// The decimal string form, used when comparing identities.
    #[must_use]
    pub fn as_key(&self) -> String {
        match *self {
            Self::Number(n) => n.to_string(),
            Self::Text(ref s) => s.trim().to_string(),
        }
    }

    /// Interprets the value as a non-negative integer.
    ///
    /// Strings may carry a `0x`, `0o` or `0b` base prefix.
    #[must_use]
    pub fn as_index(&self) -> Option<u32> {
        match *self {
            Self::Number(n) => u32::try_from(n).ok(),
            Self::Text(ref s) => parse_prefixed(s),
        }
    }
}

fn parse_prefixed(raw: &str) -> Option<u32> {
    let cleaned = raw.trim().replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };
    if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// Per access point entry of a telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub gateway_id: u32,
    pub mac_address: String,
    /// `"true"` or `"false"`; the server expects a string.
    pub connected: String,
    pub rssi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    pub robot_id: u32,
    pub connections: Vec<ConnectionReport>,
}

/// Payload of [`EventName::Telemetry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub timestamp: String,
    pub data: TelemetryData,
}

/// Payload of [`EventName::Keepalive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keepalive {
    pub robot_id: u32,
    /// Unix seconds.
    pub ts: u64,
}

/// Payload of [`EventName::Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(default)]
    pub robot_id: Option<NumberOrString>,
    #[serde(default)]
    pub handover: Option<NumberOrString>,
}

/// Payload of [`EventName::Reboot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootPayload {
    #[serde(default)]
    pub robot_id: Option<NumberOrString>,
}
