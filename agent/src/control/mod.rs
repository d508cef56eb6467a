//! The control channel to the remote server: connection supervision, periodic
//! reports and inbound directives.

mod backoff;
mod channel;
mod directive;
pub mod telemetry;
mod transport;

use core::time::Duration;

pub use backoff::Backoff;
pub use channel::{ChannelSettings, ConnectionState, ControlChannel};
pub use directive::{Directive, Ignored, interpret};
use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::{self, http::header::InvalidHeaderValue};
pub use transport::{Connector, Session, WsConnector};

#[derive(Debug, ThisError)]
pub enum ControlError {
    #[error("invalid control server request")]
    Request(#[source] tungstenite::Error),
    #[error("invalid header value")]
    Header(#[from] InvalidHeaderValue),
    #[error("connect did not complete within {0:?}")]
    Timeout(Duration),
    #[error("websocket handshake failed")]
    WebSocket(#[from] tungstenite::Error),
    #[error("failed to encode event")]
    Encode(#[from] serde_json::Error),
    #[error("session closed")]
    Closed,
}
