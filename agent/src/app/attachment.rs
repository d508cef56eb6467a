//! The interface, address and access point currently carrying traffic.

use alloc::sync::Arc;
use core::{fmt, net::Ipv4Addr};

use linkshift_common::MacAddr;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub interface: String,
    /// Local address streams are bound to; `None` if the interface had none when bound.
    pub ip: Option<Ipv4Addr>,
    /// BSSID of the access point when attached over the air.
    pub link_address: Option<MacAddr>,
}

impl Attachment {
    #[must_use]
    pub fn wired(interface: &str, ip: Option<Ipv4Addr>) -> Self {
        Self {
            interface: interface.to_string(),
            ip,
            link_address: None,
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interface)?;
        if let Some(ip) = self.ip {
            write!(f, " ({ip})")?;
        }
        if let Some(bssid) = self.link_address {
            write!(f, " via {bssid}")?;
        }
        Ok(())
    }
}

/// Single-writer, many-reader holder of the current [`Attachment`].
///
/// Values are swapped whole, so readers always see a complete attachment.
#[derive(Debug)]
pub struct AttachmentTracker {
    current: watch::Sender<Arc<Attachment>>,
}

impl AttachmentTracker {
    #[must_use]
    pub fn new(initial: Attachment) -> Self {
        Self {
            current: watch::Sender::new(Arc::new(initial)),
        }
    }

    #[must_use]
    pub fn get(&self) -> Arc<Attachment> {
        Arc::clone(&self.current.borrow())
    }

    /// Only the handover executor calls this, with the radio lock held.
    pub(crate) fn set(&self, attachment: Attachment) {
        self.current.send_replace(Arc::new(attachment));
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Attachment>> {
        self.current.subscribe()
    }
}
