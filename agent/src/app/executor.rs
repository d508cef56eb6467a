//! The attachment-switch state machine.

use alloc::sync::Arc;
use core::{fmt, net::Ipv4Addr, time::Duration};

use linkshift_common::MacAddr;
use thiserror::Error as ThisError;
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use super::{Attachment, Shared};
use crate::{
    commands::ToolError,
    config::{AccessPoint, HandoverConfig, InterfacesConfig},
    net::NetControl,
    radio::Radio,
    route::RouteRedirector,
    stream::StreamControl,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoverPhase {
    #[default]
    Idle,
    RoamRequested,
    RoamConfirming,
    AddressWaiting,
    Redirecting,
    Bound,
}

impl HandoverPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RoamRequested => "roam_requested",
            Self::RoamConfirming => "roam_confirming",
            Self::AddressWaiting => "address_waiting",
            Self::Redirecting => "redirecting",
            Self::Bound => "bound",
        }
    }
}

impl fmt::Display for HandoverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ThisError)]
pub enum HandoverError {
    #[error("no access point with id {0}")]
    UnknownAccessPoint(u32),
    #[error("another handover is in flight")]
    Busy,
    #[error("roam command failed")]
    Roam(#[source] ToolError),
    #[error("failed to pin the network to the target BSSID")]
    Lock(#[source] ToolError),
    #[error("radio did not associate with {target} after {attempts} polls")]
    ConfirmTimeout { target: MacAddr, attempts: u32 },
    #[error("{interface} got no address after {attempts} polls")]
    AddressTimeout { interface: String, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoverOutcome {
    /// Traffic now flows over the new attachment.
    Bound(Attachment),
    /// The requested access point is already the bound one; nothing was done.
    AlreadyAttached,
}

/// Performs attachment switches. At most one runs at a time; further requests are
/// rejected with [`HandoverError::Busy`] rather than queued.
#[derive(Debug)]
pub struct HandoverExecutor<R, N, S> {
    shared: Arc<Shared>,
    radio: Arc<R>,
    net: Arc<N>,
    streams: Arc<S>,
    redirector: Arc<RouteRedirector<N>>,
    access_points: Vec<AccessPoint>,
    interfaces: InterfacesConfig,
    destination: Ipv4Addr,
    timing: HandoverConfig,
    in_flight: Mutex<()>,
    phase: watch::Sender<HandoverPhase>,
}

/// Static inputs of a [`HandoverExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub access_points: Vec<AccessPoint>,
    pub interfaces: InterfacesConfig,
    pub destination: Ipv4Addr,
    pub timing: HandoverConfig,
}

impl<R: Radio, N: NetControl, S: StreamControl> HandoverExecutor<R, N, S> {
    #[must_use]
    pub fn new(
        settings: ExecutorSettings,
        shared: Arc<Shared>,
        radio: Arc<R>,
        net: Arc<N>,
        streams: Arc<S>,
        redirector: Arc<RouteRedirector<N>>,
    ) -> Self {
        Self {
            shared,
            radio,
            net,
            streams,
            redirector,
            access_points: settings.access_points,
            interfaces: settings.interfaces,
            destination: settings.destination,
            timing: settings.timing,
            in_flight: Mutex::new(()),
            phase: watch::Sender::new(HandoverPhase::Idle),
        }
    }

    #[must_use]
    pub fn phase(&self) -> watch::Receiver<HandoverPhase> {
        self.phase.subscribe()
    }

    /// Switches traffic to access point `target`, or back to the wired interface for `0`.
    ///
    /// # Errors
    ///
    /// Fails without touching routes, streams or the attachment if another handover is in
    /// flight, the target is unknown, the roam command fails, or association or addressing
    /// is not observed in time.
    #[tracing::instrument(skip(self))]
    pub async fn handover(&self, target: u32) -> Result<HandoverOutcome, HandoverError> {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            return Err(HandoverError::Busy);
        };

        let result = if target == 0 {
            self.to_wired().await
        } else {
            let ap = self
                .access_points
                .iter()
                .find(|ap| ap.id == target)
                .copied()
                .ok_or(HandoverError::UnknownAccessPoint(target))?;
            self.to_access_point(ap).await
        };

        self.set_phase(HandoverPhase::Idle);
        if let Err(e) = &result {
            warn!("Handover aborted: {e}");
        }
        result
    }

    async fn to_wired(&self) -> Result<HandoverOutcome, HandoverError> {
        let interface = &self.interfaces.wired;
        info!(interface, "Returning to wired");
        let _radio = self.acquire_radio_lock().await;

        let ip = match self.net.interface_ipv4(interface).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(interface, "Could not read wired address: {e}");
                None
            }
        };
        self.redirect(interface, ip).await;
        Ok(self.bind(Attachment::wired(interface, ip)))
    }

    async fn to_access_point(&self, ap: AccessPoint) -> Result<HandoverOutcome, HandoverError> {
        let current = self.shared.attachment.get();
        if current.interface == self.interfaces.wireless && current.link_address == Some(ap.bssid) {
            info!(ap = ap.id, bssid = %ap.bssid, "Already attached, skipping handover");
            return Ok(HandoverOutcome::AlreadyAttached);
        }

        info!(ap = ap.id, bssid = %ap.bssid, from = %current, "Handing over");
        self.set_phase(HandoverPhase::RoamRequested);
        let _radio = self.acquire_radio_lock().await;

        self.radio
            .roam(ap.bssid)
            .await
            .map_err(HandoverError::Roam)?;
        self.radio
            .lock(ap.bssid)
            .await
            .map_err(HandoverError::Lock)?;

        self.set_phase(HandoverPhase::RoamConfirming);
        self.confirm_association(ap.bssid).await?;

        self.set_phase(HandoverPhase::AddressWaiting);
        let interface = &self.interfaces.wireless;
        let ip = self.wait_for_address(interface).await?;

        self.redirect(interface, Some(ip)).await;
        Ok(self.bind(Attachment {
            interface: interface.clone(),
            ip: Some(ip),
            link_address: Some(ap.bssid),
        }))
    }

    /// Waits up to the configured timeout for the radio lock; proceeds without it after.
    async fn acquire_radio_lock(&self) -> Option<MutexGuard<'_, ()>> {
        let limit = Duration::from_secs(self.timing.lock_timeout_secs);
        match timeout(limit, self.shared.radio_lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(?limit, "Radio lock not available, proceeding without it");
                None
            }
        }
    }

    async fn confirm_association(&self, target: MacAddr) -> Result<(), HandoverError> {
        let attempts = self.timing.confirm_attempts;
        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.poll_interval()).await;
            }
            match self.radio.status().await {
                Ok(status) if status.bssid == Some(target) => {
                    debug!(attempt, %target, "Association confirmed");
                    return Ok(());
                }
                Ok(status) => debug!(attempt, current = ?status.bssid, "Not yet associated"),
                Err(e) => debug!(attempt, "Status poll failed: {e}"),
            }
        }
        Err(HandoverError::ConfirmTimeout { target, attempts })
    }

    async fn wait_for_address(&self, interface: &str) -> Result<Ipv4Addr, HandoverError> {
        let attempts = self.timing.address_attempts;
        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.poll_interval()).await;
            }
            match self.net.interface_ipv4(interface).await {
                Ok(Some(ip)) => {
                    debug!(attempt, interface, %ip, "Address assigned");
                    return Ok(ip);
                }
                Ok(None) => debug!(attempt, interface, "No address yet"),
                Err(e) => debug!(attempt, interface, "Address lookup failed: {e}"),
            }
        }
        Err(HandoverError::AddressTimeout {
            interface: interface.to_string(),
            attempts,
        })
    }

    async fn redirect(&self, interface: &str, ip: Option<Ipv4Addr>) {
        self.set_phase(HandoverPhase::Redirecting);
        self.redirector.ensure_route(self.destination, interface).await;
        self.streams.start_media(interface, ip).await;
        self.streams.retarget_load(interface).await;
    }

    fn bind(&self, attachment: Attachment) -> HandoverOutcome {
        self.set_phase(HandoverPhase::Bound);
        self.shared.attachment.set(attachment.clone());
        self.shared.cooldown.mark();
        info!(%attachment, "Attachment bound");
        HandoverOutcome::Bound(attachment)
    }

    const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timing.poll_interval_ms)
    }

    fn set_phase(&self, phase: HandoverPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(%previous, %phase, "Handover phase");
        }
    }
}
