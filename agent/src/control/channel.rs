//! Connection supervision for the control channel.

use alloc::sync::Arc;
use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

use linkshift_common::{Envelope, EventName, Keepalive};
use serde::Serialize;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{Instrument as _, debug, info, warn};

use super::{Backoff, ControlError, Connector, Session};

/// Capacity of the queue handing inbound events to the dispatcher.
const INBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub node_id: u32,
    pub keepalive: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

#[derive(Debug)]
struct Current {
    generation: u64,
    outbound: mpsc::Sender<Envelope>,
}

/// Keeps one session to the control server alive and multiplexes it.
#[derive(Debug)]
pub struct ControlChannel<C> {
    connector: C,
    settings: ChannelSettings,
    state: watch::Sender<ConnectionState>,
    current: Mutex<Option<Current>>,
    generation: AtomicU64,
    inbound: mpsc::Sender<Envelope>,
}

impl<C: Connector> ControlChannel<C> {
    /// Creates a disconnected channel and the receiver for inbound events.
    #[must_use]
    pub fn new(connector: C, settings: ChannelSettings) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (inbound, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let channel = Arc::new(Self {
            connector,
            settings,
            state: watch::Sender::new(ConnectionState::Disconnected),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            inbound,
        });
        (channel, inbound_rx)
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Tries to establish a session. Single-flight: returns `false` without doing anything
    /// if an attempt is already running or a session is up.
    pub async fn reconnect(self: &Arc<Self>) -> bool {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return false;
        }

        match self.connector.connect().await {
            Ok(session) => {
                self.attach(session);
                true
            }
            Err(e) => {
                warn!("Control channel connect failed: {e}");
                self.state.send_replace(ConnectionState::Disconnected);
                false
            }
        }
    }

    fn attach(self: &Arc<Self>, session: Session) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let Session {
            outbound,
            mut inbound,
        } = session;
        *self.lock_current() = Some(Current {
            generation,
            outbound,
        });
        self.state.send_replace(ConnectionState::Connected);
        info!(generation, "Connected to control server");

        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                while let Some(envelope) = inbound.recv().await {
                    if this.inbound.send(envelope).await.is_err() {
                        debug!("Dispatcher gone, dropping session");
                        break;
                    }
                }
                this.detach(generation);
            }
            .in_current_span(),
        );
    }

    fn detach(&self, generation: u64) {
        let mut current = self.lock_current();
        if current.as_ref().is_some_and(|c| c.generation == generation) {
            *current = None;
            drop(current);
            self.state.send_replace(ConnectionState::Disconnected);
            warn!(generation, "Disconnected from control server");
        }
    }

    /// Sends an event on the live session. Returns `false` when there is none; nothing is
    /// queued for later sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn emit<T: Serialize>(&self, event: EventName, data: &T) -> Result<bool, ControlError> {
        if !self.is_connected() {
            return Ok(false);
        }
        let Some(outbound) = self.lock_current().as_ref().map(|c| c.outbound.clone()) else {
            return Ok(false);
        };
        match outbound.try_send(Envelope::new(event, data)?) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                warn!(%event, "Control channel backed up, dropping event");
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Ok(false),
        }
    }

    /// Reconnects whenever the channel is down, backing off exponentially with jitter.
    pub async fn watchdog(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.settings.backoff_base, self.settings.backoff_cap);
        let mut state = self.state.subscribe();
        loop {
            if *state.borrow_and_update() == ConnectionState::Connected {
                if state.changed().await.is_err() {
                    return;
                }
                continue;
            }
            if self.reconnect().await {
                backoff.reset();
                continue;
            }
            let delay = backoff.next_delay(Backoff::jitter());
            debug!(?delay, "Next reconnect attempt");
            time::sleep(delay).await;
        }
    }

    /// Emits a liveness ping every keepalive period while connected.
    pub async fn keepalive(self: Arc<Self>) {
        let mut ticker = time::interval(self.settings.keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let ping = Keepalive {
                robot_id: self.settings.node_id,
                ts: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
            };
            match self.emit(EventName::Keepalive, &ping) {
                Ok(true) => debug!(ts = ping.ts, "Keepalive sent"),
                Ok(false) => {}
                Err(e) => warn!("Failed to send keepalive: {e}"),
            }
        }
    }

    /// Spawns the watchdog and keepalive tasks.
    pub fn spawn(self: &Arc<Self>) -> [JoinHandle<()>; 2] {
        [
            tokio::spawn(Arc::clone(self).watchdog().in_current_span()),
            tokio::spawn(Arc::clone(self).keepalive().in_current_span()),
        ]
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Current>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
