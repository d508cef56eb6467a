//! The handover orchestration core: shared state, the executor, the scan loop and the
//! aggregate that wires them to the control channel.

mod attachment;
mod controller;
mod executor;
mod scan;

use alloc::sync::Arc;
use core::time::Duration;
use std::sync::{Mutex, PoisonError};

pub use attachment::{Attachment, AttachmentTracker};
pub use controller::Controller;
pub use executor::{
    ExecutorSettings, HandoverError, HandoverExecutor, HandoverOutcome, HandoverPhase,
};
pub use scan::{ScanLoop, TickOutcome};
use tokio::time::Instant;

use crate::quality::LinkQuality;

/// Serializes radio-affecting work: a scan and a handover never run at the same time.
pub type RadioLock = tokio::sync::Mutex<()>;

/// Quiet period after a handover during which scanning is suppressed.
#[derive(Debug)]
pub struct Cooldown {
    period: Duration,
    last: Mutex<Option<Instant>>,
}

impl Cooldown {
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            last: Mutex::new(None),
        }
    }

    /// Starts the quiet period now.
    pub fn mark(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time left in the quiet period, `None` once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let last = (*self.last.lock().unwrap_or_else(PoisonError::into_inner))?;
        self.period
            .checked_sub(last.elapsed())
            .filter(|left| !left.is_zero())
    }
}

/// State read and written by more than one task.
#[derive(Debug)]
pub struct Shared {
    pub quality: LinkQuality,
    pub attachment: AttachmentTracker,
    pub radio_lock: Arc<RadioLock>,
    pub cooldown: Cooldown,
}

impl Shared {
    #[must_use]
    pub fn new(initial: Attachment, cooldown: Duration) -> Self {
        Self {
            quality: LinkQuality::new(),
            attachment: AttachmentTracker::new(initial),
            radio_lock: Arc::new(RadioLock::new(())),
            cooldown: Cooldown::new(cooldown),
        }
    }
}
