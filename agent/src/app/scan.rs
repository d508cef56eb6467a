//! Periodic scanning feeding the link quality estimator.

use alloc::sync::Arc;
use core::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::Shared;
use crate::{config::ScanConfig, radio::Radio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A handover happened recently; the radio is left alone.
    CoolingDown,
    /// A handover holds the radio lock.
    Busy,
    /// Scan completed with this many (filtered) observations.
    Scanned(usize),
    /// The radio utility failed; nothing was observed.
    Failed,
}

#[derive(Debug)]
pub struct ScanLoop<R> {
    shared: Arc<Shared>,
    radio: Arc<R>,
    config: ScanConfig,
}

impl<R: Radio> ScanLoop<R> {
    #[must_use]
    pub const fn new(shared: Arc<Shared>, radio: Arc<R>, config: ScanConfig) -> Self {
        Self {
            shared,
            radio,
            config,
        }
    }

    /// One scan cycle. Never blocks on the radio lock.
    pub async fn tick(&self) -> TickOutcome {
        if let Some(left) = self.shared.cooldown.remaining() {
            debug!(?left, "Scan suppressed after handover");
            return TickOutcome::CoolingDown;
        }
        let Ok(_radio) = self.shared.radio_lock.try_lock() else {
            debug!("Handover in progress, skipping scan");
            return TickOutcome::Busy;
        };

        if let Err(e) = self.radio.scan().await {
            warn!("Scan trigger failed: {e}");
            return TickOutcome::Failed;
        }
        sleep(Duration::from_millis(self.config.settle_ms)).await;

        let entries = match self.radio.scan_results().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Reading scan results failed: {e}");
                return TickOutcome::Failed;
            }
        };
        let samples: Vec<_> = entries
            .into_iter()
            .filter(|e| self.config.ssid.as_ref().is_none_or(|ssid| *ssid == e.ssid))
            .map(|e| (e.bssid, e.signal))
            .collect();
        let observed = samples.len();
        self.shared.quality.observe_batch(samples);
        debug!(observed, "Scan complete");
        TickOutcome::Scanned(observed)
    }

    /// Scans forever; during a cooldown re-checks every second.
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.interval_secs);
        loop {
            let pause = match self.tick().await {
                TickOutcome::CoolingDown => Duration::from_secs(1),
                _ => interval,
            };
            sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use linkshift_common::MacAddr;
    use rand::Rng as _;

    use super::*;
    use crate::{
        app::{
            Attachment,
            executor::tests::{AP1, AP2, WIRED_IP, rig_with},
        },
        radio::ScanEntry,
        testing::{FakeRadio, RadioCall},
    };

    fn entry(bssid: MacAddr, signal: f64, ssid: &str) -> ScanEntry {
        ScanEntry {
            bssid,
            frequency: 5180,
            signal,
            ssid: ssid.to_string(),
        }
    }

    fn fixture(config: ScanConfig) -> (Arc<Shared>, Arc<FakeRadio>, ScanLoop<FakeRadio>) {
        let shared = Arc::new(Shared::new(
            Attachment::wired("eth0", Some(WIRED_IP)),
            Duration::from_secs(3),
        ));
        let radio = Arc::new(FakeRadio::guarded_by(Arc::clone(&shared.radio_lock)));
        radio.set_table(vec![
            entry(AP1, -50.0, "HSLSV"),
            entry(AP2, -70.0, "HSLSV"),
            entry(MacAddr::new([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]), -30.0, "Guest"),
        ]);
        let scan = ScanLoop::new(Arc::clone(&shared), Arc::clone(&radio), config);
        (shared, radio, scan)
    }

    #[tokio::test(start_paused = true)]
    async fn tick_feeds_estimator_with_filtered_results() {
        let (shared, radio, scan) = fixture(ScanConfig {
            ssid: Some("HSLSV".to_string()),
            ..ScanConfig::default()
        });
        assert_eq!(scan.tick().await, TickOutcome::Scanned(2));
        let snapshot = shared.quality.snapshot();
        assert_eq!(snapshot.len(), 2, "foreign SSID filtered out");
        assert!((snapshot[&AP1] + 50.0).abs() < 1e-9, "AP1 observed");
        assert_eq!(radio.calls(), vec![RadioCall::Scan, RadioCall::ScanResults]);
        assert!(radio.unguarded().is_empty(), "scan ran under the radio lock");
    }

    #[tokio::test(start_paused = true)]
    async fn tick_skips_when_lock_held() {
        let (shared, radio, scan) = fixture(ScanConfig::default());
        let _held = shared.radio_lock.lock().await;
        assert_eq!(scan.tick().await, TickOutcome::Busy);
        assert!(radio.calls().is_empty(), "no scan while locked");
    }

    #[tokio::test(start_paused = true)]
    async fn scan_failure_is_a_no_op() {
        let (shared, radio, scan) = fixture(ScanConfig::default());
        radio.fail_scans(true);
        assert_eq!(scan.tick().await, TickOutcome::Failed);
        assert!(shared.quality.snapshot().is_empty(), "nothing observed");
        assert!(shared.radio_lock.try_lock().is_ok(), "lock released after failure");

        radio.fail_scans(false);
        assert_eq!(scan.tick().await, TickOutcome::Scanned(3));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_is_suppressed_right_after_handover() {
        let (shared, radio, _) = fixture(ScanConfig::default());
        let rig = rig_with(Arc::clone(&shared), Arc::clone(&radio));
        let scan = ScanLoop::new(Arc::clone(&shared), Arc::clone(&radio), ScanConfig::default());
        rig.executor.handover(1).await.unwrap();
        let scans = || radio.count(|c| *c == RadioCall::Scan);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(scan.tick().await, TickOutcome::CoolingDown);
        assert_eq!(scans(), 0, "no scan one second after the handover");

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(scan.tick().await, TickOutcome::Scanned(_)), "scan resumes");
        assert_eq!(scans(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scans_and_handovers_never_overlap() {
        let shared = Arc::new(Shared::new(
            Attachment::wired("eth0", Some(WIRED_IP)),
            Duration::ZERO,
        ));
        let radio = Arc::new(FakeRadio::guarded_by(Arc::clone(&shared.radio_lock)));
        radio.set_table(vec![entry(AP1, -50.0, "HSLSV")]);
        let rig = rig_with(Arc::clone(&shared), Arc::clone(&radio));
        radio.confirm_after(2);
        let scan = Arc::new(ScanLoop::new(
            Arc::clone(&shared),
            Arc::clone(&radio),
            ScanConfig {
                interval_secs: 1,
                cooldown_secs: 0,
                settle_ms: 700,
                ..ScanConfig::default()
            },
        ));
        let scanner = tokio::spawn({
            let scan = Arc::clone(&scan);
            async move { scan.run().await }
        });

        let mut seed = rand::rng();
        let targets: Vec<u32> = (0..40).map(|_| seed.random_range(0..=2)).collect();
        drop(seed);
        for target in targets {
            sleep(Duration::from_millis(1300)).await;
            drop(rig.executor.handover(target).await);
        }
        scanner.abort();

        assert!(radio.count(|c| *c == RadioCall::Scan) > 5, "scan loop made progress");
        assert!(radio.count(|c| matches!(c, RadioCall::Roam(_))) > 5, "handovers made progress");
        assert_eq!(radio.unguarded(), vec![], "every radio call ran under the lock");
    }
}
