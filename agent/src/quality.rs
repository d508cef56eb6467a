//! Smoothed per-BSSID signal strength.

use alloc::sync::Arc;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
};

use linkshift_common::MacAddr;
use tokio::sync::watch;

/// Number of raw samples averaged per access point.
pub const WINDOW: usize = 4;

pub type QualitySnapshot = Arc<HashMap<MacAddr, f64>>;

/// Sliding-window RSSI estimator.
///
/// Writers go through a mutex; readers get the published means from a watch channel and
/// never contend with scanning.
#[derive(Debug)]
pub struct LinkQuality {
    windows: Mutex<HashMap<MacAddr, VecDeque<f64>>>,
    published: watch::Sender<QualitySnapshot>,
}

impl Default for LinkQuality {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkQuality {
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            published: watch::Sender::new(Arc::default()),
        }
    }

    /// Records one sample for `address`.
    pub fn observe(&self, address: MacAddr, rssi: f64) {
        self.observe_batch([(address, rssi)]);
    }

    /// Records a whole scan's worth of samples and publishes once.
    pub fn observe_batch(&self, samples: impl IntoIterator<Item = (MacAddr, f64)>) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (address, rssi) in samples {
            let window = windows.entry(address).or_default();
            window.push_back(rssi);
            while window.len() > WINDOW {
                window.pop_front();
            }
        }
        let means = windows
            .iter()
            .filter_map(|(address, window)| mean(window).map(|m| (*address, m)))
            .collect();
        self.published.send_replace(Arc::new(means));
    }

    /// Current smoothed value per observed address.
    #[must_use]
    pub fn snapshot(&self) -> QualitySnapshot {
        Arc::clone(&self.published.borrow())
    }

    /// Raw samples currently held for `address`, oldest first.
    #[must_use]
    pub fn window(&self, address: MacAddr) -> Vec<f64> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[expect(clippy::cast_precision_loss, reason = "window holds at most four samples")]
fn mean(window: &VecDeque<f64>) -> Option<f64> {
    (!window.is_empty()).then(|| window.iter().sum::<f64>() / window.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AP: MacAddr = MacAddr::new([0x00, 0x11, 0x32, 0xaa, 0x00, 0x01]);
    const OTHER: MacAddr = MacAddr::new([0x00, 0x11, 0x32, 0xaa, 0x00, 0x02]);

    #[test]
    fn window_keeps_last_four_samples() {
        let quality = LinkQuality::new();
        for rssi in [-40.0, -50.0, -60.0, -70.0, -80.0, -90.0] {
            quality.observe(AP, rssi);
        }
        assert_eq!(quality.window(AP), vec![-60.0, -70.0, -80.0, -90.0]);
        let mean = quality.snapshot()[&AP];
        assert!((mean + 75.0).abs() < 1e-9, "mean of the last four, got {mean}");
    }

    #[test]
    fn short_window_averages_what_it_has() {
        let quality = LinkQuality::new();
        quality.observe_batch([(AP, -50.0), (OTHER, -70.0), (AP, -60.0)]);
        let snapshot = quality.snapshot();
        assert!((snapshot[&AP] + 55.0).abs() < 1e-9, "two samples averaged");
        assert!((snapshot[&OTHER] + 70.0).abs() < 1e-9, "single sample is its own mean");
    }

    #[test]
    fn unobserved_address_has_no_entry() {
        let quality = LinkQuality::new();
        assert!(quality.snapshot().is_empty(), "nothing observed yet");
        assert!(quality.window(AP).is_empty(), "no window before first sample");
    }
}
