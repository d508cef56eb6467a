//! Receiving end for the load generator, for measuring what actually arrives.

use core::time::Duration;

use eyre::WrapErr as _;
use tokio::{
    net::UdpSocket,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::info;

/// Traffic received during one report window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub packets: u64,
    pub bytes: u64,
    pub mbps: f64,
}

#[derive(Debug)]
struct Meter {
    packets: u64,
    bytes: u64,
    since: Instant,
}

impl Meter {
    fn new() -> Self {
        Self {
            packets: 0,
            bytes: 0,
            since: Instant::now(),
        }
    }

    fn record(&mut self, len: usize) {
        self.packets += 1;
        self.bytes += len as u64;
    }

    /// Closes the current window and starts the next.
    #[expect(clippy::cast_precision_loss, reason = "throughput figures need no exactness")]
    fn take(&mut self) -> Report {
        let elapsed = self.since.elapsed().as_secs_f64();
        let mbps = if elapsed > 0.0 {
            (self.bytes * 8) as f64 / elapsed / 1e6
        } else {
            0.0
        };
        let report = Report {
            packets: self.packets,
            bytes: self.bytes,
            mbps,
        };
        *self = Self::new();
        report
    }
}

/// Binds the sink and logs throughput every `report` until the process ends.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or receiving fails.
pub async fn run(bind: &str, port: u16, report: Duration) -> eyre::Result<()> {
    let socket = UdpSocket::bind((bind, port))
        .await
        .wrap_err(format!("Failed to bind sink on {bind}:{port}"))?;
    info!(addr = %socket.local_addr()?, "Sink listening");
    serve(&socket, report, |r| {
        info!(packets = r.packets, bytes = r.bytes, mbps = %format!("{:.2}", r.mbps), "Received");
    })
    .await
}

async fn serve(
    socket: &UdpSocket,
    report: Duration,
    mut on_report: impl FnMut(&Report),
) -> eyre::Result<()> {
    let mut buf = vec![0_u8; 65_536];
    let mut meter = Meter::new();
    let mut ticker = time::interval_at(Instant::now() + report, report);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received.wrap_err("Sink receive failed")?;
                meter.record(len);
            }
            _ = ticker.tick() => on_report(&meter.take()),
        }
    }
}
