//! The external media pipeline process.

use core::{net::Ipv4Addr, time::Duration};
use std::{io, process::Stdio};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    process::{Child, Command},
    sync::Mutex,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::config::MediaConfig;

/// Handle to at most one running pipeline.
#[derive(Debug)]
pub struct MediaPipeline {
    config: MediaConfig,
    destination: Ipv4Addr,
    child: Mutex<Option<Child>>,
}

impl MediaPipeline {
    #[must_use]
    pub fn new(config: MediaConfig, destination: Ipv4Addr) -> Self {
        Self {
            config,
            destination,
            child: Mutex::new(None),
        }
    }

    /// Pipeline description handed to the media program.
    #[must_use]
    pub fn args(&self, bind_ip: Option<Ipv4Addr>) -> Vec<String> {
        let c = &self.config;
        let mut sink = vec![
            "udpsink".to_string(),
            format!("host={}", self.destination),
            format!("port={}", c.port),
        ];
        if let Some(ip) = bind_ip {
            sink.push(format!("bind-address={ip}"));
        }
        sink.extend(["sync=false".to_string(), "async=false".to_string()]);

        let mut args = vec![
            "v4l2src".to_string(),
            format!("device={}", c.device),
            "!".to_string(),
            format!(
                "video/x-h264,width={},height={},framerate={}/1",
                c.width, c.height, c.fps
            ),
            "!".to_string(),
            "rtph264pay".to_string(),
            "config-interval=1".to_string(),
            "pt=96".to_string(),
            "!".to_string(),
        ];
        args.extend(sink);
        args
    }

    /// Replaces any running pipeline with one bound to `bind_ip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the media program cannot be spawned.
    pub async fn start(&self, bind_ip: Option<Ipv4Addr>) -> Result<(), io::Error> {
        let mut slot = self.child.lock().await;
        if let Some(previous) = slot.take() {
            terminate(previous, self.grace()).await;
        }
        let args = self.args(bind_ip);
        debug!(program = %self.config.program, ?args, "Launching media pipeline");
        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(pid = ?child.id(), ?bind_ip, destination = %self.destination, "Media pipeline started");
        *slot = Some(child);
        Ok(())
    }

    /// Stops the running pipeline, if any.
    pub async fn stop(&self) {
        if let Some(child) = self.child.lock().await.take() {
            terminate(child, self.grace()).await;
        }
    }

    /// Whether a pipeline process is currently alive.
    pub async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    const fn grace(&self) -> Duration {
        Duration::from_millis(self.config.stop_grace_ms)
    }
}

/// Sends SIGTERM, waits up to `grace`, then kills.
pub(crate) async fn terminate(mut child: Child, grace: Duration) {
    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        // already reaped
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, "Failed to signal media pipeline: {e}");
    }
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(pid, %status, "Media pipeline exited"),
        Ok(Err(e)) => warn!(pid, "Failed to wait for media pipeline: {e}"),
        Err(_) => {
            warn!(pid, ?grace, "Media pipeline ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!(pid, "Failed to kill media pipeline: {e}");
            }
        }
    }
}
