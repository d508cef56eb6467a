//! The aggregate owning every long-running task of the agent.

use alloc::sync::Arc;
use core::time::Duration;

use chrono::Local;
use linkshift_common::{Envelope, EventName};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{Instrument as _, debug, error, info, warn};

use super::{HandoverError, HandoverExecutor, HandoverOutcome, ScanLoop, Shared};
use crate::{
    commands::execute_reboot,
    config::AgentConfig,
    control::{
        Connector, ControlChannel, Directive, Ignored, interpret,
        telemetry::{build_report, connections},
    },
    net::NetControl,
    radio::Radio,
    stream::StreamControl,
};

/// Wires the scan loop, the executor and the control channel together.
#[derive(Debug)]
pub struct Controller<R, N, S, C> {
    config: Arc<AgentConfig>,
    shared: Arc<Shared>,
    executor: Arc<HandoverExecutor<R, N, S>>,
    scan: Arc<ScanLoop<R>>,
    channel: Arc<ControlChannel<C>>,
}

impl<R: Radio, N: NetControl, S: StreamControl, C: Connector> Controller<R, N, S, C> {
    #[must_use]
    pub const fn new(
        config: Arc<AgentConfig>,
        shared: Arc<Shared>,
        executor: Arc<HandoverExecutor<R, N, S>>,
        scan: Arc<ScanLoop<R>>,
        channel: Arc<ControlChannel<C>>,
    ) -> Self {
        Self {
            config,
            shared,
            executor,
            scan,
            channel,
        }
    }

    #[must_use]
    pub const fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    #[must_use]
    pub const fn executor(&self) -> &Arc<HandoverExecutor<R, N, S>> {
        &self.executor
    }

    #[must_use]
    pub const fn channel(&self) -> &Arc<ControlChannel<C>> {
        &self.channel
    }

    /// Binds streams to the wired interface, then starts every background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial wired binding fails.
    #[tracing::instrument(skip_all, fields(node = self.config.node.id))]
    pub async fn start(
        self: &Arc<Self>,
        inbound: mpsc::Receiver<Envelope>,
    ) -> Result<Vec<JoinHandle<()>>, HandoverError> {
        if let HandoverOutcome::Bound(attachment) = self.executor.handover(0).await? {
            info!(%attachment, "Initial attachment");
        }

        let mut tasks = Vec::with_capacity(5);
        let scan = Arc::clone(&self.scan);
        tasks.push(tokio::spawn(async move { scan.run().await }.in_current_span()));
        tasks.extend(self.channel.spawn());
        tasks.push(tokio::spawn(Arc::clone(self).telemetry().in_current_span()));
        tasks.push(tokio::spawn(Arc::clone(self).dispatch(inbound).in_current_span()));
        Ok(tasks)
    }

    /// Reports link quality every telemetry period while connected.
    async fn telemetry(self: Arc<Self>) {
        let mut ticker = time::interval(Duration::from_secs(self.config.server.telemetry_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.channel.is_connected() {
                continue;
            }
            let attachment = self.shared.attachment.get();
            let quality = self.shared.quality.snapshot();
            let reports = connections(
                &self.config.access_points,
                &self.config.interfaces.wireless,
                &attachment,
                &quality,
            );
            let Some(report) = build_report(
                self.config.node.id,
                reports,
                self.config.telemetry.skip_when_unassociated,
                &Local::now(),
            ) else {
                debug!("Not associated with any access point, skipping telemetry");
                continue;
            };
            match self.channel.emit(EventName::Telemetry, &report) {
                Ok(sent) => debug!(sent, "Telemetry"),
                Err(e) => warn!("Failed to send telemetry: {e}"),
            }
        }
    }

    /// Acts on inbound events. Handovers run on their own task so a request arriving
    /// mid-handover is rejected as busy instead of queued.
    async fn dispatch(self: Arc<Self>, mut inbound: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = inbound.recv().await {
            match interpret(&envelope, self.config.node.id) {
                Ok(Directive::Handover(target)) => {
                    if target == 0 {
                        info!("Handover to wired requested");
                    } else if let Some(ap) = self.config.access_point(target) {
                        info!(target, bssid = %ap.bssid, "Handover requested");
                    } else {
                        warn!(target, "Handover to unknown access point requested, ignoring");
                        continue;
                    }
                    let executor = Arc::clone(&self.executor);
                    tokio::spawn(
                        async move {
                            match executor.handover(target).await {
                                Ok(outcome) => debug!(?outcome, "Handover finished"),
                                Err(e) => warn!(target, "Handover not performed: {e}"),
                            }
                        }
                        .in_current_span(),
                    );
                }
                Ok(Directive::Reboot) => {
                    warn!("Reboot requested by control server");
                    if let Err(e) = execute_reboot(&self.config.system.reboot_command).await {
                        error!("Failed to execute reboot: {e}");
                    }
                }
                Err(Ignored::Lifecycle(event)) => info!(%event, "Control server notice"),
                Err(reason) => debug!(event = %envelope.event, ?reason, "Ignoring control event"),
            }
        }
        debug!("Inbound event stream ended");
    }
}
