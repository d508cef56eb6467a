//! Traffic that has to follow the attachment: the media pipeline and the UDP load.

mod load;
mod media;

use alloc::sync::Arc;
use core::{future::Future, net::Ipv4Addr};

pub use load::{LoadError, LoadGenerator};
pub use media::MediaPipeline;
use tokio::task::JoinHandle;
use tracing::{Instrument as _, debug, error, info};

use crate::{net::NetControl, route::RouteRedirector};

/// What the handover executor needs from the stream side.
pub trait StreamControl: Send + Sync + 'static {
    /// (Re)starts the media pipeline bound to `bind_ip` on `interface`.
    fn start_media(
        &self,
        interface: &str,
        bind_ip: Option<Ipv4Addr>,
    ) -> impl Future<Output = ()> + Send;

    /// Moves the load generator onto `interface`.
    fn retarget_load(&self, interface: &str) -> impl Future<Output = ()> + Send;
}

/// Owns the media pipeline and the load generator.
#[derive(Debug)]
pub struct StreamSupervisor<N> {
    redirector: Arc<RouteRedirector<N>>,
    destination: Ipv4Addr,
    media: Option<MediaPipeline>,
    load: Option<Arc<LoadGenerator<N>>>,
}

impl<N: NetControl> StreamSupervisor<N> {
    #[must_use]
    pub const fn new(
        redirector: Arc<RouteRedirector<N>>,
        destination: Ipv4Addr,
        media: Option<MediaPipeline>,
        load: Option<Arc<LoadGenerator<N>>>,
    ) -> Self {
        Self {
            redirector,
            destination,
            media,
            load,
        }
    }

    /// Starts the load generator's send loop, if load is enabled.
    pub fn spawn_load(&self) -> Option<JoinHandle<()>> {
        let load = Arc::clone(self.load.as_ref()?);
        Some(tokio::spawn(async move { load.run().await }.in_current_span()))
    }

    /// Stops the media pipeline. Returns whether it was still running.
    pub async fn shutdown(&self) -> bool {
        let Some(media) = &self.media else {
            return false;
        };
        let was_running = media.is_running().await;
        media.stop().await;
        if was_running {
            info!("Media pipeline stopped");
        } else {
            debug!("Media pipeline had already exited");
        }
        was_running
    }
}

impl<N: NetControl> StreamControl for StreamSupervisor<N> {
    async fn start_media(&self, interface: &str, bind_ip: Option<Ipv4Addr>) {
        self.redirector.ensure_route(self.destination, interface).await;
        let Some(media) = &self.media else {
            return;
        };
        if let Err(e) = media.start(bind_ip).await {
            error!(interface, "Failed to start media pipeline: {e}");
        }
    }

    async fn retarget_load(&self, interface: &str) {
        if let Some(load) = &self.load {
            load.update(interface).await;
        }
    }
}
