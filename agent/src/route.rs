//! Steering one destination's traffic onto a chosen interface.

use alloc::sync::Arc;
use core::net::Ipv4Addr;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::net::{HostRoute, NetControl};

/// Installs /32 host routes, best effort.
#[derive(Debug)]
pub struct RouteRedirector<N> {
    net: Arc<N>,
    gateways: HashMap<String, Ipv4Addr>,
}

impl<N: NetControl> RouteRedirector<N> {
    #[must_use]
    pub const fn new(net: Arc<N>, gateways: HashMap<String, Ipv4Addr>) -> Self {
        Self { net, gateways }
    }

    /// Picks the next hop for `interface`: configured override, then the interface's
    /// default-route gateway, then none (on-link).
    pub async fn next_hop(&self, interface: &str) -> Option<Ipv4Addr> {
        if let Some(gateway) = self.gateways.get(interface) {
            return Some(*gateway);
        }
        match self.net.default_gateway(interface).await {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(interface, "Could not determine default gateway: {e}");
                None
            }
        }
    }

    /// Makes traffic to `destination` leave through `interface`. Idempotent; failures are
    /// logged and otherwise ignored.
    pub async fn ensure_route(&self, destination: Ipv4Addr, interface: &str) -> Option<HostRoute> {
        let route = HostRoute {
            destination,
            interface: interface.to_string(),
            via: self.next_hop(interface).await,
        };
        if let Err(e) = self.net.route_replace(&route).await {
            warn!(%destination, interface, "Failed to install host route: {e}");
            return None;
        }
        info!(%destination, interface, via = ?route.via, "Host route installed");
        match self.net.route_get(destination).await {
            Ok(echo) => debug!(%destination, route = echo.trim(), "Kernel route"),
            Err(e) => debug!(%destination, "route get failed: {e}"),
        }
        Some(route)
    }
}
