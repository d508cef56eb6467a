//! Interface address introspection and route-table control.

use core::{future::Future, net::Ipv4Addr};

use nix::ifaddrs;
use thiserror::Error as ThisError;

use crate::commands::{Tool, ToolError};

#[derive(Debug, ThisError)]
pub enum NetError {
    #[error("route utility failed")]
    Tool(#[from] ToolError),
    #[error("failed to enumerate interface addresses")]
    Interfaces(#[from] nix::Error),
}

/// An exclusive /32 route for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoute {
    pub destination: Ipv4Addr,
    pub interface: String,
    /// Next hop; `None` installs an on-link (`scope link`) route.
    pub via: Option<Ipv4Addr>,
}

impl HostRoute {
    /// Arguments for `ip route replace`.
    #[must_use]
    pub fn replace_args(&self) -> Vec<String> {
        let mut args = vec![
            "route".to_string(),
            "replace".to_string(),
            format!("{}/32", self.destination),
        ];
        if let Some(gateway) = self.via {
            args.extend(["via".to_string(), gateway.to_string()]);
        }
        args.extend(["dev".to_string(), self.interface.clone()]);
        if self.via.is_none() {
            args.extend(["scope".to_string(), "link".to_string()]);
        }
        args
    }
}

/// Host networking as the controller sees it.
pub trait NetControl: Send + Sync + 'static {
    /// First IPv4 address assigned to `interface`, if any.
    fn interface_ipv4(
        &self,
        interface: &str,
    ) -> impl Future<Output = Result<Option<Ipv4Addr>, NetError>> + Send;

    /// Gateway of the default route through `interface`, if there is one.
    fn default_gateway(
        &self,
        interface: &str,
    ) -> impl Future<Output = Result<Option<Ipv4Addr>, NetError>> + Send;

    /// Installs `route`, replacing any prior route to the same destination.
    fn route_replace(&self, route: &HostRoute) -> impl Future<Output = Result<(), NetError>> + Send;

    /// What the kernel would currently do with traffic to `destination`.
    fn route_get(
        &self,
        destination: Ipv4Addr,
    ) -> impl Future<Output = Result<String, NetError>> + Send;
}

/// [`NetControl`] backed by `getifaddrs(3)` and the `ip` utility.
#[derive(Debug, Clone)]
pub struct IpTool {
    tool: Tool,
}

impl IpTool {
    #[must_use]
    pub const fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl NetControl for IpTool {
    async fn interface_ipv4(&self, interface: &str) -> Result<Option<Ipv4Addr>, NetError> {
        let addrs = ifaddrs::getifaddrs()?;
        Ok(addrs
            .filter(|ifa| ifa.interface_name == interface)
            .find_map(|ifa| ifa.address.and_then(|a| a.as_sockaddr_in().map(|sin| sin.ip())))
            .filter(|ip| !ip.is_unspecified()))
    }

    async fn default_gateway(&self, interface: &str) -> Result<Option<Ipv4Addr>, NetError> {
        let reply = self
            .tool
            .run(&["route", "show", "default", "dev", interface])
            .await?;
        Ok(parse_gateway(&reply))
    }

    async fn route_replace(&self, route: &HostRoute) -> Result<(), NetError> {
        let args = route.replace_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.tool.run(&args).await?;
        Ok(())
    }

    async fn route_get(&self, destination: Ipv4Addr) -> Result<String, NetError> {
        let destination = destination.to_string();
        Ok(self.tool.run(&["route", "get", &destination]).await?)
    }
}

/// Extracts the `via` address from `ip route show default` output.
#[must_use]
pub fn parse_gateway(reply: &str) -> Option<Ipv4Addr> {
    reply.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        words.find(|w| *w == "via")?;
        words.next()?.parse().ok()
    })
}
