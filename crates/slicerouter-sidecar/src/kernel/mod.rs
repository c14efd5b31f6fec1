//! Kernel dataplane, programmed over netlink.
//!
//! Routes are written with replace semantics and the on-link flag. The
//! outgoing link is the one already carrying the /32 host route to the
//! next hop; until that host route exists, route installs fail with
//! [`RouterError::NextHopLinkNotFound`].

pub mod netlink;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use slicerouter_common::{
    ConnectionInfo, Dataplane, DataplaneMode, InstalledRoute, RouteIntent, RouterError,
    RouterResult,
};
use tracing::{debug, error, info, warn};

pub use netlink::NetlinkRouteTable;

/// A network link as seen by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    /// Link alias; tunnel links carry the client pod name here.
    pub alias: Option<String>,
}

/// Route to install with `RTM_NEWROUTE` + `NLM_F_REPLACE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub link_index: u32,
    pub destination: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub onlink: bool,
}

/// Kernel routing, link and address tables (main table, IPv4 only).
#[async_trait]
pub trait RouteTable: Send + Sync {
    /// All IPv4 routes, including the default route.
    async fn routes(&self) -> RouterResult<Vec<InstalledRoute>>;

    /// Adds the route or replaces any route for the same destination.
    async fn replace_route(&self, route: &RouteSpec) -> RouterResult<()>;

    /// All network links.
    async fn links(&self) -> RouterResult<Vec<LinkInfo>>;

    /// IPv4 addresses assigned to one link.
    async fn ipv4_addresses(&self, link_index: u32) -> RouterResult<Vec<Ipv4Addr>>;
}

#[async_trait]
impl<T: RouteTable + ?Sized> RouteTable for Arc<T> {
    async fn routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        (**self).routes().await
    }

    async fn replace_route(&self, route: &RouteSpec) -> RouterResult<()> {
        (**self).replace_route(route).await
    }

    async fn links(&self) -> RouterResult<Vec<LinkInfo>> {
        (**self).links().await
    }

    async fn ipv4_addresses(&self, link_index: u32) -> RouterResult<Vec<Ipv4Addr>> {
        (**self).ipv4_addresses(link_index).await
    }
}

/// Maps each link to the client-side tunnel address found in its routes.
///
/// A /32 host route on the link wins over any other destination.
fn client_addresses(routes: &[InstalledRoute]) -> HashMap<u32, Ipv4Addr> {
    let mut by_link: HashMap<u32, (Ipv4Addr, bool)> = HashMap::new();

    for route in routes {
        let (Some(dst), Some(link)) = (route.destination, route.link_index) else {
            continue;
        };
        let is_host = dst.prefix_len() == 32;
        match by_link.get(&link) {
            Some((_, true)) if !is_host => {}
            _ => {
                by_link.insert(link, (dst.addr(), is_host));
            }
        }
    }

    by_link.into_iter().map(|(k, (addr, _))| (k, addr)).collect()
}

/// Kernel backend.
pub struct KernelDataplane<T = NetlinkRouteTable> {
    table: T,
    interface_prefix: String,
    nsm_interface: String,
}

impl<T: RouteTable> KernelDataplane<T> {
    pub fn new(
        table: T,
        interface_prefix: impl Into<String>,
        nsm_interface: impl Into<String>,
    ) -> Self {
        Self {
            table,
            interface_prefix: interface_prefix.into(),
            nsm_interface: nsm_interface.into(),
        }
    }

    /// Finds the link carrying the /32 host route to `next_hop`.
    async fn next_hop_link(&self, next_hop: Ipv4Addr) -> RouterResult<Option<u32>> {
        let routes = self.table.routes().await?;
        Ok(routes
            .iter()
            .find(|r| r.is_host_route_to(next_hop))
            .and_then(|r| r.link_index))
    }
}

#[async_trait]
impl<T: RouteTable> Dataplane for KernelDataplane<T> {
    fn mode(&self) -> DataplaneMode {
        DataplaneMode::Kernel
    }

    async fn upsert_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        let RouteIntent {
            remote_subnet,
            next_hop,
        } = *intent;

        let link_index = self.next_hop_link(next_hop).await.map_err(|e| {
            e.in_route_write(DataplaneMode::Kernel, "replace", remote_subnet, next_hop)
        })?;

        let Some(link_index) = link_index else {
            error!(
                subnet = %remote_subnet,
                next_hop = %next_hop,
                "Route add failed in kernel, link of next hop not found"
            );
            return Err(RouterError::NextHopLinkNotFound {
                destination: remote_subnet.to_string(),
                next_hop: next_hop.to_string(),
            }
            .in_route_write(DataplaneMode::Kernel, "replace", remote_subnet, next_hop));
        };

        let spec = RouteSpec {
            link_index,
            destination: remote_subnet,
            gateway: next_hop,
            onlink: true,
        };
        self.table.replace_route(&spec).await.map_err(|e| {
            error!(
                subnet = %remote_subnet,
                next_hop = %next_hop,
                error = %e,
                "Route add failed in kernel"
            );
            e.in_route_write(DataplaneMode::Kernel, "replace", remote_subnet, next_hop)
        })?;

        info!(subnet = %remote_subnet, next_hop = %next_hop, link_index, "Route added in kernel");
        Ok(())
    }

    async fn delete_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        debug!(route = %intent, "Kernel routes are replaced in place, nothing to delete");
        Ok(())
    }

    async fn installed_routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        let routes = self.table.routes().await?;
        Ok(routes.into_iter().filter(|r| !r.is_default()).collect())
    }

    async fn connections(&self) -> RouterResult<Vec<ConnectionInfo>> {
        let links = self.table.links().await.map_err(|e| {
            error!(error = %e, "Could not get link list");
            e
        })?;
        let routes = self.table.routes().await.map_err(|e| {
            error!(error = %e, "Could not get route list");
            e
        })?;
        let client_ips = client_addresses(&routes);

        let mut connections = Vec::new();
        for link in links
            .iter()
            .filter(|l| l.name.starts_with(&self.interface_prefix))
        {
            let addrs = match self.table.ipv4_addresses(link.index).await {
                Ok(addrs) => addrs,
                Err(e) => {
                    error!(interface = %link.name, error = %e, "Failed to get address list");
                    continue;
                }
            };
            if addrs.len() != 1 {
                info!(
                    interface = %link.name,
                    addresses = ?addrs,
                    "Expected exactly one address on tunnel interface"
                );
                continue;
            }

            let Some(nsm_ip) = client_ips.get(&link.index).copied() else {
                warn!(interface = %link.name, "No route on tunnel interface, skipping");
                continue;
            };

            connections.push(ConnectionInfo {
                pod_name: link.alias.clone().unwrap_or_else(|| link.name.clone()),
                nsm_interface: self.nsm_interface.clone(),
                nsm_ip,
                nsm_peer_ip: addrs[0],
            });
        }

        info!(connections = ?connections, "Kernel client connections");
        Ok(connections)
    }
}
