//! Test fixtures for routes, links and agent interfaces
//!
//! Addresses follow the tunnel convention: each pod link is a /30 with the
//! router side one above the client side.

use std::net::Ipv4Addr;

use slicerouter_common::{InstalledRoute, RouteIntent};
use slicerouter_sidecar::kernel::LinkInfo;
use slicerouter_sidecar::vpp::proto::{Interface, VppConfigData};
use slicerouter_sidecar::vpp::route_config;

/// Parses a route intent; panics on malformed fixtures.
pub fn intent(subnet: &str, next_hop: &str) -> RouteIntent {
    RouteIntent::parse(subnet, next_hop).unwrap_or_else(|e| panic!("bad fixture: {}", e))
}

/// Parses an IPv4 address; panics on malformed fixtures.
pub fn ip(addr: &str) -> Ipv4Addr {
    addr.parse()
        .unwrap_or_else(|e| panic!("bad fixture address {}: {}", addr, e))
}

/// Common route fixtures
pub mod route_fixtures {
    use super::*;

    /// Remote cluster subnet reached through a slice gateway
    pub const REMOTE_SUBNET: &str = "10.0.1.0/24";

    /// Slice gateway tunnel address
    pub const GATEWAY: &str = "10.0.0.5";

    /// A second slice gateway for the same remote subnet
    pub const ALT_GATEWAY: &str = "10.0.0.9";

    /// Installed route with a gateway on `link_index`
    pub fn installed(dst: &str, gw: &str, link_index: u32) -> InstalledRoute {
        InstalledRoute {
            destination: Some(dst.parse().unwrap_or_else(|e| panic!("bad fixture: {}", e))),
            gateway: Some(ip(gw)),
            link_index: Some(link_index),
        }
    }

    /// Directly connected host route (no gateway)
    pub fn host_route(addr: &str, link_index: u32) -> InstalledRoute {
        let dst = format!("{}/32", addr);
        InstalledRoute {
            destination: Some(dst.parse().unwrap_or_else(|e| panic!("bad fixture: {}", e))),
            gateway: None,
            link_index: Some(link_index),
        }
    }

    /// Default route via the pod network
    pub fn default_route(gw: &str, link_index: u32) -> InstalledRoute {
        InstalledRoute {
            destination: None,
            gateway: Some(ip(gw)),
            link_index: Some(link_index),
        }
    }
}

/// Kernel link fixtures
pub mod kernel_fixtures {
    use super::*;

    /// Tunnel link named with the overlay prefix, aliased to its pod
    pub fn tunnel_link(index: u32, suffix: &str, pod: &str) -> LinkInfo {
        LinkInfo {
            index,
            name: format!("vl3-{}", suffix),
            alias: Some(pod.to_string()),
        }
    }

    /// Host link outside the overlay
    pub fn host_link(index: u32, name: &str) -> LinkInfo {
        LinkInfo {
            index,
            name: name.to_string(),
            alias: None,
        }
    }
}

/// Configuration agent fixtures
pub mod vpp_fixtures {
    use super::*;

    /// VPP interface with the given CIDR-suffixed addresses
    pub fn interface(name: &str, addrs: &[&str]) -> Interface {
        Interface {
            name: name.to_string(),
            enabled: true,
            ip_addresses: addrs.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Agent snapshot holding `interfaces` and the routes for `routes`
    pub fn snapshot(interfaces: Vec<Interface>, routes: &[RouteIntent]) -> VppConfigData {
        VppConfigData {
            interfaces,
            routes: routes
                .iter()
                .flat_map(|r| route_config(r).routes)
                .collect(),
        }
    }
}
