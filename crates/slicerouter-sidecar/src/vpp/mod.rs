//! VPP dataplane, programmed through the configuration agent.
//!
//! VPP treats a second route for the same prefix as an additional
//! equal-cost path, so replacing a next hop is always delete-then-add at
//! the orchestrator level. This adapter issues exactly the write it is
//! asked for.

pub mod client;
pub mod proto;

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use slicerouter_common::{
    ConnectionInfo, Dataplane, DataplaneMode, InstalledRoute, RouteIntent, RouterResult,
};
use tracing::{debug, info, warn};

pub use client::GrpcConfigurator;
use proto::{Interface, Route, RouteType, VppConfigData};

/// Requests the sidecar issues to the configuration agent.
#[async_trait]
pub trait ConfiguratorApi: Send + Sync {
    /// Adds or updates the given items.
    async fn update(&self, config: VppConfigData) -> RouterResult<()>;

    /// Removes the given items.
    async fn delete(&self, config: VppConfigData) -> RouterResult<()>;

    /// Returns the agent's current VPP configuration.
    async fn get(&self) -> RouterResult<VppConfigData>;
}

#[async_trait]
impl<C: ConfiguratorApi + ?Sized> ConfiguratorApi for Arc<C> {
    async fn update(&self, config: VppConfigData) -> RouterResult<()> {
        (**self).update(config).await
    }

    async fn delete(&self, config: VppConfigData) -> RouterResult<()> {
        (**self).delete(config).await
    }

    async fn get(&self) -> RouterResult<VppConfigData> {
        (**self).get().await
    }
}

/// Builds the single-route payload for `intent`.
pub fn route_config(intent: &RouteIntent) -> VppConfigData {
    VppConfigData {
        interfaces: Vec::new(),
        routes: vec![Route {
            r#type: RouteType::InterVrf as i32,
            dst_network: intent.remote_subnet.to_string(),
            next_hop_addr: intent.next_hop.to_string(),
            ..Default::default()
        }],
    }
}

/// Derives a client connection from a VPP tunnel interface.
///
/// The interface's first address is the router end of a /30; the client
/// end is the address one below it. Interfaces without an address are
/// skipped.
pub fn connection_from_interface(intf: &Interface, nsm_interface: &str) -> Option<ConnectionInfo> {
    let first = intf.ip_addresses.first()?;
    let addr_part = first.split('/').next().unwrap_or(first);

    let peer: Ipv4Addr = match addr_part.parse() {
        Ok(addr) => addr,
        Err(_) => {
            warn!(
                interface = %intf.name,
                address = %first,
                "Skipping interface without IPv4 address"
            );
            return None;
        }
    };

    let [a, b, c, d] = peer.octets();
    if d == 0 {
        warn!(
            interface = %intf.name,
            address = %first,
            "Skipping interface, no lower tunnel address"
        );
        return None;
    }

    Some(ConnectionInfo {
        pod_name: intf.name.clone(),
        nsm_interface: nsm_interface.to_string(),
        nsm_ip: Ipv4Addr::new(a, b, c, d - 1),
        nsm_peer_ip: peer,
    })
}

fn installed_from_route(route: &Route) -> Option<InstalledRoute> {
    let destination: Ipv4Net = match route.dst_network.parse() {
        Ok(net) => net,
        Err(_) => {
            debug!(dst = %route.dst_network, "Ignoring non-IPv4 vpp route");
            return None;
        }
    };

    Some(InstalledRoute {
        destination: Some(destination.trunc()),
        gateway: route.next_hop_addr.parse().ok(),
        link_index: None,
    })
}

/// VPP backend.
pub struct VppDataplane<C = GrpcConfigurator> {
    api: C,
    nsm_interface: String,
}

impl<C: ConfiguratorApi> VppDataplane<C> {
    pub fn new(api: C, nsm_interface: impl Into<String>) -> Self {
        Self {
            api,
            nsm_interface: nsm_interface.into(),
        }
    }
}

#[async_trait]
impl<C: ConfiguratorApi> Dataplane for VppDataplane<C> {
    fn mode(&self) -> DataplaneMode {
        DataplaneMode::Vpp
    }

    async fn upsert_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        self.api
            .update(route_config(intent))
            .await
            .map_err(|e| {
                e.in_route_write(
                    DataplaneMode::Vpp,
                    "add",
                    intent.remote_subnet,
                    intent.next_hop,
                )
            })?;
        info!(subnet = %intent.remote_subnet, next_hop = %intent.next_hop, "Route added in vpp");
        Ok(())
    }

    async fn delete_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        self.api
            .delete(route_config(intent))
            .await
            .map_err(|e| {
                e.in_route_write(
                    DataplaneMode::Vpp,
                    "delete",
                    intent.remote_subnet,
                    intent.next_hop,
                )
            })?;
        info!(subnet = %intent.remote_subnet, next_hop = %intent.next_hop, "Route deleted in vpp");
        Ok(())
    }

    async fn installed_routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        let config = self.api.get().await?;
        Ok(config
            .routes
            .iter()
            .filter(|r| r.r#type == RouteType::InterVrf as i32)
            .filter_map(installed_from_route)
            .collect())
    }

    async fn connections(&self) -> RouterResult<Vec<ConnectionInfo>> {
        let config = self.api.get().await?;
        debug!(interfaces = ?config.interfaces, "Vpp interface config");

        let connections: Vec<ConnectionInfo> = config
            .interfaces
            .iter()
            .filter_map(|intf| connection_from_interface(intf, &self.nsm_interface))
            .collect();

        info!(connections = ?connections, "Vpp client connections");
        Ok(connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicerouter_common::RouterError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAgent {
        config: VppConfigData,
        calls: Mutex<Vec<(String, VppConfigData)>>,
        fail: bool,
    }

    #[async_trait]
    impl ConfiguratorApi for FakeAgent {
        async fn update(&self, config: VppConfigData) -> RouterResult<()> {
            if self.fail {
                return Err(RouterError::unreachable(DataplaneMode::Vpp, "update", "refused"));
            }
            self.calls.lock().unwrap().push(("update".to_string(), config));
            Ok(())
        }

        async fn delete(&self, config: VppConfigData) -> RouterResult<()> {
            self.calls.lock().unwrap().push(("delete".to_string(), config));
            Ok(())
        }

        async fn get(&self) -> RouterResult<VppConfigData> {
            Ok(self.config.clone())
        }
    }

    fn interface(name: &str, addrs: &[&str]) -> Interface {
        Interface {
            name: name.to_string(),
            enabled: true,
            ip_addresses: addrs.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_route_config_payload() {
        let intent = RouteIntent::parse("10.1.0.0/16", "192.168.3.1").unwrap();
        let config = route_config(&intent);
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].dst_network, "10.1.0.0/16");
        assert_eq!(config.routes[0].next_hop_addr, "192.168.3.1");
        assert_eq!(config.routes[0].r#type, RouteType::InterVrf as i32);
        assert!(config.interfaces.is_empty());
    }

    #[test]
    fn test_connection_from_interface() {
        let conn = connection_from_interface(&interface("iperf-client", &["192.168.3.2/30"]), "nsm0")
            .unwrap();
        assert_eq!(conn.pod_name, "iperf-client");
        assert_eq!(conn.nsm_interface, "nsm0");
        assert_eq!(conn.nsm_peer_ip, Ipv4Addr::new(192, 168, 3, 2));
        assert_eq!(conn.nsm_ip, Ipv4Addr::new(192, 168, 3, 1));
    }

    #[test]
    fn test_connection_uses_first_address_only() {
        let conn = connection_from_interface(
            &interface("pod-a", &["10.5.0.6/30", "10.9.0.2/30"]),
            "nsm0",
        )
        .unwrap();
        assert_eq!(conn.nsm_peer_ip, Ipv4Addr::new(10, 5, 0, 6));
        assert_eq!(conn.nsm_ip, Ipv4Addr::new(10, 5, 0, 5));
    }

    #[test]
    fn test_connection_skips_unusable_interfaces() {
        assert!(connection_from_interface(&interface("loop0", &[]), "nsm0").is_none());
        assert!(connection_from_interface(&interface("v6", &["fd00::2/126"]), "nsm0").is_none());
        assert!(connection_from_interface(&interface("zero", &["10.0.0.0/30"]), "nsm0").is_none());
    }

    #[tokio::test]
    async fn test_connections_from_agent() {
        let agent = FakeAgent {
            config: VppConfigData {
                interfaces: vec![
                    interface("pod-a", &["192.168.3.2/30"]),
                    interface("local0", &[]),
                    interface("pod-b", &["192.168.3.6/30"]),
                ],
                routes: vec![],
            },
            ..Default::default()
        };
        let dp = VppDataplane::new(agent, "nsm0");

        let conns = dp.connections().await.unwrap();
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].pod_name, "pod-a");
        assert_eq!(conns[1].nsm_ip, Ipv4Addr::new(192, 168, 3, 5));
    }

    #[tokio::test]
    async fn test_installed_routes_inter_vrf_only() {
        let mut drop_route = route_config(&RouteIntent::parse("10.3.0.0/16", "10.0.0.1").unwrap())
            .routes
            .remove(0);
        drop_route.r#type = RouteType::Drop as i32;

        let mut routes = route_config(&RouteIntent::parse("10.1.0.0/16", "192.168.3.1").unwrap()).routes;
        routes.push(drop_route);

        let agent = FakeAgent {
            config: VppConfigData {
                interfaces: vec![],
                routes,
            },
            ..Default::default()
        };
        let dp = VppDataplane::new(agent, "nsm0");

        let installed = dp.installed_routes().await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].destination, Some("10.1.0.0/16".parse().unwrap()));
        assert_eq!(installed[0].gateway, Some(Ipv4Addr::new(192, 168, 3, 1)));
    }

    #[tokio::test]
    async fn test_upsert_and_delete_issue_agent_calls() {
        let dp = VppDataplane::new(FakeAgent::default(), "nsm0");
        let intent = RouteIntent::parse("10.1.0.0/16", "192.168.3.1").unwrap();

        dp.upsert_route(&intent).await.unwrap();
        dp.delete_route(&intent).await.unwrap();

        let calls = dp.api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "update");
        assert_eq!(calls[1].0, "delete");
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn test_upsert_failure_carries_route_context() {
        let agent = FakeAgent {
            fail: true,
            ..Default::default()
        };
        let dp = VppDataplane::new(agent, "nsm0");
        let intent = RouteIntent::parse("10.1.0.0/16", "192.168.3.1").unwrap();

        let err = dp.upsert_route(&intent).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("vpp route add failed for 10.1.0.0/16 via 192.168.3.1"));
        assert!(matches!(err.root_cause(), RouterError::BackendUnreachable { .. }));
    }
}
