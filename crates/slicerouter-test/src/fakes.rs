//! In-memory backends for driving the sidecar without VPP or netlink
//!
//! - [`RecordingDataplane`]: a whole [`Dataplane`] that records every call
//!   and keeps an installed-route table with the mode's write semantics
//! - [`StaticRouteTable`]: kernel tables behind [`KernelDataplane`]
//! - [`StaticAgent`]: configuration agent behind [`VppDataplane`]
//!
//! [`KernelDataplane`]: slicerouter_sidecar::kernel::KernelDataplane
//! [`VppDataplane`]: slicerouter_sidecar::vpp::VppDataplane

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use slicerouter_common::{
    ConnectionInfo, Dataplane, DataplaneMode, InstalledRoute, RouteIntent, RouterError,
    RouterResult,
};
use slicerouter_sidecar::kernel::{LinkInfo, RouteSpec, RouteTable};
use slicerouter_sidecar::vpp::proto::{Route, VppConfigData};
use slicerouter_sidecar::vpp::ConfiguratorApi;
use tracing::debug;

/// A call issued to a [`RecordingDataplane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataplaneCall {
    Upsert(RouteIntent),
    Delete(RouteIntent),
    InstalledRoutes,
    Connections,
}

impl DataplaneCall {
    /// True for calls that change backend state
    pub fn is_write(&self) -> bool {
        matches!(self, DataplaneCall::Upsert(_) | DataplaneCall::Delete(_))
    }
}

/// Dataplane double that records calls.
///
/// Upserts replace the subnet's route in kernel mode and add another path
/// in VPP mode. Deletes remove the matching path in VPP mode and do nothing
/// in kernel mode.
pub struct RecordingDataplane {
    mode: DataplaneMode,
    calls: Mutex<Vec<DataplaneCall>>,
    installed: Mutex<Vec<InstalledRoute>>,
    failing: Mutex<HashSet<Ipv4Net>>,
    connections: Mutex<Vec<ConnectionInfo>>,
}

impl RecordingDataplane {
    pub fn new(mode: DataplaneMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
            installed: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn kernel() -> Self {
        Self::new(DataplaneMode::Kernel)
    }

    pub fn vpp() -> Self {
        Self::new(DataplaneMode::Vpp)
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<DataplaneCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Upserts and deletes so far, in order
    pub fn writes(&self) -> Vec<DataplaneCall> {
        self.calls().into_iter().filter(|c| c.is_write()).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Replaces the installed-route table
    pub fn set_installed(&self, routes: Vec<InstalledRoute>) {
        *self.installed.lock().unwrap() = routes;
    }

    pub fn installed(&self) -> Vec<InstalledRoute> {
        self.installed.lock().unwrap().clone()
    }

    /// Gateways currently installed for `subnet`
    pub fn live_paths(&self, subnet: Ipv4Net) -> Vec<Ipv4Addr> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.destination == Some(subnet))
            .filter_map(|r| r.gateway)
            .collect()
    }

    /// Makes upserts for `subnet` fail as an unreachable backend would
    pub fn fail_for(&self, subnet: Ipv4Net) {
        self.failing.lock().unwrap().insert(subnet);
    }

    pub fn set_connections(&self, connections: Vec<ConnectionInfo>) {
        *self.connections.lock().unwrap() = connections;
    }

    fn record(&self, call: DataplaneCall) {
        debug!(call = ?call, "Recorded dataplane call");
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Dataplane for RecordingDataplane {
    fn mode(&self) -> DataplaneMode {
        self.mode
    }

    async fn upsert_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        self.record(DataplaneCall::Upsert(*intent));

        if self.failing.lock().unwrap().contains(&intent.remote_subnet) {
            return Err(
                RouterError::unreachable(self.mode, "upsert", "injected failure").in_route_write(
                    self.mode,
                    "add",
                    intent.remote_subnet,
                    intent.next_hop,
                ),
            );
        }

        let mut installed = self.installed.lock().unwrap();
        if self.mode.replaces_routes() {
            installed.retain(|r| r.destination != Some(intent.remote_subnet));
        }
        installed.push(InstalledRoute {
            destination: Some(intent.remote_subnet),
            gateway: Some(intent.next_hop),
            link_index: None,
        });
        Ok(())
    }

    async fn delete_route(&self, intent: &RouteIntent) -> RouterResult<()> {
        self.record(DataplaneCall::Delete(*intent));

        if !self.mode.replaces_routes() {
            self.installed.lock().unwrap().retain(|r| {
                r.destination != Some(intent.remote_subnet) || r.gateway != Some(intent.next_hop)
            });
        }
        Ok(())
    }

    async fn installed_routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        self.record(DataplaneCall::InstalledRoutes);
        Ok(self.installed())
    }

    async fn connections(&self) -> RouterResult<Vec<ConnectionInfo>> {
        self.record(DataplaneCall::Connections);
        Ok(self.connections.lock().unwrap().clone())
    }
}

/// Kernel route, link and address tables held in memory.
///
/// `replace_route` overwrites any route for the same destination.
#[derive(Default)]
pub struct StaticRouteTable {
    routes: Mutex<Vec<InstalledRoute>>,
    links: Vec<LinkInfo>,
    addresses: HashMap<u32, Vec<Ipv4Addr>>,
    replaced: Mutex<Vec<RouteSpec>>,
}

impl StaticRouteTable {
    pub fn new(routes: Vec<InstalledRoute>) -> Self {
        Self {
            routes: Mutex::new(routes),
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: LinkInfo, addresses: &[Ipv4Addr]) -> Self {
        self.addresses.insert(link.index, addresses.to_vec());
        self.links.push(link);
        self
    }

    /// Every `replace_route` call so far
    pub fn replaced(&self) -> Vec<RouteSpec> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn current_routes(&self) -> Vec<InstalledRoute> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteTable for StaticRouteTable {
    async fn routes(&self) -> RouterResult<Vec<InstalledRoute>> {
        Ok(self.current_routes())
    }

    async fn replace_route(&self, route: &RouteSpec) -> RouterResult<()> {
        self.replaced.lock().unwrap().push(*route);

        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| r.destination != Some(route.destination));
        routes.push(InstalledRoute {
            destination: Some(route.destination),
            gateway: Some(route.gateway),
            link_index: Some(route.link_index),
        });
        Ok(())
    }

    async fn links(&self) -> RouterResult<Vec<LinkInfo>> {
        Ok(self.links.clone())
    }

    async fn ipv4_addresses(&self, link_index: u32) -> RouterResult<Vec<Ipv4Addr>> {
        Ok(self.addresses.get(&link_index).cloned().unwrap_or_default())
    }
}

/// An agent request seen by [`StaticAgent`]
#[derive(Debug, Clone, PartialEq)]
pub enum AgentRequest {
    Update(Vec<Route>),
    Delete(Vec<Route>),
    Get,
}

/// Configuration agent holding one VPP config snapshot.
///
/// Updates append routes, as VPP does; deletes remove exact matches.
#[derive(Default)]
pub struct StaticAgent {
    config: Mutex<VppConfigData>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl StaticAgent {
    pub fn new(config: VppConfigData) -> Self {
        Self {
            config: Mutex::new(config),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> VppConfigData {
        self.config.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfiguratorApi for StaticAgent {
    async fn update(&self, config: VppConfigData) -> RouterResult<()> {
        self.requests
            .lock()
            .unwrap()
            .push(AgentRequest::Update(config.routes.clone()));
        self.config.lock().unwrap().routes.extend(config.routes);
        Ok(())
    }

    async fn delete(&self, config: VppConfigData) -> RouterResult<()> {
        self.requests
            .lock()
            .unwrap()
            .push(AgentRequest::Delete(config.routes.clone()));
        self.config
            .lock()
            .unwrap()
            .routes
            .retain(|r| !config.routes.contains(r));
        Ok(())
    }

    async fn get(&self) -> RouterResult<VppConfigData> {
        self.requests.lock().unwrap().push(AgentRequest::Get);
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_dataplane_vpp_paths_accumulate() {
        let dp = RecordingDataplane::vpp();
        let subnet: Ipv4Net = "10.1.0.0/16".parse().unwrap();

        dp.upsert_route(&RouteIntent::new(subnet, Ipv4Addr::new(10, 0, 0, 1)))
            .await
            .unwrap();
        dp.upsert_route(&RouteIntent::new(subnet, Ipv4Addr::new(10, 0, 0, 2)))
            .await
            .unwrap();
        assert_eq!(dp.live_paths(subnet).len(), 2);

        dp.delete_route(&RouteIntent::new(subnet, Ipv4Addr::new(10, 0, 0, 1)))
            .await
            .unwrap();
        assert_eq!(dp.live_paths(subnet), vec![Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[tokio::test]
    async fn test_recording_dataplane_kernel_replaces() {
        let dp = RecordingDataplane::kernel();
        let subnet: Ipv4Net = "10.1.0.0/16".parse().unwrap();

        dp.upsert_route(&RouteIntent::new(subnet, Ipv4Addr::new(10, 0, 0, 1)))
            .await
            .unwrap();
        dp.upsert_route(&RouteIntent::new(subnet, Ipv4Addr::new(10, 0, 0, 2)))
            .await
            .unwrap();
        assert_eq!(dp.live_paths(subnet), vec![Ipv4Addr::new(10, 0, 0, 2)]);
        assert_eq!(dp.writes().len(), 2);
    }
}
