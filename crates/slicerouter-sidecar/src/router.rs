//! Route injection orchestrator and client connection discovery.
//!
//! [`SliceRouter`] owns the desired routes and the reconcile clock behind a
//! single lock. An injection holds that lock from the throttle check to the
//! store update, so concurrent injections are serialized and the store only
//! ever reflects writes the backend accepted.

use std::sync::Arc;
use std::time::Duration;

use slicerouter_common::{ConnectionInfo, Dataplane, DataplaneMode, RouteIntent, RouterResult};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::ReconcileClock;
use crate::reconcile::{reconcile, ReconcileReport};
use crate::store::DesiredRouteTable;

struct RouterState {
    routes: DesiredRouteTable,
    clock: ReconcileClock,
}

/// The slice router's dataplane core.
pub struct SliceRouter {
    dataplane: Arc<dyn Dataplane>,
    state: Mutex<RouterState>,
}

impl SliceRouter {
    /// Creates a router with an empty store; the clock starts now.
    pub fn new(dataplane: Arc<dyn Dataplane>, reconcile_interval: Duration) -> Self {
        Self {
            dataplane,
            state: Mutex::new(RouterState {
                routes: DesiredRouteTable::new(),
                clock: ReconcileClock::new(reconcile_interval),
            }),
        }
    }

    pub fn mode(&self) -> DataplaneMode {
        self.dataplane.mode()
    }

    /// Parses and injects a route for `remote_subnet` via `next_hop`.
    pub async fn inject_route(&self, remote_subnet: &str, next_hop: &str) -> RouterResult<()> {
        let intent = RouteIntent::parse(remote_subnet, next_hop)?;
        self.inject(&intent).await
    }

    /// Makes `intent` the route for its subnet.
    ///
    /// Runs a reconciliation pass first when one is due. Re-injecting the
    /// recorded next hop is a no-op. On a backend that adds rather than
    /// replaces, the previously recorded route is deleted before the new
    /// one is added. The intent is recorded only once the backend write
    /// succeeded; if the delete went through but the add did not, the old
    /// entry is marked withdrawn so the next injection writes again.
    pub async fn inject(&self, intent: &RouteIntent) -> RouterResult<()> {
        let mut state = self.state.lock().await;

        if state.clock.is_due() {
            if let Err(e) = reconcile(self.dataplane.as_ref(), &state.routes).await {
                error!(error = %e, "Failed to reconcile routing table");
            }
            state.clock.mark();
        } else {
            debug!(
                since_last = ?state.clock.since_last(),
                "Skipping reconciliation, interval not reached"
            );
        }

        let prior = state.routes.get(&intent.remote_subnet);
        if state.routes.is_current(intent) {
            info!(
                subnet = %intent.remote_subnet,
                next_hop = %intent.next_hop,
                "Route already installed, ignoring"
            );
            return Ok(());
        }

        let mode = self.dataplane.mode();
        let withdrawn = state.routes.is_withdrawn(&intent.remote_subnet);
        if let Some(old_next_hop) = prior.filter(|_| !mode.replaces_routes() && !withdrawn) {
            let stale = RouteIntent::new(intent.remote_subnet, old_next_hop);
            if let Err(e) = self.dataplane.delete_route(&stale).await {
                error!(
                    backend = %mode,
                    subnet = %stale.remote_subnet,
                    next_hop = %stale.next_hop,
                    "Failed to delete route with old next hop"
                );
                return Err(e);
            }
            state.routes.mark_withdrawn(intent.remote_subnet);
        }

        self.dataplane.upsert_route(intent).await?;
        state.routes.record(intent);

        info!(
            backend = %mode,
            subnet = %intent.remote_subnet,
            next_hop = %intent.next_hop,
            replaced = ?prior,
            "Route injected"
        );
        Ok(())
    }

    /// Discovers the pod-facing tunnel connections on the backend.
    pub async fn list_client_connections(&self) -> RouterResult<Vec<ConnectionInfo>> {
        self.dataplane.connections().await
    }

    /// Runs a reconciliation pass now, regardless of the clock, and
    /// restarts the clock.
    pub async fn reconcile_now(&self) -> RouterResult<ReconcileReport> {
        let mut state = self.state.lock().await;
        let result = reconcile(self.dataplane.as_ref(), &state.routes).await;
        state.clock.mark();
        result
    }

    /// Snapshot of the desired routes, ordered by subnet.
    pub async fn desired_routes(&self) -> Vec<RouteIntent> {
        self.state.lock().await.routes.to_vec()
    }

    /// Seeds the store from routes already installed on the backend.
    ///
    /// Only subnets the store does not know yet are adopted. A subnet with
    /// several installed next hops is a leftover multipath route; the first
    /// one seen is adopted, so the next injection deletes it. Returns the
    /// number of adopted routes.
    pub async fn recover_routes(&self) -> RouterResult<usize> {
        let installed = self.dataplane.installed_routes().await?;
        let mut state = self.state.lock().await;

        let mut adopted = 0;
        for route in installed {
            let (Some(subnet), Some(next_hop)) = (route.destination, route.gateway) else {
                continue;
            };
            let intent = RouteIntent::new(subnet, next_hop);

            if state.routes.compare_and_set(&intent, None) {
                adopted += 1;
            } else if !state.routes.is_current(&intent) {
                warn!(
                    subnet = %subnet,
                    next_hop = %next_hop,
                    adopted = ?state.routes.get(&subnet),
                    "Stale multipath route found on backend"
                );
            }
        }

        info!(backend = %self.mode(), adopted, "Recovered installed routes");
        Ok(adopted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use slicerouter_common::{InstalledRoute, RouterError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Upsert(String),
        Delete(String),
        Installed,
    }

    struct FakeDataplane {
        mode: DataplaneMode,
        installed: Vec<InstalledRoute>,
        fail_upsert: AtomicBool,
        calls: StdMutex<Vec<Call>>,
    }

    impl FakeDataplane {
        fn new(mode: DataplaneMode) -> Self {
            Self {
                mode,
                installed: Vec::new(),
                fail_upsert: AtomicBool::new(false),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dataplane for FakeDataplane {
        fn mode(&self) -> DataplaneMode {
            self.mode
        }

        async fn upsert_route(&self, intent: &RouteIntent) -> RouterResult<()> {
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(RouterError::unreachable(self.mode, "update", "refused")
                    .in_route_write(self.mode, "add", intent.remote_subnet, intent.next_hop));
            }
            self.calls.lock().unwrap().push(Call::Upsert(intent.to_string()));
            Ok(())
        }

        async fn delete_route(&self, intent: &RouteIntent) -> RouterResult<()> {
            self.calls.lock().unwrap().push(Call::Delete(intent.to_string()));
            Ok(())
        }

        async fn installed_routes(&self) -> RouterResult<Vec<InstalledRoute>> {
            self.calls.lock().unwrap().push(Call::Installed);
            Ok(self.installed.clone())
        }

        async fn connections(&self) -> RouterResult<Vec<ConnectionInfo>> {
            Ok(Vec::new())
        }
    }

    fn router(dp: &Arc<FakeDataplane>) -> SliceRouter {
        SliceRouter::new(dp.clone(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_inject_vpp_deletes_prior_next_hop() {
        let dp = Arc::new(FakeDataplane::new(DataplaneMode::Vpp));
        let router = router(&dp);

        router.inject_route("10.1.0.0/16", "192.168.3.1").await.unwrap();
        router.inject_route("10.1.0.0/16", "192.168.3.5").await.unwrap();

        assert_eq!(
            dp.calls(),
            vec![
                Call::Upsert("10.1.0.0/16 via 192.168.3.1".to_string()),
                Call::Delete("10.1.0.0/16 via 192.168.3.1".to_string()),
                Call::Upsert("10.1.0.0/16 via 192.168.3.5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dp = Arc::new(FakeDataplane::new(DataplaneMode::Kernel));
        dp.fail_upsert.store(true, Ordering::SeqCst);
        let router = router(&dp);

        let err = router
            .inject_route("10.1.0.0/16", "192.168.3.1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("10.1.0.0/16 via 192.168.3.1"));
        assert!(router.desired_routes().await.is_empty());
    }

    #[tokio::test]
    async fn test_vpp_add_failure_after_delete_rewrites_old_next_hop() {
        let dp = Arc::new(FakeDataplane::new(DataplaneMode::Vpp));
        let router = router(&dp);
        router.inject_route("10.1.0.0/16", "192.168.3.1").await.unwrap();

        // Old path deleted, new path refused
        dp.fail_upsert.store(true, Ordering::SeqCst);
        router
            .inject_route("10.1.0.0/16", "192.168.3.5")
            .await
            .unwrap_err();
        dp.fail_upsert.store(false, Ordering::SeqCst);

        // Going back to the old next hop must reinstall it, without a
        // second delete of the route that is already gone
        router.inject_route("10.1.0.0/16", "192.168.3.1").await.unwrap();
        assert_eq!(
            dp.calls(),
            vec![
                Call::Upsert("10.1.0.0/16 via 192.168.3.1".to_string()),
                Call::Delete("10.1.0.0/16 via 192.168.3.1".to_string()),
                Call::Upsert("10.1.0.0/16 via 192.168.3.1".to_string()),
            ]
        );

        // Back in sync: re-injecting is a no-op again
        router.inject_route("10.1.0.0/16", "192.168.3.1").await.unwrap();
        assert_eq!(dp.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_input_issues_no_call() {
        let dp = Arc::new(FakeDataplane::new(DataplaneMode::Vpp));
        let router = router(&dp);

        let err = router.inject_route("10.1.0.0/33", "192.168.3.1").await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidAddress { .. }));
        assert!(router.inject_route("10.1.0.0/16", "gateway").await.is_err());
        assert!(dp.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recover_adopts_first_of_multipath() {
        let mut fake = FakeDataplane::new(DataplaneMode::Vpp);
        fake.installed = vec![
            InstalledRoute {
                destination: Some("10.1.0.0/16".parse().unwrap()),
                gateway: Some("192.168.3.1".parse().unwrap()),
                link_index: None,
            },
            InstalledRoute {
                destination: Some("10.1.0.0/16".parse().unwrap()),
                gateway: Some("192.168.3.5".parse().unwrap()),
                link_index: None,
            },
            InstalledRoute {
                destination: Some("10.2.0.0/16".parse().unwrap()),
                gateway: Some("192.168.3.9".parse().unwrap()),
                link_index: None,
            },
        ];
        let dp = Arc::new(fake);
        let router = router(&dp);

        assert_eq!(router.recover_routes().await.unwrap(), 2);
        let routes: Vec<String> = router
            .desired_routes()
            .await
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(
            routes,
            vec!["10.1.0.0/16 via 192.168.3.1", "10.2.0.0/16 via 192.168.3.9"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_now_resets_clock() {
        let dp = Arc::new(FakeDataplane::new(DataplaneMode::Kernel));
        let router = router(&dp);

        tokio::time::advance(Duration::from_secs(59)).await;
        router.reconcile_now().await.unwrap();
        assert_eq!(dp.calls(), vec![Call::Installed]);

        // 59s after the forced pass: not due yet
        tokio::time::advance(Duration::from_secs(59)).await;
        router.inject_route("10.1.0.0/16", "192.168.3.1").await.unwrap();
        assert_eq!(dp.calls().len(), 2);
        assert_eq!(dp.calls()[1], Call::Upsert("10.1.0.0/16 via 192.168.3.1".to_string()));
    }
}
