//! Process startup: host settings, backend selection, initial state.

use std::sync::Arc;

use slicerouter_common::shell::{build_sysctl_set_cmd, exec_or_throw, IPV4_FORWARD_KEY};
use slicerouter_common::{Dataplane, DataplaneMode, RouterError, RouterResult, SidecarConfig};
use tracing::{info, warn};

use crate::kernel::{KernelDataplane, NetlinkRouteTable};
use crate::router::SliceRouter;
use crate::vpp::{GrpcConfigurator, VppDataplane};

/// Builds the dataplane backend for `mode` from `config`.
pub fn build_dataplane(mode: DataplaneMode, config: &SidecarConfig) -> Arc<dyn Dataplane> {
    let nsm_interface = config.connections.client_interface_name.as_str();
    match mode {
        DataplaneMode::Kernel => Arc::new(KernelDataplane::new(
            NetlinkRouteTable::new(),
            config.kernel.interface_prefix.as_str(),
            nsm_interface,
        )),
        DataplaneMode::Vpp => Arc::new(VppDataplane::new(
            GrpcConfigurator::new(config.vpp.agent_endpoint.as_str(), config.request_timeout()),
            nsm_interface,
        )),
    }
}

/// Turns on IPv4 forwarding in the kernel.
pub async fn enable_ip_forwarding() -> RouterResult<()> {
    let cmd = build_sysctl_set_cmd(IPV4_FORWARD_KEY, "1");
    exec_or_throw(&cmd)
        .await
        .map_err(|e| RouterError::bootstrap(format!("failed to enable IP forwarding: {}", e)))?;
    info!(key = IPV4_FORWARD_KEY, "IP forwarding enabled");
    Ok(())
}

/// Initializes the slice router.
///
/// In kernel mode IP forwarding must be enabled first; failing that is
/// fatal. The store starts empty and the reconcile clock starts now. In VPP
/// mode the store may then be seeded from the agent's routes; a failure
/// there is logged and startup continues.
pub async fn bootstrap(config: &SidecarConfig) -> RouterResult<SliceRouter> {
    config.validate()?;

    let mode = config.dataplane_mode();
    info!(backend = %mode, "Bootstrapping slice router");

    if mode == DataplaneMode::Kernel {
        enable_ip_forwarding().await?;
    }

    let router = SliceRouter::new(build_dataplane(mode, config), config.reconcile_interval());

    if mode == DataplaneMode::Vpp && config.reconcile.recover_routes_on_start {
        if let Err(e) = router.recover_routes().await {
            warn!(error = %e, "Could not recover installed routes, starting with empty state");
        }
    }

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dataplane_follows_mode() {
        let config = SidecarConfig::default();
        assert_eq!(
            build_dataplane(DataplaneMode::Vpp, &config).mode(),
            DataplaneMode::Vpp
        );
        assert_eq!(
            build_dataplane(DataplaneMode::Kernel, &config).mode(),
            DataplaneMode::Kernel
        );
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_invalid_config() {
        let mut config = SidecarConfig::default();
        config.reconcile.interval_secs = 0;

        let err = bootstrap(&config).await.err().unwrap();
        assert!(matches!(err, RouterError::InvalidConfig { .. }));
    }
}
