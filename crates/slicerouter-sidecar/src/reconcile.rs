//! Compare-and-repair pass over the desired routes.
//!
//! Only backends that report [`DataplaneMode::detects_drift`] are checked.
//! For the others the pass is a no-op: VPP drift is neither detected nor
//! repaired here.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use slicerouter_common::{Dataplane, DataplaneMode, RouterResult};
use tracing::{debug, error, info};

use crate::store::DesiredRouteTable;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Desired routes compared against the backend.
    pub checked: usize,
    /// Routes reinstalled because they were missing or pointed elsewhere.
    pub repaired: usize,
    /// Reinstalls that failed; logged and left for the next pass.
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.repaired == 0 && self.failed == 0
    }
}

/// Reinstalls every desired route the backend lost or points elsewhere.
///
/// Fails only if the installed routes cannot be listed. A failed reinstall
/// is counted in the report and does not stop the pass.
pub async fn reconcile(
    dataplane: &dyn Dataplane,
    desired: &DesiredRouteTable,
) -> RouterResult<ReconcileReport> {
    let mode = dataplane.mode();
    if !mode.detects_drift() {
        debug!(backend = %mode, "Backend drift is not reconciled");
        return Ok(ReconcileReport::default());
    }

    let installed: HashMap<Ipv4Net, Option<Ipv4Addr>> = dataplane
        .installed_routes()
        .await?
        .into_iter()
        .filter_map(|r| r.destination.map(|dst| (dst, r.gateway)))
        .collect();
    debug!(installed = installed.len(), desired = desired.len(), "Reconciling routes");

    let mut report = ReconcileReport::default();
    for intent in desired.iter() {
        report.checked += 1;

        let current = installed.get(&intent.remote_subnet);
        if current == Some(&Some(intent.next_hop)) {
            continue;
        }

        info!(
            subnet = %intent.remote_subnet,
            next_hop = %intent.next_hop,
            installed_gateway = ?current.copied().flatten(),
            "Installed route does not match desired state, reinstalling"
        );
        match dataplane.upsert_route(&intent).await {
            Ok(()) => report.repaired += 1,
            Err(e) => {
                error!(
                    subnet = %intent.remote_subnet,
                    next_hop = %intent.next_hop,
                    error = %e,
                    "Failed to reinstall route"
                );
                report.failed += 1;
            }
        }
    }

    log_report(mode, &report);
    Ok(report)
}

fn log_report(mode: DataplaneMode, report: &ReconcileReport) {
    if report.is_clean() {
        debug!(backend = %mode, checked = report.checked, "Routes in sync");
    } else {
        info!(
            backend = %mode,
            checked = report.checked,
            repaired = report.repaired,
            failed = report.failed,
            "Reconciliation pass complete"
        );
    }
}
