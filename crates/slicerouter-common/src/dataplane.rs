//! Dataplane contract shared by the VPP and kernel backends.
//!
//! The sidecar programs exactly one dataplane per process. Which one is
//! decided once at startup ([`DataplaneMode`]); everything above the
//! adapters talks to the [`Dataplane`] trait.

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Environment variable that selects the dataplane.
pub const DATAPLANE_ENV: &str = "DATAPLANE";

/// The only setting value that selects the kernel backend.
pub const DATAPLANE_KERNEL: &str = "kernel";

/// Forwarding substrate the sidecar programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataplaneMode {
    /// User-space vector packet processor, programmed through the
    /// configuration agent. Selected for any setting other than "kernel".
    #[default]
    Vpp,
    /// Host kernel routing table, programmed over netlink.
    Kernel,
}

impl DataplaneMode {
    /// Resolves a raw mode setting.
    ///
    /// Only the exact string `"kernel"` selects [`DataplaneMode::Kernel`];
    /// an absent, empty or unknown value resolves to [`DataplaneMode::Vpp`].
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            Some(DATAPLANE_KERNEL) => DataplaneMode::Kernel,
            _ => DataplaneMode::Vpp,
        }
    }

    /// Resolves the mode from the `DATAPLANE` environment variable, or
    /// `None` when it is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(DATAPLANE_ENV)
            .ok()
            .map(|value| Self::from_setting(Some(&value)))
    }

    /// Returns the mode name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataplaneMode::Vpp => "vpp",
            DataplaneMode::Kernel => "kernel",
        }
    }

    /// True when writing a route overwrites any existing route for the
    /// same destination. VPP adds an extra equal-cost path instead.
    pub fn replaces_routes(&self) -> bool {
        matches!(self, DataplaneMode::Kernel)
    }

    /// True when installed state is compared against desired state during
    /// reconciliation. VPP drift is not checked.
    pub fn detects_drift(&self) -> bool {
        matches!(self, DataplaneMode::Kernel)
    }
}

impl fmt::Display for DataplaneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One desired forwarding rule: traffic for `remote_subnet` goes to
/// `next_hop`. Keyed by subnet; a subnet has at most one next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteIntent {
    /// Remote subnet, host bits cleared.
    pub remote_subnet: Ipv4Net,
    /// Gateway for the subnet.
    pub next_hop: Ipv4Addr,
}

impl RouteIntent {
    pub fn new(remote_subnet: Ipv4Net, next_hop: Ipv4Addr) -> Self {
        Self {
            remote_subnet: remote_subnet.trunc(),
            next_hop,
        }
    }

    /// Parses a `(CIDR, IP)` string pair as received from the control plane.
    pub fn parse(remote_subnet: &str, next_hop: &str) -> RouterResult<Self> {
        let subnet: Ipv4Net = remote_subnet.trim().parse().map_err(|e| {
            RouterError::invalid_address("remote subnet", remote_subnet, format!("{}", e))
        })?;
        let gateway: Ipv4Addr = next_hop
            .trim()
            .parse()
            .map_err(|e| RouterError::invalid_address("next hop", next_hop, format!("{}", e)))?;
        Ok(Self::new(subnet, gateway))
    }
}

impl fmt::Display for RouteIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.remote_subnet, self.next_hop)
    }
}

/// A route as observed on the live backend.
///
/// Only valid for the duration of one reconciliation or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRoute {
    /// Destination network; `None` for the default route.
    pub destination: Option<Ipv4Net>,
    /// Gateway, if the route has one.
    pub gateway: Option<Ipv4Addr>,
    /// Outgoing link index (kernel only).
    pub link_index: Option<u32>,
}

impl InstalledRoute {
    pub fn is_default(&self) -> bool {
        self.destination.is_none()
    }

    /// True if this is the /32 host route for `addr`.
    pub fn is_host_route_to(&self, addr: Ipv4Addr) -> bool {
        self.destination
            .map(|dst| dst.prefix_len() == 32 && dst.addr() == addr)
            .unwrap_or(false)
    }
}

/// A pod-facing tunnel as discovered on the dataplane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Client pod owning the tunnel.
    pub pod_name: String,
    /// Interface name reported to the control plane.
    pub nsm_interface: String,
    /// Tunnel address on the client pod's end.
    pub nsm_ip: Ipv4Addr,
    /// Tunnel address on the slice router's end.
    pub nsm_peer_ip: Ipv4Addr,
}

/// Operations every dataplane backend provides.
#[async_trait]
pub trait Dataplane: Send + Sync {
    /// Which backend this is.
    fn mode(&self) -> DataplaneMode;

    /// Installs the route, replacing or adding according to the backend's
    /// semantics (see [`DataplaneMode::replaces_routes`]).
    async fn upsert_route(&self, intent: &RouteIntent) -> RouterResult<()>;

    /// Removes a previously installed route. Backends with replace
    /// semantics may treat this as a no-op.
    async fn delete_route(&self, intent: &RouteIntent) -> RouterResult<()>;

    /// Lists currently installed IPv4 routes.
    async fn installed_routes(&self) -> RouterResult<Vec<InstalledRoute>>;

    /// Enumerates the pod-facing tunnel interfaces.
    async fn connections(&self) -> RouterResult<Vec<ConnectionInfo>>;
}
