//! Configuration file support for the slice router sidecar
//!
//! Loads and validates sidecar configuration from TOML files.
//! Default location: /etc/slicerouter/sidecar.toml
//!
//! The dataplane mode can also come from the `DATAPLANE` environment
//! variable, which takes precedence over the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::dataplane::DataplaneMode;
use crate::error::{RouterError, RouterResult};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/slicerouter/sidecar.toml";

/// Dataplane selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataplaneConfig {
    /// Raw mode setting; "kernel" selects the kernel backend
    #[serde(default)]
    pub mode: Option<String>,
}

/// Configuration agent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VppConfig {
    /// Agent gRPC endpoint (host:port)
    #[serde(default = "default_agent_endpoint")]
    pub agent_endpoint: String,

    /// Deadline for dialing plus one request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Kernel backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Name prefix of pod-facing tunnel links
    #[serde(default = "default_interface_prefix")]
    pub interface_prefix: String,
}

/// Client connection reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// Interface name reported for every client connection
    #[serde(default = "default_client_interface_name")]
    pub client_interface_name: String,
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Minimum time between two reconciliation passes, in seconds
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Seed desired routes from the agent's installed routes at startup
    #[serde(default = "default_recover_routes")]
    pub recover_routes_on_start: bool,
}

/// Complete sidecar configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarConfig {
    #[serde(default)]
    pub dataplane: DataplaneConfig,

    #[serde(default)]
    pub vpp: VppConfig,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub connections: ConnectionsConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

fn default_agent_endpoint() -> String {
    "localhost:9113".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_interface_prefix() -> String {
    "vl3-".to_string()
}

fn default_client_interface_name() -> String {
    "nsm0".to_string()
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_recover_routes() -> bool {
    true
}

impl Default for VppConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: default_agent_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            interface_prefix: default_interface_prefix(),
        }
    }
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            client_interface_name: default_client_interface_name(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
            recover_routes_on_start: default_recover_routes(),
        }
    }
}

impl SidecarConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> RouterResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                RouterError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse config file: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RouterError::Io(e)),
        }
    }

    /// Resolves the dataplane mode; `DATAPLANE` in the environment wins
    /// over the file setting.
    pub fn dataplane_mode(&self) -> DataplaneMode {
        DataplaneMode::from_env()
            .unwrap_or_else(|| DataplaneMode::from_setting(self.dataplane.mode.as_deref()))
    }

    /// Agent request deadline as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.vpp.request_timeout_secs)
    }

    /// Reconciliation interval as Duration
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> RouterResult<()> {
        if self.vpp.agent_endpoint.trim().is_empty() {
            return Err(RouterError::invalid_config(
                "vpp.agent_endpoint",
                "must not be empty",
            ));
        }

        if self.vpp.request_timeout_secs == 0 {
            return Err(RouterError::invalid_config(
                "vpp.request_timeout_secs",
                "must be > 0",
            ));
        }

        if self.kernel.interface_prefix.is_empty() {
            return Err(RouterError::invalid_config(
                "kernel.interface_prefix",
                "must not be empty",
            ));
        }

        if self.reconcile.interval_secs == 0 {
            return Err(RouterError::invalid_config(
                "reconcile.interval_secs",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
