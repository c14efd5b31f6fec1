//! Common infrastructure for the slice router sidecar.
//!
//! - [`dataplane`]: the backend contract ([`Dataplane`]) and the types that
//!   flow through it
//! - [`error`]: [`RouterError`] and [`RouterResult`]
//! - [`config`]: TOML configuration with defaults
//! - [`shell`]: quoted shell execution for host settings
//!
//! # Example
//!
//! ```ignore
//! use slicerouter_common::{Dataplane, RouteIntent, RouterResult};
//!
//! async fn install(dp: &dyn Dataplane) -> RouterResult<()> {
//!     let intent = RouteIntent::parse("10.1.0.0/16", "192.168.3.1")?;
//!     dp.upsert_route(&intent).await
//! }
//! ```

pub mod config;
pub mod dataplane;
pub mod error;
pub mod shell;

pub use config::SidecarConfig;
pub use dataplane::{ConnectionInfo, Dataplane, DataplaneMode, InstalledRoute, RouteIntent};
pub use error::{RouterError, RouterResult};
