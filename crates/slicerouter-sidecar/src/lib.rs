//! Dataplane core of the slice router sidecar.
//!
//! Keeps the routes to remote slice subnets installed on one of two
//! backends and reports the pod-facing tunnel connections:
//!
//! - [`vpp`]: VPP, programmed through the configuration agent over gRPC
//! - [`kernel`]: the host kernel routing table, programmed over netlink
//! - [`store`]: desired routes, recorded after each accepted write
//! - [`reconcile`](mod@reconcile): compare-and-repair pass, gated by [`clock`]
//! - [`router`]: [`SliceRouter`], the injection and discovery entry points
//! - [`bootstrap`](mod@bootstrap): startup for the host process

pub mod bootstrap;
pub mod clock;
pub mod kernel;
pub mod reconcile;
pub mod router;
pub mod store;
pub mod vpp;

pub use bootstrap::bootstrap;
pub use clock::ReconcileClock;
pub use reconcile::{reconcile, ReconcileReport};
pub use router::SliceRouter;
pub use store::DesiredRouteTable;
