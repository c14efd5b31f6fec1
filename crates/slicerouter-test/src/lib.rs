//! Integration test infrastructure for the slice router sidecar
//!
//! Provides:
//! - Route, link and agent interface fixtures
//! - In-memory dataplane, kernel table and configuration agent doubles
//! - Verification helpers over recorded dataplane writes

pub mod fakes;
pub mod fixtures;
mod verification;

pub use fakes::{AgentRequest, DataplaneCall, RecordingDataplane, StaticAgent, StaticRouteTable};
pub use fixtures::*;
pub use verification::*;
