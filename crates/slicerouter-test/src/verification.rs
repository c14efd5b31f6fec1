//! Verification helpers for dataplane interaction tests
//!
//! Provides assertion helpers over the calls and installed routes of a
//! [`RecordingDataplane`]

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

use crate::fakes::{DataplaneCall, RecordingDataplane};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {expected} dataplane writes, found {actual}: {calls}")]
    WriteCountMismatch {
        expected: usize,
        actual: usize,
        calls: String,
    },

    #[error("Dataplane writes differ: expected {expected}, got {actual}")]
    WriteSequenceMismatch { expected: String, actual: String },

    #[error("No route installed for {subnet}")]
    RouteNotInstalled { subnet: Ipv4Net },

    #[error("{subnet} has {count} live paths: {gateways}")]
    MultiplePaths {
        subnet: Ipv4Net,
        count: usize,
        gateways: String,
    },

    #[error("Gateway mismatch for {subnet}: expected {expected}, got {actual}")]
    GatewayMismatch {
        subnet: Ipv4Net,
        expected: Ipv4Addr,
        actual: Ipv4Addr,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Dataplane verification helper
pub struct DataplaneVerifier<'a> {
    dataplane: &'a RecordingDataplane,
}

impl<'a> DataplaneVerifier<'a> {
    pub fn new(dataplane: &'a RecordingDataplane) -> Self {
        Self { dataplane }
    }

    /// Verify the number of upserts and deletes issued so far
    pub fn assert_write_count(&self, expected: usize) -> VerifyResult<()> {
        let writes = self.dataplane.writes();
        if writes.len() != expected {
            return Err(VerificationError::WriteCountMismatch {
                expected,
                actual: writes.len(),
                calls: format!("{:?}", writes),
            });
        }
        Ok(())
    }

    /// Verify the exact upserts and deletes issued so far, in order
    pub fn assert_writes(&self, expected: &[DataplaneCall]) -> VerifyResult<()> {
        let writes = self.dataplane.writes();
        if writes != expected {
            return Err(VerificationError::WriteSequenceMismatch {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", writes),
            });
        }
        Ok(())
    }

    /// Verify `subnet` has exactly one live path, through `gateway`
    pub fn assert_single_path(&self, subnet: Ipv4Net, gateway: Ipv4Addr) -> VerifyResult<()> {
        let paths = self.dataplane.live_paths(subnet);
        match paths.as_slice() {
            [] => Err(VerificationError::RouteNotInstalled { subnet }),
            [only] if *only == gateway => Ok(()),
            [only] => Err(VerificationError::GatewayMismatch {
                subnet,
                expected: gateway,
                actual: *only,
            }),
            _ => Err(VerificationError::MultiplePaths {
                subnet,
                count: paths.len(),
                gateways: format!("{:?}", paths),
            }),
        }
    }
}
