//! Error types for slice router operations.
//!
//! Every error surfaced to a route-injection or connection-discovery caller
//! is a [`RouterError`]. Backend writes are wrapped in
//! [`RouterError::RouteWrite`] so the caller always learns which dataplane
//! and which subnet/next hop failed, while the underlying cause stays
//! reachable through `source()`.

use std::io;
use thiserror::Error;

use crate::dataplane::DataplaneMode;

/// Result type alias for slice router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors that can occur while programming or inspecting a dataplane.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The backend could not be reached (dial failure, timeout, socket error).
    #[error("{backend} backend unreachable during {operation}: {message}")]
    BackendUnreachable {
        /// The dataplane that was being contacted.
        backend: DataplaneMode,
        /// The operation that was attempted (e.g., "update", "route list").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The configuration agent answered with a non-OK gRPC status.
    #[error("Configurator {operation} rejected ({code}): {message}")]
    Rpc {
        /// The RPC that failed ("get", "update", "delete").
        operation: String,
        /// gRPC status code name.
        code: String,
        /// Status message.
        message: String,
    },

    /// A CIDR or IP string could not be parsed.
    #[error("Invalid {field} '{value}': {message}")]
    InvalidAddress {
        /// Which input was malformed ("remote subnet", "next hop", ...).
        field: String,
        /// The offending value.
        value: String,
        /// Parser message.
        message: String,
    },

    /// Kernel mode: no /32 host route exists for the next hop yet.
    #[error("Link of next hop {next_hop} not found, cannot route {destination}")]
    NextHopLinkNotFound {
        /// The destination subnet that was being installed.
        destination: String,
        /// The next hop whose link could not be resolved.
        next_hop: String,
    },

    /// A dataplane write failed; carries backend and route context.
    #[error("{backend} route {operation} failed for {destination} via {next_hop}: {source}")]
    RouteWrite {
        /// The dataplane the write was issued to.
        backend: DataplaneMode,
        /// "add", "replace" or "delete".
        operation: String,
        /// Destination subnet.
        destination: String,
        /// Next hop address.
        next_hop: String,
        /// The underlying failure.
        #[source]
        source: Box<RouterError>,
    },

    /// Netlink request failed.
    #[error("Netlink operation failed: {operation}: {message}")]
    Netlink {
        /// The operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Startup could not complete; the process must not serve requests.
    #[error("Bootstrap failed: {message}")]
    Bootstrap {
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RouterError {
    /// Creates a backend unreachable error.
    pub fn unreachable(
        backend: DataplaneMode,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendUnreachable {
            backend,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAddress {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates a netlink error.
    pub fn netlink(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a bootstrap error.
    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: message.into(),
        }
    }

    /// Wraps `self` with the backend and route it was raised for.
    pub fn in_route_write(
        self,
        backend: DataplaneMode,
        operation: impl Into<String>,
        destination: impl ToString,
        next_hop: impl ToString,
    ) -> Self {
        Self::RouteWrite {
            backend,
            operation: operation.into(),
            destination: destination.to_string(),
            next_hop: next_hop.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through route-write context.
    pub fn root_cause(&self) -> &RouterError {
        match self {
            RouterError::RouteWrite { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed when the caller retries later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            RouterError::BackendUnreachable { .. }
                | RouterError::Rpc { .. }
                | RouterError::NextHopLinkNotFound { .. }
                | RouterError::Netlink { .. }
        )
    }
}
