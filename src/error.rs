//! Error types for topology tracing.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised while setting up probes or tracing a destination.
///
/// A probe that times out is not an error: it yields a silent `HopRecord`.
#[derive(Error, Debug)]
pub enum TraceError {
    // Startup errors, fatal for the whole run
    #[error(
        "Insufficient permissions for raw ICMP sockets: {0}\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo topologer <destinations>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep $(which topologer)"
    )]
    SocketPermission(#[source] std::io::Error),

    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    // Probe errors, fatal for one destination
    #[error("Failed to send probe to {destination} at ttl {ttl}: {source}")]
    ProbeSend {
        destination: Ipv4Addr,
        ttl: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("ICMP receiver stopped")]
    ReceiverStopped,

    #[error("Trace worker aborted: {0}")]
    WorkerAborted(String),

    // Per-destination wrappers
    #[error("Trace to {destination} failed: {source}")]
    TraceFailure {
        destination: Ipv4Addr,
        #[source]
        source: Box<TraceError>,
    },

    #[error("Unresolved destination '{input}': {reason}")]
    UnresolvedDestination { input: String, reason: String },
}

impl TraceError {
    /// Classify a socket setup error, separating privilege failures
    pub fn from_socket_setup(err: std::io::Error) -> Self {
        let denied = err.kind() == std::io::ErrorKind::PermissionDenied
            || matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES));
        if denied {
            TraceError::SocketPermission(err)
        } else {
            TraceError::SocketCreation(err)
        }
    }

    /// Tag an error with the destination whose trace it aborted
    pub fn for_destination(self, destination: Ipv4Addr) -> Self {
        match self {
            TraceError::TraceFailure { .. } | TraceError::UnresolvedDestination { .. } => self,
            other => TraceError::TraceFailure {
                destination,
                source: Box::new(other),
            },
        }
    }

    /// Returns true for failures that abort the whole run before tracing starts
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            TraceError::SocketPermission(_) | TraceError::SocketCreation(_)
        )
    }

    /// Destination this error is attributed to, if any
    pub fn destination(&self) -> Option<Ipv4Addr> {
        match self {
            TraceError::ProbeSend { destination, .. }
            | TraceError::TraceFailure { destination, .. } => Some(*destination),
            _ => None,
        }
    }

    /// Returns the error that caused a trace failure
    pub fn root(&self) -> &TraceError {
        match self {
            TraceError::TraceFailure { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;
