//! Error types shared by the driver, the event listener and the export resolver.
//!
//! Every error type maps onto one [`ErrorKind`] so callers can tell a
//! configuration problem (fatal, raised before anything runs) from a lookup
//! miss, a lifecycle violation or a failed operation.

use std::fmt;

use thiserror::Error;

use crate::endpoint::{Capabilities, EndpointType};
use crate::export::ExportId;
use crate::qos::VolumeState;

/// Broad classification of every error raised by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal, detected before execution starts.
    Configuration,
    /// Lookup of an unknown key; recoverable by the caller.
    NotFound,
    /// A lifecycle call made in the wrong state. Programmer error.
    StateViolation,
    /// An operation failed while executing. Fails its group only.
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::StateViolation => write!(f, "state violation"),
            ErrorKind::Execution => write!(f, "execution"),
        }
    }
}

/// Errors raised by a [`WorkloadEventListener`](crate::listener::WorkloadEventListener).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("volume {0} is not registered")]
    UnknownVolume(String),

    #[error("volume {volume} is {actual}, expected {}", one_of(.expected))]
    InvalidState {
        volume: String,
        /// States the call is accepted in.
        expected: &'static [VolumeState],
        actual: VolumeState,
    },

    #[error("listener has finished, no further lifecycle calls are accepted")]
    Finished,
}

impl ListenerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ListenerError::UnknownVolume(_) => ErrorKind::NotFound,
            ListenerError::InvalidState { .. } | ListenerError::Finished => {
                ErrorKind::StateViolation
            }
        }
    }
}

fn one_of(states: &[VolumeState]) -> String {
    states
        .iter()
        .map(VolumeState::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Failure of a single delete handler, as reported by [`ResolverError::DeleteHandlersFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Position of the handler in registration order.
    pub index: usize,
    pub message: String,
}

/// Errors raised by an [`ExportResolver`](crate::export::ExportResolver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no export for volume {0}")]
    UnknownVolume(String),

    #[error("no volume for export id {0}")]
    UnknownExport(ExportId),

    #[error("volume {0} is already exported")]
    VolumeExists(String),

    #[error("export id {0} is already in use")]
    ExportIdInUse(ExportId),

    #[error("export ids exhausted")]
    ExportIdsExhausted,

    #[error("object of {len} bytes exceeds the {limit} byte object size of volume {volume}")]
    ObjectTooLarge { volume: String, len: u64, limit: u64 },

    #[error("volume {volume} capacity of {limit} bytes exceeded: {requested} bytes requested")]
    CapacityExceeded {
        volume: String,
        requested: u64,
        limit: u64,
    },

    #[error("volume {volume} removed, but {} delete handler(s) failed", .failures.len())]
    DeleteHandlersFailed {
        volume: String,
        failures: Vec<HandlerFailure>,
    },
}

impl ResolverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolverError::UnknownVolume(_) | ResolverError::UnknownExport(_) => {
                ErrorKind::NotFound
            }
            ResolverError::VolumeExists(_)
            | ResolverError::ExportIdInUse(_)
            | ResolverError::ExportIdsExhausted => ErrorKind::Configuration,
            ResolverError::ObjectTooLarge { .. }
            | ResolverError::CapacityExceeded { .. }
            | ResolverError::DeleteHandlersFailed { .. } => ErrorKind::Execution,
        }
    }
}

/// Errors raised while executing an [`Operation`](crate::operation::Operation).
#[derive(Debug, Error)]
pub enum OperationError {
    /// The endpoint does not expose the API surface the operation needs.
    #[error("endpoint {endpoint} does not provide the {required} interface")]
    MissingInterface {
        endpoint: String,
        required: EndpointType,
    },

    /// A value another operation should have produced is not available yet.
    #[error("input {0} has not been produced")]
    MissingInput(&'static str),

    #[error("volume {0} not found on endpoint")]
    VolumeNotFound(String),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Endpoint(#[from] anyhow::Error),
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Listener(e) => e.kind(),
            _ => ErrorKind::Execution,
        }
    }
}

/// Errors raised by the [`Driver`](crate::driver::Driver) itself.
///
/// Group failures are not errors of the run; they are reported in the
/// [`RunReport`](crate::driver::RunReport).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("endpoint {endpoint} provides {available} but workload {workload} requires {required}")]
    EndpointMismatch {
        endpoint: String,
        workload: String,
        required: Capabilities,
        available: Capabilities,
    },

    #[error("setup of workload {workload} failed at {operation}: {source}")]
    Setup {
        workload: String,
        operation: String,
        #[source]
        source: OperationError,
    },
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::EndpointMismatch { .. } => ErrorKind::Configuration,
            DriverError::Setup { .. } => ErrorKind::Execution,
        }
    }
}

/// Errors raised while loading or interpreting driver configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid workload parameters: {0}")]
    InvalidWorkload(String),

    #[error("unknown workload {0}")]
    UnknownWorkload(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
