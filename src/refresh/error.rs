//! Refresh error types
//!
//! Per-source failures are values, not errors: they are caught where they
//! occur and travel inside an [`Outcome`](super::Outcome). The enums at the
//! bottom cover misuse of the controller itself (bad registration,
//! scheduler started twice, ...).

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of a per-source or per-callback failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport or connection failure, including request timeouts
    Network,
    /// Non-success status code
    HttpStatus(u16),
    /// Upstream state is missing; a remediation action may fix it
    Precondition,
    /// Payload was not in the expected shape
    Decode,
    /// A render binding returned an error or panicked
    Callback,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::HttpStatus(code) => write!(f, "HTTP status {}", code),
            ErrorKind::Precondition => write!(f, "precondition not met"),
            ErrorKind::Decode => write!(f, "decode error"),
            ErrorKind::Callback => write!(f, "callback error"),
        }
    }
}

/// A failure reason: error kind plus a human readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HttpStatus(status), message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Whether a remediation action could make a retry succeed
    pub fn is_precondition(&self) -> bool {
        self.kind == ErrorKind::Precondition
    }
}

/// Errors returned by render bindings
#[derive(Debug, Error)]
pub enum RenderError {
    /// The payload did not deserialize into the shape the binding expects
    #[error("Unexpected payload shape: {0}")]
    Payload(#[from] serde_json::Error),

    /// Writing the rendered output failed
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while assembling a refresh controller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Data source '{0}' registered twice")]
    DuplicateSource(String),

    #[error("Data source '{source_name}' refers to unknown remediation '{remediation}'")]
    UnknownRemediation {
        source_name: String,
        remediation: String,
    },

    #[error("Data source name must not be empty")]
    EmptyName,

    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,
}

/// Errors raised by scheduler misuse
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is still finishing its previous cycle")]
    Draining,

    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,
}

/// Errors raised when running a cycle on demand
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("A refresh cycle is already in flight")]
    CycleInFlight,
}
