use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::call::CallState;

/// Why a domain operation failed. Mirrors the provider's error taxonomy
/// (client error vs. service error) plus the transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    NotFound,
    ClientError,
    ServiceError,
    Timeout,
    Decode,
    Transport,
    Internal,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ClientError => "client_error",
            Self::ServiceError => "service_error",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failure talking to the metering backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("metering backend request failed: {0}")]
    Transport(String),

    #[error("metering backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("metering backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("metering backend refused the charge: {0}")]
    Rejected(String),

    #[error("malformed metering backend reply: {0}")]
    Decode(String),
}

/// Everything that can end a metered call early, plus the one failure that
/// happens after the caller's result is already decided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    /// Missing credential, or the backend said no. Invalid, expired and
    /// insufficient-balance credentials all land here with the backend's reason.
    #[error("unauthorized: {reason}")]
    Authorization { reason: String },

    /// The backend could not be asked. Fail-closed: the call is rejected.
    #[error("credential validation unavailable: {0}")]
    ValidationService(#[source] BackendError),

    #[error("invalid parameters: {0}")]
    Parameter(String),

    #[error("operation failed: {0}")]
    Execution(#[from] ExecutionError),

    /// The work was done but the charge never reached the backend.
    #[error("charge report failed: {0}")]
    ChargeReport(#[source] BackendError),
}

impl MeterError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authorization { .. } => "authorization",
            Self::ValidationService(_) => "validation_service",
            Self::Parameter(_) => "parameter",
            Self::Execution(_) => "execution",
            Self::ChargeReport(_) => "charge_report",
        }
    }

    /// The state a call ends in when it fails with this error.
    pub fn terminal_state(&self) -> CallState {
        match self {
            Self::Authorization { .. } | Self::ValidationService(_) | Self::Parameter(_) => {
                CallState::Rejected
            }
            Self::Execution(_) => CallState::ExecutionFailed,
            Self::ChargeReport(_) => CallState::Responded,
        }
    }
}
