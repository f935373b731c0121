//! Call-scoped data: nothing here outlives the call that created it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a metered call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Received,
    Validating,
    Rejected,
    Validated,
    Executing,
    ExecutionFailed,
    Executed,
    Charging,
    Responded,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::ExecutionFailed | Self::Responded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::ExecutionFailed => "execution_failed",
            Self::Executed => "executed",
            Self::Charging => "charging",
            Self::Responded => "responded",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound tool call, owned by the pipeline run that processes it.
#[derive(Debug, Clone)]
pub struct InboundCall<P> {
    pub call_id: String,
    pub credential: Option<String>,
    pub operation: String,
    pub params: P,
}

impl<P> InboundCall<P> {
    /// New call with a fresh v4 call id.
    pub fn new(operation: impl Into<String>, credential: Option<String>, params: P) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            credential,
            operation: operation.into(),
            params,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn authorized() -> Self {
        Self {
            authorized: true,
            reason: None,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self {
            authorized: false,
            reason: Some(reason.into()),
        }
    }
}

/// Proof that the gate accepted `credential` for `operation`.
///
/// Only [`CredentialGate`](crate::CredentialGate) can mint one.
#[derive(Debug, Clone)]
pub struct Authorized {
    credential: String,
    operation: String,
}

impl Authorized {
    pub(crate) fn new(credential: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            operation: operation.into(),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Proof that the domain operation succeeded, carrying its payload.
#[derive(Debug)]
pub struct Executed<T> {
    payload: T,
}

impl<T> Executed<T> {
    pub(crate) fn new(payload: T) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// A usage charge handed to the metering backend. The backend owns the
/// durable record; we never keep one past the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRecord {
    credential: String,
    operation_name: String,
    amount_cents: u32,
    call_id: String,
}

impl ChargeRecord {
    pub(crate) fn new<T>(
        authorized: &Authorized,
        _executed: &Executed<T>,
        amount_cents: u32,
        call_id: &str,
    ) -> Self {
        Self {
            credential: authorized.credential.clone(),
            operation_name: authorized.operation.clone(),
            amount_cents,
            call_id: call_id.to_string(),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn amount_cents(&self) -> u32 {
        self.amount_cents
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Recorded { amount_cents: u32 },
    /// Payload delivered, charge not recorded. Already escalated for reconciliation.
    ReportFailed { amount_cents: u32, error: String },
}

impl ChargeStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// A call that reached `Responded`.
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub call_id: String,
    pub payload: T,
    pub charge: ChargeStatus,
}
