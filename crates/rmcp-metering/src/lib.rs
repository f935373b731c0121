//! rmcp-metering: pay-per-call access control for MCP tools
//!
//! Every metered call runs the same pipeline:
//!
//! ```text
//! Received -> Validating -> {Rejected | Validated} -> Executing
//!          -> {ExecutionFailed | Executed} -> Charging -> Responded
//! ```
//!
//! The [`CredentialGate`] asks the metering backend whether the caller's
//! credential is good, the [`MeteredPipeline`] runs the operation and only
//! then reports a [`ChargeRecord`]. A charge record can only be built from an
//! [`Authorized`] proof and an [`Executed`] proof, so a call that was rejected
//! or failed has no way to reach the backend's consume endpoint.

pub mod backend;
pub mod call;
pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod reconcile;
pub mod tariff;

pub use backend::{AgentPayClient, MeteringBackend};
pub use call::{
    Authorized, CallOutcome, CallState, ChargeRecord, ChargeStatus, Executed, InboundCall,
    ValidationResult,
};
pub use config::{ConfigError, MeteringConfig};
pub use error::{BackendError, ExecutionError, ExecutionErrorKind, MeterError};
pub use gate::{CredentialGate, MISSING_CREDENTIAL};
pub use pipeline::{MeteredOperation, MeteredPipeline};
pub use reconcile::{LogReconciliation, ReconciliationSink};
pub use tariff::Tariff;
