//! Metered handler
//!
//! Runs one call through gate, parameter check, execution and charge. Each
//! step is a state in [`CallState`]; transitions are logged at debug level
//! inside a `metered_call` span carrying the call id.
//!
//! Once the gate has passed, execution and the charge report run in their own
//! task. If the caller goes away mid-call the task still finishes, so work
//! that was done is always either charged or handed to reconciliation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use crate::backend::MeteringBackend;
use crate::call::{Authorized, CallOutcome, CallState, ChargeRecord, ChargeStatus, Executed, InboundCall};
use crate::config::MeteringConfig;
use crate::error::{BackendError, ExecutionError, ExecutionErrorKind, MeterError};
use crate::gate::CredentialGate;
use crate::reconcile::{log_usage_event, LogReconciliation, ReconciliationSink};
use crate::tariff::Tariff;

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// A billable operation.
#[async_trait]
pub trait MeteredOperation: Send + Sync + 'static {
    type Params: Send + 'static;
    type Output: Send + 'static;

    /// Name the operation is registered under in the [`Tariff`].
    fn name(&self) -> &'static str;

    /// Check and normalize parameters. Runs before execution; an `Err` here
    /// ends the call without a charge.
    fn validate_params(&self, params: Self::Params) -> Result<Self::Params, String>;

    async fn execute(&self, params: Self::Params) -> Result<Self::Output, ExecutionError>;
}

pub struct MeteredPipeline {
    gate: CredentialGate,
    backend: Arc<dyn MeteringBackend>,
    tariff: Arc<Tariff>,
    reconciliation: Arc<dyn ReconciliationSink>,
    execution_timeout: Duration,
    charge_timeout: Duration,
}

impl MeteredPipeline {
    pub fn new(backend: Arc<dyn MeteringBackend>, tariff: Tariff, config: &MeteringConfig) -> Self {
        let tariff = Arc::new(tariff);
        Self {
            gate: CredentialGate::new(backend.clone(), tariff.clone(), config.validate_timeout),
            backend,
            tariff,
            reconciliation: Arc::new(LogReconciliation),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            charge_timeout: config.charge_timeout,
        }
    }

    pub fn with_reconciliation(mut self, sink: Arc<dyn ReconciliationSink>) -> Self {
        self.reconciliation = sink;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn gate(&self) -> &CredentialGate {
        &self.gate
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    /// Run `call` through the full pipeline.
    ///
    /// `Ok` means the call reached `Responded`: the payload is delivered and
    /// the charge was either recorded or escalated. Every `Err` ends the call
    /// before any charge was attempted.
    pub async fn run<O: MeteredOperation>(
        &self,
        operation: Arc<O>,
        call: InboundCall<O::Params>,
    ) -> Result<CallOutcome<O::Output>, MeterError> {
        let span = tracing::info_span!(
            "metered_call",
            call_id = %call.call_id,
            operation = %call.operation,
        );

        let result = self.run_inner(operation, call).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(outcome) => {
                tracing::info!(
                    state = %CallState::Responded,
                    charged = outcome.charge.is_recorded(),
                    "call completed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    state = %err.terminal_state(),
                    kind = err.kind(),
                    error = %err,
                    "call ended without charge"
                );
            }
        });

        result
    }

    async fn run_inner<O: MeteredOperation>(
        &self,
        operation: Arc<O>,
        call: InboundCall<O::Params>,
    ) -> Result<CallOutcome<O::Output>, MeterError> {
        enter(CallState::Received);

        if call.operation != operation.name() {
            return Err(MeterError::Parameter(format!(
                "call for '{}' routed to '{}'",
                call.operation,
                operation.name()
            )));
        }

        enter(CallState::Validating);
        let authorized = self
            .gate
            .authorize(call.credential.as_deref(), &call.operation)
            .await?;
        enter(CallState::Validated);

        let amount_cents = self.tariff.rate(&call.operation).ok_or_else(|| {
            MeterError::Parameter(format!("no tariff for '{}'", call.operation))
        })?;

        let params = operation
            .validate_params(call.params)
            .map_err(MeterError::Parameter)?;

        let stage = ChargeStage {
            backend: self.backend.clone(),
            reconciliation: self.reconciliation.clone(),
            timeout: self.charge_timeout,
            amount_cents,
        };
        let execution_timeout = self.execution_timeout;
        let call_id = call.call_id;

        let task = tokio::spawn(
            execute_and_charge(operation, params, authorized, call_id, execution_timeout, stage)
                .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(MeterError::Execution(ExecutionError::new(
                ExecutionErrorKind::Internal,
                format!("operation task aborted: {}", join_err),
            ))),
        }
    }
}

struct ChargeStage {
    backend: Arc<dyn MeteringBackend>,
    reconciliation: Arc<dyn ReconciliationSink>,
    timeout: Duration,
    amount_cents: u32,
}

async fn execute_and_charge<O: MeteredOperation>(
    operation: Arc<O>,
    params: O::Params,
    authorized: Authorized,
    call_id: String,
    execution_timeout: Duration,
    stage: ChargeStage,
) -> Result<CallOutcome<O::Output>, MeterError> {
    enter(CallState::Executing);

    let executed = match tokio::time::timeout(execution_timeout, operation.execute(params)).await {
        Ok(Ok(payload)) => Executed::new(payload),
        Ok(Err(e)) => return Err(MeterError::Execution(e)),
        Err(_) => {
            return Err(MeterError::Execution(ExecutionError::new(
                ExecutionErrorKind::Timeout,
                format!("operation timed out after {:?}", execution_timeout),
            )))
        }
    };
    enter(CallState::Executed);

    let charge = ChargeRecord::new(&authorized, &executed, stage.amount_cents, &call_id);

    enter(CallState::Charging);
    let reported = match tokio::time::timeout(stage.timeout, stage.backend.record_charge(&charge)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(stage.timeout)),
    };

    let status = match reported {
        Ok(()) => {
            log_usage_event(&charge);
            ChargeStatus::Recorded {
                amount_cents: charge.amount_cents(),
            }
        }
        Err(e) => {
            let err = MeterError::ChargeReport(e);
            stage.reconciliation.charge_unreported(&charge, &err);
            ChargeStatus::ReportFailed {
                amount_cents: charge.amount_cents(),
                error: err.to_string(),
            }
        }
    };

    Ok(CallOutcome {
        call_id,
        payload: executed.into_payload(),
        charge: status,
    })
}

fn enter(state: CallState) {
    tracing::debug!(state = %state, "call state");
}
