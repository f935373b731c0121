//! Escalation path for charges that were earned but never recorded.
//!
//! A charge report can fail after the caller already has their payload. The
//! call is not failed for it; instead the charge goes here so someone can
//! reconcile it against the backend later. Retrying the same call is not
//! safe: depending on the backend it may or may not double-charge.

use crate::call::ChargeRecord;
use crate::error::MeterError;

pub const RECONCILIATION_TARGET: &str = "weather_meter::reconciliation";
pub const USAGE_TARGET: &str = "weather_meter::usage";

pub trait ReconciliationSink: Send + Sync {
    fn charge_unreported(&self, charge: &ChargeRecord, error: &MeterError);
}

/// Default sink: one structured `error!` event per lost charge on the
/// reconciliation target, for log-based alerting to pick up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReconciliation;

impl ReconciliationSink for LogReconciliation {
    fn charge_unreported(&self, charge: &ChargeRecord, error: &MeterError) {
        tracing::error!(
            target: RECONCILIATION_TARGET,
            event = "usage.charge_unreported",
            call_id = %charge.call_id(),
            operation = %charge.operation_name(),
            amount_cents = charge.amount_cents(),
            credential = %mask_credential(charge.credential()),
            error = %error,
            "usage charge not recorded, needs reconciliation"
        );
    }
}

/// Logs a charge the backend accepted.
pub fn log_usage_event(charge: &ChargeRecord) {
    tracing::info!(
        target: USAGE_TARGET,
        event = "usage.charged",
        call_id = %charge.call_id(),
        operation = %charge.operation_name(),
        amount_cents = charge.amount_cents(),
        credential = %mask_credential(charge.credential()),
    );
}

/// Last four characters only. Short credentials are fully masked.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
