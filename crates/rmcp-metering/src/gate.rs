//! Credential gate: one backend validation per inbound call, fail-closed.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::MeteringBackend;
use crate::call::{Authorized, ValidationResult};
use crate::error::{BackendError, MeterError};
use crate::tariff::Tariff;

pub const MISSING_CREDENTIAL: &str = "missing credential";

/// Used when the backend rejects without saying why.
const UNSPECIFIED_REJECTION: &str = "credential rejected";

#[derive(Clone)]
pub struct CredentialGate {
    backend: Arc<dyn MeteringBackend>,
    tariff: Arc<Tariff>,
    timeout: Duration,
}

impl CredentialGate {
    pub fn new(backend: Arc<dyn MeteringBackend>, tariff: Arc<Tariff>, timeout: Duration) -> Self {
        Self {
            backend,
            tariff,
            timeout,
        }
    }

    /// Ask whether `credential` may call `operation`.
    ///
    /// `Ok` carries the verdict, authorized or not. `Err` means no verdict
    /// could be reached: an unregistered operation, or a backend that was
    /// unreachable, slow or incoherent.
    pub async fn validate(
        &self,
        credential: Option<&str>,
        operation: &str,
    ) -> Result<ValidationResult, MeterError> {
        if !self.tariff.is_registered(operation) {
            return Err(MeterError::Parameter(format!(
                "unknown operation '{}'",
                operation
            )));
        }

        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(ValidationResult::unauthorized(MISSING_CREDENTIAL));
        };

        match tokio::time::timeout(self.timeout, self.backend.check_credential(credential)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(MeterError::ValidationService(e)),
            Err(_) => Err(MeterError::ValidationService(BackendError::Timeout(
                self.timeout,
            ))),
        }
    }

    /// [`validate`](Self::validate), turning a positive verdict into an
    /// [`Authorized`] proof and a negative one into [`MeterError::Authorization`].
    pub async fn authorize(
        &self,
        credential: Option<&str>,
        operation: &str,
    ) -> Result<Authorized, MeterError> {
        let result = self.validate(credential, operation).await?;

        match (result.authorized, credential) {
            (true, Some(credential)) => Ok(Authorized::new(credential.trim(), operation)),
            // A backend cannot authorize a credential we never sent it.
            (true, None) => Err(MeterError::Authorization {
                reason: MISSING_CREDENTIAL.to_string(),
            }),
            (false, _) => Err(MeterError::Authorization {
                reason: result
                    .reason
                    .unwrap_or_else(|| UNSPECIFIED_REJECTION.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::ChargeRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Valid,
        Invalid(Option<&'static str>),
        Down,
        Hang,
    }

    struct StubBackend {
        reply: Reply,
        checks: AtomicUsize,
    }

    impl StubBackend {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                checks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MeteringBackend for StubBackend {
        async fn check_credential(&self, _: &str) -> Result<ValidationResult, BackendError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Valid => Ok(ValidationResult::authorized()),
                Reply::Invalid(reason) => Ok(ValidationResult {
                    authorized: false,
                    reason: reason.map(str::to_string),
                }),
                Reply::Down => Err(BackendError::Transport("connection refused".into())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(ValidationResult::authorized())
                }
            }
        }

        async fn record_charge(&self, _: &ChargeRecord) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn gate(backend: Arc<StubBackend>) -> CredentialGate {
        let tariff = Tariff::new().with_rate("get_alerts", 2);
        CredentialGate::new(backend, Arc::new(tariff), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_missing_credential_skips_backend() {
        let backend = StubBackend::new(Reply::Valid);
        let gate = gate(backend.clone());

        for credential in [None, Some(""), Some("   ")] {
            let result = gate.validate(credential, "get_alerts").await.unwrap();
            assert_eq!(result, ValidationResult::unauthorized(MISSING_CREDENTIAL));
        }
        assert_eq!(backend.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_credential() {
        let gate = gate(StubBackend::new(Reply::Valid));
        let auth = gate.authorize(Some("VALID1"), "get_alerts").await.unwrap();
        assert_eq!(auth.credential(), "VALID1");
        assert_eq!(auth.operation(), "get_alerts");
    }

    #[tokio::test]
    async fn test_backend_reason_is_verbatim() {
        let gate = gate(StubBackend::new(Reply::Invalid(Some("Insufficient balance"))));
        let err = gate.authorize(Some("BROKE"), "get_alerts").await.unwrap_err();
        assert_eq!(
            err,
            MeterError::Authorization {
                reason: "Insufficient balance".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejection_without_reason() {
        let gate = gate(StubBackend::new(Reply::Invalid(None)));
        let err = gate.authorize(Some("X"), "get_alerts").await.unwrap_err();
        assert_eq!(
            err,
            MeterError::Authorization {
                reason: UNSPECIFIED_REJECTION.into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_closed() {
        let gate = gate(StubBackend::new(Reply::Down));
        let err = gate.authorize(Some("VALID1"), "get_alerts").await.unwrap_err();
        assert!(matches!(err, MeterError::ValidationService(BackendError::Transport(_))));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let gate = gate(StubBackend::new(Reply::Hang));
        let err = gate.authorize(Some("VALID1"), "get_alerts").await.unwrap_err();
        assert_eq!(
            err,
            MeterError::ValidationService(BackendError::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let backend = StubBackend::new(Reply::Valid);
        let err = gate(backend.clone())
            .validate(Some("VALID1"), "get_weather")
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::Parameter(_)));
        assert_eq!(backend.checks.load(Ordering::SeqCst), 0);
    }
}
