//! Metering backend seam and its AgentPay HTTP implementation.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::call::{ChargeRecord, ValidationResult};
use crate::config::MeteringConfig;
use crate::error::BackendError;

/// Header carrying this server's own service credential.
pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";

/// The external system of record for credential validity, balance and
/// recorded charges. Implementations do no retries and no caching.
#[async_trait]
pub trait MeteringBackend: Send + Sync {
    async fn check_credential(&self, credential: &str) -> Result<ValidationResult, BackendError>;

    async fn record_charge(&self, charge: &ChargeRecord) -> Result<(), BackendError>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    is_valid: bool,
    #[serde(default)]
    invalid_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConsumeRequest<'a> {
    api_key: &'a str,
    amount_cents: u32,
    usage_event_id: &'a str,
    operation: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConsumeResponse {
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentPayClient {
    http: reqwest::Client,
    base_url: String,
    service_token: String,
}

impl AgentPayClient {
    pub fn new(config: &MeteringConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &MeteringConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_token: config.service_token.clone(),
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .header(SERVICE_TOKEN_HEADER, &self.service_token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MeteringBackend for AgentPayClient {
    async fn check_credential(&self, credential: &str) -> Result<ValidationResult, BackendError> {
        let reply: ValidateResponse = self
            .post_json("/v1/api-keys/validate", &ValidateRequest { api_key: credential })
            .await?;

        Ok(if reply.is_valid {
            ValidationResult::authorized()
        } else {
            ValidationResult {
                authorized: false,
                reason: reply.invalid_reason,
            }
        })
    }

    async fn record_charge(&self, charge: &ChargeRecord) -> Result<(), BackendError> {
        let reply: ConsumeResponse = self
            .post_json(
                "/v1/usage/consume",
                &ConsumeRequest {
                    api_key: charge.credential(),
                    amount_cents: charge.amount_cents(),
                    usage_event_id: charge.call_id(),
                    operation: charge.operation_name(),
                },
            )
            .await?;

        if reply.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(
                reply
                    .error_message
                    .unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Authorized, Executed};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AgentPayClient {
        AgentPayClient::new(&MeteringConfig::new("svc-token").with_base_url(server.uri()))
    }

    fn charge(amount_cents: u32) -> ChargeRecord {
        let auth = Authorized::new("VALID1", "get_alerts");
        ChargeRecord::new(&auth, &Executed::new(()), amount_cents, "call-42")
    }

    #[tokio::test]
    async fn test_check_credential_valid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/api-keys/validate"))
            .and(header(SERVICE_TOKEN_HEADER, "svc-token"))
            .and(body_json(serde_json::json!({ "api_key": "VALID1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_valid": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).check_credential("VALID1").await.unwrap();
        assert_eq!(result, ValidationResult::authorized());
    }

    #[tokio::test]
    async fn test_check_credential_invalid_keeps_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/api-keys/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_valid": false,
                "invalid_reason": "API key expired"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).check_credential("OLD").await.unwrap();
        assert_eq!(result, ValidationResult::unauthorized("API key expired"));
    }

    #[tokio::test]
    async fn test_check_credential_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server).check_credential("VALID1").await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 503,
                body: "maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn test_check_credential_garbage_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).check_credential("VALID1").await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_record_charge_sends_usage_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/usage/consume"))
            .and(header(SERVICE_TOKEN_HEADER, "svc-token"))
            .and(body_json(serde_json::json!({
                "api_key": "VALID1",
                "amount_cents": 2,
                "usage_event_id": "call-42",
                "operation": "get_alerts"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).record_charge(&charge(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_charge_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/usage/consume"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error_message": "Insufficient balance"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).record_charge(&charge(2)).await.unwrap_err();
        assert_eq!(err, BackendError::Rejected("Insufficient balance".into()));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let cfg = MeteringConfig::new("svc").with_base_url("http://127.0.0.1:1");
        let err = AgentPayClient::new(&cfg)
            .check_credential("VALID1")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
