//! rmcp-weather: metered MCP tools for National Weather Service data
//!
//! Two tools, `get_alerts` and `get_forecast`, each billed per successful
//! call through the metering pipeline in `rmcp-metering`.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    service::RequestContext,
    ErrorData as McpError, RoleServer,
};
use rmcp_metering::{
    AgentPayClient, CallOutcome, InboundCall, MeterError, MeteredPipeline, MeteringBackend,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod nws;
pub mod operations;

use config::ServerConfig;
use nws::{AlertRecord, ForecastPeriod, NwsClient};
use operations::{AlertsOperation, ForecastOperation, GET_ALERTS, GET_FORECAST};

/// Request header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "X-AGENTPAY-API-KEY";

// Tool parameter structs
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AlertsParams {
    #[schemars(description = "Two-letter US state code (e.g. CA, NY)")]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForecastParams {
    #[schemars(description = "Latitude of the location (-90 to 90)")]
    pub latitude: f64,
    #[schemars(description = "Longitude of the location (-180 to 180)")]
    pub longitude: f64,
}

#[derive(Clone)]
pub struct WeatherServer {
    pub tool_router: ToolRouter<Self>,
    pipeline: Arc<MeteredPipeline>,
    alerts: Arc<AlertsOperation>,
    forecast: Arc<ForecastOperation>,
    fallback_credential: Option<String>,
}

impl WeatherServer {
    /// Production wiring: NWS over HTTP, AgentPay as the metering backend.
    pub fn from_config(config: &ServerConfig) -> Self {
        let nws = NwsClient::new(config.nws_base_url.clone(), config.nws_timeout);
        let backend: Arc<dyn MeteringBackend> = Arc::new(AgentPayClient::new(&config.metering));
        let pipeline = MeteredPipeline::new(backend, config.tariff(), &config.metering)
            .with_execution_timeout(config.nws_timeout);

        tracing::info!(
            alerts_cents = config.alert_cost_cents,
            forecast_cents = config.forecast_cost_cents,
            backend = %config.metering.base_url,
            "metered weather tools ready"
        );

        Self::new(pipeline, nws)
    }

    pub fn new(pipeline: MeteredPipeline, nws: NwsClient) -> Self {
        let nws = Arc::new(nws);
        Self {
            tool_router: Self::tool_router(),
            pipeline: Arc::new(pipeline),
            alerts: Arc::new(AlertsOperation::new(nws.clone())),
            forecast: Arc::new(ForecastOperation::new(nws)),
            fallback_credential: None,
        }
    }

    /// Credential used when a request carries none, e.g. on stdio where there
    /// are no headers at all.
    pub fn with_fallback_credential(mut self, credential: Option<String>) -> Self {
        self.fallback_credential = credential;
        self
    }

    pub async fn run_alerts(
        &self,
        credential: Option<String>,
        params: AlertsParams,
    ) -> Result<CallOutcome<Vec<AlertRecord>>, MeterError> {
        let call = InboundCall::new(GET_ALERTS, credential, params);
        self.pipeline.run(self.alerts.clone(), call).await
    }

    pub async fn run_forecast(
        &self,
        credential: Option<String>,
        params: ForecastParams,
    ) -> Result<CallOutcome<Vec<ForecastPeriod>>, MeterError> {
        let call = InboundCall::new(GET_FORECAST, credential, params);
        self.pipeline.run(self.forecast.clone(), call).await
    }

    fn credential_from(&self, context: &RequestContext<RoleServer>) -> Option<String> {
        context
            .extensions
            .get::<http::request::Parts>()
            .and_then(|parts| parts.headers.get(API_KEY_HEADER))
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| self.fallback_credential.clone())
    }
}

/// Map a pipeline failure to a structured MCP error. `data.kind` tells the
/// failure classes apart; authorization failures also carry the reason.
pub fn to_mcp_error(err: MeterError) -> McpError {
    let mut data = serde_json::json!({
        "kind": err.kind(),
        "state": err.terminal_state().as_str(),
    });
    if let MeterError::Authorization { reason } = &err {
        data["reason"] = serde_json::Value::String(reason.clone());
    }

    match &err {
        MeterError::Authorization { .. } => McpError::invalid_request(err.to_string(), Some(data)),
        MeterError::Parameter(_) => McpError::invalid_params(err.to_string(), Some(data)),
        MeterError::ValidationService(_) | MeterError::Execution(_) | MeterError::ChargeReport(_) => {
            McpError::internal_error(err.to_string(), Some(data))
        }
    }
}

#[rmcp::tool_router]
impl WeatherServer {
    #[rmcp::tool(description = "Get active weather alerts for a US state (billed per call)")]
    pub async fn get_alerts(
        &self,
        Parameters(params): Parameters<AlertsParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let credential = self.credential_from(&context);
        let outcome = self.run_alerts(credential, params).await.map_err(to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(nws::format_alerts(
            &outcome.payload,
        ))]))
    }

    #[rmcp::tool(description = "Get the weather forecast for a latitude/longitude (billed per call)")]
    pub async fn get_forecast(
        &self,
        Parameters(params): Parameters<ForecastParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let credential = self.credential_from(&context);
        let outcome = self
            .run_forecast(credential, params)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(nws::format_forecast(
            &outcome.payload,
        ))]))
    }
}

#[rmcp::tool_handler]
impl ServerHandler for WeatherServer {
    fn get_info(&self) -> ServerInfo {
        let prices = self
            .pipeline
            .tariff()
            .operations()
            .map(|(name, cents)| format!("{} {}c", name, cents))
            .collect::<Vec<_>>()
            .join(", ");

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Weather alerts and forecasts from api.weather.gov. \
                 Send your AgentPay API key in the {} header. Prices per successful call: {}.",
                API_KEY_HEADER, prices
            )),
        }
    }
}
