//! Server configuration, loaded from the environment (and `.env` if present).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rmcp_metering::config::parse_var;
use rmcp_metering::{ConfigError, MeteringConfig, Tariff};

use crate::nws::{DEFAULT_TIMEOUT, NWS_API_BASE};
use crate::operations::{ALERT_COST_CENTS, FORECAST_COST_CENTS, GET_ALERTS, GET_FORECAST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Streamable HTTP; credentials come from request headers.
    Http,
    /// Stdio; a single caller whose credential comes from `AGENTPAY_API_KEY`.
    Stdio,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub nws_base_url: String,
    pub nws_timeout: Duration,
    pub alert_cost_cents: u32,
    pub forecast_cost_cents: u32,
    pub stdio_credential: Option<String>,
    pub metering: MeteringConfig,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind_address())
            .field("transport", &self.transport)
            .field("nws_base_url", &self.nws_base_url)
            .field("nws_timeout", &self.nws_timeout)
            .field("alert_cost_cents", &self.alert_cost_cents)
            .field("forecast_cost_cents", &self.forecast_cost_cents)
            .field("stdio_credential", &self.stdio_credential.as_ref().map(|_| "<redacted>"))
            .field("metering", &self.metering)
            .finish()
    }
}

impl ServerConfig {
    pub fn new(metering: MeteringConfig) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            transport: Transport::Http,
            nws_base_url: NWS_API_BASE.to_string(),
            nws_timeout: DEFAULT_TIMEOUT,
            alert_cost_cents: ALERT_COST_CENTS,
            forecast_cost_cents: FORECAST_COST_CENTS,
            stdio_credential: None,
            metering,
        }
    }

    /// Load configuration from `.env` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::new(MeteringConfig::from_lookup(&lookup)?);

        if let Some(host) = lookup("WEATHER_METER_HOST") {
            cfg.host = host;
        }
        if let Some(port) = parse_var(&lookup, "WEATHER_METER_PORT")? {
            cfg.port = port;
        }
        if let Some(transport) = lookup("WEATHER_METER_TRANSPORT") {
            cfg.transport = transport.parse().map_err(|_| ConfigError::InvalidVar {
                name: "WEATHER_METER_TRANSPORT",
                value: transport,
            })?;
        }

        if let Some(url) = lookup("NWS_API_BASE") {
            cfg.nws_base_url = url;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "NWS_TIMEOUT_MS")? {
            cfg.nws_timeout = Duration::from_millis(ms);
        }

        if let Some(cents) = parse_var(&lookup, "WEATHER_ALERT_COST_CENTS")? {
            cfg.alert_cost_cents = cents;
        }
        if let Some(cents) = parse_var(&lookup, "WEATHER_FORECAST_COST_CENTS")? {
            cfg.forecast_cost_cents = cents;
        }

        cfg.stdio_credential = lookup("AGENTPAY_API_KEY").filter(|k| !k.trim().is_empty());

        Ok(cfg)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tariff(&self) -> Tariff {
        Tariff::new()
            .with_rate(GET_ALERTS, self.alert_cost_cents)
            .with_rate(GET_FORECAST, self.forecast_cost_cents)
    }
}
