//! Metering configuration
//!
//! The server's own identity with the metering backend plus the timeouts
//! applied to every outbound call. Built once at startup and passed into the
//! pipeline; nothing here is read per call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "https://api.agentpay.me";
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CHARGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {name}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct MeteringConfig {
    /// Service credential identifying this server to the backend.
    pub service_token: String,
    pub base_url: String,
    pub validate_timeout: Duration,
    pub charge_timeout: Duration,
}

// Keep the service token out of logs.
impl fmt::Debug for MeteringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeteringConfig")
            .field("service_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("validate_timeout", &self.validate_timeout)
            .field("charge_timeout", &self.charge_timeout)
            .finish()
    }
}

impl MeteringConfig {
    pub fn new(service_token: impl Into<String>) -> Self {
        Self {
            service_token: service_token.into(),
            base_url: DEFAULT_BACKEND_URL.to_string(),
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
            charge_timeout: DEFAULT_CHARGE_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeouts(mut self, validate: Duration, charge: Duration) -> Self {
        self.validate_timeout = validate;
        self.charge_timeout = charge;
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any name -> value lookup.
    ///
    /// `AGENTPAY_SERVICE_TOKEN` is required; `AGENTPAY_BASE_URL`,
    /// `AGENTPAY_VALIDATE_TIMEOUT_MS` and `AGENTPAY_CHARGE_TIMEOUT_MS` are optional.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("AGENTPAY_SERVICE_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("AGENTPAY_SERVICE_TOKEN"))?;

        let mut cfg = Self::new(token);

        if let Some(url) = lookup("AGENTPAY_BASE_URL") {
            cfg.base_url = url;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AGENTPAY_VALIDATE_TIMEOUT_MS")? {
            cfg.validate_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AGENTPAY_CHARGE_TIMEOUT_MS")? {
            cfg.charge_timeout = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

/// Read and parse an optional variable. Present-but-unparseable is an error,
/// not a silent fallback to the default.
pub fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}
