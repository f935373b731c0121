//! The two billable weather lookups.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp_metering::{ExecutionError, MeteredOperation, Tariff};

use crate::nws::{AlertRecord, ForecastPeriod, NwsClient};
use crate::{AlertsParams, ForecastParams};

pub const GET_ALERTS: &str = "get_alerts";
pub const GET_FORECAST: &str = "get_forecast";

pub const ALERT_COST_CENTS: u32 = 2;
pub const FORECAST_COST_CENTS: u32 = 3;

pub fn default_tariff() -> Tariff {
    Tariff::new()
        .with_rate(GET_ALERTS, ALERT_COST_CENTS)
        .with_rate(GET_FORECAST, FORECAST_COST_CENTS)
}

/// Two ASCII letters, upper-cased. Covers states, territories and marine areas.
pub fn normalize_region_code(code: &str) -> Result<String, String> {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!(
            "'{}' is not a two-letter region code (e.g. CA, NY)",
            code
        ));
    }
    Ok(code.to_ascii_uppercase())
}

pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude {} is outside [-90, 90]", latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude {} is outside [-180, 180]", longitude));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AlertsOperation {
    nws: Arc<NwsClient>,
}

impl AlertsOperation {
    pub fn new(nws: Arc<NwsClient>) -> Self {
        Self { nws }
    }
}

#[async_trait]
impl MeteredOperation for AlertsOperation {
    type Params = AlertsParams;
    type Output = Vec<AlertRecord>;

    fn name(&self) -> &'static str {
        GET_ALERTS
    }

    fn validate_params(&self, params: AlertsParams) -> Result<AlertsParams, String> {
        Ok(AlertsParams {
            state: normalize_region_code(&params.state)?,
        })
    }

    async fn execute(&self, params: AlertsParams) -> Result<Vec<AlertRecord>, ExecutionError> {
        self.nws.fetch_alerts(&params.state).await
    }
}

#[derive(Debug, Clone)]
pub struct ForecastOperation {
    nws: Arc<NwsClient>,
}

impl ForecastOperation {
    pub fn new(nws: Arc<NwsClient>) -> Self {
        Self { nws }
    }
}

#[async_trait]
impl MeteredOperation for ForecastOperation {
    type Params = ForecastParams;
    type Output = Vec<ForecastPeriod>;

    fn name(&self) -> &'static str {
        GET_FORECAST
    }

    fn validate_params(&self, params: ForecastParams) -> Result<ForecastParams, String> {
        check_coordinates(params.latitude, params.longitude)?;
        Ok(params)
    }

    async fn execute(&self, params: ForecastParams) -> Result<Vec<ForecastPeriod>, ExecutionError> {
        self.nws.fetch_forecast(params.latitude, params.longitude).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_codes() {
        assert_eq!(normalize_region_code("CA").unwrap(), "CA");
        assert_eq!(normalize_region_code(" ny ").unwrap(), "NY");
        assert_eq!(normalize_region_code("ZZ").unwrap(), "ZZ");

        for bad in ["", "C", "CAL", "C1", "é1", "../"] {
            assert!(normalize_region_code(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_coordinates() {
        assert!(check_coordinates(37.7749, -122.4194).is_ok());
        assert!(check_coordinates(90.0, 180.0).is_ok());
        assert!(check_coordinates(-90.0, -180.0).is_ok());

        assert!(check_coordinates(999.0, 999.0).is_err());
        assert!(check_coordinates(0.0, 180.5).is_err());
        assert!(check_coordinates(f64::NAN, 0.0).is_err());
        assert!(check_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_default_tariff() {
        let tariff = default_tariff();
        assert_eq!(tariff.rate(GET_ALERTS), Some(2));
        assert_eq!(tariff.rate(GET_FORECAST), Some(3));
    }
}
