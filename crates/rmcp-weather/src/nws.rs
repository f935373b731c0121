//! National Weather Service (api.weather.gov) client.

use std::time::Duration;

use reqwest::StatusCode;
use rmcp_metering::{ExecutionError, ExecutionErrorKind};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const NWS_API_BASE: &str = "https://api.weather.gov";
pub const USER_AGENT: &str = "weather-meter/0.1.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Periods shown per forecast.
pub const FORECAST_PERIODS: usize = 5;

// api.weather.gov GeoJSON response structures

#[derive(Debug, Deserialize)]
struct AlertCollection {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertProperties {
    event: Option<String>,
    area_desc: Option<String>,
    severity: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
struct PointProperties {
    forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub event: String,
    pub area: String,
    pub severity: String,
    pub description: String,
}

impl From<AlertProperties> for AlertRecord {
    fn from(p: AlertProperties) -> Self {
        Self {
            event: p.event.unwrap_or_else(|| "Unknown".into()),
            area: p.area_desc.unwrap_or_else(|| "Unknown".into()),
            severity: p.severity.unwrap_or_else(|| "Unknown".into()),
            description: p
                .description
                .unwrap_or_else(|| "No description available".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub name: String,
    pub temperature: f64,
    pub temperature_unit: String,
    #[serde(default)]
    pub wind_speed: String,
    #[serde(default)]
    pub wind_direction: String,
    #[serde(default)]
    pub detailed_forecast: String,
}

#[derive(Debug, Clone)]
pub struct NwsClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Default for NwsClient {
    fn default() -> Self {
        Self::new(NWS_API_BASE, DEFAULT_TIMEOUT)
    }
}

impl NwsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ExecutionError> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/geo+json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ExecutionErrorKind::Timeout
                } else {
                    ExecutionErrorKind::Transport
                };
                ExecutionError::new(kind, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::new(
                status_kind(status),
                format!("Weather API returned status: {}", status),
            ));
        }

        response.json::<T>().await.map_err(|e| {
            ExecutionError::new(
                ExecutionErrorKind::Decode,
                format!("Failed to parse weather data: {}", e),
            )
        })
    }

    /// Active alerts for a region (state or marine area) code.
    pub async fn fetch_alerts(&self, region: &str) -> Result<Vec<AlertRecord>, ExecutionError> {
        let url = format!(
            "{}/alerts/active/area/{}",
            self.base_url,
            urlencoding::encode(region)
        );
        let data: AlertCollection = self.get_json(&url).await?;

        Ok(data
            .features
            .into_iter()
            .map(|f| AlertRecord::from(f.properties))
            .collect())
    }

    /// Forecast periods for a point. Two requests: the points lookup names the
    /// gridpoint forecast URL, which is then fetched.
    pub async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<ForecastPeriod>, ExecutionError> {
        // NWS redirects anything past four decimal places.
        let points_url = format!("{}/points/{:.4},{:.4}", self.base_url, latitude, longitude);
        let point: PointResponse = self.get_json(&points_url).await?;

        let forecast_url = point.properties.forecast.ok_or_else(|| {
            ExecutionError::new(
                ExecutionErrorKind::NotFound,
                "Unable to fetch forecast data for this location.",
            )
        })?;

        let forecast: ForecastResponse = self.get_json(&forecast_url).await?;
        Ok(forecast.properties.periods)
    }
}

fn status_kind(status: StatusCode) -> ExecutionErrorKind {
    if status == StatusCode::NOT_FOUND {
        ExecutionErrorKind::NotFound
    } else if status.is_client_error() {
        ExecutionErrorKind::ClientError
    } else {
        ExecutionErrorKind::ServiceError
    }
}

pub fn format_alerts(alerts: &[AlertRecord]) -> String {
    if alerts.is_empty() {
        return "No active alerts for this state.".to_string();
    }

    alerts
        .iter()
        .map(|a| {
            format!(
                "Event: {}\nArea: {}\nSeverity: {}\nDescription: {}",
                a.event, a.area, a.severity, a.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn format_forecast(periods: &[ForecastPeriod]) -> String {
    if periods.is_empty() {
        return "No forecast periods available for this location.".to_string();
    }

    periods
        .iter()
        .take(FORECAST_PERIODS)
        .map(|p| {
            format!(
                "{}:\nTemperature: {}°{}\nWind: {} {}\nForecast: {}",
                p.name,
                p.temperature,
                p.temperature_unit,
                p.wind_speed,
                p.wind_direction,
                p.detailed_forecast
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn period(name: &str, temperature: f64) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "temperature": temperature,
            "temperatureUnit": "F",
            "windSpeed": "10 mph",
            "windDirection": "W",
            "detailedForecast": "Sunny."
        })
    }

    #[tokio::test]
    async fn test_fetch_alerts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerts/active/area/CA"))
            .and(header("User-Agent", USER_AGENT))
            .and(header("Accept", "application/geo+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "features": [
                    { "properties": {
                        "event": "Heat Advisory",
                        "areaDesc": "Fresno",
                        "severity": "Moderate",
                        "description": "Hot."
                    } },
                    { "properties": { "event": "Wind Advisory" } }
                ]
            })))
            .mount(&server)
            .await;

        let client = NwsClient::new(server.uri(), Duration::from_secs(5));
        let alerts = client.fetch_alerts("CA").await.unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].event, "Heat Advisory");
        assert_eq!(alerts[0].area, "Fresno");
        assert_eq!(alerts[1].area, "Unknown");
        assert_eq!(alerts[1].description, "No description available");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/alerts/active/area/ZZ"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/alerts/active/area/QQ"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(path("/alerts/active/area/TX"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = NwsClient::new(server.uri(), Duration::from_secs(5));
        let kind = |r: Result<Vec<AlertRecord>, ExecutionError>| r.unwrap_err().kind;

        assert_eq!(kind(client.fetch_alerts("ZZ").await), ExecutionErrorKind::NotFound);
        assert_eq!(kind(client.fetch_alerts("QQ").await), ExecutionErrorKind::ClientError);
        assert_eq!(kind(client.fetch_alerts("TX").await), ExecutionErrorKind::ServiceError);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "features": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = NwsClient::new(server.uri(), Duration::from_millis(100));
        let err = client.fetch_alerts("CA").await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_forecast_follows_points() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/points/37.7749,-122.4194"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {
                    "forecast": format!("{}/gridpoints/MTR/85,105/forecast", server.uri())
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gridpoints/MTR/85,105/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": { "periods": [period("Tonight", 54.0), period("Friday", 68.0)] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NwsClient::new(server.uri(), Duration::from_secs(5));
        let periods = client.fetch_forecast(37.7749, -122.4194).await.unwrap();

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].name, "Tonight");
        assert_eq!(periods[1].temperature, 68.0);
    }

    #[tokio::test]
    async fn test_point_without_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "properties": { "forecast": null } })),
            )
            .mount(&server)
            .await;

        let client = NwsClient::new(server.uri(), Duration::from_secs(5));
        let err = client.fetch_forecast(10.0, 10.0).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::NotFound);
    }

    #[test]
    fn test_format_alerts() {
        assert_eq!(format_alerts(&[]), "No active alerts for this state.");

        let alert = AlertRecord {
            event: "Flood Watch".into(),
            area: "Kings".into(),
            severity: "Severe".into(),
            description: "Rain.".into(),
        };
        let text = format_alerts(&[alert.clone(), alert]);
        assert_eq!(text.matches("\n---\n").count(), 1);
        assert!(text.starts_with("Event: Flood Watch\nArea: Kings\nSeverity: Severe"));
    }

    #[test]
    fn test_format_forecast_caps_periods() {
        let periods: Vec<ForecastPeriod> = (0..8)
            .map(|i| serde_json::from_value(period(&format!("P{}", i), 60.0)).unwrap())
            .collect();

        let text = format_forecast(&periods);
        assert!(text.contains("P4:"));
        assert!(!text.contains("P5:"));
        assert!(text.contains("Temperature: 60°F"));
        assert!(text.contains("Wind: 10 mph W"));
    }
}
