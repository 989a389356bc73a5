//! Travel times from the Google Distance Matrix API.
//!
//! One request per cycle: `departure_time=now` makes the provider return both
//! the typical duration and the duration in current traffic, and the delay
//! is their difference rounded to whole minutes.

use std::time::Duration;

use async_trait::async_trait;
use delaywatch_core::activities::{ActivityError, TrafficConditions, TrafficSource};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from the traffic provider.
#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    /// `GOOGLE_MAPS_API_KEY` is not set.
    #[error("GOOGLE_MAPS_API_KEY is not set")]
    MissingApiKey,

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status code.
    #[error("Distance Matrix HTTP error ({status}): {body}")]
    Http { status: u16, body: String },

    /// The provider rejected the request at the API level.
    #[error("Distance Matrix status {status}: {message}")]
    Status { status: String, message: String },

    /// The response did not contain the expected element.
    #[error("Malformed Distance Matrix response: {0}")]
    Malformed(String),
}

impl From<TrafficError> for ActivityError {
    fn from(e: TrafficError) -> Self {
        let transient = match &e {
            TrafficError::Request(_) => true,
            TrafficError::Http { status, .. } => *status == 429 || *status >= 500,
            TrafficError::Status { status, .. } => {
                matches!(status.as_str(), "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR")
            }
            TrafficError::MissingApiKey | TrafficError::Malformed(_) => false,
        };
        if transient {
            ActivityError::Transient(e.to_string())
        } else {
            ActivityError::Permanent(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// TrafficConfig
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Per-request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub api_key: String,
    /// Scheme and host of the API, without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl TrafficConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable               | Required | Default                       |
    /// |------------------------|----------|-------------------------------|
    /// | `GOOGLE_MAPS_API_KEY`  | yes      | —                             |
    /// | `GOOGLE_MAPS_BASE_URL` | no       | `https://maps.googleapis.com` |
    pub fn from_env() -> Result<Self, TrafficError> {
        let api_key = std::env::var("GOOGLE_MAPS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(TrafficError::MissingApiKey)?;
        let base_url = std::env::var("GOOGLE_MAPS_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(api_key, base_url))
    }

    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    status: String,
    duration: Option<TextValue>,
    duration_in_traffic: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    /// Seconds.
    value: i64,
}

/// Turn a Distance Matrix body into traffic conditions.
///
/// `ZERO_RESULTS` and `NOT_FOUND` elements mean no route exists between the
/// two points; they are reported as a zero delay so the monitor keeps
/// running rather than failing every cycle.
fn parse_conditions(body: DistanceMatrixResponse) -> Result<TrafficConditions, TrafficError> {
    if body.status != "OK" {
        return Err(TrafficError::Status {
            message: body.error_message.unwrap_or_default(),
            status: body.status,
        });
    }

    let element = body
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or_else(|| TrafficError::Malformed("no elements in response".to_string()))?;

    match element.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" | "NOT_FOUND" => return Ok(TrafficConditions::no_route()),
        other => {
            return Err(TrafficError::Status {
                status: other.to_string(),
                message: "element status".to_string(),
            })
        }
    }

    let planned = element
        .duration
        .ok_or_else(|| TrafficError::Malformed("element has no duration".to_string()))?
        .value;
    // Without traffic data the route is treated as on schedule.
    let in_traffic = element.duration_in_traffic.map_or(planned, |d| d.value);

    Ok(TrafficConditions::from_seconds(planned, in_traffic))
}

// ---------------------------------------------------------------------------
// GoogleMapsTraffic
// ---------------------------------------------------------------------------

/// [`TrafficSource`] backed by the Distance Matrix endpoint.
pub struct GoogleMapsTraffic {
    client: reqwest::Client,
    config: TrafficConfig,
}

impl GoogleMapsTraffic {
    pub fn new(config: TrafficConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch current travel times between two free-form addresses.
    pub async fn fetch(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<TrafficConditions, TrafficError> {
        let response = self
            .client
            .get(format!(
                "{}/maps/api/distancematrix/json",
                self.config.base_url
            ))
            .query(&[
                ("origins", origin),
                ("destinations", destination),
                ("departure_time", "now"),
                ("key", self.config.api_key.as_str()),
            ])
            .timeout(self.config.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrafficError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: DistanceMatrixResponse = response.json().await?;
        parse_conditions(body)
    }
}

#[async_trait]
impl TrafficSource for GoogleMapsTraffic {
    async fn fetch_traffic_conditions(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<TrafficConditions, ActivityError> {
        let conditions = self.fetch(origin, destination).await?;
        tracing::debug!(
            origin,
            destination,
            planned_seconds = conditions.planned_seconds,
            in_traffic_seconds = conditions.in_traffic_seconds,
            delay_minutes = conditions.delay_minutes,
            "Fetched traffic conditions",
        );
        Ok(conditions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    fn parse(json: serde_json::Value) -> Result<TrafficConditions, TrafficError> {
        parse_conditions(serde_json::from_value(json).unwrap())
    }

    fn ok_body(planned: i64, in_traffic: i64) -> serde_json::Value {
        serde_json::json!({
            "status": "OK",
            "rows": [{
                "elements": [{
                    "status": "OK",
                    "duration": { "text": "", "value": planned },
                    "duration_in_traffic": { "text": "", "value": in_traffic }
                }]
            }]
        })
    }

    #[test]
    fn ok_element_yields_rounded_delay() {
        let c = parse(ok_body(1800, 1800 + 35 * 60 + 20)).unwrap();
        assert_eq!(c.delay_minutes, 35);
        assert_eq!(c.planned_seconds, 1800);
    }

    #[test]
    fn zero_results_is_zero_delay() {
        let c = parse(serde_json::json!({
            "status": "OK",
            "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }]
        }))
        .unwrap();
        assert_eq!(c, TrafficConditions::no_route());
    }

    #[test]
    fn missing_traffic_duration_is_on_schedule() {
        let c = parse(serde_json::json!({
            "status": "OK",
            "rows": [{ "elements": [{ "status": "OK", "duration": { "value": 900 } }] }]
        }))
        .unwrap();
        assert_eq!(c.delay_minutes, 0);
    }

    #[test]
    fn request_denied_is_permanent() {
        let err = parse(serde_json::json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        }))
        .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
        assert!(!ActivityError::from(err).is_retryable());
    }

    #[test]
    fn over_query_limit_is_transient() {
        let err = parse(serde_json::json!({ "status": "OVER_QUERY_LIMIT" })).unwrap_err();
        assert!(ActivityError::from(err).is_retryable());
    }

    #[test]
    fn empty_rows_are_malformed() {
        let err = parse(serde_json::json!({ "status": "OK", "rows": [] })).unwrap_err();
        assert!(matches!(err, TrafficError::Malformed(_)));
    }

    #[tokio::test]
    async fn fetch_sends_query_and_parses_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/maps/api/distancematrix/json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("origins".into(), "Leeds".into()),
                Matcher::UrlEncoded("destinations".into(), "York".into()),
                Matcher::UrlEncoded("departure_time".into(), "now".into()),
                Matcher::UrlEncoded("key".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(3000, 3600).to_string())
            .create_async()
            .await;

        let traffic = GoogleMapsTraffic::new(TrafficConfig::new("test-key".into(), server.url()));
        let c = traffic
            .fetch_traffic_conditions("Leeds", "York")
            .await
            .unwrap();

        assert_eq!(c.delay_minutes, 10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/maps/api/distancematrix/json")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let traffic = GoogleMapsTraffic::new(TrafficConfig::new("k".into(), server.url()));
        let err = traffic
            .fetch_traffic_conditions("A", "B")
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }
}
