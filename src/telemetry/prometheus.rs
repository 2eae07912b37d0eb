//! Prometheus HTTP API client.

use super::{MetricsSource, TelemetryError};
use serde::Deserialize;
use std::time::Duration;

/// Metrics source backed by the Prometheus HTTP API.
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PrometheusClient {
    /// Default request timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    /// Default connect timeout in milliseconds.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;

    /// Creates a client for the given Prometheus base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(
            base_url,
            Self::DEFAULT_TIMEOUT_MS,
            Self::DEFAULT_CONNECT_TIMEOUT_MS,
        )
    }

    /// Creates a client with explicit timeouts.
    #[must_use]
    pub fn with_timeouts(
        base_url: impl Into<String>,
        timeout_ms: u64,
        connect_timeout_ms: u64,
    ) -> Self {
        let mut builder = reqwest::blocking::Client::builder();
        if timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(connect_timeout_ms));
        }
        let client = builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build metrics HTTP client: {err}");
            reqwest::blocking::Client::new()
        });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<String, TelemetryError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(params)
            .send()
            .map_err(|e| TelemetryError::Unavailable {
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TelemetryError::Unavailable {
                cause: format!("metrics API returned status: {}", response.status()),
            });
        }

        response.text().map_err(|e| TelemetryError::Unavailable {
            cause: e.to_string(),
        })
    }
}

impl MetricsSource for PrometheusClient {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn instant(&self, query: &str) -> Result<f64, TelemetryError> {
        let body = self.get("/api/v1/query", &[("query", query.to_string())])?;
        parse_instant_response(&body)
    }

    fn range(
        &self,
        query: &str,
        start: u64,
        end: u64,
        step_secs: u64,
    ) -> Result<Vec<f64>, TelemetryError> {
        let body = self.get(
            "/api/v1/query_range",
            &[
                ("query", query.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", step_secs.to_string()),
            ],
        )?;
        parse_range_response(&body)
    }
}

/// Prometheus API response envelope.
#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: PromData,
}

#[derive(Debug, Default, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromSeries>,
}

/// One series in a query result. Range queries populate `values`, instant
/// queries populate `value`.
#[derive(Debug, Deserialize)]
struct PromSeries {
    #[serde(default)]
    values: Vec<(f64, String)>,
    #[serde(default)]
    value: Option<(f64, String)>,
}

fn parse_envelope(body: &str) -> Result<PromResponse, TelemetryError> {
    let response: PromResponse =
        serde_json::from_str(body).map_err(|e| TelemetryError::Unavailable {
            cause: format!("malformed metrics response: {e}"),
        })?;

    if response.status != "success" {
        return Err(TelemetryError::Unavailable {
            cause: format!("metrics query status: {}", response.status),
        });
    }

    Ok(response)
}

fn parse_sample(raw: &str) -> Result<f64, TelemetryError> {
    raw.parse().map_err(|_| TelemetryError::Unavailable {
        cause: format!("non-numeric sample value: {raw}"),
    })
}

/// Parses a range-query response into sample values, oldest first.
fn parse_range_response(body: &str) -> Result<Vec<f64>, TelemetryError> {
    let response = parse_envelope(body)?;
    let series = response.data.result.first().ok_or(TelemetryError::NoData)?;

    if series.values.is_empty() {
        return Err(TelemetryError::NoData);
    }

    series
        .values
        .iter()
        .map(|(_, raw)| parse_sample(raw))
        .collect()
}

/// Parses an instant-query response into the current value.
fn parse_instant_response(body: &str) -> Result<f64, TelemetryError> {
    let response = parse_envelope(body)?;
    let series = response.data.result.first().ok_or(TelemetryError::NoData)?;

    // Instant queries answer in `value`; a range-shaped response still
    // carries the latest sample last.
    if let Some((_, raw)) = &series.value {
        return parse_sample(raw);
    }
    match series.values.last() {
        Some((_, raw)) => parse_sample(raw),
        None => Err(TelemetryError::NoData),
    }
}
