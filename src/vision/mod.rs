//! Vision inference client abstraction.
//!
//! Provides a unified interface to the vision-capable inference service:
//! given an encoded frame and a structured-output contract, return a typed
//! result or a typed failure.

mod openai;
pub mod system_prompt;

pub use openai::OpenAiVisionClient;
pub use system_prompt::{health_report_schema, render_telemetry, tank_health_schema};

use crate::models::{HealthReport, TankHealth, TelemetrySummary};
use std::time::Duration;
use thiserror::Error;

/// Typed failure of the diagnosis and fusion stages.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    /// The inference capability could not be reached or errored.
    #[error("inference service unavailable: {cause}")]
    ServiceUnavailable {
        /// The underlying cause.
        cause: String,
    },

    /// The response did not conform to the expected schema.
    #[error("inference response failed to parse: {cause}")]
    ParseError {
        /// The underlying cause.
        cause: String,
    },

    /// The response parsed but carried no observations.
    #[error("inference response was empty")]
    EmptyResult,
}

impl DiagnosisError {
    /// Returns the taxonomy reason string for this failure.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::ParseError { .. } => "parse_error",
            Self::EmptyResult => "empty_result",
        }
    }
}

/// Trait for vision inference providers.
pub trait VisionProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Diagnoses every plant visible in the frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DiagnosisError`] if the request fails, the response does
    /// not conform to the report schema, or the report is empty.
    fn diagnose(&self, image_jpeg: &[u8]) -> Result<HealthReport, DiagnosisError>;

    /// Fuses the frame with telemetry statistics into a tank verdict.
    ///
    /// # Errors
    ///
    /// Returns a [`DiagnosisError`] with the same taxonomy as
    /// [`VisionProvider::diagnose`].
    fn assess_tank(
        &self,
        image_jpeg: &[u8],
        telemetry: &TelemetrySummary,
    ) -> Result<TankHealth, DiagnosisError>;
}

/// HTTP client configuration for inference requests.
#[derive(Debug, Clone, Copy)]
pub struct VisionHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for VisionHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Builds a blocking HTTP client for inference requests with configured
/// timeouts.
#[must_use]
pub fn build_http_client(config: VisionHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build inference HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Parses a health report response from inference output.
///
/// # Errors
///
/// Returns [`DiagnosisError::ParseError`] for malformed JSON or a schema
/// mismatch, [`DiagnosisError::EmptyResult`] for an empty observation list.
pub fn parse_health_report(response: &str) -> Result<HealthReport, DiagnosisError> {
    let json_str = extract_json_from_response(response);
    let report: HealthReport =
        serde_json::from_str(json_str).map_err(|e| DiagnosisError::ParseError {
            cause: format!("{e}. Response: {response}"),
        })?;

    if report.is_empty() {
        return Err(DiagnosisError::EmptyResult);
    }

    Ok(report)
}

/// Parses a tank health response from inference output.
///
/// # Errors
///
/// Returns [`DiagnosisError::ParseError`] for malformed JSON or a schema
/// mismatch.
pub fn parse_tank_health(response: &str) -> Result<TankHealth, DiagnosisError> {
    let json_str = extract_json_from_response(response);
    serde_json::from_str(json_str).map_err(|e| DiagnosisError::ParseError {
        cause: format!("{e}. Response: {response}"),
    })
}

/// Extracts JSON from inference output, handling markdown code blocks.
///
/// Schema-constrained responses are normally bare JSON, but models that
/// ignore the constraint tend to wrap it in fences.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
