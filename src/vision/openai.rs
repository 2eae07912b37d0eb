//! OpenAI-compatible vision client.

use super::system_prompt::{
    HEALTH_DUPLICATES_PROMPT, HEALTH_EXPERT_PROMPT, HEALTH_SCHEMA_PROMPT, HEALTH_USER_PROMPT,
    TANK_EXPERT_PROMPT, TANK_SCHEMA_PROMPT, health_report_schema, render_telemetry,
    tank_health_schema,
};
use super::{DiagnosisError, VisionHttpConfig, VisionProvider, parse_health_report,
    parse_tank_health};
use crate::models::{HealthReport, TankHealth, TelemetrySummary};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Vision inference client speaking the chat-completions contract.
pub struct OpenAiVisionClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OpenAiVisionClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";

    /// Creates a new client, reading the API key from `OPENAI_API_KEY`.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: super::build_http_client(VisionHttpConfig::default()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Rebuilds the HTTP client with the given timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: VisionHttpConfig) -> Self {
        self.client = super::build_http_client(config);
        self
    }

    /// Validates that the client is configured.
    fn validate(&self) -> Result<(), DiagnosisError> {
        if self.api_key.is_none() {
            return Err(DiagnosisError::ServiceUnavailable {
                cause: "OPENAI_API_KEY not set".to_string(),
            });
        }
        Ok(())
    }

    /// Makes a schema-constrained request to the chat completions API.
    fn request(
        &self,
        messages: Vec<ChatMessage>,
        schema_name: &str,
        schema: Value,
    ) -> Result<String, DiagnosisError> {
        self.validate()?;

        let api_key =
            self.api_key
                .as_ref()
                .ok_or_else(|| DiagnosisError::ServiceUnavailable {
                    cause: "API key not configured".to_string(),
                })?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(1024),
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: schema_name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| DiagnosisError::ServiceUnavailable {
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(DiagnosisError::ServiceUnavailable {
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: ChatCompletionResponse =
            response
                .json()
                .map_err(|e| DiagnosisError::ServiceUnavailable {
                    cause: e.to_string(),
                })?;

        response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or(DiagnosisError::EmptyResult)
    }

    /// Builds the data-URL image part for a JPEG frame.
    fn image_part(image_jpeg: &[u8]) -> ContentPart {
        let encoded = BASE64.encode(image_jpeg);
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{encoded}"),
            },
        }
    }

    fn system(text: &str) -> ChatMessage {
        ChatMessage {
            role: "system".to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }
}

impl Default for OpenAiVisionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionProvider for OpenAiVisionClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn diagnose(&self, image_jpeg: &[u8]) -> Result<HealthReport, DiagnosisError> {
        let messages = vec![
            Self::system(HEALTH_EXPERT_PROMPT),
            Self::system(HEALTH_SCHEMA_PROMPT),
            Self::system(HEALTH_DUPLICATES_PROMPT),
            ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: HEALTH_USER_PROMPT.to_string(),
                    },
                    Self::image_part(image_jpeg),
                ]),
            },
        ];

        let response = self.request(messages, "plant_health", health_report_schema())?;
        parse_health_report(&response)
    }

    fn assess_tank(
        &self,
        image_jpeg: &[u8],
        telemetry: &TelemetrySummary,
    ) -> Result<TankHealth, DiagnosisError> {
        let messages = vec![
            Self::system(TANK_EXPERT_PROMPT),
            Self::system(TANK_SCHEMA_PROMPT),
            ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: render_telemetry(telemetry),
                    },
                    Self::image_part(image_jpeg),
                ]),
            },
        ];

        let response = self.request(messages, "tank_health", tank_health_schema())?;
        parse_tank_health(&response)
    }
}

/// Request to the chat completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
}

/// Structured-output constraint.
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

/// Named JSON schema the response must conform to.
#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

/// A message in the chat.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

/// Message content: plain text or multi-part with an inline image.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Inline image reference.
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Response from the chat completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// A choice in the response.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

/// The assistant message of a choice.
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}
