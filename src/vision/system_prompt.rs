//! System prompts and structured-output contracts for the inference calls.
//!
//! The prompts pin the status and plant-type vocabularies and the
//! disambiguation-by-suffix rule for duplicate plants so the service
//! answers inside the report schema every time.

use crate::models::TelemetrySummary;
use serde_json::{Value, json};

/// Domain framing for the per-plant diagnosis call.
pub const HEALTH_EXPERT_PROMPT: &str = "You are a carnivorous plant health expert. Examine the \
     picture of the tank containing the plants. Analyse leaves, colour, pitchers or flytraps, \
     growth and any signs of decay.";

/// Field vocabulary for the per-plant diagnosis call.
pub const HEALTH_SCHEMA_PROMPT: &str = "plant_status follows log levels info, warning, critical. \
     plant_type is one of venus flytrap, pitcher plant, sundew. plant_id is the unique identifier \
     of the plant within this frame. plant_diagnosis is the diagnosis of the plant. \
     plant_position is where you have seen the plant in frame, for example top left, bottom right.";

/// Duplicate-handling rule for the per-plant diagnosis call.
pub const HEALTH_DUPLICATES_PROMPT: &str = "There are multiple plants in the image. Provide the \
     diagnosis for each plant one by one. There may be duplicates of the same type; number them \
     with plant_id, for example pitcher 1, pitcher 2.";

/// User text accompanying the frame in the diagnosis call.
pub const HEALTH_USER_PROMPT: &str = "Analyze all plants in this image";

/// Domain framing for the tank fusion call.
pub const TANK_EXPERT_PROMPT: &str = "You are a carnivorous plant tank health expert. Analyze the \
     tank conditions based on both the visual image and sensor data.";

/// Field vocabulary for the tank fusion call.
pub const TANK_SCHEMA_PROMPT: &str = "tank_status follows log levels info, warning, critical. \
     temperature_analysis should analyze temperature trends and stability. humidity_analysis \
     should analyze humidity trends and stability. combined_diagnosis should consider both visual \
     and sensor data. recommendations should provide actionable steps.";

/// JSON schema the diagnosis response must conform to.
#[must_use]
pub fn health_report_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "log": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "plant_status": {
                            "type": "string",
                            "enum": ["info", "warning", "critical"]
                        },
                        "plant_type": {
                            "type": "string",
                            "enum": ["venus flytrap", "pitcher plant", "sundew"]
                        },
                        "plant_id": { "type": "integer" },
                        "plant_diagnosis": { "type": "string" },
                        "plant_position": { "type": "string" }
                    },
                    "required": [
                        "plant_status",
                        "plant_type",
                        "plant_id",
                        "plant_diagnosis",
                        "plant_position"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["log"],
        "additionalProperties": false
    })
}

/// JSON schema the fusion response must conform to.
#[must_use]
pub fn tank_health_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tank_status": {
                "type": "string",
                "enum": ["info", "warning", "critical"]
            },
            "temperature_analysis": { "type": "string" },
            "humidity_analysis": { "type": "string" },
            "combined_diagnosis": { "type": "string" },
            "recommendations": { "type": "string" }
        },
        "required": [
            "tank_status",
            "temperature_analysis",
            "humidity_analysis",
            "combined_diagnosis",
            "recommendations"
        ],
        "additionalProperties": false
    })
}

/// Renders the telemetry summary as the user-text block of the fusion call.
#[must_use]
pub fn render_telemetry(summary: &TelemetrySummary) -> String {
    let t = &summary.temperature;
    let h = &summary.humidity;
    format!(
        "Analyze the tank health based on the image and sensor data:\n\n\
         Temperature Data:\n\
         Min: {:.1}\u{b0}C\nMax: {:.1}\u{b0}C\nAvg: {:.1}\u{b0}C\nCurrent: {:.1}\u{b0}C\n\
         Rate of change (last {} samples): avg {:.3}, max {:.3}, min {:.3}\n\n\
         Humidity Data:\n\
         Min: {:.1}%\nMax: {:.1}%\nAvg: {:.1}%\nCurrent: {:.1}%\n\
         Rate of change (last {} samples): avg {:.3}, max {:.3}, min {:.3}",
        t.stats.min,
        t.stats.max,
        t.stats.avg,
        t.stats.current,
        t.rate.samples.len(),
        t.rate.avg,
        t.rate.max,
        t.rate.min,
        h.stats.min,
        h.stats.max,
        h.stats.avg,
        h.stats.current,
        h.rate.samples.len(),
        h.rate.avg,
        h.rate.max,
        h.rate.min,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricStats, MetricSummary, RateWindow};

    fn summary() -> TelemetrySummary {
        let metric = |min, max, avg, current| MetricSummary {
            stats: MetricStats {
                min,
                max,
                avg,
                current,
            },
            rate: RateWindow::from_samples(vec![0.1, -0.1]).expect("non-empty"),
        };
        TelemetrySummary {
            temperature: metric(21.5, 26.2, 24.0, 23.8),
            humidity: metric(88.0, 95.0, 92.0, 91.5),
        }
    }

    #[test]
    fn test_render_telemetry_carries_stats() {
        let text = render_telemetry(&summary());
        assert!(text.contains("Avg: 24.0\u{b0}C"));
        assert!(text.contains("Avg: 92.0%"));
        assert!(text.contains("Current: 23.8\u{b0}C"));
    }

    #[test]
    fn test_health_schema_requires_all_fields() {
        let schema = health_report_schema();
        let required = schema["properties"]["log"]["items"]["required"]
            .as_array()
            .expect("required list");
        assert_eq!(required.len(), 5);
    }
}
