//! Plant and tank health report types.
//!
//! Wire field names follow the inference contract: `plant_status`,
//! `plant_type`, `plant_id`, `plant_diagnosis`, `plant_position` for
//! observations, and a top-level `log` array for the report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Severity of a diagnosis, shared by plant and tank verdicts.
///
/// This is the single severity vocabulary for the whole crate; it is mapped
/// onto log levels exactly once, at the event-emission boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Healthy, nothing to act on.
    #[default]
    Info,
    /// Degraded, keep an eye on it.
    Warning,
    /// Needs intervention.
    Critical,
}

impl Severity {
    /// Returns the severity as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Parses a severity from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Species kept in the tank.
///
/// The inference service answers with the spaced spellings ("venus
/// flytrap"); aliases accept those alongside the kebab-case canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlantType {
    /// Dionaea muscipula.
    #[serde(
        rename = "venus-flytrap",
        alias = "venus flytrap",
        alias = "venus_flytrap"
    )]
    VenusFlytrap,
    /// Nepenthes / Sarracenia.
    #[serde(
        rename = "pitcher-plant",
        alias = "pitcher plant",
        alias = "pitcher_plant"
    )]
    PitcherPlant,
    /// Drosera.
    #[serde(rename = "sundew")]
    Sundew,
}

impl PlantType {
    /// Returns the plant type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VenusFlytrap => "venus-flytrap",
            Self::PitcherPlant => "pitcher-plant",
            Self::Sundew => "sundew",
        }
    }
}

impl fmt::Display for PlantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One plant's diagnosis within a single capture.
///
/// `plant_id` disambiguates duplicates of the same type and is unique only
/// within one [`HealthReport`], never across time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantObservation {
    /// Diagnosis severity.
    #[serde(rename = "plant_status")]
    pub status: Severity,
    /// Species of the observed plant.
    pub plant_type: PlantType,
    /// Stable-within-frame identifier.
    pub plant_id: u32,
    /// Free-text diagnosis.
    #[serde(rename = "plant_diagnosis")]
    pub diagnosis: String,
    /// Where in the frame the plant was seen ("top left", "bottom right").
    #[serde(rename = "plant_position")]
    pub position: String,
}

/// Ordered per-plant diagnoses produced from exactly one frame.
///
/// Non-empty on success; a partially-parsed report is never constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// The per-plant observations, in the order the service reported them.
    #[serde(rename = "log")]
    pub observations: Vec<PlantObservation>,
    /// Capture timestamp of the frame this report was derived from.
    ///
    /// Absent on the wire; stamped by the orchestrator before persistence.
    #[serde(default)]
    pub source_frame_timestamp: u64,
}

impl HealthReport {
    /// Returns the number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Returns true if the report carries no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Fused tank-level verdict from frame plus telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankHealth {
    /// Overall tank severity.
    #[serde(rename = "tank_status")]
    pub status: Severity,
    /// Temperature trend narrative.
    pub temperature_analysis: String,
    /// Humidity trend narrative.
    pub humidity_analysis: String,
    /// Combined visual + sensor diagnosis.
    pub combined_diagnosis: String,
    /// Actionable recommendations.
    pub recommendations: String,
}

/// An immutable captured frame.
///
/// Created by frame capture, never mutated, deleted only by the retention
/// policy once it falls outside the N-most-recent window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Capture timestamp (Unix epoch seconds).
    pub captured_at: u64,
    /// Path of the frame bytes on disk (the "current" slot).
    pub path: PathBuf,
    /// Whether the deterministic enhancement transform was applied.
    pub enhanced: bool,
    /// Pixel-intensity standard deviation of the selected burst frame.
    pub sharpness: f64,
}

/// The single current-state slot exposed to readers.
///
/// Overwritten atomically each successful cycle; a failed stage leaves the
/// previous value intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReport {
    /// The frame the report derives from.
    pub frame: Frame,
    /// The per-plant health report.
    pub health: HealthReport,
    /// Fused tank verdict, when telemetry and fusion were available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tank: Option<TankHealth>,
    /// When the producing cycle completed (Unix epoch seconds).
    pub completed_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("info", Some(Severity::Info); "info")]
    #[test_case("WARNING", Some(Severity::Warning); "uppercase warning")]
    #[test_case("critical", Some(Severity::Critical); "critical")]
    #[test_case("fatal", None; "unknown")]
    fn test_severity_parse(input: &str, expected: Option<Severity>) {
        assert_eq!(Severity::parse(input), expected);
    }

    #[test]
    fn test_plant_type_accepts_spaced_wire_form() {
        let obs: PlantObservation = serde_json::from_str(
            r#"{
                "plant_status": "warning",
                "plant_type": "venus flytrap",
                "plant_id": 2,
                "plant_diagnosis": "trap blackening",
                "plant_position": "bottom right"
            }"#,
        )
        .expect("observation should parse");

        assert_eq!(obs.plant_type, PlantType::VenusFlytrap);
        assert_eq!(obs.status, Severity::Warning);
        assert_eq!(obs.plant_id, 2);
    }

    #[test]
    fn test_health_report_wire_shape() {
        let report: HealthReport = serde_json::from_str(
            r#"{"log": [{
                "plant_status": "info",
                "plant_type": "sundew",
                "plant_id": 1,
                "plant_diagnosis": "dew production normal",
                "plant_position": "top left"
            }]}"#,
        )
        .expect("report should parse");

        assert_eq!(report.len(), 1);
        assert!(!report.is_empty());
        // Absent on the wire, stamped later by the orchestrator.
        assert_eq!(report.source_frame_timestamp, 0);
    }

    #[test]
    fn test_health_report_missing_field_rejected() {
        // plant_diagnosis missing: the report must fail as a whole.
        let result = serde_json::from_str::<HealthReport>(
            r#"{"log": [{
                "plant_status": "info",
                "plant_type": "sundew",
                "plant_id": 1,
                "plant_position": "top left"
            }]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_latest_report_omits_absent_tank() {
        let report = LatestReport {
            frame: Frame {
                captured_at: 100,
                path: PathBuf::from("current.jpg"),
                enhanced: false,
                sharpness: 42.0,
            },
            health: HealthReport {
                observations: vec![],
                source_frame_timestamp: 100,
            },
            tank: None,
            completed_at: 101,
        };

        let json = serde_json::to_string(&report).expect("serialize");
        assert!(!json.contains("tank"));

        let back: LatestReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }
}
