//! Pipeline event types for the observability export.
//!
//! Events are a strict analytics export: nothing in the pipeline branches
//! on whether an event was delivered.

use super::{PlantType, Severity};
use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata required for observability.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Event source component.
    pub source: &'static str,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(source: &'static str) -> Self {
        Self::with_timestamp(source, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(source: &'static str, timestamp: u64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            source,
            timestamp,
        }
    }
}

/// Events emitted during a pipeline cycle.
#[derive(Debug, Clone)]
pub enum TankEvent {
    /// One plant was diagnosed within a capture.
    PlantDiagnosed {
        /// Event metadata.
        meta: EventMeta,
        /// Diagnosis severity.
        severity: Severity,
        /// Species of the plant.
        plant_type: PlantType,
        /// Within-frame identifier.
        plant_id: u32,
        /// Free-text diagnosis.
        diagnosis: String,
        /// Position descriptor within the frame.
        position: String,
    },
    /// The tank-level verdict was produced.
    TankAssessed {
        /// Event metadata.
        meta: EventMeta,
        /// Fused severity.
        severity: Severity,
        /// Combined visual + sensor diagnosis.
        combined_diagnosis: String,
        /// Actionable recommendations.
        recommendations: String,
    },
    /// A cycle ran to a successful end.
    CycleCompleted {
        /// Event metadata.
        meta: EventMeta,
        /// Number of plants diagnosed.
        plants: usize,
        /// Whether a tank verdict was fused in.
        fused: bool,
        /// Wall-clock duration of the cycle in milliseconds.
        duration_ms: u64,
    },
    /// A cycle ended in a stage failure.
    CycleFailed {
        /// Event metadata.
        meta: EventMeta,
        /// Name of the failed stage.
        stage: &'static str,
        /// Failure reason from the stage taxonomy.
        reason: String,
    },
}

impl TankEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PlantDiagnosed { .. } => "plant.diagnosed",
            Self::TankAssessed { .. } => "tank.assessed",
            Self::CycleCompleted { .. } => "cycle.completed",
            Self::CycleFailed { .. } => "cycle.failed",
        }
    }

    /// Returns the severity this event should be exported at.
    ///
    /// Plant findings are the analytics export and carry their diagnosis
    /// severity; the tank assessment's verdict rides in its payload and the
    /// event itself exports informationally.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::PlantDiagnosed { severity, .. } => *severity,
            Self::TankAssessed { .. } | Self::CycleCompleted { .. } => Severity::Info,
            Self::CycleFailed { .. } => Severity::Warning,
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::PlantDiagnosed { meta, .. }
            | Self::TankAssessed { meta, .. }
            | Self::CycleCompleted { meta, .. }
            | Self::CycleFailed { meta, .. } => meta,
        }
    }

    /// Returns the timestamp of the event.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.meta().timestamp
    }
}
