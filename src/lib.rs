//! # Plantdoc
//!
//! Terrarium health monitor for carnivorous plants.
//!
//! Plantdoc periodically captures a frame of the plant tank, asks a
//! vision-capable inference service for a per-plant diagnosis, correlates
//! the result with recent environmental telemetry, and publishes the fused
//! verdict as a single durable "latest report".
//!
//! ## Pipeline
//!
//! ```text
//! capture -> diagnose -> fetch telemetry -> fuse -> persist
//! ```
//!
//! Each stage returns a typed failure instead of raising past its boundary.
//! Capture and diagnosis failures end the cycle and leave the previous
//! report untouched; telemetry and fusion failures degrade the cycle to a
//! plant-level report without a tank verdict.
//!
//! ## Example
//!
//! ```rust,ignore
//! use plantdoc::PlantdocConfig;
//!
//! let config = PlantdocConfig::load_default();
//! let orchestrator = plantdoc::pipeline::build(&config)?;
//! let outcome = orchestrator.run_cycle()?;
//! println!("diagnosed {} plants", outcome.plants);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod camera;
pub mod config;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod vision;

// Re-exports for convenience
pub use camera::{CameraDevice, CameraSettings, CaptureError, CaptureService};
pub use config::PlantdocConfig;
pub use models::{
    Frame, HealthReport, LatestReport, PlantObservation, PlantType, Severity, TankHealth,
    TelemetrySummary,
};
pub use pipeline::{CycleFailure, CycleOutcome, CycleStage, Orchestrator, TriggerResult};
pub use store::ReportStore;
pub use telemetry::MetricsSource;
pub use vision::{DiagnosisError, VisionProvider};

/// Error type for plantdoc operations outside the per-stage taxonomies.
///
/// Pipeline stages carry their own typed failures ([`CaptureError`],
/// [`DiagnosisError`], [`CycleFailure`]); this type covers the surrounding
/// machinery: configuration, persistence I/O, and the serve surface.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A config file value cannot be interpreted (bad schedule hour,
    ///   zero burst size)
    /// - A CLI argument fails validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Report slot persistence I/O fails
    /// - The HTTP listener cannot bind
    /// - Config file read/parse fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for plantdoc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so every stage stamps frames, reports, and events from the
/// same clock. Falls back to 0 if the system clock is before the epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("bad schedule hour".to_string());
        assert_eq!(err.to_string(), "invalid input: bad schedule hour");

        let err = Error::OperationFailed {
            operation: "persist_report".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'persist_report' failed: disk full"
        );
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2024-01-01 as a floor; anything earlier means a broken clock path.
        assert!(current_timestamp() > 1_704_067_200);
    }
}
