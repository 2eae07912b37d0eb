//! Environmental telemetry window fetching.
//!
//! Queries a time-series store for a fixed look-back window of tank
//! metrics and derives summary statistics plus a short rate-of-change
//! series. The fetch is all-or-nothing: if any single query errors or
//! returns no data, the whole summary is absent and the cycle degrades to
//! diagnosis without tank fusion.

mod prometheus;
mod window;

pub use prometheus::PrometheusClient;
pub use window::{TelemetryWindowConfig, WindowFetcher};

use thiserror::Error;

/// Failure of a single metrics query.
///
/// Internal to the telemetry stage: the window fetcher maps any query
/// failure to an absent summary rather than a cycle error.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The metrics store could not be reached or errored.
    #[error("metrics store unavailable: {cause}")]
    Unavailable {
        /// The underlying cause.
        cause: String,
    },

    /// The query succeeded but returned no samples.
    #[error("query returned no data")]
    NoData,
}

/// A time-series metrics store.
///
/// Range queries return the sample values over `[start, end]` at the given
/// step; instant queries return the current scalar value.
pub trait MetricsSource: Send + Sync {
    /// The source name, for logs.
    fn name(&self) -> &'static str;

    /// Evaluates an instant query.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] if the query fails or has no result.
    fn instant(&self, query: &str) -> Result<f64, TelemetryError>;

    /// Evaluates a range query, returning sample values oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] if the query fails or has no result.
    fn range(
        &self,
        query: &str,
        start: u64,
        end: u64,
        step_secs: u64,
    ) -> Result<Vec<f64>, TelemetryError>;
}
