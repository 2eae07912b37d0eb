//! Look-back window fetcher.

use super::MetricsSource;
use crate::models::{MetricStats, MetricSummary, RateWindow, TelemetrySummary};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tracked metrics: (label, query expression).
const METRICS: [(&str, &str); 2] = [
    ("temperature", "temperature_celsius"),
    ("humidity", "humidity_percent"),
];

/// Window fetcher configuration.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryWindowConfig {
    /// Look-back duration in seconds.
    pub lookback_secs: u64,
    /// Range-query step and rate sub-window in seconds.
    pub step_secs: u64,
    /// Number of most-recent rate samples to keep.
    pub rate_samples: usize,
}

impl Default for TelemetryWindowConfig {
    fn default() -> Self {
        Self {
            lookback_secs: 12 * 3600,
            step_secs: 300,
            rate_samples: 12,
        }
    }
}

/// Fetches the telemetry window summary from a metrics source.
pub struct WindowFetcher {
    source: Arc<dyn MetricsSource>,
    config: TelemetryWindowConfig,
}

impl WindowFetcher {
    /// Creates a fetcher over a metrics source.
    #[must_use]
    pub fn new(source: Arc<dyn MetricsSource>, config: TelemetryWindowConfig) -> Self {
        Self { source, config }
    }

    /// Fetches the summary for the window ending at `now`.
    ///
    /// All queries for all metrics must succeed; any failed or empty query
    /// makes the whole summary absent. Absence is not an error — the
    /// caller degrades to diagnosis without tank fusion.
    #[must_use]
    pub fn fetch(&self, now: u64) -> Option<TelemetrySummary> {
        let mut summaries = METRICS
            .iter()
            .copied()
            .map(|(label, query)| self.fetch_metric(label, query, now));

        let temperature = summaries.next()??;
        let humidity = summaries.next()??;

        Some(TelemetrySummary {
            temperature,
            humidity,
        })
    }

    /// Fetches the summary for one metric.
    fn fetch_metric(&self, label: &str, metric: &str, now: u64) -> Option<MetricSummary> {
        let start = now.saturating_sub(self.config.lookback_secs);
        let lookback = self.config.lookback_secs;

        let min = self.aggregate(label, &format!("min_over_time({metric}[{lookback}s])"), now)?;
        let max = self.aggregate(label, &format!("max_over_time({metric}[{lookback}s])"), now)?;
        let avg = self.aggregate(label, &format!("avg_over_time({metric}[{lookback}s])"), now)?;

        let current = match self.source.instant(metric) {
            Ok(value) => value,
            Err(e) => {
                warn!(metric = label, error = %e, "instant query failed");
                return None;
            }
        };

        let rate_query = format!("rate({metric}[{}s])", self.config.step_secs);
        let samples = match self
            .source
            .range(&rate_query, start, now, self.config.step_secs)
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!(metric = label, error = %e, "rate query failed");
                return None;
            }
        };

        // Keep only the most recent sub-window of derivative samples.
        let tail_start = samples.len().saturating_sub(self.config.rate_samples);
        let rate = RateWindow::from_samples(samples[tail_start..].to_vec())?;

        debug!(metric = label, min, max, avg, current, "telemetry window fetched");

        Some(MetricSummary {
            stats: MetricStats {
                min,
                max,
                avg,
                current,
            },
            rate,
        })
    }

    /// Runs one aggregate range query, taking the first sample.
    fn aggregate(&self, label: &str, query: &str, now: u64) -> Option<f64> {
        let start = now.saturating_sub(self.config.lookback_secs);
        match self
            .source
            .range(query, start, now, self.config.step_secs)
        {
            Ok(values) => values.first().copied(),
            Err(e) => {
                warn!(metric = label, query, error = %e, "aggregate query failed");
                None
            }
        }
    }
}
