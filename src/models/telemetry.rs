//! Telemetry window summary types.

use serde::{Deserialize, Serialize};

/// Min/max/average over the look-back window plus the latest instant value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Minimum over the window.
    pub min: f64,
    /// Maximum over the window.
    pub max: f64,
    /// Average over the window.
    pub avg: f64,
    /// Latest instantaneous value.
    pub current: f64,
}

/// Short-term rate-of-change series over the most recent sub-window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// The most recent derivative samples, oldest first.
    pub samples: Vec<f64>,
    /// Average of the samples.
    pub avg: f64,
    /// Maximum of the samples.
    pub max: f64,
    /// Minimum of the samples.
    pub min: f64,
}

impl RateWindow {
    /// Derives the window statistics from a non-empty sample series.
    ///
    /// Returns `None` for an empty series; the caller treats that as the
    /// whole summary being absent.
    #[must_use]
    pub fn from_samples(samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let avg = sum / samples.len() as f64;
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        Some(Self {
            samples,
            avg,
            max,
            min,
        })
    }
}

/// Window statistics plus rate-of-change series for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Aggregates over the look-back window.
    pub stats: MetricStats,
    /// Short-term rate of change.
    pub rate: RateWindow,
}

/// All-or-nothing summary of the environmental telemetry window.
///
/// If any required metric or statistic was unavailable the fetch yields no
/// summary at all; a value of this type always carries every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Tank temperature in degrees Celsius.
    pub temperature: MetricSummary,
    /// Relative humidity in percent.
    pub humidity: MetricSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_window_from_samples() {
        let window = RateWindow::from_samples(vec![0.5, -0.25, 0.125]).expect("non-empty");
        assert!((window.avg - 0.125).abs() < f64::EPSILON);
        assert!((window.max - 0.5).abs() < f64::EPSILON);
        assert!((window.min - (-0.25)).abs() < f64::EPSILON);
        assert_eq!(window.samples.len(), 3);
    }

    #[test]
    fn test_rate_window_empty_is_absent() {
        assert!(RateWindow::from_samples(vec![]).is_none());
    }
}
