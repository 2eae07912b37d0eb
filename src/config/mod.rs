//! Configuration management.

use crate::camera::CameraSettings;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for plantdoc.
#[derive(Debug, Clone)]
pub struct PlantdocConfig {
    /// Path to the data directory (frame archive + persisted report).
    pub data_dir: PathBuf,
    /// Imaging device configuration.
    pub camera: CameraConfig,
    /// Capture stage configuration.
    pub capture: CaptureConfig,
    /// Inference service configuration.
    pub inference: InferenceConfig,
    /// Telemetry store configuration.
    pub telemetry: TelemetryConfig,
    /// HTTP serve surface configuration.
    pub server: ServerConfig,
    /// Cycle schedule configuration.
    pub schedule: ScheduleConfig,
}

/// Imaging device configuration.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Camera server base URL.
    pub endpoint: String,
    /// Fixed device parameter set.
    pub settings: CameraSettings,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://plant-cam:8080".to_string(),
            settings: CameraSettings::default(),
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Capture stage configuration.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Warm-up frames discarded after configuring the device.
    pub warmup_frames: u32,
    /// Burst size for best-of-N frame selection.
    pub burst_size: u32,
    /// Whether the deterministic enhancement transform is applied.
    pub enhance: bool,
    /// Number of archived frames the retention policy keeps.
    pub retention_limit: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            warmup_frames: 2,
            burst_size: 3,
            enhance: true,
            retention_limit: 5,
        }
    }
}

/// Inference service configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Model name.
    pub model: String,
    /// API key (falls back to `OPENAI_API_KEY`).
    pub api_key: Option<String>,
    /// Base URL override (for self-hosted gateways).
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Telemetry store configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Prometheus base URL.
    pub base_url: String,
    /// Look-back window in hours.
    pub lookback_hours: u64,
    /// Range-query step and rate sub-window in seconds.
    pub step_secs: u64,
    /// Number of most-recent rate samples kept.
    pub rate_samples: usize,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://plant-hub:9090".to_string(),
            lookback_hours: 12,
            step_secs: 300,
            rate_samples: 12,
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// HTTP serve surface configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Cycle schedule configuration: fixed local hours of day.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Hours of day (local time, 0-23) a cycle is triggered.
    pub hours: Vec<u32>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hours: vec![9, 12, 17],
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Camera section.
    pub camera: Option<ConfigFileCamera>,
    /// Capture section.
    pub capture: Option<ConfigFileCapture>,
    /// Inference section.
    pub inference: Option<ConfigFileInference>,
    /// Telemetry section.
    pub telemetry: Option<ConfigFileTelemetry>,
    /// Server section.
    pub server: Option<ConfigFileServer>,
    /// Schedule section.
    pub schedule: Option<ConfigFileSchedule>,
}

/// Camera section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCamera {
    /// Camera server base URL.
    pub endpoint: Option<String>,
    /// Fixed device parameter set.
    pub settings: Option<CameraSettings>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Capture section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCapture {
    /// Warm-up frame count.
    pub warmup_frames: Option<u32>,
    /// Burst size.
    pub burst_size: Option<u32>,
    /// Enhancement toggle.
    pub enhance: Option<bool>,
    /// Retention limit.
    pub retention_limit: Option<usize>,
}

/// Inference section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileInference {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Telemetry section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTelemetry {
    /// Prometheus base URL.
    pub base_url: Option<String>,
    /// Look-back window in hours.
    pub lookback_hours: Option<u64>,
    /// Step in seconds.
    pub step_secs: Option<u64>,
    /// Rate sample count.
    pub rate_samples: Option<usize>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Server section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileServer {
    /// Socket address to bind.
    pub bind: Option<String>,
}

/// Schedule section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSchedule {
    /// Hours of day (local time).
    pub hours: Option<Vec<u32>>,
}

impl Default for PlantdocConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".plantdoc"),
            camera: CameraConfig::default(),
            capture: CaptureConfig::default(),
            inference: InferenceConfig::default(),
            telemetry: TelemetryConfig::default(),
            server: ServerConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl PlantdocConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let config = Self::from_config_file(file).with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/plantdoc/`. Returns
    /// defaults (with env overrides applied) when no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::BaseDirs::new().and_then(|base_dirs| {
            let candidates = [
                base_dirs.config_dir().join("plantdoc").join("config.toml"),
                base_dirs
                    .home_dir()
                    .join(".config")
                    .join("plantdoc")
                    .join("config.toml"),
            ];
            candidates
                .iter()
                .find(|p| p.exists())
                .and_then(|p| Self::load_from_file(p).ok())
        });

        from_file.unwrap_or_else(|| Self::default().with_env_overrides())
    }

    /// Converts a [`ConfigFile`] to a [`PlantdocConfig`].
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(camera) = file.camera {
            if let Some(endpoint) = camera.endpoint {
                config.camera.endpoint = endpoint;
            }
            if let Some(settings) = camera.settings {
                config.camera.settings = settings;
            }
            if let Some(v) = camera.timeout_ms {
                config.camera.timeout_ms = v;
            }
            if let Some(v) = camera.connect_timeout_ms {
                config.camera.connect_timeout_ms = v;
            }
        }
        if let Some(capture) = file.capture {
            if let Some(v) = capture.warmup_frames {
                config.capture.warmup_frames = v;
            }
            if let Some(v) = capture.burst_size {
                config.capture.burst_size = v;
            }
            if let Some(v) = capture.enhance {
                config.capture.enhance = v;
            }
            if let Some(v) = capture.retention_limit {
                config.capture.retention_limit = v;
            }
        }
        if let Some(inference) = file.inference {
            if let Some(v) = inference.model {
                config.inference.model = v;
            }
            config.inference.api_key = inference.api_key;
            config.inference.base_url = inference.base_url;
            if let Some(v) = inference.timeout_ms {
                config.inference.timeout_ms = v;
            }
            if let Some(v) = inference.connect_timeout_ms {
                config.inference.connect_timeout_ms = v;
            }
        }
        if let Some(telemetry) = file.telemetry {
            if let Some(v) = telemetry.base_url {
                config.telemetry.base_url = v;
            }
            if let Some(v) = telemetry.lookback_hours {
                config.telemetry.lookback_hours = v;
            }
            if let Some(v) = telemetry.step_secs {
                config.telemetry.step_secs = v;
            }
            if let Some(v) = telemetry.rate_samples {
                config.telemetry.rate_samples = v;
            }
            if let Some(v) = telemetry.timeout_ms {
                config.telemetry.timeout_ms = v;
            }
            if let Some(v) = telemetry.connect_timeout_ms {
                config.telemetry.connect_timeout_ms = v;
            }
        }
        if let Some(server) = file.server {
            if let Some(v) = server.bind {
                config.server.bind = v;
            }
        }
        if let Some(schedule) = file.schedule {
            if let Some(v) = schedule.hours {
                config.schedule.hours = v;
            }
        }

        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PLANTDOC_DATA_DIR") {
            if !v.trim().is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("PLANTDOC_CAMERA_ENDPOINT") {
            if !v.trim().is_empty() {
                self.camera.endpoint = v;
            }
        }
        if let Ok(v) = std::env::var("PLANTDOC_PROMETHEUS_URL") {
            if !v.trim().is_empty() {
                self.telemetry.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("PLANTDOC_BIND") {
            if !v.trim().is_empty() {
                self.server.bind = v;
            }
        }
        self
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for out-of-range values.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(hour) = self.schedule.hours.iter().find(|h| **h > 23) {
            return Err(crate::Error::InvalidInput(format!(
                "schedule hour {hour} out of range 0-23"
            )));
        }
        if self.capture.burst_size == 0 {
            return Err(crate::Error::InvalidInput(
                "capture burst_size must be at least 1".to_string(),
            ));
        }
        if self.telemetry.lookback_hours == 0 {
            return Err(crate::Error::InvalidInput(
                "telemetry lookback_hours must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlantdocConfig::default();
        assert_eq!(config.capture.retention_limit, 5);
        assert_eq!(config.capture.burst_size, 3);
        assert_eq!(config.telemetry.lookback_hours, 12);
        assert_eq!(config.schedule.hours, vec![9, 12, 17]);
        assert_eq!(config.camera.settings.width, 1920);
    }

    #[test]
    fn test_config_file_fold() {
        let file: ConfigFile = toml::from_str(
            r#"
            data_dir = "/var/lib/plantdoc"

            [camera]
            endpoint = "http://tank-cam:9000"

            [camera.settings]
            exposure = 150

            [capture]
            burst_size = 5
            enhance = false

            [telemetry]
            lookback_hours = 6

            [schedule]
            hours = [8, 20]
            "#,
        )
        .expect("toml parses");

        let config = PlantdocConfig::from_config_file(file);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/plantdoc"));
        assert_eq!(config.camera.endpoint, "http://tank-cam:9000");
        assert_eq!(config.camera.settings.exposure, 150);
        // Unset settings fields keep their defaults.
        assert_eq!(config.camera.settings.width, 1920);
        assert_eq!(config.capture.burst_size, 5);
        assert!(!config.capture.enhance);
        assert_eq!(config.telemetry.lookback_hours, 6);
        assert_eq!(config.schedule.hours, vec![8, 20]);
        // Untouched sections keep defaults.
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }

    #[test]
    fn test_validate_rejects_bad_hour() {
        let mut config = PlantdocConfig::default();
        config.schedule.hours = vec![9, 24];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let mut config = PlantdocConfig::default();
        config.capture.burst_size = 0;
        assert!(config.validate().is_err());
    }
}
