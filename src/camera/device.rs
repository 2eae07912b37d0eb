//! HTTP frame-server camera backend.
//!
//! The sensor itself lives behind a small camera server on the tank host;
//! this backend maps the device primitives onto its endpoints: `GET /stats`
//! to open, `POST /configure` to apply the parameter set, and `GET /raw`
//! to read one base64-encoded frame.

use super::{CameraDevice, CameraSettings, CaptureError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use serde::Deserialize;
use std::time::Duration;

/// Raw frame response from the camera server.
#[derive(Debug, Deserialize)]
struct RawFrameResponse {
    width: u32,
    height: u32,
    image_base64: String,
}

/// Camera backend reading frames from an HTTP camera server.
pub struct HttpCameraDevice {
    endpoint: String,
    client: reqwest::blocking::Client,
    opened: bool,
}

impl HttpCameraDevice {
    /// Default request timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    /// Default connect timeout in milliseconds.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;

    /// Creates a device client for the given camera server base URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeouts(
            endpoint,
            Self::DEFAULT_TIMEOUT_MS,
            Self::DEFAULT_CONNECT_TIMEOUT_MS,
        )
    }

    /// Creates a device client with explicit timeouts.
    #[must_use]
    pub fn with_timeouts(
        endpoint: impl Into<String>,
        timeout_ms: u64,
        connect_timeout_ms: u64,
    ) -> Self {
        let mut builder = reqwest::blocking::Client::builder();
        if timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(connect_timeout_ms));
        }
        let client = builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build camera HTTP client: {err}");
            reqwest::blocking::Client::new()
        });

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            opened: false,
        }
    }

    fn unavailable(cause: impl std::fmt::Display) -> CaptureError {
        CaptureError::DeviceUnavailable {
            cause: cause.to_string(),
        }
    }
}

impl CameraDevice for HttpCameraDevice {
    fn name(&self) -> &'static str {
        "http-camera"
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        let response = self
            .client
            .get(format!("{}/stats", self.endpoint))
            .send()
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "camera server returned status: {}",
                response.status()
            )));
        }

        self.opened = true;
        Ok(())
    }

    fn configure(&mut self, settings: &CameraSettings) -> Result<(), CaptureError> {
        if !self.opened {
            return Err(Self::unavailable("device not opened"));
        }

        let response = self
            .client
            .post(format!("{}/configure", self.endpoint))
            .json(settings)
            .send()
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "camera server rejected settings: {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.opened {
            return Err(Self::unavailable("device not opened"));
        }

        let response = self
            .client
            .get(format!("{}/raw", self.endpoint))
            .send()
            .map_err(Self::unavailable)?;

        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "camera server returned status: {}",
                response.status()
            )));
        }

        let raw: RawFrameResponse = response.json().map_err(Self::unavailable)?;

        let bytes = BASE64
            .decode(raw.image_base64.as_bytes())
            .map_err(Self::unavailable)?;

        let image = image::load_from_memory(&bytes)
            .map_err(Self::unavailable)?
            .to_rgb8();

        if image.width() != raw.width || image.height() != raw.height {
            tracing::debug!(
                reported_width = raw.width,
                reported_height = raw.height,
                actual_width = image.width(),
                actual_height = image.height(),
                "camera server frame dimensions disagree with payload"
            );
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_stripped() {
        let device = HttpCameraDevice::new("http://plant-cam:8080/");
        assert_eq!(device.endpoint, "http://plant-cam:8080");
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut device = HttpCameraDevice::new("http://plant-cam:8080");
        let err = device.read_frame().expect_err("must require open");
        assert_eq!(err.reason(), "device_unavailable");
    }
}
