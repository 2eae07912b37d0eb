//! Frame capture.
//!
//! Drives an imaging device with deterministic, reproducible settings so
//! downstream inference prompts stay comparable run-to-run: fixed parameter
//! set on every open, a short warm-up to swallow auto-adjustment
//! transients, then a small burst from which the sharpest frame wins.

mod device;
mod enhance;
mod retention;

pub use device::HttpCameraDevice;
pub use enhance::{EnhanceError, enhance};
pub use retention::{FrameRetention, RetentionResult};

use crate::models::Frame;
use chrono::Local;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Typed failure of the capture stage.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The imaging device could not be opened or read.
    #[error("imaging device unavailable: {cause}")]
    DeviceUnavailable {
        /// The underlying cause.
        cause: String,
    },

    /// Every frame in the burst was blank (zero pixel variance).
    #[error("no valid frame in burst")]
    NoValidFrame,

    /// The selected frame could not be written to the archive.
    #[error("frame storage failed: {cause}")]
    Storage {
        /// The underlying cause.
        cause: String,
    },
}

impl CaptureError {
    /// Returns the taxonomy reason string for this failure.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::NoValidFrame => "no_valid_frame",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Fixed device parameter set.
///
/// Values are sent to the device verbatim on every open; nothing is
/// auto-negotiated. The defaults are the tuning that photographs the tank
/// well under its grow light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Brightness control value.
    pub brightness: i32,
    /// Contrast control value.
    pub contrast: i32,
    /// Saturation control value.
    pub saturation: i32,
    /// Hue control value.
    pub hue: i32,
    /// Sharpness control value.
    pub sharpness: i32,
    /// Gain control value.
    pub gain: i32,
    /// Absolute exposure value.
    pub exposure: i32,
    /// Whether device-side auto white balance is enabled.
    pub auto_white_balance: bool,
    /// Whether backlight compensation is enabled.
    pub backlight_compensation: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            brightness: 0,
            contrast: 32,
            saturation: 64,
            hue: 0,
            sharpness: 5,
            gain: 10,
            exposure: 200,
            auto_white_balance: true,
            backlight_compensation: false,
        }
    }
}

/// An imaging device exposing open/configure/read primitives.
///
/// Implementations map these onto whatever plumbing actually owns the
/// sensor; the shipped backend talks to an HTTP frame server.
pub trait CameraDevice: Send {
    /// The device name, for logs.
    fn name(&self) -> &'static str;

    /// Opens the device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] if the device cannot be
    /// reached.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Applies the fixed parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] if the device rejects
    /// the parameters.
    fn configure(&mut self, settings: &CameraSettings) -> Result<(), CaptureError>;

    /// Reads one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] if no frame could be
    /// produced.
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Capture pipeline stage: warm-up, burst, selection, enhancement, archive.
pub struct CaptureService {
    device: Box<dyn CameraDevice>,
    settings: CameraSettings,
    warmup_frames: u32,
    burst_size: u32,
    enhance: bool,
    archive_dir: PathBuf,
    current_path: PathBuf,
    retention: FrameRetention,
}

impl CaptureService {
    /// Creates a capture service around a device.
    ///
    /// `archive_dir` receives the timestamped `plant_*.jpg` files and the
    /// `current.jpg` slot read by the serve surface.
    #[must_use]
    pub fn new(device: Box<dyn CameraDevice>, archive_dir: impl Into<PathBuf>) -> Self {
        let archive_dir = archive_dir.into();
        let current_path = archive_dir.join("current.jpg");
        Self {
            device,
            settings: CameraSettings::default(),
            warmup_frames: 2,
            burst_size: 3,
            enhance: true,
            archive_dir,
            current_path,
            retention: FrameRetention::default(),
        }
    }

    /// Sets the device parameter set.
    #[must_use]
    pub const fn with_settings(mut self, settings: CameraSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the number of warm-up frames discarded after configuring.
    #[must_use]
    pub const fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Sets the burst size for best-of-N selection (floor of 1).
    #[must_use]
    pub const fn with_burst_size(mut self, size: u32) -> Self {
        self.burst_size = if size == 0 { 1 } else { size };
        self
    }

    /// Enables or disables the deterministic enhancement transform.
    #[must_use]
    pub const fn with_enhancement(mut self, enabled: bool) -> Self {
        self.enhance = enabled;
        self
    }

    /// Sets the retention policy for the frame archive.
    #[must_use]
    pub const fn with_retention(mut self, retention: FrameRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Path of the "current" frame slot.
    #[must_use]
    pub fn current_path(&self) -> &std::path::Path {
        &self.current_path
    }

    /// Captures one frame.
    ///
    /// Opens and configures the device, discards the warm-up frames, reads
    /// a burst, selects the frame with the highest pixel-intensity standard
    /// deviation, optionally enhances it (falling back to the unenhanced
    /// frame on any internal enhancement failure), and persists it to the
    /// archive and the current slot. Retention runs after every successful
    /// capture, never on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] if the device cannot be
    /// opened, configured, or read; [`CaptureError::NoValidFrame`] if every
    /// burst frame is blank; [`CaptureError::Storage`] if the selected
    /// frame cannot be written.
    pub fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.device.open()?;
        self.device.configure(&self.settings)?;

        // Discard auto-adjustment transients. A failed warm-up read is not
        // fatal; the burst below decides.
        for _ in 0..self.warmup_frames {
            if let Err(e) = self.device.read_frame() {
                debug!(device = self.device.name(), error = %e, "warm-up frame read failed");
            }
        }

        let (image, score) = self.read_burst()?;

        let (image, enhanced) = if self.enhance {
            match enhance(&image) {
                Ok(enhanced) => (enhanced, true),
                Err(e) => {
                    warn!(error = %e, "enhancement failed, using unenhanced frame");
                    (image, false)
                }
            }
        } else {
            (image, false)
        };

        let captured_at = crate::current_timestamp();
        let frame = self.persist(&image, captured_at, enhanced, score)?;

        let result = self.retention.enforce(&self.archive_dir);
        info!(
            sharpness = score,
            enhanced,
            retention = %result.summary(),
            "frame captured"
        );

        Ok(frame)
    }

    /// Reads the burst and selects the sharpest non-blank frame.
    fn read_burst(&mut self) -> Result<(RgbImage, f64), CaptureError> {
        let mut best: Option<(RgbImage, f64)> = None;
        let mut frames_read = 0u32;
        let mut last_err = None;

        for _ in 0..self.burst_size {
            match self.device.read_frame() {
                Ok(img) => {
                    frames_read += 1;
                    let score = sharpness(&img);
                    if score > 0.0 && best.as_ref().is_none_or(|(_, s)| score > *s) {
                        best = Some((img, score));
                    }
                }
                Err(e) => {
                    debug!(device = self.device.name(), error = %e, "burst frame read failed");
                    last_err = Some(e);
                }
            }
        }

        if frames_read == 0 {
            return Err(last_err.unwrap_or(CaptureError::DeviceUnavailable {
                cause: "no frames read from burst".to_string(),
            }));
        }

        best.ok_or(CaptureError::NoValidFrame)
    }

    /// Writes the selected frame to the archive and the current slot.
    fn persist(
        &self,
        image: &RgbImage,
        captured_at: u64,
        enhanced: bool,
        score: f64,
    ) -> Result<Frame, CaptureError> {
        std::fs::create_dir_all(&self.archive_dir).map_err(|e| CaptureError::Storage {
            cause: e.to_string(),
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive_path = self.archive_dir.join(format!("plant_{stamp}.jpg"));

        image.save(&archive_path).map_err(|e| CaptureError::Storage {
            cause: e.to_string(),
        })?;
        image
            .save(&self.current_path)
            .map_err(|e| CaptureError::Storage {
                cause: e.to_string(),
            })?;

        Ok(Frame {
            captured_at,
            path: self.current_path.clone(),
            enhanced,
            sharpness: score,
        })
    }
}

/// Pixel-intensity standard deviation, used as a detail/contrast proxy for
/// sharpness when picking the best burst frame.
#[must_use]
pub fn sharpness(image: &RgbImage) -> f64 {
    let count = (u64::from(image.width()) * u64::from(image.height())) as usize;
    if count == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    let mut sum = 0.0;
    for pixel in image.pixels() {
        sum += luma(pixel);
    }
    let mean = sum / n;

    let mut variance = 0.0;
    for pixel in image.pixels() {
        let d = luma(pixel) - mean;
        variance += d * d;
    }
    (variance / n).sqrt()
}

fn luma(pixel: &image::Rgb<u8>) -> f64 {
    0.299 * f64::from(pixel[0]) + 0.587 * f64::from(pixel[1]) + 0.114 * f64::from(pixel[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scripted device returning a fixed frame sequence.
    struct ScriptedDevice {
        frames: Vec<RgbImage>,
        cursor: usize,
        fail_open: bool,
    }

    impl ScriptedDevice {
        fn new(frames: Vec<RgbImage>) -> Self {
            Self {
                frames,
                cursor: 0,
                fail_open: false,
            }
        }
    }

    impl CameraDevice for ScriptedDevice {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn open(&mut self) -> Result<(), CaptureError> {
            if self.fail_open {
                return Err(CaptureError::DeviceUnavailable {
                    cause: "scripted open failure".to_string(),
                });
            }
            Ok(())
        }

        fn configure(&mut self, _settings: &CameraSettings) -> Result<(), CaptureError> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
            let frame = self.frames.get(self.cursor).cloned();
            self.cursor += 1;
            frame.ok_or(CaptureError::DeviceUnavailable {
                cause: "scripted frames exhausted".to_string(),
            })
        }
    }

    /// Builds a 4x4 frame whose intensity std dev scales with `spread`.
    fn frame_with_spread(spread: u8) -> RgbImage {
        RgbImage::from_fn(4, 4, |x, _y| {
            if x % 2 == 0 {
                image::Rgb([128 - spread, 128 - spread, 128 - spread])
            } else {
                image::Rgb([128 + spread, 128 + spread, 128 + spread])
            }
        })
    }

    fn blank_frame() -> RgbImage {
        RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
    }

    #[test]
    fn test_sharpness_orders_by_spread() {
        let low = sharpness(&frame_with_spread(10));
        let high = sharpness(&frame_with_spread(45));
        let mid = sharpness(&frame_with_spread(30));
        assert!(high > mid && mid > low);
    }

    #[test]
    fn test_sharpness_blank_is_zero() {
        assert!(sharpness(&blank_frame()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_burst_selects_highest_spread() {
        // Scores ordered [low, high, mid]: the second frame must win.
        let frames = vec![
            frame_with_spread(10),
            frame_with_spread(45),
            frame_with_spread(30),
        ];
        let expected = sharpness(&frames[1]);

        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = CaptureService::new(Box::new(ScriptedDevice::new(frames)), dir.path())
            .with_warmup_frames(0)
            .with_burst_size(3)
            .with_enhancement(false);

        let frame = service.capture().expect("capture should succeed");
        assert!((frame.sharpness - expected).abs() < 1e-9);
        assert!(!frame.enhanced);
        assert!(frame.path.exists());
    }

    #[test]
    fn test_all_blank_burst_is_no_valid_frame() {
        let frames = vec![blank_frame(), blank_frame(), blank_frame()];
        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = CaptureService::new(Box::new(ScriptedDevice::new(frames)), dir.path())
            .with_warmup_frames(0)
            .with_burst_size(3);

        let err = service.capture().expect_err("capture should fail");
        assert_eq!(err.reason(), "no_valid_frame");
    }

    #[test]
    fn test_open_failure_is_device_unavailable() {
        let mut device = ScriptedDevice::new(vec![]);
        device.fail_open = true;
        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = CaptureService::new(Box::new(device), dir.path());

        let err = service.capture().expect_err("capture should fail");
        assert_eq!(err.reason(), "device_unavailable");
    }

    #[test]
    fn test_warmup_frames_are_discarded() {
        // Two warm-up frames are sharp; the burst frame is the one kept.
        let frames = vec![
            frame_with_spread(60),
            frame_with_spread(60),
            frame_with_spread(20),
        ];
        let expected = sharpness(&frames[2]);

        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = CaptureService::new(Box::new(ScriptedDevice::new(frames)), dir.path())
            .with_warmup_frames(2)
            .with_burst_size(1)
            .with_enhancement(false);

        let frame = service.capture().expect("capture should succeed");
        assert!((frame.sharpness - expected).abs() < 1e-9);
    }
}
