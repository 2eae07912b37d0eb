//! Durable single-slot report persistence.
//!
//! The store owns one `LatestReport` slot backed by a JSON file. Writes go
//! through a temp-file-plus-rename so readers of the file and of the
//! in-memory slot never observe a partially-updated report; the in-memory
//! slot is only swapped after the bytes are durable.

use crate::models::{LatestReport, TankHealth};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// File name of the persisted latest report.
const LATEST_REPORT_FILE: &str = "latest_analysis.json";

/// File name of the current frame slot.
const CURRENT_FRAME_FILE: &str = "current.jpg";

/// Durable store for the latest report and the frame archive location.
pub struct ReportStore {
    slot: RwLock<Option<LatestReport>>,
    report_path: PathBuf,
    image_dir: PathBuf,
}

impl ReportStore {
    /// Creates a store rooted at a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the image directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let image_dir = data_dir.join("images");
        fs::create_dir_all(&image_dir).map_err(|e| Error::OperationFailed {
            operation: "create_image_dir".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            slot: RwLock::new(None),
            report_path: image_dir.join(LATEST_REPORT_FILE),
            image_dir,
        })
    }

    /// The frame archive directory (also holds the current slot).
    #[must_use]
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Path of the current frame slot.
    #[must_use]
    pub fn current_frame_path(&self) -> PathBuf {
        self.image_dir.join(CURRENT_FRAME_FILE)
    }

    /// Loads a previously persisted report into the slot, if one exists.
    ///
    /// A missing file is normal on first boot; an unreadable or malformed
    /// file is logged and ignored, leaving the slot empty.
    pub fn load(&self) -> bool {
        let contents = match fs::read_to_string(&self.report_path) {
            Ok(contents) => contents,
            Err(_) => return false,
        };

        match serde_json::from_str::<LatestReport>(&contents) {
            Ok(report) => {
                info!(
                    completed_at = report.completed_at,
                    plants = report.health.len(),
                    "loaded persisted report"
                );
                *self.write_slot() = Some(report);
                true
            }
            Err(e) => {
                warn!(path = %self.report_path.display(), error = %e,
                    "failed to load persisted report, starting empty");
                false
            }
        }
    }

    /// Returns a copy of the latest report, if any cycle has completed.
    #[must_use]
    pub fn latest(&self) -> Option<LatestReport> {
        self.read_slot().clone()
    }

    /// Atomically replaces the latest report.
    ///
    /// The report is made durable before the in-memory slot is swapped; on
    /// persistence failure the previous report stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    pub fn publish(&self, report: LatestReport) -> Result<()> {
        self.persist(&report)?;
        *self.write_slot() = Some(report);
        Ok(())
    }

    /// Folds a tank verdict into the current report.
    ///
    /// # Errors
    ///
    /// Returns an error if no report is present or persistence fails.
    pub fn attach_tank(&self, tank: TankHealth) -> Result<()> {
        let updated = {
            let slot = self.read_slot();
            let Some(current) = slot.as_ref() else {
                return Err(Error::OperationFailed {
                    operation: "attach_tank".to_string(),
                    cause: "no report to attach to".to_string(),
                });
            };
            let mut updated = current.clone();
            updated.tank = Some(tank);
            updated
        };

        self.publish(updated)
    }

    /// Reads the current frame bytes, if a capture has happened.
    #[must_use]
    pub fn current_frame_bytes(&self) -> Option<Vec<u8>> {
        fs::read(self.current_frame_path()).ok()
    }

    /// Writes the report to disk via temp file + rename.
    fn persist(&self, report: &LatestReport) -> Result<()> {
        let json =
            serde_json::to_string_pretty(report).map_err(|e| Error::OperationFailed {
                operation: "serialize_report".to_string(),
                cause: e.to_string(),
            })?;

        let tmp_path = self.report_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| Error::OperationFailed {
            operation: "write_report".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp_path, &self.report_path).map_err(|e| Error::OperationFailed {
            operation: "rename_report".to_string(),
            cause: e.to_string(),
        })
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Option<LatestReport>> {
        self.slot.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<LatestReport>> {
        self.slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
