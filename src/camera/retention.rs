//! Frame archive retention policy.
//!
//! The archive keeps only the N most-recently-modified frames matching the
//! `plant_*.jpg` naming convention. Deletion is best-effort: a failure to
//! delete one old frame is logged and does not abort deletion of the
//! others, and never fails the capture that triggered it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Default number of archived frames to keep.
pub const DEFAULT_RETENTION_LIMIT: usize = 5;

/// Retention policy for the frame archive.
#[derive(Debug, Clone, Copy)]
pub struct FrameRetention {
    /// Number of most-recent frames to keep.
    pub limit: usize,
}

impl Default for FrameRetention {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RETENTION_LIMIT,
        }
    }
}

/// Result of one retention enforcement pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionResult {
    /// Number of archived frames seen.
    pub frames_seen: usize,
    /// Number of frames deleted.
    pub frames_deleted: usize,
    /// Number of deletions that failed.
    pub failures: usize,
}

impl RetentionResult {
    /// Returns a human-readable summary of the pass.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.frames_deleted == 0 && self.failures == 0 {
            format!("kept {} frames", self.frames_seen)
        } else {
            format!(
                "kept {}, deleted {}, {} failed",
                self.frames_seen - self.frames_deleted,
                self.frames_deleted,
                self.failures
            )
        }
    }
}

impl FrameRetention {
    /// Creates a retention policy with the given limit.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Enforces the policy on an archive directory.
    ///
    /// Never fails: an unreadable directory yields an empty result, and
    /// per-file deletion failures are counted and logged.
    pub fn enforce(&self, dir: &Path) -> RetentionResult {
        let mut result = RetentionResult::default();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "retention scan failed");
                return result;
            }
        };

        let mut frames: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                if !is_archived_frame(name) {
                    return None;
                }
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((path, modified))
            })
            .collect();

        result.frames_seen = frames.len();

        // Newest first; file names embed the capture stamp, so they break
        // mtime ties deterministically.
        frames.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        for (path, _) in frames.iter().skip(self.limit) {
            match fs::remove_file(path) {
                Ok(()) => {
                    result.frames_deleted += 1;
                    debug!(frame = %path.display(), "deleted old frame");
                }
                Err(e) => {
                    result.failures += 1;
                    warn!(frame = %path.display(), error = %e, "failed to delete old frame");
                }
            }
        }

        metrics::counter!("plantdoc_retention_deleted_total")
            .increment(u64::try_from(result.frames_deleted).unwrap_or(u64::MAX));

        result
    }
}

/// Whether a file name matches the archived-frame convention.
fn is_archived_frame(name: &str) -> bool {
    name.starts_with("plant_") && name.ends_with(".jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"jpeg").expect("write frame");
    }

    #[test]
    fn test_is_archived_frame() {
        assert!(is_archived_frame("plant_20250101_090000.jpg"));
        assert!(!is_archived_frame("current.jpg"));
        assert!(!is_archived_frame("plant_20250101_090000.png"));
        assert!(!is_archived_frame("latest_analysis.json"));
    }

    #[test]
    fn test_enforce_keeps_n_most_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 1..=6 {
            touch(dir.path(), &format!("plant_20250101_09000{i}.jpg"));
        }
        touch(dir.path(), "current.jpg");

        let result = FrameRetention::new(5).enforce(dir.path());
        assert_eq!(result.frames_seen, 6);
        assert_eq!(result.frames_deleted, 1);
        assert_eq!(result.failures, 0);

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok()?.file_name().into_string().ok())
            .filter(|n| is_archived_frame(n))
            .collect();
        remaining.sort();

        // The oldest (lowest stamp) frame is the one that went.
        assert_eq!(remaining.len(), 5);
        assert_eq!(remaining[0], "plant_20250101_090002.jpg");
        // The current slot is never touched.
        assert!(dir.path().join("current.jpg").exists());
    }

    #[test]
    fn test_enforce_under_limit_deletes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "plant_20250101_090001.jpg");

        let result = FrameRetention::default().enforce(dir.path());
        assert_eq!(result.frames_seen, 1);
        assert_eq!(result.frames_deleted, 0);
    }

    #[test]
    fn test_enforce_missing_dir_is_empty_result() {
        let result = FrameRetention::default().enforce(Path::new("/nonexistent/frames"));
        assert_eq!(result.frames_seen, 0);
        assert_eq!(result.frames_deleted, 0);
    }
}
