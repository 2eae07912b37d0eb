//! Pipeline orchestration.
//!
//! Runs the capture → diagnose → fetch telemetry → fuse → persist sequence
//! with per-stage failure isolation:
//!
//! - Capture or diagnosis failure ends the cycle; the previous latest
//!   report stays authoritative.
//! - A successful diagnosis is persisted immediately, so partial success
//!   is visible before telemetry is even attempted.
//! - Telemetry absence and fusion failure degrade the cycle to a report
//!   without a tank verdict; the cycle still counts as successful.
//!
//! At most one cycle executes at a time: the capture service mutex is the
//! single execution lane, covering the imaging device and the latest-report
//! writes. Scheduled ticks queue behind a running cycle; manual triggers
//! are rejected while one is in flight. There is no in-cycle retry — the
//! next trigger is the retry mechanism.

use crate::camera::CaptureService;
use crate::models::{EventMeta, LatestReport, TankEvent, TelemetrySummary};
use crate::observability::{EventBus, global_event_bus};
use crate::store::ReportStore;
use crate::telemetry::WindowFetcher;
use crate::vision::VisionProvider;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Event source tag for pipeline events.
const EVENT_SOURCE: &str = "pipeline";

/// The stage a cycle failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    /// Frame capture.
    Capture,
    /// Vision diagnosis.
    Diagnosis,
    /// Report persistence.
    Persist,
}

impl CycleStage {
    /// Returns the stage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Diagnosis => "diagnosis",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cycle that ended in a stage failure.
#[derive(Debug, Error)]
#[error("cycle failed at {stage}: {reason}")]
pub struct CycleFailure {
    /// The failed stage.
    pub stage: CycleStage,
    /// The stage's failure description.
    pub reason: String,
}

/// Summary of a successful cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
    /// Number of plants diagnosed.
    pub plants: usize,
    /// Whether a tank verdict was fused into the report.
    pub fused: bool,
    /// Capture timestamp of the frame the report derives from.
    pub frame_timestamp: u64,
    /// Wall-clock duration of the cycle in milliseconds.
    pub duration_ms: u64,
}

/// Result of a manual trigger request.
#[derive(Debug)]
pub enum TriggerResult {
    /// The cycle ran to completion.
    Completed(CycleOutcome),
    /// The cycle ran and failed at a stage.
    Failed(CycleFailure),
    /// A cycle was already in flight; the trigger was rejected.
    Busy,
}

/// The scheduler-and-manually triggered pipeline orchestrator.
///
/// Exclusively owns the per-cycle lifecycle of frame, health report,
/// telemetry summary, and tank verdict; the report store owns durable
/// persistence.
pub struct Orchestrator {
    capture: Mutex<CaptureService>,
    vision: Arc<dyn VisionProvider>,
    fetcher: WindowFetcher,
    store: Arc<ReportStore>,
    events: EventBus,
}

impl Orchestrator {
    /// Creates an orchestrator wired to the global event bus.
    #[must_use]
    pub fn new(
        capture: CaptureService,
        vision: Arc<dyn VisionProvider>,
        fetcher: WindowFetcher,
        store: Arc<ReportStore>,
    ) -> Self {
        Self {
            capture: Mutex::new(capture),
            vision,
            fetcher,
            store,
            events: global_event_bus().clone(),
        }
    }

    /// Replaces the event bus (tests subscribe to their own).
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The event bus this orchestrator emits on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The report store backing this orchestrator.
    #[must_use]
    pub fn store(&self) -> &Arc<ReportStore> {
        &self.store
    }

    /// Runs one cycle, queuing behind any cycle already in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`CycleFailure`] naming the failed stage. The previous
    /// latest report is untouched by capture and diagnosis failures.
    pub fn run_cycle(&self) -> Result<CycleOutcome, CycleFailure> {
        let mut capture = self
            .capture
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.run_locked(&mut capture)
    }

    /// Runs one cycle unless one is already in flight.
    ///
    /// This is the manual-trigger path: a trigger arriving during an
    /// active cycle is rejected rather than queued, so a burst of requests
    /// cannot pile up captures against the device.
    pub fn try_run_cycle(&self) -> TriggerResult {
        match self.capture.try_lock() {
            Ok(mut capture) => match self.run_locked(&mut capture) {
                Ok(outcome) => TriggerResult::Completed(outcome),
                Err(failure) => TriggerResult::Failed(failure),
            },
            Err(TryLockError::WouldBlock) => TriggerResult::Busy,
            Err(TryLockError::Poisoned(poisoned)) => {
                let mut capture: MutexGuard<'_, CaptureService> = poisoned.into_inner();
                match self.run_locked(&mut capture) {
                    Ok(outcome) => TriggerResult::Completed(outcome),
                    Err(failure) => TriggerResult::Failed(failure),
                }
            }
        }
    }

    /// Fetches the telemetry window ending now (serve-surface test path).
    #[must_use]
    pub fn fetch_telemetry(&self) -> Option<TelemetrySummary> {
        self.fetcher.fetch(crate::current_timestamp())
    }

    /// The serialized cycle body. The caller holds the execution lane.
    fn run_locked(&self, capture: &mut CaptureService) -> Result<CycleOutcome, CycleFailure> {
        let started = Instant::now();
        info!("starting plant health check cycle");

        // Capturing
        let frame = capture
            .capture()
            .map_err(|e| self.fail(CycleStage::Capture, &e.to_string()))?;

        let frame_bytes = std::fs::read(&frame.path)
            .map_err(|e| self.fail(CycleStage::Capture, &format!("frame unreadable: {e}")))?;

        // Diagnosing
        let mut health = self
            .vision
            .diagnose(&frame_bytes)
            .map_err(|e| self.fail(CycleStage::Diagnosis, &e.to_string()))?;
        health.source_frame_timestamp = frame.captured_at;

        for obs in &health.observations {
            self.events.emit(TankEvent::PlantDiagnosed {
                meta: EventMeta::new(EVENT_SOURCE),
                severity: obs.status,
                plant_type: obs.plant_type,
                plant_id: obs.plant_id,
                diagnosis: obs.diagnosis.clone(),
                position: obs.position.clone(),
            });
        }

        // Persisting (partial success visible before telemetry)
        let plants = health.len();
        let completed_at = crate::current_timestamp();
        self.store
            .publish(LatestReport {
                frame: frame.clone(),
                health,
                tank: None,
                completed_at,
            })
            .map_err(|e| self.fail(CycleStage::Persist, &e.to_string()))?;

        // FetchingTelemetry -> Fusing, both best-effort enrichment
        let fused = self.fuse(&frame_bytes, completed_at);

        let duration_ms = duration_to_millis(started.elapsed());
        metrics::counter!("plantdoc_cycles_total", "status" => "success").increment(1);
        metrics::histogram!("plantdoc_cycle_duration_ms").record(millis_to_f64(duration_ms));

        self.events.emit(TankEvent::CycleCompleted {
            meta: EventMeta::new(EVENT_SOURCE),
            plants,
            fused,
            duration_ms,
        });
        info!(plants, fused, duration_ms, "cycle completed");

        Ok(CycleOutcome {
            plants,
            fused,
            frame_timestamp: frame.captured_at,
            duration_ms,
        })
    }

    /// Telemetry fetch plus tank fusion. Returns whether a tank verdict
    /// made it into the report; every miss degrades, nothing here fails
    /// the cycle.
    fn fuse(&self, frame_bytes: &[u8], now: u64) -> bool {
        let Some(summary) = self.fetcher.fetch(now) else {
            info!("telemetry window absent, report stands without tank verdict");
            return false;
        };

        let tank = match self.vision.assess_tank(frame_bytes, &summary) {
            Ok(tank) => tank,
            Err(e) => {
                warn!(reason = e.reason(), error = %e, "tank fusion failed, report stands alone");
                return false;
            }
        };

        self.events.emit(TankEvent::TankAssessed {
            meta: EventMeta::new(EVENT_SOURCE),
            severity: tank.status,
            combined_diagnosis: tank.combined_diagnosis.clone(),
            recommendations: tank.recommendations.clone(),
        });

        match self.store.attach_tank(tank) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist tank verdict, report stands alone");
                false
            }
        }
    }

    /// Records a stage failure: logs it, emits the event, counts it.
    fn fail(&self, stage: CycleStage, reason: &str) -> CycleFailure {
        error!(stage = stage.as_str(), reason, "cycle failed");
        metrics::counter!("plantdoc_cycles_total", "status" => "failed", "stage" => stage.as_str())
            .increment(1);
        self.events.emit(TankEvent::CycleFailed {
            meta: EventMeta::new(EVENT_SOURCE),
            stage: stage.as_str(),
            reason: reason.to_string(),
        });
        CycleFailure {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Wires an orchestrator from configuration with the production backends:
/// HTTP camera server, OpenAI-compatible vision client, Prometheus.
///
/// # Errors
///
/// Returns an error if the data directory cannot be prepared.
pub fn build(config: &crate::config::PlantdocConfig) -> crate::Result<Arc<Orchestrator>> {
    use crate::camera::{FrameRetention, HttpCameraDevice};
    use crate::telemetry::{PrometheusClient, TelemetryWindowConfig};
    use crate::vision::{OpenAiVisionClient, VisionHttpConfig};

    let store = Arc::new(ReportStore::new(&config.data_dir)?);
    store.load();

    let device = HttpCameraDevice::with_timeouts(
        &config.camera.endpoint,
        config.camera.timeout_ms,
        config.camera.connect_timeout_ms,
    );
    let capture = CaptureService::new(Box::new(device), store.image_dir())
        .with_settings(config.camera.settings)
        .with_warmup_frames(config.capture.warmup_frames)
        .with_burst_size(config.capture.burst_size)
        .with_enhancement(config.capture.enhance)
        .with_retention(FrameRetention::new(config.capture.retention_limit));

    let mut vision = OpenAiVisionClient::new()
        .with_model(&config.inference.model)
        .with_http_config(VisionHttpConfig {
            timeout_ms: config.inference.timeout_ms,
            connect_timeout_ms: config.inference.connect_timeout_ms,
        });
    if let Some(ref api_key) = config.inference.api_key {
        vision = vision.with_api_key(api_key);
    }
    if let Some(ref base_url) = config.inference.base_url {
        vision = vision.with_endpoint(base_url);
    }

    let metrics_source = Arc::new(PrometheusClient::with_timeouts(
        &config.telemetry.base_url,
        config.telemetry.timeout_ms,
        config.telemetry.connect_timeout_ms,
    ));
    let fetcher = WindowFetcher::new(
        metrics_source,
        TelemetryWindowConfig {
            lookback_secs: config.telemetry.lookback_hours * 3600,
            step_secs: config.telemetry.step_secs,
            rate_samples: config.telemetry.rate_samples,
        },
    );

    Ok(Arc::new(Orchestrator::new(
        capture,
        Arc::new(vision),
        fetcher,
        store,
    )))
}

/// Safely converts a duration to milliseconds, capping at `u64::MAX`.
fn duration_to_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts milliseconds to f64 for the metrics facade.
#[allow(clippy::cast_precision_loss)]
fn millis_to_f64(value: u64) -> f64 {
    value as f64
}
