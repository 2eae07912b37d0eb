//! Pipeline orchestrator integration tests.
//!
//! Exercises full cycles against stubbed camera, inference, and telemetry
//! backends, focusing on:
//! - End-to-end report and event production
//! - Per-stage failure isolation (previous report stays authoritative)
//! - Graceful degradation without telemetry or fusion
//! - Idempotent re-runs and the serialized execution lane
//! - Archive retention across captures

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use image::RgbImage;
use plantdoc::camera::{CameraDevice, CameraSettings, CaptureError, CaptureService, FrameRetention};
use plantdoc::models::{
    HealthReport, PlantObservation, PlantType, Severity, TankEvent, TankHealth, TelemetrySummary,
};
use plantdoc::observability::EventBus;
use plantdoc::pipeline::{CycleStage, Orchestrator, TriggerResult};
use plantdoc::store::ReportStore;
use plantdoc::telemetry::{MetricsSource, TelemetryError, TelemetryWindowConfig, WindowFetcher};
use plantdoc::vision::{DiagnosisError, VisionProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use tempfile::TempDir;

// ============================================================================
// Stub Backends
// ============================================================================

/// A camera producing a fixed gradient frame (non-zero pixel variance).
struct StubCamera;

fn gradient_frame() -> RgbImage {
    RgbImage::from_fn(16, 16, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
    })
}

impl CameraDevice for StubCamera {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn configure(&mut self, _settings: &CameraSettings) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        Ok(gradient_frame())
    }
}

/// A camera that parks on a gate inside `read_frame`, so a test can hold a
/// cycle in flight deterministically.
struct GatedCamera {
    started_tx: mpsc::Sender<()>,
    release_rx: Mutex<mpsc::Receiver<()>>,
}

impl CameraDevice for GatedCamera {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn configure(&mut self, _settings: &CameraSettings) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        self.started_tx.send(()).ok();
        self.release_rx
            .lock()
            .unwrap()
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("gate released");
        Ok(gradient_frame())
    }
}

/// Scripted inference provider: a fixed warning sundew diagnosis plus a
/// warning tank verdict, with switchable failure modes.
#[derive(Default)]
struct StubVision {
    diagnose_parse_error: AtomicBool,
    fuse_fails: AtomicBool,
}

impl StubVision {
    fn observation() -> PlantObservation {
        PlantObservation {
            status: Severity::Warning,
            plant_type: PlantType::Sundew,
            plant_id: 1,
            diagnosis: "leaf tips browning".to_string(),
            position: "top left".to_string(),
        }
    }
}

impl VisionProvider for StubVision {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn diagnose(&self, _image_jpeg: &[u8]) -> Result<HealthReport, DiagnosisError> {
        if self.diagnose_parse_error.load(Ordering::SeqCst) {
            return Err(DiagnosisError::ParseError {
                cause: "missing field plant_diagnosis".to_string(),
            });
        }
        Ok(HealthReport {
            observations: vec![Self::observation()],
            source_frame_timestamp: 0,
        })
    }

    fn assess_tank(
        &self,
        _image_jpeg: &[u8],
        telemetry: &TelemetrySummary,
    ) -> Result<TankHealth, DiagnosisError> {
        if self.fuse_fails.load(Ordering::SeqCst) {
            return Err(DiagnosisError::ServiceUnavailable {
                cause: "stubbed outage".to_string(),
            });
        }
        Ok(TankHealth {
            status: Severity::Warning,
            temperature_analysis: format!("avg {:.1}C", telemetry.temperature.stats.avg),
            humidity_analysis: format!("avg {:.1}%", telemetry.humidity.stats.avg),
            combined_diagnosis: "mild heat stress".to_string(),
            recommendations: "increase misting".to_string(),
        })
    }
}

/// Fixed telemetry: temperature avg 24.0, humidity avg 92.0, or absent.
struct StubMetrics {
    available: bool,
}

impl StubMetrics {
    fn value_for(query: &str, aggregate: &str) -> f64 {
        let temperature = query.contains("temperature_celsius");
        match aggregate {
            "min" => {
                if temperature {
                    21.5
                } else {
                    88.0
                }
            }
            "max" => {
                if temperature {
                    26.2
                } else {
                    95.0
                }
            }
            _ => {
                if temperature {
                    24.0
                } else {
                    92.0
                }
            }
        }
    }
}

impl MetricsSource for StubMetrics {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn instant(&self, query: &str) -> Result<f64, TelemetryError> {
        if !self.available {
            return Err(TelemetryError::NoData);
        }
        Ok(if query.contains("temperature") {
            23.8
        } else {
            91.5
        })
    }

    fn range(
        &self,
        query: &str,
        _start: u64,
        _end: u64,
        _step_secs: u64,
    ) -> Result<Vec<f64>, TelemetryError> {
        if !self.available {
            return Err(TelemetryError::NoData);
        }
        if query.starts_with("rate(") {
            return Ok(vec![0.01; 12]);
        }
        let aggregate = query.split('_').next().unwrap_or_default();
        Ok(vec![Self::value_for(query, aggregate)])
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    orchestrator: Orchestrator,
    vision: Arc<StubVision>,
    store: Arc<ReportStore>,
    _temp_dir: TempDir,
}

fn harness_with(device: Box<dyn CameraDevice>, telemetry_available: bool) -> Harness {
    let temp_dir = TempDir::new().expect("tempdir");
    let store = Arc::new(ReportStore::new(temp_dir.path()).expect("store"));

    let capture = CaptureService::new(device, store.image_dir())
        .with_warmup_frames(0)
        .with_burst_size(1)
        .with_enhancement(false)
        .with_retention(FrameRetention::new(5));

    let vision = Arc::new(StubVision::default());
    let fetcher = WindowFetcher::new(
        Arc::new(StubMetrics {
            available: telemetry_available,
        }),
        TelemetryWindowConfig::default(),
    );

    let orchestrator = Orchestrator::new(
        capture,
        Arc::clone(&vision) as Arc<dyn VisionProvider>,
        fetcher,
        Arc::clone(&store),
    )
    .with_event_bus(EventBus::new(64));

    Harness {
        orchestrator,
        vision,
        store,
        _temp_dir: temp_dir,
    }
}

fn harness(telemetry_available: bool) -> Harness {
    harness_with(Box::new(StubCamera), telemetry_available)
}

fn drain_events(receiver: &mut tokio::sync::broadcast::Receiver<TankEvent>) -> Vec<TankEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// End-to-End Scenario
// ============================================================================

#[test]
fn test_end_to_end_cycle_produces_fused_report() {
    let h = harness(true);
    let mut receiver = h.orchestrator.events().subscribe();

    let outcome = h.orchestrator.run_cycle().expect("cycle succeeds");
    assert_eq!(outcome.plants, 1);
    assert!(outcome.fused);

    let report = h.store.latest().expect("report present");
    assert_eq!(report.health.len(), 1);
    let obs = &report.health.observations[0];
    assert_eq!(obs.status, Severity::Warning);
    assert_eq!(obs.plant_type, PlantType::Sundew);
    assert_eq!(obs.diagnosis, "leaf tips browning");

    let tank = report.tank.expect("tank verdict present");
    assert_eq!(tank.status, Severity::Warning);

    // Exactly one event exported at warning severity: the plant finding.
    let events = drain_events(&mut receiver);
    let warnings = events
        .iter()
        .filter(|e| e.severity() == Severity::Warning)
        .count();
    assert_eq!(warnings, 1);
    assert!(
        events
            .iter()
            .any(|e| e.event_type() == "plant.diagnosed" && e.severity() == Severity::Warning)
    );
    assert!(events.iter().any(|e| e.event_type() == "cycle.completed"));
}

#[test]
fn test_report_matches_source_frame() {
    let h = harness(true);
    h.orchestrator.run_cycle().expect("cycle succeeds");

    let report = h.store.latest().expect("report present");
    assert_eq!(
        report.frame.captured_at,
        report.health.source_frame_timestamp
    );
}

#[test]
fn test_repeated_triggers_are_idempotent() {
    let h = harness(true);

    let first = h.orchestrator.run_cycle().expect("first cycle");
    let second = h.orchestrator.run_cycle().expect("second cycle");

    assert_eq!(first.plants, second.plants);
    assert_eq!(first.fused, second.fused);

    let report = h.store.latest().expect("report present");
    assert_eq!(report.health.len(), first.plants);
    assert_eq!(
        report.tank.expect("tank").status,
        Severity::Warning
    );
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn test_telemetry_absent_degrades_to_partial_report() {
    let h = harness(false);

    let outcome = h.orchestrator.run_cycle().expect("cycle still succeeds");
    assert!(!outcome.fused);

    // Reading afterwards never raises; it returns the partial report.
    let report = h.store.latest().expect("report present");
    assert_eq!(report.health.len(), 1);
    assert!(report.tank.is_none());
}

#[test]
fn test_fusion_failure_degrades_to_partial_report() {
    let h = harness(true);
    h.vision.fuse_fails.store(true, Ordering::SeqCst);

    let outcome = h.orchestrator.run_cycle().expect("cycle still succeeds");
    assert!(!outcome.fused);

    let report = h.store.latest().expect("report present");
    assert!(report.tank.is_none());
}

#[test]
fn test_parse_failure_leaves_previous_report_untouched() {
    let h = harness(true);

    h.orchestrator.run_cycle().expect("first cycle");
    let before = h.store.latest().expect("report present");

    h.vision.diagnose_parse_error.store(true, Ordering::SeqCst);
    let failure = h
        .orchestrator
        .run_cycle()
        .expect_err("diagnosis must fail");
    assert_eq!(failure.stage, CycleStage::Diagnosis);

    let after = h.store.latest().expect("previous report still served");
    assert_eq!(after, before);
}

#[test]
fn test_first_cycle_parse_failure_leaves_store_empty() {
    let h = harness(true);
    h.vision.diagnose_parse_error.store(true, Ordering::SeqCst);

    let failure = h
        .orchestrator
        .run_cycle()
        .expect_err("diagnosis must fail");
    assert_eq!(failure.stage, CycleStage::Diagnosis);
    assert!(h.store.latest().is_none());
}

// ============================================================================
// Execution Lane
// ============================================================================

#[test]
fn test_manual_trigger_rejected_while_cycle_in_flight() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let h = harness_with(
        Box::new(GatedCamera {
            started_tx,
            release_rx: Mutex::new(release_rx),
        }),
        true,
    );

    let orchestrator = Arc::new(h.orchestrator);
    let background = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || orchestrator.run_cycle())
    };

    // The background cycle is parked inside the capture stage.
    started_rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("cycle started");

    assert!(matches!(orchestrator.try_run_cycle(), TriggerResult::Busy));

    release_tx.send(()).expect("release gate");
    let outcome = background.join().expect("join");
    assert!(outcome.is_ok());
}

// ============================================================================
// Retention
// ============================================================================

#[test]
fn test_sixth_capture_enforces_retention_limit() {
    let h = harness(true);

    // Five archived frames already on disk, oldest stamps first.
    for i in 1..=5 {
        std::fs::write(
            h.store.image_dir().join(format!("plant_20200101_00000{i}.jpg")),
            b"jpeg",
        )
        .expect("seed frame");
    }

    // Frame #6 arrives via a real capture.
    h.orchestrator.run_cycle().expect("cycle succeeds");

    let mut archived: Vec<String> = std::fs::read_dir(h.store.image_dir())
        .expect("read dir")
        .filter_map(|e| e.ok()?.file_name().into_string().ok())
        .filter(|n| n.starts_with("plant_") && n.ends_with(".jpg"))
        .collect();
    archived.sort();

    assert_eq!(archived.len(), 5);
    // The oldest seeded frame was the one deleted.
    assert!(!archived.contains(&"plant_20200101_000001.jpg".to_string()));
}
