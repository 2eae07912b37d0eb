//! Cycle scheduling at fixed local times of day.

use crate::pipeline::Orchestrator;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Timelike};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs cycles at the configured local hours, forever.
///
/// Each tick queues behind any cycle already in flight (the execution lane
/// serializes them); a tick never preempts a running cycle.
pub async fn run(orchestrator: Arc<Orchestrator>, hours: Vec<u32>) {
    if hours.is_empty() {
        warn!("no schedule hours configured, scheduler idle");
        return;
    }

    loop {
        let now = Local::now();
        let next = next_fire(now, &hours);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next.format("%Y-%m-%d %H:%M"), "next scheduled health check");

        tokio::time::sleep(wait).await;

        let orchestrator = Arc::clone(&orchestrator);
        let result = tokio::task::spawn_blocking(move || orchestrator.run_cycle()).await;
        match result {
            Ok(Ok(outcome)) => {
                info!(plants = outcome.plants, fused = outcome.fused, "scheduled cycle completed");
            }
            Ok(Err(failure)) => {
                warn!(stage = failure.stage.as_str(), reason = %failure.reason,
                    "scheduled cycle failed");
            }
            Err(e) => warn!(error = %e, "scheduled cycle panicked"),
        }
    }
}

/// Returns the next fire time strictly after `now`.
fn next_fire(now: DateTime<Local>, hours: &[u32]) -> DateTime<Local> {
    let mut sorted: Vec<u32> = hours.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    // First configured hour later today, else the earliest hour tomorrow.
    for &hour in &sorted {
        if hour > now.hour() {
            if let Some(candidate) = at_hour(now, hour) {
                return candidate;
            }
        }
    }

    let tomorrow = now + ChronoDuration::days(1);
    sorted
        .first()
        .and_then(|&hour| at_hour(tomorrow, hour))
        .unwrap_or(tomorrow)
}

/// The given day at `hour:00:00` local time, when that time exists.
fn at_hour(day: DateTime<Local>, hour: u32) -> Option<DateTime<Local>> {
    let naive = day.date_naive().and_hms_opt(hour, 0, 0)?;
    Local.from_local_datetime(&naive).single()
}
