//! Tokio broadcast event bus for the analytics export.

use crate::models::{Severity, TankEvent};
use std::sync::OnceLock;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Central event bus for broadcasting pipeline events.
///
/// Delivery is fire-and-forget: publishing never blocks the pipeline, and
/// subscribers that lag simply miss events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TankEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event: logs it at its mapped severity, records it in the
    /// metrics facade, and broadcasts it to subscribers (best effort).
    ///
    /// This is the single place the severity vocabulary is mapped onto log
    /// levels.
    pub fn emit(&self, event: TankEvent) {
        match event.severity() {
            Severity::Info => info!(
                event_type = event.event_type(),
                event_id = %event.meta().event_id,
                "{event:?}"
            ),
            Severity::Warning => warn!(
                event_type = event.event_type(),
                event_id = %event.meta().event_id,
                "{event:?}"
            ),
            Severity::Critical => error!(
                event_type = event.event_type(),
                event_id = %event.meta().event_id,
                "{event:?}"
            ),
        }

        metrics::counter!(
            "plantdoc_events_total",
            "type" => event.event_type(),
            "severity" => event.severity().as_str()
        )
        .increment(1);

        if self.sender.send(event).is_err() {
            // No subscribers; the log line above already exported it.
            metrics::counter!("plantdoc_events_dropped_total").increment(1);
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TankEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

static GLOBAL_EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Returns the global event bus, initializing it on first use.
#[must_use]
pub fn global_event_bus() -> &'static EventBus {
    GLOBAL_EVENT_BUS.get_or_init(EventBus::default)
}
