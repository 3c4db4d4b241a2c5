// File: src/telemetry.rs
//
// In-process telemetry channel for failures that must be observable without
// reaching the command caller (snapshot errors, slow-subscriber drops,
// frozen projections)

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Telemetry events emitted by the runtime.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Snapshot encode or store failed during a save. The save succeeded.
    SnapshotFailed {
        aggregate_id: Uuid,
        aggregate_type: String,
        aggregate_version: i64,
        error: String,
    },
    /// A bus subscription was dropped to protect publishers.
    SubscriptionDropped {
        subscription: String,
        reason: String,
    },
    /// A projection callback failed; its cursor is frozen.
    ProjectionFailed {
        projection: String,
        event_type: String,
        error: String,
    },
}

/// Fan-out sink for telemetry events.
///
/// Emission never blocks and never fails: with no subscribers the event is
/// only logged.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl TelemetrySink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        tracing::warn!(telemetry = ?event, "runtime telemetry event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::new(256)
    }
}
