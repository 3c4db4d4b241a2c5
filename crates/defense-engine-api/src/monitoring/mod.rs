//! Prometheus metrics and the telemetry bridge.

pub mod logging;
pub mod metrics;

use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

use defense_engine_core::telemetry::{TelemetryEvent, TelemetrySink};

/// GET /metrics in Prometheus text format.
pub async fn handle_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let families = metrics::REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("encode error: {}", e));
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// Pump runtime telemetry events into the Prometheus counters.
pub fn spawn_telemetry_exporter(telemetry: &TelemetrySink) -> tokio::task::JoinHandle<()> {
    let mut receiver = telemetry.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(TelemetryEvent::SnapshotFailed { aggregate_type, .. }) => {
                    metrics::SNAPSHOT_FAILURES_TOTAL
                        .with_label_values(&[&aggregate_type])
                        .inc();
                }
                Ok(TelemetryEvent::SubscriptionDropped { subscription, .. }) => {
                    metrics::SUBSCRIPTIONS_DROPPED_TOTAL
                        .with_label_values(&[&subscription])
                        .inc();
                }
                Ok(TelemetryEvent::ProjectionFailed { projection, .. }) => {
                    metrics::PROJECTION_ERRORS_TOTAL
                        .with_label_values(&[&projection])
                        .inc();
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "telemetry exporter lagged behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
