/*!
# Prometheus Metrics

Counters and histograms for the transport layer and the failure telemetry
surfaced by the engine (snapshot errors, dropped subscriptions, frozen
projections).
*/

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Registry backing the /metrics endpoint.
    pub static ref REGISTRY: Registry = Registry::new();

    /// RPC invocations by dotted method name and outcome kind.
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_requests_total", "Total RPC invocations")
            .namespace("defense_engine")
            .subsystem("rpc"),
        &["method", "outcome"]
    ).unwrap();

    /// RPC invocation latency in seconds.
    pub static ref RPC_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rpc_request_duration_seconds", "RPC invocation latency")
            .namespace("defense_engine")
            .subsystem("rpc")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method"]
    ).unwrap();

    /// Live SSE connections.
    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "defense_engine_sse_connections_active",
        "Currently connected SSE clients"
    ).unwrap();

    /// Snapshot captures that failed (save unaffected), by aggregate type.
    pub static ref SNAPSHOT_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshot_failures_total", "Failed snapshot captures")
            .namespace("defense_engine")
            .subsystem("snapshots"),
        &["aggregate_type"]
    ).unwrap();

    /// Bus subscriptions shed to protect publishers.
    pub static ref SUBSCRIPTIONS_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("subscriptions_dropped_total", "Bus subscriptions dropped as slow")
            .namespace("defense_engine")
            .subsystem("bus"),
        &["subscription"]
    ).unwrap();

    /// Projection callbacks that failed and froze their cursor.
    pub static ref PROJECTION_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("projection_errors_total", "Projection callback failures")
            .namespace("defense_engine")
            .subsystem("projections"),
        &["projection"]
    ).unwrap();
}

/// Register every metric with the registry. Safe to call once at startup;
/// duplicate registration errors are logged and ignored so tests can build
/// multiple apps in one process.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RPC_REQUESTS_TOTAL.clone()),
        Box::new(RPC_REQUEST_DURATION.clone()),
        Box::new(SSE_CONNECTIONS_ACTIVE.clone()),
        Box::new(SNAPSHOT_FAILURES_TOTAL.clone()),
        Box::new(SUBSCRIPTIONS_DROPPED_TOTAL.clone()),
        Box::new(PROJECTION_ERRORS_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::debug!("metric already registered: {}", e);
        }
    }
}

/// Record one RPC invocation.
pub fn observe_rpc(method: &str, outcome: &str, elapsed: Duration) {
    RPC_REQUESTS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    RPC_REQUEST_DURATION
        .with_label_values(&[method])
        .observe(elapsed.as_secs_f64());
}
