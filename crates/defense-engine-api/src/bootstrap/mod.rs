//! Runtime assembly from configuration: picks the store backend, wires the
//! metrics bridge, and returns a builder ready for domain registration.

use std::sync::Arc;

use defense_engine_core::config::{EngineConfig, StoreBackend};
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::runtime::EngineRuntimeBuilder;
use defense_engine_core::telemetry::TelemetrySink;

use crate::db::{init_pool, session, PostgresEventStore, PostgresSnapshotStore};
use crate::monitoring;

const DEFAULT_POOL_SIZE: u32 = 10;

/// Build a runtime builder with stores selected by `EVENT_STORE_BACKEND`.
///
/// The caller registers its domain (commands, queries, RPC handlers,
/// projections) on the returned builder, then calls `build().await`.
pub fn runtime_builder(config: EngineConfig) -> EngineResult<EngineRuntimeBuilder> {
    config.validate()?;
    monitoring::metrics::register_metrics();

    let telemetry = TelemetrySink::default();
    monitoring::spawn_telemetry_exporter(&telemetry);

    let mut builder =
        EngineRuntimeBuilder::new(config.clone()).with_telemetry(telemetry);

    if config.store_backend == StoreBackend::Postgres {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| EngineError::configuration("postgres backend requires DATABASE_URL"))?;
        let pool = init_pool(database_url, DEFAULT_POOL_SIZE)?;
        session::ensure_schema(&pool)?;

        builder = builder
            .with_event_store(Arc::new(PostgresEventStore::new(pool.clone())))
            .with_snapshot_store(Arc::new(PostgresSnapshotStore::new(
                pool,
                config.snapshot.max_per_aggregate,
            )));
        tracing::info!("event store backend: postgres");
    } else {
        tracing::info!("event store backend: memory");
    }

    Ok(builder)
}
