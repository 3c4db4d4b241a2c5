// File: src/db/session.rs
//
// Connection pooling and schema bootstrap for the PostgreSQL stores

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

use defense_engine_core::error::{EngineError, EngineResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build an r2d2 pool against the configured database.
pub fn init_pool(database_url: &str, pool_size: u32) -> EngineResult<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .map_err(|e| EngineError::storage(format!("failed to create connection pool: {}", e)))
}

/// Create the event and snapshot tables if they do not exist. Idempotent;
/// called once during bootstrap.
pub fn ensure_schema(pool: &DbPool) -> EngineResult<()> {
    let mut conn = pool
        .get()
        .map_err(|e| EngineError::storage(format!("failed to get connection: {}", e)))?;

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS game_events (
            event_id UUID PRIMARY KEY,
            aggregate_id UUID NOT NULL,
            aggregate_type VARCHAR NOT NULL,
            event_type VARCHAR NOT NULL,
            aggregate_version BIGINT NOT NULL,
            global_position BIGSERIAL NOT NULL,
            payload JSONB NOT NULL,
            metadata JSONB NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL,
            causation_id UUID,
            correlation_id UUID,
            UNIQUE(aggregate_id, aggregate_version)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_game_events_aggregate
            ON game_events(aggregate_id, aggregate_version)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_game_events_position
            ON game_events(global_position)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_game_events_type
            ON game_events(event_type, recorded_at DESC)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS aggregate_snapshots (
            snapshot_id UUID PRIMARY KEY,
            aggregate_id UUID NOT NULL,
            aggregate_type VARCHAR NOT NULL,
            aggregate_version BIGINT NOT NULL,
            codec VARCHAR NOT NULL,
            compression VARCHAR NOT NULL,
            state BYTEA NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            metadata JSONB NOT NULL,
            UNIQUE(aggregate_id, aggregate_version)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_aggregate_snapshots_lookup
            ON aggregate_snapshots(aggregate_id, aggregate_version DESC)
        "#,
    ];

    for statement in statements {
        diesel::sql_query(statement)
            .execute(&mut conn)
            .map_err(|e| EngineError::storage(format!("schema bootstrap failed: {}", e)))?;
    }
    Ok(())
}
