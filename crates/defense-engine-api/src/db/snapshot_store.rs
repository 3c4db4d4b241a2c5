// File: src/db/snapshot_store.rs
//
// PostgreSQL snapshot store with save-time retention pruning

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::snapshot::{Snapshot, SnapshotStore};

use crate::db::schema::aggregate_snapshots;
use crate::db::session::DbPool;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = aggregate_snapshots)]
struct SnapshotRecord {
    snapshot_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    aggregate_version: i64,
    codec: String,
    compression: String,
    state: Vec<u8>,
    created_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = aggregate_snapshots)]
struct NewSnapshotRecord {
    snapshot_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    aggregate_version: i64,
    codec: String,
    compression: String,
    state: Vec<u8>,
    created_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

fn record_to_snapshot(record: SnapshotRecord) -> EngineResult<Snapshot> {
    let metadata = serde_json::from_value(record.metadata).map_err(|e| EngineError::Snapshot {
        message: format!("failed to deserialize snapshot metadata: {}", e),
    })?;
    Ok(Snapshot {
        snapshot_id: record.snapshot_id,
        aggregate_id: record.aggregate_id,
        aggregate_type: record.aggregate_type,
        aggregate_version: record.aggregate_version,
        codec: record.codec,
        compression: record.compression,
        state: record.state,
        created_at: record.created_at,
        metadata,
    })
}

/// Durable snapshot store backed by PostgreSQL.
pub struct PostgresSnapshotStore {
    pool: DbPool,
    max_per_aggregate: usize,
}

impl PostgresSnapshotStore {
    pub fn new(pool: DbPool, max_per_aggregate: usize) -> Self {
        Self {
            pool,
            max_per_aggregate: max_per_aggregate.max(1),
        }
    }

    fn connection(
        &self,
    ) -> EngineResult<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>>
    {
        self.pool
            .get()
            .map_err(|e| EngineError::storage(format!("failed to get database connection: {}", e)))
    }
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn save(&self, ctx: &RequestContext, snapshot: Snapshot) -> EngineResult<()> {
        ctx.ensure_active()?;
        let record = NewSnapshotRecord {
            snapshot_id: snapshot.snapshot_id,
            aggregate_id: snapshot.aggregate_id,
            aggregate_type: snapshot.aggregate_type.clone(),
            aggregate_version: snapshot.aggregate_version,
            codec: snapshot.codec.clone(),
            compression: snapshot.compression.clone(),
            state: snapshot.state.clone(),
            created_at: snapshot.created_at,
            metadata: serde_json::to_value(&snapshot.metadata)?,
        };

        let mut conn = self.connection()?;

        diesel::insert_into(aggregate_snapshots::table)
            .values(&record)
            .on_conflict((
                aggregate_snapshots::aggregate_id,
                aggregate_snapshots::aggregate_version,
            ))
            .do_update()
            .set((
                aggregate_snapshots::codec.eq(&record.codec),
                aggregate_snapshots::compression.eq(&record.compression),
                aggregate_snapshots::state.eq(&record.state),
                aggregate_snapshots::created_at.eq(&record.created_at),
                aggregate_snapshots::metadata.eq(&record.metadata),
            ))
            .execute(&mut conn)
            .map_err(|e| EngineError::storage(format!("failed to save snapshot: {}", e)))?;

        // Retention: keep only the newest N per aggregate.
        diesel::sql_query(
            r#"
            DELETE FROM aggregate_snapshots
            WHERE aggregate_id = $1
              AND aggregate_version NOT IN (
                SELECT aggregate_version FROM aggregate_snapshots
                WHERE aggregate_id = $1
                ORDER BY aggregate_version DESC
                LIMIT $2
            )
            "#,
        )
        .bind::<diesel::sql_types::Uuid, _>(snapshot.aggregate_id)
        .bind::<diesel::sql_types::BigInt, _>(self.max_per_aggregate as i64)
        .execute(&mut conn)
        .map_err(|e| EngineError::storage(format!("failed to prune snapshots: {}", e)))?;

        Ok(())
    }

    async fn latest(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        max_version: Option<i64>,
    ) -> EngineResult<Option<Snapshot>> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;

        let mut query = aggregate_snapshots::table
            .filter(aggregate_snapshots::aggregate_id.eq(aggregate_id))
            .into_boxed();
        if let Some(max) = max_version {
            query = query.filter(aggregate_snapshots::aggregate_version.le(max));
        }

        let record: Option<SnapshotRecord> = query
            .order(aggregate_snapshots::aggregate_version.desc())
            .first(&mut conn)
            .optional()
            .map_err(|e| EngineError::storage(format!("failed to load snapshot: {}", e)))?;

        record.map(record_to_snapshot).transpose()
    }

    async fn by_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<Option<Snapshot>> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let record: Option<SnapshotRecord> = aggregate_snapshots::table
            .filter(aggregate_snapshots::aggregate_id.eq(aggregate_id))
            .filter(aggregate_snapshots::aggregate_version.eq(version))
            .first(&mut conn)
            .optional()
            .map_err(|e| EngineError::storage(format!("failed to load snapshot: {}", e)))?;
        record.map(record_to_snapshot).transpose()
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let deleted = diesel::delete(
            aggregate_snapshots::table
                .filter(aggregate_snapshots::aggregate_id.eq(aggregate_id))
                .filter(aggregate_snapshots::aggregate_version.eq(version)),
        )
        .execute(&mut conn)
        .map_err(|e| EngineError::storage(format!("failed to delete snapshot: {}", e)))?;
        Ok(deleted > 0)
    }

    async fn prune_keeping_last(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        keep: usize,
    ) -> EngineResult<usize> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let deleted = diesel::sql_query(
            r#"
            DELETE FROM aggregate_snapshots
            WHERE aggregate_id = $1
              AND aggregate_version NOT IN (
                SELECT aggregate_version FROM aggregate_snapshots
                WHERE aggregate_id = $1
                ORDER BY aggregate_version DESC
                LIMIT $2
            )
            "#,
        )
        .bind::<diesel::sql_types::Uuid, _>(aggregate_id)
        .bind::<diesel::sql_types::BigInt, _>(keep as i64)
        .execute(&mut conn)
        .map_err(|e| EngineError::storage(format!("failed to prune snapshots: {}", e)))?;
        Ok(deleted)
    }
}
