// File: src/db/event_store.rs
//
// PostgreSQL event store: transactional expected-version append with
// database-assigned global positions, batched streaming reads

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use futures_util::stream::StreamExt;
use uuid::Uuid;

use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::event::{
    EventEnvelope, EventMetadata, EventStore, EventStream, EXPECTED_VERSION_ANY,
};

use crate::db::schema::game_events;
use crate::db::session::DbPool;

const READ_BATCH_SIZE: i64 = 500;

#[derive(Debug, thiserror::Error)]
enum TxError {
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),
    #[error("version conflict: expected {expected}, stored {actual}")]
    Conflict { expected: i64, actual: i64 },
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = game_events)]
struct EventRecord {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    event_type: String,
    aggregate_version: i64,
    global_position: i64,
    payload: serde_json::Value,
    metadata: serde_json::Value,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    causation_id: Option<Uuid>,
    correlation_id: Option<Uuid>,
}

// Insert form omits global_position so the BIGSERIAL assigns it.
#[derive(Debug, Insertable)]
#[diesel(table_name = game_events)]
struct NewEventRecord {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    event_type: String,
    aggregate_version: i64,
    payload: serde_json::Value,
    metadata: serde_json::Value,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    causation_id: Option<Uuid>,
    correlation_id: Option<Uuid>,
}

fn record_to_envelope(record: EventRecord) -> EngineResult<EventEnvelope> {
    let metadata: EventMetadata =
        serde_json::from_value(record.metadata).map_err(|e| EngineError::Serialization {
            message: format!("failed to deserialize event metadata: {}", e),
        })?;

    Ok(EventEnvelope {
        event_id: record.event_id,
        aggregate_id: record.aggregate_id,
        aggregate_type: record.aggregate_type,
        event_type: record.event_type,
        aggregate_version: record.aggregate_version,
        global_position: record.global_position,
        payload: record.payload,
        metadata,
        occurred_at: record.occurred_at,
        recorded_at: record.recorded_at,
        causation_id: record.causation_id,
        correlation_id: record.correlation_id,
    })
}

fn envelope_to_record(event: &EventEnvelope, recorded_at: DateTime<Utc>) -> EngineResult<NewEventRecord> {
    Ok(NewEventRecord {
        event_id: event.event_id,
        aggregate_id: event.aggregate_id,
        aggregate_type: event.aggregate_type.clone(),
        event_type: event.event_type.clone(),
        aggregate_version: event.aggregate_version,
        payload: event.payload.clone(),
        metadata: serde_json::to_value(&event.metadata)?,
        occurred_at: event.occurred_at,
        recorded_at,
        causation_id: event.causation_id,
        correlation_id: event.correlation_id,
    })
}

/// Durable event store backed by PostgreSQL.
///
/// The append runs in one transaction: the expected-version check and the
/// inserts either all commit (the commit is the durability point) or none
/// do. Reads page through the table so the returned streams stay lazy.
pub struct PostgresEventStore {
    pool: DbPool,
}

impl PostgresEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
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
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: Vec<EventEnvelope>,
    ) -> EngineResult<Vec<EventEnvelope>> {
        ctx.ensure_active()?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let recorded_at = Utc::now();
        let mut records = Vec::with_capacity(events.len());
        for event in &events {
            let mut record = envelope_to_record(event, recorded_at)?;
            record.aggregate_type = aggregate_type.to_string();
            records.push(record);
        }

        let mut conn = self.connection()?;
        let inserted = conn
            .transaction::<Vec<EventRecord>, TxError, _>(|conn| {
                let current: Option<i64> = game_events::table
                    .filter(game_events::aggregate_id.eq(aggregate_id))
                    .select(diesel::dsl::max(game_events::aggregate_version))
                    .first(conn)?;
                let current = current.unwrap_or(0);

                if expected_version != EXPECTED_VERSION_ANY && current != expected_version {
                    return Err(TxError::Conflict {
                        expected: expected_version,
                        actual: current,
                    });
                }

                let inserted: Vec<EventRecord> = diesel::insert_into(game_events::table)
                    .values(&records)
                    .get_results(conn)?;
                Ok(inserted)
            })
            .map_err(|e| match e {
                TxError::Conflict { expected, actual } => EngineError::VersionConflict {
                    aggregate_id,
                    expected,
                    actual,
                },
                TxError::Diesel(e) => {
                    EngineError::storage(format!("failed to append events: {}", e))
                }
            })?;

        inserted.into_iter().map(record_to_envelope).collect()
    }

    async fn events_for_aggregate(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> EngineResult<EventStream> {
        ctx.ensure_active()?;
        let pool = self.pool.clone();
        let ctx = ctx.clone();

        let stream = async_stream::try_stream! {
            let mut cursor = from_version;
            loop {
                ctx.ensure_active()?;
                let mut conn = pool.get().map_err(|e| {
                    EngineError::storage(format!("failed to get database connection: {}", e))
                })?;
                let batch: Vec<EventRecord> = game_events::table
                    .filter(game_events::aggregate_id.eq(aggregate_id))
                    .filter(game_events::aggregate_version.gt(cursor))
                    .order(game_events::aggregate_version.asc())
                    .limit(READ_BATCH_SIZE)
                    .load(&mut conn)
                    .map_err(|e| EngineError::storage(format!("failed to load events: {}", e)))?;

                if batch.is_empty() {
                    break;
                }
                for record in batch {
                    cursor = record.aggregate_version;
                    yield record_to_envelope(record)?;
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn all_events(
        &self,
        ctx: &RequestContext,
        from_position: i64,
    ) -> EngineResult<EventStream> {
        ctx.ensure_active()?;
        let pool = self.pool.clone();
        let ctx = ctx.clone();

        let stream = async_stream::try_stream! {
            let mut cursor = from_position;
            loop {
                ctx.ensure_active()?;
                let mut conn = pool.get().map_err(|e| {
                    EngineError::storage(format!("failed to get database connection: {}", e))
                })?;
                let batch: Vec<EventRecord> = game_events::table
                    .filter(game_events::global_position.gt(cursor))
                    .order(game_events::global_position.asc())
                    .limit(READ_BATCH_SIZE)
                    .load(&mut conn)
                    .map_err(|e| EngineError::storage(format!("failed to load events: {}", e)))?;

                if batch.is_empty() {
                    break;
                }
                for record in batch {
                    cursor = record.global_position;
                    yield record_to_envelope(record)?;
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn current_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<i64> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let version: Option<i64> = game_events::table
            .filter(game_events::aggregate_id.eq(aggregate_id))
            .select(diesel::dsl::max(game_events::aggregate_version))
            .first(&mut conn)
            .map_err(|e| EngineError::storage(format!("failed to get aggregate version: {}", e)))?;
        Ok(version.unwrap_or(0))
    }

    async fn current_position(&self, ctx: &RequestContext) -> EngineResult<i64> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let position: Option<i64> = game_events::table
            .select(diesel::dsl::max(game_events::global_position))
            .first(&mut conn)
            .map_err(|e| EngineError::storage(format!("failed to get current position: {}", e)))?;
        Ok(position.unwrap_or(0))
    }

    async fn aggregate_exists(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;
        let count: i64 = game_events::table
            .filter(game_events::aggregate_id.eq(aggregate_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| {
                EngineError::storage(format!("failed to check aggregate existence: {}", e))
            })?;
        Ok(count > 0)
    }

    async fn statistics(
        &self,
        ctx: &RequestContext,
    ) -> EngineResult<defense_engine_core::event::EventStoreStatistics> {
        ctx.ensure_active()?;
        let mut conn = self.connection()?;

        #[derive(diesel::QueryableByName)]
        struct StoreCounts {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            total_events: i64,
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            total_aggregates: i64,
        }

        let counts: StoreCounts = diesel::sql_query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM game_events) AS total_events,
                (SELECT COUNT(DISTINCT aggregate_id) FROM game_events) AS total_aggregates
            "#,
        )
        .get_result(&mut conn)
        .map_err(|e| EngineError::storage(format!("failed to get statistics: {}", e)))?;

        Ok(defense_engine_core::event::EventStoreStatistics {
            total_events: counts.total_events as u64,
            total_aggregates: counts.total_aggregates as u64,
        })
    }
}
