// File: src/event/store.rs
//
// Event store contract and the in-memory implementation

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::event::EventEnvelope;

/// Sentinel accepted in place of an expected version: skip the optimistic
/// concurrency check entirely. Intended for idempotent commands only; the
/// repository always passes the aggregate's real original version.
pub const EXPECTED_VERSION_ANY: i64 = -1;

/// Lazy, finite, non-restartable sequence of events.
pub type EventStream = BoxStream<'static, EngineResult<EventEnvelope>>;

/// Event store interface for persisting and retrieving events.
///
/// Append is atomic per call: either every event lands with contiguous
/// versions and assigned global positions, or none do. Implementations must
/// durably commit before reporting success.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Lifecycle hook; durable implementations open pools or verify schema.
    async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        ctx.ensure_active()
    }

    /// Lifecycle hook; in-flight calls finish, new ones may be refused.
    async fn stop(&self, _ctx: &RequestContext) -> EngineResult<()> {
        Ok(())
    }

    /// Append events for one aggregate under an expected-version precondition.
    ///
    /// `expected_version` of 0 means the aggregate must not yet exist;
    /// [`EXPECTED_VERSION_ANY`] skips the check. On mismatch the store
    /// returns [`EngineError::VersionConflict`] without mutating anything.
    /// Returns the appended envelopes with their global positions assigned.
    async fn append(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: Vec<EventEnvelope>,
    ) -> EngineResult<Vec<EventEnvelope>>;

    /// Events for one aggregate with version > `from_version`, in version
    /// order.
    async fn events_for_aggregate(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> EngineResult<EventStream>;

    /// All events with global position > `from_position`, in append order.
    /// Used by projection rebuild.
    async fn all_events(
        &self,
        ctx: &RequestContext,
        from_position: i64,
    ) -> EngineResult<EventStream>;

    /// Current persisted version of an aggregate (0 if absent).
    async fn current_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<i64>;

    /// Highest assigned global position (0 when the store is empty).
    async fn current_position(&self, ctx: &RequestContext) -> EngineResult<i64>;

    async fn aggregate_exists(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<bool>;

    /// Store-level counters for the statistics surface.
    async fn statistics(&self, ctx: &RequestContext) -> EngineResult<EventStoreStatistics> {
        ctx.ensure_active()?;
        Ok(EventStoreStatistics::default())
    }
}

/// Counters reported by store implementations for the statistics surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EventStoreStatistics {
    pub total_events: u64,
    pub total_aggregates: u64,
}

#[derive(Default)]
struct StoreState {
    streams: HashMap<Uuid, Vec<EventEnvelope>>,
    log: Vec<EventEnvelope>,
    next_position: i64,
}

/// In-memory event store.
///
/// The default backend for tests and single-node development; the durable
/// PostgreSQL implementation lives in the api crate. All mutation happens
/// under one write lock, which is what makes append atomic.
pub struct InMemoryEventStore {
    state: RwLock<StoreState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                streams: HashMap::new(),
                log: Vec::new(),
                next_position: 1,
            }),
        }
    }

}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
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

        let mut state = self.state.write().await;
        let current = state
            .streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|event| event.aggregate_version)
            .unwrap_or(0);

        if expected_version != EXPECTED_VERSION_ANY && current != expected_version {
            return Err(EngineError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual: current,
            });
        }

        // Versions must continue the stream densely.
        for (offset, event) in events.iter().enumerate() {
            let required = current + 1 + offset as i64;
            if event.aggregate_version != required {
                return Err(EngineError::validation(format!(
                    "non-contiguous event version for aggregate {}: expected {}, got {}",
                    aggregate_id, required, event.aggregate_version
                )));
            }
            if event.aggregate_id != aggregate_id {
                return Err(EngineError::validation(format!(
                    "event aggregate id {} does not match append target {}",
                    event.aggregate_id, aggregate_id
                )));
            }
        }

        let now = chrono::Utc::now();
        let mut appended = Vec::with_capacity(events.len());
        for mut event in events {
            event.aggregate_type = aggregate_type.to_string();
            event.global_position = state.next_position;
            event.recorded_at = now;
            state.next_position += 1;
            state
                .streams
                .entry(aggregate_id)
                .or_default()
                .push(event.clone());
            state.log.push(event.clone());
            appended.push(event);
        }

        Ok(appended)
    }

    async fn events_for_aggregate(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> EngineResult<EventStream> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        let events: Vec<EngineResult<EventEnvelope>> = state
            .streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.aggregate_version > from_version)
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();

        Ok(stream::iter(events).boxed())
    }

    async fn all_events(
        &self,
        ctx: &RequestContext,
        from_position: i64,
    ) -> EngineResult<EventStream> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        let events: Vec<EngineResult<EventEnvelope>> = state
            .log
            .iter()
            .filter(|event| event.global_position > from_position)
            .cloned()
            .map(Ok)
            .collect();

        Ok(stream::iter(events).boxed())
    }

    async fn current_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<i64> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(state
            .streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|event| event.aggregate_version)
            .unwrap_or(0))
    }

    async fn current_position(&self, ctx: &RequestContext) -> EngineResult<i64> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(state.next_position - 1)
    }

    async fn aggregate_exists(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(state.streams.contains_key(&aggregate_id))
    }

    async fn statistics(&self, ctx: &RequestContext) -> EngineResult<EventStoreStatistics> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(EventStoreStatistics {
            total_events: state.log.len() as u64,
            total_aggregates: state.streams.len() as u64,
        })
    }
}
