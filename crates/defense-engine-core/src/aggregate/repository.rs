// File: src/aggregate/repository.rs
//
// Repository for loading and saving aggregate roots: snapshot + tail-event
// load, optimistic-concurrency save, in-order bus publication

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::bus::EventBus;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::event::{EventEnvelope, EventStore};
use crate::snapshot::SnapshotManager;

/// Hides the event store and snapshot manager from command handlers.
///
/// `save` appends the uncommitted buffer under the aggregate's original
/// version, publishes the appended events to the bus in version order, then
/// lets the snapshot manager decide whether to materialize state. Conflicts
/// are returned, never retried here; the command handler owns that decision.
pub struct AggregateRepository<A: Aggregate> {
    event_store: Arc<dyn EventStore>,
    snapshots: Arc<SnapshotManager>,
    bus: Arc<EventBus>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            event_store: Arc::clone(&self.event_store),
            snapshots: Arc::clone(&self.snapshots),
            bus: Arc::clone(&self.bus),
            _marker: PhantomData,
        }
    }
}

impl<A: Aggregate> AggregateRepository<A> {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        snapshots: Arc<SnapshotManager>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            event_store,
            snapshots,
            bus,
            _marker: PhantomData,
        }
    }

    /// Load an aggregate: latest snapshot first, then replay the event tail.
    pub async fn load(&self, ctx: &RequestContext, aggregate_id: Uuid) -> EngineResult<A> {
        ctx.ensure_active()?;

        let (mut aggregate, from_version, have_snapshot) =
            match self.snapshots.restore::<A>(ctx, aggregate_id).await? {
                Some((aggregate, version)) => (aggregate, version, true),
                None => (A::new(aggregate_id), 0, false),
            };

        let mut stream = self
            .event_store
            .events_for_aggregate(ctx, aggregate_id, from_version)
            .await?;

        let started = Instant::now();
        let mut replayed: u64 = 0;
        while let Some(envelope) = stream.try_next().await? {
            let event = envelope.decode::<A::Event>()?;
            aggregate.replay(&event);
            replayed += 1;
        }

        if replayed == 0 && !have_snapshot {
            return Err(EngineError::AggregateNotFound { aggregate_id });
        }

        if replayed > 0 {
            self.snapshots
                .observe_replay(aggregate_id, replayed, started.elapsed());
        }

        aggregate.clear_changes();
        Ok(aggregate)
    }

    /// Persist the uncommitted buffer and publish the appended events.
    ///
    /// Returns the appended envelopes with global positions assigned; an
    /// empty buffer is a no-op.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        aggregate: &mut A,
    ) -> EngineResult<Vec<EventEnvelope>> {
        ctx.ensure_active()?;

        if aggregate.uncommitted().is_empty() {
            return Ok(Vec::new());
        }

        let expected_version = aggregate.original_version();
        let mut envelopes = Vec::with_capacity(aggregate.uncommitted().len());
        let mut version = expected_version;
        for event in aggregate.uncommitted() {
            version += 1;
            envelopes.push(
                EventEnvelope::from_domain(aggregate.id(), A::aggregate_type(), version, event)?
                    .with_context(ctx),
            );
        }

        let appended = self
            .event_store
            .append(
                ctx,
                aggregate.id(),
                A::aggregate_type(),
                expected_version,
                envelopes,
            )
            .await?;

        // Synchronous, in-order publication: subscribers observe this
        // aggregate's versions strictly increasing.
        for envelope in &appended {
            self.bus.publish(ctx, envelope).await?;
        }

        self.snapshots.maybe_capture(ctx, aggregate).await;

        aggregate.clear_changes();
        Ok(appended)
    }

    pub async fn exists(&self, ctx: &RequestContext, aggregate_id: Uuid) -> EngineResult<bool> {
        self.event_store.aggregate_exists(ctx, aggregate_id).await
    }

    pub async fn version(&self, ctx: &RequestContext, aggregate_id: Uuid) -> EngineResult<i64> {
        self.event_store.current_version(ctx, aggregate_id).await
    }
}
