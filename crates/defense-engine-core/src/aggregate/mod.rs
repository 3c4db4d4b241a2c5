// File: src/aggregate/mod.rs
//
// Aggregate root contract: identity, versioning, and the uncommitted-change
// buffer shared by every domain aggregate

pub mod repository;

pub use repository::AggregateRepository;

use uuid::Uuid;

use crate::error::EngineResult;
use crate::event::DomainEvent;

/// Identity, version bookkeeping, and the uncommitted-event buffer embedded
/// in every concrete aggregate.
///
/// Invariant: `version == original_version + uncommitted.len()`.
#[derive(Debug, Clone)]
pub struct AggregateBase<E> {
    id: Uuid,
    version: i64,
    original_version: i64,
    uncommitted: Vec<E>,
}

impl<E> AggregateBase<E> {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            original_version: 0,
            uncommitted: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Version of the last applied event.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Version at load time; the optimistic-concurrency precondition.
    pub fn original_version(&self) -> i64 {
        self.original_version
    }

    pub fn uncommitted(&self) -> &[E] {
        &self.uncommitted
    }

    /// Buffer a freshly produced event and advance the version.
    pub fn record(&mut self, event: E) {
        self.version += 1;
        self.uncommitted.push(event);
    }

    /// Advance the version for an event applied during load, without
    /// buffering it.
    pub fn replayed(&mut self) {
        self.version += 1;
    }

    /// Discard the buffer and advance the original version. Called by the
    /// repository after a successful save, and at the end of load.
    pub fn clear_changes(&mut self) {
        self.uncommitted.clear();
        self.original_version = self.version;
    }

    /// Reset version bookkeeping after restoring state from a snapshot.
    pub fn mark_restored(&mut self, version: i64) {
        self.version = version;
        self.original_version = version;
        self.uncommitted.clear();
    }
}

/// An event-sourced aggregate: a consistency boundary identified by
/// (id, type), mutated only by applying its own events.
///
/// Concrete aggregates implement the state transition in [`Aggregate::apply`]
/// (a pure function of state and event) and use the provided
/// [`Aggregate::record`] from their command methods. Snapshot state carries
/// serialized scalar state only, never object identity.
pub trait Aggregate: Send + Sync + Sized {
    type Event: DomainEvent;

    /// Stable type name under which events and snapshots are persisted.
    fn aggregate_type() -> &'static str;

    /// Fresh aggregate at version 0.
    fn new(id: Uuid) -> Self;

    fn base(&self) -> &AggregateBase<Self::Event>;

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event>;

    /// Apply one event to in-memory state. Must not touch the base.
    fn apply(&mut self, event: &Self::Event);

    /// Serialize domain state for snapshotting.
    fn snapshot_state(&self) -> EngineResult<serde_json::Value>;

    /// Overwrite domain state from a decoded snapshot body.
    fn apply_snapshot_state(&mut self, state: &serde_json::Value) -> EngineResult<()>;

    fn id(&self) -> Uuid {
        self.base().id()
    }

    fn version(&self) -> i64 {
        self.base().version()
    }

    fn original_version(&self) -> i64 {
        self.base().original_version()
    }

    fn uncommitted(&self) -> &[Self::Event] {
        self.base().uncommitted()
    }

    /// Apply a new event and buffer it as an uncommitted change.
    fn record(&mut self, event: Self::Event) {
        self.apply(&event);
        self.base_mut().record(event);
    }

    /// Apply a historical event without buffering it; used during load.
    fn replay(&mut self, event: &Self::Event) {
        self.apply(event);
        self.base_mut().replayed();
    }

    fn clear_changes(&mut self) {
        self.base_mut().clear_changes();
    }

    /// Reconstruct an aggregate from decoded snapshot state at `version`.
    fn restore(id: Uuid, version: i64, state: &serde_json::Value) -> EngineResult<Self> {
        let mut aggregate = Self::new(id);
        aggregate.apply_snapshot_state(state)?;
        aggregate.base_mut().mark_restored(version);
        Ok(aggregate)
    }
}
