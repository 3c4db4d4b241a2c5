// File: src/snapshot/store.rs
//
// Snapshot persistence: append-only per-aggregate snapshot lists with
// caller-configurable retention

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::snapshot::Snapshot;

/// Persistence for aggregate snapshots.
///
/// Per aggregate id the store holds a list of snapshots ordered by version.
/// Saving prunes the list so at most the configured retention count remains.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Lifecycle hook; durable implementations open pools or verify schema.
    async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        ctx.ensure_active()
    }

    async fn stop(&self, _ctx: &RequestContext) -> EngineResult<()> {
        Ok(())
    }

    async fn save(&self, ctx: &RequestContext, snapshot: Snapshot) -> EngineResult<()>;

    /// Latest snapshot with version <= `max_version` (unbounded when `None`).
    async fn latest(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        max_version: Option<i64>,
    ) -> EngineResult<Option<Snapshot>>;

    async fn by_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<Option<Snapshot>>;

    /// Remove one snapshot; returns whether it existed.
    async fn delete(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<bool>;

    /// Keep only the `keep` newest snapshots; returns how many were removed.
    async fn prune_keeping_last(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        keep: usize,
    ) -> EngineResult<usize>;
}

/// In-memory snapshot store with save-time retention pruning.
pub struct InMemorySnapshotStore {
    max_per_aggregate: usize,
    state: RwLock<HashMap<Uuid, Vec<Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new(max_per_aggregate: usize) -> Self {
        Self {
            max_per_aggregate: max_per_aggregate.max(1),
            state: RwLock::new(HashMap::new()),
        }
    }

    pub async fn total_snapshots(&self) -> usize {
        let state = self.state.read().await;
        state.values().map(|list| list.len()).sum()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, ctx: &RequestContext, snapshot: Snapshot) -> EngineResult<()> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        let list = state.entry(snapshot.aggregate_id).or_default();

        match list.binary_search_by_key(&snapshot.aggregate_version, |s| s.aggregate_version) {
            // A re-capture at the same version replaces the stored record.
            Ok(index) => list[index] = snapshot,
            Err(index) => list.insert(index, snapshot),
        }

        if list.len() > self.max_per_aggregate {
            let excess = list.len() - self.max_per_aggregate;
            list.drain(0..excess);
            tracing::debug!(excess, "pruned snapshots past retention on save");
        }
        Ok(())
    }

    async fn latest(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        max_version: Option<i64>,
    ) -> EngineResult<Option<Snapshot>> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(state.get(&aggregate_id).and_then(|list| {
            list.iter()
                .rev()
                .find(|s| max_version.map_or(true, |max| s.aggregate_version <= max))
                .cloned()
        }))
    }

    async fn by_version(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<Option<Snapshot>> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        Ok(state.get(&aggregate_id).and_then(|list| {
            list.iter().find(|s| s.aggregate_version == version).cloned()
        }))
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        version: i64,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        if let Some(list) = state.get_mut(&aggregate_id) {
            let before = list.len();
            list.retain(|s| s.aggregate_version != version);
            return Ok(list.len() != before);
        }
        Ok(false)
    }

    async fn prune_keeping_last(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
        keep: usize,
    ) -> EngineResult<usize> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        if let Some(list) = state.get_mut(&aggregate_id) {
            if list.len() > keep {
                let excess = list.len() - keep;
                list.drain(0..excess);
                return Ok(excess);
            }
        }
        Ok(0)
    }
}
