// File: src/snapshot/manager.rs
//
// Snapshot orchestration: consult the policy on save, encode through the
// configured codec, verify checksums on restore

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::codec::CodecRegistry;
use crate::snapshot::policy::SnapshotPolicy;
use crate::snapshot::store::SnapshotStore;
use crate::snapshot::Snapshot;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

const CHECKSUM_KEY: &str = "checksum";

/// Counters for the statistics surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SnapshotStatistics {
    pub snapshots_created: u64,
    pub snapshots_restored: u64,
    pub failures: u64,
    pub encoded_bytes: u64,
    pub by_aggregate_type: HashMap<String, u64>,
}

/// Orchestrates snapshot capture and restore around the repository.
///
/// Capture failures never propagate to the owning save; they are logged,
/// counted, and emitted on the telemetry channel.
pub struct SnapshotManager {
    store: Arc<dyn SnapshotStore>,
    codecs: Arc<CodecRegistry>,
    policy: Arc<dyn SnapshotPolicy>,
    telemetry: TelemetrySink,
    statistics: RwLock<SnapshotStatistics>,
}

impl SnapshotManager {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        codecs: Arc<CodecRegistry>,
        policy: Arc<dyn SnapshotPolicy>,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            store,
            codecs,
            policy,
            telemetry,
            statistics: RwLock::new(SnapshotStatistics::default()),
        }
    }

    /// Encode the aggregate with the default codec and persist the snapshot.
    pub async fn capture<A: Aggregate>(
        &self,
        ctx: &RequestContext,
        aggregate: &A,
    ) -> EngineResult<Snapshot> {
        let codec = self.codecs.default_codec();
        let state = aggregate.snapshot_state()?;
        let encoded = codec.encode(&state)?;
        let checksum = hex_sha256(&encoded);

        let snapshot = Snapshot::new(
            aggregate.id(),
            A::aggregate_type(),
            aggregate.version(),
            codec.name(),
            codec.compression().to_string(),
            encoded,
        )
        .with_metadata(CHECKSUM_KEY, serde_json::Value::String(checksum));

        self.store.save(ctx, snapshot.clone()).await?;
        self.policy.snapshot_taken(aggregate.id());

        {
            let mut stats = self.statistics.write().await;
            stats.snapshots_created += 1;
            stats.encoded_bytes += snapshot.state.len() as u64;
            *stats
                .by_aggregate_type
                .entry(snapshot.aggregate_type.clone())
                .or_insert(0) += 1;
        }

        tracing::info!(
            aggregate_id = %aggregate.id(),
            version = aggregate.version(),
            codec = %snapshot.codec,
            bytes = snapshot.state.len(),
            "captured aggregate snapshot"
        );

        Ok(snapshot)
    }

    /// Consult the policy after a save and capture if it fires. Best-effort:
    /// every failure path ends in telemetry, not an error.
    pub async fn maybe_capture<A: Aggregate>(&self, ctx: &RequestContext, aggregate: &A) {
        let last_version = match self.store.latest(ctx, aggregate.id(), None).await {
            Ok(snapshot) => snapshot.map(|s| s.aggregate_version).unwrap_or(0),
            Err(error) => {
                self.record_failure(aggregate.id(), A::aggregate_type(), aggregate.version(), &error)
                    .await;
                return;
            }
        };

        let events_since = aggregate.version() - last_version;
        if !self
            .policy
            .should_snapshot(aggregate.id(), aggregate.version(), events_since)
        {
            return;
        }

        if let Err(error) = self.capture(ctx, aggregate).await {
            self.record_failure(aggregate.id(), A::aggregate_type(), aggregate.version(), &error)
                .await;
        }
    }

    /// Restore the latest snapshot into a fresh aggregate, returning it with
    /// the snapshot version so the caller can replay only the tail.
    pub async fn restore<A: Aggregate>(
        &self,
        ctx: &RequestContext,
        aggregate_id: Uuid,
    ) -> EngineResult<Option<(A, i64)>> {
        let Some(snapshot) = self.store.latest(ctx, aggregate_id, None).await? else {
            return Ok(None);
        };

        let started = Instant::now();
        let codec = self.codecs.get(&snapshot.codec)?;

        if let Some(expected) = snapshot
            .metadata
            .get(CHECKSUM_KEY)
            .and_then(|v| v.as_str())
        {
            let actual = hex_sha256(&snapshot.state);
            if actual != expected {
                return Err(EngineError::Snapshot {
                    message: format!(
                        "snapshot checksum mismatch for aggregate {} at version {}",
                        aggregate_id, snapshot.aggregate_version
                    ),
                });
            }
        }

        let state = codec.decode(&snapshot.state)?;
        let aggregate = A::restore(aggregate_id, snapshot.aggregate_version, &state)?;

        self.policy.observe_restore(aggregate_id, started.elapsed());
        self.statistics.write().await.snapshots_restored += 1;

        tracing::debug!(
            %aggregate_id,
            version = snapshot.aggregate_version,
            codec = %snapshot.codec,
            "restored aggregate from snapshot"
        );

        Ok(Some((aggregate, snapshot.aggregate_version)))
    }

    /// Forward replay-cost measurements to the policy.
    pub fn observe_replay(&self, aggregate_id: Uuid, events: u64, duration: Duration) {
        self.policy.observe_replay(aggregate_id, events, duration);
    }

    pub async fn statistics(&self) -> SnapshotStatistics {
        self.statistics.read().await.clone()
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    async fn record_failure(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        version: i64,
        error: &EngineError,
    ) {
        self.statistics.write().await.failures += 1;
        tracing::warn!(
            %aggregate_id,
            aggregate_type,
            version,
            %error,
            "snapshot capture failed; save unaffected"
        );
        self.telemetry.emit(TelemetryEvent::SnapshotFailed {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            aggregate_version: version,
            error: error.to_string(),
        });
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateBase;
    use crate::event::DomainEvent;
    use crate::snapshot::policy::{AlwaysPolicy, EventCountPolicy};
    use crate::snapshot::store::InMemorySnapshotStore;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum BaseEvent {
        Bumped,
    }

    impl DomainEvent for BaseEvent {
        fn event_type(&self) -> &'static str {
            "bumped"
        }
    }

    #[derive(Debug)]
    struct Simple {
        base: AggregateBase<BaseEvent>,
        count: i64,
        poisoned: bool,
    }

    impl Aggregate for Simple {
        type Event = BaseEvent;

        fn aggregate_type() -> &'static str {
            "simple"
        }

        fn new(id: Uuid) -> Self {
            Self { base: AggregateBase::new(id), count: 0, poisoned: false }
        }

        fn base(&self) -> &AggregateBase<Self::Event> {
            &self.base
        }

        fn base_mut(&mut self) -> &mut AggregateBase<Self::Event> {
            &mut self.base
        }

        fn apply(&mut self, _event: &Self::Event) {
            self.count += 1;
        }

        fn snapshot_state(&self) -> EngineResult<serde_json::Value> {
            if self.poisoned {
                return Err(EngineError::Snapshot { message: "poisoned".into() });
            }
            Ok(json!({"count": self.count}))
        }

        fn apply_snapshot_state(&mut self, state: &serde_json::Value) -> EngineResult<()> {
            self.count = state["count"].as_i64().unwrap_or(0);
            Ok(())
        }
    }

    fn manager(policy: Arc<dyn SnapshotPolicy>) -> SnapshotManager {
        SnapshotManager::new(
            Arc::new(InMemorySnapshotStore::new(5)),
            Arc::new(CodecRegistry::standard()),
            policy,
            TelemetrySink::default(),
        )
    }

    #[tokio::test]
    async fn capture_then_restore_roundtrips_state() {
        let manager = manager(Arc::new(AlwaysPolicy));
        let ctx = RequestContext::background();
        let mut aggregate = Simple::new(Uuid::new_v4());
        for _ in 0..3 {
            aggregate.record(BaseEvent::Bumped);
        }

        manager.capture(&ctx, &aggregate).await.unwrap();

        let (restored, version) = manager
            .restore::<Simple>(&ctx, aggregate.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(version, 3);
        assert_eq!(restored.count, 3);
        assert_eq!(restored.original_version(), 3);
    }

    #[tokio::test]
    async fn maybe_capture_respects_policy() {
        let manager = manager(Arc::new(EventCountPolicy::new(5)));
        let ctx = RequestContext::background();
        let mut aggregate = Simple::new(Uuid::new_v4());
        for _ in 0..3 {
            aggregate.record(BaseEvent::Bumped);
        }

        manager.maybe_capture(&ctx, &aggregate).await;
        assert!(manager
            .restore::<Simple>(&ctx, aggregate.id())
            .await
            .unwrap()
            .is_none());

        for _ in 0..2 {
            aggregate.record(BaseEvent::Bumped);
        }
        manager.maybe_capture(&ctx, &aggregate).await;
        let stats = manager.statistics().await;
        assert_eq!(stats.snapshots_created, 1);
    }

    #[tokio::test]
    async fn capture_failure_is_swallowed_and_reported() {
        let manager = manager(Arc::new(AlwaysPolicy));
        let mut telemetry_rx = manager.telemetry.subscribe();
        let ctx = RequestContext::background();

        let mut aggregate = Simple::new(Uuid::new_v4());
        aggregate.record(BaseEvent::Bumped);
        aggregate.poisoned = true;

        manager.maybe_capture(&ctx, &aggregate).await;

        let stats = manager.statistics().await;
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.snapshots_created, 0);
        assert!(matches!(
            telemetry_rx.recv().await.unwrap(),
            TelemetryEvent::SnapshotFailed { .. }
        ));
    }

    #[tokio::test]
    async fn tampered_snapshot_fails_checksum() {
        let store = Arc::new(InMemorySnapshotStore::new(5));
        let manager = SnapshotManager::new(
            store.clone(),
            Arc::new(CodecRegistry::standard()),
            Arc::new(AlwaysPolicy),
            TelemetrySink::default(),
        );
        let ctx = RequestContext::background();
        let mut aggregate = Simple::new(Uuid::new_v4());
        aggregate.record(BaseEvent::Bumped);

        let mut snapshot = manager.capture(&ctx, &aggregate).await.unwrap();
        snapshot.state = b"{\"count\": 999}".to_vec();
        store.save(&ctx, snapshot).await.unwrap();

        let err = manager
            .restore::<Simple>(&ctx, aggregate.id())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Snapshot { .. }));
    }
}
