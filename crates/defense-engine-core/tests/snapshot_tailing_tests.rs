// File: tests/snapshot_tailing_tests.rs
//
// Snapshot-accelerated loads: after the policy fires at version 5, loading
// an aggregate with 7 events costs one decode plus two applies

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use defense_engine_core::aggregate::{Aggregate, AggregateBase, AggregateRepository};
use defense_engine_core::bus::EventBus;
use defense_engine_core::config::BusSettings;
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::event::{DomainEvent, InMemoryEventStore};
use defense_engine_core::snapshot::{
    CodecRegistry, EventCountPolicy, InMemorySnapshotStore, SnapshotManager, SnapshotStore,
};
use defense_engine_core::telemetry::TelemetrySink;

static APPLIES: AtomicU64 = AtomicU64::new(0);
static DECODES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum OrderEvent {
    ItemAdded { sku: String },
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        "item_added"
    }
}

struct OrderAggregate {
    base: AggregateBase<OrderEvent>,
    items: Vec<String>,
}

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;

    fn aggregate_type() -> &'static str {
        "order"
    }

    fn new(id: Uuid) -> Self {
        Self { base: AggregateBase::new(id), items: Vec::new() }
    }

    fn base(&self) -> &AggregateBase<Self::Event> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event> {
        &mut self.base
    }

    fn apply(&mut self, event: &Self::Event) {
        APPLIES.fetch_add(1, Ordering::SeqCst);
        match event {
            OrderEvent::ItemAdded { sku } => self.items.push(sku.clone()),
        }
    }

    fn snapshot_state(&self) -> EngineResult<serde_json::Value> {
        serde_json::to_value(&self.items).map_err(EngineError::from)
    }

    fn apply_snapshot_state(&mut self, state: &serde_json::Value) -> EngineResult<()> {
        DECODES.fetch_add(1, Ordering::SeqCst);
        self.items = serde_json::from_value(state.clone()).map_err(EngineError::from)?;
        Ok(())
    }
}

#[tokio::test]
async fn load_after_snapshot_replays_only_the_tail() {
    let snapshot_store = Arc::new(InMemorySnapshotStore::new(5));
    let telemetry = TelemetrySink::default();
    let repo: AggregateRepository<OrderAggregate> = AggregateRepository::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(SnapshotManager::new(
            snapshot_store.clone(),
            Arc::new(CodecRegistry::standard()),
            Arc::new(EventCountPolicy::new(5)),
            telemetry.clone(),
        )),
        Arc::new(EventBus::new(BusSettings::default(), telemetry)),
    );
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let mut order = OrderAggregate::new(id);
    for n in 1..=7 {
        order.record(OrderEvent::ItemAdded { sku: format!("sku-{}", n) });
        repo.save(&ctx, &mut order).await.unwrap();
    }

    // The event-count policy fired once we hit five events.
    let snapshot = snapshot_store
        .latest(&ctx, id, None)
        .await
        .unwrap()
        .expect("snapshot should exist after event five");
    assert_eq!(snapshot.aggregate_version, 5);

    APPLIES.store(0, Ordering::SeqCst);
    DECODES.store(0, Ordering::SeqCst);

    let loaded = repo.load(&ctx, id).await.unwrap();
    assert_eq!(loaded.version(), 7);
    assert_eq!(loaded.items.len(), 7);

    // One snapshot decode plus the two tail events, not seven applies.
    assert_eq!(DECODES.load(Ordering::SeqCst), 1);
    assert_eq!(APPLIES.load(Ordering::SeqCst), 2);
}
