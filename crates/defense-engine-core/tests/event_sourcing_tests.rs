// File: tests/event_sourcing_tests.rs
//
// Store-level invariants: version density, expected-version semantics,
// one-winner concurrency, replay equivalence

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::TryStreamExt;
use uuid::Uuid;

use common::{UserAggregate, UserEvent};
use defense_engine_core::aggregate::{Aggregate, AggregateRepository};
use defense_engine_core::bus::EventBus;
use defense_engine_core::config::BusSettings;
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::EngineError;
use defense_engine_core::event::{EventEnvelope, EventStore, InMemoryEventStore};
use defense_engine_core::snapshot::{
    CodecRegistry, EventCountPolicy, InMemorySnapshotStore, NeverPolicy, SnapshotManager,
    SnapshotPolicy,
};
use defense_engine_core::telemetry::TelemetrySink;

fn user_repo(
    store: Arc<InMemoryEventStore>,
    policy: Arc<dyn SnapshotPolicy>,
) -> AggregateRepository<UserAggregate> {
    let telemetry = TelemetrySink::default();
    AggregateRepository::new(
        store,
        Arc::new(SnapshotManager::new(
            Arc::new(InMemorySnapshotStore::new(5)),
            Arc::new(CodecRegistry::standard()),
            policy,
            telemetry.clone(),
        )),
        Arc::new(EventBus::new(BusSettings::default(), telemetry)),
    )
}

#[tokio::test]
async fn persisted_versions_are_dense_from_one() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = user_repo(Arc::clone(&store), Arc::new(NeverPolicy));
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let mut user = UserAggregate::new(id);
    user.create("a@x".into(), "Alice".into()).unwrap();
    repo.save(&ctx, &mut user).await.unwrap();

    for n in 0..5 {
        user.change_email(format!("a{}@x", n)).unwrap();
        repo.save(&ctx, &mut user).await.unwrap();
    }

    let events: Vec<EventEnvelope> = store
        .events_for_aggregate(&ctx, id, 0)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.aggregate_version).collect();
    assert_eq!(versions, (1..=6).collect::<Vec<i64>>());

    let positions: HashSet<i64> = events.iter().map(|e| e.global_position).collect();
    assert_eq!(positions.len(), events.len());
}

#[tokio::test]
async fn expected_version_zero_means_must_not_exist() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = user_repo(Arc::clone(&store), Arc::new(NeverPolicy));
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let mut first = UserAggregate::new(id);
    first.create("a@x".into(), "Alice".into()).unwrap();
    repo.save(&ctx, &mut first).await.unwrap();

    // A second creation attempt carries original_version = 0 and must lose.
    let mut second = UserAggregate::new(id);
    second.create("b@x".into(), "Bob".into()).unwrap();
    let err = repo.save(&ctx, &mut second).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::VersionConflict { expected: 0, actual: 1, .. }
    ));

    // No mutation happened on the losing path.
    assert_eq!(store.current_version(&ctx, id).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_saves_produce_exactly_one_winner() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = Arc::new(user_repo(Arc::clone(&store), Arc::new(NeverPolicy)));
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let mut user = UserAggregate::new(id);
    user.create("a@x".into(), "Alice".into()).unwrap();
    repo.save(&ctx, &mut user).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..4 {
        let repo = Arc::clone(&repo);
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            // Everyone loads version 1, so at most one save succeeds.
            let mut user = repo.load(&ctx, id).await?;
            user.change_email(format!("racer{}@x", n))?;
            repo.save(&ctx, &mut user).await.map(|_| ())
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => winners += 1,
            Err(EngineError::VersionConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(store.current_version(&ctx, id).await.unwrap(), 2);
}

#[tokio::test]
async fn replay_equivalence_with_and_without_snapshots() {
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let snapshotting_store = Arc::new(InMemoryEventStore::new());
    let snapshotting = user_repo(
        Arc::clone(&snapshotting_store),
        Arc::new(EventCountPolicy::new(3)),
    );
    let plain_store = Arc::new(InMemoryEventStore::new());
    let plain = user_repo(Arc::clone(&plain_store), Arc::new(NeverPolicy));

    for repo in [&snapshotting, &plain] {
        let mut user = UserAggregate::new(id);
        user.create("a@x".into(), "Alice".into()).unwrap();
        repo.save(&ctx, &mut user).await.unwrap();
        for n in 0..6 {
            user.change_email(format!("step{}@x", n)).unwrap();
            repo.save(&ctx, &mut user).await.unwrap();
        }
        user.retire().unwrap();
        repo.save(&ctx, &mut user).await.unwrap();
    }

    let from_snapshot = snapshotting.load(&ctx, id).await.unwrap();
    let from_log = plain.load(&ctx, id).await.unwrap();

    assert_eq!(from_snapshot.version(), from_log.version());
    assert_eq!(from_snapshot.state.email, from_log.state.email);
    assert_eq!(from_snapshot.state.active, from_log.state.active);
    assert!(!from_snapshot.state.active);
}

#[tokio::test]
async fn saved_events_decode_back_into_the_domain_union() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = user_repo(Arc::clone(&store), Arc::new(NeverPolicy));
    let ctx = RequestContext::background();
    let id = Uuid::new_v4();

    let mut user = UserAggregate::new(id);
    user.create("a@x".into(), "Alice".into()).unwrap();
    let appended = repo.save(&ctx, &mut user).await.unwrap();

    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].event_type, "user_created");
    assert_eq!(appended[0].aggregate_type, "user");
    let decoded: UserEvent = appended[0].decode().unwrap();
    assert_eq!(
        decoded,
        UserEvent::UserCreated { email: "a@x".into(), name: "Alice".into() }
    );
}
