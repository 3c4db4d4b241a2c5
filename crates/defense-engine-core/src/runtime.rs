// File: src/runtime.rs
//
// Explicit runtime assembly: every store, registry, and engine is
// constructed here and handed to the transports; no ambient singletons

use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateRepository};
use crate::bus::EventBus;
use crate::command::CommandRegistry;
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::event::{EventStore, InMemoryEventStore};
use crate::projection::{Projection, ProjectionCursor, ProjectionEngine, PROJECTION_CURSOR_TYPE};
use crate::query::QueryRegistry;
use crate::read::{InMemoryReadStore, ReadModelRegistry, ReadStore};
use crate::rpc::RpcRegistry;
use crate::snapshot::{
    CodecRegistry, EventCountPolicy, InMemorySnapshotStore, SnapshotManager, SnapshotPolicy,
    SnapshotStore,
};
use crate::telemetry::TelemetrySink;

/// The assembled CQRS runtime.
///
/// Construction goes through [`EngineRuntimeBuilder`]; after `build` the
/// registries are frozen behind `Arc`s and the object is cheap to share.
pub struct EngineRuntime {
    pub config: EngineConfig,
    pub telemetry: TelemetrySink,
    pub event_store: Arc<dyn EventStore>,
    pub snapshots: Arc<SnapshotManager>,
    pub reads: Arc<dyn ReadStore>,
    pub read_models: Arc<ReadModelRegistry>,
    pub bus: Arc<EventBus>,
    pub projections: Arc<ProjectionEngine>,
    pub commands: Arc<CommandRegistry>,
    pub queries: Arc<QueryRegistry>,
    pub rpc: Arc<RpcRegistry>,
}

impl EngineRuntime {
    pub fn builder(config: EngineConfig) -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new(config)
    }

    /// Repository over this runtime's stores for one aggregate type.
    pub fn repository<A: Aggregate>(&self) -> AggregateRepository<A> {
        AggregateRepository::new(
            Arc::clone(&self.event_store),
            Arc::clone(&self.snapshots),
            Arc::clone(&self.bus),
        )
    }

    /// Bring everything up: stores, then the bus, then the projection
    /// engine's subscriptions.
    pub async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        self.event_store.start(ctx).await?;
        self.snapshots.store().start(ctx).await?;
        self.reads.start(ctx).await?;
        self.bus.start(ctx).await?;
        self.projections.start(ctx).await?;
        tracing::info!(
            commands = self.commands.len(),
            queries = self.queries.len(),
            rpc_methods = self.rpc.len(),
            "engine runtime started"
        );
        Ok(())
    }

    /// Tear down in reverse order, draining in-flight handlers.
    pub async fn stop(&self, ctx: &RequestContext) -> EngineResult<()> {
        self.projections.stop(ctx).await?;
        self.bus.stop(ctx).await?;
        self.reads.stop(ctx).await?;
        self.snapshots.store().stop(ctx).await?;
        self.event_store.stop(ctx).await?;
        tracing::info!("engine runtime stopped");
        Ok(())
    }

    pub async fn projection_cursors(&self) -> Vec<ProjectionCursor> {
        self.projections.cursors().await
    }
}

/// Builder wiring the runtime from configuration plus optional overrides.
/// Tests swap in their own stores and policies; production wiring supplies
/// the PostgreSQL-backed stores from the api crate.
pub struct EngineRuntimeBuilder {
    config: EngineConfig,
    telemetry: TelemetrySink,
    event_store: Option<Arc<dyn EventStore>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    read_store: Option<Arc<dyn ReadStore>>,
    codecs: Option<CodecRegistry>,
    policy: Option<Arc<dyn SnapshotPolicy>>,
    read_models: Arc<ReadModelRegistry>,
    commands: Arc<CommandRegistry>,
    queries: Arc<QueryRegistry>,
    rpc: Arc<RpcRegistry>,
    projections: Vec<Arc<dyn Projection>>,
}

impl EngineRuntimeBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            telemetry: TelemetrySink::default(),
            event_store: None,
            snapshot_store: None,
            read_store: None,
            codecs: None,
            policy: None,
            read_models: Arc::new(ReadModelRegistry::new()),
            commands: Arc::new(CommandRegistry::new()),
            queries: Arc::new(QueryRegistry::new()),
            rpc: Arc::new(RpcRegistry::new()),
            projections: Vec::new(),
        }
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn with_read_store(mut self, store: Arc<dyn ReadStore>) -> Self {
        self.read_store = Some(store);
        self
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    pub fn with_snapshot_policy(mut self, policy: Arc<dyn SnapshotPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn read_models(&self) -> &Arc<ReadModelRegistry> {
        &self.read_models
    }

    pub fn add_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    pub async fn build(self) -> EngineResult<EngineRuntime> {
        self.config.validate()?;

        let telemetry = self.telemetry;
        let event_store = self
            .event_store
            .unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let snapshot_store = self.snapshot_store.unwrap_or_else(|| {
            Arc::new(InMemorySnapshotStore::new(self.config.snapshot.max_per_aggregate))
        });
        let reads = self
            .read_store
            .unwrap_or_else(|| Arc::new(InMemoryReadStore::new()));

        let mut codecs = self.codecs.unwrap_or_else(CodecRegistry::standard);
        codecs.set_default(&self.config.snapshot.codec)?;

        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(EventCountPolicy::new(self.config.snapshot.every_events)));

        let snapshots = Arc::new(SnapshotManager::new(
            snapshot_store,
            Arc::new(codecs),
            policy,
            telemetry.clone(),
        ));

        let bus = Arc::new(EventBus::new(self.config.bus.clone(), telemetry.clone()));

        // The cursor type is runtime-owned; register it if the composition
        // root brought a validating registry.
        if !self.read_models.is_registered(PROJECTION_CURSOR_TYPE) {
            self.read_models
                .register::<ProjectionCursor>(PROJECTION_CURSOR_TYPE)?;
        }

        let projections = Arc::new(ProjectionEngine::new(
            Arc::clone(&bus),
            Arc::clone(&event_store),
            Arc::clone(&reads),
            telemetry.clone(),
        ));
        for projection in self.projections {
            projections.register(projection).await?;
        }

        Ok(EngineRuntime {
            config: self.config,
            telemetry,
            event_store,
            snapshots,
            reads,
            read_models: self.read_models,
            bus,
            projections,
            commands: self.commands,
            queries: self.queries,
            rpc: self.rpc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_build_wires_memory_stores() {
        let runtime = EngineRuntime::builder(EngineConfig::default())
            .build()
            .await
            .unwrap();
        let ctx = RequestContext::background();

        runtime.start(&ctx).await.unwrap();
        assert!(runtime.rpc.is_empty());
        assert!(runtime.commands.is_empty());
        runtime.stop(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_default_codec_fails_build() {
        let config = EngineConfig {
            snapshot: crate::config::SnapshotSettings {
                codec: "cbor".to_string(),
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        assert!(EngineRuntime::builder(config).build().await.is_err());
    }
}
