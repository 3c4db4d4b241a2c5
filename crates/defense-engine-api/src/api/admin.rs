// File: src/api/admin.rs
//
// Operator surface exposed as engine.* RPC methods: runtime statistics,
// projection cursors, and the retry/rebuild recovery actions

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use defense_engine_core::bus::EventBus;
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::EngineResult;
use defense_engine_core::event::EventStore;
use defense_engine_core::projection::ProjectionEngine;
use defense_engine_core::rpc::{RegisterOptions, RpcHandler, RpcMethod};
use defense_engine_core::runtime::EngineRuntime;
use defense_engine_core::snapshot::SnapshotManager;

#[derive(Debug, Deserialize)]
pub struct ProjectionRequest {
    pub name: String,
}

/// Handler type whose methods become the `engine.*` operator methods.
pub struct EngineAdminRpc {
    event_store: Arc<dyn EventStore>,
    snapshots: Arc<SnapshotManager>,
    bus: Arc<EventBus>,
    projections: Arc<ProjectionEngine>,
}

impl EngineAdminRpc {
    pub fn new(runtime: &EngineRuntime) -> Self {
        Self {
            event_store: Arc::clone(&runtime.event_store),
            snapshots: Arc::clone(&runtime.snapshots),
            bus: Arc::clone(&runtime.bus),
            projections: Arc::clone(&runtime.projections),
        }
    }

    async fn stats(&self, ctx: &RequestContext) -> EngineResult<serde_json::Value> {
        let store = self.event_store.statistics(ctx).await?;
        let snapshots = self.snapshots.statistics().await;
        let subscriptions = self.bus.subscriptions().await;
        Ok(json!({
            "store": store,
            "snapshots": snapshots,
            "subscriptions": subscriptions,
        }))
    }

    async fn projections(&self) -> EngineResult<serde_json::Value> {
        let cursors = self.projections.cursors().await;
        Ok(json!({"projections": cursors}))
    }

    async fn rebuild_projection(
        &self,
        ctx: &RequestContext,
        request: ProjectionRequest,
    ) -> EngineResult<serde_json::Value> {
        self.projections.rebuild(ctx, &request.name).await?;
        let cursor = self.projections.cursor(&request.name).await?;
        Ok(json!({"rebuilt": request.name, "cursor": cursor}))
    }

    async fn retry_projection(
        &self,
        ctx: &RequestContext,
        request: ProjectionRequest,
    ) -> EngineResult<serde_json::Value> {
        self.projections.retry(ctx, &request.name).await?;
        Ok(json!({"retried": request.name}))
    }
}

impl RpcHandler for EngineAdminRpc {
    fn methods(self: Arc<Self>) -> Vec<RpcMethod> {
        vec![
            RpcMethod::nullary("Stats", &self, |h, ctx| async move { h.stats(&ctx).await }),
            RpcMethod::nullary("Projections", &self, |h, _ctx| async move {
                h.projections().await
            }),
            RpcMethod::unary(
                "RebuildProjection",
                &self,
                |h, ctx, req: ProjectionRequest| async move {
                    h.rebuild_projection(&ctx, req).await
                },
            ),
            RpcMethod::unary(
                "RetryProjection",
                &self,
                |h, ctx, req: ProjectionRequest| async move {
                    h.retry_projection(&ctx, req).await
                },
            ),
        ]
    }
}

/// Register the operator methods under the `engine` prefix.
pub fn register_admin(runtime: &Arc<EngineRuntime>) -> EngineResult<()> {
    runtime.rpc.register_handler(
        "engine",
        &Arc::new(EngineAdminRpc::new(runtime)),
        RegisterOptions::new(),
    )
}
