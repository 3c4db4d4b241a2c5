// File: src/projection/mod.rs
//
// Projections: event-driven maintenance of read models with per-projection
// cursors, error freezing, and full rebuild from the event log

pub mod engine;

pub use engine::ProjectionEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::event::EventEnvelope;
use crate::read::ReadStore;

/// Reserved read-model type holding projection cursors.
pub const PROJECTION_CURSOR_TYPE: &str = "__projection_cursor";

/// Lifecycle state of one projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionStatus {
    Stopped,
    Running,
    Rebuilding,
    Error,
}

/// A projection's position in the global event stream, persisted in the read
/// store under [`PROJECTION_CURSOR_TYPE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionCursor {
    pub projection: String,
    pub position: i64,
    pub events_processed: u64,
    pub error_count: u64,
    pub status: ProjectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ProjectionCursor {
    pub fn new(projection: impl Into<String>) -> Self {
        Self {
            projection: projection.into(),
            position: 0,
            events_processed: 0,
            error_count: 0,
            status: ProjectionStatus::Stopped,
            last_error: None,
        }
    }
}

/// One read-model maintainer.
///
/// `apply` must be a deterministic function of the event and the read store
/// contents it derived from earlier events; rebuild correctness depends on
/// it. `reset` erases every read model the projection owns.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    /// Event type names consumed, or `["*"]` for all.
    fn event_types(&self) -> Vec<String>;

    async fn apply(
        &self,
        ctx: &RequestContext,
        event: &EventEnvelope,
        reads: &dyn ReadStore,
    ) -> EngineResult<()>;

    async fn reset(&self, ctx: &RequestContext, reads: &dyn ReadStore) -> EngineResult<()>;
}
