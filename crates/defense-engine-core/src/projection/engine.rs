// File: src/projection/engine.rs
//
// Projection engine: subscribes registered projections to the bus, advances
// cursors after successful callbacks, freezes on failure, rebuilds on demand

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::bus::{EventBus, EventHandler, SubscriberKind};
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::event::{EventEnvelope, EventStore};
use crate::projection::{Projection, ProjectionCursor, ProjectionStatus, PROJECTION_CURSOR_TYPE};
use crate::read::{ReadModelRecord, ReadStore};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

struct ProjectionEntry {
    projection: Arc<dyn Projection>,
    subscription: Option<Uuid>,
    // Authoritative cursor; the read store carries the persisted copy.
    cursor: Arc<Mutex<ProjectionCursor>>,
}

struct EngineInner {
    bus: Arc<EventBus>,
    event_store: Arc<dyn EventStore>,
    reads: Arc<dyn ReadStore>,
    telemetry: TelemetrySink,
    projections: RwLock<HashMap<String, ProjectionEntry>>,
}

/// Drives every registered projection from the event bus and owns the
/// rebuild path.
pub struct ProjectionEngine {
    inner: Arc<EngineInner>,
}

impl ProjectionEngine {
    pub fn new(
        bus: Arc<EventBus>,
        event_store: Arc<dyn EventStore>,
        reads: Arc<dyn ReadStore>,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                bus,
                event_store,
                reads,
                telemetry,
                projections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a projection. Duplicate names are a configuration error.
    pub async fn register(&self, projection: Arc<dyn Projection>) -> EngineResult<()> {
        let name = projection.name().to_string();
        let mut projections = self.inner.projections.write().await;
        if projections.contains_key(&name) {
            return Err(EngineError::configuration(format!(
                "projection '{}' is already registered",
                name
            )));
        }
        projections.insert(
            name.clone(),
            ProjectionEntry {
                projection,
                subscription: None,
                cursor: Arc::new(Mutex::new(ProjectionCursor::new(name))),
            },
        );
        Ok(())
    }

    /// Load persisted cursors and subscribe every projection to the bus.
    pub async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        let names: Vec<String> = {
            let projections = self.inner.projections.read().await;
            projections.keys().cloned().collect()
        };

        for name in names {
            let (event_types, cursor_handle) = {
                let projections = self.inner.projections.read().await;
                let entry = projections.get(&name).expect("registered above");
                (entry.projection.event_types(), Arc::clone(&entry.cursor))
            };

            {
                let mut cursor = cursor_handle.lock().await;
                if let Some(persisted) = self.inner.load_cursor(ctx, &name).await? {
                    *cursor = persisted;
                }
                // A projection frozen in `error` stays frozen across restarts
                // until an operator retries or rebuilds it.
                if cursor.status != ProjectionStatus::Error {
                    cursor.status = ProjectionStatus::Running;
                }
                self.inner.persist_cursor(ctx, &cursor).await?;
            }

            let subscriber = Arc::new(ProjectionSubscriber {
                name: name.clone(),
                inner: Arc::clone(&self.inner),
            });
            let subscription = self.inner.bus.subscribe(event_types, subscriber).await;

            let mut projections = self.inner.projections.write().await;
            if let Some(entry) = projections.get_mut(&name) {
                entry.subscription = Some(subscription);
            }
        }
        Ok(())
    }

    /// Unsubscribe everything and mark cursors stopped.
    pub async fn stop(&self, ctx: &RequestContext) -> EngineResult<()> {
        let mut projections = self.inner.projections.write().await;
        for entry in projections.values_mut() {
            if let Some(subscription) = entry.subscription.take() {
                self.inner.bus.unsubscribe(subscription).await;
            }
            let mut cursor = entry.cursor.lock().await;
            if cursor.status == ProjectionStatus::Running {
                cursor.status = ProjectionStatus::Stopped;
                self.inner.persist_cursor(ctx, &cursor).await?;
            }
        }
        Ok(())
    }

    /// Clear an error freeze without touching read models or the cursor
    /// position; delivery resumes with the next event.
    pub async fn retry(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        let cursor_handle = self.inner.cursor_handle(name).await?;
        let mut cursor = cursor_handle.lock().await;
        if cursor.status != ProjectionStatus::Error {
            return Err(EngineError::validation(format!(
                "projection '{}' is not in error state",
                name
            )));
        }
        cursor.status = ProjectionStatus::Running;
        cursor.last_error = None;
        self.inner.persist_cursor(ctx, &cursor).await
    }

    /// Rebuild a projection from position zero.
    ///
    /// Deletes its read models, replays the full log with cursor advance
    /// disabled, then sets the cursor to the last observed position and
    /// returns the projection to `running`. Rebuilds of distinct projections
    /// may run concurrently.
    pub async fn rebuild(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        let (projection, cursor_handle) = {
            let projections = self.inner.projections.read().await;
            let entry = projections
                .get(name)
                .ok_or_else(|| EngineError::configuration(format!(
                    "projection '{}' is not registered",
                    name
                )))?;
            (Arc::clone(&entry.projection), Arc::clone(&entry.cursor))
        };

        {
            let mut cursor = cursor_handle.lock().await;
            cursor.status = ProjectionStatus::Rebuilding;
            self.inner.persist_cursor(ctx, &cursor).await?;
        }

        let result = self
            .replay_from_scratch(ctx, &projection, &cursor_handle)
            .await;

        let mut cursor = cursor_handle.lock().await;
        match result {
            Ok((position, processed)) => {
                cursor.position = position;
                cursor.events_processed = processed;
                cursor.error_count = 0;
                cursor.last_error = None;
                cursor.status = ProjectionStatus::Running;
                self.inner.persist_cursor(ctx, &cursor).await?;
                tracing::info!(projection = name, position, processed, "projection rebuilt");
                Ok(())
            }
            Err(error) => {
                cursor.status = ProjectionStatus::Error;
                cursor.error_count += 1;
                cursor.last_error = Some(error.to_string());
                self.inner.persist_cursor(ctx, &cursor).await?;
                Err(error)
            }
        }
    }

    pub async fn cursor(&self, name: &str) -> EngineResult<ProjectionCursor> {
        let cursor_handle = self.inner.cursor_handle(name).await?;
        let cursor = cursor_handle.lock().await;
        Ok(cursor.clone())
    }

    pub async fn cursors(&self) -> Vec<ProjectionCursor> {
        let projections = self.inner.projections.read().await;
        let mut cursors = Vec::with_capacity(projections.len());
        for entry in projections.values() {
            cursors.push(entry.cursor.lock().await.clone());
        }
        cursors.sort_by(|a, b| a.projection.cmp(&b.projection));
        cursors
    }

    async fn replay_from_scratch(
        &self,
        ctx: &RequestContext,
        projection: &Arc<dyn Projection>,
        _cursor: &Arc<Mutex<ProjectionCursor>>,
    ) -> EngineResult<(i64, u64)> {
        projection.reset(ctx, self.inner.reads.as_ref()).await?;

        let matcher = TypeMatcher::new(&projection.event_types());
        let mut last_position = 0i64;
        let mut processed = 0u64;

        // The stream is a point-in-time tail; drain repeatedly until no new
        // events arrived past the last observed position.
        loop {
            let mut stream = self.inner.event_store.all_events(ctx, last_position).await?;
            let mut saw_any = false;
            while let Some(event) = stream.try_next().await? {
                saw_any = true;
                last_position = event.global_position;
                if matcher.matches(&event) {
                    projection
                        .apply(ctx, &event, self.inner.reads.as_ref())
                        .await
                        .map_err(|e| EngineError::Projection {
                            projection: projection.name().to_string(),
                            message: e.to_string(),
                        })?;
                    processed += 1;
                }
            }
            if !saw_any {
                break;
            }
        }

        Ok((last_position, processed))
    }
}

impl EngineInner {
    async fn cursor_handle(&self, name: &str) -> EngineResult<Arc<Mutex<ProjectionCursor>>> {
        let projections = self.projections.read().await;
        projections
            .get(name)
            .map(|entry| Arc::clone(&entry.cursor))
            .ok_or_else(|| {
                EngineError::configuration(format!("projection '{}' is not registered", name))
            })
    }

    async fn load_cursor(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<Option<ProjectionCursor>> {
        match self.reads.get(ctx, PROJECTION_CURSOR_TYPE, name).await? {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    async fn persist_cursor(
        &self,
        ctx: &RequestContext,
        cursor: &ProjectionCursor,
    ) -> EngineResult<()> {
        let body = serde_json::to_value(cursor)?;
        self.reads
            .save(
                ctx,
                ReadModelRecord::new(PROJECTION_CURSOR_TYPE, cursor.projection.clone(), body)
                    .with_version(cursor.position),
            )
            .await
    }

    /// Bus delivery path for one projection.
    async fn process_event(
        &self,
        ctx: &RequestContext,
        name: &str,
        event: &EventEnvelope,
    ) -> EngineResult<()> {
        let (projection, cursor_handle) = {
            let projections = self.projections.read().await;
            let Some(entry) = projections.get(name) else {
                return Ok(());
            };
            (Arc::clone(&entry.projection), Arc::clone(&entry.cursor))
        };

        let mut cursor = cursor_handle.lock().await;
        match cursor.status {
            // Frozen or paused projections skip delivery until an operator
            // acts; rebuild replays the log itself.
            ProjectionStatus::Error | ProjectionStatus::Stopped | ProjectionStatus::Rebuilding => {
                return Ok(());
            }
            ProjectionStatus::Running => {}
        }

        // At-most-once: events at or below the cursor were already seen
        // (e.g. queued live events straddling a rebuild).
        if event.global_position != 0 && event.global_position <= cursor.position {
            return Ok(());
        }

        match projection.apply(ctx, event, self.reads.as_ref()).await {
            Ok(()) => {
                cursor.position = event.global_position;
                cursor.events_processed += 1;
                self.persist_cursor(ctx, &cursor).await?;
                Ok(())
            }
            Err(error) => {
                cursor.status = ProjectionStatus::Error;
                cursor.error_count += 1;
                cursor.last_error = Some(error.to_string());
                self.persist_cursor(ctx, &cursor).await?;
                self.telemetry.emit(TelemetryEvent::ProjectionFailed {
                    projection: name.to_string(),
                    event_type: event.event_type.clone(),
                    error: error.to_string(),
                });
                Err(EngineError::Projection {
                    projection: name.to_string(),
                    message: error.to_string(),
                })
            }
        }
    }
}

struct TypeMatcher {
    all: bool,
    types: Vec<String>,
}

impl TypeMatcher {
    fn new(event_types: &[String]) -> Self {
        Self {
            all: event_types.iter().any(|t| t == crate::bus::WILDCARD),
            types: event_types.to_vec(),
        }
    }

    fn matches(&self, event: &EventEnvelope) -> bool {
        self.all || self.types.iter().any(|t| t == &event.event_type)
    }
}

struct ProjectionSubscriber {
    name: String,
    inner: Arc<EngineInner>,
}

#[async_trait]
impl EventHandler for ProjectionSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SubscriberKind {
        SubscriberKind::Projection
    }

    async fn handle(&self, ctx: &RequestContext, event: &EventEnvelope) -> EngineResult<()> {
        self.inner.process_event(ctx, &self.name, event).await
    }
}
