// File: src/event/mod.rs
//
// Event envelope and domain-event contract for the event-sourcing core

pub mod store;

pub use store::{EventStore, EventStoreStatistics, EventStream, InMemoryEventStore,
    EXPECTED_VERSION_ANY};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};

/// A domain event: one variant of an aggregate's closed event union.
///
/// Implementations are plain serde enums; `event_type` returns the stable
/// name under which the variant is persisted and routed.
pub trait DomainEvent: Clone + Send + Sync + Serialize + DeserializeOwned {
    fn event_type(&self) -> &'static str;
}

/// Metadata attached to every persisted event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    /// Component that produced the event (transport, command handler, test).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form routing and diagnostic entries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, serde_json::Value>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Immutable envelope wrapping one domain event.
///
/// For a given aggregate id, `aggregate_version` values are dense and
/// strictly increasing from 1. `global_position` is 0 until the store assigns
/// the monotonic append position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub aggregate_version: i64,
    #[serde(default)]
    pub global_position: i64,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub causation_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
}

impl EventEnvelope {
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_version: i64,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            aggregate_version,
            global_position: 0,
            payload,
            metadata: EventMetadata::default(),
            occurred_at: now,
            recorded_at: now,
            causation_id: None,
            correlation_id: None,
        }
    }

    /// Wrap a typed domain event at the given aggregate version.
    pub fn from_domain<E: DomainEvent>(
        aggregate_id: Uuid,
        aggregate_type: &str,
        aggregate_version: i64,
        event: &E,
    ) -> EngineResult<Self> {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            event.event_type(),
            aggregate_version,
            payload,
        ))
    }

    /// Stamp correlation/causation ids from the calling context.
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.correlation_id = Some(ctx.correlation_id());
        self.causation_id = ctx.causation_id();
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Decode the payload back into the aggregate's event union.
    pub fn decode<E: DomainEvent>(&self) -> EngineResult<E> {
        serde_json::from_value(self.payload.clone()).map_err(|e| EngineError::Serialization {
            message: format!(
                "failed to decode '{}' event for aggregate {}: {}",
                self.event_type, self.aggregate_id, e
            ),
        })
    }
}
