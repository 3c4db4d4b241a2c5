// File: src/command/mod.rs
//
// Command envelope, handler contract, and the startup-time registry routing
// command type names to their single handler

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};

/// Bounded conflict-retry default used by handlers that opt in.
pub const DEFAULT_CONFLICT_RETRIES: usize = 3;

/// An imperative request to attempt a state transition. Transient: never
/// persisted, only its resulting events are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Version the issuer believes the aggregate holds; `None` lets the
    /// handler derive it from the loaded aggregate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

impl CommandEnvelope {
    pub fn new(
        command_type: impl Into<String>,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            command_type: command_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
            causation_id: None,
            correlation_id: None,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Decode the payload into the handler's typed command shape.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> EngineResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            EngineError::validation(format!(
                "malformed '{}' command payload: {}",
                self.command_type, e
            ))
        })
    }
}

/// Handles one command type: load or construct the aggregate, invoke domain
/// methods, save through the repository. Handlers translate version
/// conflicts into a retry or surface them; the registry never retries.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value>;
}

/// Maps each command type name to exactly one handler.
///
/// Registration happens at startup and takes a short write lock, per the
/// registration-time-only locking rule; dispatch afterwards is read-only.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: std::sync::RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        command_type: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> EngineResult<()> {
        let command_type = command_type.into();
        let mut handlers = self.handlers.write().expect("registry lock poisoned");
        if handlers.contains_key(&command_type) {
            return Err(EngineError::configuration(format!(
                "command '{}' already has a handler",
                command_type
            )));
        }
        handlers.insert(command_type, handler);
        Ok(())
    }

    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        ctx.ensure_active()?;
        let handler = {
            let handlers = self.handlers.read().expect("registry lock poisoned");
            handlers
                .get(&command.command_type)
                .cloned()
                .ok_or_else(|| EngineError::MethodNotFound {
                    method: command.command_type.clone(),
                })?
        };
        handler.handle(ctx, command).await
    }

    pub fn command_types(&self) -> Vec<String> {
        let handlers = self.handlers.read().expect("registry lock poisoned");
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Re-run `op` on version conflict, up to `max_attempts` total attempts.
///
/// The closure reloads the aggregate itself, so every attempt sees fresh
/// state. Any error other than a conflict passes straight through.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: usize, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Err(EngineError::VersionConflict { aggregate_id, expected, actual })
                if attempt + 1 < attempts =>
            {
                attempt += 1;
                tracing::debug!(
                    %aggregate_id,
                    expected,
                    actual,
                    attempt,
                    "version conflict, reloading and retrying"
                );
            }
            other => return other,
        }
    }
}
