// File: src/context.rs
//
// Cancellation and deadline context carried by every exposed operation

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Per-request context: cancellation token, optional deadline, and the
/// correlation/causation ids that flow into persisted events.
///
/// Stores and dispatchers call [`RequestContext::ensure_active`] at their
/// suspension points; transports construct the context with the configured
/// default deadline and propagate it unchanged to handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: Uuid,
    causation_id: Option<Uuid>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    timeout_ms: u64,
}

impl RequestContext {
    /// Context with no deadline, used by background workers.
    pub fn background() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            cancellation: CancellationToken::new(),
            deadline: None,
            timeout_ms: 0,
        }
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut ctx = Self::background();
        ctx.deadline = Some(Instant::now() + timeout);
        ctx.timeout_ms = timeout.as_millis() as u64;
        ctx
    }

    /// Child context sharing the deadline; cancelling the parent cancels the
    /// child, not the other way around.
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            cancellation: self.cancellation.child_token(),
            deadline: self.deadline,
            timeout_ms: self.timeout_ms,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn causation_id(&self) -> Option<Uuid> {
        self.causation_id
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Remaining time before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Token for driving `tokio::select!` against long waits.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Errors with `Cancelled` or `Timeout` when the context is no longer
    /// live; called at every blocking point.
    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout {
                    timeout_ms: self.timeout_ms,
                });
            }
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
