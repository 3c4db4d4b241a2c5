// File: src/error/types.rs
//
// Error taxonomy for the CQRS + event-sourcing runtime

use serde::Serialize;
use uuid::Uuid;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Primary error type for all engine operations.
///
/// Each variant carries the context needed to act on the failure: conflicts
/// carry both versions so command handlers can reload and retry, dispatch
/// misses carry the unresolved name, and storage/serialization failures carry
/// the underlying message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Command payload or query criteria malformed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// Load against an aggregate id with no events and no snapshot.
    #[error("Aggregate not found: {aggregate_id}")]
    AggregateNotFound {
        aggregate_id: Uuid,
    },

    /// Save with an expected version that no longer matches the store.
    ///
    /// The caller may reload the aggregate and retry; the repository never
    /// retries on its own.
    #[error("Version conflict for aggregate {aggregate_id}: expected {expected}, stored {actual}")]
    VersionConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// The RPC dispatcher could not resolve a dotted method name.
    #[error("Method not found: {method}")]
    MethodNotFound {
        method: String,
    },

    /// The query dispatcher could not resolve a query type name.
    #[error("Query not found: {query}")]
    QueryNotFound {
        query: String,
    },

    /// Parameters could not be decoded into the descriptor's types, or the
    /// element count did not match the parameter count.
    #[error("Invalid params: {message}")]
    InvalidParams {
        message: String,
    },

    /// A projection callback failed; the cursor is frozen until an operator
    /// retries or rebuilds.
    #[error("Projection '{projection}' error: {message}")]
    Projection {
        projection: String,
        message: String,
    },

    /// Snapshot encode or store failed. Never fails the owning save.
    #[error("Snapshot error: {message}")]
    Snapshot {
        message: String,
    },

    /// Framing or HTTP-level failure.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
    },

    /// Failed to convert between wire/storage representations and types.
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    /// Backing-store I/O failure.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    /// Invalid runtime wiring: duplicate registration, missing codec, bad env.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
    },

    /// The caller's cancellation context was triggered.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline elapsed.
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
    },

    /// Any uncategorized failure.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

/// Wire-level taxonomy tag, carried in JSON-RPC `error.data.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    AggregateNotFound,
    VersionConflict,
    MethodNotFound,
    QueryNotFound,
    InvalidParams,
    ProjectionError,
    SnapshotError,
    TransportError,
    Internal,
    Cancelled,
    Timeout,
}

impl ErrorKind {
    /// Stable string form, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AggregateNotFound => "aggregate-not-found",
            ErrorKind::VersionConflict => "version-conflict",
            ErrorKind::MethodNotFound => "method-not-found",
            ErrorKind::QueryNotFound => "query-not-found",
            ErrorKind::InvalidParams => "invalid-params",
            ErrorKind::ProjectionError => "projection-error",
            ErrorKind::SnapshotError => "snapshot-error",
            ErrorKind::TransportError => "transport-error",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl EngineError {
    /// Taxonomy tag for this error.
    ///
    /// Serialization, storage, and configuration failures are not part of the
    /// public taxonomy and surface as `internal`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation { .. } => ErrorKind::Validation,
            EngineError::AggregateNotFound { .. } => ErrorKind::AggregateNotFound,
            EngineError::VersionConflict { .. } => ErrorKind::VersionConflict,
            EngineError::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            EngineError::QueryNotFound { .. } => ErrorKind::QueryNotFound,
            EngineError::InvalidParams { .. } => ErrorKind::InvalidParams,
            EngineError::Projection { .. } => ErrorKind::ProjectionError,
            EngineError::Snapshot { .. } => ErrorKind::SnapshotError,
            EngineError::Transport { .. } => ErrorKind::TransportError,
            EngineError::Serialization { .. }
            | EngineError::Storage { .. }
            | EngineError::Configuration { .. }
            | EngineError::Internal { .. } => ErrorKind::Internal,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// True when the failure is shaped by the caller's input rather than the
    /// server's state. Transports map these to 4xx statuses.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::AggregateNotFound
                | ErrorKind::VersionConflict
                | ErrorKind::MethodNotFound
                | ErrorKind::QueryNotFound
                | ErrorKind::InvalidParams
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation { message: message.into() }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        EngineError::InvalidParams { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        EngineError::Storage { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal { message: message.into() }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization {
            message: error.to_string(),
        }
    }
}
