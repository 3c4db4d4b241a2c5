//! # Defense Engine Core
//!
//! Server-side CQRS + event-sourcing runtime for the cooperative
//! tower-defense backend. The crate provides:
//!
//! - **Aggregates & events** — the event envelope, the aggregate base with
//!   its uncommitted-change buffer, and the repository that loads from
//!   snapshot + event tail and saves under optimistic concurrency
//!   ([`aggregate`], [`event`]).
//! - **Snapshotting** — pluggable codecs (JSON compact/pretty, gzip/lz4
//!   wrapped), pluggable policies (event-count, version-interval, time,
//!   composite, adaptive), a retention-pruning store, and the manager that
//!   orchestrates them ([`snapshot`]).
//! - **Dispatch** — command and query registries routing type names to their
//!   single handler ([`command`], [`query`]), and the RPC dispatcher exposing
//!   plain async methods under dotted names with JSON-array/object parameter
//!   decoding and introspection ([`rpc`]).
//! - **Projections** — the event bus ([`bus`]), read store ([`read`]), and
//!   projection engine with per-projection cursors, error freezing, and full
//!   rebuild ([`projection`]).
//!
//! Everything is assembled explicitly through
//! [`runtime::EngineRuntimeBuilder`]; there are no global registries. Every
//! exposed operation takes a [`context::RequestContext`] carrying
//! cancellation and the caller's deadline.

pub mod aggregate;
pub mod bus;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod projection;
pub mod query;
pub mod read;
pub mod rpc;
pub mod runtime;
pub mod snapshot;
pub mod telemetry;

pub use aggregate::{Aggregate, AggregateBase, AggregateRepository};
pub use bus::{EventBus, EventHandler, SubscriberKind};
pub use command::{CommandEnvelope, CommandHandler, CommandRegistry};
pub use config::EngineConfig;
pub use context::RequestContext;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use event::{DomainEvent, EventEnvelope, EventMetadata, EventStore, InMemoryEventStore};
pub use projection::{Projection, ProjectionCursor, ProjectionEngine, ProjectionStatus};
pub use query::{QueryEnvelope, QueryHandler, QueryRegistry};
pub use read::{InMemoryReadStore, QueryCriteria, ReadModelRecord, ReadStore, ReadStoreExt};
pub use rpc::{MethodDescriptor, RegisterOptions, RpcHandler, RpcMethod, RpcParams, RpcRegistry};
pub use runtime::{EngineRuntime, EngineRuntimeBuilder};
pub use snapshot::{Snapshot, SnapshotManager};
pub use telemetry::{TelemetryEvent, TelemetrySink};
