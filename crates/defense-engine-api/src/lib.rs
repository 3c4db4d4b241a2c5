//! # Defense Engine API
//!
//! Transport adapters over the core runtime:
//!
//! - JSON-RPC 2.0 over HTTP POST at `/rpc`, with spec-standard error codes
//!   and an application range carrying the engine's error taxonomy.
//! - Per-method REST (`POST /rpc/method/{dotted.name}`, `POST /rpc/call`)
//!   and introspection (`GET /rpc/methods`, `GET /rpc/info/{dotted.name}`).
//! - SSE fan-out at `GET /events/subscribe`, one filtered bus subscription
//!   per client.
//! - Health and Prometheus metrics endpoints.
//!
//! The crate also provides the PostgreSQL-backed event and snapshot stores
//! (diesel + r2d2) and the bootstrap glue assembling a runtime from
//! configuration.

pub mod api;
pub mod bootstrap;
pub mod db;
pub mod monitoring;
