//! Error handling for the defense engine core.
//!
//! All fallible operations in the runtime return [`EngineResult`]. The
//! [`EngineError`] enum is the single error type crossing subsystem
//! boundaries; its [`ErrorKind`] projection is the taxonomy tag carried on
//! the wire in JSON-RPC `error.data.kind`.

pub mod types;

pub use types::{EngineError, EngineResult, ErrorKind};
