//! PostgreSQL-backed stores implementing the core persistence traits.

pub mod event_store;
pub mod schema;
pub mod session;
pub mod snapshot_store;

pub use event_store::PostgresEventStore;
pub use session::{init_pool, DbPool};
pub use snapshot_store::PostgresSnapshotStore;
