//! Configuration management for the defense engine.
//!
//! Configuration is environment-only: a small set of variables selects the
//! transport bind address, the backing-store endpoint, and codec/snapshot
//! defaults. Tests construct [`EngineConfig`] values directly.

pub mod env_utils;

pub use env_utils::EnvLoader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Which event/snapshot store backend the runtime is assembled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Main configuration structure for the engine runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub snapshot: SnapshotSettings,
    pub bus: BusSettings,
    /// Default request deadline installed by transports, in seconds.
    pub request_timeout_secs: u64,
    /// Interval between SSE keep-alive comments, in seconds.
    pub sse_keepalive_secs: u64,
}

/// Snapshotting defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Codec name resolved against the codec registry.
    pub codec: String,
    /// Event-count threshold for the default snapshot policy.
    pub every_events: i64,
    /// Retention: at most this many snapshots per aggregate.
    pub max_per_aggregate: usize,
}

/// Event bus queue sizing and overflow behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    pub queue_capacity: usize,
    /// How long a publish may block on one full subscription queue before the
    /// subscription is dropped as slow.
    pub publish_timeout_ms: u64,
    /// Grace period for draining in-flight handlers on stop.
    pub shutdown_grace_ms: u64,
}

impl BusSettings {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            codec: "json".to_string(),
            every_events: 100,
            max_per_aggregate: 5,
        }
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            publish_timeout_ms: 5_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            database_url: None,
            snapshot: SnapshotSettings::default(),
            bus: BusSettings::default(),
            request_timeout_secs: 30,
            sse_keepalive_secs: 15,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> EngineResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: EnvLoader::load_with_default("DEFENSE_HOST", defaults.host)?,
            port: EnvLoader::load_with_default("DEFENSE_PORT", defaults.port)?,
            store_backend: EnvLoader::load_with_default(
                "EVENT_STORE_BACKEND",
                defaults.store_backend,
            )?,
            database_url: EnvLoader::load_optional("DATABASE_URL")?,
            snapshot: SnapshotSettings {
                codec: EnvLoader::load_with_default("SNAPSHOT_CODEC", defaults.snapshot.codec)?,
                every_events: EnvLoader::load_with_default(
                    "SNAPSHOT_EVERY",
                    defaults.snapshot.every_events,
                )?,
                max_per_aggregate: EnvLoader::load_with_default(
                    "SNAPSHOT_KEEP",
                    defaults.snapshot.max_per_aggregate,
                )?,
            },
            bus: BusSettings {
                queue_capacity: EnvLoader::load_with_default(
                    "BUS_QUEUE_CAPACITY",
                    defaults.bus.queue_capacity,
                )?,
                publish_timeout_ms: EnvLoader::load_with_default(
                    "BUS_PUBLISH_TIMEOUT_MS",
                    defaults.bus.publish_timeout_ms,
                )?,
                shutdown_grace_ms: EnvLoader::load_with_default(
                    "BUS_SHUTDOWN_GRACE_MS",
                    defaults.bus.shutdown_grace_ms,
                )?,
            },
            request_timeout_secs: EnvLoader::load_with_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            sse_keepalive_secs: EnvLoader::load_with_default(
                "SSE_KEEPALIVE_SECS",
                defaults.sse_keepalive_secs,
            )?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> EngineResult<()> {
        use crate::error::EngineError;

        if self.store_backend == StoreBackend::Postgres && self.database_url.is_none() {
            return Err(EngineError::configuration(
                "EVENT_STORE_BACKEND=postgres requires DATABASE_URL",
            ));
        }
        if self.snapshot.every_events <= 0 {
            return Err(EngineError::configuration(
                "SNAPSHOT_EVERY must be positive",
            ));
        }
        if self.snapshot.max_per_aggregate == 0 {
            return Err(EngineError::configuration("SNAPSHOT_KEEP must be at least 1"));
        }
        if self.bus.queue_capacity == 0 {
            return Err(EngineError::configuration(
                "BUS_QUEUE_CAPACITY must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.snapshot.codec, "json");
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let config = EngineConfig {
            store_backend: StoreBackend::Postgres,
            database_url: None,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_backend_parses_aliases() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(
            "postgresql".parse::<StoreBackend>().unwrap(),
            StoreBackend::Postgres
        );
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }
}
