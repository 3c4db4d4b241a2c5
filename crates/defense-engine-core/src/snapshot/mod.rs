// File: src/snapshot/mod.rs
//
// Snapshotting subsystem: codecs, policies, persistence, and the manager
// orchestrating them

pub mod codec;
pub mod compression;
pub mod manager;
pub mod policy;
pub mod store;

pub use codec::{CodecRegistry, CompressedCodec, JsonCodec, SnapshotCodec};
pub use compression::{CompressionType, Compressor, GzipCompressor, Lz4Compressor};
pub use manager::{SnapshotManager, SnapshotStatistics};
pub use policy::{
    AdaptivePolicy, AlwaysPolicy, CompositeOp, CompositePolicy, EventCountPolicy, NeverPolicy,
    SnapshotPolicy, TimeBasedPolicy, VersionIntervalPolicy,
};
pub use store::{InMemorySnapshotStore, SnapshotStore};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time materialization of one aggregate's state.
///
/// The body is opaque to the store: only the codec named in `codec` can
/// decode it. `aggregate_version` equals the aggregate's version at capture,
/// so a snapshot at version v restores correctly iff the event store holds
/// events [v+1 ..].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub aggregate_version: i64,
    pub codec: String,
    pub compression: String,
    #[serde(with = "base64_bytes")]
    pub state: Vec<u8>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        aggregate_version: i64,
        codec: impl Into<String>,
        compression: impl Into<String>,
        state: Vec<u8>,
    ) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            aggregate_version,
            codec: codec.into(),
            compression: compression.into(),
            state,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Base64 transport for the opaque encoded body; raw byte arrays in JSON
/// would be both bloated and unreadable.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serde_roundtrips_binary_state() {
        let snapshot = Snapshot::new(
            Uuid::new_v4(),
            "game",
            12,
            "json+gzip",
            "gzip",
            vec![0x1f, 0x8b, 0x00, 0xff],
        )
        .with_metadata("checksum", serde_json::Value::String("abc".into()));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["state"].is_string());

        let decoded: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.state, snapshot.state);
        assert_eq!(decoded.aggregate_version, 12);
        assert_eq!(decoded.codec, "json+gzip");
    }
}
