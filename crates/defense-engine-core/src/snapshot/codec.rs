// File: src/snapshot/codec.rs
//
// Snapshot codecs: structured-text encoding plus generic compression
// wrapping, resolved by name through an explicitly constructed registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::snapshot::compression::{CompressionType, Compressor, GzipCompressor, Lz4Compressor};

/// Encodes aggregate snapshot state to bytes and back.
///
/// Codecs are looked up by `name` when restoring, so names must stay stable
/// across releases; `codec_version` exists to allow an implementation to
/// evolve its byte layout behind the same name.
pub trait SnapshotCodec: Send + Sync {
    fn name(&self) -> &str;

    fn codec_version(&self) -> u32 {
        1
    }

    fn content_type(&self) -> &str;

    fn compression(&self) -> CompressionType {
        CompressionType::None
    }

    fn encode(&self, state: &serde_json::Value) -> EngineResult<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> EngineResult<serde_json::Value>;
}

/// JSON snapshot codec, compact by default with a pretty option.
pub struct JsonCodec {
    name: &'static str,
    pretty: bool,
}

impl JsonCodec {
    pub fn compact() -> Self {
        Self { name: "json", pretty: false }
    }

    pub fn pretty() -> Self {
        Self { name: "json-pretty", pretty: true }
    }
}

impl SnapshotCodec for JsonCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, state: &serde_json::Value) -> EngineResult<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(state)
        } else {
            serde_json::to_vec(state)
        };
        bytes.map_err(|e| EngineError::Snapshot {
            message: format!("json encode failed: {}", e),
        })
    }

    fn decode(&self, data: &[u8]) -> EngineResult<serde_json::Value> {
        serde_json::from_slice(data).map_err(|e| EngineError::Snapshot {
            message: format!("json decode failed: {}", e),
        })
    }
}

/// Wraps any codec with stream compression; the registry name is
/// `"{inner}+{compression}"` (e.g. `json+gzip`).
pub struct CompressedCodec {
    name: String,
    inner: Arc<dyn SnapshotCodec>,
    compressor: Arc<dyn Compressor>,
}

impl CompressedCodec {
    pub fn new(inner: Arc<dyn SnapshotCodec>, compressor: Arc<dyn Compressor>) -> Self {
        let name = format!("{}+{}", inner.name(), compressor.compression_type());
        Self { name, inner, compressor }
    }
}

impl SnapshotCodec for CompressedCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn codec_version(&self) -> u32 {
        self.inner.codec_version()
    }

    fn content_type(&self) -> &str {
        self.inner.content_type()
    }

    fn compression(&self) -> CompressionType {
        self.compressor.compression_type()
    }

    fn encode(&self, state: &serde_json::Value) -> EngineResult<Vec<u8>> {
        let encoded = self.inner.encode(state)?;
        self.compressor.compress(&encoded)
    }

    fn decode(&self, data: &[u8]) -> EngineResult<serde_json::Value> {
        let decompressed = self.compressor.decompress(data)?;
        self.inner.decode(&decompressed)
    }
}

/// Registry of snapshot codecs, constructed explicitly at startup and
/// read-only afterwards. At least one codec is always registered and one is
/// designated the default for new snapshots.
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn SnapshotCodec>>,
    default_name: String,
}

impl CodecRegistry {
    /// Registry seeded with a single codec which becomes the default.
    pub fn new(default_codec: Arc<dyn SnapshotCodec>) -> Self {
        let default_name = default_codec.name().to_string();
        let mut codecs: HashMap<String, Arc<dyn SnapshotCodec>> = HashMap::new();
        codecs.insert(default_name.clone(), default_codec);
        Self { codecs, default_name }
    }

    /// The stock registry: compact and pretty JSON plus gzip/lz4 wrapped
    /// variants, with compact JSON as the default.
    pub fn standard() -> Self {
        let json: Arc<dyn SnapshotCodec> = Arc::new(JsonCodec::compact());
        let mut registry = Self::new(Arc::clone(&json));
        registry
            .register(Arc::new(JsonCodec::pretty()))
            .expect("fresh registry cannot hold duplicates");
        registry
            .register(Arc::new(CompressedCodec::new(
                Arc::clone(&json),
                Arc::new(GzipCompressor),
            )))
            .expect("fresh registry cannot hold duplicates");
        registry
            .register(Arc::new(CompressedCodec::new(json, Arc::new(Lz4Compressor))))
            .expect("fresh registry cannot hold duplicates");
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn SnapshotCodec>) -> EngineResult<()> {
        let name = codec.name().to_string();
        if self.codecs.contains_key(&name) {
            return Err(EngineError::configuration(format!(
                "snapshot codec '{}' is already registered",
                name
            )));
        }
        self.codecs.insert(name, codec);
        Ok(())
    }

    pub fn set_default(&mut self, name: &str) -> EngineResult<()> {
        if !self.codecs.contains_key(name) {
            return Err(EngineError::configuration(format!(
                "cannot default to unregistered codec '{}'",
                name
            )));
        }
        self.default_name = name.to_string();
        Ok(())
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn SnapshotCodec>> {
        self.codecs.get(name).cloned().ok_or_else(|| EngineError::Snapshot {
            message: format!("no codec registered under '{}'", name),
        })
    }

    pub fn default_codec(&self) -> Arc<dyn SnapshotCodec> {
        self.codecs
            .get(&self.default_name)
            .cloned()
            .expect("default codec is always registered")
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> serde_json::Value {
        json!({
            "towers": [{"id": "t1", "x": 3, "y": 4, "kind": "basic"}],
            "gold": 120,
            "wave": 7
        })
    }

    #[test]
    fn json_codecs_roundtrip() {
        for codec in [JsonCodec::compact(), JsonCodec::pretty()] {
            let state = sample_state();
            let bytes = codec.encode(&state).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), state);
        }
    }

    #[test]
    fn pretty_output_differs_from_compact() {
        let state = sample_state();
        let compact = JsonCodec::compact().encode(&state).unwrap();
        let pretty = JsonCodec::pretty().encode(&state).unwrap();
        assert_ne!(compact, pretty);
        assert!(pretty.len() > compact.len());
    }

    #[test]
    fn compressed_codecs_roundtrip() {
        let registry = CodecRegistry::standard();
        let state = sample_state();
        for name in ["json+gzip", "json+lz4"] {
            let codec = registry.get(name).unwrap();
            let bytes = codec.encode(&state).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), state, "codec {name}");
            assert_ne!(codec.compression(), CompressionType::None);
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CodecRegistry::standard();
        let err = registry.register(Arc::new(JsonCodec::compact())).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn standard_registry_defaults_to_compact_json() {
        let registry = CodecRegistry::standard();
        assert_eq!(registry.default_codec().name(), "json");
        assert_eq!(
            registry.names(),
            vec!["json", "json+gzip", "json+lz4", "json-pretty"]
        );
    }

    #[test]
    fn unknown_codec_is_a_snapshot_error() {
        let registry = CodecRegistry::standard();
        assert!(matches!(
            registry.get("cbor"),
            Err(EngineError::Snapshot { .. })
        ));
    }
}
