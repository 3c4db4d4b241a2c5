// File: src/read/registry.rs
//
// Startup registration of read-model types with a decode-check per type

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::error::{EngineError, EngineResult};

type DecodeCheck = Arc<dyn Fn(&serde_json::Value) -> EngineResult<()> + Send + Sync>;

/// Registry of read-model types known to the runtime.
///
/// Each type registers a decode-check derived from its Rust shape; the store
/// consults it on save so a projection bug cannot persist bodies the query
/// side can no longer decode. Registration happens at startup; lookups are
/// lock-free reads in practice.
#[derive(Default)]
pub struct ReadModelRegistry {
    factories: RwLock<HashMap<String, DecodeCheck>>,
}

impl ReadModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model_type` as decoding into `T`.
    pub fn register<T: DeserializeOwned + 'static>(&self, model_type: &str) -> EngineResult<()> {
        let mut factories = self.factories.write().expect("registry lock poisoned");
        if factories.contains_key(model_type) {
            return Err(EngineError::configuration(format!(
                "read model type '{}' is already registered",
                model_type
            )));
        }
        let check: DecodeCheck = Arc::new(|body| {
            serde_json::from_value::<T>(body.clone())
                .map(|_| ())
                .map_err(|e| EngineError::validation(format!("read model body rejected: {}", e)))
        });
        factories.insert(model_type.to_string(), check);
        Ok(())
    }

    pub fn is_registered(&self, model_type: &str) -> bool {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .contains_key(model_type)
    }

    /// Validate a body against the registered shape. Unregistered types are
    /// rejected so every persisted type went through startup registration.
    pub fn validate(&self, model_type: &str, body: &serde_json::Value) -> EngineResult<()> {
        let factories = self.factories.read().expect("registry lock poisoned");
        match factories.get(model_type) {
            Some(check) => check(body),
            None => Err(EngineError::validation(format!(
                "read model type '{}' is not registered",
                model_type
            ))),
        }
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}
