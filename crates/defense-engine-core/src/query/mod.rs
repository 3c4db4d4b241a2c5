// File: src/query/mod.rs
//
// Query envelope and the thin router mapping query type names to read-model
// accessors

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::read::{FilterPredicate, QueryCriteria, SortDirection};

/// A read-only request served from read models. Transient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub query_type: String,
    #[serde(default)]
    pub filters: HashMap<String, FilterPredicate>,
    #[serde(default)]
    pub sort: Vec<(String, SortDirection)>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryEnvelope {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            filters: HashMap::new(),
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, predicate: FilterPredicate) -> Self {
        self.filters.insert(field.into(), predicate);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Lower the envelope onto read-store criteria for `model_type`.
    pub fn criteria(&self, model_type: impl Into<String>) -> QueryCriteria {
        QueryCriteria {
            model_type: model_type.into(),
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// Serves one query type from the read store.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value>;
}

/// Thin router from query type names to handlers; no caching, no joins.
/// Registration locks briefly at startup; dispatch is read-only.
#[derive(Default)]
pub struct QueryRegistry {
    handlers: std::sync::RwLock<HashMap<String, Arc<dyn QueryHandler>>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        query_type: impl Into<String>,
        handler: Arc<dyn QueryHandler>,
    ) -> EngineResult<()> {
        let query_type = query_type.into();
        let mut handlers = self.handlers.write().expect("registry lock poisoned");
        if handlers.contains_key(&query_type) {
            return Err(EngineError::configuration(format!(
                "query '{}' already has a handler",
                query_type
            )));
        }
        handlers.insert(query_type, handler);
        Ok(())
    }

    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value> {
        ctx.ensure_active()?;
        let handler = {
            let handlers = self.handlers.read().expect("registry lock poisoned");
            handlers
                .get(&query.query_type)
                .cloned()
                .ok_or_else(|| EngineError::QueryNotFound {
                    query: query.query_type.clone(),
                })?
        };
        handler.handle(ctx, query).await
    }

    pub fn query_types(&self) -> Vec<String> {
        let handlers = self.handlers.read().expect("registry lock poisoned");
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedAnswer;

    #[async_trait]
    impl QueryHandler for FixedAnswer {
        async fn handle(
            &self,
            _ctx: &RequestContext,
            query: QueryEnvelope,
        ) -> EngineResult<serde_json::Value> {
            Ok(json!({"query": query.query_type, "offset": query.offset}))
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_name() {
        let registry = QueryRegistry::new();
        registry.register("GetGameById", Arc::new(FixedAnswer)).unwrap();

        let ctx = RequestContext::background();
        let result = registry
            .dispatch(&ctx, QueryEnvelope::new("GetGameById").offset(5))
            .await
            .unwrap();
        assert_eq!(result["offset"], 5);
    }

    #[tokio::test]
    async fn unknown_query_type_errors() {
        let registry = QueryRegistry::new();
        let ctx = RequestContext::background();
        let err = registry
            .dispatch(&ctx, QueryEnvelope::new("Nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QueryNotFound { .. }));
    }

    #[test]
    fn envelope_lowers_to_criteria() {
        let envelope = QueryEnvelope::new("ListGames")
            .filter("status", FilterPredicate::eq(json!("active")))
            .sort_by("wave", SortDirection::Desc)
            .offset(10)
            .limit(25);
        let criteria = envelope.criteria("game_view");
        assert_eq!(criteria.model_type, "game_view");
        assert_eq!(criteria.offset, 10);
        assert_eq!(criteria.limit, Some(25));
        assert_eq!(criteria.sort.len(), 1);
        assert!(criteria.filters.contains_key("status"));
    }

    #[test]
    fn duplicate_registration_errors() {
        let registry = QueryRegistry::new();
        registry.register("Q", Arc::new(FixedAnswer)).unwrap();
        assert!(registry.register("Q", Arc::new(FixedAnswer)).is_err());
    }
}
