// File: src/read/memory.rs
//
// In-memory read store with equality indexes and lazy TTL reclamation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::read::criteria::{FilterOp, QueryCriteria};
use crate::read::registry::ReadModelRegistry;
use crate::read::{lookup_field, ReadModelRecord, ReadStore};

struct IndexDef {
    name: String,
    fields: Vec<String>,
    // Canonical JSON strings of the indexed field values -> record ids.
    entries: HashMap<Vec<String>, HashSet<String>>,
}

impl IndexDef {
    fn key_for(&self, record: &ReadModelRecord) -> Option<Vec<String>> {
        self.fields
            .iter()
            .map(|field| lookup_field(&record.body, field).map(|v| v.to_string()))
            .collect()
    }

    fn insert(&mut self, record: &ReadModelRecord) {
        if let Some(key) = self.key_for(record) {
            self.entries.entry(key).or_default().insert(record.id.clone());
        }
    }

    fn remove(&mut self, record: &ReadModelRecord) {
        if let Some(key) = self.key_for(record) {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[derive(Default)]
struct TypeState {
    records: HashMap<String, ReadModelRecord>,
    indexes: Vec<IndexDef>,
}

impl TypeState {
    fn insert(&mut self, record: ReadModelRecord) {
        if let Some(previous) = self.records.remove(&record.id) {
            for index in &mut self.indexes {
                index.remove(&previous);
            }
        }
        for index in &mut self.indexes {
            index.insert(&record);
        }
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> Option<ReadModelRecord> {
        let record = self.records.remove(id)?;
        for index in &mut self.indexes {
            index.remove(&record);
        }
        Some(record)
    }

    fn reclaim_expired(&mut self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .records
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.id.clone())
            .collect();
        for id in expired {
            self.remove(&id);
        }
    }

    /// Ids matching the equality filters through the best applicable index,
    /// if one covers a subset of the criteria.
    fn index_candidates(&self, criteria: &QueryCriteria) -> Option<HashSet<String>> {
        self.indexes
            .iter()
            .filter(|index| {
                index.fields.iter().all(|field| {
                    criteria
                        .filters
                        .get(field)
                        .map_or(false, |predicate| predicate.op == FilterOp::Eq)
                })
            })
            .max_by_key(|index| index.fields.len())
            .map(|index| {
                let key: Option<Vec<String>> = index
                    .fields
                    .iter()
                    .map(|field| criteria.filters.get(field).map(|p| p.value.to_string()))
                    .collect();
                key.and_then(|key| index.entries.get(&key).cloned())
                    .unwrap_or_default()
            })
    }
}

/// In-memory implementation of the read store.
///
/// Built for the query shapes projections produce: point lookups, filtered
/// scans over one type, and rebuild-time bulk erases.
pub struct InMemoryReadStore {
    registry: Option<Arc<ReadModelRegistry>>,
    state: RwLock<HashMap<String, TypeState>>,
}

impl InMemoryReadStore {
    pub fn new() -> Self {
        Self {
            registry: None,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Store that validates saved bodies against the registered model types.
    pub fn with_registry(registry: Arc<ReadModelRegistry>) -> Self {
        Self {
            registry: Some(registry),
            state: RwLock::new(HashMap::new()),
        }
    }

    fn validate(&self, record: &ReadModelRecord) -> EngineResult<()> {
        if let Some(registry) = &self.registry {
            registry.validate(&record.model_type, &record.body)?;
        }
        Ok(())
    }

    async fn collect_matching(
        &self,
        criteria: &QueryCriteria,
    ) -> EngineResult<Vec<ReadModelRecord>> {
        let mut state = self.state.write().await;
        let Some(type_state) = state.get_mut(&criteria.model_type) else {
            return Ok(Vec::new());
        };
        type_state.reclaim_expired();

        let mut matching: Vec<ReadModelRecord> = match type_state.index_candidates(criteria) {
            Some(candidates) => candidates
                .iter()
                .filter_map(|id| type_state.records.get(id))
                .filter(|record| criteria.matches(record))
                .cloned()
                .collect(),
            None => type_state
                .records
                .values()
                .filter(|record| criteria.matches(record))
                .cloned()
                .collect(),
        };

        matching.sort_by(|a, b| criteria.compare(a, b));
        Ok(matching)
    }
}

impl Default for InMemoryReadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadStore for InMemoryReadStore {
    async fn save(&self, ctx: &RequestContext, record: ReadModelRecord) -> EngineResult<()> {
        ctx.ensure_active()?;
        self.validate(&record)?;
        let mut state = self.state.write().await;
        state
            .entry(record.model_type.clone())
            .or_default()
            .insert(record);
        Ok(())
    }

    async fn save_batch(
        &self,
        ctx: &RequestContext,
        records: Vec<ReadModelRecord>,
    ) -> EngineResult<()> {
        ctx.ensure_active()?;
        for record in &records {
            self.validate(record)?;
        }
        let mut state = self.state.write().await;
        for record in records {
            state
                .entry(record.model_type.clone())
                .or_default()
                .insert(record);
        }
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        id: &str,
    ) -> EngineResult<Option<ReadModelRecord>> {
        ctx.ensure_active()?;
        let state = self.state.read().await;
        let record = state
            .get(model_type)
            .and_then(|type_state| type_state.records.get(id))
            .cloned();
        // Expired records are invisible; reclamation happens on the next
        // write-path touch of this type.
        Ok(record.filter(|r| !r.is_expired(Utc::now())))
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        id: &str,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        Ok(state
            .get_mut(model_type)
            .and_then(|type_state| type_state.remove(id))
            .is_some())
    }

    async fn delete_batch(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        ids: &[String],
    ) -> EngineResult<usize> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        let Some(type_state) = state.get_mut(model_type) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if type_state.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_by_type(&self, ctx: &RequestContext, model_type: &str) -> EngineResult<usize> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        match state.get_mut(model_type) {
            Some(type_state) => {
                let removed = type_state.records.len();
                type_state.records.clear();
                for index in &mut type_state.indexes {
                    index.entries.clear();
                }
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        criteria: &QueryCriteria,
    ) -> EngineResult<Vec<ReadModelRecord>> {
        ctx.ensure_active()?;
        let matching = self.collect_matching(criteria).await?;
        let page: Vec<ReadModelRecord> = matching
            .into_iter()
            .skip(criteria.offset)
            .take(criteria.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn count(&self, ctx: &RequestContext, criteria: &QueryCriteria) -> EngineResult<usize> {
        ctx.ensure_active()?;
        Ok(self.collect_matching(criteria).await?.len())
    }

    async fn create_index(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        fields: &[String],
    ) -> EngineResult<()> {
        ctx.ensure_active()?;
        if fields.is_empty() {
            return Err(EngineError::validation("index needs at least one field"));
        }
        let name = fields.join("_");
        let mut state = self.state.write().await;
        let type_state = state.entry(model_type.to_string()).or_default();
        if type_state.indexes.iter().any(|index| index.name == name) {
            return Err(EngineError::configuration(format!(
                "index '{}' already exists on '{}'",
                name, model_type
            )));
        }

        let mut index = IndexDef {
            name,
            fields: fields.to_vec(),
            entries: HashMap::new(),
        };
        for record in type_state.records.values() {
            index.insert(record);
        }
        type_state.indexes.push(index);
        Ok(())
    }

    async fn drop_index(
        &self,
        ctx: &RequestContext,
        model_type: &str,
        name: &str,
    ) -> EngineResult<bool> {
        ctx.ensure_active()?;
        let mut state = self.state.write().await;
        let Some(type_state) = state.get_mut(model_type) else {
            return Ok(false);
        };
        let before = type_state.indexes.len();
        type_state.indexes.retain(|index| index.name != name);
        Ok(type_state.indexes.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::criteria::{FilterPredicate, SortDirection};
    use serde_json::json;
    use std::time::Duration;

    fn game_view(id: &str, wave: i64, gold: i64, status: &str) -> ReadModelRecord {
        ReadModelRecord::new(
            "game_view",
            id,
            json!({"wave": wave, "gold": gold, "status": status}),
        )
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();

        store.save(&ctx, game_view("g1", 1, 100, "active")).await.unwrap();
        store.save(&ctx, game_view("g1", 2, 150, "active")).await.unwrap();

        let record = store.get(&ctx, "game_view", "g1").await.unwrap().unwrap();
        assert_eq!(record.body["wave"], 2);
        let count = store
            .count(&ctx, &QueryCriteria::for_type("game_view"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();
        for (id, wave, gold) in [("g1", 3, 10), ("g2", 1, 30), ("g3", 2, 20), ("g4", 5, 40)] {
            store.save(&ctx, game_view(id, wave, gold, "active")).await.unwrap();
        }
        store.save(&ctx, game_view("g5", 9, 99, "finished")).await.unwrap();

        let criteria = QueryCriteria::for_type("game_view")
            .filter("status", FilterPredicate::eq(json!("active")))
            .sort_by("wave", SortDirection::Asc)
            .offset(1)
            .limit(2);

        let rows = store.query(&ctx, &criteria).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["g3", "g1"]);

        let total = store
            .count(
                &ctx,
                &QueryCriteria::for_type("game_view")
                    .filter("status", FilterPredicate::eq(json!("active"))),
            )
            .await
            .unwrap();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn expired_records_are_invisible_and_reclaimed() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();

        let mut doomed = game_view("g1", 1, 10, "active");
        doomed = doomed.with_ttl(Duration::from_millis(0));
        store.save(&ctx, doomed).await.unwrap();
        store.save(&ctx, game_view("g2", 2, 20, "active")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get(&ctx, "game_view", "g1").await.unwrap().is_none());
        let rows = store
            .query(&ctx, &QueryCriteria::for_type("game_view"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "g2");
    }

    #[tokio::test]
    async fn delete_by_type_erases_everything() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();
        for id in ["g1", "g2", "g3"] {
            store.save(&ctx, game_view(id, 1, 1, "active")).await.unwrap();
        }

        let removed = store.delete_by_type(&ctx, "game_view").await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(
            store
                .count(&ctx, &QueryCriteria::for_type("game_view"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn equality_index_serves_queries() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();
        store
            .create_index(&ctx, "game_view", &["status".to_string()])
            .await
            .unwrap();
        for (id, status) in [("g1", "active"), ("g2", "finished"), ("g3", "active")] {
            store.save(&ctx, game_view(id, 1, 1, status)).await.unwrap();
        }

        let rows = store
            .query(
                &ctx,
                &QueryCriteria::for_type("game_view")
                    .filter("status", FilterPredicate::eq(json!("active"))),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        assert!(store.drop_index(&ctx, "game_view", "status").await.unwrap());
        assert!(!store.drop_index(&ctx, "game_view", "status").await.unwrap());
    }

    #[tokio::test]
    async fn batch_save_and_delete() {
        let store = InMemoryReadStore::new();
        let ctx = RequestContext::background();

        store
            .save_batch(
                &ctx,
                vec![
                    game_view("g1", 1, 10, "active"),
                    game_view("g2", 2, 20, "active"),
                    game_view("g3", 3, 30, "active"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            store
                .count(&ctx, &QueryCriteria::for_type("game_view"))
                .await
                .unwrap(),
            3
        );

        let removed = store
            .delete_batch(&ctx, "game_view", &["g1".to_string(), "g3".to_string(), "gx".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(&ctx, "game_view", "g2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn registry_backed_store_rejects_unknown_types() {
        let registry = Arc::new(ReadModelRegistry::new());
        registry
            .register::<serde_json::Value>("game_view")
            .unwrap();
        let store = InMemoryReadStore::with_registry(registry);
        let ctx = RequestContext::background();

        store.save(&ctx, game_view("g1", 1, 1, "active")).await.unwrap();
        let err = store
            .save(&ctx, ReadModelRecord::new("mystery", "m1", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }
}
