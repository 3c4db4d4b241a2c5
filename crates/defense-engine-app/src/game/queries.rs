// File: src/game/queries.rs
//
// Query handlers over the game read models

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::query::{QueryEnvelope, QueryHandler};
use defense_engine_core::read::ReadStore;

use crate::game::{GAME_VIEW, TOWER_VIEW};

fn required_id(query: &QueryEnvelope, field: &str) -> EngineResult<String> {
    query
        .filters
        .get(field)
        .and_then(|predicate| predicate.value.as_str().map(str::to_string))
        .ok_or_else(|| {
            EngineError::validation(format!("query requires a '{}' filter", field))
        })
}

pub struct GetGameByIdHandler {
    pub reads: Arc<dyn ReadStore>,
}

#[async_trait]
impl QueryHandler for GetGameByIdHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let id = required_id(&query, "id")?;
        match self.reads.get(ctx, GAME_VIEW, &id).await? {
            Some(record) => Ok(record.body),
            None => {
                let aggregate_id = uuid::Uuid::parse_str(&id)
                    .map_err(|_| EngineError::validation("malformed game id"))?;
                Err(EngineError::AggregateNotFound { aggregate_id })
            }
        }
    }
}

pub struct ListGamesHandler {
    pub reads: Arc<dyn ReadStore>,
}

#[async_trait]
impl QueryHandler for ListGamesHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let criteria = query.criteria(GAME_VIEW);
        let games: Vec<serde_json::Value> = self
            .reads
            .query(ctx, &criteria)
            .await?
            .into_iter()
            .map(|record| record.body)
            .collect();
        let total = self.reads.count(ctx, &criteria).await?;
        Ok(json!({"games": games, "total": total}))
    }
}

pub struct ListTowersHandler {
    pub reads: Arc<dyn ReadStore>,
}

#[async_trait]
impl QueryHandler for ListTowersHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let criteria = query.criteria(TOWER_VIEW);
        let towers: Vec<serde_json::Value> = self
            .reads
            .query(ctx, &criteria)
            .await?
            .into_iter()
            .map(|record| record.body)
            .collect();
        Ok(json!({"towers": towers}))
    }
}
