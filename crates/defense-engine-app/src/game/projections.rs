// File: src/game/projections.rs
//
// Read-model maintenance: one game_view record per session, one tower_view
// record per placed tower

use async_trait::async_trait;
use serde_json::json;

use defense_engine_core::context::RequestContext;
use defense_engine_core::error::EngineResult;
use defense_engine_core::event::EventEnvelope;
use defense_engine_core::projection::Projection;
use defense_engine_core::read::{ReadModelRecord, ReadStore};

use crate::game::aggregate::GameEvent;
use crate::game::{GAME_VIEW, TOWER_VIEW};

/// Denormalized per-game summary answering the lobby and status queries.
pub struct GameViewProjection;

#[async_trait]
impl Projection for GameViewProjection {
    fn name(&self) -> &str {
        "game_view"
    }

    fn event_types(&self) -> Vec<String> {
        vec![
            "game_created".to_string(),
            "player_joined".to_string(),
            "tower_placed".to_string(),
            "tower_sold".to_string(),
            "wave_started".to_string(),
            "wave_completed".to_string(),
            "game_ended".to_string(),
        ]
    }

    async fn apply(
        &self,
        ctx: &RequestContext,
        event: &EventEnvelope,
        reads: &dyn ReadStore,
    ) -> EngineResult<()> {
        let id = event.aggregate_id.to_string();
        let domain: GameEvent = event.decode()?;
        let mut body = reads
            .get(ctx, GAME_VIEW, &id)
            .await?
            .map(|record| record.body)
            .unwrap_or_else(|| json!({"gameId": id}));

        match domain {
            GameEvent::GameCreated { name, difficulty, max_players, starting_gold, .. } => {
                body["name"] = json!(name);
                body["difficulty"] = json!(difficulty);
                body["maxPlayers"] = json!(max_players);
                body["gold"] = json!(starting_gold);
                body["phase"] = json!("lobby");
                body["players"] = json!(0);
                body["towers"] = json!(0);
                body["wave"] = json!(0);
            }
            GameEvent::PlayerJoined { .. } => {
                let players = body["players"].as_i64().unwrap_or(0);
                body["players"] = json!(players + 1);
            }
            GameEvent::TowerPlaced { cost, .. } => {
                let towers = body["towers"].as_i64().unwrap_or(0);
                let gold = body["gold"].as_i64().unwrap_or(0);
                body["towers"] = json!(towers + 1);
                body["gold"] = json!(gold - cost);
            }
            GameEvent::TowerSold { refund, .. } => {
                let towers = body["towers"].as_i64().unwrap_or(0);
                let gold = body["gold"].as_i64().unwrap_or(0);
                body["towers"] = json!((towers - 1).max(0));
                body["gold"] = json!(gold + refund);
            }
            GameEvent::WaveStarted { wave, .. } => {
                body["wave"] = json!(wave);
                body["phase"] = json!("playing");
            }
            GameEvent::WaveCompleted { reward, .. } => {
                let gold = body["gold"].as_i64().unwrap_or(0);
                body["gold"] = json!(gold + reward);
            }
            GameEvent::GameEnded { outcome, .. } => {
                body["phase"] = json!("finished");
                body["outcome"] = json!(outcome);
            }
        }
        body["version"] = json!(event.aggregate_version);

        reads
            .save(
                ctx,
                ReadModelRecord::new(GAME_VIEW, id, body).with_version(event.aggregate_version),
            )
            .await
    }

    async fn reset(&self, ctx: &RequestContext, reads: &dyn ReadStore) -> EngineResult<()> {
        reads.delete_by_type(ctx, GAME_VIEW).await?;
        Ok(())
    }
}

/// One record per living tower, queryable by game and owner.
pub struct TowerViewProjection;

#[async_trait]
impl Projection for TowerViewProjection {
    fn name(&self) -> &str {
        "tower_view"
    }

    fn event_types(&self) -> Vec<String> {
        vec!["tower_placed".to_string(), "tower_sold".to_string()]
    }

    async fn apply(
        &self,
        ctx: &RequestContext,
        event: &EventEnvelope,
        reads: &dyn ReadStore,
    ) -> EngineResult<()> {
        match event.decode::<GameEvent>()? {
            GameEvent::TowerPlaced { game_id, tower_id, player_id, x, y, kind, cost } => {
                let body = json!({
                    "towerId": tower_id,
                    "gameId": game_id,
                    "owner": player_id,
                    "x": x,
                    "y": y,
                    "type": kind,
                    "cost": cost,
                });
                reads
                    .save(
                        ctx,
                        ReadModelRecord::new(TOWER_VIEW, tower_id.to_string(), body)
                            .with_version(event.aggregate_version),
                    )
                    .await
            }
            GameEvent::TowerSold { tower_id, .. } => {
                reads.delete(ctx, TOWER_VIEW, &tower_id.to_string()).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn reset(&self, ctx: &RequestContext, reads: &dyn ReadStore) -> EngineResult<()> {
        reads.delete_by_type(ctx, TOWER_VIEW).await?;
        Ok(())
    }
}
