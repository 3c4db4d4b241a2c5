// File: src/game/commands.rs
//
// Command handlers: decode the payload, load or construct the game, invoke
// the domain method, save. Handlers on hot paths retry version conflicts
// with a bounded reload loop.

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use async_trait::async_trait;

use defense_engine_core::aggregate::{Aggregate, AggregateRepository};
use defense_engine_core::command::{retry_on_conflict, CommandEnvelope, CommandHandler,
    DEFAULT_CONFLICT_RETRIES};
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::EngineResult;

use crate::game::aggregate::GameAggregate;

#[derive(Debug, Deserialize)]
pub struct CreateGamePayload {
    pub name: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
}

fn default_difficulty() -> String {
    "normal".to_string()
}

fn default_max_players() -> u32 {
    4
}

pub struct CreateGameHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for CreateGameHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: CreateGamePayload = command.decode()?;
        let mut game = GameAggregate::new(command.aggregate_id);
        game.create(payload.name, payload.difficulty, payload.max_players)?;
        self.repo.save(ctx, &mut game).await?;
        Ok(json!({
            "gameId": command.aggregate_id,
            "gold": game.state.gold,
            "version": game.version(),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinGamePayload {
    pub player_id: Uuid,
    pub display_name: String,
}

pub struct JoinGameHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for JoinGameHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: JoinGamePayload = command.decode()?;
        let game_id = command.aggregate_id;
        let player_id = payload.player_id;
        let version = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || {
            let display_name = payload.display_name.clone();
            async move {
                let mut game = self.repo.load(ctx, game_id).await?;
                game.join(player_id, display_name)?;
                self.repo.save(ctx, &mut game).await?;
                Ok(game.version())
            }
        })
        .await?;
        Ok(json!({
            "gameId": game_id,
            "playerId": player_id,
            "version": version,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceTowerPayload {
    pub player_id: Uuid,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: String,
}

pub struct PlaceTowerHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for PlaceTowerHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: PlaceTowerPayload = command.decode()?;
        let game_id = command.aggregate_id;
        let player_id = payload.player_id;
        let (x, y) = (payload.x, payload.y);
        let (tower_id, cost) = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || {
            let kind = payload.kind.clone();
            async move {
                let mut game = self.repo.load(ctx, game_id).await?;
                let placed = game.place_tower(player_id, x, y, &kind)?;
                self.repo.save(ctx, &mut game).await?;
                Ok(placed)
            }
        })
        .await?;
        Ok(json!({"towerId": tower_id, "cost": cost}))
    }
}

#[derive(Debug, Deserialize)]
pub struct SellTowerPayload {
    pub tower_id: Uuid,
}

pub struct SellTowerHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for SellTowerHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: SellTowerPayload = command.decode()?;
        let game_id = command.aggregate_id;
        let tower_id = payload.tower_id;
        let refund = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || async move {
            let mut game = self.repo.load(ctx, game_id).await?;
            let refund = game.sell_tower(tower_id)?;
            self.repo.save(ctx, &mut game).await?;
            Ok(refund)
        })
        .await?;
        Ok(json!({"towerId": tower_id, "refund": refund}))
    }
}

pub struct StartWaveHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for StartWaveHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let game_id = command.aggregate_id;
        let wave = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || async move {
            let mut game = self.repo.load(ctx, game_id).await?;
            let wave = game.start_wave()?;
            self.repo.save(ctx, &mut game).await?;
            Ok(wave)
        })
        .await?;
        Ok(json!({"gameId": game_id, "wave": wave}))
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteWavePayload {
    pub reward: i64,
}

pub struct CompleteWaveHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for CompleteWaveHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: CompleteWavePayload = command.decode()?;
        let game_id = command.aggregate_id;
        let reward = payload.reward;
        let gold = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || async move {
            let mut game = self.repo.load(ctx, game_id).await?;
            game.complete_wave(reward)?;
            self.repo.save(ctx, &mut game).await?;
            Ok(game.state.gold)
        })
        .await?;
        Ok(json!({"gameId": game_id, "gold": gold}))
    }
}

#[derive(Debug, Deserialize)]
pub struct EndGamePayload {
    pub outcome: String,
}

pub struct EndGameHandler {
    pub repo: AggregateRepository<GameAggregate>,
}

#[async_trait]
impl CommandHandler for EndGameHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: EndGamePayload = command.decode()?;
        let game_id = command.aggregate_id;
        retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || {
            let outcome = payload.outcome.clone();
            async move {
                let mut game = self.repo.load(ctx, game_id).await?;
                game.end(outcome)?;
                self.repo.save(ctx, &mut game).await?;
                Ok(())
            }
        })
        .await?;
        Ok(json!({"gameId": game_id, "outcome": payload.outcome}))
    }
}
