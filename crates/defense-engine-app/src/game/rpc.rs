// File: src/game/rpc.rs
//
// The game.* RPC surface: thin adapters from wire shapes onto the command
// and query registries

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use defense_engine_core::command::{CommandEnvelope, CommandRegistry};
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::query::{QueryEnvelope, QueryRegistry};
use defense_engine_core::read::FilterPredicate;
use defense_engine_core::rpc::{RpcHandler, RpcMethod};

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub name: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(rename = "maxPlayers", default)]
    pub max_players: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "playerId", default)]
    pub player_id: Option<Uuid>,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaceTowerRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct SellTowerRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "towerId")]
    pub tower_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct WaveRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(default)]
    pub reward: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EndGameRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    pub outcome: String,
}

#[derive(Debug, Deserialize)]
pub struct GameIdRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
}

fn parse_game_id(game_id: &str) -> EngineResult<Uuid> {
    Uuid::parse_str(game_id)
        .map_err(|_| EngineError::invalid_params(format!("malformed gameId '{}'", game_id)))
}

/// Handler type whose public methods become `game.*` RPC methods.
pub struct GameRpc {
    pub commands: Arc<CommandRegistry>,
    pub queries: Arc<QueryRegistry>,
}

impl GameRpc {
    async fn create_game(
        &self,
        ctx: &RequestContext,
        request: CreateGameRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = Uuid::new_v4();
        let mut payload = json!({"name": request.name});
        if let Some(difficulty) = request.difficulty {
            payload["difficulty"] = json!(difficulty);
        }
        if let Some(max_players) = request.max_players {
            payload["max_players"] = json!(max_players);
        }
        self.commands
            .dispatch(ctx, CommandEnvelope::new("CreateGame", game_id, "game", payload))
            .await
    }

    async fn join(
        &self,
        ctx: &RequestContext,
        request: JoinRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        let player_id = request.player_id.unwrap_or_else(Uuid::new_v4);
        self.commands
            .dispatch(
                ctx,
                CommandEnvelope::new(
                    "JoinGame",
                    game_id,
                    "game",
                    json!({"player_id": player_id, "display_name": request.display_name}),
                ),
            )
            .await
    }

    async fn place_tower(
        &self,
        ctx: &RequestContext,
        request: PlaceTowerRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        self.commands
            .dispatch(
                ctx,
                CommandEnvelope::new(
                    "PlaceTower",
                    game_id,
                    "game",
                    json!({
                        "player_id": request.player_id,
                        "x": request.x,
                        "y": request.y,
                        "type": request.kind,
                    }),
                ),
            )
            .await
    }

    async fn sell_tower(
        &self,
        ctx: &RequestContext,
        request: SellTowerRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        self.commands
            .dispatch(
                ctx,
                CommandEnvelope::new(
                    "SellTower",
                    game_id,
                    "game",
                    json!({"tower_id": request.tower_id}),
                ),
            )
            .await
    }

    async fn start_wave(
        &self,
        ctx: &RequestContext,
        request: GameIdRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        self.commands
            .dispatch(ctx, CommandEnvelope::new("StartWave", game_id, "game", json!({})))
            .await
    }

    async fn complete_wave(
        &self,
        ctx: &RequestContext,
        request: WaveRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        self.commands
            .dispatch(
                ctx,
                CommandEnvelope::new(
                    "CompleteWave",
                    game_id,
                    "game",
                    json!({"reward": request.reward.unwrap_or(25)}),
                ),
            )
            .await
    }

    async fn end_game(
        &self,
        ctx: &RequestContext,
        request: EndGameRequest,
    ) -> EngineResult<serde_json::Value> {
        let game_id = parse_game_id(&request.game_id)?;
        self.commands
            .dispatch(
                ctx,
                CommandEnvelope::new(
                    "EndGame",
                    game_id,
                    "game",
                    json!({"outcome": request.outcome}),
                ),
            )
            .await
    }

    async fn get_game(
        &self,
        ctx: &RequestContext,
        request: GameIdRequest,
    ) -> EngineResult<serde_json::Value> {
        self.queries
            .dispatch(
                ctx,
                QueryEnvelope::new("GetGameById")
                    .filter("gameId", FilterPredicate::eq(json!(request.game_id)))
                    .filter("id", FilterPredicate::eq(json!(request.game_id))),
            )
            .await
    }

    async fn list_games(&self, ctx: &RequestContext) -> EngineResult<serde_json::Value> {
        self.queries.dispatch(ctx, QueryEnvelope::new("ListGames")).await
    }

    async fn list_towers(
        &self,
        ctx: &RequestContext,
        request: GameIdRequest,
    ) -> EngineResult<serde_json::Value> {
        self.queries
            .dispatch(
                ctx,
                QueryEnvelope::new("ListTowers")
                    .filter("gameId", FilterPredicate::eq(json!(request.game_id))),
            )
            .await
    }

    async fn ping(&self) -> EngineResult<serde_json::Value> {
        Ok(json!("pong"))
    }
}

impl RpcHandler for GameRpc {
    fn methods(self: Arc<Self>) -> Vec<RpcMethod> {
        vec![
            RpcMethod::unary("CreateGame", &self, |h, ctx, req: CreateGameRequest| {
                async move { h.create_game(&ctx, req).await }
            }),
            RpcMethod::unary("Join", &self, |h, ctx, req: JoinRequest| async move {
                h.join(&ctx, req).await
            }),
            RpcMethod::unary("PlaceTower", &self, |h, ctx, req: PlaceTowerRequest| {
                async move { h.place_tower(&ctx, req).await }
            }),
            RpcMethod::unary("SellTower", &self, |h, ctx, req: SellTowerRequest| {
                async move { h.sell_tower(&ctx, req).await }
            }),
            RpcMethod::unary("StartWave", &self, |h, ctx, req: GameIdRequest| async move {
                h.start_wave(&ctx, req).await
            }),
            RpcMethod::unary("CompleteWave", &self, |h, ctx, req: WaveRequest| {
                async move { h.complete_wave(&ctx, req).await }
            }),
            RpcMethod::unary("EndGame", &self, |h, ctx, req: EndGameRequest| async move {
                h.end_game(&ctx, req).await
            }),
            RpcMethod::unary("GetGame", &self, |h, ctx, req: GameIdRequest| async move {
                h.get_game(&ctx, req).await
            }),
            RpcMethod::nullary("ListGames", &self, |h, ctx| async move {
                h.list_games(&ctx).await
            }),
            RpcMethod::unary("ListTowers", &self, |h, ctx, req: GameIdRequest| async move {
                h.list_towers(&ctx, req).await
            }),
            RpcMethod::nullary("Ping", &self, |h, _ctx| async move { h.ping().await }),
        ]
    }
}
