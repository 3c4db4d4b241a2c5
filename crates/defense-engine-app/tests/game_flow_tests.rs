// File: tests/game_flow_tests.rs
//
// Driving the game domain end to end through the RPC surface: commands,
// projections, and queries over one runtime

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use defense_engine_app::game;
use defense_engine_core::config::EngineConfig;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::rpc::RpcParams;
use defense_engine_core::runtime::EngineRuntime;
use defense_engine_core::RequestContext;

async fn game_runtime() -> Arc<EngineRuntime> {
    let runtime = EngineRuntime::builder(EngineConfig::default())
        .add_projection(Arc::new(game::projections::GameViewProjection))
        .add_projection(Arc::new(game::projections::TowerViewProjection))
        .build()
        .await
        .unwrap();
    let runtime = Arc::new(runtime);
    game::register(&runtime).unwrap();
    runtime.start(&RequestContext::background()).await.unwrap();
    runtime
}

async fn invoke(runtime: &Arc<EngineRuntime>, method: &str, params: Value) -> EngineResult<Value> {
    runtime
        .rpc
        .invoke(
            RequestContext::background(),
            method,
            RpcParams::from_value(Some(params)).unwrap(),
        )
        .await
}

#[tokio::test]
async fn full_match_lifecycle_over_rpc() {
    let runtime = game_runtime().await;

    let created = invoke(&runtime, "game.CreateGame", json!({"name": "last stand"}))
        .await
        .unwrap();
    let game_id = created["gameId"].as_str().unwrap().to_string();
    assert_eq!(created["gold"], 150);

    let joined = invoke(
        &runtime,
        "game.Join",
        json!({"gameId": game_id, "displayName": "Alice"}),
    )
    .await
    .unwrap();
    let player_id = joined["playerId"].as_str().unwrap().to_string();

    let wave = invoke(&runtime, "game.StartWave", json!({"gameId": game_id}))
        .await
        .unwrap();
    assert_eq!(wave["wave"], 1);

    let placed = invoke(
        &runtime,
        "game.PlaceTower",
        json!({"gameId": game_id, "playerId": player_id, "x": 3, "y": 4, "type": "basic"}),
    )
    .await
    .unwrap();
    assert_eq!(placed["cost"], 50);
    let tower_id = placed["towerId"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let view = invoke(&runtime, "game.GetGame", json!({"gameId": game_id}))
        .await
        .unwrap();
    assert_eq!(view["gold"], 100);
    assert_eq!(view["towers"], 1);
    assert_eq!(view["players"], 1);
    assert_eq!(view["phase"], "playing");
    assert_eq!(view["wave"], 1);

    let towers = invoke(&runtime, "game.ListTowers", json!({"gameId": game_id}))
        .await
        .unwrap();
    let towers = towers["towers"].as_array().unwrap();
    assert_eq!(towers.len(), 1);
    assert_eq!(towers[0]["x"], 3);
    assert_eq!(towers[0]["y"], 4);
    assert_eq!(towers[0]["type"], "basic");

    let sold = invoke(
        &runtime,
        "game.SellTower",
        json!({"gameId": game_id, "towerId": tower_id}),
    )
    .await
    .unwrap();
    assert_eq!(sold["refund"], 25);

    invoke(
        &runtime,
        "game.EndGame",
        json!({"gameId": game_id, "outcome": "victory"}),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let view = invoke(&runtime, "game.GetGame", json!({"gameId": game_id}))
        .await
        .unwrap();
    assert_eq!(view["phase"], "finished");
    assert_eq!(view["outcome"], "victory");
    assert_eq!(view["gold"], 125);
    assert_eq!(view["towers"], 0);

    let towers = invoke(&runtime, "game.ListTowers", json!({"gameId": game_id}))
        .await
        .unwrap();
    assert!(towers["towers"].as_array().unwrap().is_empty());

    runtime.stop(&RequestContext::background()).await.unwrap();
}

#[tokio::test]
async fn domain_rules_surface_as_validation_errors() {
    let runtime = game_runtime().await;

    let created = invoke(&runtime, "game.CreateGame", json!({"name": "rules"}))
        .await
        .unwrap();
    let game_id = created["gameId"].as_str().unwrap().to_string();
    let joined = invoke(
        &runtime,
        "game.Join",
        json!({"gameId": game_id, "displayName": "Bob"}),
    )
    .await
    .unwrap();
    let player_id = joined["playerId"].as_str().unwrap().to_string();

    invoke(
        &runtime,
        "game.PlaceTower",
        json!({"gameId": game_id, "playerId": player_id, "x": 1, "y": 1, "type": "basic"}),
    )
    .await
    .unwrap();

    // Same cell again: rejected by the aggregate, surfaced as validation.
    let err = invoke(
        &runtime,
        "game.PlaceTower",
        json!({"gameId": game_id, "playerId": player_id, "x": 1, "y": 1, "type": "basic"}),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    // Unknown tower type.
    let err = invoke(
        &runtime,
        "game.PlaceTower",
        json!({"gameId": game_id, "playerId": player_id, "x": 2, "y": 2, "type": "laser"}),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    // A player who never joined cannot build.
    let err = invoke(
        &runtime,
        "game.PlaceTower",
        json!({
            "gameId": game_id,
            "playerId": uuid::Uuid::new_v4().to_string(),
            "x": 5, "y": 5, "type": "basic"
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    runtime.stop(&RequestContext::background()).await.unwrap();
}

#[tokio::test]
async fn unknown_game_is_not_found() {
    let runtime = game_runtime().await;
    let err = invoke(
        &runtime,
        "game.GetGame",
        json!({"gameId": uuid::Uuid::new_v4().to_string()}),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::AggregateNotFound { .. }));
}

#[tokio::test]
async fn rebuilding_game_views_is_lossless() {
    let runtime = game_runtime().await;
    let ctx = RequestContext::background();

    let created = invoke(&runtime, "game.CreateGame", json!({"name": "rebuildable"}))
        .await
        .unwrap();
    let game_id = created["gameId"].as_str().unwrap().to_string();
    let joined = invoke(
        &runtime,
        "game.Join",
        json!({"gameId": game_id, "displayName": "Cara"}),
    )
    .await
    .unwrap();
    let player_id = joined["playerId"].as_str().unwrap().to_string();
    invoke(&runtime, "game.StartWave", json!({"gameId": game_id}))
        .await
        .unwrap();
    invoke(
        &runtime,
        "game.PlaceTower",
        json!({"gameId": game_id, "playerId": player_id, "x": 0, "y": 0, "type": "frost"}),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let before = invoke(&runtime, "game.GetGame", json!({"gameId": game_id}))
        .await
        .unwrap();

    // Both projections rebuild concurrently on their own read-model types.
    let (game_rebuild, tower_rebuild) = tokio::join!(
        runtime.projections.rebuild(&ctx, "game_view"),
        runtime.projections.rebuild(&ctx, "tower_view"),
    );
    game_rebuild.unwrap();
    tower_rebuild.unwrap();

    let after = invoke(&runtime, "game.GetGame", json!({"gameId": game_id}))
        .await
        .unwrap();
    assert_eq!(before, after);

    runtime.stop(&ctx).await.unwrap();
}
