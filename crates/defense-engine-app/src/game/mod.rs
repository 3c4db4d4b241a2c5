//! The cooperative tower-defense game domain, wired onto the engine the way
//! every game-domain module is expected to: aggregate + commands in,
//! projections + queries out, all exposed through `game.*` RPC methods.

pub mod aggregate;
pub mod commands;
pub mod projections;
pub mod queries;
pub mod rpc;

use std::sync::Arc;

use defense_engine_core::error::EngineResult;
use defense_engine_core::rpc::RegisterOptions;
use defense_engine_core::runtime::EngineRuntime;

pub const GAME_VIEW: &str = "game_view";
pub const TOWER_VIEW: &str = "tower_view";

/// Register commands, queries, and the `game.*` RPC surface on a built
/// runtime. Projections are added at build time (see `main.rs`).
pub fn register(runtime: &Arc<EngineRuntime>) -> EngineResult<()> {
    let repo = runtime.repository::<aggregate::GameAggregate>();

    runtime.commands.register(
        "CreateGame",
        Arc::new(commands::CreateGameHandler { repo: repo.clone() }),
    )?;
    runtime.commands.register(
        "JoinGame",
        Arc::new(commands::JoinGameHandler { repo: repo.clone() }),
    )?;
    runtime.commands.register(
        "PlaceTower",
        Arc::new(commands::PlaceTowerHandler { repo: repo.clone() }),
    )?;
    runtime.commands.register(
        "SellTower",
        Arc::new(commands::SellTowerHandler { repo: repo.clone() }),
    )?;
    runtime.commands.register(
        "StartWave",
        Arc::new(commands::StartWaveHandler { repo: repo.clone() }),
    )?;
    runtime.commands.register(
        "CompleteWave",
        Arc::new(commands::CompleteWaveHandler { repo: repo.clone() }),
    )?;
    runtime
        .commands
        .register("EndGame", Arc::new(commands::EndGameHandler { repo }))?;

    runtime.queries.register(
        "GetGameById",
        Arc::new(queries::GetGameByIdHandler { reads: Arc::clone(&runtime.reads) }),
    )?;
    runtime.queries.register(
        "ListGames",
        Arc::new(queries::ListGamesHandler { reads: Arc::clone(&runtime.reads) }),
    )?;
    runtime.queries.register(
        "ListTowers",
        Arc::new(queries::ListTowersHandler { reads: Arc::clone(&runtime.reads) }),
    )?;

    let game_rpc = Arc::new(rpc::GameRpc {
        commands: Arc::clone(&runtime.commands),
        queries: Arc::clone(&runtime.queries),
    });
    runtime
        .rpc
        .register_handler("game", &game_rpc, RegisterOptions::new())?;

    Ok(())
}
