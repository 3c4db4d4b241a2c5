// File: src/game/aggregate.rs
//
// The game session aggregate: players, towers, waves, and shared gold.
// Every decision happens in the command methods; `apply` only folds events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use defense_engine_core::aggregate::{Aggregate, AggregateBase};
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::event::DomainEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    GameCreated {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        name: String,
        difficulty: String,
        max_players: u32,
        starting_gold: i64,
    },
    PlayerJoined {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        player_id: Uuid,
        display_name: String,
    },
    TowerPlaced {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        tower_id: Uuid,
        player_id: Uuid,
        x: i32,
        y: i32,
        kind: String,
        cost: i64,
    },
    TowerSold {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        tower_id: Uuid,
        refund: i64,
    },
    WaveStarted {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        wave: u32,
    },
    WaveCompleted {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        wave: u32,
        reward: i64,
    },
    GameEnded {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        outcome: String,
        final_wave: u32,
    },
}

impl DomainEvent for GameEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameCreated { .. } => "game_created",
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::TowerPlaced { .. } => "tower_placed",
            GameEvent::TowerSold { .. } => "tower_sold",
            GameEvent::WaveStarted { .. } => "wave_started",
            GameEvent::WaveCompleted { .. } => "wave_completed",
            GameEvent::GameEnded { .. } => "game_ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Lobby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub tower_id: Uuid,
    pub owner: Uuid,
    pub x: i32,
    pub y: i32,
    pub kind: String,
    pub cost: i64,
}

/// Serialized scalar state carried by snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub name: String,
    pub difficulty: String,
    pub max_players: u32,
    pub phase: GamePhase,
    pub players: HashMap<Uuid, String>,
    pub towers: HashMap<Uuid, Tower>,
    pub gold: i64,
    pub wave: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            name: String::new(),
            difficulty: String::new(),
            max_players: 0,
            phase: GamePhase::Lobby,
            players: HashMap::new(),
            towers: HashMap::new(),
            gold: 0,
            wave: 0,
        }
    }
}

#[derive(Debug)]
pub struct GameAggregate {
    base: AggregateBase<GameEvent>,
    pub state: GameState,
}

fn tower_cost(kind: &str) -> Option<i64> {
    match kind {
        "basic" => Some(50),
        "cannon" => Some(120),
        "frost" => Some(90),
        _ => None,
    }
}

fn starting_gold(difficulty: &str) -> EngineResult<i64> {
    match difficulty {
        "easy" => Ok(200),
        "normal" => Ok(150),
        "hard" => Ok(100),
        other => Err(EngineError::validation(format!(
            "unknown difficulty '{}'",
            other
        ))),
    }
}

impl GameAggregate {
    pub fn create(&mut self, name: String, difficulty: String, max_players: u32) -> EngineResult<()> {
        if self.version() > 0 {
            return Err(EngineError::validation("game already exists"));
        }
        if name.is_empty() {
            return Err(EngineError::validation("game name must not be empty"));
        }
        if max_players == 0 || max_players > 8 {
            return Err(EngineError::validation("max_players must be between 1 and 8"));
        }
        let gold = starting_gold(&difficulty)?;
        self.record(GameEvent::GameCreated {
            game_id: self.id(),
            name,
            difficulty,
            max_players,
            starting_gold: gold,
        });
        Ok(())
    }

    pub fn join(&mut self, player_id: Uuid, display_name: String) -> EngineResult<()> {
        if self.state.phase == GamePhase::Finished {
            return Err(EngineError::validation("game is over"));
        }
        if self.state.players.contains_key(&player_id) {
            return Err(EngineError::validation("player already joined"));
        }
        if self.state.players.len() as u32 >= self.state.max_players {
            return Err(EngineError::validation("game is full"));
        }
        self.record(GameEvent::PlayerJoined {
            game_id: self.id(),
            player_id,
            display_name,
        });
        Ok(())
    }

    /// Place a tower for a joined player. The tower id is decided here, not
    /// in `apply`, so replay stays deterministic.
    pub fn place_tower(
        &mut self,
        player_id: Uuid,
        x: i32,
        y: i32,
        kind: &str,
    ) -> EngineResult<(Uuid, i64)> {
        if self.state.phase == GamePhase::Finished {
            return Err(EngineError::validation("game is over"));
        }
        if !self.state.players.contains_key(&player_id) {
            return Err(EngineError::validation("player has not joined this game"));
        }
        let cost = tower_cost(kind)
            .ok_or_else(|| EngineError::validation(format!("unknown tower type '{}'", kind)))?;
        if self.state.towers.values().any(|t| t.x == x && t.y == y) {
            return Err(EngineError::validation(format!(
                "cell ({}, {}) is occupied",
                x, y
            )));
        }
        if self.state.gold < cost {
            return Err(EngineError::validation(format!(
                "not enough gold: need {}, have {}",
                cost, self.state.gold
            )));
        }

        let tower_id = Uuid::new_v4();
        self.record(GameEvent::TowerPlaced {
            game_id: self.id(),
            tower_id,
            player_id,
            x,
            y,
            kind: kind.to_string(),
            cost,
        });
        Ok((tower_id, cost))
    }

    pub fn sell_tower(&mut self, tower_id: Uuid) -> EngineResult<i64> {
        if self.state.phase == GamePhase::Finished {
            return Err(EngineError::validation("game is over"));
        }
        let tower = self
            .state
            .towers
            .get(&tower_id)
            .ok_or_else(|| EngineError::validation("no such tower"))?;
        let refund = tower.cost / 2;
        self.record(GameEvent::TowerSold {
            game_id: self.id(),
            tower_id,
            refund,
        });
        Ok(refund)
    }

    pub fn start_wave(&mut self) -> EngineResult<u32> {
        match self.state.phase {
            GamePhase::Finished => return Err(EngineError::validation("game is over")),
            GamePhase::Lobby if self.state.players.is_empty() => {
                return Err(EngineError::validation("no players have joined"));
            }
            _ => {}
        }
        let wave = self.state.wave + 1;
        self.record(GameEvent::WaveStarted { game_id: self.id(), wave });
        Ok(wave)
    }

    pub fn complete_wave(&mut self, reward: i64) -> EngineResult<()> {
        if self.state.phase != GamePhase::Playing {
            return Err(EngineError::validation("no wave in progress"));
        }
        if reward < 0 {
            return Err(EngineError::validation("reward must be non-negative"));
        }
        self.record(GameEvent::WaveCompleted {
            game_id: self.id(),
            wave: self.state.wave,
            reward,
        });
        Ok(())
    }

    /// Retirement is an event; the aggregate is never deleted in place.
    pub fn end(&mut self, outcome: String) -> EngineResult<()> {
        if self.state.phase == GamePhase::Finished {
            return Err(EngineError::validation("game already ended"));
        }
        self.record(GameEvent::GameEnded {
            game_id: self.id(),
            outcome,
            final_wave: self.state.wave,
        });
        Ok(())
    }
}

impl Aggregate for GameAggregate {
    type Event = GameEvent;

    fn aggregate_type() -> &'static str {
        "game"
    }

    fn new(id: Uuid) -> Self {
        Self {
            base: AggregateBase::new(id),
            state: GameState::default(),
        }
    }

    fn base(&self) -> &AggregateBase<Self::Event> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event> {
        &mut self.base
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GameEvent::GameCreated {
                name,
                difficulty,
                max_players,
                starting_gold,
                ..
            } => {
                self.state.name = name.clone();
                self.state.difficulty = difficulty.clone();
                self.state.max_players = *max_players;
                self.state.gold = *starting_gold;
                self.state.phase = GamePhase::Lobby;
            }
            GameEvent::PlayerJoined { player_id, display_name, .. } => {
                self.state.players.insert(*player_id, display_name.clone());
            }
            GameEvent::TowerPlaced {
                tower_id,
                player_id,
                x,
                y,
                kind,
                cost,
                ..
            } => {
                self.state.gold -= cost;
                self.state.towers.insert(
                    *tower_id,
                    Tower {
                        tower_id: *tower_id,
                        owner: *player_id,
                        x: *x,
                        y: *y,
                        kind: kind.clone(),
                        cost: *cost,
                    },
                );
            }
            GameEvent::TowerSold { tower_id, refund, .. } => {
                self.state.towers.remove(tower_id);
                self.state.gold += refund;
            }
            GameEvent::WaveStarted { wave, .. } => {
                self.state.wave = *wave;
                self.state.phase = GamePhase::Playing;
            }
            GameEvent::WaveCompleted { reward, .. } => {
                self.state.gold += reward;
            }
            GameEvent::GameEnded { .. } => {
                self.state.phase = GamePhase::Finished;
            }
        }
    }

    fn snapshot_state(&self) -> EngineResult<serde_json::Value> {
        serde_json::to_value(&self.state).map_err(EngineError::from)
    }

    fn apply_snapshot_state(&mut self, state: &serde_json::Value) -> EngineResult<()> {
        self.state = serde_json::from_value(state.clone()).map_err(EngineError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_game() -> (GameAggregate, Uuid) {
        let mut game = GameAggregate::new(Uuid::new_v4());
        game.create("den".into(), "normal".into(), 4).unwrap();
        let player = Uuid::new_v4();
        game.join(player, "Alice".into()).unwrap();
        game.start_wave().unwrap();
        (game, player)
    }

    #[test]
    fn create_sets_difficulty_gold() {
        let mut game = GameAggregate::new(Uuid::new_v4());
        game.create("den".into(), "hard".into(), 4).unwrap();
        assert_eq!(game.state.gold, 100);
        assert_eq!(game.state.phase, GamePhase::Lobby);
        assert_eq!(game.version(), 1);
    }

    #[test]
    fn unknown_difficulty_is_rejected() {
        let mut game = GameAggregate::new(Uuid::new_v4());
        assert!(game.create("den".into(), "brutal".into(), 4).is_err());
        assert_eq!(game.version(), 0);
    }

    #[test]
    fn tower_placement_charges_gold_and_occupies_cell() {
        let (mut game, player) = playing_game();
        let (tower_id, cost) = game.place_tower(player, 3, 4, "basic").unwrap();
        assert_eq!(cost, 50);
        assert_eq!(game.state.gold, 100);
        assert!(game.state.towers.contains_key(&tower_id));

        let err = game.place_tower(player, 3, 4, "cannon").unwrap_err();
        assert!(err.to_string().contains("occupied"));
    }

    #[test]
    fn placement_requires_membership_and_funds() {
        let (mut game, player) = playing_game();
        assert!(game.place_tower(Uuid::new_v4(), 0, 0, "basic").is_err());

        game.place_tower(player, 0, 0, "cannon").unwrap();
        // 150 - 120 = 30 left; another cannon is unaffordable.
        let err = game.place_tower(player, 1, 0, "cannon").unwrap_err();
        assert!(err.to_string().contains("not enough gold"));
    }

    #[test]
    fn selling_refunds_half() {
        let (mut game, player) = playing_game();
        let (tower_id, _) = game.place_tower(player, 2, 2, "frost").unwrap();
        let refund = game.sell_tower(tower_id).unwrap();
        assert_eq!(refund, 45);
        assert_eq!(game.state.gold, 150 - 90 + 45);
        assert!(game.state.towers.is_empty());
    }

    #[test]
    fn waves_accumulate_and_reward() {
        let (mut game, _player) = playing_game();
        assert_eq!(game.state.wave, 1);
        game.complete_wave(40).unwrap();
        assert_eq!(game.state.gold, 190);
        game.start_wave().unwrap();
        assert_eq!(game.state.wave, 2);
    }

    #[test]
    fn finished_games_reject_mutation() {
        let (mut game, player) = playing_game();
        game.end("defeat".into()).unwrap();
        assert_eq!(game.state.phase, GamePhase::Finished);
        assert!(game.place_tower(player, 5, 5, "basic").is_err());
        assert!(game.start_wave().is_err());
        assert!(game.end("again".into()).is_err());
    }

    #[test]
    fn join_respects_capacity() {
        let mut game = GameAggregate::new(Uuid::new_v4());
        game.create("den".into(), "easy".into(), 1).unwrap();
        game.join(Uuid::new_v4(), "Alice".into()).unwrap();
        assert!(game.join(Uuid::new_v4(), "Bob".into()).is_err());
    }

    #[test]
    fn replayed_state_matches_recorded_state() {
        let (game, _player) = playing_game();
        let mut replayed = GameAggregate::new(game.id());
        for event in game.uncommitted() {
            replayed.replay(event);
        }
        assert_eq!(replayed.state.gold, game.state.gold);
        assert_eq!(replayed.state.wave, game.state.wave);
        assert_eq!(replayed.state.players, game.state.players);
    }
}
