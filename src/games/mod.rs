//! Pluggable game rule contract consumed by the referee's match executor.
//! The executor conducts the protocol and enforces deadlines; everything
//! game-specific sits behind this interface, and step contexts and move
//! payloads cross it as opaque values.

use crate::{protocol::messages::OutcomeKind, utils::types::GameType};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub mod sum_duel;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("move rejected by rules")]
    InvalidMove,
    #[error("engine failure: {0}")]
    Failed(String),
}

/// Terminal evaluation of a finished game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    pub outcome: BTreeMap<String, OutcomeKind>,
    pub points: BTreeMap<String, i64>,
}

/// Rules of one game type. The engine owns all game state; the referee
/// only relays contexts and payloads between it and the players.
pub trait GameEngine: Send {
    /// Prepares state for a fresh match between exactly two players.
    /// `config` carries the scoring table and any game specific knobs.
    fn initialize(
        &mut self,
        match_id: &str,
        players: &[String; 2],
        config: &Value,
    ) -> Result<(), GameError>;

    /// Which player the next move must be solicited from
    fn current_mover(&self) -> String;

    /// Opaque context handed to the player with the move request
    fn step_context(&self, player_id: &str) -> Value;

    fn validate_move(&self, player_id: &str, move_payload: &Value) -> bool;

    fn apply_move(&mut self, player_id: &str, move_payload: &Value) -> Result<(), GameError>;

    fn is_terminal(&self) -> bool;

    /// Outcome and points once `is_terminal` reports true
    fn outcome(&self) -> GameOutcome;
}

pub type EngineFactory = Box<dyn Fn() -> Box<dyn GameEngine> + Send + Sync>;

/// Engine factories keyed by game type. Assignments for unknown game
/// types are rejected before a match ever starts.
#[derive(Default)]
pub struct GameRegistry {
    factories: HashMap<GameType, EngineFactory>,
}

impl GameRegistry {
    pub fn register(&mut self, game_type: impl Into<String>, factory: EngineFactory) {
        self.factories.insert(game_type.into(), factory);
    }

    pub fn supports(&self, game_type: &str) -> bool {
        self.factories.contains_key(game_type)
    }

    pub fn create(&self, game_type: &str) -> Option<Box<dyn GameEngine>> {
        self.factories.get(game_type).map(|factory| factory())
    }

    /// Registry with every built-in engine registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(
            sum_duel::GAME_TYPE,
            Box::new(|| Box::new(sum_duel::SumDuel::default())),
        );
        registry
    }
}
