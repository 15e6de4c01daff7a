//! Built-in number duel used by the local binaries and the test suite.
//! Players alternate submitting small numbers; when everyone has played
//! their allotted moves the higher total wins, equal totals draw. Small
//! on purpose, the interesting machinery lives in the executor.

use super::{GameEngine, GameError, GameOutcome};
use crate::protocol::messages::OutcomeKind;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const GAME_TYPE: &str = "sum_duel";

/// Largest number accepted per move
const MAX_NUMBER: i64 = 9;

#[derive(Default)]
pub struct SumDuel {
    match_id: String,
    players: Vec<String>,
    totals: BTreeMap<String, i64>,
    moves_made: u32,
    moves_per_player: u32,
    win_points: i64,
    draw_points: i64,
    loss_points: i64,
}

impl GameEngine for SumDuel {
    fn initialize(
        &mut self,
        match_id: &str,
        players: &[String; 2],
        config: &Value,
    ) -> Result<(), GameError> {
        if players[0] == players[1] {
            return Err(GameError::Failed("players must be distinct".to_string()));
        }
        self.match_id = match_id.to_string();
        self.players = players.to_vec();
        for player in players {
            self.totals.insert(player.clone(), 0);
        }
        self.moves_per_player = config
            .get("moves_per_player")
            .and_then(Value::as_u64)
            .unwrap_or(2) as u32;
        let scoring = config.get("scoring").cloned().unwrap_or(Value::Null);
        self.win_points = scoring.get("win").and_then(Value::as_i64).unwrap_or(3);
        self.draw_points = scoring.get("draw").and_then(Value::as_i64).unwrap_or(1);
        self.loss_points = scoring.get("loss").and_then(Value::as_i64).unwrap_or(0);
        Ok(())
    }

    fn current_mover(&self) -> String {
        // Home moves on even turns, away on odd
        self.players[(self.moves_made % 2) as usize].clone()
    }

    fn step_context(&self, player_id: &str) -> Value {
        json!({
            "match_id": self.match_id,
            "step": self.moves_made,
            "your_total": self.totals.get(player_id).copied().unwrap_or(0),
            "max_number": MAX_NUMBER,
        })
    }

    fn validate_move(&self, _player_id: &str, move_payload: &Value) -> bool {
        matches!(
            move_payload.get("number").and_then(Value::as_i64),
            Some(number) if (0..=MAX_NUMBER).contains(&number)
        )
    }

    fn apply_move(&mut self, player_id: &str, move_payload: &Value) -> Result<(), GameError> {
        let number = move_payload
            .get("number")
            .and_then(Value::as_i64)
            .ok_or(GameError::InvalidMove)?;
        if !(0..=MAX_NUMBER).contains(&number) {
            return Err(GameError::InvalidMove);
        }
        *self
            .totals
            .get_mut(player_id)
            .ok_or_else(|| GameError::Failed(format!("unknown player {player_id}")))? += number;
        self.moves_made += 1;
        Ok(())
    }

    fn is_terminal(&self) -> bool {
        self.moves_made >= self.moves_per_player * 2
    }

    fn outcome(&self) -> GameOutcome {
        let home = &self.players[0];
        let away = &self.players[1];
        let home_total = self.totals.get(home).copied().unwrap_or(0);
        let away_total = self.totals.get(away).copied().unwrap_or(0);

        let mut outcome = BTreeMap::new();
        let mut points = BTreeMap::new();
        if home_total == away_total {
            outcome.insert(home.clone(), OutcomeKind::Draw);
            outcome.insert(away.clone(), OutcomeKind::Draw);
            points.insert(home.clone(), self.draw_points);
            points.insert(away.clone(), self.draw_points);
        } else {
            let (winner, loser) = if home_total > away_total {
                (home, away)
            } else {
                (away, home)
            };
            outcome.insert(winner.clone(), OutcomeKind::Win);
            outcome.insert(loser.clone(), OutcomeKind::Loss);
            points.insert(winner.clone(), self.win_points);
            points.insert(loser.clone(), self.loss_points);
        }

        GameOutcome { outcome, points }
    }
}

#[cfg(test)]
mod test {
    use super::{GameEngine, SumDuel, GAME_TYPE};
    use crate::protocol::messages::OutcomeKind;
    use serde_json::json;

    fn engine() -> SumDuel {
        let mut engine = SumDuel::default();
        engine
            .initialize(
                "m1",
                &["alice".to_string(), "bob".to_string()],
                &json!({"scoring": {"win": 3, "draw": 1, "loss": 0}}),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_game_type_name() {
        assert_eq!(GAME_TYPE, "sum_duel");
    }

    #[test]
    fn test_alternating_movers() {
        let mut engine = engine();
        assert_eq!(engine.current_mover(), "alice");
        engine.apply_move("alice", &json!({"number": 3})).unwrap();
        assert_eq!(engine.current_mover(), "bob");
        engine.apply_move("bob", &json!({"number": 5})).unwrap();
        assert_eq!(engine.current_mover(), "alice");
    }

    #[test]
    fn test_move_validation() {
        let engine = engine();
        assert!(engine.validate_move("alice", &json!({"number": 0})));
        assert!(engine.validate_move("alice", &json!({"number": 9})));
        assert!(!engine.validate_move("alice", &json!({"number": 10})));
        assert!(!engine.validate_move("alice", &json!({"number": -1})));
        assert!(!engine.validate_move("alice", &json!({"value": 3})));
    }

    #[test]
    fn test_higher_total_wins() {
        let mut engine = engine();
        for (player, number) in [("alice", 5), ("bob", 2), ("alice", 4), ("bob", 1)] {
            engine.apply_move(player, &json!({"number": number})).unwrap();
        }
        assert!(engine.is_terminal());
        let result = engine.outcome();
        assert_eq!(result.outcome["alice"], OutcomeKind::Win);
        assert_eq!(result.outcome["bob"], OutcomeKind::Loss);
        assert_eq!(result.points["alice"], 3);
        assert_eq!(result.points["bob"], 0);
    }

    #[test]
    fn test_equal_totals_draw() {
        let mut engine = engine();
        for (player, number) in [("alice", 5), ("bob", 3), ("alice", 1), ("bob", 3)] {
            engine.apply_move(player, &json!({"number": number})).unwrap();
        }
        let result = engine.outcome();
        assert_eq!(result.outcome["alice"], OutcomeKind::Draw);
        assert_eq!(result.outcome["bob"], OutcomeKind::Draw);
        assert_eq!(result.points["alice"], 1);
        assert_eq!(result.points["bob"], 1);
    }
}
