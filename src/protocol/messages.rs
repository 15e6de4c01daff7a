//! Typed payload bodies for the message catalog. Payloads ride next to
//! the envelope inside `params`; anything game-specific stays an opaque
//! `Value` end to end.

use crate::utils::types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-player result of a finished match
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRefereePayload {
    pub referee_id: AgentId,
    /// Base URL the manager dispatches assignments to
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPlayerPayload {
    pub player_id: AgentId,
    /// Base URL referees reach this player on
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponsePayload {
    pub status: String,
    pub auth_token: String,
    pub league_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReadyResponsePayload {
    pub status: String,
}

/// Player reference inside a match assignment, carrying the endpoint the
/// referee needs to reach the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub player_id: AgentId,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAssignmentPayload {
    /// Home player first; order only matters for the engine's first-mover
    /// convention
    pub players: Vec<PlayerRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInvitationPayload {
    pub players: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMovePayload {
    pub step_number: u32,
    /// Opaque engine state handed through to the strategy
    pub step_context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResponsePayload {
    pub move_payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub outcome: BTreeMap<String, OutcomeKind>,
    pub final_state: Value,
}

fn is_false(value: &bool) -> bool {
    !value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultReportPayload {
    pub players: Vec<AgentId>,
    pub outcome: BTreeMap<String, OutcomeKind>,
    pub points: BTreeMap<String, i64>,
    pub game_metadata: Value,
    /// Set when the referee could not finish the match for a reason that
    /// is not a clean forfeit; the match lands in FAILED and no result
    /// row is written
    #[serde(default, skip_serializing_if = "is_false")]
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultAckPayload {
    /// Absent for failed matches, which store no result row
    pub result_id: Option<String>,
    pub match_id: String,
    /// `accepted` on first intake, `duplicate` for an idempotent replay,
    /// `failed` when the report marked the match failed
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub rank: u32,
    pub player_id: AgentId,
    pub points: i64,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub matches_played: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsResponsePayload {
    pub round_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub standings: Vec<StandingRow>,
}
