use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub mod leagues;
pub mod match_results;
pub mod matches;
pub mod player_rankings;
pub mod players;
pub mod referees;
pub mod rounds;
pub mod standings_snapshots;

pub type League = leagues::Model;
pub type Referee = referees::Model;
pub type Player = players::Model;
pub type Round = rounds::Model;
pub type Match = matches::Model;
pub type MatchResult = match_results::Model;
pub type StandingsSnapshot = standings_snapshots::Model;
pub type PlayerRanking = player_rankings::Model;

/// Registration lifecycle shared by referees and players. A registered
/// agent only becomes ACTIVE through an explicit AGENT_READY_REQUEST;
/// the manager never auto-promotes.
#[derive(
    Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "u8", db_type = "TinyUnsigned")]
#[repr(u8)]
pub enum AgentStatus {
    #[sea_orm(num_value = 0)]
    Registered = 0,
    #[sea_orm(num_value = 1)]
    Active = 1,
    #[sea_orm(num_value = 2)]
    Suspended = 2,
    #[sea_orm(num_value = 3)]
    Shutdown = 3,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}
