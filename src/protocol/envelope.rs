//! Protocol envelope carried inside the JSON-RPC `params` object. Every
//! message multiplexes over the single `league.handle` method and is routed
//! by `message_type`, so new message types never change wire routing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use uuid::Uuid;

/// Protocol identifier expected in every envelope
pub const PROTOCOL_VERSION: &str = "league.v2";

/// The single JSON-RPC method all league traffic multiplexes on
pub const RPC_METHOD: &str = "league.handle";

/// Contextual envelope fields that are required only for certain
/// message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    AuthToken,
    LeagueId,
    RoundId,
    MatchId,
    GameType,
}

impl ContextField {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::AuthToken => "auth_token",
            Self::LeagueId => "league_id",
            Self::RoundId => "round_id",
            Self::MatchId => "match_id",
            Self::GameType => "game_type",
        }
    }
}

/// Catalog of every message type in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RegisterRefereeRequest,
    RegisterRefereeResponse,
    RegisterPlayerRequest,
    RegisterPlayerResponse,
    AgentReadyRequest,
    AgentReadyResponse,
    AdminStartLeagueRequest,
    AdminStartLeagueResponse,
    AdminGetStatusRequest,
    AdminGetStatusResponse,
    MatchAssignment,
    MatchAssignmentAck,
    GameInvitation,
    GameJoinAck,
    RequestMove,
    MoveResponse,
    GameOver,
    GameOverAck,
    MatchResultReport,
    MatchResultAck,
    QueryStandings,
    StandingsResponse,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterRefereeRequest => "REGISTER_REFEREE_REQUEST",
            Self::RegisterRefereeResponse => "REGISTER_REFEREE_RESPONSE",
            Self::RegisterPlayerRequest => "REGISTER_PLAYER_REQUEST",
            Self::RegisterPlayerResponse => "REGISTER_PLAYER_RESPONSE",
            Self::AgentReadyRequest => "AGENT_READY_REQUEST",
            Self::AgentReadyResponse => "AGENT_READY_RESPONSE",
            Self::AdminStartLeagueRequest => "ADMIN_START_LEAGUE_REQUEST",
            Self::AdminStartLeagueResponse => "ADMIN_START_LEAGUE_RESPONSE",
            Self::AdminGetStatusRequest => "ADMIN_GET_STATUS_REQUEST",
            Self::AdminGetStatusResponse => "ADMIN_GET_STATUS_RESPONSE",
            Self::MatchAssignment => "MATCH_ASSIGNMENT",
            Self::MatchAssignmentAck => "MATCH_ASSIGNMENT_ACK",
            Self::GameInvitation => "GAME_INVITATION",
            Self::GameJoinAck => "GAME_JOIN_ACK",
            Self::RequestMove => "REQUEST_MOVE",
            Self::MoveResponse => "MOVE_RESPONSE",
            Self::GameOver => "GAME_OVER",
            Self::GameOverAck => "GAME_OVER_ACK",
            Self::MatchResultReport => "MATCH_RESULT_REPORT",
            Self::MatchResultAck => "MATCH_RESULT_ACK",
            Self::QueryStandings => "QUERY_STANDINGS",
            Self::StandingsResponse => "STANDINGS_RESPONSE",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "REGISTER_REFEREE_REQUEST" => Self::RegisterRefereeRequest,
            "REGISTER_REFEREE_RESPONSE" => Self::RegisterRefereeResponse,
            "REGISTER_PLAYER_REQUEST" => Self::RegisterPlayerRequest,
            "REGISTER_PLAYER_RESPONSE" => Self::RegisterPlayerResponse,
            "AGENT_READY_REQUEST" => Self::AgentReadyRequest,
            "AGENT_READY_RESPONSE" => Self::AgentReadyResponse,
            "ADMIN_START_LEAGUE_REQUEST" => Self::AdminStartLeagueRequest,
            "ADMIN_START_LEAGUE_RESPONSE" => Self::AdminStartLeagueResponse,
            "ADMIN_GET_STATUS_REQUEST" => Self::AdminGetStatusRequest,
            "ADMIN_GET_STATUS_RESPONSE" => Self::AdminGetStatusResponse,
            "MATCH_ASSIGNMENT" => Self::MatchAssignment,
            "MATCH_ASSIGNMENT_ACK" => Self::MatchAssignmentAck,
            "GAME_INVITATION" => Self::GameInvitation,
            "GAME_JOIN_ACK" => Self::GameJoinAck,
            "REQUEST_MOVE" => Self::RequestMove,
            "MOVE_RESPONSE" => Self::MoveResponse,
            "GAME_OVER" => Self::GameOver,
            "GAME_OVER_ACK" => Self::GameOverAck,
            "MATCH_RESULT_REPORT" => Self::MatchResultReport,
            "MATCH_RESULT_ACK" => Self::MatchResultAck,
            "QUERY_STANDINGS" => Self::QueryStandings,
            "STANDINGS_RESPONSE" => Self::StandingsResponse,
            _ => return None,
        })
    }

    /// Contextual envelope fields required for this message type, enforced
    /// as the last step of inbound validation
    pub fn required_context(&self) -> &'static [ContextField] {
        use ContextField::*;
        match self {
            Self::RegisterRefereeRequest
            | Self::RegisterPlayerRequest
            | Self::AdminStartLeagueRequest
            | Self::AdminStartLeagueResponse
            | Self::AdminGetStatusRequest
            | Self::AdminGetStatusResponse
            | Self::AgentReadyResponse => &[],
            Self::RegisterRefereeResponse | Self::RegisterPlayerResponse => {
                &[AuthToken, LeagueId]
            }
            Self::AgentReadyRequest => &[AuthToken, LeagueId],
            Self::MatchAssignment | Self::MatchAssignmentAck | Self::MatchResultReport => {
                &[AuthToken, LeagueId, RoundId, MatchId, GameType]
            }
            Self::MatchResultAck => &[LeagueId, RoundId, MatchId],
            Self::GameInvitation | Self::RequestMove | Self::GameOver => &[MatchId, GameType],
            Self::GameJoinAck | Self::MoveResponse | Self::GameOverAck => &[MatchId],
            Self::QueryStandings => &[AuthToken, LeagueId],
            Self::StandingsResponse => &[LeagueId],
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_str(&value)
            .ok_or_else(|| de::Error::custom(format!("unknown message type: {value}")))
    }
}

/// Identity of the process a message originates from. The wire format is
/// `league_manager` or `referee:<id>` / `player:<id>` where the id is
/// restricted to `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    LeagueManager,
    Referee(String),
    Player(String),
}

/// Whether an agent id is made of the allowed identifier characters
fn valid_agent_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Sender {
    pub fn referee(id: impl Into<String>) -> Self {
        Self::Referee(id.into())
    }

    pub fn player(id: impl Into<String>) -> Self {
        Self::Player(id.into())
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value == "league_manager" {
            return Some(Self::LeagueManager);
        }
        let (role, id) = value.split_once(':')?;
        if !valid_agent_id(id) {
            return None;
        }
        match role {
            "referee" => Some(Self::Referee(id.to_string())),
            "player" => Some(Self::Player(id.to_string())),
            _ => None,
        }
    }

    /// Agent id portion for referee and player senders
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::LeagueManager => None,
            Self::Referee(id) | Self::Player(id) => Some(id),
        }
    }
}

impl Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeagueManager => f.write_str("league_manager"),
            Self::Referee(id) => write!(f, "referee:{id}"),
            Self::Player(id) => write!(f, "player:{id}"),
        }
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).ok_or_else(|| de::Error::custom(format!("invalid sender: {value}")))
    }
}

/// Serde module keeping envelope timestamps in canonical ISO-8601 form with
/// an explicit Zulu offset. Inputs with a non-zero offset are rejected.
mod utc_zulu {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let value = String::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&value)
            .map_err(|err| de::Error::custom(format!("invalid timestamp: {err}")))?;
        if parsed.offset().local_minus_utc() != 0 {
            return Err(de::Error::custom("timestamp offset must be UTC zero"));
        }
        Ok(parsed.with_timezone(&Utc))
    }
}

/// Protocol header carried with every message. The five base fields are
/// always required; the contextual fields are required per message type
/// (see [MessageType::required_context]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub message_type: MessageType,
    pub sender: Sender,
    #[serde(with = "utc_zulu")]
    pub timestamp: DateTime<Utc>,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
}

impl Envelope {
    /// Creates an envelope with a fresh conversation id and the current
    /// timestamp
    pub fn new(message_type: MessageType, sender: Sender) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            message_type,
            sender,
            timestamp: Utc::now(),
            conversation_id: Uuid::new_v4(),
            auth_token: None,
            league_id: None,
            round_id: None,
            match_id: None,
            game_type: None,
        }
    }

    /// Creates a response envelope correlated to this request. The
    /// conversation id is preserved so audit records line up.
    pub fn reply(&self, message_type: MessageType, sender: Sender) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            message_type,
            sender,
            timestamp: Utc::now(),
            conversation_id: self.conversation_id,
            auth_token: None,
            league_id: self.league_id,
            round_id: self.round_id,
            match_id: self.match_id,
            game_type: self.game_type.clone(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_league_id(mut self, league_id: Uuid) -> Self {
        self.league_id = Some(league_id);
        self
    }

    pub fn with_round_id(mut self, round_id: Uuid) -> Self {
        self.round_id = Some(round_id);
        self
    }

    pub fn with_match_id(mut self, match_id: Uuid) -> Self {
        self.match_id = Some(match_id);
        self
    }

    pub fn with_game_type(mut self, game_type: impl Into<String>) -> Self {
        self.game_type = Some(game_type.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::{MessageType, Sender};

    #[test]
    fn test_message_type_names_round_trip() {
        let types = [
            MessageType::RegisterRefereeRequest,
            MessageType::AgentReadyRequest,
            MessageType::MatchAssignment,
            MessageType::RequestMove,
            MessageType::MatchResultReport,
            MessageType::StandingsResponse,
        ];
        for message_type in types {
            assert_eq!(
                MessageType::from_str(message_type.as_str()),
                Some(message_type)
            );
        }
    }

    #[test]
    fn test_sender_parsing() {
        assert_eq!(
            Sender::parse("league_manager"),
            Some(Sender::LeagueManager)
        );
        assert_eq!(
            Sender::parse("referee:ref-1"),
            Some(Sender::Referee("ref-1".to_string()))
        );
        assert_eq!(
            Sender::parse("player:alice_2"),
            Some(Sender::Player("alice_2".to_string()))
        );

        // Bad role, empty id and illegal characters are all rejected
        assert_eq!(Sender::parse("admin:root"), None);
        assert_eq!(Sender::parse("player:"), None);
        assert_eq!(Sender::parse("player:bad id"), None);
        assert_eq!(Sender::parse("referee"), None);
    }

    #[test]
    fn test_sender_display_round_trip() {
        for raw in ["league_manager", "referee:r1", "player:alice"] {
            let sender = Sender::parse(raw).unwrap();
            assert_eq!(sender.to_string(), raw);
        }
    }
}
