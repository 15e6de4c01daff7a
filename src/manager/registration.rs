//! Admission of referees and players during the registration window.
//! Registration is idempotent per agent id; replays return the original
//! token without creating a second row.

use super::LeagueManager;
use crate::{
    auth::AgentType,
    database::entities::{AgentStatus, Player, Referee},
    protocol::{
        messages::{
            AgentReadyResponsePayload, RegisterPlayerPayload, RegisterRefereePayload,
            RegisterResponsePayload,
        },
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::Reply,
};
use log::info;
use serde_json::Value;
use std::sync::atomic::Ordering;

impl LeagueManager {
    pub(super) async fn handle_register_referee(
        &self,
        envelope: Envelope,
        payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let payload: RegisterRefereePayload = parse_payload(payload)?;

        match &envelope.sender {
            Sender::Referee(id) if *id == payload.referee_id => {}
            _ => {
                return Err(ServerError::Validation {
                    reason: "sender does not match the referee id being registered".to_string(),
                })
            }
        }

        self.ensure_registration_open()?;

        let league_id = self.state.league_id.to_string();
        let token = match Referee::by_id(&self.db, &payload.referee_id).await? {
            Some(existing) => {
                if existing.endpoint != payload.endpoint {
                    return Err(ServerError::DuplicateRegistration {
                        agent_id: payload.referee_id,
                    });
                }
                existing.auth_token
            }
            None => {
                let token = self.auth.issue(&payload.referee_id, AgentType::Referee);
                Referee::create(
                    &self.db,
                    payload.referee_id.clone(),
                    league_id.clone(),
                    token.clone(),
                    payload.endpoint.clone(),
                )
                .await?;
                self.counters.registrations.fetch_add(1, Ordering::Relaxed);
                info!("Registered referee {}", payload.referee_id);
                token
            }
        };

        let reply_envelope = envelope
            .reply(MessageType::RegisterRefereeResponse, Sender::LeagueManager)
            .with_auth_token(token.clone())
            .with_league_id(self.state.league_id);
        let body = RegisterResponsePayload {
            status: AgentStatus::Registered.as_str().to_string(),
            auth_token: token,
            league_id,
        };
        reply_with(reply_envelope, &body)
    }

    pub(super) async fn handle_register_player(
        &self,
        envelope: Envelope,
        payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let payload: RegisterPlayerPayload = parse_payload(payload)?;

        match &envelope.sender {
            Sender::Player(id) if *id == payload.player_id => {}
            _ => {
                return Err(ServerError::Validation {
                    reason: "sender does not match the player id being registered".to_string(),
                })
            }
        }

        self.ensure_registration_open()?;

        // Players can only join a league that already has someone able to
        // run their matches
        if Referee::count(&self.db).await? == 0 {
            return Err(ServerError::PreconditionFailed {
                reason: "at least one referee must register before any player".to_string(),
            });
        }

        let league_id = self.state.league_id.to_string();
        let token = match Player::by_id(&self.db, &payload.player_id).await? {
            Some(existing) => {
                if existing.endpoint != payload.endpoint {
                    return Err(ServerError::DuplicateRegistration {
                        agent_id: payload.player_id,
                    });
                }
                existing.auth_token
            }
            None => {
                let token = self.auth.issue(&payload.player_id, AgentType::Player);
                Player::create(
                    &self.db,
                    payload.player_id.clone(),
                    league_id.clone(),
                    token.clone(),
                    payload.endpoint.clone(),
                )
                .await?;
                self.counters.registrations.fetch_add(1, Ordering::Relaxed);
                info!("Registered player {}", payload.player_id);
                token
            }
        };

        let reply_envelope = envelope
            .reply(MessageType::RegisterPlayerResponse, Sender::LeagueManager)
            .with_auth_token(token.clone())
            .with_league_id(self.state.league_id);
        let body = RegisterResponsePayload {
            status: AgentStatus::Registered.as_str().to_string(),
            auth_token: token,
            league_id,
        };
        reply_with(reply_envelope, &body)
    }

    /// Explicit readiness signal. Agents are never auto-promoted; only an
    /// ACTIVE agent is scheduled or assigned.
    pub(super) async fn handle_agent_ready(
        &self,
        envelope: Envelope,
        _payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let token = required_token(&envelope)?;
        let identity = self.auth.verify_sender(token, &envelope.sender)?;

        let current = match identity.agent_type {
            AgentType::Referee => {
                let referee = Referee::by_id(&self.db, &identity.agent_id)
                    .await?
                    .ok_or(ServerError::InvalidToken)?;
                if referee.status == AgentStatus::Registered {
                    self.ensure_registration_open()?;
                    referee.set_status(&self.db, AgentStatus::Active).await?.status
                } else {
                    referee.status
                }
            }
            AgentType::Player => {
                let player = Player::by_id(&self.db, &identity.agent_id)
                    .await?
                    .ok_or(ServerError::InvalidToken)?;
                if player.status == AgentStatus::Registered {
                    self.ensure_registration_open()?;
                    player.set_status(&self.db, AgentStatus::Active).await?.status
                } else {
                    player.status
                }
            }
        };

        let reply_envelope = envelope
            .reply(MessageType::AgentReadyResponse, Sender::LeagueManager)
            .with_league_id(self.state.league_id);
        reply_with(
            reply_envelope,
            &AgentReadyResponsePayload {
                status: current.as_str().to_string(),
            },
        )
    }

    fn ensure_registration_open(&self) -> ServerResult<()> {
        if !self
            .state
            .registration_open(self.config.registration.window_seconds)
        {
            return Err(ServerError::RegistrationClosed);
        }
        Ok(())
    }
}

/// Deserializes a required payload body, mapping malformed shapes to a
/// validation error
pub(super) fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: Option<Value>,
) -> ServerResult<T> {
    let value = payload.ok_or(ServerError::MissingField {
        field: "payload".to_string(),
    })?;
    serde_json::from_value(value).map_err(|err| ServerError::Validation {
        reason: format!("malformed payload: {err}"),
    })
}

/// The auth token the codec already required for this message type
pub(super) fn required_token(envelope: &Envelope) -> ServerResult<&str> {
    envelope
        .auth_token
        .as_deref()
        .ok_or(ServerError::MissingField {
            field: "auth_token".to_string(),
        })
}

/// Packs a serializable body next to the response envelope
pub(super) fn reply_with<T: serde::Serialize>(
    envelope: Envelope,
    body: &T,
) -> ServerResult<Reply> {
    let payload = serde_json::to_value(body).map_err(|err| ServerError::Internal {
        reason: format!("response serialization failed: {err}"),
    })?;
    Ok(Reply::new(envelope, payload))
}
