//! Player process: a mailbox that answers invitations and move requests
//! by delegating to a strategy. Players hold no league-visible state and
//! never validate rules; a slow or invalid reply is their own risk since
//! the referee's deadline is authoritative.

use crate::{
    audit::AuditLog,
    config::Config,
    protocol::{
        codec::ValidatedRequest,
        messages::{
            MoveResponsePayload, RegisterPlayerPayload, RegisterResponsePayload,
            RequestMovePayload, StandingsResponsePayload,
        },
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::{ClientError, McpHandler, MessageClient, Reply},
};
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use uuid::Uuid;

/// Strategy contract: produce a move for an opaque step context. The
/// mailbox never interprets either side of the exchange.
pub trait Strategy: Send + Sync {
    fn compute_move(&self, step_context: &Value, game_type: &str) -> Value;
}

/// Strategy that always answers the same number, handy for the built-in
/// duel and for deterministic tests
pub struct FixedNumberStrategy {
    pub number: i64,
}

impl Strategy for FixedNumberStrategy {
    fn compute_move(&self, _step_context: &Value, _game_type: &str) -> Value {
        json!({ "number": self.number })
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub auth_token: String,
    pub league_id: Uuid,
}

#[derive(Default)]
pub struct PlayerCounters {
    pub requests: AtomicU64,
    pub invitations: AtomicU64,
    pub moves_served: AtomicU64,
    pub games_finished: AtomicU64,
}

pub struct PlayerService {
    config: Arc<Config>,
    audit: Arc<AuditLog>,
    client: MessageClient,
    strategy: Box<dyn Strategy>,
    player_id: String,
    credentials: Mutex<Option<Credentials>>,
    counters: PlayerCounters,
}

impl PlayerService {
    pub fn new(
        config: Arc<Config>,
        audit: Arc<AuditLog>,
        strategy: Box<dyn Strategy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client: MessageClient::new(&config.retries),
            player_id: config.agent_id.clone(),
            config,
            audit,
            strategy,
            credentials: Mutex::new(None),
            counters: PlayerCounters::default(),
        })
    }

    /// Registers with the manager and signals readiness, both idempotent
    pub async fn register(&self) -> Result<(), ClientError> {
        let timeout = Duration::from_millis(self.config.timeouts.registration_response_ms);
        let endpoint = &self.config.manager_endpoint;
        let sender = Sender::player(self.player_id.clone());

        let envelope = Envelope::new(MessageType::RegisterPlayerRequest, sender.clone());
        let payload = RegisterPlayerPayload {
            player_id: self.player_id.clone(),
            endpoint: self.config.self_endpoint(),
        };
        let body = self
            .client
            .send_idempotent(endpoint, envelope, json!(payload), timeout)
            .await?;

        let response: RegisterResponsePayload = serde_json::from_value(body.payload)
            .map_err(|err| ClientError::InvalidFrame(err.to_string()))?;
        let league_id = Uuid::parse_str(&response.league_id)
            .map_err(|err| ClientError::InvalidFrame(err.to_string()))?;
        info!("Registered as player {} in league {league_id}", self.player_id);

        let ready = Envelope::new(MessageType::AgentReadyRequest, sender)
            .with_auth_token(response.auth_token.clone())
            .with_league_id(league_id);
        self.client
            .send_idempotent(endpoint, ready, json!({}), timeout)
            .await?;
        info!("Player {} is ready", self.player_id);

        *self.credentials.lock() = Some(Credentials {
            auth_token: response.auth_token,
            league_id,
        });
        Ok(())
    }

    /// Fetches the latest standings, overall or for one round
    pub async fn query_standings(
        &self,
        round_id: Option<Uuid>,
    ) -> Result<StandingsResponsePayload, ClientError> {
        let credentials = self
            .credentials
            .lock()
            .clone()
            .ok_or_else(|| ClientError::InvalidFrame("player is not registered".to_string()))?;

        let mut envelope = Envelope::new(
            MessageType::QueryStandings,
            Sender::player(self.player_id.clone()),
        )
        .with_auth_token(credentials.auth_token)
        .with_league_id(credentials.league_id);
        if let Some(round_id) = round_id {
            envelope = envelope.with_round_id(round_id);
        }

        let timeout = Duration::from_millis(self.config.timeouts.registration_response_ms);
        let body = self
            .client
            .send_idempotent(&self.config.manager_endpoint, envelope, json!({}), timeout)
            .await?;
        serde_json::from_value(body.payload)
            .map_err(|err| ClientError::InvalidFrame(err.to_string()))
    }

    fn handle_invitation(&self, envelope: Envelope) -> ServerResult<Reply> {
        self.counters.invitations.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Player {} joining match {:?}",
            self.player_id, envelope.match_id
        );
        let reply_envelope = envelope.reply(
            MessageType::GameJoinAck,
            Sender::player(self.player_id.clone()),
        );
        Ok(Reply::new(reply_envelope, json!({})))
    }

    fn handle_request_move(
        &self,
        envelope: Envelope,
        payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let request: RequestMovePayload = match payload {
            Some(value) => serde_json::from_value(value).map_err(|err| {
                ServerError::Validation {
                    reason: format!("malformed payload: {err}"),
                }
            })?,
            None => {
                return Err(ServerError::MissingField {
                    field: "payload".to_string(),
                })
            }
        };

        let game_type = envelope.game_type.clone().unwrap_or_default();
        let move_payload = self
            .strategy
            .compute_move(&request.step_context, &game_type);
        self.counters.moves_served.fetch_add(1, Ordering::Relaxed);

        let reply_envelope = envelope.reply(
            MessageType::MoveResponse,
            Sender::player(self.player_id.clone()),
        );
        Ok(Reply::new(
            reply_envelope,
            json!(MoveResponsePayload { move_payload }),
        ))
    }

    fn handle_game_over(&self, envelope: Envelope) -> ServerResult<Reply> {
        self.counters.games_finished.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Player {} saw match {:?} finish",
            self.player_id, envelope.match_id
        );
        let reply_envelope = envelope.reply(
            MessageType::GameOverAck,
            Sender::player(self.player_id.clone()),
        );
        Ok(Reply::new(reply_envelope, json!({})))
    }
}

impl McpHandler for PlayerService {
    fn identity(&self) -> Sender {
        Sender::player(self.player_id.clone())
    }

    fn status(&self) -> Value {
        json!({
            "role": "player",
            "player_id": self.player_id,
            "requests": self.counters.requests.load(Ordering::Relaxed),
            "invitations": self.counters.invitations.load(Ordering::Relaxed),
            "moves_served": self.counters.moves_served.load(Ordering::Relaxed),
            "games_finished": self.counters.games_finished.load(Ordering::Relaxed),
            "audit_records": self.audit.written(),
        })
    }

    fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn handle(
        &self,
        request: ValidatedRequest,
    ) -> impl Future<Output = ServerResult<Reply>> + Send {
        async move {
            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            let ValidatedRequest {
                envelope, payload, ..
            } = request;

            match envelope.message_type {
                MessageType::GameInvitation => self.handle_invitation(envelope),
                MessageType::RequestMove => self.handle_request_move(envelope, payload),
                MessageType::GameOver => self.handle_game_over(envelope),
                other => Err(ServerError::Validation {
                    reason: format!("message type {other} is not handled by a player"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{FixedNumberStrategy, Strategy};
    use serde_json::json;

    #[test]
    fn test_fixed_strategy_ignores_context() {
        let strategy = FixedNumberStrategy { number: 4 };
        let a = strategy.compute_move(&json!({"step": 0}), "sum_duel");
        let b = strategy.compute_move(&json!({"step": 7, "noise": true}), "other");
        assert_eq!(a, json!({"number": 4}));
        assert_eq!(a, b);
    }
}
