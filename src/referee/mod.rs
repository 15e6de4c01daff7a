//! Referee process: registers with the manager, accepts one match
//! assignment at a time and conducts it through the executor. The busy
//! slot guarantees a referee never runs two matches at once.

use crate::{
    audit::AuditLog,
    config::Config,
    games::GameRegistry,
    protocol::{
        codec::ValidatedRequest,
        messages::{
            MatchAssignmentPayload, PlayerRef, RegisterRefereePayload, RegisterResponsePayload,
        },
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::{ClientError, McpHandler, MessageClient, Reply},
};
use log::{info, warn};
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
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod executor;

/// Token and league binding obtained at registration time
#[derive(Debug, Clone)]
pub struct Credentials {
    pub auth_token: String,
    pub league_id: Uuid,
}

/// One accepted assignment handed to the executor
#[derive(Debug, Clone)]
pub struct MatchTask {
    pub match_id: Uuid,
    pub round_id: Uuid,
    pub game_type: String,
    pub players: Vec<PlayerRef>,
}

#[derive(Default)]
pub struct RefereeCounters {
    pub requests: AtomicU64,
    pub matches_started: AtomicU64,
    pub matches_completed: AtomicU64,
    pub forfeits: AtomicU64,
    pub failures: AtomicU64,
}

pub struct RefereeService {
    pub(crate) config: Arc<Config>,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) client: MessageClient,
    pub(crate) registry: GameRegistry,
    pub(crate) referee_id: String,
    pub(crate) credentials: Mutex<Option<Credentials>>,
    /// Match currently being conducted, if any
    pub(crate) active_match: Mutex<Option<Uuid>>,
    work_tx: mpsc::UnboundedSender<MatchTask>,
    work_rx: Mutex<Option<mpsc::UnboundedReceiver<MatchTask>>>,
    pub(crate) counters: RefereeCounters,
}

impl RefereeService {
    pub fn new(config: Arc<Config>, audit: Arc<AuditLog>, registry: GameRegistry) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            client: MessageClient::new(&config.retries),
            referee_id: config.agent_id.clone(),
            config,
            audit,
            registry,
            credentials: Mutex::new(None),
            active_match: Mutex::new(None),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            counters: RefereeCounters::default(),
        })
    }

    /// Spawns the single match worker. One worker means one match at a
    /// time, matching the busy-flag contract with the manager.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let mut rx = self
            .work_rx
            .lock()
            .take()
            .expect("referee worker started twice");
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                this.run_match(task).await;
            }
        });
    }

    /// Registers with the manager and signals readiness. Both calls are
    /// idempotent so a crashed referee re-registers to the same token.
    pub async fn register(&self) -> Result<(), ClientError> {
        let timeout = Duration::from_millis(self.config.timeouts.registration_response_ms);
        let endpoint = &self.config.manager_endpoint;
        let sender = Sender::referee(self.referee_id.clone());

        let envelope = Envelope::new(MessageType::RegisterRefereeRequest, sender.clone());
        let payload = RegisterRefereePayload {
            referee_id: self.referee_id.clone(),
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
        info!(
            "Registered as referee {} in league {league_id}",
            self.referee_id
        );

        let ready = Envelope::new(MessageType::AgentReadyRequest, sender)
            .with_auth_token(response.auth_token.clone())
            .with_league_id(league_id);
        self.client
            .send_idempotent(endpoint, ready, json!({}), timeout)
            .await?;
        info!("Referee {} is ready", self.referee_id);

        *self.credentials.lock() = Some(Credentials {
            auth_token: response.auth_token,
            league_id,
        });
        Ok(())
    }

    fn credentials(&self) -> ServerResult<Credentials> {
        self.credentials
            .lock()
            .clone()
            .ok_or(ServerError::PreconditionFailed {
                reason: "referee is not registered yet".to_string(),
            })
    }

    /// Accepts a MATCH_ASSIGNMENT: validates the manager's proof token,
    /// checks the game type and busy slot, then queues the match for the
    /// worker and acks immediately.
    async fn handle_assignment(
        &self,
        envelope: Envelope,
        payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let credentials = self.credentials()?;

        if envelope.sender != Sender::LeagueManager {
            return Err(ServerError::Validation {
                reason: "assignments only come from the league manager".to_string(),
            });
        }
        if envelope.auth_token.as_deref() != Some(credentials.auth_token.as_str()) {
            return Err(ServerError::InvalidToken);
        }
        if envelope.league_id != Some(credentials.league_id) {
            return Err(ServerError::Validation {
                reason: "assignment is for a different league".to_string(),
            });
        }

        let game_type = envelope.game_type.clone().ok_or(ServerError::MissingField {
            field: "game_type".to_string(),
        })?;
        if !self.registry.supports(&game_type) {
            return Err(ServerError::UnsupportedGameType { game_type });
        }

        let match_id = envelope.match_id.ok_or(ServerError::MissingField {
            field: "match_id".to_string(),
        })?;
        let round_id = envelope.round_id.ok_or(ServerError::MissingField {
            field: "round_id".to_string(),
        })?;

        let body: MatchAssignmentPayload = match payload {
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
        if body.players.len() != 2 || body.players[0].player_id == body.players[1].player_id {
            return Err(ServerError::Validation {
                reason: "assignment requires exactly two distinct players".to_string(),
            });
        }

        {
            let mut active = self.active_match.lock();
            match *active {
                // Replayed assignment for the match already on the table
                Some(current) if current == match_id => {}
                Some(_) => return Err(ServerError::RefereeUnavailable),
                None => {
                    *active = Some(match_id);
                    let task = MatchTask {
                        match_id,
                        round_id,
                        game_type,
                        players: body.players,
                    };
                    self.work_tx.send(task).map_err(|_| ServerError::Internal {
                        reason: "match worker is gone".to_string(),
                    })?;
                }
            }
        }

        let reply_envelope = envelope
            .reply(
                MessageType::MatchAssignmentAck,
                Sender::referee(self.referee_id.clone()),
            )
            .with_auth_token(credentials.auth_token);
        Ok(Reply::new(reply_envelope, json!({})))
    }
}

impl McpHandler for RefereeService {
    fn identity(&self) -> Sender {
        Sender::referee(self.referee_id.clone())
    }

    fn status(&self) -> Value {
        json!({
            "role": "referee",
            "referee_id": self.referee_id,
            "busy": self.active_match.lock().map(|id| id.to_string()),
            "requests": self.counters.requests.load(Ordering::Relaxed),
            "matches_started": self.counters.matches_started.load(Ordering::Relaxed),
            "matches_completed": self.counters.matches_completed.load(Ordering::Relaxed),
            "forfeits": self.counters.forfeits.load(Ordering::Relaxed),
            "failures": self.counters.failures.load(Ordering::Relaxed),
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
                MessageType::MatchAssignment => self.handle_assignment(envelope, payload).await,
                other => {
                    warn!("Referee received unexpected {other}");
                    Err(ServerError::Validation {
                        reason: format!("message type {other} is not handled by a referee"),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::codec::ValidatedRequest;

    fn service() -> (Arc<RefereeService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let config = Arc::new(Config {
            agent_id: "r1".to_string(),
            ..Config::default()
        });
        let service = RefereeService::new(config, audit, GameRegistry::with_builtins());
        (service, dir)
    }

    fn credentials() -> Credentials {
        Credentials {
            auth_token: Uuid::new_v4().to_string(),
            league_id: Uuid::new_v4(),
        }
    }

    fn assignment(credentials: &Credentials, match_id: Uuid, game_type: &str) -> Envelope {
        Envelope::new(MessageType::MatchAssignment, Sender::LeagueManager)
            .with_auth_token(credentials.auth_token.clone())
            .with_league_id(credentials.league_id)
            .with_round_id(Uuid::new_v4())
            .with_match_id(match_id)
            .with_game_type(game_type)
    }

    fn players() -> Value {
        json!({ "players": [
            { "player_id": "alice", "endpoint": "http://127.0.0.1:1" },
            { "player_id": "bob", "endpoint": "http://127.0.0.1:2" },
        ]})
    }

    async fn call(
        service: &Arc<RefereeService>,
        envelope: Envelope,
        payload: Value,
    ) -> ServerResult<Reply> {
        service
            .handle(ValidatedRequest {
                id: json!("test"),
                envelope,
                payload: Some(payload),
            })
            .await
    }

    #[tokio::test]
    async fn test_assignment_requires_registration() {
        let (service, _dir) = service();
        let credentials = credentials();
        let envelope = assignment(&credentials, Uuid::new_v4(), "sum_duel");
        let error = call(&service, envelope, players()).await.unwrap_err();
        assert!(matches!(error, ServerError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_assignment_rejects_wrong_token() {
        let (service, _dir) = service();
        let credentials = credentials();
        *service.credentials.lock() = Some(credentials.clone());

        let mut envelope = assignment(&credentials, Uuid::new_v4(), "sum_duel");
        envelope.auth_token = Some("not-our-token".to_string());
        let error = call(&service, envelope, players()).await.unwrap_err();
        assert!(matches!(error, ServerError::InvalidToken));
    }

    #[tokio::test]
    async fn test_assignment_rejects_unknown_game_type() {
        let (service, _dir) = service();
        let credentials = credentials();
        *service.credentials.lock() = Some(credentials.clone());

        let envelope = assignment(&credentials, Uuid::new_v4(), "3d_chess");
        let error = call(&service, envelope, players()).await.unwrap_err();
        assert!(matches!(error, ServerError::UnsupportedGameType { .. }));
        // The rejected assignment never claimed the busy slot
        assert!(service.active_match.lock().is_none());
    }

    #[tokio::test]
    async fn test_busy_referee_rejects_second_match() {
        let (service, _dir) = service();
        let credentials = credentials();
        *service.credentials.lock() = Some(credentials.clone());

        let first_match = Uuid::new_v4();
        call(&service, assignment(&credentials, first_match, "sum_duel"), players())
            .await
            .unwrap();

        // A different match while busy is refused
        let error = call(
            &service,
            assignment(&credentials, Uuid::new_v4(), "sum_duel"),
            players(),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ServerError::RefereeUnavailable));

        // A replay of the same assignment is acked idempotently
        let reply = call(
            &service,
            assignment(&credentials, first_match, "sum_duel"),
            players(),
        )
        .await
        .unwrap();
        assert_eq!(reply.envelope.message_type, MessageType::MatchAssignmentAck);
    }
}
