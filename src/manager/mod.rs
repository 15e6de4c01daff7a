//! League manager process: owns the league lifecycle, the registrations,
//! the schedule and the canonical standings. All protocol traffic arrives
//! through the shared transport and is routed here by message type.

use crate::{
    audit::AuditLog,
    auth::{AgentType, AuthManager},
    config::Config,
    database::entities::{
        leagues::{LeagueSettings, LeagueStatus},
        matches::MatchStatus,
        AgentStatus, League, Match, MatchResult, Player, Referee, Round,
    },
    protocol::{
        codec::ValidatedRequest, Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::{McpHandler, MessageClient, Reply},
};
use log::{error, info};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::{json, Value};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;
use uuid::Uuid;

pub mod assigner;
pub mod registration;
pub mod results;
pub mod scheduler;
pub mod standings;
pub mod state;

use assigner::RefereePool;
use state::LeagueState;

#[derive(Default)]
pub struct Counters {
    pub requests: AtomicU64,
    pub registrations: AtomicU64,
    pub assignments_dispatched: AtomicU64,
    pub results_accepted: AtomicU64,
    pub duplicate_results: AtomicU64,
}

pub struct LeagueManager {
    pub(crate) db: DatabaseConnection,
    pub(crate) config: Arc<Config>,
    pub(crate) auth: AuthManager,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) client: MessageClient,
    pub(crate) state: LeagueState,
    pub(crate) pool: RefereePool,
    /// Single writer over the results + snapshots path
    pub(crate) results_lock: tokio::sync::Mutex<()>,
    pub(crate) counters: Counters,
    /// Wakes the background assigner walk
    pub(crate) assign_notify: Notify,
}

impl LeagueManager {
    /// Loads the league from the store or creates a fresh one, rebuilding
    /// the token table and busy flags so a cold restart resumes where the
    /// last commit left off.
    pub async fn new(
        db: DatabaseConnection,
        config: Arc<Config>,
        audit: Arc<AuditLog>,
    ) -> ServerResult<Arc<Self>> {
        let league = match League::current(&db).await? {
            Some(existing) => {
                info!("Resuming league {} ({})", existing.id, existing.status.as_str());
                existing
            }
            None => {
                let league = League::create(
                    &db,
                    Uuid::new_v4().to_string(),
                    LeagueStatus::Init,
                    LeagueSettings {
                        game_type: config.game_type.clone(),
                        registration_window_seconds: config.registration.window_seconds,
                    },
                )
                .await?;
                info!("Created league {}", league.id);
                league
            }
        };

        let state = LeagueState::new(&league)?;

        let auth = AuthManager::default();
        for referee in Referee::all(&db).await? {
            auth.restore(&referee.referee_id, AgentType::Referee, &referee.auth_token);
        }
        for player in Player::all(&db).await? {
            auth.restore(&player.player_id, AgentType::Player, &player.auth_token);
        }

        let pool = RefereePool::default();
        for round in Round::by_league(&db, &league.id).await? {
            for match_row in Match::by_round(&db, &round.round_id).await? {
                if matches!(
                    match_row.status,
                    MatchStatus::Assigned | MatchStatus::InProgress
                ) {
                    if let Some(referee_id) = &match_row.referee_id {
                        pool.try_acquire(referee_id);
                    }
                }
            }
        }

        let manager = Arc::new(Self {
            client: MessageClient::new(&config.retries),
            db,
            config,
            auth,
            audit,
            state,
            pool,
            results_lock: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
            assign_notify: Notify::new(),
        });

        // INIT moves to REGISTRATION automatically at startup
        if manager.state.status() == LeagueStatus::Init {
            manager
                .state
                .transition(&manager.db, LeagueStatus::Registration)
                .await?;
        }

        Ok(manager)
    }

    pub fn league_id(&self) -> Uuid {
        self.state.league_id
    }

    pub fn league_status(&self) -> LeagueStatus {
        self.state.status()
    }

    /// Spawns the background assigner loop and kicks one walk so an
    /// ACTIVE league resumes dispatching after a restart. A slow ticker
    /// keeps the walk running so overdue matches get reaped even when no
    /// result ever arrives.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.assign_notify.notified().await;
                if let Err(err) = this.dispatch_pending().await {
                    error!("Assignment walk failed: {err}");
                }
            }
        });

        let this = self.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_millis(
                (this.config.timeouts.match_deadline_ms / 2).max(1000),
            );
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                this.assign_notify.notify_one();
            }
        });

        self.assign_notify.notify_one();
    }

    fn require_admin(envelope: &Envelope) -> ServerResult<()> {
        if envelope.sender != Sender::LeagueManager {
            return Err(ServerError::PreconditionFailed {
                reason: "admin messages must be sent as league_manager".to_string(),
            });
        }
        Ok(())
    }

    /// Admin signal that closes registration, persists the schedule and
    /// opens match dispatch. With fewer than two players the schedule is
    /// empty and the league completes immediately.
    async fn handle_start_league(
        &self,
        envelope: Envelope,
        _payload: Option<Value>,
    ) -> ServerResult<Reply> {
        Self::require_admin(&envelope)?;

        if self.state.status() != LeagueStatus::Registration {
            return Err(ServerError::PreconditionFailed {
                reason: format!(
                    "league is {}, start requires REGISTRATION",
                    self.state.status().as_str()
                ),
            });
        }

        let referees = Referee::all(&self.db).await?;
        let players = Player::all(&self.db).await?;
        let registration = &self.config.registration;

        if referees.len() < registration.min_referees {
            return Err(ServerError::PreconditionFailed {
                reason: format!(
                    "{} referees registered, {} required",
                    referees.len(),
                    registration.min_referees
                ),
            });
        }
        if players.len() < registration.min_players {
            return Err(ServerError::PreconditionFailed {
                reason: format!(
                    "{} players registered, {} required",
                    players.len(),
                    registration.min_players
                ),
            });
        }
        let not_ready = referees
            .iter()
            .map(|r| (&r.referee_id, r.status))
            .chain(players.iter().map(|p| (&p.player_id, p.status)))
            .find(|(_, status)| *status != AgentStatus::Active);
        if let Some((agent_id, status)) = not_ready {
            return Err(ServerError::PreconditionFailed {
                reason: format!("agent {agent_id} is {} not ACTIVE", status.as_str()),
            });
        }

        self.state
            .transition(&self.db, LeagueStatus::Scheduling)
            .await?;

        let player_ids: Vec<String> = players.into_iter().map(|p| p.player_id).collect();
        let plan = scheduler::round_robin(&player_ids);
        scheduler::verify_schedule(&player_ids, &plan).map_err(|err| {
            ServerError::Internal {
                reason: format!("schedule postcondition failed: {err}"),
            }
        })?;

        if plan.is_empty() {
            // Nothing to play; the league is complete the moment it starts
            self.state
                .transition(&self.db, LeagueStatus::Completed)
                .await?;
            let reply_envelope = envelope
                .reply(MessageType::AdminStartLeagueResponse, Sender::LeagueManager)
                .with_league_id(self.state.league_id);
            return Ok(Reply::new(
                reply_envelope,
                json!({ "league_status": LeagueStatus::Completed.as_str(), "rounds": 0, "matches": 0 }),
            ));
        }

        let league_id = self.state.league_id.to_string();
        let game_type = self.state.game_type.clone();
        let mut match_count = 0usize;

        // Rounds and matches land in one transaction so a crash never
        // leaves a partial schedule behind
        let txn = self.db.begin().await?;
        for (index, pairs) in plan.iter().enumerate() {
            let round = Round::create(
                &txn,
                Uuid::new_v4().to_string(),
                league_id.clone(),
                (index + 1) as u32,
            )
            .await?;
            for (home, away) in pairs {
                Match::create(
                    &txn,
                    Uuid::new_v4().to_string(),
                    round.round_id.clone(),
                    game_type.clone(),
                    home.clone(),
                    away.clone(),
                )
                .await?;
                match_count += 1;
            }
        }
        txn.commit().await?;

        self.state
            .transition(&self.db, LeagueStatus::Active)
            .await?;
        info!(
            "League started: {} rounds, {} matches",
            plan.len(),
            match_count
        );
        self.assign_notify.notify_one();

        let reply_envelope = envelope
            .reply(MessageType::AdminStartLeagueResponse, Sender::LeagueManager)
            .with_league_id(self.state.league_id);
        Ok(Reply::new(
            reply_envelope,
            json!({
                "league_status": LeagueStatus::Active.as_str(),
                "rounds": plan.len(),
                "matches": match_count,
            }),
        ))
    }

    async fn handle_admin_status(
        &self,
        envelope: Envelope,
        _payload: Option<Value>,
    ) -> ServerResult<Reply> {
        Self::require_admin(&envelope)?;

        let mut match_counts = json!({
            "pending": 0, "assigned": 0, "in_progress": 0, "completed": 0, "failed": 0,
        });
        let league_id = self.state.league_id.to_string();
        for round in Round::by_league(&self.db, &league_id).await? {
            for match_row in Match::by_round(&self.db, &round.round_id).await? {
                let key = match match_row.status {
                    MatchStatus::Pending => "pending",
                    MatchStatus::Assigned => "assigned",
                    MatchStatus::InProgress => "in_progress",
                    MatchStatus::Completed => "completed",
                    MatchStatus::Failed => "failed",
                };
                match_counts[key] = json!(match_counts[key].as_u64().unwrap_or(0) + 1);
            }
        }

        let payload = json!({
            "league_id": league_id,
            "league_status": self.state.status().as_str(),
            "referees": Referee::count(&self.db).await?,
            "players": Player::count(&self.db).await?,
            "results": MatchResult::count(&self.db).await?,
            "busy_referees": self.pool.busy_count(),
            "matches": match_counts,
        });

        let reply_envelope = envelope
            .reply(MessageType::AdminGetStatusResponse, Sender::LeagueManager)
            .with_league_id(self.state.league_id);
        Ok(Reply::new(reply_envelope, payload))
    }
}

impl McpHandler for LeagueManager {
    fn identity(&self) -> Sender {
        Sender::LeagueManager
    }

    fn status(&self) -> Value {
        json!({
            "role": "league_manager",
            "league_id": self.state.league_id.to_string(),
            "league_status": self.state.status().as_str(),
            "requests": self.counters.requests.load(Ordering::Relaxed),
            "registrations": self.counters.registrations.load(Ordering::Relaxed),
            "assignments_dispatched": self.counters.assignments_dispatched.load(Ordering::Relaxed),
            "results_accepted": self.counters.results_accepted.load(Ordering::Relaxed),
            "duplicate_results": self.counters.duplicate_results.load(Ordering::Relaxed),
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
                MessageType::RegisterRefereeRequest => {
                    self.handle_register_referee(envelope, payload).await
                }
                MessageType::RegisterPlayerRequest => {
                    self.handle_register_player(envelope, payload).await
                }
                MessageType::AgentReadyRequest => self.handle_agent_ready(envelope, payload).await,
                MessageType::AdminStartLeagueRequest => {
                    self.handle_start_league(envelope, payload).await
                }
                MessageType::AdminGetStatusRequest => {
                    self.handle_admin_status(envelope, payload).await
                }
                MessageType::MatchResultReport => {
                    self.handle_result_report(envelope, payload).await
                }
                MessageType::QueryStandings => {
                    self.handle_query_standings(envelope, payload).await
                }
                other => Err(ServerError::Validation {
                    reason: format!("message type {other} is not handled by the league manager"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        database::{
            connect_memory,
            entities::{matches::MatchStatus, StandingsSnapshot},
        },
        protocol::messages::{
            MatchResultAckPayload, RegisterResponsePayload, StandingsResponsePayload,
        },
    };
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        manager: Arc<LeagueManager>,
        _audit_dir: TempDir,
    }

    async fn harness() -> Harness {
        harness_with(Config::default()).await
    }

    async fn harness_with(config: Config) -> Harness {
        let db = connect_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let manager = LeagueManager::new(db, Arc::new(config), audit)
            .await
            .unwrap();
        Harness {
            manager,
            _audit_dir: dir,
        }
    }

    impl Harness {
        async fn call(&self, envelope: Envelope, payload: Value) -> ServerResult<Reply> {
            self.manager
                .handle(ValidatedRequest {
                    id: json!("test"),
                    envelope,
                    payload: Some(payload),
                })
                .await
        }

        fn league_id(&self) -> Uuid {
            self.manager.state.league_id
        }

        async fn register_referee(&self, id: &str) -> String {
            let envelope =
                Envelope::new(MessageType::RegisterRefereeRequest, Sender::referee(id));
            let reply = self
                .call(
                    envelope,
                    json!({ "referee_id": id, "endpoint": format!("http://127.0.0.1:1/{id}") }),
                )
                .await
                .unwrap();
            let body: RegisterResponsePayload = serde_json::from_value(reply.payload).unwrap();
            body.auth_token
        }

        async fn register_player(&self, id: &str) -> ServerResult<String> {
            let envelope =
                Envelope::new(MessageType::RegisterPlayerRequest, Sender::player(id));
            let reply = self
                .call(
                    envelope,
                    json!({ "player_id": id, "endpoint": format!("http://127.0.0.1:2/{id}") }),
                )
                .await?;
            let body: RegisterResponsePayload = serde_json::from_value(reply.payload).unwrap();
            Ok(body.auth_token)
        }

        async fn ready(&self, sender: Sender, token: &str) -> ServerResult<Reply> {
            let envelope = Envelope::new(MessageType::AgentReadyRequest, sender)
                .with_auth_token(token)
                .with_league_id(self.league_id());
            self.call(envelope, json!({})).await
        }

        async fn start_league(&self) -> ServerResult<Value> {
            let envelope =
                Envelope::new(MessageType::AdminStartLeagueRequest, Sender::LeagueManager);
            Ok(self.call(envelope, json!({})).await?.payload)
        }

        /// Registers a referee plus players and marks everyone ready
        async fn league_of(&self, players: &[&str]) -> (String, Vec<String>) {
            let referee_token = self.register_referee("r1").await;
            self.ready(Sender::referee("r1"), &referee_token)
                .await
                .unwrap();
            let mut tokens = Vec::new();
            for player in players {
                let token = self.register_player(player).await.unwrap();
                self.ready(Sender::player(*player), &token).await.unwrap();
                tokens.push(token);
            }
            (referee_token, tokens)
        }

        /// All matches in (round_number, match_id) order with their rounds
        async fn schedule(&self) -> Vec<(Round, Match)> {
            let league_id = self.league_id().to_string();
            let mut out = Vec::new();
            for round in Round::by_league(&self.manager.db, &league_id).await.unwrap() {
                for match_row in Match::by_round(&self.manager.db, &round.round_id)
                    .await
                    .unwrap()
                {
                    out.push((round.clone(), match_row));
                }
            }
            out
        }

        /// Simulates the assignment step the background dispatcher would
        /// perform over HTTP
        async fn force_assign(&self, match_row: &Match, referee_id: &str) {
            self.manager.pool.try_acquire(referee_id);
            match_row
                .clone()
                .assign(&self.manager.db, referee_id)
                .await
                .unwrap();
        }

        async fn report(
            &self,
            referee_token: &str,
            round: &Round,
            match_row: &Match,
            outcome: Value,
            points: Value,
        ) -> ServerResult<MatchResultAckPayload> {
            let envelope =
                Envelope::new(MessageType::MatchResultReport, Sender::referee("r1"))
                    .with_auth_token(referee_token)
                    .with_league_id(self.league_id())
                    .with_round_id(Uuid::parse_str(&round.round_id).unwrap())
                    .with_match_id(Uuid::parse_str(&match_row.match_id).unwrap())
                    .with_game_type(match_row.game_type.clone());
            let payload = json!({
                "players": [match_row.player_home, match_row.player_away],
                "outcome": outcome,
                "points": points,
                "game_metadata": {},
            });
            let reply = self.call(envelope, payload).await?;
            Ok(serde_json::from_value(reply.payload).unwrap())
        }

        async fn standings(
            &self,
            player: &str,
            token: &str,
            round_id: Option<Uuid>,
        ) -> StandingsResponsePayload {
            let mut envelope =
                Envelope::new(MessageType::QueryStandings, Sender::player(player))
                    .with_auth_token(token)
                    .with_league_id(self.league_id());
            if let Some(round_id) = round_id {
                envelope = envelope.with_round_id(round_id);
            }
            let reply = self.call(envelope, json!({})).await.unwrap();
            serde_json::from_value(reply.payload).unwrap()
        }
    }

    #[tokio::test]
    async fn test_league_starts_in_registration() {
        let harness = harness().await;
        assert_eq!(harness.manager.state.status(), LeagueStatus::Registration);
    }

    #[tokio::test]
    async fn test_player_registration_requires_referee() {
        let harness = harness().await;
        let error = harness.register_player("alice").await.unwrap_err();
        assert!(matches!(error, ServerError::PreconditionFailed { .. }));
        // No row was created by the rejected registration
        assert_eq!(Player::count(&harness.manager.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let harness = harness().await;
        harness.register_referee("r1").await;
        let first = harness.register_player("alice").await.unwrap();
        let second = harness.register_player("alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(Player::count(&harness.manager.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_reregistration_rejected() {
        let harness = harness().await;
        harness.register_referee("r1").await;
        harness.register_player("alice").await.unwrap();

        // Same id, different endpoint
        let envelope =
            Envelope::new(MessageType::RegisterPlayerRequest, Sender::player("alice"));
        let error = harness
            .call(
                envelope,
                json!({ "player_id": "alice", "endpoint": "http://127.0.0.1:9/other" }),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServerError::DuplicateRegistration { .. }));
    }

    #[tokio::test]
    async fn test_start_requires_ready_agents() {
        let harness = harness().await;
        let referee_token = harness.register_referee("r1").await;
        harness
            .ready(Sender::referee("r1"), &referee_token)
            .await
            .unwrap();
        harness.register_player("alice").await.unwrap();
        harness.register_player("bob").await.unwrap();

        // Players registered but never sent AGENT_READY
        let error = harness.start_league().await.unwrap_err();
        assert!(matches!(error, ServerError::PreconditionFailed { .. }));
        assert_eq!(harness.manager.state.status(), LeagueStatus::Registration);
    }

    #[tokio::test]
    async fn test_sender_mismatch_mutates_nothing() {
        let harness = harness().await;
        harness.register_referee("r1").await;
        let alice_token = harness.register_player("alice").await.unwrap();
        harness.register_player("bob").await.unwrap();

        // Alice's token presented as bob
        let error = harness
            .ready(Sender::player("bob"), &alice_token)
            .await
            .unwrap_err();
        assert!(matches!(error, ServerError::SenderMismatch));

        for player in Player::all(&harness.manager.db).await.unwrap() {
            assert_eq!(player.status, AgentStatus::Registered);
        }
    }

    #[tokio::test]
    async fn test_registration_closed_after_start() {
        let harness = harness().await;
        harness.league_of(&["alice", "bob"]).await;
        harness.start_league().await.unwrap();

        let error = harness.register_player("carol").await.unwrap_err();
        assert!(matches!(error, ServerError::RegistrationClosed));
    }

    #[tokio::test]
    async fn test_empty_league_completes_immediately() {
        let mut config = Config::default();
        config.registration.min_players = 0;
        let harness = harness_with(config).await;
        let referee_token = harness.register_referee("r1").await;
        harness
            .ready(Sender::referee("r1"), &referee_token)
            .await
            .unwrap();

        let status = harness.start_league().await.unwrap();
        assert_eq!(status["league_status"], json!("COMPLETED"));
        assert_eq!(status["matches"], json!(0));
        assert_eq!(harness.manager.state.status(), LeagueStatus::Completed);
    }

    #[tokio::test]
    async fn test_two_player_league_end_to_end() {
        let harness = harness().await;
        let (referee_token, player_tokens) = harness.league_of(&["alice", "bob"]).await;
        let status = harness.start_league().await.unwrap();
        assert_eq!(status["league_status"], json!("ACTIVE"));
        assert_eq!(status["rounds"], json!(1));
        assert_eq!(status["matches"], json!(1));

        let schedule = harness.schedule().await;
        assert_eq!(schedule.len(), 1);
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;

        let ack = harness
            .report(
                &referee_token,
                round,
                match_row,
                json!({ "alice": "win", "bob": "loss" }),
                json!({ "alice": 3, "bob": 0 }),
            )
            .await
            .unwrap();
        assert_eq!(ack.status, "accepted");
        assert!(ack.result_id.is_some());

        // All matches terminal, so the league is complete
        assert_eq!(harness.manager.state.status(), LeagueStatus::Completed);
        // Referee freed for the next assignment walk
        assert!(!harness.manager.pool.is_busy("r1"));

        let standings = harness
            .standings("alice", &player_tokens[0], None)
            .await;
        assert_eq!(standings.standings.len(), 2);
        let first = &standings.standings[0];
        let second = &standings.standings[1];
        assert_eq!((first.rank, first.player_id.as_str()), (1, "alice"));
        assert_eq!((first.points, first.wins), (3, 1));
        assert_eq!((second.rank, second.player_id.as_str()), (2, "bob"));
        assert_eq!((second.points, second.losses), (0, 1));
    }

    #[tokio::test]
    async fn test_draw_ranks_by_player_id() {
        let harness = harness().await;
        let (referee_token, player_tokens) = harness.league_of(&["alice", "bob"]).await;
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;
        harness
            .report(
                &referee_token,
                round,
                match_row,
                json!({ "alice": "draw", "bob": "draw" }),
                json!({ "alice": 1, "bob": 1 }),
            )
            .await
            .unwrap();

        let standings = harness
            .standings("bob", &player_tokens[1], None)
            .await;
        let ranks: Vec<(u32, &str)> = standings
            .standings
            .iter()
            .map(|row| (row.rank, row.player_id.as_str()))
            .collect();
        // Identical aggregates; alphabetical id breaks the tie
        assert_eq!(ranks, [(1, "alice"), (2, "bob")]);
        assert_eq!(standings.standings[0].points, 1);
        assert_eq!(standings.standings[1].points, 1);
    }

    #[tokio::test]
    async fn test_three_player_round_robin() {
        let harness = harness().await;
        let (referee_token, player_tokens) =
            harness.league_of(&["alice", "bob", "carol"]).await;
        let status = harness.start_league().await.unwrap();
        // Odd field: one match and one bye per round, rounds = N
        assert_eq!(status["rounds"], json!(3));
        assert_eq!(status["matches"], json!(3));

        let schedule = harness.schedule().await;
        for (round, match_row) in &schedule {
            harness.force_assign(match_row, "r1").await;
            let pair = (match_row.player_home.as_str(), match_row.player_away.as_str());
            let (outcome, points) = match pair {
                ("alice", "bob") | ("bob", "alice") => (
                    json!({ "alice": "win", "bob": "loss" }),
                    json!({ "alice": 3, "bob": 0 }),
                ),
                ("alice", "carol") | ("carol", "alice") => (
                    json!({ "alice": "win", "carol": "loss" }),
                    json!({ "alice": 3, "carol": 0 }),
                ),
                _ => (
                    json!({ "bob": "draw", "carol": "draw" }),
                    json!({ "bob": 1, "carol": 1 }),
                ),
            };
            harness
                .report(&referee_token, round, match_row, outcome, points)
                .await
                .unwrap();
        }

        assert_eq!(harness.manager.state.status(), LeagueStatus::Completed);

        let standings = harness
            .standings("alice", &player_tokens[0], None)
            .await;
        let table: Vec<(u32, &str, i64)> = standings
            .standings
            .iter()
            .map(|row| (row.rank, row.player_id.as_str(), row.points))
            .collect();
        // bob precedes carol purely by player id
        assert_eq!(table, [(1, "alice", 6), (2, "bob", 1), (3, "carol", 1)]);
    }

    #[tokio::test]
    async fn test_duplicate_result_is_idempotent() {
        let harness = harness().await;
        let (referee_token, _) = harness.league_of(&["alice", "bob"]).await;
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;

        let outcome = json!({ "alice": "win", "bob": "loss" });
        let points = json!({ "alice": 3, "bob": 0 });
        let first = harness
            .report(&referee_token, round, match_row, outcome.clone(), points.clone())
            .await
            .unwrap();
        assert_eq!(first.status, "accepted");

        let snapshots_before = StandingsSnapshot::count_for_round(
            &harness.manager.db,
            &harness.league_id().to_string(),
            &round.round_id,
        )
        .await
        .unwrap();

        // Simulated retry after a lost ack
        let second = harness
            .report(&referee_token, round, match_row, outcome, points)
            .await
            .unwrap();
        assert_eq!(second.status, "duplicate");
        assert_eq!(second.result_id, first.result_id);

        let snapshots_after = StandingsSnapshot::count_for_round(
            &harness.manager.db,
            &harness.league_id().to_string(),
            &round.round_id,
        )
        .await
        .unwrap();
        assert_eq!(snapshots_before, snapshots_after);
        assert_eq!(MatchResult::count(&harness.manager.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_result_from_wrong_referee_rejected() {
        let harness = harness().await;
        let (_, _) = harness.league_of(&["alice", "bob"]).await;
        // A second referee that is not assigned to the match
        let other_token = harness.register_referee("r2").await;
        harness
            .ready(Sender::referee("r2"), &other_token)
            .await
            .unwrap();
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;

        let envelope = Envelope::new(MessageType::MatchResultReport, Sender::referee("r2"))
            .with_auth_token(&*other_token)
            .with_league_id(harness.league_id())
            .with_round_id(Uuid::parse_str(&round.round_id).unwrap())
            .with_match_id(Uuid::parse_str(&match_row.match_id).unwrap())
            .with_game_type(match_row.game_type.clone());
        let error = harness
            .call(
                envelope,
                json!({
                    "players": [match_row.player_home, match_row.player_away],
                    "outcome": { "alice": "win", "bob": "loss" },
                    "points": { "alice": 3, "bob": 0 },
                    "game_metadata": {},
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServerError::PreconditionFailed { .. }));
        assert_eq!(MatchResult::count(&harness.manager.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_result_points_must_match_scoring_table() {
        let harness = harness().await;
        let (referee_token, _) = harness.league_of(&["alice", "bob"]).await;
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;

        let error = harness
            .report(
                &referee_token,
                round,
                match_row,
                json!({ "alice": "win", "bob": "loss" }),
                json!({ "alice": 5, "bob": 0 }),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServerError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_failed_report_terminates_match_without_result() {
        let harness = harness().await;
        let (referee_token, _) = harness.league_of(&["alice", "bob"]).await;
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;

        let envelope = Envelope::new(MessageType::MatchResultReport, Sender::referee("r1"))
            .with_auth_token(&*referee_token)
            .with_league_id(harness.league_id())
            .with_round_id(Uuid::parse_str(&round.round_id).unwrap())
            .with_match_id(Uuid::parse_str(&match_row.match_id).unwrap())
            .with_game_type(match_row.game_type.clone());
        let reply = harness
            .call(
                envelope,
                json!({
                    "players": [match_row.player_home, match_row.player_away],
                    "outcome": {},
                    "points": {},
                    "game_metadata": { "error": "engine crashed" },
                    "failed": true,
                }),
            )
            .await
            .unwrap();
        let ack: MatchResultAckPayload = serde_json::from_value(reply.payload).unwrap();
        assert_eq!(ack.status, "failed");
        assert!(ack.result_id.is_none());

        let stored = Match::by_id(&harness.manager.db, &match_row.match_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MatchStatus::Failed);
        assert_eq!(MatchResult::count(&harness.manager.db).await.unwrap(), 0);
        // A failed final match still completes the league
        assert_eq!(harness.manager.state.status(), LeagueStatus::Completed);
    }

    #[tokio::test]
    async fn test_per_round_snapshots_are_cumulative() {
        let harness = harness().await;
        let (referee_token, player_tokens) =
            harness.league_of(&["alice", "bob", "carol"]).await;
        harness.start_league().await.unwrap();

        let schedule = harness.schedule().await;
        // Play only the first round
        let (round, match_row) = &schedule[0];
        harness.force_assign(match_row, "r1").await;
        let home = match_row.player_home.clone();
        let away = match_row.player_away.clone();
        harness
            .report(
                &referee_token,
                round,
                match_row,
                json!({ home.as_str(): "win", away.as_str(): "loss" }),
                json!({ home.as_str(): 3, away.as_str(): 0 }),
            )
            .await
            .unwrap();

        let round_scope = harness
            .standings(
                "alice",
                &player_tokens[0],
                Some(Uuid::parse_str(&round.round_id).unwrap()),
            )
            .await;
        assert_eq!(round_scope.round_id, Some(round.round_id.clone()));
        assert_eq!(round_scope.standings.len(), 3);
        let winner = round_scope
            .standings
            .iter()
            .find(|row| row.player_id == home)
            .unwrap();
        assert_eq!((winner.rank, winner.points, winner.matches_played), (1, 3, 1));
        // The idle player has an all-zero row
        let idle = round_scope
            .standings
            .iter()
            .find(|row| row.player_id != home && row.player_id != away)
            .unwrap();
        assert_eq!((idle.points, idle.matches_played), (0, 0));
    }
}
