//! End-to-end league runs with every role speaking real JSON-RPC over
//! localhost HTTP: manager, one referee and two players, from
//! registration through standings.

use league_fabric::{
    audit::AuditLog,
    config::Config,
    database::{connect_memory, entities::MatchResult},
    games::GameRegistry,
    manager::LeagueManager,
    player::{PlayerService, Strategy},
    protocol::{Envelope, MessageType, Sender},
    referee::RefereeService,
    transport::{self, McpHandler, MessageClient},
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

/// Binds an ephemeral port, serves the handler's router on it and returns
/// the base endpoint peers should use
async fn spawn_role<H: McpHandler>(handler: Arc<H>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().unwrap();
    let router = transport::router(handler);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

fn audit_in(dir: &TempDir, name: &str) -> Arc<AuditLog> {
    Arc::new(AuditLog::open(dir.path().join(name)).unwrap())
}

async fn spawn_manager(dir: &TempDir, config: Config) -> (Arc<LeagueManager>, String, DatabaseConnection) {
    let db = connect_memory().await.unwrap();
    let manager = LeagueManager::new(db.clone(), Arc::new(config), audit_in(dir, "manager.log"))
        .await
        .unwrap();
    manager.start();
    let endpoint = spawn_role(manager.clone()).await;
    (manager, endpoint, db)
}

async fn spawn_referee(
    dir: &TempDir,
    id: &str,
    manager_endpoint: &str,
    config: Config,
) -> Arc<RefereeService> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config {
        agent_id: id.to_string(),
        manager_endpoint: manager_endpoint.to_string(),
        endpoint: Some(format!("http://127.0.0.1:{}", addr.port())),
        ..config
    };
    let referee = RefereeService::new(
        Arc::new(config),
        audit_in(dir, &format!("{id}.log")),
        GameRegistry::with_builtins(),
    );
    referee.start();
    let router = transport::router(referee.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    referee.register().await.unwrap();
    referee
}

async fn spawn_player(
    dir: &TempDir,
    id: &str,
    manager_endpoint: &str,
    strategy: Box<dyn Strategy>,
) -> Arc<PlayerService> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config {
        agent_id: id.to_string(),
        manager_endpoint: manager_endpoint.to_string(),
        endpoint: Some(format!("http://127.0.0.1:{}", addr.port())),
        ..Config::default()
    };
    let player = PlayerService::new(Arc::new(config), audit_in(dir, &format!("{id}.log")), strategy);
    let router = transport::router(player.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    player.register().await.unwrap();
    player
}

/// Drives ADMIN_* traffic the way an operator console would
struct Admin {
    client: MessageClient,
    endpoint: String,
}

impl Admin {
    fn new(endpoint: &str) -> Self {
        Self {
            client: MessageClient::new(&Default::default()),
            endpoint: endpoint.to_string(),
        }
    }

    async fn start_league(&self) -> Value {
        let envelope = Envelope::new(
            MessageType::AdminStartLeagueRequest,
            Sender::LeagueManager,
        );
        self.client
            .send(&self.endpoint, envelope, json!({}), Duration::from_secs(5))
            .await
            .expect("start league")
            .payload
    }

    async fn status(&self) -> Value {
        let envelope = Envelope::new(
            MessageType::AdminGetStatusRequest,
            Sender::LeagueManager,
        );
        self.client
            .send(&self.endpoint, envelope, json!({}), Duration::from_secs(5))
            .await
            .expect("admin status")
            .payload
    }

    /// Polls until the league reports COMPLETED or the deadline passes
    async fn wait_for_completion(&self) -> Value {
        for _ in 0..200 {
            let status = self.status().await;
            if status["league_status"] == json!("COMPLETED") {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("league never completed: {:?}", self.status().await);
    }
}

struct FixedStrategy(i64);

impl Strategy for FixedStrategy {
    fn compute_move(&self, _step_context: &Value, _game_type: &str) -> Value {
        json!({ "number": self.0 })
    }
}

/// Strategy that answers too late, tripping the referee's move deadline
struct StallingStrategy;

impl Strategy for StallingStrategy {
    fn compute_move(&self, _step_context: &Value, _game_type: &str) -> Value {
        std::thread::sleep(Duration::from_millis(400));
        json!({ "number": 1 })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_player_league_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, manager_endpoint, _db) = spawn_manager(&dir, Config::default()).await;

    let _referee = spawn_referee(&dir, "r1", &manager_endpoint, Config::default()).await;
    let alice = spawn_player(&dir, "alice", &manager_endpoint, Box::new(FixedStrategy(2))).await;
    let _bob = spawn_player(&dir, "bob", &manager_endpoint, Box::new(FixedStrategy(5))).await;

    let admin = Admin::new(&manager_endpoint);
    let started = admin.start_league().await;
    assert_eq!(started["league_status"], json!("ACTIVE"));
    assert_eq!(started["matches"], json!(1));

    let status = admin.wait_for_completion().await;
    assert_eq!(status["matches"]["completed"], json!(1));
    assert_eq!(status["results"], json!(1));
    assert_eq!(status["busy_referees"], json!(0));

    // Bob played the bigger numbers every move and tops the table
    let standings = alice.query_standings(None).await.unwrap();
    let table: Vec<(u32, String, i64)> = standings
        .standings
        .iter()
        .map(|row| (row.rank, row.player_id.clone(), row.points))
        .collect();
    assert_eq!(
        table,
        [
            (1, "bob".to_string(), 3),
            (2, "alice".to_string(), 0),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_timeout_forfeits_the_stalling_player() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, manager_endpoint, db) = spawn_manager(&dir, Config::default()).await;

    // Tight move deadline so the stalling player trips it
    let mut referee_config = Config::default();
    referee_config.timeouts.move_response_ms = 100;
    let _referee = spawn_referee(&dir, "r1", &manager_endpoint, referee_config).await;

    let _alice = spawn_player(&dir, "alice", &manager_endpoint, Box::new(StallingStrategy)).await;
    let bob = spawn_player(&dir, "bob", &manager_endpoint, Box::new(FixedStrategy(5))).await;

    let admin = Admin::new(&manager_endpoint);
    admin.start_league().await;
    admin.wait_for_completion().await;

    let standings = bob.query_standings(None).await.unwrap();
    let table: Vec<(u32, String, i64)> = standings
        .standings
        .iter()
        .map(|row| (row.rank, row.player_id.clone(), row.points))
        .collect();
    assert_eq!(
        table,
        [
            (1, "bob".to_string(), 3),
            (2, "alice".to_string(), 0),
        ]
    );

    // The stored result is marked as a forfeit against the offender
    let results = MatchResult::all(&db).await.unwrap();
    assert_eq!(results.len(), 1);
    let metadata = &results[0].game_metadata.0;
    assert_eq!(metadata["forfeit"], json!(true));
    assert_eq!(metadata["offender"], json!("alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_standings_queryable_per_round() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, manager_endpoint, db) = spawn_manager(&dir, Config::default()).await;

    let _referee = spawn_referee(&dir, "r1", &manager_endpoint, Config::default()).await;
    let alice = spawn_player(&dir, "alice", &manager_endpoint, Box::new(FixedStrategy(9))).await;
    let _bob = spawn_player(&dir, "bob", &manager_endpoint, Box::new(FixedStrategy(1))).await;
    let _carol = spawn_player(&dir, "carol", &manager_endpoint, Box::new(FixedStrategy(1))).await;

    let admin = Admin::new(&manager_endpoint);
    let started = admin.start_league().await;
    // Odd field: three rounds of one match each
    assert_eq!(started["rounds"], json!(3));
    admin.wait_for_completion().await;

    // Overall: alice wins both her matches, bob and carol drew theirs
    let overall = alice.query_standings(None).await.unwrap();
    let table: Vec<(u32, String, i64)> = overall
        .standings
        .iter()
        .map(|row| (row.rank, row.player_id.clone(), row.points))
        .collect();
    assert_eq!(
        table,
        [
            (1, "alice".to_string(), 6),
            (2, "bob".to_string(), 1),
            (3, "carol".to_string(), 1),
        ]
    );

    // A round-scoped query answers from that round's snapshot
    let league_id = manager.league_id().to_string();
    let rounds = league_fabric::database::entities::Round::by_league(&db, &league_id)
        .await
        .unwrap();
    let first_round = uuid::Uuid::parse_str(&rounds[0].round_id).unwrap();
    let scoped = alice.query_standings(Some(first_round)).await.unwrap();
    assert_eq!(scoped.round_id, Some(rounds[0].round_id.clone()));
    assert_eq!(scoped.standings.len(), 3);
    let played: u32 = scoped
        .standings
        .iter()
        .map(|row| row.matches_played)
        .sum();
    // One match in round one, so exactly two players have played
    assert_eq!(played, 2);
}
