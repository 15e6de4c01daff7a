//! Per-match conductor. The executor walks one match through
//! invite, join, move loop, terminal detection and reporting, enforcing
//! every deadline itself; players are never trusted to cancel anything.
//! It relays engine contexts and move payloads without looking inside.

use super::{MatchTask, RefereeService};
use crate::{
    protocol::{
        messages::{
            GameInvitationPayload, GameOverPayload, MatchResultReportPayload, MoveResponsePayload,
            OutcomeKind, PlayerRef, RequestMovePayload,
        },
        Envelope, MessageType, ResponseBody, Sender, ServerError, ServerResult,
    },
    transport::{ClientError, MessageClient},
};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::atomic::Ordering, time::Duration};

/// Hard cap on solicited moves, guarding against engines that never
/// reach a terminal state
const MOVE_CAP: u32 = 10_000;

pub(crate) struct MatchReport {
    pub outcome: BTreeMap<String, OutcomeKind>,
    pub points: BTreeMap<String, i64>,
    pub metadata: Value,
    pub failed: bool,
}

impl MatchReport {
    fn failed() -> Self {
        Self {
            outcome: BTreeMap::new(),
            points: BTreeMap::new(),
            metadata: json!({ "error": "match execution failed" }),
            failed: true,
        }
    }
}

impl RefereeService {
    /// Runs one assigned match to completion and clears the busy slot.
    /// An unreachable manager leaves the match in progress on the league
    /// side; its timeout reaping takes over from there.
    pub(crate) async fn run_match(&self, task: MatchTask) {
        self.counters.matches_started.fetch_add(1, Ordering::Relaxed);
        info!("Conducting match {} ({})", task.match_id, task.game_type);

        let report = match self.execute(&task).await {
            Ok(report) => {
                self.broadcast_game_over(&task, &report).await;
                report
            }
            Err(err) => {
                error!("Match {} execution failed: {err}", task.match_id);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                MatchReport::failed()
            }
        };

        match self.report_result(&task, &report).await {
            Ok(()) => {
                self.counters
                    .matches_completed
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!(
                "Could not deliver result for match {}: {err}; the manager will reap it",
                task.match_id
            ),
        }

        *self.active_match.lock() = None;
    }

    async fn execute(&self, task: &MatchTask) -> ServerResult<MatchReport> {
        let mut engine =
            self.registry
                .create(&task.game_type)
                .ok_or_else(|| ServerError::UnsupportedGameType {
                    game_type: task.game_type.clone(),
                })?;

        let players = [
            task.players[0].player_id.clone(),
            task.players[1].player_id.clone(),
        ];
        let scoring = self.config.scoring_for(&task.game_type);
        let engine_config = json!({
            "scoring": { "win": scoring.win, "draw": scoring.draw, "loss": scoring.loss },
        });
        engine
            .initialize(&task.match_id.to_string(), &players, &engine_config)
            .map_err(|err| ServerError::MatchExecutionFailed {
                reason: format!("engine initialize: {err}"),
            })?;

        // Both invitations go out in parallel; a missing ack forfeits the
        // player that failed to join
        let (home_join, away_join) = futures_util::join!(
            self.invite(task, &task.players[0]),
            self.invite(task, &task.players[1]),
        );
        match (home_join, away_join) {
            (Ok(()), Ok(())) => {}
            (Err(_), Ok(())) => {
                return Ok(self.forfeit_report(task, &players[0], "join_timeout"))
            }
            (Ok(()), Err(_)) => {
                return Ok(self.forfeit_report(task, &players[1], "join_timeout"))
            }
            (Err(_), Err(_)) => {
                return Err(ServerError::MatchExecutionFailed {
                    reason: "neither player joined".to_string(),
                })
            }
        }

        let mut step_number: u32 = 0;
        while !engine.is_terminal() {
            if step_number >= MOVE_CAP {
                return Err(ServerError::MatchExecutionFailed {
                    reason: format!("engine did not terminate within {MOVE_CAP} moves"),
                });
            }

            // The engine dictates move order; the referee never solicits
            // out of turn
            let mover = engine.current_mover();
            let mover_ref = task
                .players
                .iter()
                .find(|p| p.player_id == mover)
                .ok_or_else(|| ServerError::MatchExecutionFailed {
                    reason: format!("engine named unknown mover {mover}"),
                })?;

            let context = engine.step_context(&mover);
            let move_payload = match self
                .request_move(task, mover_ref, step_number, context)
                .await
            {
                Ok(value) => value,
                Err(reason) => return Ok(self.forfeit_report(task, &mover, &reason)),
            };

            if !engine.validate_move(&mover, &move_payload) {
                return Ok(self.forfeit_report(task, &mover, "invalid_move"));
            }
            engine.apply_move(&mover, &move_payload).map_err(|err| {
                ServerError::MatchExecutionFailed {
                    reason: format!("apply_move: {err}"),
                }
            })?;
            step_number += 1;
        }

        let result = engine.outcome();
        Ok(MatchReport {
            outcome: result.outcome,
            points: result.points,
            metadata: json!({ "steps": step_number }),
            failed: false,
        })
    }

    /// Forfeit policy: the opponent wins with full winning points, the
    /// offender takes a loss with the table's loss points. The first
    /// violation terminates the match; nothing accumulates across matches.
    fn forfeit_report(&self, task: &MatchTask, offender: &str, reason: &str) -> MatchReport {
        self.counters.forfeits.fetch_add(1, Ordering::Relaxed);
        let scoring = self.config.scoring_for(&task.game_type);

        let mut outcome = BTreeMap::new();
        let mut points = BTreeMap::new();
        for player in &task.players {
            if player.player_id == offender {
                outcome.insert(player.player_id.clone(), OutcomeKind::Loss);
                points.insert(player.player_id.clone(), scoring.loss);
            } else {
                outcome.insert(player.player_id.clone(), OutcomeKind::Win);
                points.insert(player.player_id.clone(), scoring.win);
            }
        }

        info!(
            "Match {}: {offender} forfeits ({reason})",
            task.match_id
        );
        MatchReport {
            outcome,
            points,
            metadata: json!({ "forfeit": true, "offender": offender, "reason": reason }),
            failed: false,
        }
    }

    async fn invite(&self, task: &MatchTask, player: &PlayerRef) -> Result<(), ClientError> {
        let envelope = Envelope::new(
            MessageType::GameInvitation,
            Sender::referee(self.referee_id.clone()),
        )
        .with_match_id(task.match_id)
        .with_game_type(task.game_type.clone());
        let payload = GameInvitationPayload {
            players: task
                .players
                .iter()
                .map(|p| p.player_id.clone())
                .collect(),
        };

        let timeout = Duration::from_millis(self.config.timeouts.match_join_ack_ms);
        let body = self
            .client
            .send(&player.endpoint, envelope, json!(payload), timeout)
            .await?;

        if body.envelope.message_type != MessageType::GameJoinAck
            || body.envelope.match_id != Some(task.match_id)
        {
            return Err(ClientError::InvalidFrame(
                "expected GAME_JOIN_ACK for this match".to_string(),
            ));
        }
        debug!("Player {} joined match {}", player.player_id, task.match_id);
        Ok(())
    }

    /// One solicited move with its own deadline. Timeouts and malformed
    /// replies are both the mover's fault.
    async fn request_move(
        &self,
        task: &MatchTask,
        player: &PlayerRef,
        step_number: u32,
        step_context: Value,
    ) -> Result<Value, String> {
        let envelope = Envelope::new(
            MessageType::RequestMove,
            Sender::referee(self.referee_id.clone()),
        )
        .with_match_id(task.match_id)
        .with_game_type(task.game_type.clone());
        let payload = RequestMovePayload {
            step_number,
            step_context,
        };

        let timeout = Duration::from_millis(self.config.timeouts.move_response_ms);
        let body = self
            .client
            .send(&player.endpoint, envelope, json!(payload), timeout)
            .await
            .map_err(|err| match err {
                ClientError::Timeout => "move_timeout".to_string(),
                _ => "invalid_response".to_string(),
            })?;

        if body.envelope.message_type != MessageType::MoveResponse
            || body.envelope.match_id != Some(task.match_id)
        {
            return Err("invalid_response".to_string());
        }

        let response: MoveResponsePayload =
            serde_json::from_value(body.payload).map_err(|_| "invalid_response".to_string())?;
        Ok(response.move_payload)
    }

    /// Best-effort GAME_OVER fan-out; the match is over regardless of
    /// whether the players hear about it
    async fn broadcast_game_over(&self, task: &MatchTask, report: &MatchReport) {
        let payload = GameOverPayload {
            outcome: report.outcome.clone(),
            final_state: report.metadata.clone(),
        };
        let timeout = Duration::from_millis(self.config.timeouts.match_join_ack_ms);

        async fn send_to(
            client: &MessageClient,
            referee_id: &str,
            task: &MatchTask,
            payload: &GameOverPayload,
            timeout: Duration,
            player: &PlayerRef,
        ) -> Result<ResponseBody, ClientError> {
            let envelope = Envelope::new(MessageType::GameOver, Sender::referee(referee_id.to_string()))
                .with_match_id(task.match_id)
                .with_game_type(task.game_type.clone());
            client
                .send(&player.endpoint, envelope, json!(payload), timeout)
                .await
        }

        let (home, away) = futures_util::join!(
            send_to(&self.client, &self.referee_id, task, &payload, timeout, &task.players[0]),
            send_to(&self.client, &self.referee_id, task, &payload, timeout, &task.players[1])
        );
        for (player, sent) in task.players.iter().zip([home, away]) {
            if let Err(err) = sent {
                debug!(
                    "GAME_OVER to {} for match {} failed: {err}",
                    player.player_id, task.match_id
                );
            }
        }
    }

    /// Delivers the result with idempotent retries; the UNIQUE match id
    /// on the league side makes replays safe
    async fn report_result(
        &self,
        task: &MatchTask,
        report: &MatchReport,
    ) -> Result<(), ClientError> {
        let credentials = self.credentials().map_err(|_| {
            ClientError::InvalidFrame("referee lost its credentials".to_string())
        })?;

        let envelope = Envelope::new(
            MessageType::MatchResultReport,
            Sender::referee(self.referee_id.clone()),
        )
        .with_auth_token(credentials.auth_token)
        .with_league_id(credentials.league_id)
        .with_round_id(task.round_id)
        .with_match_id(task.match_id)
        .with_game_type(task.game_type.clone());

        let payload = MatchResultReportPayload {
            players: task.players.iter().map(|p| p.player_id.clone()).collect(),
            outcome: report.outcome.clone(),
            points: report.points.clone(),
            game_metadata: report.metadata.clone(),
            failed: report.failed,
        };

        let timeout = Duration::from_millis(self.config.timeouts.result_report_ms);
        match self
            .client
            .send_idempotent(
                &self.config.manager_endpoint,
                envelope,
                json!(payload),
                timeout,
            )
            .await
        {
            Ok(body) => {
                debug!(
                    "Result for match {} acknowledged ({})",
                    task.match_id, body.envelope.message_type
                );
                Ok(())
            }
            // A protocol-level rejection is delivered; retrying the same
            // report cannot change the answer
            Err(ClientError::Rpc(err)) => {
                error!(
                    "Manager rejected result for match {}: {} {}",
                    task.match_id, err.code, err.message
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        audit::AuditLog, config::Config, games::GameRegistry, referee::RefereeService,
    };
    use std::sync::Arc;
    use uuid::Uuid;

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

    fn task() -> MatchTask {
        MatchTask {
            match_id: Uuid::new_v4(),
            round_id: Uuid::new_v4(),
            game_type: "sum_duel".to_string(),
            players: vec![
                PlayerRef {
                    player_id: "alice".to_string(),
                    endpoint: "http://127.0.0.1:1".to_string(),
                },
                PlayerRef {
                    player_id: "bob".to_string(),
                    endpoint: "http://127.0.0.1:2".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_forfeit_awards_full_points_to_opponent() {
        let (service, _dir) = service();
        let report = service.forfeit_report(&task(), "alice", "move_timeout");

        assert_eq!(report.outcome["alice"], OutcomeKind::Loss);
        assert_eq!(report.outcome["bob"], OutcomeKind::Win);
        assert_eq!(report.points["alice"], 0);
        assert_eq!(report.points["bob"], 3);
        assert!(!report.failed);
        assert_eq!(report.metadata["forfeit"], json!(true));
        assert_eq!(report.metadata["offender"], json!("alice"));
        assert_eq!(report.metadata["reason"], json!("move_timeout"));
    }

    #[test]
    fn test_forfeit_points_follow_scoring_override() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let mut config = Config {
            agent_id: "r1".to_string(),
            ..Config::default()
        };
        config.scoring.insert(
            "sum_duel".to_string(),
            crate::config::ScoringConfig {
                win: 2,
                draw: 1,
                loss: 1,
            },
        );
        let service =
            RefereeService::new(Arc::new(config), audit, GameRegistry::with_builtins());

        let report = service.forfeit_report(&task(), "bob", "invalid_move");
        assert_eq!(report.points["alice"], 2);
        // Overridden loss points apply to the offender as well
        assert_eq!(report.points["bob"], 1);
    }
}
