//! Intake of match results with exactly-once semantics. The UNIQUE index
//! on `match_results.match_id` is the authoritative gate; everything else
//! here is validation and follow-up work. Result application and the
//! standings recomputation it triggers are serialized behind one lock.

use super::{
    registration::{parse_payload, reply_with, required_token},
    LeagueManager,
};
use crate::{
    auth::AgentType,
    database::entities::{
        leagues::LeagueStatus,
        match_results::{GameMetadata, OutcomeMap, PointsMap},
        matches::MatchStatus,
        rounds::RoundStatus,
        Match, MatchResult, Round,
    },
    protocol::{
        messages::{MatchResultAckPayload, MatchResultReportPayload, OutcomeKind},
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::Reply,
};
use log::{info, warn};
use sea_orm::TransactionTrait;
use serde_json::Value;
use std::sync::atomic::Ordering;
use uuid::Uuid;

impl LeagueManager {
    pub(super) async fn handle_result_report(
        &self,
        envelope: Envelope,
        payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let token = required_token(&envelope)?;
        let identity = self.auth.verify_sender(token, &envelope.sender)?;
        if identity.agent_type != AgentType::Referee {
            return Err(ServerError::SenderMismatch);
        }

        let match_id = envelope
            .match_id
            .ok_or(ServerError::MissingField {
                field: "match_id".to_string(),
            })?
            .to_string();

        // One writer on the results + snapshots path
        let _guard = self.results_lock.lock().await;

        let match_row = Match::by_id(&self.db, &match_id)
            .await?
            .ok_or_else(|| ServerError::Validation {
                reason: format!("unknown match {match_id}"),
            })?;

        // Idempotent replay: answer with the stored result, touch nothing
        if let Some(existing) = MatchResult::by_match_id(&self.db, &match_id).await? {
            self.counters
                .duplicate_results
                .fetch_add(1, Ordering::Relaxed);
            return ack(envelope, Some(existing.result_id), match_id, "duplicate");
        }

        if match_row.referee_id.as_deref() != Some(identity.agent_id.as_str()) {
            return Err(ServerError::PreconditionFailed {
                reason: format!(
                    "referee {} is not assigned to match {match_id}",
                    identity.agent_id
                ),
            });
        }

        let report: MatchResultReportPayload = parse_payload(payload)?;

        // A referee that could not finish the match (not a clean forfeit)
        // reports it failed; the match terminates without a result row
        if report.failed {
            return match match_row.status {
                MatchStatus::Assigned | MatchStatus::InProgress => {
                    match_row
                        .clone()
                        .set_status(&self.db, MatchStatus::Failed)
                        .await?;
                    self.pool.release(&identity.agent_id);
                    warn!("Match {match_id} reported failed by {}", identity.agent_id);
                    self.finish_round_if_done(&match_row.round_id).await?;
                    self.finish_league_if_done().await?;
                    self.assign_notify.notify_one();
                    ack(envelope, None, match_id, "failed")
                }
                // Retried failure report
                MatchStatus::Failed => ack(envelope, None, match_id, "failed"),
                MatchStatus::Completed => Err(ServerError::DuplicateResult),
                MatchStatus::Pending => Err(ServerError::PreconditionFailed {
                    reason: format!("match {match_id} was never assigned"),
                }),
            };
        }

        match match_row.status {
            // ASSIGNED tolerates a fast-path report that raced the status
            // update after the assignment ack
            MatchStatus::Assigned | MatchStatus::InProgress => {}
            MatchStatus::Completed | MatchStatus::Failed => {
                return Err(ServerError::DuplicateResult)
            }
            MatchStatus::Pending => {
                return Err(ServerError::PreconditionFailed {
                    reason: format!("match {match_id} was never assigned"),
                })
            }
        }

        self.validate_report(&match_row, &report)?;

        let result_id = Uuid::new_v4().to_string();
        let txn = self.db.begin().await?;
        let insert = MatchResult::create(
            &txn,
            result_id.clone(),
            match_id.clone(),
            OutcomeMap(report.outcome.clone()),
            PointsMap(report.points.clone()),
            GameMetadata(report.game_metadata.clone()),
        )
        .await;

        let stored = match insert {
            Ok(value) => value,
            Err(err) => {
                // A concurrent insert tripping the UNIQUE gate still gets
                // an idempotent ACK referencing the stored row
                txn.rollback().await?;
                if let Some(existing) = MatchResult::by_match_id(&self.db, &match_id).await? {
                    warn!("Result for match {match_id} raced, replying with stored result");
                    self.counters
                        .duplicate_results
                        .fetch_add(1, Ordering::Relaxed);
                    return ack(envelope, Some(existing.result_id), match_id, "duplicate");
                }
                return Err(err.into());
            }
        };
        match_row
            .clone()
            .set_status(&txn, MatchStatus::Completed)
            .await?;
        txn.commit().await?;

        self.pool.release(&identity.agent_id);
        self.counters
            .results_accepted
            .fetch_add(1, Ordering::Relaxed);
        info!(
            "Recorded result {} for match {match_id} ({:?})",
            stored.result_id, report.outcome
        );

        self.finish_round_if_done(&match_row.round_id).await?;
        self.recompute_standings(&match_row.round_id).await?;
        self.finish_league_if_done().await?;

        // More matches may now be assignable
        self.assign_notify.notify_one();

        ack(envelope, Some(stored.result_id), match_id, "accepted")
    }

    /// Structural validation: the outcome must cover exactly the match's
    /// two players with one win and one loss or two draws, and the points
    /// must agree with the scoring table for the game type.
    fn validate_report(
        &self,
        match_row: &Match,
        report: &MatchResultReportPayload,
    ) -> ServerResult<()> {
        let players = [&match_row.player_home, &match_row.player_away];

        for player in players {
            if !report.outcome.contains_key(player.as_str()) {
                return Err(ServerError::Validation {
                    reason: format!("outcome is missing player {player}"),
                });
            }
        }
        if report.outcome.len() != 2 {
            return Err(ServerError::Validation {
                reason: "outcome must cover exactly the match's two players".to_string(),
            });
        }

        let mut wins = 0;
        let mut losses = 0;
        let mut draws = 0;
        for kind in report.outcome.values() {
            match kind {
                OutcomeKind::Win => wins += 1,
                OutcomeKind::Loss => losses += 1,
                OutcomeKind::Draw => draws += 1,
            }
        }
        let valid_shape = (wins == 1 && losses == 1 && draws == 0) || (draws == 2 && wins == 0);
        if !valid_shape {
            return Err(ServerError::Validation {
                reason: "outcome must be one win and one loss, or two draws".to_string(),
            });
        }

        let scoring = self.config.scoring_for(&match_row.game_type);
        for (player, kind) in &report.outcome {
            let expected = match kind {
                OutcomeKind::Win => scoring.win,
                OutcomeKind::Draw => scoring.draw,
                OutcomeKind::Loss => scoring.loss,
            };
            match report.points.get(player) {
                Some(points) if *points == expected && *points >= 0 => {}
                Some(points) => {
                    return Err(ServerError::Validation {
                        reason: format!(
                            "player {player} reported {points} points, scoring table says {expected}"
                        ),
                    })
                }
                None => {
                    return Err(ServerError::Validation {
                        reason: format!("points are missing player {player}"),
                    })
                }
            }
        }

        Ok(())
    }

    pub(super) async fn finish_round_if_done(&self, round_id: &str) -> ServerResult<()> {
        let matches = Match::by_round(&self.db, round_id).await?;
        if !matches.iter().all(|m| m.status.is_terminal()) {
            return Ok(());
        }
        if let Some(round) = Round::by_id(&self.db, round_id).await? {
            if round.status != RoundStatus::Completed {
                round.set_status(&self.db, RoundStatus::Completed).await?;
            }
        }
        Ok(())
    }

    pub(super) async fn finish_league_if_done(&self) -> ServerResult<()> {
        if self.state.status() != LeagueStatus::Active {
            return Ok(());
        }
        if Match::unfinished_count(&self.db).await? == 0 {
            info!("All matches finished, league complete");
            self.state
                .transition(&self.db, LeagueStatus::Completed)
                .await?;
        }
        Ok(())
    }
}

fn ack(
    envelope: Envelope,
    result_id: Option<String>,
    match_id: String,
    status: &str,
) -> ServerResult<Reply> {
    let reply_envelope = envelope.reply(MessageType::MatchResultAck, Sender::LeagueManager);
    reply_with(
        reply_envelope,
        &MatchResultAckPayload {
            result_id,
            match_id,
            status: status.to_string(),
        },
    )
}
