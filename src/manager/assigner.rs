//! Binds pending matches to idle referees. The busy set is the in-memory
//! guard that keeps each referee on at most one match; the mutex is held
//! only for the flag flip itself. Rounds are strictly sequential: round
//! N+1 is not touched until every match of round N is terminal.

use super::LeagueManager;
use crate::{
    database::entities::{
        leagues::LeagueStatus,
        matches::MatchStatus,
        rounds::RoundStatus,
        AgentStatus, Match, Player, Referee, Round,
    },
    protocol::{
        messages::{MatchAssignmentPayload, PlayerRef},
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::{collections::HashSet, sync::atomic::Ordering, time::Duration};
use uuid::Uuid;

/// Busy flags per referee id. Acquire flips a referee to busy only when
/// it was idle, so two concurrent assignment walks cannot double-book.
#[derive(Default)]
pub struct RefereePool {
    busy: Mutex<HashSet<String>>,
}

impl RefereePool {
    /// Attempts to flip the referee to busy, returns false when it
    /// already was
    pub fn try_acquire(&self, referee_id: &str) -> bool {
        self.busy.lock().insert(referee_id.to_string())
    }

    pub fn release(&self, referee_id: &str) {
        self.busy.lock().remove(referee_id);
    }

    pub fn is_busy(&self, referee_id: &str) -> bool {
        self.busy.lock().contains(referee_id)
    }

    pub fn busy_count(&self) -> usize {
        self.busy.lock().len()
    }
}

impl LeagueManager {
    /// Walks the schedule and dispatches as many pending matches as the
    /// idle referees and the concurrency setting allow. Invoked on entry
    /// to ACTIVE and after every accepted result.
    pub(super) async fn dispatch_pending(&self) -> ServerResult<()> {
        if self.state.status() != LeagueStatus::Active {
            return Ok(());
        }

        let league_id = self.state.league_id.to_string();
        let concurrent = self.config.scheduling.concurrent_matches_per_round;
        let rounds = Round::by_league(&self.db, &league_id).await?;

        for round in rounds {
            let mut matches = Match::by_round(&self.db, &round.round_id).await?;
            if self.reap_overdue(&matches).await? {
                matches = Match::by_round(&self.db, &round.round_id).await?;
            }

            if matches.iter().all(|m| m.status.is_terminal()) {
                if round.status != RoundStatus::Completed {
                    round.set_status(&self.db, RoundStatus::Completed).await?;
                }
                continue;
            }

            // This is the earliest unfinished round; later rounds must wait
            let in_flight = matches
                .iter()
                .filter(|m| {
                    matches!(m.status, MatchStatus::Assigned | MatchStatus::InProgress)
                })
                .count();
            if !concurrent && in_flight > 0 {
                return Ok(());
            }

            if round.status == RoundStatus::Pending {
                round
                    .clone()
                    .set_status(&self.db, RoundStatus::Active)
                    .await?;
            }

            for match_row in matches
                .into_iter()
                .filter(|m| m.status == MatchStatus::Pending)
            {
                let Some(referee) = self.pick_idle_referee().await? else {
                    debug!("No idle referee for match {}", match_row.match_id);
                    return Ok(());
                };

                let assigned = match_row.assign(&self.db, &referee.referee_id).await?;
                if let Err(err) = self.send_assignment(&assigned, &round, &referee).await {
                    warn!(
                        "Assignment of match {} to referee {} failed: {err}",
                        assigned.match_id, referee.referee_id
                    );
                    assigned.unassign(&self.db).await?;
                    self.pool.release(&referee.referee_id);
                    continue;
                }

                self.counters
                    .assignments_dispatched
                    .fetch_add(1, Ordering::Relaxed);

                if !concurrent {
                    return Ok(());
                }
            }

            return Ok(());
        }

        Ok(())
    }

    /// Fails matches whose referee went silent past the match deadline,
    /// freeing the referee slot. Covers a referee crash mid-match, which
    /// forfeits only the match it was running.
    async fn reap_overdue(&self, matches: &[Match]) -> ServerResult<bool> {
        let deadline = chrono::Duration::milliseconds(
            self.config.timeouts.match_deadline_ms.max(1) as i64,
        );
        let now = chrono::Utc::now();
        let mut reaped = false;

        for match_row in matches {
            let overdue = matches!(
                match_row.status,
                MatchStatus::Assigned | MatchStatus::InProgress
            ) && match_row
                .assigned_at
                .map(|at| at + deadline < now)
                .unwrap_or(false);
            if !overdue {
                continue;
            }

            warn!(
                "Match {} exceeded the match deadline, marking it failed",
                match_row.match_id
            );
            match_row
                .clone()
                .set_status(&self.db, MatchStatus::Failed)
                .await?;
            if let Some(referee_id) = &match_row.referee_id {
                self.pool.release(referee_id);
            }
            reaped = true;
        }

        if reaped {
            self.finish_league_if_done().await?;
        }
        Ok(reaped)
    }

    /// Picks any ACTIVE referee whose busy flag is clear, flipping the
    /// flag before returning
    async fn pick_idle_referee(&self) -> ServerResult<Option<Referee>> {
        let referees = Referee::all(&self.db).await?;
        for referee in referees {
            if referee.status != AgentStatus::Active {
                continue;
            }
            if self.pool.try_acquire(&referee.referee_id) {
                return Ok(Some(referee));
            }
        }
        Ok(None)
    }

    /// Dispatches MATCH_ASSIGNMENT and, once the referee acknowledged,
    /// moves the match to IN_PROGRESS. A very fast referee may complete
    /// the match before the ack lands, so the status is only advanced
    /// when it still reads ASSIGNED.
    async fn send_assignment(
        &self,
        match_row: &Match,
        round: &Round,
        referee: &Referee,
    ) -> ServerResult<()> {
        let players = self.assignment_players(match_row).await?;
        let payload = MatchAssignmentPayload { players };

        let envelope = Envelope::new(MessageType::MatchAssignment, Sender::LeagueManager)
            .with_auth_token(referee.auth_token.clone())
            .with_league_id(self.state.league_id)
            .with_round_id(parse_uuid(&round.round_id)?)
            .with_match_id(parse_uuid(&match_row.match_id)?)
            .with_game_type(match_row.game_type.clone());

        let timeout = Duration::from_millis(self.config.timeouts.result_report_ms);
        self.client
            .send_idempotent(
                &referee.endpoint,
                envelope,
                serde_json::to_value(&payload).map_err(|err| {
                    ServerError::Internal {
                        reason: err.to_string(),
                    }
                })?,
                timeout,
            )
            .await
            .map_err(|err| {
                error!(
                    "Failed to deliver assignment {}: {err}",
                    match_row.match_id
                );
                ServerError::RefereeUnavailable
            })?;

        let current = Match::by_id(&self.db, &match_row.match_id)
            .await?
            .ok_or_else(|| ServerError::Internal {
                reason: "assigned match vanished".to_string(),
            })?;
        if current.status == MatchStatus::Assigned {
            current.set_status(&self.db, MatchStatus::InProgress).await?;
        }

        Ok(())
    }

    async fn assignment_players(&self, match_row: &Match) -> ServerResult<Vec<PlayerRef>> {
        let mut players = Vec::with_capacity(2);
        for player_id in [&match_row.player_home, &match_row.player_away] {
            let player = Player::by_id(&self.db, player_id).await?.ok_or_else(|| {
                ServerError::Internal {
                    reason: format!("scheduled player {player_id} is not registered"),
                }
            })?;
            players.push(PlayerRef {
                player_id: player.player_id,
                endpoint: player.endpoint,
            });
        }
        Ok(players)
    }
}

pub(super) fn parse_uuid(value: &str) -> ServerResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ServerError::Internal {
        reason: format!("stored id {value} is not a UUID"),
    })
}

#[cfg(test)]
mod test {
    use super::RefereePool;

    #[test]
    fn test_busy_flag_single_holder() {
        let pool = RefereePool::default();
        assert!(pool.try_acquire("r1"));
        assert!(!pool.try_acquire("r1"));
        assert!(pool.is_busy("r1"));

        pool.release("r1");
        assert!(!pool.is_busy("r1"));
        assert!(pool.try_acquire("r1"));
    }

    #[test]
    fn test_busy_count() {
        let pool = RefereePool::default();
        pool.try_acquire("r1");
        pool.try_acquire("r2");
        assert_eq!(pool.busy_count(), 2);
        pool.release("r1");
        assert_eq!(pool.busy_count(), 1);
    }
}
