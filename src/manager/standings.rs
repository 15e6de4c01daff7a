//! Standings aggregation and snapshotting. Aggregates are derived purely
//! from stored results; the engine never reads game rules. Every accepted
//! result produces two immutable snapshots: one scoped to the match's
//! round (cumulative through that round) and one overall.

use super::{
    registration::{reply_with, required_token},
    LeagueManager,
};
use crate::{
    database::entities::{
        Match, MatchResult, Player, PlayerRanking, Round, StandingsSnapshot,
    },
    protocol::{
        messages::{OutcomeKind, StandingRow, StandingsResponsePayload},
        Envelope, MessageType, Sender, ServerError, ServerResult,
    },
    transport::Reply,
};
use log::debug;
use sea_orm::TransactionTrait;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Aggregated tally for one player before ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTally {
    pub player_id: String,
    pub points: i64,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub matches_played: u32,
}

impl PlayerTally {
    fn new(player_id: String) -> Self {
        Self {
            player_id,
            points: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            matches_played: 0,
        }
    }
}

/// Folds the visible results into per-player tallies. Players without any
/// completed match keep an all-zero row so every snapshot covers the full
/// field.
pub fn aggregate(
    players: &[String],
    matches: &[Match],
    results: &HashMap<String, MatchResult>,
) -> Vec<PlayerTally> {
    let mut tallies: HashMap<&str, PlayerTally> = players
        .iter()
        .map(|id| (id.as_str(), PlayerTally::new(id.clone())))
        .collect();

    for match_row in matches {
        let Some(result) = results.get(&match_row.match_id) else {
            continue;
        };
        for (player_id, kind) in &result.outcome.0 {
            let Some(tally) = tallies.get_mut(player_id.as_str()) else {
                continue;
            };
            tally.matches_played += 1;
            tally.points += result.points.0.get(player_id).copied().unwrap_or(0);
            match kind {
                OutcomeKind::Win => tally.wins += 1,
                OutcomeKind::Draw => tally.draws += 1,
                OutcomeKind::Loss => tally.losses += 1,
            }
        }
    }

    let mut tallies: Vec<PlayerTally> = tallies.into_values().collect();
    sort_for_ranking(&mut tallies);
    tallies
}

/// Orders tallies by the canonical key: points, then wins, then draws,
/// all descending, with ascending player id as the deterministic trailing
/// tie-break. Dense 1-based ranks follow directly from the order.
pub fn sort_for_ranking(tallies: &mut [PlayerTally]) {
    tallies.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.wins.cmp(&a.wins))
            .then(b.draws.cmp(&a.draws))
            .then(a.player_id.cmp(&b.player_id))
    });
}

impl LeagueManager {
    /// Writes a round-scoped snapshot (results through the round's number)
    /// and a fresh overall snapshot. Caller holds the results lock.
    pub(super) async fn recompute_standings(&self, round_id: &str) -> ServerResult<()> {
        let league_id = self.state.league_id.to_string();

        let players: Vec<String> = Player::all(&self.db)
            .await?
            .into_iter()
            .map(|player| player.player_id)
            .collect();

        let rounds = Round::by_league(&self.db, &league_id).await?;
        let this_round = rounds
            .iter()
            .find(|round| round.round_id == round_id)
            .ok_or_else(|| ServerError::Internal {
                reason: format!("round {round_id} not found for standings"),
            })?;

        let results: HashMap<String, MatchResult> = MatchResult::all(&self.db)
            .await?
            .into_iter()
            .map(|result| (result.match_id.clone(), result))
            .collect();

        let mut through_round: Vec<Match> = Vec::new();
        let mut all_matches: Vec<Match> = Vec::new();
        for round in &rounds {
            let matches = Match::by_round(&self.db, &round.round_id).await?;
            if round.round_number <= this_round.round_number {
                through_round.extend(matches.iter().cloned());
            }
            all_matches.extend(matches);
        }

        let round_tallies = aggregate(&players, &through_round, &results);
        let overall_tallies = aggregate(&players, &all_matches, &results);

        self.write_snapshot(&league_id, Some(round_id), &round_tallies)
            .await?;
        self.write_snapshot(&league_id, None, &overall_tallies)
            .await?;

        debug!("Standings recomputed through round {}", this_round.round_number);
        Ok(())
    }

    async fn write_snapshot(
        &self,
        league_id: &str,
        round_id: Option<&str>,
        tallies: &[PlayerTally],
    ) -> ServerResult<()> {
        let snapshot_id = Uuid::new_v4().to_string();
        let txn = self.db.begin().await?;
        StandingsSnapshot::create(
            &txn,
            snapshot_id.clone(),
            league_id.to_string(),
            round_id.map(str::to_string),
        )
        .await?;
        for (index, tally) in tallies.iter().enumerate() {
            PlayerRanking::create(
                &txn,
                snapshot_id.clone(),
                tally.player_id.clone(),
                (index + 1) as u32,
                tally.points,
                tally.wins,
                tally.draws,
                tally.losses,
                tally.matches_played,
            )
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }

    /// Answers QUERY_STANDINGS from the latest snapshot of the requested
    /// scope. Leagues without any snapshot yet answer an empty table.
    pub(super) async fn handle_query_standings(
        &self,
        envelope: Envelope,
        _payload: Option<Value>,
    ) -> ServerResult<Reply> {
        let token = required_token(&envelope)?;
        self.auth.verify_sender(token, &envelope.sender)?;

        let league_id = self.state.league_id.to_string();
        let round_id = envelope.round_id.map(|id| id.to_string());

        let snapshot =
            StandingsSnapshot::latest(&self.db, &league_id, round_id.as_deref()).await?;

        let payload = match snapshot {
            Some(snapshot) => {
                let rows = PlayerRanking::for_snapshot(&self.db, &snapshot.snapshot_id).await?;
                StandingsResponsePayload {
                    round_id: snapshot.round_id,
                    updated_at: Some(snapshot.computed_at),
                    standings: rows
                        .into_iter()
                        .map(|row| StandingRow {
                            rank: row.rank,
                            player_id: row.player_id,
                            points: row.points,
                            wins: row.wins,
                            draws: row.draws,
                            losses: row.losses,
                            matches_played: row.matches_played,
                        })
                        .collect(),
                }
            }
            None => StandingsResponsePayload {
                round_id,
                updated_at: None,
                standings: Vec::new(),
            },
        };

        let reply_envelope = envelope
            .reply(MessageType::StandingsResponse, Sender::LeagueManager)
            .with_league_id(self.state.league_id);
        reply_with(reply_envelope, &payload)
    }
}

#[cfg(test)]
mod test {
    use super::{sort_for_ranking, PlayerTally};

    fn tally(player: &str, points: i64, wins: u32, draws: u32) -> PlayerTally {
        PlayerTally {
            player_id: player.to_string(),
            points,
            wins,
            draws,
            losses: 0,
            matches_played: 0,
        }
    }

    #[test]
    fn test_sort_by_points_then_wins_then_draws() {
        let mut tallies = vec![
            tally("dora", 3, 1, 0),
            tally("carol", 4, 0, 4),
            tally("bob", 4, 1, 1),
            tally("alice", 6, 2, 0),
        ];
        sort_for_ranking(&mut tallies);
        let order: Vec<&str> = tallies.iter().map(|t| t.player_id.as_str()).collect();
        assert_eq!(order, ["alice", "bob", "carol", "dora"]);
    }

    #[test]
    fn test_full_tie_breaks_on_player_id() {
        let mut tallies = vec![tally("carol", 1, 0, 1), tally("bob", 1, 0, 1)];
        sort_for_ranking(&mut tallies);
        let order: Vec<&str> = tallies.iter().map(|t| t.player_id.as_str()).collect();
        // Equal on every aggregate, so the ascending id decides
        assert_eq!(order, ["bob", "carol"]);
    }
}
