//! Deterministic single round-robin generator. Player ids are sorted
//! before generation, so the same input set always yields the same
//! `(round_number, pair)` sequence; match ids are minted as UUID v4 when
//! the schedule is persisted and are stable from that point on.

use thiserror::Error;
use std::collections::HashSet;

/// Pairings grouped by round, round index 0 is round number 1
pub type RoundPlan = Vec<Vec<(String, String)>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected {expected} matches, generated {got}")]
    WrongMatchCount { expected: usize, got: usize },
    #[error("player {0} appears twice in one round")]
    PlayerRepeatedInRound(String),
    #[error("player {player} plays {got} matches, expected {expected}")]
    WrongPlayerLoad {
        player: String,
        expected: usize,
        got: usize,
    },
    #[error("pair coverage is incomplete")]
    IncompletePairs,
}

/// Generates the full round-robin using the circle method: one seat is
/// fixed and the rest rotate each round. An odd player count gets a
/// sentinel bye seat whose pairings are discarded, leaving one idle
/// player per round.
pub fn round_robin(players: &[String]) -> RoundPlan {
    let mut ids: Vec<String> = players.to_vec();
    ids.sort();

    if ids.len() < 2 {
        return Vec::new();
    }

    let mut seats: Vec<Option<String>> = ids.into_iter().map(Some).collect();
    if seats.len() % 2 == 1 {
        seats.push(None);
    }

    let seat_count = seats.len();
    let round_count = seat_count - 1;
    let mut rounds = Vec::with_capacity(round_count);

    for _ in 0..round_count {
        let mut pairs = Vec::with_capacity(seat_count / 2);
        for i in 0..seat_count / 2 {
            if let (Some(home), Some(away)) = (&seats[i], &seats[seat_count - 1 - i]) {
                pairs.push((home.clone(), away.clone()));
            }
        }
        rounds.push(pairs);

        // Rotate every seat but the first
        let last = seats
            .pop()
            .expect("circle rotation with no seats");
        seats.insert(1, last);
    }

    rounds
}

/// Postconditions asserted before a schedule is committed: total match
/// count, per-player load, per-round uniqueness and complete coverage of
/// every unordered pair.
pub fn verify_schedule(players: &[String], rounds: &RoundPlan) -> Result<(), ScheduleError> {
    let mut ids: Vec<String> = players.to_vec();
    ids.sort();
    let n = ids.len();

    let expected_matches = n * n.saturating_sub(1) / 2;
    let got_matches: usize = rounds.iter().map(Vec::len).sum();
    if got_matches != expected_matches {
        return Err(ScheduleError::WrongMatchCount {
            expected: expected_matches,
            got: got_matches,
        });
    }

    let mut pair_set: HashSet<(String, String)> = HashSet::with_capacity(expected_matches);
    let mut load: std::collections::HashMap<&str, usize> = Default::default();

    for round in rounds {
        let mut seen_in_round: HashSet<&str> = HashSet::new();
        for (home, away) in round {
            for player in [home, away] {
                if !seen_in_round.insert(player) {
                    return Err(ScheduleError::PlayerRepeatedInRound(player.clone()));
                }
                *load.entry(player).or_default() += 1;
            }
            let key = if home < away {
                (home.clone(), away.clone())
            } else {
                (away.clone(), home.clone())
            };
            pair_set.insert(key);
        }
    }

    if n >= 2 {
        for player in &ids {
            let got = load.get(player.as_str()).copied().unwrap_or(0);
            if got != n - 1 {
                return Err(ScheduleError::WrongPlayerLoad {
                    player: player.clone(),
                    expected: n - 1,
                    got,
                });
            }
        }
    }

    if pair_set.len() != expected_matches {
        return Err(ScheduleError::IncompletePairs);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::{round_robin, verify_schedule};

    fn players(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_empty_and_single_player() {
        assert!(round_robin(&players(&[])).is_empty());
        assert!(round_robin(&players(&["alice"])).is_empty());
    }

    #[test]
    fn test_two_players_single_match() {
        let input = players(&["bob", "alice"]);
        let rounds = round_robin(&input);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].len(), 1);
        verify_schedule(&input, &rounds).unwrap();
    }

    #[test]
    fn test_odd_count_gets_bye_rounds() {
        let input = players(&["alice", "bob", "carol"]);
        let rounds = round_robin(&input);
        // Odd N plays N rounds with one match and one bye each
        assert_eq!(rounds.len(), 3);
        for round in &rounds {
            assert_eq!(round.len(), 1);
        }
        verify_schedule(&input, &rounds).unwrap();
    }

    #[test]
    fn test_even_count_full_rounds() {
        let input = players(&["a", "b", "c", "d", "e", "f"]);
        let rounds = round_robin(&input);
        assert_eq!(rounds.len(), 5);
        for round in &rounds {
            assert_eq!(round.len(), 3);
        }
        verify_schedule(&input, &rounds).unwrap();
    }

    #[test]
    fn test_postconditions_across_sizes() {
        for n in 0..12 {
            let input: Vec<String> = (0..n).map(|i| format!("player{i:02}")).collect();
            let rounds = round_robin(&input);
            verify_schedule(&input, &rounds).unwrap();
        }
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let forward = players(&["alice", "bob", "carol", "dave"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(round_robin(&forward), round_robin(&reversed));
    }

    #[test]
    fn test_verify_rejects_duplicate_player_in_round() {
        let input = players(&["a", "b", "c", "d"]);
        let mut rounds = round_robin(&input);
        // Corrupt one round so a player appears twice
        rounds[0] = vec![
            ("a".to_string(), "b".to_string()),
            ("a".to_string(), "c".to_string()),
        ];
        assert!(verify_schedule(&input, &rounds).is_err());
    }
}
