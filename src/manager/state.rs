//! Cached view of the league lifecycle. The store stays authoritative;
//! this keeps the current status readable without a query on every
//! request and guards the forward-only transition rule.

use crate::{
    database::entities::leagues::{LeagueStatus, Model as League},
    protocol::{ServerError, ServerResult},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

pub struct LeagueState {
    pub league_id: Uuid,
    /// Game type every scheduled match is played under, captured from the
    /// league settings at creation
    pub game_type: String,
    created_at: DateTime<Utc>,
    status: Mutex<LeagueStatus>,
}

impl LeagueState {
    pub fn new(league: &League) -> ServerResult<Self> {
        let league_id = Uuid::parse_str(&league.id).map_err(|_| ServerError::Internal {
            reason: format!("stored league id {} is not a UUID", league.id),
        })?;
        Ok(Self {
            league_id,
            game_type: league.config.game_type.clone(),
            created_at: league.created_at,
            status: Mutex::new(league.status),
        })
    }

    pub fn status(&self) -> LeagueStatus {
        *self.status.lock()
    }

    /// Whether registrations are currently admitted. Besides the lifecycle
    /// state, a non-zero registration window closes registration that many
    /// seconds after the league was created.
    pub fn registration_open(&self, window_seconds: u64) -> bool {
        if self.status() != LeagueStatus::Registration {
            return false;
        }
        if window_seconds == 0 {
            return true;
        }
        let deadline = self.created_at + chrono::Duration::seconds(window_seconds as i64);
        Utc::now() < deadline
    }

    /// Moves the league forward, persisting the new status. Backward or
    /// skipping transitions are refused.
    pub async fn transition(
        &self,
        db: &DatabaseConnection,
        to: LeagueStatus,
    ) -> ServerResult<()> {
        let current = self.status();
        if !current.can_transition_to(to) {
            return Err(ServerError::PreconditionFailed {
                reason: format!(
                    "illegal league transition {} -> {}",
                    current.as_str(),
                    to.as_str()
                ),
            });
        }

        let league = League::current(db)
            .await?
            .ok_or_else(|| ServerError::Internal {
                reason: "league row missing".to_string(),
            })?;
        league.set_status(db, to).await?;

        *self.status.lock() = to;
        Ok(())
    }
}
