use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, IntoActiveModel, QueryOrder};
use serde::{Deserialize, Serialize};

/// A single pairing inside a round. The referee stays null until the
/// assigner binds the match; the home/away split only matters for any
/// first-mover convention the game engine defines.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub match_id: String,
    pub round_id: String,
    pub referee_id: Option<String>,
    pub game_type: String,
    pub player_home: String,
    pub player_away: String,
    pub status: MatchStatus,
    pub assigned_at: Option<DateTimeUtc>,
}

#[derive(
    Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "u8", db_type = "TinyUnsigned")]
#[repr(u8)]
pub enum MatchStatus {
    #[sea_orm(num_value = 0)]
    Pending = 0,
    #[sea_orm(num_value = 1)]
    Assigned = 1,
    #[sea_orm(num_value = 2)]
    InProgress = 2,
    #[sea_orm(num_value = 3)]
    Completed = 3,
    #[sea_orm(num_value = 4)]
    Failed = 4,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the match can no longer produce a result
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        match_id: String,
        round_id: String,
        game_type: String,
        player_home: String,
        player_away: String,
    ) -> DbResult<Self> {
        ActiveModel {
            match_id: Set(match_id),
            round_id: Set(round_id),
            referee_id: Set(None),
            game_type: Set(game_type),
            player_home: Set(player_home),
            player_away: Set(player_away),
            status: Set(MatchStatus::Pending),
            assigned_at: Set(None),
        }
        .insert(db)
        .await
    }

    pub async fn by_id(db: &DatabaseConnection, match_id: &str) -> DbResult<Option<Self>> {
        Entity::find_by_id(match_id).one(db).await
    }

    /// Matches of one round in stable (sorted match id) order
    pub async fn by_round(db: &DatabaseConnection, round_id: &str) -> DbResult<Vec<Self>> {
        Entity::find()
            .filter(Column::RoundId.eq(round_id))
            .order_by_asc(Column::MatchId)
            .all(db)
            .await
    }

    /// Count of matches that can still produce results
    pub async fn unfinished_count(db: &DatabaseConnection) -> DbResult<u64> {
        Entity::find()
            .filter(
                Column::Status
                    .ne(MatchStatus::Completed)
                    .and(Column::Status.ne(MatchStatus::Failed)),
            )
            .count(db)
            .await
    }

    /// Binds the match to a referee and stamps the assignment time
    pub async fn assign(self, db: &DatabaseConnection, referee_id: &str) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.referee_id = Set(Some(referee_id.to_string()));
        model.status = Set(MatchStatus::Assigned);
        model.assigned_at = Set(Some(chrono::Utc::now()));
        model.update(db).await
    }

    /// Reverts a failed dispatch back to the pending pool
    pub async fn unassign(self, db: &DatabaseConnection) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.referee_id = Set(None);
        model.status = Set(MatchStatus::Pending);
        model.assigned_at = Set(None);
        model.update(db).await
    }

    pub async fn set_status<C: ConnectionTrait>(
        self,
        db: &C,
        status: MatchStatus,
    ) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.status = Set(status);
        model.update(db).await
    }
}
