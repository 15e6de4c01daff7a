use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, QueryOrder};
use serde::{Deserialize, Serialize};

/// One player's row inside a standings snapshot. Ranks are dense from 1;
/// ties are already broken deterministically by the standings engine so
/// equal aggregates never share a rank.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "player_rankings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub snapshot_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub player_id: String,
    pub rank: u32,
    pub points: i64,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub matches_played: u32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        snapshot_id: String,
        player_id: String,
        rank: u32,
        points: i64,
        wins: u32,
        draws: u32,
        losses: u32,
        matches_played: u32,
    ) -> DbResult<Self> {
        ActiveModel {
            snapshot_id: Set(snapshot_id),
            player_id: Set(player_id),
            rank: Set(rank),
            points: Set(points),
            wins: Set(wins),
            draws: Set(draws),
            losses: Set(losses),
            matches_played: Set(matches_played),
        }
        .insert(db)
        .await
    }

    /// Rows of one snapshot in rank order
    pub async fn for_snapshot(db: &DatabaseConnection, snapshot_id: &str) -> DbResult<Vec<Self>> {
        Entity::find()
            .filter(Column::SnapshotId.eq(snapshot_id))
            .order_by_asc(Column::Rank)
            .all(db)
            .await
    }
}
