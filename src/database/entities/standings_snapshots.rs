use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, QueryOrder};
use serde::Serialize;

/// Immutable standings snapshot header. Recomputations insert new
/// snapshots; the newest snapshot per scope is the canonical answer to a
/// standings query. A null round id marks the overall scope.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "standings_snapshots")]
pub struct Model {
    /// Monotonic insert order, used to pick the latest snapshot
    #[sea_orm(primary_key)]
    pub id: i64,
    pub snapshot_id: String,
    pub league_id: String,
    pub round_id: Option<String>,
    pub computed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        snapshot_id: String,
        league_id: String,
        round_id: Option<String>,
    ) -> DbResult<Self> {
        ActiveModel {
            snapshot_id: Set(snapshot_id),
            league_id: Set(league_id),
            round_id: Set(round_id),
            computed_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    /// Latest snapshot for a round, or the latest overall snapshot when no
    /// round is given
    pub async fn latest(
        db: &DatabaseConnection,
        league_id: &str,
        round_id: Option<&str>,
    ) -> DbResult<Option<Self>> {
        let mut query = Entity::find().filter(Column::LeagueId.eq(league_id));
        query = match round_id {
            Some(round_id) => query.filter(Column::RoundId.eq(round_id)),
            None => query.filter(Column::RoundId.is_null()),
        };
        query.order_by_desc(Column::Id).one(db).await
    }

    /// Number of snapshots recorded for a round scope
    pub async fn count_for_round(
        db: &DatabaseConnection,
        league_id: &str,
        round_id: &str,
    ) -> DbResult<u64> {
        Entity::find()
            .filter(Column::LeagueId.eq(league_id))
            .filter(Column::RoundId.eq(round_id))
            .count(db)
            .await
    }
}
