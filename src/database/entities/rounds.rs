use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, IntoActiveModel, QueryOrder};
use serde::{Deserialize, Serialize};

/// One concurrency group of matches. Round numbers are dense from 1 and a
/// player appears in at most one match per round.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rounds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub round_id: String,
    pub league_id: String,
    pub round_number: u32,
    pub status: RoundStatus,
}

#[derive(
    Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "u8", db_type = "TinyUnsigned")]
#[repr(u8)]
pub enum RoundStatus {
    #[sea_orm(num_value = 0)]
    Pending = 0,
    #[sea_orm(num_value = 1)]
    Active = 1,
    #[sea_orm(num_value = 2)]
    Completed = 2,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        round_id: String,
        league_id: String,
        round_number: u32,
    ) -> DbResult<Self> {
        ActiveModel {
            round_id: Set(round_id),
            league_id: Set(league_id),
            round_number: Set(round_number),
            status: Set(RoundStatus::Pending),
        }
        .insert(db)
        .await
    }

    pub async fn by_id(db: &DatabaseConnection, round_id: &str) -> DbResult<Option<Self>> {
        Entity::find_by_id(round_id).one(db).await
    }

    /// All rounds of the league in round number order
    pub async fn by_league(db: &DatabaseConnection, league_id: &str) -> DbResult<Vec<Self>> {
        Entity::find()
            .filter(Column::LeagueId.eq(league_id))
            .order_by_asc(Column::RoundNumber)
            .all(db)
            .await
    }

    pub async fn set_status<C: ConnectionTrait>(
        self,
        db: &C,
        status: RoundStatus,
    ) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.status = Set(status);
        model.update(db).await
    }
}
