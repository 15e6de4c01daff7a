use super::AgentStatus;
use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, IntoActiveModel, QueryOrder};
use serde::Serialize;

/// Player registration, same shape and invariants as a referee
/// registration. Players additionally may not register while the league
/// has no referees; that guard lives in the registration handler.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "players")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub player_id: String,
    pub league_id: String,
    #[serde(skip)]
    pub auth_token: String,
    /// Base URL referees send invitations and move requests to
    pub endpoint: String,
    pub status: AgentStatus,
    pub registered_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        player_id: String,
        league_id: String,
        auth_token: String,
        endpoint: String,
    ) -> DbResult<Self> {
        ActiveModel {
            player_id: Set(player_id),
            league_id: Set(league_id),
            auth_token: Set(auth_token),
            endpoint: Set(endpoint),
            status: Set(AgentStatus::Registered),
            registered_at: Set(chrono::Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn by_id(db: &DatabaseConnection, player_id: &str) -> DbResult<Option<Self>> {
        Entity::find_by_id(player_id).one(db).await
    }

    pub async fn all(db: &DatabaseConnection) -> DbResult<Vec<Self>> {
        Entity::find().order_by_asc(Column::PlayerId).all(db).await
    }

    pub async fn count(db: &DatabaseConnection) -> DbResult<u64> {
        Entity::find().count(db).await
    }

    pub async fn set_status(self, db: &DatabaseConnection, status: AgentStatus) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.status = Set(status);
        model.update(db).await
    }
}
