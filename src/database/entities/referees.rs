use super::AgentStatus;
use crate::database::DbResult;
use sea_orm::{entity::prelude::*, ActiveValue::Set, IntoActiveModel, QueryOrder};
use serde::Serialize;

/// Referee registration. The id is caller-provided and unique within the
/// league; the token is system-generated and globally unique.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "referees")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub referee_id: String,
    pub league_id: String,
    /// Redacted from every sink except the audit log handles it itself
    #[serde(skip)]
    pub auth_token: String,
    /// Base URL the manager dispatches assignments to
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
        referee_id: String,
        league_id: String,
        auth_token: String,
        endpoint: String,
    ) -> DbResult<Self> {
        ActiveModel {
            referee_id: Set(referee_id),
            league_id: Set(league_id),
            auth_token: Set(auth_token),
            endpoint: Set(endpoint),
            status: Set(AgentStatus::Registered),
            registered_at: Set(chrono::Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn by_id(db: &DatabaseConnection, referee_id: &str) -> DbResult<Option<Self>> {
        Entity::find_by_id(referee_id).one(db).await
    }

    pub async fn all(db: &DatabaseConnection) -> DbResult<Vec<Self>> {
        Entity::find()
            .order_by_asc(Column::RefereeId)
            .all(db)
            .await
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
