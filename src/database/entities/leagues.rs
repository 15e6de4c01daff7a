use crate::database::DbResult;
use sea_orm::{
    entity::prelude::*,
    ActiveValue::Set,
    FromJsonQueryResult, IntoActiveModel,
};
use serde::{Deserialize, Serialize};

/// League row. Exactly one league exists per manager process; it is
/// created at startup and its status only ever moves forward.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "leagues")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub status: LeagueStatus,
    pub created_at: DateTimeUtc,
    pub config: LeagueSettings,
}

/// Opaque league configuration captured at creation time
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct LeagueSettings {
    pub game_type: String,
    /// Seconds the registration window stays open; zero means admin-only
    pub registration_window_seconds: u64,
}

#[derive(
    Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "u8", db_type = "TinyUnsigned")]
#[repr(u8)]
pub enum LeagueStatus {
    #[sea_orm(num_value = 0)]
    Init = 0,
    #[sea_orm(num_value = 1)]
    Registration = 1,
    #[sea_orm(num_value = 2)]
    Scheduling = 2,
    #[sea_orm(num_value = 3)]
    Active = 3,
    #[sea_orm(num_value = 4)]
    Completed = 4,
}

impl LeagueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Registration => "REGISTRATION",
            Self::Scheduling => "SCHEDULING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether moving to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: LeagueStatus) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Registration)
                | (Self::Registration, Self::Scheduling)
                | (Self::Scheduling, Self::Active)
                | (Self::Scheduling, Self::Completed)
                | (Self::Active, Self::Completed)
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        id: String,
        status: LeagueStatus,
        config: LeagueSettings,
    ) -> DbResult<Self> {
        ActiveModel {
            id: Set(id),
            status: Set(status),
            created_at: Set(chrono::Utc::now()),
            config: Set(config),
        }
        .insert(db)
        .await
    }

    /// The league this process coordinates, if one was already created
    pub async fn current(db: &DatabaseConnection) -> DbResult<Option<Self>> {
        Entity::find().one(db).await
    }

    pub async fn set_status<C: ConnectionTrait>(
        self,
        db: &C,
        status: LeagueStatus,
    ) -> DbResult<Self> {
        let mut model = self.into_active_model();
        model.status = Set(status);
        model.update(db).await
    }
}

#[cfg(test)]
mod test {
    use super::LeagueStatus;

    #[test]
    fn test_transitions_are_forward_only() {
        use LeagueStatus::*;
        assert!(Init.can_transition_to(Registration));
        assert!(Registration.can_transition_to(Scheduling));
        assert!(Scheduling.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        // An empty schedule may finish the league straight away
        assert!(Scheduling.can_transition_to(Completed));

        assert!(!Registration.can_transition_to(Init));
        assert!(!Active.can_transition_to(Registration));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Init.can_transition_to(Active));
    }
}
