use crate::{database::DbResult, protocol::messages::OutcomeKind};
use sea_orm::{entity::prelude::*, ActiveValue::Set, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable outcome of one match. The UNIQUE index on `match_id` is the
/// authoritative exactly-once gate; a retried report trips the constraint
/// and is answered with the stored row instead of a second insert.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "match_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub result_id: String,
    pub match_id: String,
    pub outcome: OutcomeMap,
    pub points: PointsMap,
    pub game_metadata: GameMetadata,
    pub reported_at: DateTimeUtc,
}

/// Per-player outcome covering exactly the match's two players
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct OutcomeMap(pub BTreeMap<String, OutcomeKind>);

/// Per-player points per the scoring rules
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct PointsMap(pub BTreeMap<String, i64>);

/// Opaque game-specific report detail, stored without inspection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct GameMetadata(pub serde_json::Value);

impl Default for GameMetadata {
    fn default() -> Self {
        Self(serde_json::Value::Null)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        result_id: String,
        match_id: String,
        outcome: OutcomeMap,
        points: PointsMap,
        game_metadata: GameMetadata,
    ) -> DbResult<Self> {
        ActiveModel {
            result_id: Set(result_id),
            match_id: Set(match_id),
            outcome: Set(outcome),
            points: Set(points),
            game_metadata: Set(game_metadata),
            reported_at: Set(chrono::Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn by_match_id(db: &DatabaseConnection, match_id: &str) -> DbResult<Option<Self>> {
        Entity::find()
            .filter(Column::MatchId.eq(match_id))
            .one(db)
            .await
    }

    pub async fn all(db: &DatabaseConnection) -> DbResult<Vec<Self>> {
        Entity::find().all(db).await
    }

    pub async fn count(db: &DatabaseConnection) -> DbResult<u64> {
        Entity::find().count(db).await
    }
}
