use sea_orm_migration::prelude::*;

use super::m20250614_101500_leagues_table::Leagues;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rounds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Rounds::RoundId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Rounds::LeagueId).string().not_null())
                    .col(ColumnDef::new(Rounds::RoundNumber).unsigned().not_null())
                    .col(ColumnDef::new(Rounds::Status).tiny_unsigned().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Rounds::Table, Rounds::LeagueId)
                            .to(Leagues::Table, Leagues::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Round numbers are dense per league, so the pair is unique
        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("idx-league-round-number")
                    .table(Rounds::Table)
                    .col(Rounds::LeagueId)
                    .col(Rounds::RoundNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Matches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Matches::MatchId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Matches::RoundId).string().not_null())
                    .col(ColumnDef::new(Matches::RefereeId).string().null())
                    .col(ColumnDef::new(Matches::GameType).string().not_null())
                    .col(ColumnDef::new(Matches::PlayerHome).string().not_null())
                    .col(ColumnDef::new(Matches::PlayerAway).string().not_null())
                    .col(ColumnDef::new(Matches::Status).tiny_unsigned().not_null())
                    .col(
                        ColumnDef::new(Matches::AssignedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Matches::Table, Matches::RoundId)
                            .to(Rounds::Table, Rounds::RoundId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-match-round")
                    .table(Matches::Table)
                    .col(Matches::RoundId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Matches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rounds::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Rounds {
    Table,
    RoundId,
    LeagueId,
    RoundNumber,
    Status,
}

#[derive(Iden)]
pub enum Matches {
    Table,
    MatchId,
    RoundId,
    RefereeId,
    GameType,
    PlayerHome,
    PlayerAway,
    Status,
    AssignedAt,
}
