use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StandingsSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StandingsSnapshots::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StandingsSnapshots::SnapshotId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StandingsSnapshots::LeagueId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StandingsSnapshots::RoundId).string().null())
                    .col(
                        ColumnDef::new(StandingsSnapshots::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("idx-snapshot-id")
                    .table(StandingsSnapshots::Table)
                    .col(StandingsSnapshots::SnapshotId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlayerRankings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlayerRankings::SnapshotId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlayerRankings::PlayerId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlayerRankings::Rank).unsigned().not_null())
                    .col(
                        ColumnDef::new(PlayerRankings::Points)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlayerRankings::Wins).unsigned().not_null())
                    .col(ColumnDef::new(PlayerRankings::Draws).unsigned().not_null())
                    .col(ColumnDef::new(PlayerRankings::Losses).unsigned().not_null())
                    .col(
                        ColumnDef::new(PlayerRankings::MatchesPlayed)
                            .unsigned()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PlayerRankings::SnapshotId)
                            .col(PlayerRankings::PlayerId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlayerRankings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StandingsSnapshots::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum StandingsSnapshots {
    Table,
    Id,
    SnapshotId,
    LeagueId,
    RoundId,
    ComputedAt,
}

#[derive(Iden)]
pub enum PlayerRankings {
    Table,
    SnapshotId,
    PlayerId,
    Rank,
    Points,
    Wins,
    Draws,
    Losses,
    MatchesPlayed,
}
