use sea_orm_migration::prelude::*;

use super::m20250614_102300_schedule_tables::Matches;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MatchResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MatchResults::ResultId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MatchResults::MatchId).string().not_null())
                    .col(ColumnDef::new(MatchResults::Outcome).json().not_null())
                    .col(ColumnDef::new(MatchResults::Points).json().not_null())
                    .col(
                        ColumnDef::new(MatchResults::GameMetadata)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MatchResults::ReportedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(MatchResults::Table, MatchResults::MatchId)
                            .to(Matches::Table, Matches::MatchId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Exactly-once gate: at most one result per match, enforced by the
        // store rather than handler bookkeeping
        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("idx-result-match")
                    .table(MatchResults::Table)
                    .col(MatchResults::MatchId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MatchResults::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum MatchResults {
    Table,
    ResultId,
    MatchId,
    Outcome,
    Points,
    GameMetadata,
    ReportedAt,
}
