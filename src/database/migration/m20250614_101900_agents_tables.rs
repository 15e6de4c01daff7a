use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Referees::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Referees::RefereeId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Referees::LeagueId).string().not_null())
                    .col(ColumnDef::new(Referees::AuthToken).string().not_null())
                    .col(ColumnDef::new(Referees::Endpoint).string().not_null())
                    .col(ColumnDef::new(Referees::Status).tiny_unsigned().not_null())
                    .col(
                        ColumnDef::new(Referees::RegisteredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Tokens are globally unique across all agents
        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("idx-referee-token")
                    .table(Referees::Table)
                    .col(Referees::AuthToken)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Players::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Players::PlayerId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Players::LeagueId).string().not_null())
                    .col(ColumnDef::new(Players::AuthToken).string().not_null())
                    .col(ColumnDef::new(Players::Endpoint).string().not_null())
                    .col(ColumnDef::new(Players::Status).tiny_unsigned().not_null())
                    .col(
                        ColumnDef::new(Players::RegisteredAt)
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
                    .name("idx-player-token")
                    .table(Players::Table)
                    .col(Players::AuthToken)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Referees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Players::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Referees {
    Table,
    RefereeId,
    LeagueId,
    AuthToken,
    Endpoint,
    Status,
    RegisteredAt,
}

#[derive(Iden)]
pub enum Players {
    Table,
    PlayerId,
    LeagueId,
    AuthToken,
    Endpoint,
    Status,
    RegisteredAt,
}
