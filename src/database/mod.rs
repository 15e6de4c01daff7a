use self::migration::Migrator;
use log::info;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use std::io;
use std::path::Path;
use tokio::fs::{create_dir_all, File};

pub mod entities;
pub mod migration;

pub type DbResult<T> = Result<T, sea_orm::DbErr>;

/// Connects to the sqlite database at the provided file path, creating the
/// file and running migrations when needed
pub async fn connect(db_file: &str) -> io::Result<DatabaseConnection> {
    info!("Connecting to database..");

    let file_path = Path::new(db_file);
    if let Some(parent) = file_path.parent() {
        if !parent.exists() {
            create_dir_all(parent).await?;
        }
    }

    if !file_path.exists() {
        File::create(file_path).await?;
    }

    let con_str = format!("sqlite:{db_file}");
    let connection = sea_orm::Database::connect(&con_str).await.map_err(|err| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("Unable to create database connection: {err:?}"),
        )
    })?;

    info!("Connected to database: {con_str}");
    info!("Running migrations...");

    Migrator::up(&connection, None).await.map_err(|err| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("Unable to run database migrations: {err:?}"),
        )
    })?;

    info!("Migrations complete.");

    Ok(connection)
}

/// In-memory database used by tests
pub async fn connect_memory() -> DbResult<DatabaseConnection> {
    let connection = sea_orm::Database::connect("sqlite::memory:").await?;
    Migrator::up(&connection, None).await?;
    Ok(connection)
}
