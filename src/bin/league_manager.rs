use league_fabric::{
    audit::AuditLog, config, database, logging, manager::LeagueManager, transport,
};
use log::error;
use std::{net::SocketAddr, sync::Arc};

#[tokio::main]
async fn main() {
    let config = match config::load_config() {
        Ok(value) => Arc::new(value),
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return;
        }
    };

    logging::setup(config.logging, "data/league-manager.log");

    let addr: SocketAddr = SocketAddr::new(config.host, config.port);

    let db = match database::connect(&config.database_file).await {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to open database: {err}");
            return;
        }
    };

    let audit = match AuditLog::open(&config.audit_file) {
        Ok(value) => Arc::new(value),
        Err(err) => {
            error!("Failed to open audit log: {err}");
            return;
        }
    };

    let manager = match LeagueManager::new(db, config, audit).await {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to initialize league manager: {err}");
            return;
        }
    };
    manager.start();

    transport::serve(addr, transport::router(manager)).await;
}
