use league_fabric::{
    audit::AuditLog, config, games::GameRegistry, logging, referee::RefereeService, transport,
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

    logging::setup(config.logging, "data/referee.log");

    if config.agent_id.is_empty() {
        error!("Config must set agent_id for the referee role");
        return;
    }

    let addr: SocketAddr = SocketAddr::new(config.host, config.port);

    let audit = match AuditLog::open(&config.audit_file) {
        Ok(value) => Arc::new(value),
        Err(err) => {
            error!("Failed to open audit log: {err}");
            return;
        }
    };

    let referee = RefereeService::new(config, audit, GameRegistry::with_builtins());
    referee.start();

    // Register in the background so the mailbox is already listening when
    // the manager answers
    {
        let referee = referee.clone();
        tokio::spawn(async move {
            if let Err(err) = referee.register().await {
                error!("Registration with the league manager failed: {err}");
            }
        });
    }

    transport::serve(addr, transport::router(referee)).await;
}
