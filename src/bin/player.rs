use league_fabric::{
    audit::AuditLog,
    config, logging,
    player::{FixedNumberStrategy, PlayerService},
    transport,
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

    logging::setup(config.logging, "data/player.log");

    if config.agent_id.is_empty() {
        error!("Config must set agent_id for the player role");
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

    // Strategy selection is a config concern; the fixed-number strategy
    // keeps local leagues deterministic
    let strategy = Box::new(FixedNumberStrategy { number: 4 });
    let player = PlayerService::new(config, audit, strategy);

    {
        let player = player.clone();
        tokio::spawn(async move {
            if let Err(err) = player.register().await {
                error!("Registration with the league manager failed: {err}");
            }
        });
    }

    transport::serve(addr, transport::router(player)).await;
}
