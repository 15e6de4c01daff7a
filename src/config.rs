use crate::utils::types::Port;
use log::LevelFilter;
use serde::Deserialize;
use std::{collections::HashMap, env, fs::read_to_string, net::IpAddr, path::Path};
use thiserror::Error;

/// The server version extracted from the Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable key to load the config from
const CONFIG_ENV_KEY: &str = "LEAGUE_CONFIG_JSON";

/// Default config file path
const CONFIG_FILE: &str = "config.json";

/// Loads the process configuration from the `LEAGUE_CONFIG_JSON` environment
/// variable or from `config.json` on disk. A missing source falls back to
/// the defaults; a source that is present but invalid is an error so bad
/// scoring tables never make it into a running league.
pub fn load_config() -> Result<Config, ConfigError> {
    let config: Config = if let Ok(env) = env::var(CONFIG_ENV_KEY) {
        serde_json::from_str(&env)?
    } else {
        let file = Path::new(CONFIG_FILE);
        if !file.exists() {
            return Ok(Config::default());
        }
        let data = read_to_string(file).map_err(ConfigError::Read)?;
        serde_json::from_str(&data)?
    };

    config.validate()?;
    Ok(config)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scoring table for {game_type} contains a negative {field} value")]
    NegativeScore {
        game_type: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: IpAddr,
    pub port: Port,
    /// Identity this process registers under (referee and player roles)
    pub agent_id: String,
    /// Base URL of the league manager (referee and player roles)
    pub manager_endpoint: String,
    /// Base URL other processes should use to reach this process. Derived
    /// from host/port when absent.
    pub endpoint: Option<String>,
    /// Game type played by every match in the league
    pub game_type: String,
    pub database_file: String,
    pub audit_file: String,
    pub logging: LevelFilter,
    pub registration: RegistrationConfig,
    pub scheduling: SchedulingConfig,
    pub timeouts: TimeoutsConfig,
    pub retries: RetriesConfig,
    /// Per game type scoring overrides
    pub scoring: HashMap<String, ScoringConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8760,
            agent_id: String::new(),
            manager_endpoint: "http://127.0.0.1:8760".to_string(),
            endpoint: None,
            game_type: "sum_duel".to_string(),
            database_file: "data/league.db".to_string(),
            audit_file: "data/audit.log".to_string(),
            logging: LevelFilter::Info,
            registration: Default::default(),
            scheduling: Default::default(),
            timeouts: Default::default(),
            retries: Default::default(),
            scoring: Default::default(),
        }
    }
}

impl Config {
    /// The URL peers should POST to for this process
    pub fn self_endpoint(&self) -> String {
        match &self.endpoint {
            Some(value) => value.clone(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Scoring table for a game type, defaulting to win 3 / draw 1 / loss 0
    pub fn scoring_for(&self, game_type: &str) -> ScoringConfig {
        self.scoring
            .get(game_type)
            .copied()
            .unwrap_or_default()
    }

    /// Rejects configs whose scoring tables violate the non-negative
    /// integer constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (game_type, table) in &self.scoring {
            let fields = [
                ("win", table.win),
                ("draw", table.draw),
                ("loss", table.loss),
            ];
            for (field, value) in fields {
                if value < 0 {
                    return Err(ConfigError::NegativeScore {
                        game_type: game_type.clone(),
                        field,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Seconds after league creation during which registration stays open.
    /// Zero disables the window and leaves closing to the admin signal.
    pub window_seconds: u64,
    pub min_players: usize,
    pub min_referees: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            window_seconds: 0,
            min_players: 2,
            min_referees: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Allow several matches of the same round to run at once. Rounds are
    /// never interleaved regardless of this flag.
    pub concurrent_matches_per_round: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub registration_response_ms: u64,
    pub match_join_ack_ms: u64,
    pub move_response_ms: u64,
    pub result_report_ms: u64,
    /// How long the manager waits for an assigned match to produce a
    /// result before reaping it as FAILED
    pub match_deadline_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            registration_response_ms: 5000,
            match_join_ack_ms: 5000,
            move_response_ms: 3000,
            result_report_ms: 5000,
            match_deadline_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetriesConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

/// Points awarded per outcome for one game type
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub win: i64,
    pub draw: i64,
    pub loss: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            win: 3,
            draw: 1,
            loss: 0,
        }
    }
}
