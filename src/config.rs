use std::net::SocketAddr;
use std::path::PathBuf;

use crate::engine::EngineSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    /// JSON badge catalog; the built-in catalog is used when unset.
    pub badge_catalog_path: Option<PathBuf>,
    pub engine: EngineSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    default: T,
    hint: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(var, hint)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Required: `DATABASE_URL`.
    /// Optional: `PORT` (8082), `BADGE_CATALOG_PATH`,
    /// `LEADERBOARD_WINDOW_RADIUS` (2), `LEADERBOARD_MAX_LIMIT` (100).
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let port: u16 = parse_or("PORT", 8082, "must be a valid port number")?;

        let defaults = EngineSettings::default();
        let leaderboard_window_radius = parse_or(
            "LEADERBOARD_WINDOW_RADIUS",
            defaults.leaderboard_window_radius,
            "must be a non-negative integer",
        )?;
        let leaderboard_max_limit: usize = parse_or(
            "LEADERBOARD_MAX_LIMIT",
            defaults.leaderboard_max_limit,
            "must be a positive integer",
        )?;
        if leaderboard_max_limit == 0 {
            return Err(ConfigError::Invalid(
                "LEADERBOARD_MAX_LIMIT",
                "must be a positive integer",
            ));
        }

        let badge_catalog_path = std::env::var("BADGE_CATALOG_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            badge_catalog_path,
            engine: EngineSettings {
                leaderboard_window_radius,
                leaderboard_max_limit,
            },
        })
    }
}
