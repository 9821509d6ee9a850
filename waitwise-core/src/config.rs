use std::{env, fmt::Display, str::FromStr};

use log::{info, warn};

/// Runtime configuration of a WaitWise instance
#[derive(Debug, Clone)]
pub struct Config {
    /// The port the HTTP server listens on
    pub port: u16,
    /// Postgres connection string, the in-memory store is used if this is missing
    pub database_url: Option<String>,
    /// Refuse new tokens while a department is paused
    pub reject_joins_when_paused: bool,
    pub session_duration_in_days: i64,
    /// Minutes per token for departments created without one
    pub default_avg_wait_per_token: u32,
    /// Radius used for nearby office searches without an explicit radius
    pub nearby_radius_in_km: f64,
}

impl Config {
    /// Loads the configuration from `WAITWISE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: try_load("WAITWISE_SERVER_PORT", defaults.port),
            database_url: env::var("WAITWISE_DATABASE_URL").ok(),
            reject_joins_when_paused: try_load(
                "WAITWISE_REJECT_PAUSED_JOINS",
                defaults.reject_joins_when_paused,
            ),
            session_duration_in_days: try_load(
                "WAITWISE_SESSION_DAYS",
                defaults.session_duration_in_days,
            ),
            default_avg_wait_per_token: try_load(
                "WAITWISE_DEFAULT_AVG_WAIT",
                defaults.default_avg_wait_per_token,
            ),
            nearby_radius_in_km: try_load("WAITWISE_NEARBY_RADIUS_KM", defaults.nearby_radius_in_km),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            // Pausing is advisory unless explicitly enforced
            reject_joins_when_paused: false,
            session_duration_in_days: 7,
            default_avg_wait_per_token: 10,
            nearby_radius_in_km: 50.,
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
        Ok(value) => value.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {value:?}: {e}, using default: {default}");
            default
        }),
    }
}
