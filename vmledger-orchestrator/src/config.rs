use anyhow::{anyhow, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub database_url: String,
    /// Command listener is disabled when unset.
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    pub http_port: u16,
    /// `None` disables the periodic port mapping sync.
    pub port_sync_interval: Option<Duration>,
    pub port_sync_on_startup: bool,
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v.parse().context("DB_MAX_CONNECTIONS must be a positive integer")?,
            None => 5,
        };
        let http_port = match get("HTTP_PORT") {
            Some(v) => v.parse().context("HTTP_PORT must be a valid port")?,
            None => 8001,
        };
        let interval_secs: u64 = match get("PORT_SYNC_INTERVAL_SECS") {
            Some(v) => v
                .parse()
                .context("PORT_SYNC_INTERVAL_SECS must be a number of seconds")?,
            None => 300,
        };
        let port_sync_on_startup = match get("PORT_SYNC_ON_STARTUP") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| anyhow!("PORT_SYNC_ON_STARTUP must be true or false, got '{}'", v))?,
            None => true,
        };

        Ok(Self {
            database_url,
            redis_url: get("REDIS_URL"),
            db_max_connections,
            http_port,
            port_sync_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            port_sync_on_startup,
        })
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
