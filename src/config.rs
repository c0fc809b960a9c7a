use std::{fmt::Display, net::SocketAddr, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

pub const DEFAULT_ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub admin_password: Option<String>,
    pub session_idle_minutes: i64,
    pub cookie_secure: bool,
    pub outbound_buffer: usize,
    pub anonymous_name: String,
    /// Only honor `X-Forwarded-For` when a trusted proxy sets it.
    pub trust_forwarded_for: bool,
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        if dotenv::dotenv().is_err() {
            info!("no .env file found, using process environment only");
        }

        let admin_password = dotenv::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty());
        if admin_password.is_none() {
            warn!("ADMIN_PASSWORD not set, admin actions are disabled");
        }

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://askroom.db?mode=rwc")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "16")?,
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8080")?,
            admin_password,
            session_idle_minutes: try_load("SESSION_IDLE_MINUTES", "5")?,
            cookie_secure: try_load("COOKIE_SECURE", "false")?,
            outbound_buffer: try_load::<usize>("OUTBOUND_BUFFER", "64")?.max(1),
            anonymous_name: try_load("ANONYMOUS_NAME", DEFAULT_ANONYMOUS_NAME)?,
            trust_forwarded_for: try_load("TRUST_FORWARDED_FOR", "false")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            database_max_connections: 1,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_password: None,
            session_idle_minutes: 5,
            cookie_secure: false,
            outbound_buffer: 64,
            anonymous_name: DEFAULT_ANONYMOUS_NAME.to_owned(),
            trust_forwarded_for: false,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = dotenv::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value {raw:?}"))
}
