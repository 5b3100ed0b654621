use std::{str::FromStr, time::Duration};

use anyhow::Context;

/// Runtime settings, read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub client_secrets: String,
    pub session_idle_minutes: i64,
    pub xp_tick: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Ok(Config {
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080".to_owned())?,
            public_url: var_or("PUBLIC_URL", "http://localhost:8080".to_owned())?,
            client_secrets: var_or("CLIENT_SECRETS", "client_secret.json".to_owned())?,
            session_idle_minutes: var_or("SESSION_IDLE_MINUTES", 60)?,
            xp_tick: Duration::from_secs(var_or::<u64>("XP_TICK_SECS", 60)?.max(1)),
        })
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

/// Gameplay constants shared by the room, chat and store handlers.
#[derive(Debug, Clone, Copy)]
pub struct Rules {
    pub xp_tick: Duration,
    pub xp_per_tick: i64,
    /// A profile levels up once `xp >= level * level_threshold`.
    pub level_threshold: i64,
    pub level_up_bonus: i64,
    pub starting_coins: i64,
    /// Messages a sender may send before a mutual relationship is needed.
    pub free_messages: i64,
    pub room_history: i64,
    pub room_title_max: usize,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            xp_tick: Duration::from_secs(60),
            xp_per_tick: 15,
            level_threshold: 100,
            level_up_bonus: 500,
            starting_coins: 500,
            free_messages: 3,
            room_history: 50,
            room_title_max: 40,
        }
    }
}

impl Rules {
    pub fn from_config(config: &Config) -> Rules {
        Rules {
            xp_tick: config.xp_tick,
            ..Rules::default()
        }
    }
}
