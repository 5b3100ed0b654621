pub mod admin;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod dm;
pub mod profiles;
pub mod realtime;
pub mod rooms;
pub mod session;
pub mod social;
pub mod store;
pub mod tasks;

use axum::{extract::FromRef, Router};
use serde_json::Value;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult, NexusError};
pub use config::{Config, Rules};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub tx: realtime::Hub,
    pub rules: Rules,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(session::router())
        .nest("/rooms", rooms::router())
        .nest("/dm", dm::router())
        .nest("/p", profiles::router())
        .nest("/social", social::router())
        .nest("/store", store::router())
        .nest("/tasks", tasks::router())
        .nest("/admin", admin::router())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))?
        )
    }
}

/// Trims user text and rejects it when empty or longer than `max` chars.
pub(crate) fn clean_text(raw: &str, max: usize, what: &'static str) -> AppResult<String> {
    let text = raw.trim();
    if text.is_empty() || text.chars().count() > max {
        return Err(NexusError::Invalid(what))?;
    }
    Ok(text.to_owned())
}
