use serde::{Deserialize, Serialize};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("schema.sql"))
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&db_pool).await.unwrap();
    db_pool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    Vip,
    Aristocracy,
}

impl Role {
    /// Roles that chat without the direct-message limit.
    pub fn is_privileged(self) -> bool {
        !matches!(self, Role::User)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    #[serde(skip)]
    pub auth_id: String,
    pub custom_id: String,
    pub bio: Option<String>,
    pub personality: Option<String>,
    pub level: i64,
    pub xp: i64,
    pub nexus_coins: i64,
    pub role: Role,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const PROFILE_COLUMNS: &str =
    "id,auth_id,custom_id,bio,personality,level,xp,nexus_coins,role,is_verified,created_at";

impl Profile {
    pub async fn by_id(db_pool: &SqlitePool, id: Uuid) -> AppResult<Option<Profile>> {
        Ok(
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
                .bind(id)
                .fetch_optional(db_pool)
                .await?
        )
    }

    pub async fn by_auth_id(db_pool: &SqlitePool, auth_id: &str) -> AppResult<Option<Profile>> {
        Ok(
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE auth_id=?"))
                .bind(auth_id)
                .fetch_optional(db_pool)
                .await?
        )
    }

    pub fn columns() -> &'static str {
        PROFILE_COLUMNS
    }
}

/// Every ban is keyed on the profile id in text form.
pub async fn is_banned(db_pool: &SqlitePool, profile_id: Uuid) -> AppResult<bool> {
    Ok(
        sqlx::query("SELECT 1 FROM blacklist_network WHERE type='user_ban' AND network_value=?")
            .bind(profile_id.to_string())
            .fetch_optional(db_pool)
            .await?
            .is_some()
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) async fn profile(db_pool: &SqlitePool, custom_id: &str) -> Profile {
        profile_with(db_pool, custom_id, Role::User, 500).await
    }

    pub(crate) async fn profile_with(db_pool: &SqlitePool, custom_id: &str, role: Role, coins: i64) -> Profile {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO profiles (id,auth_id,custom_id,nexus_coins,role,created_at) VALUES (?,?,?,?,?,?)")
            .bind(id)
            .bind(format!("auth-{custom_id}"))
            .bind(custom_id)
            .bind(coins)
            .bind(role)
            .bind(OffsetDateTime::now_utc())
            .execute(db_pool)
            .await
            .unwrap();
        Profile::by_id(db_pool, id).await.unwrap().unwrap()
    }
}
