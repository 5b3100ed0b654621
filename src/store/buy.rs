use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::{Profile, Role}, session::CurrentUser, AppResult, AppState, NexusError};

use super::catalog::{find, rank, Grant, StoreItem};

#[derive(Debug, Serialize)]
pub struct Receipt {
    pub item: &'static StoreItem,
    pub nexus_coins: i64,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub item_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub acquired_at: OffsetDateTime,
}

#[debug_handler(state = AppState)]
pub(crate) async fn buy(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(item_key): Path<String>,
) -> AppResult<Json<Receipt>> {
    Ok(Json(buy_item(&db_pool, &me, &item_key).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_inventory(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Vec<InventoryItem>>> {
    Ok(Json(inventory(&db_pool, me.id).await?))
}

pub async fn buy_item(db_pool: &SqlitePool, buyer: &Profile, item_key: &str) -> AppResult<Receipt> {
    let Some(item) = find(item_key) else {
        return Err(NexusError::NotFound("item"))?;
    };

    let mut db_tx = db_pool.begin().await?;

    let (role,): (Role,) = sqlx::query_as("SELECT role FROM profiles WHERE id=?")
        .bind(buyer.id)
        .fetch_one(&mut *db_tx)
        .await?;

    match item.grant {
        Grant::Role { role: granted } => {
            let upgrade = matches!((rank(role), rank(granted)), (Some(have), Some(want)) if want > have);
            if !upgrade {
                return Err(NexusError::Conflict("you already have that role or better"))?;
            }
            sqlx::query("UPDATE profiles SET role=? WHERE id=?")
                .bind(granted)
                .bind(buyer.id)
                .execute(&mut *db_tx)
                .await?;
        }
        Grant::Frame => {
            let granted = sqlx::query("INSERT OR IGNORE INTO inventory (user_id,item_key,acquired_at) VALUES (?,?,?)")
                .bind(buyer.id)
                .bind(item.key)
                .bind(OffsetDateTime::now_utc())
                .execute(&mut *db_tx)
                .await?;
            if granted.rows_affected() == 0 {
                return Err(NexusError::Conflict("you already own that frame"))?;
            }
        }
    }

    let debited = sqlx::query("UPDATE profiles SET nexus_coins=nexus_coins-? WHERE id=? AND nexus_coins>=?")
        .bind(item.price)
        .bind(buyer.id)
        .bind(item.price)
        .execute(&mut *db_tx)
        .await?;
    if debited.rows_affected() != 1 {
        return Err(NexusError::InsufficientCoins)?;
    }

    let (nexus_coins, role): (i64, Role) = sqlx::query_as("SELECT nexus_coins,role FROM profiles WHERE id=?")
        .bind(buyer.id)
        .fetch_one(&mut *db_tx)
        .await?;
    db_tx.commit().await?;

    tracing::info!(buyer = %buyer.id, item = item.key, price = item.price, "purchase");
    Ok(Receipt { item, nexus_coins, role })
}

pub async fn inventory(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<InventoryItem>> {
    Ok(
        sqlx::query_as("SELECT item_key,acquired_at FROM inventory WHERE user_id=? ORDER BY acquired_at")
            .bind(user_id)
            .fetch_all(db_pool)
            .await?
    )
}
