use axum::{
    debug_handler,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{db::Profile, session::CurrentUser, AppResult, AppState, NexusError};

use super::load_other;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

#[derive(Debug, Serialize)]
pub(crate) struct FriendEdge {
    friend_id: Uuid,
    status: FriendStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FriendSearch {
    search: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn request(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<Uuid>,
) -> AppResult<Json<FriendEdge>> {
    let status = send_request(&db_pool, &me, friend_id).await?;
    Ok(Json(FriendEdge { friend_id, status }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<Uuid>,
) -> AppResult<Json<FriendEdge>> {
    accept_request(&db_pool, &me, friend_id).await?;
    Ok(Json(FriendEdge { friend_id, status: FriendStatus::Accepted }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Query(FriendSearch { search }): Query<FriendSearch>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(list_friends(&db_pool, me.id, search.as_deref()).await?))
}

async fn edge(db_pool: &SqlitePool, user_id: Uuid, friend_id: Uuid) -> AppResult<Option<FriendStatus>> {
    let status: Option<(FriendStatus,)> = sqlx::query_as("SELECT status FROM friends WHERE user_id=? AND friend_id=?")
        .bind(user_id)
        .bind(friend_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(status.map(|(status,)| status))
}

async fn write_accepted(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> AppResult<()> {
    for (user_id, friend_id) in [(a, b), (b, a)] {
        sqlx::query(
            "INSERT INTO friends (user_id,friend_id,status) VALUES (?,?,'accepted') \
             ON CONFLICT (user_id,friend_id) DO UPDATE SET status='accepted'"
        )
        .bind(user_id)
        .bind(friend_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Files a pending request, or completes the friendship when the other side
/// already asked.
pub async fn send_request(db_pool: &SqlitePool, me: &Profile, friend_id: Uuid) -> AppResult<FriendStatus> {
    load_other(db_pool, me, friend_id).await?;

    if edge(db_pool, friend_id, me.id).await?.is_some() {
        let mut db_tx = db_pool.begin().await?;
        write_accepted(&mut *db_tx, me.id, friend_id).await?;
        db_tx.commit().await?;
        tracing::debug!(user = %me.id, %friend_id, "friend request crossed, now friends");
        return Ok(FriendStatus::Accepted);
    }

    sqlx::query("INSERT OR IGNORE INTO friends (user_id,friend_id,status) VALUES (?,?,'pending')")
        .bind(me.id)
        .bind(friend_id)
        .execute(db_pool)
        .await?;

    Ok(edge(db_pool, me.id, friend_id).await?.unwrap_or(FriendStatus::Pending))
}

pub async fn accept_request(db_pool: &SqlitePool, me: &Profile, friend_id: Uuid) -> AppResult<()> {
    if edge(db_pool, friend_id, me.id).await?.is_none() {
        return Err(NexusError::NotFound("friend request"))?;
    }

    let mut db_tx = db_pool.begin().await?;
    write_accepted(&mut *db_tx, me.id, friend_id).await?;
    db_tx.commit().await?;
    Ok(())
}

/// Accepted friends, optionally filtered by a case-insensitive handle fragment.
pub async fn list_friends(db_pool: &SqlitePool, user_id: Uuid, search: Option<&str>) -> AppResult<Vec<Profile>> {
    let pattern = match search.map(str::trim) {
        Some(search) if !search.is_empty() => format!("%{}%", search.to_lowercase()),
        _ => "%".to_owned(),
    };

    Ok(
        sqlx::query_as(&format!(
            "SELECT {} FROM profiles \
             WHERE id IN (SELECT friend_id FROM friends WHERE user_id=? AND status='accepted') \
             AND lower(custom_id) LIKE ? ORDER BY custom_id",
            Profile::columns()
        ))
        .bind(user_id)
        .bind(pattern)
        .fetch_all(db_pool)
        .await?
    )
}
