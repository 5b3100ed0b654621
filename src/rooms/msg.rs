use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{clean_text, db::Profile, realtime::{self, Change, Hub}, session::CurrentUser, AppResult, AppState, Rules};

use super::load_room;

pub(crate) const MESSAGE_MAX: usize = 1000;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoomMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub custom_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageForm {
    pub(crate) content: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    State(rules): State<Rules>,
    _: CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<RoomMessage>>> {
    load_room(&db_pool, room_id).await?;
    Ok(Json(recent_messages(&db_pool, room_id, rules.room_history).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    CurrentUser(me): CurrentUser,
    Path(room_id): Path<Uuid>,
    Json(SendMessageForm { content }): Json<SendMessageForm>,
) -> AppResult<(StatusCode, Json<RoomMessage>)> {
    let message = send_msg(&db_pool, &tx, room_id, &me, &content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub(crate) async fn send_msg(
    db_pool: &SqlitePool,
    tx: &Hub,
    room_id: Uuid,
    author: &Profile,
    content: &str,
) -> AppResult<RoomMessage> {
    let content = clean_text(content, MESSAGE_MAX, "message must be 1 to 1000 characters")?;
    load_room(db_pool, room_id).await?;

    let message = RoomMessage {
        id: Uuid::now_v7(),
        room_id,
        user_id: author.id,
        custom_id: author.custom_id.clone(),
        content,
        created_at: OffsetDateTime::now_utc(),
    };
    sqlx::query("INSERT INTO room_messages (id,room_id,user_id,content,created_at) VALUES (?,?,?,?,?)")
        .bind(message.id)
        .bind(room_id)
        .bind(author.id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(db_pool)
        .await?;

    realtime::publish(tx, Change::RoomMessage {
        id: message.id,
        room_id,
        user_id: message.user_id,
        custom_id: message.custom_id.clone(),
        content: message.content.clone(),
        created_at: message.created_at,
    });

    Ok(message)
}

/// The newest `limit` messages, oldest first.
pub(crate) async fn recent_messages(db_pool: &SqlitePool, room_id: Uuid, limit: i64) -> AppResult<Vec<RoomMessage>> {
    Ok(
        sqlx::query_as(
            "SELECT * FROM ( \
                SELECT m.id,m.room_id,m.user_id,p.custom_id,m.content,m.created_at,m.rowid AS seq \
                FROM room_messages m JOIN profiles p ON p.id=m.user_id \
                WHERE m.room_id=? ORDER BY m.rowid DESC LIMIT ? \
             ) ORDER BY seq"
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(db_pool)
        .await?
    )
}
