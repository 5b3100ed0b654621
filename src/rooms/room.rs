use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{session::CurrentUser, AppResult, AppState, Rules};

use super::{load_room, load_seats, msg::{recent_messages, RoomMessage}, Room, Seat};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub(crate) struct LobbyRoom {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    occupied: i64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lobby(
    State(db_pool): State<SqlitePool>,
    _: CurrentUser,
) -> AppResult<Json<Vec<LobbyRoom>>> {
    Ok(Json(list_rooms(&db_pool).await?))
}

pub(crate) async fn list_rooms(db_pool: &SqlitePool) -> AppResult<Vec<LobbyRoom>> {
    Ok(
        sqlx::query_as(
            "SELECT r.id,r.owner_id,r.title,r.created_at, \
             (SELECT COUNT(*) FROM room_seats s WHERE s.room_id=r.id AND s.user_id IS NOT NULL) AS occupied \
             FROM rooms r ORDER BY r.created_at DESC"
        )
        .fetch_all(db_pool)
        .await?
    )
}

#[derive(Debug, Serialize)]
pub(crate) struct RoomView {
    room: Room,
    seats: Vec<Seat>,
    messages: Vec<RoomMessage>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    State(rules): State<Rules>,
    _: CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<RoomView>> {
    let room = load_room(&db_pool, room_id).await?;
    let seats = load_seats(&db_pool, room_id).await?;
    let messages = recent_messages(&db_pool, room_id, rules.room_history).await?;

    Ok(Json(RoomView { room, seats, messages }))
}
