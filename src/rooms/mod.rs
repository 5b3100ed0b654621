mod msg;
pub(crate) mod new;
mod room;
pub(crate) mod seats;
mod ws;
pub mod xp;

use axum::{routing::{get, post}, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::{Profile, Role}, AppResult, AppState, NexusError};

pub use msg::RoomMessage;
pub(crate) use seats::vacate_everywhere;
pub(crate) use ws::describe;

/// Every room has exactly this many seats, indexed from zero.
pub const SEAT_COUNT: i64 = 8;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(room::lobby).post(new::new_room))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/messages", get(msg::messages).post(msg::post_message))
        .route("/{room_id}/stand", post(seats::post_stand))
        .route("/{room_id}/seats/{seat}/sit", post(seats::post_sit))
        .route("/{room_id}/seats/{seat}/lock", post(seats::post_lock))
        .route("/{room_id}/seats/{seat}/mute", post(seats::post_mute))
        .route("/{room_id}/ws", get(ws::room_ws))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Room {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Seat {
    pub seat_index: i64,
    pub user_id: Option<Uuid>,
    pub custom_id: Option<String>,
    pub level: Option<i64>,
    pub is_muted: bool,
    pub is_locked: bool,
}

pub(crate) async fn load_room(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<Room> {
    sqlx::query_as("SELECT id,owner_id,title,created_at FROM rooms WHERE id=?")
        .bind(room_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| NexusError::NotFound("room").into())
}

pub(crate) async fn load_seats(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<Vec<Seat>> {
    Ok(
        sqlx::query_as(
            "SELECT s.seat_index,s.user_id,p.custom_id,p.level,s.is_muted,s.is_locked \
             FROM room_seats s LEFT JOIN profiles p ON p.id=s.user_id \
             WHERE s.room_id=? ORDER BY s.seat_index"
        )
        .bind(room_id)
        .fetch_all(db_pool)
        .await?
    )
}

/// Owners and admins run the room.
pub(crate) fn ensure_moderator(room: &Room, profile: &Profile) -> AppResult<()> {
    if room.owner_id != profile.id && profile.role != Role::Admin {
        return Err(NexusError::Forbidden("only the room owner can do that"))?;
    }
    Ok(())
}
