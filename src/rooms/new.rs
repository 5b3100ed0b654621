use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{clean_text, db::{Profile, Role}, session::CurrentUser, AppResult, AppState, NexusError, Rules};

use super::{load_room, Room, SEAT_COUNT};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomForm {
    title: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    State(rules): State<Rules>,
    CurrentUser(me): CurrentUser,
    Json(NewRoomForm { title }): Json<NewRoomForm>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let title = clean_text(&title, rules.room_title_max, "room title must be 1 to 40 characters")?;
    let room = create_room(&db_pool, &me, &title).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Creates the room and its empty seat grid together.
pub(crate) async fn create_room(db_pool: &SqlitePool, owner: &Profile, title: &str) -> AppResult<Room> {
    let mut tx = db_pool.begin().await?;

    if owner.role != Role::Admin {
        let owned = sqlx::query("SELECT 1 FROM rooms WHERE owner_id=?")
            .bind(owner.id)
            .fetch_optional(&mut *tx)
            .await?;
        if owned.is_some() {
            return Err(NexusError::AlreadyOwnsRoom)?;
        }
    }

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO rooms (id,owner_id,title,created_at) VALUES (?,?,?,?)")
        .bind(id)
        .bind(owner.id)
        .bind(title)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await?;

    for seat_index in 0..SEAT_COUNT {
        sqlx::query("INSERT INTO room_seats (room_id,seat_index) VALUES (?,?)")
            .bind(id)
            .bind(seat_index)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(room_id = %id, owner = %owner.custom_id, title, "room created");

    load_room(db_pool, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::{fixtures, memory_pool}, rooms::load_seats};

    #[tokio::test]
    async fn rooms_start_with_eight_free_seats() {
        let db_pool = memory_pool().await;
        let owner = fixtures::profile(&db_pool, "owner").await;

        let room = create_room(&db_pool, &owner, "Late night talk").await.unwrap();
        assert_eq!(room.owner_id, owner.id);

        let seats = load_seats(&db_pool, room.id).await.unwrap();
        assert_eq!(seats.len(), SEAT_COUNT as usize);
        assert!(seats.iter().enumerate().all(|(i, s)| s.seat_index == i as i64));
        assert!(seats.iter().all(|s| s.user_id.is_none() && !s.is_locked && !s.is_muted));
    }

    #[tokio::test]
    async fn users_own_one_room_admins_any() {
        let db_pool = memory_pool().await;
        let user = fixtures::profile(&db_pool, "user").await;
        let admin = fixtures::profile_with(&db_pool, "admin", Role::Admin, 0).await;

        create_room(&db_pool, &user, "first").await.unwrap();
        let err = create_room(&db_pool, &user, "second").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::AlreadyOwnsRoom)));

        create_room(&db_pool, &admin, "one").await.unwrap();
        create_room(&db_pool, &admin, "two").await.unwrap();
    }
}
