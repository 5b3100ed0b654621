use axum::{debug_handler, extract::{Path, State}, Json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::Profile, realtime::{self, Change, Hub}, session::CurrentUser, AppResult, AppState, NexusError};

use super::{ensure_moderator, load_room, load_seats, Seat};

#[debug_handler(state = AppState)]
pub(crate) async fn post_sit(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    CurrentUser(me): CurrentUser,
    Path((room_id, seat)): Path<(Uuid, i64)>,
) -> AppResult<Json<Vec<Seat>>> {
    Ok(Json(sit(&db_pool, &tx, room_id, me.id, seat).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_stand(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    CurrentUser(me): CurrentUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<Seat>>> {
    Ok(Json(stand(&db_pool, &tx, room_id, me.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_lock(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    CurrentUser(me): CurrentUser,
    Path((room_id, seat)): Path<(Uuid, i64)>,
) -> AppResult<Json<Vec<Seat>>> {
    Ok(Json(toggle_lock(&db_pool, &tx, room_id, &me, seat).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_mute(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    CurrentUser(me): CurrentUser,
    Path((room_id, seat)): Path<(Uuid, i64)>,
) -> AppResult<Json<Vec<Seat>>> {
    Ok(Json(toggle_mute(&db_pool, &tx, room_id, &me, seat).await?))
}

async fn publish_seats(db_pool: &SqlitePool, tx: &Hub, room_id: Uuid) -> AppResult<Vec<Seat>> {
    let seats = load_seats(db_pool, room_id).await?;
    realtime::publish(tx, Change::Seats { room_id, seats: seats.clone() });
    Ok(seats)
}

/// Moves `user_id` onto `seat_index`, leaving whatever seat they held in the
/// room. A user holds at most one seat per room and a seat at most one user.
pub(crate) async fn sit(
    db_pool: &SqlitePool,
    tx: &Hub,
    room_id: Uuid,
    user_id: Uuid,
    seat_index: i64,
) -> AppResult<Vec<Seat>> {
    load_room(db_pool, room_id).await?;

    let mut db_tx = db_pool.begin().await?;
    let Some((occupant, is_locked)): Option<(Option<Uuid>, bool)> =
        sqlx::query_as("SELECT user_id,is_locked FROM room_seats WHERE room_id=? AND seat_index=?")
            .bind(room_id)
            .bind(seat_index)
            .fetch_optional(&mut *db_tx)
            .await?
    else {
        return Err(NexusError::NotFound("seat"))?;
    };

    if is_locked {
        return Err(NexusError::SeatLocked)?;
    }
    match occupant {
        Some(occupant) if occupant == user_id => {
            db_tx.rollback().await?;
            return load_seats(db_pool, room_id).await;
        }
        Some(_) => return Err(NexusError::SeatTaken)?,
        None => {}
    }

    sqlx::query("UPDATE room_seats SET user_id=NULL,is_muted=0 WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *db_tx)
        .await?;

    let claimed = sqlx::query("UPDATE room_seats SET user_id=? WHERE room_id=? AND seat_index=? AND user_id IS NULL AND is_locked=0")
        .bind(user_id)
        .bind(room_id)
        .bind(seat_index)
        .execute(&mut *db_tx)
        .await?
        .rows_affected();
    if claimed != 1 {
        return Err(NexusError::SeatTaken)?;
    }

    db_tx.commit().await?;
    tracing::debug!(%room_id, %user_id, seat_index, "sat down");

    publish_seats(db_pool, tx, room_id).await
}

/// Clears the occupant and mute flag of the caller's seat, if any.
pub(crate) async fn stand(db_pool: &SqlitePool, tx: &Hub, room_id: Uuid, user_id: Uuid) -> AppResult<Vec<Seat>> {
    load_room(db_pool, room_id).await?;

    let left = sqlx::query("UPDATE room_seats SET user_id=NULL,is_muted=0 WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();

    if left == 0 {
        return load_seats(db_pool, room_id).await;
    }
    publish_seats(db_pool, tx, room_id).await
}

/// Locking a seat also removes whoever sits on it.
pub(crate) async fn toggle_lock(
    db_pool: &SqlitePool,
    tx: &Hub,
    room_id: Uuid,
    me: &Profile,
    seat_index: i64,
) -> AppResult<Vec<Seat>> {
    let room = load_room(db_pool, room_id).await?;
    ensure_moderator(&room, me)?;

    // SET expressions read the row as it was before the update
    let changed = sqlx::query(
        "UPDATE room_seats SET is_locked=NOT is_locked, \
         user_id=CASE WHEN is_locked THEN user_id ELSE NULL END, \
         is_muted=CASE WHEN is_locked THEN is_muted ELSE 0 END \
         WHERE room_id=? AND seat_index=?"
    )
    .bind(room_id)
    .bind(seat_index)
    .execute(db_pool)
    .await?
    .rows_affected();
    if changed == 0 {
        return Err(NexusError::NotFound("seat"))?;
    }

    publish_seats(db_pool, tx, room_id).await
}

/// The occupant mutes themselves; owners and admins can mute anyone.
pub(crate) async fn toggle_mute(
    db_pool: &SqlitePool,
    tx: &Hub,
    room_id: Uuid,
    me: &Profile,
    seat_index: i64,
) -> AppResult<Vec<Seat>> {
    let room = load_room(db_pool, room_id).await?;

    let Some((occupant,)): Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT user_id FROM room_seats WHERE room_id=? AND seat_index=?")
            .bind(room_id)
            .bind(seat_index)
            .fetch_optional(db_pool)
            .await?
    else {
        return Err(NexusError::NotFound("seat"))?;
    };
    let Some(occupant) = occupant else {
        return Err(NexusError::Conflict("nobody is sitting there"))?;
    };
    if occupant != me.id {
        ensure_moderator(&room, me)?;
    }

    sqlx::query("UPDATE room_seats SET is_muted=NOT is_muted WHERE room_id=? AND seat_index=? AND user_id=?")
        .bind(room_id)
        .bind(seat_index)
        .bind(occupant)
        .execute(db_pool)
        .await?;

    publish_seats(db_pool, tx, room_id).await
}

/// Empties every seat held by `user_id` across all rooms.
pub(crate) async fn vacate_everywhere(db_pool: &SqlitePool, tx: &Hub, user_id: Uuid) -> AppResult<()> {
    let rooms: Vec<(Uuid,)> = sqlx::query_as("SELECT DISTINCT room_id FROM room_seats WHERE user_id=?")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;

    sqlx::query("UPDATE room_seats SET user_id=NULL,is_muted=0 WHERE user_id=?")
        .bind(user_id)
        .execute(db_pool)
        .await?;

    for (room_id,) in rooms {
        publish_seats(db_pool, tx, room_id).await?;
    }
    Ok(())
}
