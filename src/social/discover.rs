use axum::{debug_handler, extract::State, Json};
use rand::seq::SliceRandom;
use sqlx::SqlitePool;

use crate::{db::Profile, session::CurrentUser, AppResult, AppState};

pub(crate) const DISCOVER_LIMIT: usize = 10;

#[debug_handler(state = AppState)]
pub(crate) async fn discover(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(candidates(&db_pool, &me).await?))
}

/// Profiles the caller doesn't follow yet, in random order.
pub(crate) async fn candidates(db_pool: &SqlitePool, me: &Profile) -> AppResult<Vec<Profile>> {
    let mut profiles: Vec<Profile> = sqlx::query_as(&format!(
        "SELECT {} FROM profiles WHERE id!=? \
         AND id NOT IN (SELECT following_id FROM follows WHERE follower_id=?)",
        Profile::columns()
    ))
    .bind(me.id)
    .bind(me.id)
    .fetch_all(db_pool)
    .await?;

    profiles.shuffle(&mut rand::rng());
    profiles.truncate(DISCOVER_LIMIT);
    Ok(profiles)
}
