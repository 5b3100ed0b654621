mod discover;
mod friends;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::Profile, session::CurrentUser, AppResult, AppState, NexusError};

pub use friends::FriendStatus;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/follow/{profile_id}", post(post_follow).delete(delete_follow))
        .route("/discover", get(discover::discover))
        .route("/friends", get(friends::list))
        .route("/friends/{profile_id}", post(friends::request))
        .route("/friends/{profile_id}/accept", post(friends::accept))
}

/// Another profile that exists. Nobody can follow or befriend themselves.
pub(crate) async fn load_other(db_pool: &SqlitePool, me: &Profile, profile_id: Uuid) -> AppResult<Profile> {
    if profile_id == me.id {
        return Err(NexusError::Invalid("that is you"))?;
    }
    Profile::by_id(db_pool, profile_id)
        .await?
        .ok_or_else(|| NexusError::NotFound("profile").into())
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_follow(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(profile_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    follow(&db_pool, &me, profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_follow(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(profile_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    unfollow(&db_pool, &me, profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn follow(db_pool: &SqlitePool, me: &Profile, profile_id: Uuid) -> AppResult<()> {
    load_other(db_pool, me, profile_id).await?;
    sqlx::query("INSERT OR IGNORE INTO follows (follower_id,following_id) VALUES (?,?)")
        .bind(me.id)
        .bind(profile_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn unfollow(db_pool: &SqlitePool, me: &Profile, profile_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM follows WHERE follower_id=? AND following_id=?")
        .bind(me.id)
        .bind(profile_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, memory_pool};

    async fn follows(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> bool {
        sqlx::query("SELECT 1 FROM follows WHERE follower_id=? AND following_id=?")
            .bind(a)
            .bind(b)
            .fetch_optional(db_pool)
            .await
            .unwrap()
            .is_some()
    }

    #[tokio::test]
    async fn follow_and_unfollow_are_idempotent() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        follow(&db_pool, &ana, bia.id).await.unwrap();
        follow(&db_pool, &ana, bia.id).await.unwrap();
        assert!(follows(&db_pool, ana.id, bia.id).await);
        assert!(!follows(&db_pool, bia.id, ana.id).await);

        unfollow(&db_pool, &ana, bia.id).await.unwrap();
        unfollow(&db_pool, &ana, bia.id).await.unwrap();
        assert!(!follows(&db_pool, ana.id, bia.id).await);
    }

    #[tokio::test]
    async fn nobody_follows_themselves_or_ghosts() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;

        let err = follow(&db_pool, &ana, ana.id).await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::Invalid(_))));
        let err = follow(&db_pool, &ana, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::NotFound("profile"))));
    }
}
