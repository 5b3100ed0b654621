use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    clean_text,
    db::{self, Profile, Role},
    realtime::Hub,
    rooms::vacate_everywhere,
    session::CurrentUser,
    AppResult, AppState, NexusError,
};

#[derive(Debug, Deserialize)]
pub(crate) struct BanForm {
    reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleForm {
    role: Role,
}

#[debug_handler(state = AppState)]
pub(crate) async fn ban(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    admin: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(BanForm { reason }): Json<BanForm>,
) -> AppResult<StatusCode> {
    admin.require_admin()?;
    ban_user(&db_pool, &tx, &admin.0, user_id, &reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_user(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    admin: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    admin.require_admin()?;
    remove_user(&db_pool, &tx, &admin.0, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn verify(
    State(db_pool): State<SqlitePool>,
    admin: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    admin.require_admin()?;
    sqlx::query("UPDATE profiles SET is_verified=1 WHERE id=?")
        .bind(user_id)
        .execute(&db_pool)
        .await?;
    Ok(Json(target(&db_pool, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_role(
    State(db_pool): State<SqlitePool>,
    admin: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(RoleForm { role }): Json<RoleForm>,
) -> AppResult<Json<Profile>> {
    admin.require_admin()?;
    target(&db_pool, user_id).await?;
    sqlx::query("UPDATE profiles SET role=? WHERE id=?")
        .bind(role)
        .bind(user_id)
        .execute(&db_pool)
        .await?;
    tracing::info!(%user_id, ?role, "role changed");
    Ok(Json(target(&db_pool, user_id).await?))
}

async fn target(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Profile> {
    Profile::by_id(db_pool, user_id)
        .await?
        .ok_or_else(|| NexusError::NotFound("profile").into())
}

/// Blacklists the profile and pulls it out of every seat. The row stays so
/// the ban can be looked up later.
pub async fn ban_user(db_pool: &SqlitePool, tx: &Hub, admin: &Profile, user_id: Uuid, reason: &str) -> AppResult<()> {
    if user_id == admin.id {
        return Err(NexusError::Invalid("cannot ban yourself"))?;
    }
    let reason = clean_text(reason, 200, "reason must be 1 to 200 characters")?;
    target(db_pool, user_id).await?;
    if db::is_banned(db_pool, user_id).await? {
        return Err(NexusError::Conflict("already banned"))?;
    }

    sqlx::query("INSERT INTO blacklist_network (network_value,type,reason,created_at) VALUES (?,'user_ban',?,?)")
        .bind(user_id.to_string())
        .bind(&reason)
        .bind(OffsetDateTime::now_utc())
        .execute(db_pool)
        .await?;
    vacate_everywhere(db_pool, tx, user_id).await?;

    tracing::warn!(%user_id, admin = %admin.id, %reason, "user banned");
    Ok(())
}

/// Hard delete. Owned rooms, messages and graph edges go with the profile.
pub async fn remove_user(db_pool: &SqlitePool, tx: &Hub, admin: &Profile, user_id: Uuid) -> AppResult<()> {
    if user_id == admin.id {
        return Err(NexusError::Invalid("cannot delete yourself"))?;
    }
    target(db_pool, user_id).await?;
    vacate_everywhere(db_pool, tx, user_id).await?;

    sqlx::query("DELETE FROM profiles WHERE id=?")
        .bind(user_id)
        .execute(db_pool)
        .await?;

    tracing::warn!(%user_id, admin = %admin.id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::{fixtures, memory_pool}, realtime, rooms::{load_seats, new::create_room, seats}};

    #[tokio::test]
    async fn bans_blacklist_and_unseat() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let root = fixtures::profile_with(&db_pool, "root", Role::Admin, 0).await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let room = create_room(&db_pool, &root, "Stage").await.unwrap();
        seats::sit(&db_pool, &tx, room.id, ana.id, 2).await.unwrap();

        ban_user(&db_pool, &tx, &root, ana.id, "spam").await.unwrap();
        assert!(db::is_banned(&db_pool, ana.id).await.unwrap());
        assert!(load_seats(&db_pool, room.id).await.unwrap().iter().all(|s| s.user_id.is_none()));

        let err = ban_user(&db_pool, &tx, &root, ana.id, "again").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::Conflict(_))));
        let err = ban_user(&db_pool, &tx, &root, root.id, "oops").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::Invalid(_))));
    }

    #[tokio::test]
    async fn deleting_cascades() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let root = fixtures::profile_with(&db_pool, "root", Role::Admin, 0).await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let room = create_room(&db_pool, &ana, "Ana's").await.unwrap();

        remove_user(&db_pool, &tx, &root, ana.id).await.unwrap();
        assert!(Profile::by_id(&db_pool, ana.id).await.unwrap().is_none());
        let err = crate::rooms::load_room(&db_pool, room.id).await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::NotFound("room"))));
    }
}
