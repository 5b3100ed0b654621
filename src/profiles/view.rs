use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::{Profile, Role}, session::CurrentUser, AppResult, AppState, NexusError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Staff,
    Vip,
    Aristocracy,
    Verified,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: Profile,
    pub badges: Vec<Badge>,
    pub followers: i64,
    pub following: i64,
}

pub fn badges(profile: &Profile) -> Vec<Badge> {
    let mut badges = Vec::new();
    match profile.role {
        Role::Admin => badges.push(Badge::Staff),
        Role::Vip => badges.push(Badge::Vip),
        Role::Aristocracy => badges.push(Badge::Aristocracy),
        Role::User => {}
    }
    if profile.is_verified {
        badges.push(Badge::Verified);
    }
    badges
}

#[debug_handler(state = AppState)]
pub(crate) async fn me(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<ProfileView>> {
    Ok(Json(profile_view(&db_pool, me).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn by_id(
    State(db_pool): State<SqlitePool>,
    CurrentUser(_): CurrentUser,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ProfileView>> {
    let Some(profile) = Profile::by_id(&db_pool, profile_id).await? else {
        return Err(NexusError::NotFound("profile"))?;
    };
    Ok(Json(profile_view(&db_pool, profile).await?))
}

pub(crate) async fn profile_view(db_pool: &SqlitePool, profile: Profile) -> AppResult<ProfileView> {
    let (followers, following): (i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM follows WHERE following_id=?), \
                (SELECT COUNT(*) FROM follows WHERE follower_id=?)"
    )
    .bind(profile.id)
    .bind(profile.id)
    .fetch_one(db_pool)
    .await?;

    Ok(ProfileView {
        badges: badges(&profile),
        profile,
        followers,
        following,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::{fixtures, memory_pool}, social::follow};

    #[tokio::test]
    async fn badges_follow_role_and_verification() {
        let db_pool = memory_pool().await;
        let admin = fixtures::profile_with(&db_pool, "root", Role::Admin, 0).await;
        let mut vip = fixtures::profile_with(&db_pool, "vip", Role::Vip, 0).await;
        let plain = fixtures::profile(&db_pool, "plain").await;

        assert_eq!(badges(&admin), vec![Badge::Staff]);
        assert!(badges(&plain).is_empty());
        vip.is_verified = true;
        assert_eq!(badges(&vip), vec![Badge::Vip, Badge::Verified]);
    }

    #[tokio::test]
    async fn counts_both_sides_of_the_graph() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;
        let caio = fixtures::profile(&db_pool, "caio").await;
        follow(&db_pool, &bia, ana.id).await.unwrap();
        follow(&db_pool, &caio, ana.id).await.unwrap();
        follow(&db_pool, &ana, caio.id).await.unwrap();

        let view = profile_view(&db_pool, ana).await.unwrap();
        assert_eq!((view.followers, view.following), (2, 1));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["custom_id"], "ana");
        assert_eq!(json["followers"], 2);
        assert!(json.get("auth_id").is_none());
    }
}
