use axum::{
    debug_handler,
    extract::{FromRef, FromRequestParts, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{db::{self, Profile, Role}, AppError, AppResult, AppState, NexusError};

pub(crate) const USER_ID: &str = "user_id";
pub(crate) const CSRF_STATE: &str = "csrf_state";
pub(crate) const PKCE_VERIFIER: &str = "pkce_verifier";
pub(crate) const RETURN_URL: &str = "return_url";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", get(session_info))
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub signed_in: bool,
    pub banned: bool,
    pub profile: Option<Profile>,
}

/// Tells a client which screens to show: sign-in, sign-up, or the app.
#[debug_handler(state = AppState)]
pub(crate) async fn session_info(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<SessionInfo>> {
    let Some(auth_id) = session.get::<String>(USER_ID).await? else {
        return Ok(Json(SessionInfo { signed_in: false, banned: false, profile: None }));
    };

    let profile = Profile::by_auth_id(&db_pool, &auth_id).await?;
    let banned = match &profile {
        Some(profile) => db::is_banned(&db_pool, profile.id).await?,
        None => false,
    };

    Ok(Json(SessionInfo { signed_in: true, banned, profile }))
}

/// The signed-in caller's profile, loaded fresh on every request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Profile);

impl CurrentUser {
    /// Reads the profile again for long-lived sockets, which outlive the
    /// check made when they were upgraded.
    pub(crate) async fn reload(db_pool: &SqlitePool, profile_id: Uuid) -> AppResult<Profile> {
        let Some(profile) = Profile::by_id(db_pool, profile_id).await? else {
            return Err(NexusError::Unauthorized)?;
        };
        if db::is_banned(db_pool, profile.id).await? {
            return Err(NexusError::Banned)?;
        }
        Ok(profile)
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.0.role != Role::Admin {
            return Err(NexusError::Forbidden("admins only"))?;
        }
        Ok(())
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| NexusError::Unauthorized)?;
        let Some(auth_id) = session.get::<String>(USER_ID).await? else {
            return Err(NexusError::Unauthorized)?;
        };

        let db_pool = SqlitePool::from_ref(state);
        let Some(profile) = Profile::by_auth_id(&db_pool, &auth_id).await? else {
            return Err(NexusError::Unauthorized)?;
        };
        if db::is_banned(&db_pool, profile.id).await? {
            return Err(NexusError::Banned)?;
        }

        Ok(CurrentUser(profile))
    }
}
