use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::HANDLE_MAX, clean_text, db::Profile, session::CurrentUser, AppResult, AppState, NexusError};

use super::view::{profile_view, ProfileView};

const BIO_MAX: usize = 160;

#[derive(Debug, Default, Deserialize)]
pub struct ProfileEdit {
    pub custom_id: Option<String>,
    pub bio: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Json(changes): Json<ProfileEdit>,
) -> AppResult<Json<ProfileView>> {
    let profile = edit_profile(&db_pool, &me, changes).await?;
    Ok(Json(profile_view(&db_pool, profile).await?))
}

/// Applies the given fields; an empty bio clears it.
pub async fn edit_profile(db_pool: &SqlitePool, me: &Profile, changes: ProfileEdit) -> AppResult<Profile> {
    let custom_id = match changes.custom_id {
        Some(custom_id) => clean_text(&custom_id, HANDLE_MAX, "handle must be 1 to 24 characters")?,
        None => me.custom_id.clone(),
    };
    let bio = match changes.bio {
        Some(bio) if bio.trim().is_empty() => None,
        Some(bio) => Some(clean_text(&bio, BIO_MAX, "bio must be at most 160 characters")?),
        None => me.bio.clone(),
    };

    let updated = sqlx::query("UPDATE profiles SET custom_id=?,bio=? WHERE id=?")
        .bind(&custom_id)
        .bind(&bio)
        .bind(me.id)
        .execute(db_pool)
        .await;
    match updated {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(NexusError::Conflict("handle already taken"))?;
        }
        Err(e) => return Err(e)?,
    }

    Profile::by_id(db_pool, me.id)
        .await?
        .ok_or_else(|| NexusError::NotFound("profile").into())
}
