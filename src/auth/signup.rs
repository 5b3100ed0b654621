use axum::{debug_handler, extract::State, http::StatusCode, Json};
use rand::{seq::IndexedRandom, Rng};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{clean_text, db::Profile, session::USER_ID, AppResult, AppState, NexusError, Rules};

pub(crate) const HANDLE_MAX: usize = 24;

#[derive(Debug, Deserialize)]
pub(crate) struct SignupForm {
    custom_id: Option<String>,
    personality: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    State(rules): State<Rules>,
    session: Session,
    Json(SignupForm { custom_id, personality }): Json<SignupForm>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let Some(auth_id) = session.get::<String>(USER_ID).await? else {
        return Err(NexusError::Unauthorized)?;
    };

    let custom_id = match custom_id {
        Some(custom_id) => clean_text(&custom_id, HANDLE_MAX, "handle must be 1 to 24 characters")?,
        None => random_handle(),
    };
    let personality = personality
        .map(|p| clean_text(&p, 40, "personality must be 1 to 40 characters"))
        .transpose()?;

    let profile = create_profile(&db_pool, &rules, &auth_id, &custom_id, personality.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub(crate) async fn create_profile(
    db_pool: &SqlitePool,
    rules: &Rules,
    auth_id: &str,
    custom_id: &str,
    personality: Option<&str>,
) -> AppResult<Profile> {
    if Profile::by_auth_id(db_pool, auth_id).await?.is_some() {
        return Err(NexusError::Conflict("profile already exists"))?;
    }

    let id = Uuid::now_v7();
    let inserted = sqlx::query("INSERT INTO profiles (id,auth_id,custom_id,personality,level,xp,nexus_coins,created_at) VALUES (?,?,?,?,1,0,?,?)")
        .bind(id)
        .bind(auth_id)
        .bind(custom_id)
        .bind(personality)
        .bind(rules.starting_coins)
        .bind(OffsetDateTime::now_utc())
        .execute(db_pool)
        .await;
    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(NexusError::Conflict("handle already taken"))?;
        }
        Err(e) => return Err(e)?,
    }

    tracing::info!(%id, custom_id, "profile created");
    Profile::by_id(db_pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile {id} vanished after insert").into())
}

/// Handle for users who skip choosing one, e.g. `JollyFalcon0420`.
pub(crate) fn random_handle() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{}{}{:04}",
        adjectives.choose(&mut rng).copied().unwrap_or("Nexus"),
        nouns.choose(&mut rng).copied().unwrap_or("User"),
        rng.random_range(0..10_000),
    )
}
