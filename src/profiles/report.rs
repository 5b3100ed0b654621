use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{clean_text, db::Profile, session::CurrentUser, AppResult, AppState, NexusError};

#[derive(Debug, Deserialize)]
pub(crate) struct ReportForm {
    reason: String,
    details: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Filed {
    id: Uuid,
}

#[debug_handler(state = AppState)]
pub(crate) async fn report(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(profile_id): Path<Uuid>,
    Json(ReportForm { reason, details }): Json<ReportForm>,
) -> AppResult<(StatusCode, Json<Filed>)> {
    let id = file_report(&db_pool, &me, profile_id, &reason, details.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(Filed { id })))
}

pub async fn file_report(
    db_pool: &SqlitePool,
    reporter: &Profile,
    reported_id: Uuid,
    reason: &str,
    details: Option<&str>,
) -> AppResult<Uuid> {
    if reported_id == reporter.id {
        return Err(NexusError::Invalid("cannot report yourself"))?;
    }
    if Profile::by_id(db_pool, reported_id).await?.is_none() {
        return Err(NexusError::NotFound("profile"))?;
    }
    let reason = clean_text(reason, 80, "reason must be 1 to 80 characters")?;
    let details = details
        .filter(|d| !d.trim().is_empty())
        .map(|d| clean_text(d, 1000, "details must be at most 1000 characters"))
        .transpose()?;

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO user_reports (id,reporter_id,reported_id,reason,details,created_at) VALUES (?,?,?,?,?,?)")
        .bind(id)
        .bind(reporter.id)
        .bind(reported_id)
        .bind(&reason)
        .bind(details)
        .bind(OffsetDateTime::now_utc())
        .execute(db_pool)
        .await?;

    tracing::info!(%id, reporter = %reporter.id, %reported_id, %reason, "report filed");
    Ok(id)
}
