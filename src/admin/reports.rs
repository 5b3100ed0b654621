use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{session::CurrentUser, AppResult, AppState, NexusError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reporter: String,
    pub reported_id: Uuid,
    pub reported: String,
    pub reason: String,
    pub details: Option<String>,
    pub status: ReportStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    admin: CurrentUser,
) -> AppResult<Json<Vec<ReportRow>>> {
    admin.require_admin()?;
    Ok(Json(list_reports(&db_pool).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn resolve(
    State(db_pool): State<SqlitePool>,
    admin: CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    admin.require_admin()?;
    resolve_report(&db_pool, report_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Newest first, with both handles joined in.
pub async fn list_reports(db_pool: &SqlitePool) -> AppResult<Vec<ReportRow>> {
    Ok(
        sqlx::query_as(
            "SELECT r.id,r.reporter_id,a.custom_id AS reporter,r.reported_id,b.custom_id AS reported, \
             r.reason,r.details,r.status,r.created_at \
             FROM user_reports r \
             JOIN profiles a ON a.id=r.reporter_id \
             JOIN profiles b ON b.id=r.reported_id \
             ORDER BY r.rowid DESC"
        )
        .fetch_all(db_pool)
        .await?
    )
}

pub async fn resolve_report(db_pool: &SqlitePool, report_id: Uuid) -> AppResult<()> {
    let resolved = sqlx::query("UPDATE user_reports SET status='resolved' WHERE id=?")
        .bind(report_id)
        .execute(db_pool)
        .await?;
    if resolved.rows_affected() == 0 {
        return Err(NexusError::NotFound("report"))?;
    }
    tracing::info!(%report_id, "report resolved");
    Ok(())
}
