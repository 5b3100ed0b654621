mod reports;
mod users;

use axum::{
    debug_handler,
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{session::CurrentUser, AppResult, AppState};

pub use reports::{ReportRow, ReportStatus};
pub use users::{ban_user, remove_user};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/reports", get(reports::list))
        .route("/reports/{report_id}/resolve", post(reports::resolve))
        .route("/users/{user_id}", delete(users::delete_user))
        .route("/users/{user_id}/ban", post(users::ban))
        .route("/users/{user_id}/verify", post(users::verify))
        .route("/users/{user_id}/role", put(users::set_role))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Stats {
    pub profiles: i64,
    pub reports: i64,
    pub pending_reports: i64,
    pub rooms: i64,
    pub banned: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn stats(
    State(db_pool): State<SqlitePool>,
    admin: CurrentUser,
) -> AppResult<Json<Stats>> {
    admin.require_admin()?;
    Ok(Json(count(&db_pool).await?))
}

pub async fn count(db_pool: &SqlitePool) -> AppResult<Stats> {
    Ok(
        sqlx::query_as(
            "SELECT \
             (SELECT COUNT(*) FROM profiles) AS profiles, \
             (SELECT COUNT(*) FROM user_reports) AS reports, \
             (SELECT COUNT(*) FROM user_reports WHERE status='pending') AS pending_reports, \
             (SELECT COUNT(*) FROM rooms) AS rooms, \
             (SELECT COUNT(*) FROM blacklist_network WHERE type='user_ban') AS banned"
        )
        .fetch_one(db_pool)
        .await?
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, memory_pool};

    #[tokio::test]
    async fn counts_everything() {
        let db_pool = memory_pool().await;
        fixtures::profile(&db_pool, "ana").await;
        fixtures::profile(&db_pool, "bia").await;

        let stats = count(&db_pool).await.unwrap();
        assert_eq!(stats, Stats { profiles: 2, reports: 0, pending_reports: 0, rooms: 0, banned: 0 });
    }
}
