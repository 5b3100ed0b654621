use axum::{
    debug_handler,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{session::CurrentUser, AppResult, AppState, NexusError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{task_key}/claim", post(claim))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyTask {
    pub task_key: String,
    pub task_name: String,
    pub coin_reward: i64,
    pub claimed: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskBoard {
    pub tasks: Vec<DailyTask>,
    pub nexus_coins: i64,
}

#[derive(Debug, Serialize)]
pub struct Claimed {
    pub task_key: String,
    pub coin_reward: i64,
    pub nexus_coins: i64,
}

/// Claims reset at midnight UTC.
fn day_key(date: Date) -> String {
    date.to_string()
}

fn today() -> String {
    day_key(OffsetDateTime::now_utc().date())
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<TaskBoard>> {
    Ok(Json(board(&db_pool, me.id, &today()).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn claim(
    State(db_pool): State<SqlitePool>,
    CurrentUser(me): CurrentUser,
    Path(task_key): Path<String>,
) -> AppResult<Json<Claimed>> {
    Ok(Json(claim_task(&db_pool, me.id, &task_key, &today()).await?))
}

pub async fn board(db_pool: &SqlitePool, user_id: Uuid, day: &str) -> AppResult<TaskBoard> {
    let tasks = sqlx::query_as(
        "SELECT t.task_key,t.task_name,t.coin_reward, \
         EXISTS(SELECT 1 FROM user_tasks_completed c WHERE c.user_id=? AND c.task_key=t.task_key AND c.day=?) AS claimed \
         FROM daily_tasks t ORDER BY t.coin_reward DESC"
    )
    .bind(user_id)
    .bind(day)
    .fetch_all(db_pool)
    .await?;

    let (nexus_coins,): (i64,) = sqlx::query_as("SELECT nexus_coins FROM profiles WHERE id=?")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;

    Ok(TaskBoard { tasks, nexus_coins })
}

/// Records the claim and credits the reward together; a second claim on the
/// same day hits the primary key.
pub async fn claim_task(db_pool: &SqlitePool, user_id: Uuid, task_key: &str, day: &str) -> AppResult<Claimed> {
    let Some((coin_reward,)): Option<(i64,)> = sqlx::query_as("SELECT coin_reward FROM daily_tasks WHERE task_key=?")
        .bind(task_key)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(NexusError::NotFound("task"))?;
    };

    let mut db_tx = db_pool.begin().await?;

    let recorded = sqlx::query("INSERT OR IGNORE INTO user_tasks_completed (user_id,task_key,day) VALUES (?,?,?)")
        .bind(user_id)
        .bind(task_key)
        .bind(day)
        .execute(&mut *db_tx)
        .await?;
    if recorded.rows_affected() == 0 {
        return Err(NexusError::AlreadyClaimed)?;
    }

    let (nexus_coins,): (i64,) = sqlx::query_as("UPDATE profiles SET nexus_coins=nexus_coins+? WHERE id=? RETURNING nexus_coins")
        .bind(coin_reward)
        .bind(user_id)
        .fetch_one(&mut *db_tx)
        .await?;
    db_tx.commit().await?;

    tracing::debug!(%user_id, task_key, coin_reward, "daily task claimed");
    Ok(Claimed { task_key: task_key.to_owned(), coin_reward, nexus_coins })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, memory_pool};
    use time::Month;

    #[test]
    fn days_are_iso_dates() {
        let date = Date::from_calendar_date(2024, Month::March, 9).unwrap();
        assert_eq!(day_key(date), "2024-03-09");
    }

    #[tokio::test]
    async fn one_claim_per_task_per_day() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;

        let claimed = claim_task(&db_pool, ana.id, "daily_login", "2024-03-09").await.unwrap();
        assert_eq!((claimed.coin_reward, claimed.nexus_coins), (50, 550));

        let err = claim_task(&db_pool, ana.id, "daily_login", "2024-03-09").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::AlreadyClaimed)));

        let claimed = claim_task(&db_pool, ana.id, "daily_login", "2024-03-10").await.unwrap();
        assert_eq!(claimed.nexus_coins, 600);
    }

    #[tokio::test]
    async fn board_marks_todays_claims() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        claim_task(&db_pool, ana.id, "room_chat", "2024-03-09").await.unwrap();

        let today = board(&db_pool, ana.id, "2024-03-09").await.unwrap();
        let keys: Vec<_> = today.tasks.iter().map(|t| (t.task_key.as_str(), t.claimed)).collect();
        assert_eq!(keys, [("make_friend", false), ("room_chat", true), ("daily_login", false)]);
        assert_eq!(today.nexus_coins, 600);

        let tomorrow = board(&db_pool, ana.id, "2024-03-10").await.unwrap();
        assert!(tomorrow.tasks.iter().all(|t| !t.claimed));
    }

    #[tokio::test]
    async fn unknown_tasks_are_not_found() {
        let db_pool = memory_pool().await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let err = claim_task(&db_pool, ana.id, "moonwalk", "2024-03-09").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::NotFound("task"))));
    }
}
