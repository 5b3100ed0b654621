mod gate;
mod ws;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    clean_text,
    db::Profile,
    realtime::{self, Change, Hub},
    session::CurrentUser,
    AppResult, AppState, NexusError, Rules,
};

pub use gate::{evaluate, gate_for, Gate, Relationship};

const MESSAGE_MAX: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{peer_id}", get(conversation).post(post_message))
        .route("/{peer_id}/ws", get(ws::dm_ws))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DirectMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversationView {
    peer: Profile,
    messages: Vec<DirectMessage>,
    gate: Gate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendForm {
    content: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversation(
    State(db_pool): State<SqlitePool>,
    State(rules): State<Rules>,
    CurrentUser(me): CurrentUser,
    Path(peer_id): Path<Uuid>,
) -> AppResult<Json<ConversationView>> {
    let peer = load_peer(&db_pool, &me, peer_id).await?;
    let messages = load_conversation(&db_pool, me.id, peer_id).await?;
    let gate = gate_for(&db_pool, &rules, me.id, peer_id).await?;

    Ok(Json(ConversationView { peer, messages, gate }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    State(rules): State<Rules>,
    CurrentUser(me): CurrentUser,
    Path(peer_id): Path<Uuid>,
    Json(SendForm { content }): Json<SendForm>,
) -> AppResult<(StatusCode, Json<DirectMessage>)> {
    let message = send_dm(&db_pool, &tx, &rules, &me, peer_id, &content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn load_peer(db_pool: &SqlitePool, me: &Profile, peer_id: Uuid) -> AppResult<Profile> {
    if peer_id == me.id {
        return Err(NexusError::Invalid("cannot message yourself"))?;
    }
    Profile::by_id(db_pool, peer_id)
        .await?
        .ok_or_else(|| NexusError::NotFound("profile").into())
}

/// Both directions of the conversation, oldest first.
pub(crate) async fn load_conversation(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Vec<DirectMessage>> {
    Ok(
        sqlx::query_as(
            "SELECT id,sender_id,receiver_id,content,created_at FROM messages \
             WHERE (sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?) \
             ORDER BY rowid"
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(db_pool)
        .await?
    )
}

pub(crate) async fn send_dm(
    db_pool: &SqlitePool,
    tx: &Hub,
    rules: &Rules,
    sender: &Profile,
    peer_id: Uuid,
    content: &str,
) -> AppResult<DirectMessage> {
    let content = clean_text(content, MESSAGE_MAX, "message must be 1 to 1000 characters")?;
    load_peer(db_pool, sender, peer_id).await?;

    let unlocked = gate_for(db_pool, rules, sender.id, peer_id).await? == Gate::Unlocked;

    let message = DirectMessage {
        id: Uuid::now_v7(),
        sender_id: sender.id,
        receiver_id: peer_id,
        content,
        created_at: OffsetDateTime::now_utc(),
    };
    // the count and the insert are one statement so parallel sends can't overshoot
    let inserted = sqlx::query(
        "INSERT INTO messages (id,sender_id,receiver_id,content,created_at) \
         SELECT ?,?,?,?,? \
         WHERE ? OR (SELECT COUNT(*) FROM messages WHERE sender_id=? AND receiver_id=?) < ?"
    )
    .bind(message.id)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(&message.content)
    .bind(message.created_at)
    .bind(unlocked)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(rules.free_messages)
    .execute(db_pool)
    .await?
    .rows_affected();

    if inserted == 0 {
        tracing::debug!(sender = %sender.id, %peer_id, "direct message limited");
        return Err(NexusError::ChatLimited)?;
    }

    realtime::publish(tx, Change::DirectMessage {
        id: message.id,
        sender_id: message.sender_id,
        receiver_id: message.receiver_id,
        content: message.content.clone(),
        created_at: message.created_at,
    });

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, memory_pool, Role};

    async fn follow(db_pool: &SqlitePool, a: Uuid, b: Uuid) {
        sqlx::query("INSERT INTO follows (follower_id,following_id) VALUES (?,?)")
            .bind(a)
            .bind(b)
            .execute(db_pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fourth_message_to_a_stranger_is_refused() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        for i in 0..3 {
            send_dm(&db_pool, &tx, &rules, &ana, bia.id, &format!("hey {i}")).await.unwrap();
        }
        let err = send_dm(&db_pool, &tx, &rules, &ana, bia.id, "please").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::ChatLimited)));

        // the limit is per sender
        send_dm(&db_pool, &tx, &rules, &bia, ana.id, "hi back").await.unwrap();
        assert_eq!(load_conversation(&db_pool, ana.id, bia.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn following_back_unlocks_the_chat() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;
        for _ in 0..3 {
            send_dm(&db_pool, &tx, &rules, &ana, bia.id, "hello?").await.unwrap();
        }

        follow(&db_pool, ana.id, bia.id).await;
        assert_eq!(gate_for(&db_pool, &rules, ana.id, bia.id).await.unwrap(), Gate::Limited { remaining: 0 });

        follow(&db_pool, bia.id, ana.id).await;
        assert_eq!(gate_for(&db_pool, &rules, ana.id, bia.id).await.unwrap(), Gate::Unlocked);
        send_dm(&db_pool, &tx, &rules, &ana, bia.id, "finally").await.unwrap();
    }

    #[tokio::test]
    async fn accepted_friends_and_vips_are_unlimited() {
        let db_pool = memory_pool().await;
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;
        let vip = fixtures::profile_with(&db_pool, "vip", Role::Vip, 0).await;

        sqlx::query("INSERT INTO friends (user_id,friend_id,status) VALUES (?,?,'pending')")
            .bind(ana.id)
            .bind(bia.id)
            .execute(&db_pool)
            .await
            .unwrap();
        assert_eq!(gate_for(&db_pool, &rules, ana.id, bia.id).await.unwrap(), Gate::Limited { remaining: 3 });

        sqlx::query("UPDATE friends SET status='accepted'")
            .execute(&db_pool)
            .await
            .unwrap();
        assert_eq!(gate_for(&db_pool, &rules, ana.id, bia.id).await.unwrap(), Gate::Unlocked);
        assert_eq!(gate_for(&db_pool, &rules, vip.id, bia.id).await.unwrap(), Gate::Unlocked);
    }

    #[tokio::test]
    async fn sent_messages_reach_the_hub() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let mut rx = tx.subscribe();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        let sent = send_dm(&db_pool, &tx, &rules, &ana, bia.id, " oi ").await.unwrap();
        assert_eq!(sent.content, "oi");
        let change = rx.recv().await.unwrap();
        assert!(change.is_between(bia.id, ana.id));
    }

    #[tokio::test]
    async fn self_and_unknown_peers_are_rejected() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;

        let err = send_dm(&db_pool, &tx, &rules, &ana, ana.id, "me").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::Invalid(_))));
        let err = send_dm(&db_pool, &tx, &rules, &ana, Uuid::now_v7(), "who").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::NotFound("profile"))));
    }

    #[tokio::test]
    async fn parallel_sends_respect_the_limit() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        let peer_id = bia.id;
        let sends = (0..6).map(|i| {
            let (db_pool, tx, rules, ana) = (&db_pool, &tx, &rules, &ana);
            async move { send_dm(db_pool, tx, rules, ana, peer_id, &format!("spam {i}")).await }
        });
        let results = futures_util::future::join_all(sends).await;

        assert_eq!(results.iter().filter(|sent| sent.is_ok()).count(), 3);
        assert!(results
            .iter()
            .filter_map(|sent| sent.as_ref().err())
            .all(|err| matches!(err.nexus(), Some(NexusError::ChatLimited))));
        assert_eq!(load_conversation(&db_pool, ana.id, bia.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn the_gate_follows_role_changes() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;
        let boss = fixtures::profile_with(&db_pool, "boss", Role::Admin, 0).await;
        for _ in 0..3 {
            send_dm(&db_pool, &tx, &rules, &ana, bia.id, "hi").await.unwrap();
        }

        // `ana` still holds the profile read before the upgrade
        sqlx::query("UPDATE profiles SET role=? WHERE id=?")
            .bind(Role::Vip)
            .bind(ana.id)
            .execute(&db_pool)
            .await
            .unwrap();
        assert_eq!(gate_for(&db_pool, &rules, ana.id, bia.id).await.unwrap(), Gate::Unlocked);
        send_dm(&db_pool, &tx, &rules, &ana, bia.id, "vip now").await.unwrap();

        sqlx::query("UPDATE profiles SET role=? WHERE id=?")
            .bind(Role::User)
            .bind(boss.id)
            .execute(&db_pool)
            .await
            .unwrap();
        assert_eq!(gate_for(&db_pool, &rules, boss.id, bia.id).await.unwrap(), Gate::Limited { remaining: 3 });
    }
}
