use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use uuid::Uuid;

use crate::{
    db::Profile,
    realtime::{Change, Hub, Notice},
    rooms::describe,
    session::CurrentUser,
    AppResult, AppState, NexusError, Rules,
};

use super::{gate_for, load_peer, send_dm, DirectMessage};

#[derive(Debug, Deserialize)]
struct SendCommand {
    content: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn dm_ws(
    Path(peer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    State(rules): State<Rules>,
    CurrentUser(me): CurrentUser,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    load_peer(&db_pool, &me, peer_id).await?;

    Ok(ws.on_upgrade(move |stream| serve_dm(stream, db_pool, tx, rules, me, peer_id)))
}

/// Pushes the pair's new messages, each followed by the sender-side gate.
async fn serve_dm(stream: WebSocket, db_pool: SqlitePool, tx: Hub, rules: Rules, me: Profile, peer_id: Uuid) {
    let (mut sender, mut receiver) = stream.split();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();
    let mut rx = tx.subscribe();

    if let Ok(gate) = gate_for(&db_pool, &rules, me.id, peer_id).await {
        let _ = notice_tx.send(Notice::Gate { gate });
    }

    let forward_pool = db_pool.clone();
    let me_id = me.id;
    let forward_task = tokio::spawn(async move {
        loop {
            let frames = tokio::select! {
                change = rx.recv() => match change {
                    Ok(change) => frames_for(&forward_pool, &rules, me_id, peer_id, &change).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "direct chat socket lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                notice = notice_rx.recv() => match notice {
                    Some(notice) => serde_json::to_string(&notice).into_iter().collect(),
                    None => break,
                },
            };

            for text in frames {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Ok(SendCommand { content }) = serde_json::from_slice(&msg.into_data()) else {
            continue;
        };

        if let Err(err) = send_as(&db_pool, &tx, &rules, me.id, peer_id, &content).await {
            let locked_out = matches!(err.nexus(), Some(NexusError::Banned | NexusError::Unauthorized));
            let _ = notice_tx.send(Notice::Error { message: describe(err) });
            if locked_out {
                break;
            }
        }
    }

    drop(notice_tx);
    let forward_abort = forward_task.abort_handle();
    if tokio::time::timeout(Duration::from_secs(1), forward_task).await.is_err() {
        forward_abort.abort();
    }
}

/// Sends as the profile stored now, not the one that opened the socket.
async fn send_as(
    db_pool: &SqlitePool,
    tx: &Hub,
    rules: &Rules,
    profile_id: Uuid,
    peer_id: Uuid,
    content: &str,
) -> AppResult<DirectMessage> {
    let me = CurrentUser::reload(db_pool, profile_id).await?;
    send_dm(db_pool, tx, rules, &me, peer_id, content).await
}

/// What one change means for this socket: nothing, or the message and the
/// gate it leaves behind.
async fn frames_for(db_pool: &SqlitePool, rules: &Rules, me_id: Uuid, peer_id: Uuid, change: &Change) -> Vec<String> {
    if !change.is_between(me_id, peer_id) {
        return Vec::new();
    }

    let mut frames: Vec<String> = serde_json::to_string(change).into_iter().collect();
    match gate_for(db_pool, rules, me_id, peer_id).await {
        Ok(gate) => frames.extend(serde_json::to_string(&Notice::Gate { gate })),
        Err(err) => tracing::warn!(%peer_id, error = ?err.0, "gate lookup failed"),
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin, db::{fixtures, memory_pool, Role}, dm::load_conversation, realtime};
    use serde_json::Value;

    fn parsed(frames: &[String]) -> Vec<Value> {
        frames.iter().map(|frame| serde_json::from_str(frame).unwrap()).collect()
    }

    #[tokio::test]
    async fn each_message_is_followed_by_the_fresh_gate() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let mut rx = tx.subscribe();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        send_dm(&db_pool, &tx, &rules, &ana, bia.id, "oi").await.unwrap();
        let change = rx.recv().await.unwrap();

        let mine = parsed(&frames_for(&db_pool, &rules, ana.id, bia.id, &change).await);
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0]["type"], "direct_message");
        assert_eq!(mine[0]["content"], "oi");
        assert_eq!(mine[1]["type"], "gate");
        assert_eq!(mine[1]["gate"]["state"], "limited");
        assert_eq!(mine[1]["gate"]["remaining"], 2);

        // the receiver's own allowance is untouched
        let theirs = parsed(&frames_for(&db_pool, &rules, bia.id, ana.id, &change).await);
        assert_eq!(theirs[1]["gate"]["remaining"], 3);
    }

    #[tokio::test]
    async fn other_traffic_is_not_forwarded() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let mut rx = tx.subscribe();
        let rules = Rules::default();
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;
        let cid = fixtures::profile(&db_pool, "cid").await;

        send_dm(&db_pool, &tx, &rules, &cid, bia.id, "psst").await.unwrap();
        let change = rx.recv().await.unwrap();

        assert!(frames_for(&db_pool, &rules, ana.id, bia.id, &change).await.is_empty());
    }

    #[tokio::test]
    async fn a_banned_sender_is_cut_off() {
        let db_pool = memory_pool().await;
        let tx = realtime::hub();
        let rules = Rules::default();
        let root = fixtures::profile_with(&db_pool, "root", Role::Admin, 0).await;
        let ana = fixtures::profile(&db_pool, "ana").await;
        let bia = fixtures::profile(&db_pool, "bia").await;

        send_as(&db_pool, &tx, &rules, ana.id, bia.id, "before").await.unwrap();
        admin::ban_user(&db_pool, &tx, &root, ana.id, "spam").await.unwrap();

        let err = send_as(&db_pool, &tx, &rules, ana.id, bia.id, "after").await.unwrap_err();
        assert!(matches!(err.nexus(), Some(NexusError::Banned)));
        assert_eq!(load_conversation(&db_pool, ana.id, bia.id).await.unwrap().len(), 1);
    }
}
