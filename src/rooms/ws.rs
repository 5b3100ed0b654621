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
    db::{self, Profile},
    realtime::{Hub, Notice},
    session::CurrentUser,
    AppError, AppResult, AppState, NexusError, Rules,
};

use super::{load_room, msg, seats, xp};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RoomCommand {
    Say { content: String },
    Sit { seat: i64 },
    Stand,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(tx): State<Hub>,
    State(rules): State<Rules>,
    CurrentUser(me): CurrentUser,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    load_room(&db_pool, room_id).await?;

    Ok(ws.on_upgrade(move |stream| serve_room(stream, db_pool, tx, rules, room_id, me)))
}

/// Forwards the room's changes to the socket, runs the xp clock, and applies
/// commands from the client until it goes away or loses access.
async fn serve_room(stream: WebSocket, db_pool: SqlitePool, tx: Hub, rules: Rules, room_id: Uuid, me: Profile) {
    tracing::debug!(%room_id, user = %me.custom_id, "joined room socket");

    let (mut sender, mut receiver) = stream.split();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();
    let mut rx = tx.subscribe();

    let forward_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                change = rx.recv() => match change {
                    Ok(change) if change.room_id() == Some(room_id) => serde_json::to_string(&change),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%room_id, skipped, "room socket lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                notice = notice_rx.recv() => match notice {
                    Some(notice) => serde_json::to_string(&notice),
                    None => break,
                },
            };
            let Ok(text) = text else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut xp_task = tokio::spawn(xp_clock(db_pool.clone(), rules, me.id, notice_tx.clone()));

    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            // the clock only stops once the profile is banned or gone
            _ = &mut xp_task => break,
        };
        let Some(Ok(msg)) = msg else {
            break;
        };
        let Ok(command) = serde_json::from_slice::<RoomCommand>(&msg.into_data()) else {
            continue;
        };

        if let Err(err) = apply(&db_pool, &tx, room_id, me.id, command).await {
            let locked_out = matches!(err.nexus(), Some(NexusError::Banned | NexusError::Unauthorized));
            let _ = notice_tx.send(Notice::Error { message: describe(err) });
            if locked_out {
                break;
            }
        }
    }

    xp_task.abort();
    leave(&db_pool, &tx, room_id, me.id).await;

    // let pending notices out, then close
    drop(notice_tx);
    let forward_abort = forward_task.abort_handle();
    if tokio::time::timeout(FLUSH_GRACE, forward_task).await.is_err() {
        forward_abort.abort();
    }
    tracing::debug!(%room_id, user = %me.custom_id, "left room socket");
}

const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// A closed socket gives up its seat.
async fn leave(db_pool: &SqlitePool, tx: &Hub, room_id: Uuid, user_id: Uuid) {
    if let Err(err) = seats::stand(db_pool, tx, room_id, user_id).await {
        if err.nexus().is_none() {
            tracing::warn!(%room_id, %user_id, error = ?err.0, "could not free seat on leave");
        }
    }
}

/// Every command runs against the profile as it is now, so bans and edits
/// made while the socket is open take effect.
async fn apply(db_pool: &SqlitePool, tx: &Hub, room_id: Uuid, profile_id: Uuid, command: RoomCommand) -> AppResult<()> {
    let me = CurrentUser::reload(db_pool, profile_id).await?;
    match command {
        RoomCommand::Say { content } => {
            msg::send_msg(db_pool, tx, room_id, &me, &content).await?;
        }
        RoomCommand::Sit { seat } => {
            seats::sit(db_pool, tx, room_id, me.id, seat).await?;
        }
        RoomCommand::Stand => {
            seats::stand(db_pool, tx, room_id, me.id).await?;
        }
    }
    Ok(())
}

/// Turns a failed command into the message shown to the client.
pub(crate) fn describe(err: AppError) -> String {
    match err.nexus() {
        Some(err) => err.to_string(),
        None => {
            tracing::error!(error = ?err.0, "socket command failed");
            "something went wrong".to_owned()
        }
    }
}

async fn xp_clock(db_pool: SqlitePool, rules: Rules, profile_id: Uuid, notices: mpsc::UnboundedSender<Notice>) {
    let mut interval = tokio::time::interval(rules.xp_tick);
    // the first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        match db::is_banned(&db_pool, profile_id).await {
            Ok(false) => {}
            Ok(true) => {
                let _ = notices.send(Notice::Error { message: NexusError::Banned.to_string() });
                break;
            }
            Err(err) => {
                tracing::warn!(%profile_id, error = ?err.0, "ban check failed");
                continue;
            }
        }
        match xp::tick(&db_pool, &rules, profile_id).await {
            Ok(Some(progress)) if progress.leveled_up => {
                let _ = notices.send(Notice::LevelUp {
                    level: progress.level,
                    nexus_coins: progress.nexus_coins,
                });
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => tracing::warn!(%profile_id, error = ?err.0, "xp tick failed"),
        }
    }
}
