use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{dm::Gate, rooms::Seat};

pub type Hub = broadcast::Sender<Change>;

pub fn hub() -> Hub {
    broadcast::channel(256).0
}

/// Published after a mutation; sockets forward the ones they care about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    Seats {
        room_id: Uuid,
        seats: Vec<Seat>,
    },
    RoomMessage {
        id: Uuid,
        room_id: Uuid,
        user_id: Uuid,
        custom_id: String,
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
    },
    DirectMessage {
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
    },
}

impl Change {
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Change::Seats { room_id, .. } | Change::RoomMessage { room_id, .. } => Some(*room_id),
            Change::DirectMessage { .. } => None,
        }
    }

    /// Whether this is a direct message between `a` and `b`, in either direction.
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        match self {
            Change::DirectMessage { sender_id, receiver_id, .. } => {
                (*sender_id == a && *receiver_id == b) || (*sender_id == b && *receiver_id == a)
            }
            _ => false,
        }
    }
}

/// Pushed only to the socket it concerns.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    LevelUp { level: i64, nexus_coins: i64 },
    Gate { gate: Gate },
    Error { message: String },
}

pub fn publish(tx: &Hub, change: Change) {
    // no subscribers is fine
    let _ = tx.send(change);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(sender_id: Uuid, receiver_id: Uuid) -> Change {
        Change::DirectMessage {
            id: Uuid::now_v7(),
            sender_id,
            receiver_id,
            content: "oi".to_owned(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn direct_messages_match_either_direction() {
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        assert!(dm(a, b).is_between(a, b));
        assert!(dm(b, a).is_between(a, b));
        assert!(!dm(a, c).is_between(a, b));
        assert_eq!(dm(a, b).room_id(), None);
    }

    #[test]
    fn changes_serialize_with_a_type_tag() {
        let room_id = Uuid::now_v7();
        let json = serde_json::to_value(Change::Seats { room_id, seats: vec![] }).unwrap();
        assert_eq!(json["type"], "seats");
        assert_eq!(json["room_id"], room_id.to_string());
    }

    #[tokio::test]
    async fn subscribers_see_published_changes() {
        let tx = hub();
        let mut rx = tx.subscribe();
        let room_id = Uuid::now_v7();
        publish(&tx, Change::Seats { room_id, seats: vec![] });
        assert_eq!(rx.recv().await.unwrap().room_id(), Some(room_id));
    }
}
