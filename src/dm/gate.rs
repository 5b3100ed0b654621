use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::Role, AppResult, NexusError, Rules};

/// Whether a sender may keep writing to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Gate {
    Unlocked,
    Limited { remaining: i64 },
}

impl Gate {
    pub fn can_send(&self) -> bool {
        match self {
            Gate::Unlocked => true,
            Gate::Limited { remaining } => *remaining > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relationship {
    /// Accepted friend edge from sender to peer.
    pub friends: bool,
    pub follows_peer: bool,
    pub followed_by_peer: bool,
}

impl Relationship {
    pub fn unlocks(&self) -> bool {
        self.friends || (self.follows_peer && self.followed_by_peer)
    }
}

pub fn evaluate(relationship: Relationship, role: Role, sent: i64, rules: &Rules) -> Gate {
    if role.is_privileged() || relationship.unlocks() {
        return Gate::Unlocked;
    }
    Gate::Limited { remaining: (rules.free_messages - sent).max(0) }
}

pub(crate) async fn relationship(db_pool: &SqlitePool, sender_id: Uuid, peer_id: Uuid) -> AppResult<Relationship> {
    let friends = sqlx::query("SELECT 1 FROM friends WHERE user_id=? AND friend_id=? AND status='accepted'")
        .bind(sender_id)
        .bind(peer_id)
        .fetch_optional(db_pool)
        .await?
        .is_some();

    Ok(Relationship {
        friends,
        follows_peer: follows(db_pool, sender_id, peer_id).await?,
        followed_by_peer: follows(db_pool, peer_id, sender_id).await?,
    })
}

async fn follows(db_pool: &SqlitePool, follower_id: Uuid, following_id: Uuid) -> AppResult<bool> {
    Ok(
        sqlx::query("SELECT 1 FROM follows WHERE follower_id=? AND following_id=?")
            .bind(follower_id)
            .bind(following_id)
            .fetch_optional(db_pool)
            .await?
            .is_some()
    )
}

pub(crate) async fn sent_count(db_pool: &SqlitePool, sender_id: Uuid, peer_id: Uuid) -> AppResult<i64> {
    let (sent,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE sender_id=? AND receiver_id=?")
        .bind(sender_id)
        .bind(peer_id)
        .fetch_one(db_pool)
        .await?;
    Ok(sent)
}

async fn current_role(db_pool: &SqlitePool, profile_id: Uuid) -> AppResult<Role> {
    let Some((role,)) = sqlx::query_as::<_, (Role,)>("SELECT role FROM profiles WHERE id=?")
        .bind(profile_id)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(NexusError::Unauthorized)?;
    };
    Ok(role)
}

/// Recomputed from the tables every time, role included; nothing is cached.
pub async fn gate_for(db_pool: &SqlitePool, rules: &Rules, sender_id: Uuid, peer_id: Uuid) -> AppResult<Gate> {
    let role = current_role(db_pool, sender_id).await?;
    let relationship = relationship(db_pool, sender_id, peer_id).await?;
    let sent = sent_count(db_pool, sender_id, peer_id).await?;
    Ok(evaluate(relationship, role, sent, rules))
}
