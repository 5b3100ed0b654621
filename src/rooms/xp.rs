//! Time-in-room experience. While a profile has a room open it earns a fixed
//! amount of xp per tick; reaching `level * threshold` resets xp, bumps the
//! level and pays a coin bonus.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppResult, Rules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub level: i64,
    pub xp: i64,
    pub nexus_coins: i64,
    pub leveled_up: bool,
}

/// One tick of the level machine. Fires at most one level-up.
pub fn advance(level: i64, xp: i64, nexus_coins: i64, rules: &Rules) -> Progress {
    let xp = xp + rules.xp_per_tick;
    if xp >= level * rules.level_threshold {
        Progress {
            level: level + 1,
            xp: 0,
            nexus_coins: nexus_coins + rules.level_up_bonus,
            leveled_up: true,
        }
    } else {
        Progress { level, xp, nexus_coins, leveled_up: false }
    }
}

/// Applies one tick to the stored profile. `None` when the profile is gone.
pub async fn tick(db_pool: &SqlitePool, rules: &Rules, profile_id: Uuid) -> AppResult<Option<Progress>> {
    let mut tx = db_pool.begin().await?;

    let Some((level, xp, nexus_coins)): Option<(i64, i64, i64)> =
        sqlx::query_as("SELECT level,xp,nexus_coins FROM profiles WHERE id=?")
            .bind(profile_id)
            .fetch_optional(&mut *tx)
            .await?
    else {
        return Ok(None);
    };

    let progress = advance(level, xp, nexus_coins, rules);
    sqlx::query("UPDATE profiles SET level=?,xp=?,nexus_coins=? WHERE id=?")
        .bind(progress.level)
        .bind(progress.xp)
        .bind(progress.nexus_coins)
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if progress.leveled_up {
        tracing::info!(%profile_id, level = progress.level, "level up");
    }
    Ok(Some(progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, memory_pool, Profile};

    #[test]
    fn level_one_needs_seven_ticks() {
        let rules = Rules::default();
        let (mut level, mut xp, mut coins) = (1, 0, 0);
        let mut level_ups = 0;
        for tick in 1..=7 {
            let p = advance(level, xp, coins, &rules);
            (level, xp, coins) = (p.level, p.xp, p.nexus_coins);
            if p.leveled_up {
                level_ups += 1;
                assert_eq!(tick, 7);
            }
        }
        assert_eq!((level, xp, coins, level_ups), (2, 0, 500, 1));
    }

    #[test]
    fn threshold_scales_with_level() {
        let rules = Rules::default();
        assert!(!advance(3, 284, 0, &rules).leveled_up);
        let p = advance(3, 285, 0, &rules);
        assert!(p.leveled_up);
        assert_eq!((p.level, p.xp), (4, 0));
    }

    #[test]
    fn big_overshoot_still_levels_once() {
        let rules = Rules::default();
        let p = advance(1, 10_000, 7, &rules);
        assert_eq!((p.level, p.xp, p.nexus_coins), (2, 0, 507));
    }

    #[tokio::test]
    async fn ticks_persist() {
        let db_pool = memory_pool().await;
        let rules = Rules::default();
        let ana = fixtures::profile_with(&db_pool, "ana", crate::db::Role::User, 100).await;
        sqlx::query("UPDATE profiles SET xp=90 WHERE id=?").bind(ana.id).execute(&db_pool).await.unwrap();

        let p = tick(&db_pool, &rules, ana.id).await.unwrap().unwrap();
        assert!(p.leveled_up);

        let stored = Profile::by_id(&db_pool, ana.id).await.unwrap().unwrap();
        assert_eq!((stored.level, stored.xp, stored.nexus_coins), (2, 0, 600));

        let p = tick(&db_pool, &rules, ana.id).await.unwrap().unwrap();
        assert_eq!((p.level, p.xp, p.leveled_up), (2, 15, false));
    }

    #[tokio::test]
    async fn missing_profiles_stop_the_tick() {
        let db_pool = memory_pool().await;
        assert_eq!(tick(&db_pool, &Rules::default(), Uuid::now_v7()).await.unwrap(), None);
    }
}
