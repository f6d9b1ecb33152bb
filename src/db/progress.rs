use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
#[cfg(test)]
use rusqlite::OptionalExtension;

use super::models::*;
use super::Database;
use crate::progression::levels;

impl Database {
    // ── Levels ────────────────────────────────────────────────────────────────

    /// Level record for a user, created at level 1 if missing
    pub fn get_or_create_level(&self, user_id: i64) -> Result<UserLevel> {
        let conn = self.lock()?;
        Ok(load_level(&conn, user_id)?)
    }

    /// Credit XP and coins in one transaction: read, level-up and write happen
    /// under a single lock, and the XP log row commits with the level row.
    pub fn award_xp(&self, user_id: i64, reward: &Reward) -> Result<Credited> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let credited = credit(&tx, user_id, reward)?;
        tx.commit()?;
        Ok(credited)
    }

    /// Sum of XP logged for a user
    #[cfg(test)]
    pub fn xp_logged(&self, user_id: i64) -> Result<u64> {
        let conn = self.lock()?;
        let total: u64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM xp_transactions WHERE user_id=?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    // ── Achievement progress ──────────────────────────────────────────────────

    pub fn list_achievement_progress(&self, user_id: i64) -> Result<Vec<AchievementProgress>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, achievement_id, progress, unlocked, unlocked_at
             FROM achievement_progress WHERE user_id=?1 ORDER BY achievement_id ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], map_progress)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    #[cfg(test)]
    pub fn get_achievement_progress(&self, user_id: i64, achievement_id: usize) -> Result<Option<AchievementProgress>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT user_id, achievement_id, progress, unlocked, unlocked_at
                 FROM achievement_progress WHERE user_id=?1 AND achievement_id=?2",
                params![user_id, achievement_id as i64],
                map_progress,
            )
            .optional()?;
        Ok(row)
    }

    /// Raise progress towards a locked achievement. Progress never decreases and
    /// unlocked rows are not touched.
    pub fn raise_achievement_progress(&self, user_id: i64, achievement_id: usize, progress: f64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO achievement_progress (user_id, achievement_id, progress, unlocked)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(user_id, achievement_id) DO UPDATE SET
                progress = MAX(progress, excluded.progress)
             WHERE unlocked = 0",
            params![user_id, achievement_id as i64, progress],
        )?;
        Ok(())
    }

    /// Unlock an achievement and credit its reward atomically. Returns `None` when it
    /// was already unlocked; nothing is written in that case.
    pub fn unlock_achievement(
        &self,
        user_id: i64,
        achievement_id: usize,
        threshold: f64,
        reward: &Reward,
    ) -> Result<Option<Credited>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO achievement_progress (user_id, achievement_id, progress, unlocked)
             VALUES (?1, ?2, 0, 0)",
            params![user_id, achievement_id as i64],
        )?;
        let changed = tx.execute(
            "UPDATE achievement_progress SET unlocked=1, unlocked_at=?3, progress=MAX(progress, ?4)
             WHERE user_id=?1 AND achievement_id=?2 AND unlocked=0",
            params![user_id, achievement_id as i64, Utc::now(), threshold],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let credited = credit(&tx, user_id, reward)?;
        tx.commit()?;
        Ok(Some(credited))
    }
}

/// XP and coins granted for one reason.
#[derive(Debug, Clone, Copy)]
pub struct Reward<'a> {
    pub xp: u64,
    pub coins: u64,
    pub reason: &'a str,
}

/// Level record after a credit, with the level it rose from if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Credited {
    pub level: UserLevel,
    pub levelled_from: Option<u32>,
}

fn load_level(conn: &Connection, user_id: i64) -> rusqlite::Result<UserLevel> {
    conn.execute(
        "INSERT OR IGNORE INTO user_levels (user_id, level, current_xp, total_xp, coins, updated_at)
         VALUES (?1, 1, 0, 0, 0, ?2)",
        params![user_id, Utc::now()],
    )?;
    conn.query_row(
        "SELECT user_id, level, current_xp, total_xp, coins FROM user_levels WHERE user_id=?1",
        params![user_id],
        |row| {
            Ok(UserLevel {
                user_id: row.get(0)?,
                level: row.get(1)?,
                current_xp: row.get(2)?,
                total_xp: row.get(3)?,
                coins: row.get(4)?,
            })
        },
    )
}

/// Read-modify-write of the level row. Callers hold the transaction.
fn credit(conn: &Connection, user_id: i64, reward: &Reward) -> rusqlite::Result<Credited> {
    let mut level = load_level(conn, user_id)?;
    level.coins = level.coins.saturating_add(reward.coins);
    let levelled_from = levels::apply_xp(&mut level, reward.xp);
    let now = Utc::now();
    conn.execute(
        "UPDATE user_levels SET level=?2, current_xp=?3, total_xp=?4, coins=?5, updated_at=?6
         WHERE user_id=?1",
        params![user_id, level.level, level.current_xp, level.total_xp, level.coins, now],
    )?;
    if reward.xp > 0 {
        conn.execute(
            "INSERT INTO xp_transactions (user_id, amount, reason, created_at) VALUES (?1,?2,?3,?4)",
            params![user_id, reward.xp, reward.reason, now],
        )?;
    }
    Ok(Credited { level, levelled_from })
}

fn map_progress(row: &rusqlite::Row) -> rusqlite::Result<AchievementProgress> {
    let id: i64 = row.get(1)?;
    Ok(AchievementProgress {
        user_id: row.get(0)?,
        achievement_id: id as usize,
        progress: row.get(2)?,
        unlocked: row.get(3)?,
        unlocked_at: row.get(4)?,
    })
}
