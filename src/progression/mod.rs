pub mod catalog;
pub mod levels;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::db::models::UserLevel;
use crate::db::progress::{Credited, Reward};
use crate::db::Database;
use crate::wagering::LedgerEvent;
use catalog::{Achievement, Rarity, Stat, CATALOG, CATALOG_VERSION};

/// Achievement unlocked during an evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unlocked {
    pub achievement_id: usize,
    pub key: &'static str,
    pub xp_reward: u64,
    pub coin_reward: u64,
}

/// Catalog entry joined with one user's progress.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    pub id: usize,
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub stat: Stat,
    pub threshold: f64,
    pub rarity: Rarity,
    pub xp_reward: u64,
    pub coin_reward: u64,
    pub progress: f64,
    pub progress_pct: f64,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementSummary {
    pub catalog_version: u32,
    pub unlocked: u32,
    pub total: u32,
    pub completion_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementsOverview {
    pub achievements: Vec<AchievementView>,
    pub summary: AchievementSummary,
}

/// Derives XP, levels and achievements from ledger events. Reads the ledger, never writes it.
#[derive(Clone)]
pub struct ProgressionEngine {
    db: Database,
}

impl ProgressionEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apply a batch of ledger events: XP for wins, then one achievement pass per user.
    pub fn observe(&self, events: &[LedgerEvent]) -> Result<Vec<(i64, Unlocked)>> {
        let mut users = BTreeSet::new();
        for event in events {
            users.insert(event.user_id());
            if let LedgerEvent::PickWon { user_id, pick_id, .. } = event {
                self.award(*user_id, levels::PICK_WON_XP, 0, &format!("pick_won:{pick_id}"))?;
            }
        }

        let mut unlocked = Vec::new();
        for user_id in users {
            for u in self.evaluate(user_id)? {
                unlocked.push((user_id, u));
            }
        }
        Ok(unlocked)
    }

    /// Recompute progress on every catalog entry for the user and unlock what is now met.
    pub fn evaluate(&self, user_id: i64) -> Result<Vec<Unlocked>> {
        let Some(ledger) = self.db.get_ledger(user_id)? else {
            debug!(user_id, "no ledger yet, skipping achievement pass");
            return Ok(Vec::new());
        };
        let existing: HashMap<usize, bool> = self
            .db
            .list_achievement_progress(user_id)?
            .into_iter()
            .map(|p| (p.achievement_id, p.unlocked))
            .collect();

        let mut unlocked = Vec::new();
        for achievement in CATALOG.iter() {
            if existing.get(&achievement.id).copied().unwrap_or(false) {
                continue;
            }
            let progress = achievement.criterion.progress(&ledger);
            self.db.raise_achievement_progress(user_id, achievement.id, progress)?;

            if !achievement.criterion.is_met(&ledger) {
                continue;
            }
            let reason = format!("achievement:{}", achievement.key);
            let reward = Reward {
                xp: achievement.xp_reward(),
                coins: achievement.coin_reward(),
                reason: &reason,
            };
            if let Some(credited) =
                self.db
                    .unlock_achievement(user_id, achievement.id, achievement.criterion.threshold, &reward)?
            {
                info!(
                    "🏆 User {} unlocked '{}' ({:?})",
                    user_id, achievement.name, achievement.rarity
                );
                log_level_up(user_id, &credited);
                unlocked.push(unlocked_entry(achievement));
            }
        }
        Ok(unlocked)
    }

    /// Add XP and coins to a user's level record, handling level-ups.
    pub fn award(&self, user_id: i64, xp: u64, coins: u64, reason: &str) -> Result<UserLevel> {
        let credited = self.db.award_xp(user_id, &Reward { xp, coins, reason })?;
        log_level_up(user_id, &credited);
        Ok(credited.level)
    }

    pub fn achievements(&self, user_id: i64) -> Result<AchievementsOverview> {
        let progress: HashMap<usize, _> = self
            .db
            .list_achievement_progress(user_id)?
            .into_iter()
            .map(|p| (p.achievement_id, p))
            .collect();

        let achievements: Vec<AchievementView> = CATALOG
            .iter()
            .map(|a| {
                let p = progress.get(&a.id);
                let value = p.map(|p| p.progress).unwrap_or(0.0);
                let threshold = a.criterion.threshold;
                AchievementView {
                    id: a.id,
                    key: a.key,
                    name: a.name,
                    description: a.description,
                    stat: a.criterion.stat,
                    threshold,
                    rarity: a.rarity,
                    xp_reward: a.xp_reward(),
                    coin_reward: a.coin_reward(),
                    progress: value,
                    progress_pct: if threshold > 0.0 {
                        ((value / threshold * 100.0).min(100.0) * 10.0).round() / 10.0
                    } else {
                        0.0
                    },
                    unlocked: p.map(|p| p.unlocked).unwrap_or(false),
                    unlocked_at: p.and_then(|p| p.unlocked_at),
                }
            })
            .collect();

        let unlocked = achievements.iter().filter(|a| a.unlocked).count() as u32;
        let total = achievements.len() as u32;
        Ok(AchievementsOverview {
            summary: AchievementSummary {
                catalog_version: CATALOG_VERSION,
                unlocked,
                total,
                completion_pct: ((unlocked as f64 / total as f64 * 100.0) * 10.0).round() / 10.0,
            },
            achievements,
        })
    }
}

fn log_level_up(user_id: i64, credited: &Credited) {
    if let Some(from) = credited.levelled_from {
        info!("⬆️ User {} levelled up: {} → {}", user_id, from, credited.level.level);
    }
}

fn unlocked_entry(a: &Achievement) -> Unlocked {
    Unlocked {
        achievement_id: a.id,
        key: a.key,
        xp_reward: a.xp_reward(),
        coin_reward: a.coin_reward(),
    }
}
