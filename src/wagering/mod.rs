pub mod payout;
pub mod settlement;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::db::ledger::NewPick;
use crate::db::models::{BettingLedger, UserLevel};
use crate::db::Database;
use crate::error::{WagerError, WagerResult};
use crate::progression::ProgressionEngine;
pub use payout::StakePolicy;
pub use settlement::SettlementReport;

/// Ledger change observed by the progression engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    StakePlaced { user_id: i64, pick_id: i64, stake: f64 },
    PickWon { user_id: i64, pick_id: i64, payout: f64, confidence: u8 },
    PickLost { user_id: i64, pick_id: i64 },
    StreakChanged { user_id: i64, streak: u32 },
}

impl LedgerEvent {
    pub fn user_id(&self) -> i64 {
        match self {
            LedgerEvent::StakePlaced { user_id, .. }
            | LedgerEvent::PickWon { user_id, .. }
            | LedgerEvent::PickLost { user_id, .. }
            | LedgerEvent::StreakChanged { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickRequest {
    pub user_id: i64,
    pub prediction_id: i64,
    pub stake: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementReceipt {
    pub pick_id: i64,
    pub new_bankroll: f64,
    pub potential_return: f64,
}

/// Snapshot of a user's standing.
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub bankroll: f64,
    pub starting_bankroll: f64,
    pub net_profit: f64,
    pub roi: f64,
    pub win_rate: f64,
    pub total_picks: u32,
    pub settled_picks: u32,
    pub won_picks: u32,
    pub lost_picks: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    /// Wins over the last ten settled picks
    pub recent_wins: u32,
    pub recent_settled: u32,
    pub level: u32,
    pub current_xp: u64,
    pub xp_to_next_level: u64,
    pub total_xp: u64,
    pub coins: u64,
    pub achievements_unlocked: u32,
}

/// Placement and settlement front door. Owns bankroll and pick state; forwards every
/// ledger change to the progression engine.
#[derive(Clone)]
pub struct WagerService {
    db: Database,
    policy: StakePolicy,
    starting_bankroll: f64,
    progression: ProgressionEngine,
}

impl WagerService {
    pub fn new(db: Database, policy: StakePolicy, starting_bankroll: f64) -> Self {
        let progression = ProgressionEngine::new(db.clone());
        Self {
            db,
            policy,
            starting_bankroll,
            progression,
        }
    }

    pub fn progression(&self) -> &ProgressionEngine {
        &self.progression
    }

    /// Open the user's ledger with the configured starting bankroll (no-op if it exists).
    pub fn open_ledger(&self, user_id: i64) -> Result<BettingLedger> {
        let ledger = self.db.open_ledger(user_id, self.starting_bankroll)?;
        info!("Ledger ready for user {} (bankroll {:.2})", user_id, ledger.current_bankroll);
        Ok(ledger)
    }

    pub fn place_pick(&self, req: &PickRequest) -> WagerResult<PlacementReceipt> {
        if let Err(e) = self.policy.validate(req.stake) {
            warn!(user_id = req.user_id, "Pick rejected: {}", e);
            return Err(e);
        }

        let placed = self
            .db
            .place_pick(
                &NewPick {
                    user_id: req.user_id,
                    prediction_id: req.prediction_id,
                    stake: req.stake,
                    notes: req.notes.clone(),
                },
                payout::potential_return,
            )
            .inspect_err(|e| match e {
                WagerError::Storage(err) => error!(user_id = req.user_id, "Pick placement failed: {:#}", err),
                other => warn!(user_id = req.user_id, "Pick rejected: {}", other),
            })?;

        info!(
            "Pick {} placed: user {} staked {:.2} on match {} (bankroll {:.2})",
            placed.pick_id, req.user_id, req.stake, placed.match_id, placed.new_bankroll
        );
        self.notify(&[LedgerEvent::StakePlaced {
            user_id: req.user_id,
            pick_id: placed.pick_id,
            stake: req.stake,
        }]);

        Ok(PlacementReceipt {
            pick_id: placed.pick_id,
            new_bankroll: placed.new_bankroll,
            potential_return: placed.potential_return,
        })
    }

    pub fn settle_match(&self, match_id: i64) -> WagerResult<SettlementReport> {
        let (report, events) = settlement::settle_match(&self.db, match_id)?;
        self.notify(&events);
        Ok(report)
    }

    /// Progression failures never undo a committed ledger change.
    fn notify(&self, events: &[LedgerEvent]) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.progression.observe(events) {
            error!("Progression update failed: {:#}", e);
        }
    }

    pub fn stats(&self, user_id: i64) -> WagerResult<UserStats> {
        let ledger = self.db.get_ledger(user_id)?.ok_or(WagerError::UserNotFound(user_id))?;
        let level: UserLevel = self.db.get_or_create_level(user_id)?;
        let (recent_wins, recent_settled) = self.db.recent_form(user_id, 10)?;
        let achievements_unlocked = self
            .db
            .list_achievement_progress(user_id)?
            .iter()
            .filter(|p| p.unlocked)
            .count() as u32;

        Ok(UserStats {
            user_id,
            bankroll: ledger.current_bankroll,
            starting_bankroll: ledger.starting_bankroll,
            net_profit: ledger.net_profit,
            roi: ledger.roi,
            win_rate: ledger.win_rate,
            total_picks: ledger.total_picks,
            settled_picks: ledger.settled_picks,
            won_picks: ledger.won_picks,
            lost_picks: ledger.lost_picks,
            current_streak: ledger.current_win_streak,
            best_streak: ledger.best_win_streak,
            recent_wins,
            recent_settled,
            level: level.level,
            current_xp: level.current_xp,
            xp_to_next_level: crate::progression::levels::xp_to_advance(level.level),
            total_xp: level.total_xp,
            coins: level.coins,
            achievements_unlocked,
        })
    }
}
