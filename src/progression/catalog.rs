use serde::{Deserialize, Serialize};

use crate::db::models::BettingLedger;

/// Bumped whenever entries are added or thresholds change. Ids are never reused.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Ledger statistic an achievement is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    TotalPicks,
    WonPicks,
    WinStreak,
    NetProfit,
    WinRate,
    Roi,
    HighConfidenceWins,
}

impl Stat {
    pub fn read(&self, ledger: &BettingLedger) -> f64 {
        match self {
            Stat::TotalPicks => ledger.total_picks as f64,
            Stat::WonPicks => ledger.won_picks as f64,
            Stat::WinStreak => ledger.current_win_streak as f64,
            Stat::NetProfit => ledger.net_profit,
            Stat::WinRate => ledger.win_rate,
            Stat::Roi => ledger.roi,
            Stat::HighConfidenceWins => ledger.high_confidence_wins as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Criterion {
    pub stat: Stat,
    pub threshold: f64,
    /// Settled picks required before the stat counts at all
    pub min_settled: u32,
}

impl Criterion {
    /// Progress for the ledger as it stands, clamped to `[0, threshold]`.
    pub fn progress(&self, ledger: &BettingLedger) -> f64 {
        if ledger.settled_picks < self.min_settled {
            return 0.0;
        }
        self.stat.read(ledger).clamp(0.0, self.threshold)
    }

    pub fn is_met(&self, ledger: &BettingLedger) -> bool {
        ledger.settled_picks >= self.min_settled && self.stat.read(ledger) >= self.threshold
    }
}

impl Rarity {
    pub fn xp_reward(&self) -> u64 {
        match self {
            Rarity::Common => 50,
            Rarity::Rare => 150,
            Rarity::Epic => 300,
            Rarity::Legendary => 750,
        }
    }

    pub fn coin_reward(&self) -> u64 {
        match self {
            Rarity::Common => 100,
            Rarity::Rare => 250,
            Rarity::Epic => 500,
            Rarity::Legendary => 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Achievement {
    pub id: usize,
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub criterion: Criterion,
    pub rarity: Rarity,
}

impl Achievement {
    pub fn xp_reward(&self) -> u64 {
        self.rarity.xp_reward()
    }

    pub fn coin_reward(&self) -> u64 {
        self.rarity.coin_reward()
    }
}

macro_rules! achievement {
    ($id:expr, $key:expr, $name:expr, $desc:expr, $stat:ident >= $threshold:expr, min_settled $min:expr, $rarity:ident) => {
        Achievement {
            id: $id,
            key: $key,
            name: $name,
            description: $desc,
            criterion: Criterion {
                stat: Stat::$stat,
                threshold: $threshold,
                min_settled: $min,
            },
            rarity: Rarity::$rarity,
        }
    };
}

/// Static achievement table, indexed by achievement id.
#[rustfmt::skip]
pub static CATALOG: [Achievement; 13] = [
    achievement!(0, "first_pick", "First Pick", "Place your first pick", TotalPicks >= 1.0, min_settled 0, Common),
    achievement!(1, "regular", "Regular", "Place 25 picks", TotalPicks >= 25.0, min_settled 0, Common),
    achievement!(2, "centurion", "Centurion", "Place 100 picks", TotalPicks >= 100.0, min_settled 0, Rare),
    achievement!(3, "first_win", "First Win", "Win your first pick", WonPicks >= 1.0, min_settled 0, Common),
    achievement!(4, "ten_wins", "Ten Wins", "Win 10 picks", WonPicks >= 10.0, min_settled 0, Rare),
    achievement!(5, "fifty_wins", "Fifty Wins", "Win 50 picks", WonPicks >= 50.0, min_settled 0, Epic),
    achievement!(6, "hot_streak", "Hot Streak", "Win 3 picks in a row", WinStreak >= 3.0, min_settled 0, Rare),
    achievement!(7, "unstoppable", "Unstoppable", "Win 10 picks in a row", WinStreak >= 10.0, min_settled 0, Legendary),
    achievement!(8, "in_profit", "In Profit", "Reach 500 net profit", NetProfit >= 500.0, min_settled 0, Rare),
    achievement!(9, "high_roller", "High Roller", "Reach 10,000 net profit", NetProfit >= 10_000.0, min_settled 0, Legendary),
    achievement!(10, "sharp", "Sharp", "Hold a 60% win rate over at least 20 settled picks", WinRate >= 60.0, min_settled 20, Epic),
    achievement!(11, "master_bettor", "Master Bettor", "Hold a 20% ROI over at least 50 settled picks", Roi >= 20.0, min_settled 50, Legendary),
    achievement!(12, "confident_caller", "Confident Caller", "Win 10 picks placed at 80%+ confidence", HighConfidenceWins >= 10.0, min_settled 0, Epic),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_positions_and_keys_are_unique() {
        for (i, a) in CATALOG.iter().enumerate() {
            assert_eq!(a.id, i, "achievement {} is out of place", a.key);
        }
        let mut keys: Vec<_> = CATALOG.iter().map(|a| a.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), CATALOG.len());
    }

    #[test]
    fn test_progress_clamps_to_threshold() {
        let mut ledger = BettingLedger::opened(1, 1000.0);
        ledger.total_picks = 40;
        let regular = &CATALOG[1].criterion;
        assert_eq!(regular.progress(&ledger), 25.0);
        assert!(regular.is_met(&ledger));
        let centurion = &CATALOG[2].criterion;
        assert_eq!(centurion.progress(&ledger), 40.0);
        assert!(!centurion.is_met(&ledger));
    }

    #[test]
    fn test_rate_criteria_need_minimum_sample() {
        let mut ledger = BettingLedger::opened(1, 1000.0);
        ledger.settled_picks = 5;
        ledger.won_picks = 5;
        ledger.refresh_derived();
        let sharp = &CATALOG[10].criterion;
        assert_eq!(sharp.progress(&ledger), 0.0);
        assert!(!sharp.is_met(&ledger));

        ledger.settled_picks = 20;
        ledger.won_picks = 13;
        ledger.refresh_derived();
        assert!(sharp.is_met(&ledger));
    }

    #[test]
    fn test_negative_profit_counts_as_zero_progress() {
        let mut ledger = BettingLedger::opened(1, 1000.0);
        ledger.total_staked = 300.0;
        ledger.refresh_derived();
        assert_eq!(CATALOG[8].criterion.progress(&ledger), 0.0);
    }
}
