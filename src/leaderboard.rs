use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::{round_cents, SettledPick};
use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    #[default]
    Weekly,
    Monthly,
    AllTime,
}

impl Period {
    /// Earliest settlement time included in the window, `None` for all time.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Daily => now.date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc()),
            Period::Weekly => Some(now - Duration::days(7)),
            Period::Monthly => Some(now - Duration::days(30)),
            Period::AllTime => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Profit,
    WinRate,
    Roi,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: i64,
    pub profit: f64,
    pub win_rate: f64,
    pub roi: f64,
    /// Trailing run of wins inside the window
    pub streak: u32,
    pub picks: u32,
    pub wins: u32,
}

impl LeaderboardEntry {
    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Profit => self.profit,
            Metric::WinRate => self.win_rate,
            Metric::Roi => self.roi,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    staked: f64,
    returned: f64,
    picks: u32,
    wins: u32,
    streak: u32,
}

/// Rank users over settled picks (oldest first). Sorted by `metric` descending with ties
/// broken by ascending user id; `limit` applies after ranking.
pub fn rank(picks: &[SettledPick], metric: Metric, min_picks: u32, limit: usize) -> Vec<LeaderboardEntry> {
    let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
    for p in picks {
        let t = tallies.entry(p.user_id).or_default();
        t.staked += p.stake;
        t.returned += p.payout;
        t.picks += 1;
        if p.won {
            t.wins += 1;
            t.streak += 1;
        } else {
            t.streak = 0;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = tallies
        .into_iter()
        .filter(|(_, t)| t.picks >= min_picks.max(1))
        .map(|(user_id, t)| {
            let profit = round_cents(t.returned - t.staked);
            LeaderboardEntry {
                rank: 0,
                user_id,
                profit,
                win_rate: round_cents(t.wins as f64 / t.picks as f64 * 100.0),
                roi: if t.staked > 0.0 {
                    round_cents(profit / t.staked * 100.0)
                } else {
                    0.0
                },
                streak: t.streak,
                picks: t.picks,
                wins: t.wins,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.metric(metric)
            .total_cmp(&a.metric(metric))
            .then(a.user_id.cmp(&b.user_id))
    });
    entries.truncate(limit);
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i as u32 + 1;
    }
    entries
}

/// Leaderboard for a window ending at `now`.
pub fn leaderboard(
    db: &Database,
    period: Period,
    metric: Metric,
    limit: usize,
    min_picks: u32,
    now: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>> {
    let picks = db.settled_picks_since(period.window_start(now))?;
    Ok(rank(&picks, metric, min_picks, limit))
}
