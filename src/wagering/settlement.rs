use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::LedgerEvent;
use crate::db::Database;
use crate::error::{WagerError, WagerResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub match_id: i64,
    pub resolved: u32,
    pub won: u32,
    pub lost: u32,
    /// Picks found already settled when their update ran
    pub skipped: u32,
}

/// Settle every pending pick on a finished match and describe what changed.
///
/// Running this again for the same match resolves nothing and credits nothing.
pub fn settle_match(db: &Database, match_id: i64) -> WagerResult<(SettlementReport, Vec<LedgerEvent>)> {
    let m = db.get_match(match_id)?.ok_or(WagerError::MatchNotFound(match_id))?;
    let outcome = m.result().ok_or(WagerError::MatchNotFinished(match_id))?;

    let batch = db.settle_match_picks(match_id, outcome)?;
    let mut report = SettlementReport {
        match_id,
        skipped: batch.skipped,
        ..Default::default()
    };
    let mut events = Vec::with_capacity(batch.resolved.len() * 2);

    for pick in &batch.resolved {
        report.resolved += 1;
        if pick.won {
            report.won += 1;
            events.push(LedgerEvent::PickWon {
                user_id: pick.user_id,
                pick_id: pick.pick_id,
                payout: pick.payout,
                confidence: pick.confidence,
            });
        } else {
            report.lost += 1;
            events.push(LedgerEvent::PickLost {
                user_id: pick.user_id,
                pick_id: pick.pick_id,
            });
        }
        events.push(LedgerEvent::StreakChanged {
            user_id: pick.user_id,
            streak: pick.win_streak,
        });
    }

    if report.resolved == 0 {
        debug!(match_id, skipped = report.skipped, "no pending picks to settle");
    } else {
        info!(
            "Settled match {} ({}): {} picks, {} won, {} lost",
            match_id,
            outcome.as_str(),
            report.resolved,
            report.won,
            report.lost
        );
    }
    if report.skipped > 0 {
        debug!(match_id, skipped = report.skipped, "picks already settled, skipped");
    }
    Ok((report, events))
}
