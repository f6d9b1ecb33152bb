use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::models::*;
use super::Database;
use crate::error::{WagerError, WagerResult};

/// Confidence at or above which a won pick counts as a high-confidence win.
pub const HIGH_CONFIDENCE: u8 = 80;

/// Placement request after stake validation.
#[derive(Debug, Clone)]
pub struct NewPick {
    pub user_id: i64,
    pub prediction_id: i64,
    pub stake: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedPick {
    pub pick_id: i64,
    pub new_bankroll: f64,
    pub potential_return: f64,
    pub match_id: i64,
}

/// A pick that moved from pending to a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPick {
    pub pick_id: i64,
    pub user_id: i64,
    pub won: bool,
    pub payout: f64,
    pub confidence: u8,
    pub win_streak: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SettlementBatch {
    pub resolved: Vec<ResolvedPick>,
    /// Picks that were no longer pending when their update ran
    pub skipped: u32,
}

impl Database {
    // ── Ledgers ───────────────────────────────────────────────────────────────

    /// Create the user's ledger and level record if missing. Existing rows are left untouched.
    pub fn open_ledger(&self, user_id: i64, starting_bankroll: f64) -> Result<BettingLedger> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let created = tx.execute(
            "INSERT OR IGNORE INTO betting_ledgers (user_id, starting_bankroll, current_bankroll, updated_at)
             VALUES (?1, ?2, ?2, ?3)",
            params![user_id, starting_bankroll, now],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO user_levels (user_id, level, current_xp, total_xp, coins, updated_at)
             VALUES (?1, 1, 0, 0, 0, ?2)",
            params![user_id, now],
        )?;
        if created == 1 {
            insert_history(&tx, user_id, starting_bankroll, starting_bankroll, "ledger_opened", None)?;
        }
        let ledger = load_ledger(&tx, user_id)?
            .ok_or_else(|| anyhow::anyhow!("ledger for user {user_id} vanished after insert"))?;
        tx.commit()?;
        Ok(ledger)
    }

    pub fn get_ledger(&self, user_id: i64) -> Result<Option<BettingLedger>> {
        let conn = self.lock()?;
        Ok(load_ledger(&conn, user_id)?)
    }

    // ── Placement ─────────────────────────────────────────────────────────────

    /// Debit the stake and record a pending pick in one transaction.
    ///
    /// The debit is a conditional update on the ledger row; when the balance does not
    /// cover the stake nothing is written and `InsufficientFunds` is returned.
    /// `returns` maps (stake, confidence) to the amount credited if the pick wins.
    pub fn place_pick(&self, req: &NewPick, returns: impl Fn(f64, u8) -> f64) -> WagerResult<PlacedPick> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let (match_id, predicted, confidence): (i64, Outcome, u8) = tx
            .query_row(
                "SELECT match_id, predicted_winner, confidence FROM predictions WHERE id=?1",
                params![req.prediction_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or(WagerError::PredictionNotFound(req.prediction_id))?;

        let (status, kickoff): (MatchStatus, DateTime<Utc>) = tx
            .query_row(
                "SELECT status, kickoff FROM matches WHERE id=?1",
                params![match_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or(WagerError::MatchNotFound(match_id))?;
        if status != MatchStatus::NotStarted || kickoff <= now {
            return Err(WagerError::MatchAlreadyStarted(match_id));
        }

        let available: f64 = tx
            .query_row(
                "SELECT current_bankroll FROM betting_ledgers WHERE user_id=?1",
                params![req.user_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or(WagerError::UserNotFound(req.user_id))?;

        let duplicate: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM picks WHERE user_id=?1 AND prediction_id=?2)",
            params![req.user_id, req.prediction_id],
            |r| r.get(0),
        )?;
        if duplicate {
            return Err(WagerError::DuplicatePick {
                prediction_id: req.prediction_id,
            });
        }

        let debited = tx.execute(
            "UPDATE betting_ledgers
             SET current_bankroll = ROUND(current_bankroll - ?1, 2), updated_at = ?3
             WHERE user_id = ?2 AND current_bankroll >= ?1",
            params![req.stake, req.user_id, now],
        )?;
        if debited == 0 {
            return Err(WagerError::InsufficientFunds {
                available,
                requested: req.stake,
            });
        }

        let potential_return = returns(req.stake, confidence);
        tx.execute(
            "INSERT INTO picks (user_id, prediction_id, match_id, stake, predicted_outcome,
                                confidence_at_placement, potential_return, notes, status, placed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,'pending',?9)",
            params![
                req.user_id,
                req.prediction_id,
                match_id,
                req.stake,
                predicted,
                confidence,
                potential_return,
                req.notes,
                now,
            ],
        )?;
        let pick_id = tx.last_insert_rowid();

        let mut ledger = load_ledger(&tx, req.user_id)?.ok_or(WagerError::UserNotFound(req.user_id))?;
        ledger.total_staked = round_cents(ledger.total_staked + req.stake);
        ledger.total_picks += 1;
        ledger.refresh_derived();
        write_ledger(&tx, &ledger, now)?;
        insert_history(&tx, req.user_id, -req.stake, ledger.current_bankroll, "pick_placed", Some(pick_id))?;

        tx.commit()?;
        Ok(PlacedPick {
            pick_id,
            new_bankroll: ledger.current_bankroll,
            potential_return,
            match_id,
        })
    }

    // ── Settlement ────────────────────────────────────────────────────────────

    /// Resolve every pending pick on a match against its final outcome.
    ///
    /// Each pick moves out of `pending` through a conditional update, so a pick that was
    /// already settled is never credited twice.
    pub fn settle_match_picks(&self, match_id: i64, outcome: Outcome) -> Result<SettlementBatch> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let pending: Vec<(i64, i64, Outcome, u8, f64)> = {
            let mut stmt = tx.prepare(
                "SELECT id, user_id, predicted_outcome, confidence_at_placement, potential_return
                 FROM picks WHERE match_id=?1 AND status='pending' ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![match_id], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut batch = SettlementBatch::default();
        for (pick_id, user_id, predicted, confidence, potential_return) in pending {
            let won = predicted == outcome;
            let payout = if won { potential_return } else { 0.0 };
            let updated = tx.execute(
                "UPDATE picks SET status=?1, payout=?2, settled_at=?3 WHERE id=?4 AND status='pending'",
                params![if won { "won" } else { "lost" }, payout, now, pick_id],
            )?;
            if updated == 0 {
                batch.skipped += 1;
                continue;
            }

            let mut ledger = load_ledger(&tx, user_id)?
                .ok_or_else(|| anyhow::anyhow!("pick {pick_id} references missing ledger {user_id}"))?;
            ledger.settled_picks += 1;
            if won {
                ledger.won_picks += 1;
                ledger.current_win_streak += 1;
                ledger.best_win_streak = ledger.best_win_streak.max(ledger.current_win_streak);
                if confidence >= HIGH_CONFIDENCE {
                    ledger.high_confidence_wins += 1;
                }
                ledger.total_payouts = round_cents(ledger.total_payouts + payout);
                ledger.current_bankroll = round_cents(ledger.current_bankroll + payout);
            } else {
                ledger.lost_picks += 1;
                ledger.current_win_streak = 0;
            }
            ledger.refresh_derived();
            write_ledger(&tx, &ledger, now)?;
            if won {
                insert_history(&tx, user_id, payout, ledger.current_bankroll, "pick_won", Some(pick_id))?;
            }

            batch.resolved.push(ResolvedPick {
                pick_id,
                user_id,
                won,
                payout,
                confidence,
                win_streak: ledger.current_win_streak,
            });
        }

        tx.commit()?;
        Ok(batch)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// A user's picks, newest first. Returns the page and whether more rows follow.
    pub fn list_picks(&self, user_id: i64, status: Option<&str>, limit: i64, offset: i64) -> Result<(Vec<Pick>, bool)> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PICK_COLUMNS} FROM picks
             WHERE user_id=?1 AND (?2 IS NULL OR status=?2)
             ORDER BY placed_at DESC, id DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let mut picks = stmt
            .query_map(params![user_id, status, limit + 1, offset], map_pick)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let has_more = picks.len() as i64 > limit;
        picks.truncate(limit.max(0) as usize);
        Ok((picks, has_more))
    }

    pub fn get_pick(&self, id: i64) -> Result<Option<Pick>> {
        let conn = self.lock()?;
        let pick = conn
            .query_row(
                &format!("SELECT {PICK_COLUMNS} FROM picks WHERE id=?1"),
                params![id],
                map_pick,
            )
            .optional()?;
        Ok(pick)
    }

    /// Bankroll journal, newest first
    pub fn bankroll_history(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<BankrollEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, delta, balance_after, reason, pick_id, created_at
             FROM bankroll_history WHERE user_id=?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit, offset], |row| {
                Ok(BankrollEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    delta: row.get(2)?,
                    balance_after: row.get(3)?,
                    reason: row.get(4)?,
                    pick_id: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Wins and total over the user's last `n` settled picks
    pub fn recent_form(&self, user_id: i64, n: i64) -> Result<(u32, u32)> {
        let conn = self.lock()?;
        let (wins, total): (u32, u32) = conn.query_row(
            "SELECT COALESCE(SUM(status='won'), 0), COUNT(*) FROM (
                SELECT status FROM picks WHERE user_id=?1 AND status != 'pending'
                ORDER BY settled_at DESC, id DESC LIMIT ?2
             )",
            params![user_id, n],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((wins, total))
    }

    /// Settled picks at or after `since` (all of them when `None`), oldest first
    pub fn settled_picks_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SettledPick>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, stake, COALESCE(payout, 0), status, settled_at FROM picks
             WHERE status IN ('won','lost') AND (?1 IS NULL OR settled_at >= ?1)
             ORDER BY settled_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                let status: String = row.get(4)?;
                Ok(SettledPick {
                    pick_id: row.get(0)?,
                    user_id: row.get(1)?,
                    stake: row.get(2)?,
                    payout: row.get(3)?,
                    won: status == "won",
                    settled_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const LEDGER_COLUMNS: &str = "user_id, starting_bankroll, current_bankroll, total_staked, total_payouts,
    net_profit, win_rate, roi, total_picks, settled_picks, won_picks, lost_picks,
    current_win_streak, best_win_streak, high_confidence_wins, updated_at";

const PICK_COLUMNS: &str = "id, user_id, prediction_id, match_id, stake, predicted_outcome,
    confidence_at_placement, potential_return, notes, status, payout, placed_at, settled_at";

fn load_ledger(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<BettingLedger>> {
    conn.query_row(
        &format!("SELECT {LEDGER_COLUMNS} FROM betting_ledgers WHERE user_id=?1"),
        params![user_id],
        |row| {
            Ok(BettingLedger {
                user_id: row.get(0)?,
                starting_bankroll: row.get(1)?,
                current_bankroll: row.get(2)?,
                total_staked: row.get(3)?,
                total_payouts: row.get(4)?,
                net_profit: row.get(5)?,
                win_rate: row.get(6)?,
                roi: row.get(7)?,
                total_picks: row.get(8)?,
                settled_picks: row.get(9)?,
                won_picks: row.get(10)?,
                lost_picks: row.get(11)?,
                current_win_streak: row.get(12)?,
                best_win_streak: row.get(13)?,
                high_confidence_wins: row.get(14)?,
                updated_at: row.get(15)?,
            })
        },
    )
    .optional()
}

fn write_ledger(conn: &Connection, l: &BettingLedger, now: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE betting_ledgers SET
            current_bankroll=?2, total_staked=?3, total_payouts=?4, net_profit=?5,
            win_rate=?6, roi=?7, total_picks=?8, settled_picks=?9, won_picks=?10,
            lost_picks=?11, current_win_streak=?12, best_win_streak=?13,
            high_confidence_wins=?14, updated_at=?15
         WHERE user_id=?1",
        params![
            l.user_id,
            l.current_bankroll,
            l.total_staked,
            l.total_payouts,
            l.net_profit,
            l.win_rate,
            l.roi,
            l.total_picks,
            l.settled_picks,
            l.won_picks,
            l.lost_picks,
            l.current_win_streak,
            l.best_win_streak,
            l.high_confidence_wins,
            now,
        ],
    )?;
    Ok(())
}

fn insert_history(
    conn: &Connection,
    user_id: i64,
    delta: f64,
    balance_after: f64,
    reason: &str,
    pick_id: Option<i64>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO bankroll_history (user_id, delta, balance_after, reason, pick_id, created_at)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![user_id, delta, balance_after, reason, pick_id, Utc::now()],
    )?;
    Ok(())
}

fn map_pick(row: &rusqlite::Row) -> rusqlite::Result<Pick> {
    let label: String = row.get(9)?;
    let payout: Option<f64> = row.get(10)?;
    let settled_at: Option<DateTime<Utc>> = row.get(12)?;
    let status = match (label.as_str(), settled_at) {
        ("won", Some(settled_at)) => PickStatus::Won {
            payout: payout.unwrap_or(0.0),
            settled_at,
        },
        ("lost", Some(settled_at)) => PickStatus::Lost { settled_at },
        ("pending", _) => PickStatus::Pending,
        (other, _) => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                format!("inconsistent pick status {other:?}").into(),
            ))
        }
    };
    Ok(Pick {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prediction_id: row.get(2)?,
        match_id: row.get(3)?,
        stake: row.get(4)?,
        predicted_outcome: row.get(5)?,
        confidence_at_placement: row.get(6)?,
        potential_return: row.get(7)?,
        notes: row.get(8)?,
        placed_at: row.get(11)?,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use approx::assert_relative_eq;

    fn flat(stake: f64, _: u8) -> f64 {
        stake * 1.5
    }

    fn seeded() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.upsert_match(&upcoming(1, 10, 20)).unwrap();
        let pid = db.upsert_prediction(&prediction(1, Outcome::Home, 90)).unwrap();
        db.open_ledger(7, 1000.0).unwrap();
        (db, pid)
    }

    fn req(user_id: i64, prediction_id: i64, stake: f64) -> NewPick {
        NewPick {
            user_id,
            prediction_id,
            stake,
            notes: None,
        }
    }

    fn finish(db: &Database, home: i32, away: i32) {
        let mut m = db.get_match(1).unwrap().unwrap();
        m.status = MatchStatus::Finished;
        m.home_score = Some(home);
        m.away_score = Some(away);
        db.upsert_match(&m).unwrap();
    }

    #[test]
    fn test_concurrent_placements_never_overdraw() {
        let (db, first) = seeded();
        let mut pids = vec![first];
        for id in 2..=10 {
            db.upsert_match(&upcoming(id, 10 + id, 20 + id)).unwrap();
            pids.push(db.upsert_prediction(&prediction(id, Outcome::Home, 90)).unwrap());
        }

        let handles: Vec<_> = pids
            .into_iter()
            .map(|pid| {
                let db = db.clone();
                std::thread::spawn(move || db.place_pick(&req(7, pid, 150.0), flat))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(WagerError::InsufficientFunds { .. })))
            .count();
        assert_eq!((accepted, short), (6, 4));

        let ledger = db.get_ledger(7).unwrap().unwrap();
        assert_relative_eq!(ledger.current_bankroll, 100.0);
        assert_relative_eq!(ledger.total_staked, 900.0);
        assert_eq!(ledger.total_picks, 6);
        assert_eq!(db.list_picks(7, Some("pending"), 50, 0).unwrap().0.len(), 6);
        // opening entry plus one per accepted stake
        assert_eq!(db.bankroll_history(7, 100, 0).unwrap().len(), 7);
    }

    #[test]
    fn test_open_ledger_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.open_ledger(1, 1000.0).unwrap();
        let again = db.open_ledger(1, 5000.0).unwrap();
        assert_eq!(again.starting_bankroll, 1000.0);
        assert_eq!(db.bankroll_history(1, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_place_pick_debits_and_records_pending() {
        let (db, pid) = seeded();
        let placed = db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        assert_relative_eq!(placed.new_bankroll, 900.0);
        assert_relative_eq!(placed.potential_return, 150.0);

        let pick = db.get_pick(placed.pick_id).unwrap().unwrap();
        assert_eq!(pick.status, PickStatus::Pending);
        assert_eq!(pick.predicted_outcome, Outcome::Home);
        assert_eq!(pick.confidence_at_placement, 90);

        let ledger = db.get_ledger(7).unwrap().unwrap();
        assert_relative_eq!(ledger.total_staked, 100.0);
        assert_relative_eq!(ledger.net_profit, -100.0);
        assert_eq!(ledger.total_picks, 1);
    }

    #[test]
    fn test_stake_above_bankroll_leaves_ledger_unchanged() {
        let (db, pid) = seeded();
        let err = db.place_pick(&req(7, pid, 1000.01), flat).unwrap_err();
        match err {
            WagerError::InsufficientFunds { available, requested } => {
                assert_relative_eq!(available, 1000.0);
                assert_relative_eq!(requested, 1000.01);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let ledger = db.get_ledger(7).unwrap().unwrap();
        assert_relative_eq!(ledger.current_bankroll, 1000.0);
        assert_eq!(ledger.total_picks, 0);
        assert!(db.list_picks(7, None, 10, 0).unwrap().0.is_empty());
    }

    #[test]
    fn test_exact_bankroll_stake_is_accepted() {
        let (db, pid) = seeded();
        let placed = db.place_pick(&req(7, pid, 1000.0), flat).unwrap();
        assert_relative_eq!(placed.new_bankroll, 0.0);
    }

    #[test]
    fn test_duplicate_pick_rejected() {
        let (db, pid) = seeded();
        db.place_pick(&req(7, pid, 10.0), flat).unwrap();
        let err = db.place_pick(&req(7, pid, 10.0), flat).unwrap_err();
        assert!(matches!(err, WagerError::DuplicatePick { prediction_id } if prediction_id == pid));
        assert_relative_eq!(db.get_ledger(7).unwrap().unwrap().current_bankroll, 990.0);
    }

    #[test]
    fn test_started_match_and_unknown_ids_rejected() {
        let (db, pid) = seeded();
        assert!(matches!(
            db.place_pick(&req(99, pid, 10.0), flat).unwrap_err(),
            WagerError::UserNotFound(99)
        ));
        assert!(matches!(
            db.place_pick(&req(7, 404, 10.0), flat).unwrap_err(),
            WagerError::PredictionNotFound(404)
        ));

        let mut m = db.get_match(1).unwrap().unwrap();
        m.status = MatchStatus::Live;
        db.upsert_match(&m).unwrap();
        assert!(matches!(
            db.place_pick(&req(7, pid, 10.0), flat).unwrap_err(),
            WagerError::MatchAlreadyStarted(1)
        ));
    }

    #[test]
    fn test_winning_settlement_credits_payout() {
        let (db, pid) = seeded();
        let placed = db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        finish(&db, 2, 0);

        let batch = db.settle_match_picks(1, Outcome::Home).unwrap();
        assert_eq!(batch.resolved.len(), 1);
        assert!(batch.resolved[0].won);
        assert_eq!(batch.resolved[0].win_streak, 1);

        let ledger = db.get_ledger(7).unwrap().unwrap();
        assert_relative_eq!(ledger.current_bankroll, 1050.0);
        assert_relative_eq!(ledger.net_profit, 50.0);
        assert_relative_eq!(ledger.roi, 50.0);
        assert_relative_eq!(ledger.win_rate, 100.0);
        assert_eq!(ledger.high_confidence_wins, 1);

        let pick = db.get_pick(placed.pick_id).unwrap().unwrap();
        assert_eq!(pick.status.payout(), Some(150.0));
        assert!(matches!(pick.status, PickStatus::Won { .. }));
        assert_eq!(pick.profit(), Some(50.0));
    }

    #[test]
    fn test_losing_settlement_resets_streak() {
        let (db, pid) = seeded();
        db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        finish(&db, 0, 1);

        let batch = db.settle_match_picks(1, Outcome::Away).unwrap();
        assert!(!batch.resolved[0].won);
        let ledger = db.get_ledger(7).unwrap().unwrap();
        assert_relative_eq!(ledger.current_bankroll, 900.0);
        assert_eq!(ledger.lost_picks, 1);
        assert_eq!(ledger.current_win_streak, 0);
        assert_relative_eq!(ledger.roi, -100.0);
    }

    #[test]
    fn test_second_settlement_is_a_no_op() {
        let (db, pid) = seeded();
        db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        finish(&db, 3, 1);

        db.settle_match_picks(1, Outcome::Home).unwrap();
        let again = db.settle_match_picks(1, Outcome::Home).unwrap();
        assert!(again.resolved.is_empty());
        assert_relative_eq!(db.get_ledger(7).unwrap().unwrap().current_bankroll, 1050.0);
    }

    #[test]
    fn test_list_picks_paginates_and_filters() {
        let db = Database::open_in_memory().unwrap();
        db.open_ledger(7, 1000.0).unwrap();
        for id in 1..=3 {
            db.upsert_match(&upcoming(id, 10, 20 + id)).unwrap();
            let pid = db.upsert_prediction(&prediction(id, Outcome::Home, 65)).unwrap();
            db.place_pick(&req(7, pid, 10.0), flat).unwrap();
        }
        let (page, has_more) = db.list_picks(7, None, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        let (rest, has_more) = db.list_picks(7, None, 2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!has_more);
        assert!(db.list_picks(7, Some("won"), 10, 0).unwrap().0.is_empty());
    }

    #[test]
    fn test_recent_form_and_settled_listing() {
        let (db, pid) = seeded();
        db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        finish(&db, 1, 0);
        db.settle_match_picks(1, Outcome::Home).unwrap();

        assert_eq!(db.recent_form(7, 10).unwrap(), (1, 1));
        let settled = db.settled_picks_since(None).unwrap();
        assert_eq!(settled.len(), 1);
        assert!(settled[0].won);
        assert_relative_eq!(settled[0].payout, 150.0);
        let later = db.settled_picks_since(Some(Utc::now() + chrono::Duration::hours(1))).unwrap();
        assert!(later.is_empty());
    }

    #[test]
    fn test_bankroll_history_journals_debit_and_credit() {
        let (db, pid) = seeded();
        db.place_pick(&req(7, pid, 100.0), flat).unwrap();
        finish(&db, 1, 0);
        db.settle_match_picks(1, Outcome::Home).unwrap();

        let history = db.bankroll_history(7, 10, 0).unwrap();
        let reasons: Vec<&str> = history.iter().map(|h| h.reason.as_str()).collect();
        assert_eq!(reasons, vec!["pick_won", "pick_placed", "ledger_opened"]);
        assert_relative_eq!(history[0].balance_after, 1050.0);
        assert_relative_eq!(history[1].delta, -100.0);
    }
}
