use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod ledger;
pub mod models;
pub mod progress;

use models::*;

/// Thread-safe SQLite handle (single connection behind a mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    /// Private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Matches ───────────────────────────────────────────────────────────────

    /// Insert or refresh a fixture from the match feed
    pub fn upsert_match(&self, m: &Match) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO matches (id, external_key, league_id, home_team_id, away_team_id,
                                  kickoff, status, home_score, away_score, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(id) DO UPDATE SET
                external_key=excluded.external_key,
                league_id=excluded.league_id,
                home_team_id=excluded.home_team_id,
                away_team_id=excluded.away_team_id,
                kickoff=excluded.kickoff,
                status=excluded.status,
                home_score=excluded.home_score,
                away_score=excluded.away_score,
                updated_at=excluded.updated_at",
            params![
                m.id,
                m.external_key,
                m.league_id,
                m.home_team_id,
                m.away_team_id,
                m.kickoff,
                m.status,
                m.home_score,
                m.away_score,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn get_match(&self, id: i64) -> Result<Option<Match>> {
        let conn = self.lock()?;
        let m = conn
            .query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id=?1"),
                params![id],
                map_match,
            )
            .optional()?;
        Ok(m)
    }

    /// Fixtures that have not kicked off yet, soonest first
    pub fn list_upcoming_matches(&self, league_ids: &[i64], limit: Option<usize>) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE status='not_started' AND kickoff >= ?1
             ORDER BY kickoff ASC, id ASC"
        ))?;
        let matches = stmt
            .query_map(params![Utc::now()], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches
            .into_iter()
            .filter(|m| league_ids.is_empty() || league_ids.contains(&m.league_id))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Finished fixtures that still have pending picks against them
    pub fn list_finished_with_pending_picks(&self) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE status='finished' AND home_score IS NOT NULL AND away_score IS NOT NULL
               AND EXISTS (SELECT 1 FROM picks p WHERE p.match_id = matches.id AND p.status='pending')
             ORDER BY kickoff ASC"
        ))?;
        let matches = stmt
            .query_map([], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Most recent finished matches of a team in a league, newest first
    pub fn recent_team_matches(
        &self,
        team_id: i64,
        league_id: i64,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE (home_team_id=?1 OR away_team_id=?1)
               AND league_id=?2 AND status='finished' AND kickoff < ?3
               AND home_score IS NOT NULL AND away_score IS NOT NULL
             ORDER BY kickoff DESC LIMIT ?4"
        ))?;
        let matches = stmt
            .query_map(params![team_id, league_id, before, limit as i64], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Most recent finished meetings between two teams (either venue), newest first
    pub fn head_to_head_matches(&self, team_a: i64, team_b: i64, before: DateTime<Utc>, limit: usize) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE ((home_team_id=?1 AND away_team_id=?2) OR (home_team_id=?2 AND away_team_id=?1))
               AND status='finished' AND kickoff < ?3
               AND home_score IS NOT NULL AND away_score IS NOT NULL
             ORDER BY kickoff DESC LIMIT ?4"
        ))?;
        let matches = stmt
            .query_map(params![team_a, team_b, before, limit as i64], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    // ── Odds ──────────────────────────────────────────────────────────────────

    pub fn upsert_odds(&self, quote: &OddsQuote) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO odds (match_id, outcome, bookmaker, odds, updated_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(match_id, outcome, bookmaker) DO UPDATE SET
                odds=excluded.odds,
                updated_at=excluded.updated_at",
            params![quote.match_id, quote.outcome, quote.bookmaker, quote.odds, quote.updated_at],
        )?;
        Ok(())
    }

    /// Highest decimal odds quoted by any bookmaker for an outcome
    pub fn best_odds(&self, match_id: i64, outcome: Outcome) -> Result<Option<f64>> {
        let conn = self.lock()?;
        let best: Option<f64> = conn.query_row(
            "SELECT MAX(odds) FROM odds WHERE match_id=?1 AND outcome=?2 AND odds > 1.0",
            params![match_id, outcome],
            |r| r.get(0),
        )?;
        Ok(best)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Insert or overwrite the prediction for (match, model version). Returns its id.
    pub fn upsert_prediction(&self, p: &Prediction) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO predictions (
                match_id, model_name, model_version, predicted_winner,
                home_win_probability, draw_probability, away_win_probability,
                predicted_home_goals, predicted_away_goals,
                over_under_25, over_under_probability, btts, btts_probability,
                confidence, risk_level, is_value_bet, value_rating,
                analysis, best_bet, generated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
             ON CONFLICT(match_id, model_version) DO UPDATE SET
                model_name=excluded.model_name,
                predicted_winner=excluded.predicted_winner,
                home_win_probability=excluded.home_win_probability,
                draw_probability=excluded.draw_probability,
                away_win_probability=excluded.away_win_probability,
                predicted_home_goals=excluded.predicted_home_goals,
                predicted_away_goals=excluded.predicted_away_goals,
                over_under_25=excluded.over_under_25,
                over_under_probability=excluded.over_under_probability,
                btts=excluded.btts,
                btts_probability=excluded.btts_probability,
                confidence=excluded.confidence,
                risk_level=excluded.risk_level,
                is_value_bet=excluded.is_value_bet,
                value_rating=excluded.value_rating,
                analysis=excluded.analysis,
                best_bet=excluded.best_bet,
                generated_at=excluded.generated_at",
            params![
                p.match_id,
                p.model_name,
                p.model_version,
                p.predicted_winner,
                p.home_win_probability,
                p.draw_probability,
                p.away_win_probability,
                p.predicted_home_goals,
                p.predicted_away_goals,
                p.over_under_25,
                p.over_under_probability,
                p.btts,
                p.btts_probability,
                p.confidence,
                p.risk_level,
                p.is_value_bet,
                p.value_rating,
                p.analysis,
                p.best_bet,
                p.generated_at,
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM predictions WHERE match_id=?1 AND model_version=?2",
            params![p.match_id, p.model_version],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn get_prediction(&self, id: i64) -> Result<Option<Prediction>> {
        let conn = self.lock()?;
        let p = conn
            .query_row(
                &format!("SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id=?1"),
                params![id],
                map_prediction,
            )
            .optional()?;
        Ok(p)
    }

    /// Predictions for matches that have not started, soonest kickoff first
    pub fn list_upcoming_predictions(&self, limit: i64) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS_P} FROM predictions p
             JOIN matches m ON m.id = p.match_id
             WHERE m.status='not_started' AND m.kickoff >= ?1
             ORDER BY m.kickoff ASC, p.id ASC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![Utc::now(), limit], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Upcoming predictions flagged as value bets, best rating first
    pub fn list_value_bets(&self, limit: i64) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS_P} FROM predictions p
             JOIN matches m ON m.id = p.match_id
             WHERE p.is_value_bet=1 AND m.status='not_started' AND m.kickoff >= ?1
             ORDER BY p.value_rating DESC, p.id ASC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![Utc::now(), limit], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const MATCH_COLUMNS: &str = "id, external_key, league_id, home_team_id, away_team_id,
                             kickoff, status, home_score, away_score";

const PREDICTION_COLUMNS: &str = "id, match_id, model_name, model_version, predicted_winner,
    home_win_probability, draw_probability, away_win_probability,
    predicted_home_goals, predicted_away_goals, over_under_25, over_under_probability,
    btts, btts_probability, confidence, risk_level, is_value_bet, value_rating,
    analysis, best_bet, generated_at";

const PREDICTION_COLUMNS_P: &str = "p.id, p.match_id, p.model_name, p.model_version, p.predicted_winner,
    p.home_win_probability, p.draw_probability, p.away_win_probability,
    p.predicted_home_goals, p.predicted_away_goals, p.over_under_25, p.over_under_probability,
    p.btts, p.btts_probability, p.confidence, p.risk_level, p.is_value_bet, p.value_rating,
    p.analysis, p.best_bet, p.generated_at";

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        external_key: row.get(1)?,
        league_id: row.get(2)?,
        home_team_id: row.get(3)?,
        away_team_id: row.get(4)?,
        kickoff: row.get(5)?,
        status: row.get(6)?,
        home_score: row.get(7)?,
        away_score: row.get(8)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        match_id: row.get(1)?,
        model_name: row.get(2)?,
        model_version: row.get(3)?,
        predicted_winner: row.get(4)?,
        home_win_probability: row.get(5)?,
        draw_probability: row.get(6)?,
        away_win_probability: row.get(7)?,
        predicted_home_goals: row.get(8)?,
        predicted_away_goals: row.get(9)?,
        over_under_25: row.get(10)?,
        over_under_probability: row.get(11)?,
        btts: row.get(12)?,
        btts_probability: row.get(13)?,
        confidence: row.get(14)?,
        risk_level: row.get(15)?,
        is_value_bet: row.get(16)?,
        value_rating: row.get(17)?,
        analysis: row.get(18)?,
        best_bet: row.get(19)?,
        generated_at: row.get(20)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    id            INTEGER PRIMARY KEY,
    external_key  TEXT,
    league_id     INTEGER NOT NULL,
    home_team_id  INTEGER NOT NULL,
    away_team_id  INTEGER NOT NULL,
    kickoff       TEXT    NOT NULL,
    status        TEXT    NOT NULL DEFAULT 'not_started',
    home_score    INTEGER,
    away_score    INTEGER,
    updated_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS odds (
    match_id    INTEGER NOT NULL,
    outcome     TEXT    NOT NULL,
    bookmaker   TEXT    NOT NULL,
    odds        REAL    NOT NULL,
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (match_id, outcome, bookmaker),
    FOREIGN KEY (match_id) REFERENCES matches(id)
);

CREATE TABLE IF NOT EXISTS predictions (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id               INTEGER NOT NULL,
    model_name             TEXT    NOT NULL,
    model_version          TEXT    NOT NULL,
    predicted_winner       TEXT    NOT NULL,
    home_win_probability   REAL    NOT NULL,
    draw_probability       REAL    NOT NULL,
    away_win_probability   REAL    NOT NULL,
    predicted_home_goals   REAL    NOT NULL,
    predicted_away_goals   REAL    NOT NULL,
    over_under_25          TEXT    NOT NULL,
    over_under_probability REAL    NOT NULL,
    btts                   INTEGER NOT NULL,
    btts_probability       REAL    NOT NULL,
    confidence             INTEGER NOT NULL,
    risk_level             TEXT    NOT NULL,
    is_value_bet           INTEGER NOT NULL DEFAULT 0,
    value_rating           REAL    NOT NULL DEFAULT 0,
    analysis               TEXT    NOT NULL,
    best_bet               TEXT    NOT NULL,
    generated_at           TEXT    NOT NULL,
    UNIQUE (match_id, model_version),
    FOREIGN KEY (match_id) REFERENCES matches(id)
);

CREATE TABLE IF NOT EXISTS betting_ledgers (
    user_id              INTEGER PRIMARY KEY,
    starting_bankroll    REAL    NOT NULL,
    current_bankroll     REAL    NOT NULL,
    total_staked         REAL    NOT NULL DEFAULT 0,
    total_payouts        REAL    NOT NULL DEFAULT 0,
    net_profit           REAL    NOT NULL DEFAULT 0,
    win_rate             REAL    NOT NULL DEFAULT 0,
    roi                  REAL    NOT NULL DEFAULT 0,
    total_picks          INTEGER NOT NULL DEFAULT 0,
    settled_picks        INTEGER NOT NULL DEFAULT 0,
    won_picks            INTEGER NOT NULL DEFAULT 0,
    lost_picks           INTEGER NOT NULL DEFAULT 0,
    current_win_streak   INTEGER NOT NULL DEFAULT 0,
    best_win_streak      INTEGER NOT NULL DEFAULT 0,
    high_confidence_wins INTEGER NOT NULL DEFAULT 0,
    updated_at           TEXT    NOT NULL,
    CHECK (current_bankroll >= 0)
);

CREATE TABLE IF NOT EXISTS picks (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id                 INTEGER NOT NULL,
    prediction_id           INTEGER NOT NULL,
    match_id                INTEGER NOT NULL,
    stake                   REAL    NOT NULL CHECK (stake > 0),
    predicted_outcome       TEXT    NOT NULL,
    confidence_at_placement INTEGER NOT NULL,
    potential_return        REAL    NOT NULL,
    notes                   TEXT,
    status                  TEXT    NOT NULL DEFAULT 'pending',
    payout                  REAL,
    placed_at               TEXT    NOT NULL,
    settled_at              TEXT,
    UNIQUE (user_id, prediction_id),
    FOREIGN KEY (user_id) REFERENCES betting_ledgers(user_id),
    FOREIGN KEY (prediction_id) REFERENCES predictions(id),
    FOREIGN KEY (match_id) REFERENCES matches(id)
);

CREATE TABLE IF NOT EXISTS bankroll_history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    delta         REAL    NOT NULL,
    balance_after REAL    NOT NULL,
    reason        TEXT    NOT NULL,
    pick_id       INTEGER,
    created_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS user_levels (
    user_id     INTEGER PRIMARY KEY,
    level       INTEGER NOT NULL DEFAULT 1,
    current_xp  INTEGER NOT NULL DEFAULT 0,
    total_xp    INTEGER NOT NULL DEFAULT 0,
    coins       INTEGER NOT NULL DEFAULT 0,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS achievement_progress (
    user_id        INTEGER NOT NULL,
    achievement_id INTEGER NOT NULL,
    progress       REAL    NOT NULL DEFAULT 0,
    unlocked       INTEGER NOT NULL DEFAULT 0,
    unlocked_at    TEXT,
    PRIMARY KEY (user_id, achievement_id)
);

CREATE TABLE IF NOT EXISTS xp_transactions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    amount      INTEGER NOT NULL,
    reason      TEXT    NOT NULL,
    created_at  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_matches_status_kickoff ON matches(status, kickoff);
CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_id);
CREATE INDEX IF NOT EXISTS idx_predictions_value ON predictions(is_value_bet);
CREATE INDEX IF NOT EXISTS idx_picks_match_status ON picks(match_id, status);
CREATE INDEX IF NOT EXISTS idx_picks_user ON picks(user_id, placed_at);
CREATE INDEX IF NOT EXISTS idx_picks_settled ON picks(status, settled_at);
CREATE INDEX IF NOT EXISTS idx_bankroll_history_user ON bankroll_history(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_xp_transactions_user ON xp_transactions(user_id);
"#;


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_match_upsert_overwrites_status_and_score() {
        let db = Database::open_in_memory().unwrap();
        let mut m = upcoming(1, 10, 20);
        db.upsert_match(&m).unwrap();

        m.status = MatchStatus::Finished;
        m.home_score = Some(2);
        m.away_score = Some(2);
        db.upsert_match(&m).unwrap();

        let stored = db.get_match(1).unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Finished);
        assert_eq!(stored.result(), Some(Outcome::Draw));
        assert!(db.get_match(2).unwrap().is_none());
    }

    #[test]
    fn test_upcoming_matches_filter_and_limit() {
        let db = Database::open_in_memory().unwrap();
        let mut other_league = upcoming(3, 30, 40);
        other_league.league_id = 140;
        db.upsert_match(&upcoming(1, 10, 20)).unwrap();
        db.upsert_match(&upcoming(2, 11, 21)).unwrap();
        db.upsert_match(&other_league).unwrap();
        db.upsert_match(&played(4, 10, 11, 3, 1, 0)).unwrap();

        assert_eq!(db.list_upcoming_matches(&[], None).unwrap().len(), 3);
        assert_eq!(db.list_upcoming_matches(&[140], None).unwrap().len(), 1);
        assert_eq!(db.list_upcoming_matches(&[], Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_recent_team_matches_newest_first_and_limited() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..12 {
            db.upsert_match(&played(100 + i, 10, 50 + i, i + 1, 1, 0)).unwrap();
        }
        let recent = db.recent_team_matches(10, 39, Utc::now(), 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id, 100);
        assert!(recent.windows(2).all(|w| w[0].kickoff >= w[1].kickoff));
    }

    #[test]
    fn test_best_odds_picks_highest_quote() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_match(&upcoming(1, 10, 20)).unwrap();
        for (book, odds) in [("a", 2.05), ("b", 2.20), ("c", 1.95)] {
            db.upsert_odds(&OddsQuote {
                match_id: 1,
                outcome: Outcome::Home,
                bookmaker: book.into(),
                odds,
                updated_at: Utc::now(),
            })
            .unwrap();
        }
        assert_eq!(db.best_odds(1, Outcome::Home).unwrap(), Some(2.20));
        assert_eq!(db.best_odds(1, Outcome::Away).unwrap(), None);
    }

    #[test]
    fn test_prediction_upsert_is_last_writer_wins() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_match(&upcoming(1, 10, 20)).unwrap();
        let first = db.upsert_prediction(&prediction(1, Outcome::Home, 70)).unwrap();
        let second = db.upsert_prediction(&prediction(1, Outcome::Away, 82)).unwrap();
        assert_eq!(first, second);

        let stored = db.get_prediction(first).unwrap().unwrap();
        assert_eq!(stored.predicted_winner, Outcome::Away);
        assert_eq!(stored.confidence, 82);
        assert_eq!(db.list_upcoming_predictions(50).unwrap().len(), 1);
    }

    #[test]
    fn test_value_bet_listing() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_match(&upcoming(1, 10, 20)).unwrap();
        db.upsert_match(&upcoming(2, 11, 21)).unwrap();
        let mut value = prediction(1, Outcome::Home, 80);
        value.is_value_bet = true;
        value.value_rating = 21.5;
        db.upsert_prediction(&value).unwrap();
        db.upsert_prediction(&prediction(2, Outcome::Home, 80)).unwrap();

        let bets = db.list_value_bets(10).unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].match_id, 1);
    }
}
