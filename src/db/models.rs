use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Lifecycle of a fixture as reported by the match feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    Live,
    Finished,
    Other,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "not_started",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(MatchStatus::NotStarted),
            "live" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            "other" => Some(MatchStatus::Other),
            _ => None,
        }
    }

    /// Map a provider short status code (API-Football style) onto the status enum.
    pub fn from_provider_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "NS" | "TBD" => MatchStatus::NotStarted,
            "1H" | "HT" | "2H" | "ET" | "BT" | "P" | "LIVE" | "INT" => MatchStatus::Live,
            "FT" | "AET" | "PEN" => MatchStatus::Finished,
            _ => MatchStatus::Other,
        }
    }
}

/// A fixture from the match feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    /// Identifier used by the upstream data provider
    #[serde(default)]
    pub external_key: Option<String>,
    pub league_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl Match {
    /// Final result, available once the match is finished and both scores are known.
    pub fn result(&self) -> Option<Outcome> {
        if self.status != MatchStatus::Finished {
            return None;
        }
        let (home, away) = (self.home_score?, self.away_score?);
        Some(Outcome::from_score(home, away))
    }
}

/// Full-time result of a match, also used as the predicted winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_score(home: i32, away: i32) -> Self {
        if home > away {
            Outcome::Home
        } else if away > home {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Outcome::Home),
            "draw" => Some(Outcome::Draw),
            "away" => Some(Outcome::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskTier::Low),
            "medium" => Some(RiskTier::Medium),
            "high" => Some(RiskTier::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverUnder {
    Over,
    Under,
}

impl OverUnder {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverUnder::Over => "over",
            OverUnder::Under => "under",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "over" => Some(OverUnder::Over),
            "under" => Some(OverUnder::Under),
            _ => None,
        }
    }
}

// Enum columns are stored as their snake_case labels.
macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown value {s:?}").into()))
            }
        }
    };
}

text_column!(MatchStatus);
text_column!(Outcome);
text_column!(RiskTier);
text_column!(OverUnder);

/// A decimal odds quote for one outcome of a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub match_id: i64,
    pub outcome: Outcome,
    pub bookmaker: String,
    /// Decimal odds (e.g. 2.10)
    pub odds: f64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Rolling performance summary for one team in one league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    pub team_id: i64,
    pub league_id: i64,
    pub matches_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub avg_goals_scored: f64,
    pub avg_goals_conceded: f64,
}

/// Head-to-head record between two teams, oriented as (team_a, team_b).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub team_a: i64,
    pub team_b: i64,
    pub total_matches: u32,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub draws: u32,
}

/// A persisted model prediction. One row per (match, model version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub match_id: i64,
    pub model_name: String,
    pub model_version: String,
    pub predicted_winner: Outcome,
    pub home_win_probability: f64,
    pub draw_probability: f64,
    pub away_win_probability: f64,
    pub predicted_home_goals: f64,
    pub predicted_away_goals: f64,
    pub over_under_25: OverUnder,
    pub over_under_probability: f64,
    /// BTTS call; may disagree with `btts_probability` near the margins
    pub btts: bool,
    pub btts_probability: f64,
    pub confidence: u8,
    pub risk_level: RiskTier,
    pub is_value_bet: bool,
    pub value_rating: f64,
    pub analysis: String,
    pub best_bet: String,
    pub generated_at: DateTime<Utc>,
}

/// Settlement state of a pick. Terminal variants carry their settlement data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PickStatus {
    Pending,
    Won { payout: f64, settled_at: DateTime<Utc> },
    Lost { settled_at: DateTime<Utc> },
}

impl PickStatus {
    /// Amount credited back to the bankroll (0 for a loss, none while pending).
    pub fn payout(&self) -> Option<f64> {
        match self {
            PickStatus::Pending => None,
            PickStatus::Won { payout, .. } => Some(*payout),
            PickStatus::Lost { .. } => Some(0.0),
        }
    }
}

/// A user's wager against a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub id: i64,
    pub user_id: i64,
    pub prediction_id: i64,
    pub match_id: i64,
    pub stake: f64,
    /// Predicted winner at the time the pick was placed
    pub predicted_outcome: Outcome,
    /// Prediction confidence at the time the pick was placed
    pub confidence_at_placement: u8,
    pub potential_return: f64,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: PickStatus,
}

impl Pick {
    /// Realised profit once settled: payout minus stake.
    pub fn profit(&self) -> Option<f64> {
        self.status.payout().map(|p| round_cents(p - self.stake))
    }
}

/// Per-user bankroll ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingLedger {
    pub user_id: i64,
    pub starting_bankroll: f64,
    pub current_bankroll: f64,
    pub total_staked: f64,
    pub total_payouts: f64,
    /// Settled payouts minus every stake ever placed
    pub net_profit: f64,
    /// Percent of settled picks won
    pub win_rate: f64,
    /// Net profit over total staked, in percent
    pub roi: f64,
    pub total_picks: u32,
    pub settled_picks: u32,
    pub won_picks: u32,
    pub lost_picks: u32,
    pub current_win_streak: u32,
    pub best_win_streak: u32,
    pub high_confidence_wins: u32,
    pub updated_at: DateTime<Utc>,
}

impl BettingLedger {
    #[cfg(test)]
    pub fn opened(user_id: i64, starting_bankroll: f64) -> Self {
        BettingLedger {
            user_id,
            starting_bankroll,
            current_bankroll: starting_bankroll,
            total_staked: 0.0,
            total_payouts: 0.0,
            net_profit: 0.0,
            win_rate: 0.0,
            roi: 0.0,
            total_picks: 0,
            settled_picks: 0,
            won_picks: 0,
            lost_picks: 0,
            current_win_streak: 0,
            best_win_streak: 0,
            high_confidence_wins: 0,
            updated_at: Utc::now(),
        }
    }

    /// Recompute net profit, win rate and ROI from the running totals.
    pub fn refresh_derived(&mut self) {
        self.net_profit = round_cents(self.total_payouts - self.total_staked);
        self.win_rate = if self.settled_picks == 0 {
            0.0
        } else {
            round_cents(self.won_picks as f64 / self.settled_picks as f64 * 100.0)
        };
        self.roi = if self.total_staked <= 0.0 {
            0.0
        } else {
            round_cents(self.net_profit / self.total_staked * 100.0)
        };
    }
}

/// Round a money amount to cents.
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One journal line of a bankroll movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollEntry {
    pub id: i64,
    pub user_id: i64,
    pub delta: f64,
    pub balance_after: f64,
    pub reason: String,
    pub pick_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// XP and level state for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLevel {
    pub user_id: i64,
    pub level: u32,
    pub current_xp: u64,
    pub total_xp: u64,
    pub coins: u64,
}

/// Per-user progress towards one catalog achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub user_id: i64,
    pub achievement_id: usize,
    pub progress: f64,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Minimal view of a settled pick used by the leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledPick {
    pub pick_id: i64,
    pub user_id: i64,
    pub stake: f64,
    pub payout: f64,
    pub won: bool,
    pub settled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn finished(home: i32, away: i32) -> Match {
        Match {
            id: 1,
            external_key: None,
            league_id: 39,
            home_team_id: 10,
            away_team_id: 20,
            kickoff: Utc.with_ymd_and_hms(2026, 9, 1, 15, 0, 0).unwrap(),
            status: MatchStatus::Finished,
            home_score: Some(home),
            away_score: Some(away),
        }
    }

    #[test]
    fn result_requires_finished_status_and_scores() {
        assert_eq!(finished(2, 1).result(), Some(Outcome::Home));
        assert_eq!(finished(0, 0).result(), Some(Outcome::Draw));
        assert_eq!(finished(1, 3).result(), Some(Outcome::Away));

        let mut live = finished(1, 0);
        live.status = MatchStatus::Live;
        assert_eq!(live.result(), None);

        let mut missing = finished(1, 0);
        missing.away_score = None;
        assert_eq!(missing.result(), None);
    }

    #[test]
    fn provider_codes_map_to_status() {
        assert_eq!(MatchStatus::from_provider_code("NS"), MatchStatus::NotStarted);
        assert_eq!(MatchStatus::from_provider_code("ht"), MatchStatus::Live);
        assert_eq!(MatchStatus::from_provider_code("PEN"), MatchStatus::Finished);
        assert_eq!(MatchStatus::from_provider_code("PST"), MatchStatus::Other);
    }

    #[test]
    fn ledger_derived_stats() {
        let mut ledger = BettingLedger::opened(1, 1000.0);
        ledger.total_staked = 200.0;
        ledger.total_payouts = 150.0;
        ledger.settled_picks = 2;
        ledger.won_picks = 1;
        ledger.lost_picks = 1;
        ledger.refresh_derived();
        assert_eq!(ledger.net_profit, -50.0);
        assert_eq!(ledger.win_rate, 50.0);
        assert_eq!(ledger.roi, -25.0);
    }

    #[test]
    fn empty_ledger_roi_is_zero() {
        let mut ledger = BettingLedger::opened(1, 1000.0);
        ledger.refresh_derived();
        assert_eq!(ledger.roi, 0.0);
        assert_eq!(ledger.win_rate, 0.0);
        assert_eq!(ledger.current_bankroll, 1000.0);
    }

    #[test]
    fn round_cents_drops_float_noise() {
        assert_eq!(round_cents(0.1 + 0.2), 0.3);
        assert_eq!(round_cents(149.999), 150.0);
    }

    #[test]
    fn pick_status_serializes_as_tagged_variant() {
        let at = Utc.with_ymd_and_hms(2026, 9, 1, 17, 0, 0).unwrap();
        let json = serde_json::to_value(PickStatus::Won { payout: 150.0, settled_at: at }).unwrap();
        assert_eq!(json["status"], "won");
        assert_eq!(json["payout"], 150.0);
        assert_eq!(PickStatus::Lost { settled_at: at }.payout(), Some(0.0));
        assert_eq!(PickStatus::Pending.payout(), None);
    }
}
