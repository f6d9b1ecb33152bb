use serde::{Deserialize, Serialize};

use super::form::DEFAULT_AVG_GOALS;
use crate::db::models::{OverUnder, TeamForm};

const GOAL_LINE: f64 = 2.5;
const PCT_PER_GOAL: f64 = 15.0;
const MARKET_CAP: f64 = 85.0;
const MARKET_FLOOR: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverUnderCall {
    pub call: OverUnder,
    /// Probability of the called side, whole percent
    pub probability: f64,
    pub expected_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BttsCall {
    pub yes: bool,
    pub probability: f64,
}

/// Over/Under 2.5 goals from both teams' scoring and conceding rates.
///
/// The expected total is half the sum of the four rates, i.e. home expected goals plus
/// away expected goals.
pub fn over_under(home: &TeamForm, away: &TeamForm) -> OverUnderCall {
    let expected_total = (home.avg_goals_scored
        + home.avg_goals_conceded
        + away.avg_goals_scored
        + away.avg_goals_conceded)
        / 2.0;

    let (call, probability) = if expected_total > GOAL_LINE {
        let p = 50.0 + (expected_total - GOAL_LINE) * PCT_PER_GOAL;
        (OverUnder::Over, p.min(MARKET_CAP))
    } else {
        let p = 50.0 - (GOAL_LINE - expected_total) * PCT_PER_GOAL;
        (OverUnder::Under, p.max(MARKET_FLOOR))
    };

    OverUnderCall {
        call,
        probability: probability.round(),
        expected_total,
    }
}

/// Both teams to score.
///
/// The call needs each side to average at least one goal, while the probability only looks
/// at the combined rate, so a "no" call can carry a probability above 50.
pub fn btts(home: &TeamForm, away: &TeamForm) -> BttsCall {
    let rate = |v: f64| if v > 0.0 { v } else { DEFAULT_AVG_GOALS };
    let (h, a) = (rate(home.avg_goals_scored), rate(away.avg_goals_scored));
    BttsCall {
        yes: h >= 1.0 && a >= 1.0,
        probability: ((h + a) / 4.0 * 100.0).min(MARKET_CAP).round(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::form::tests::form_of;

    #[test]
    fn test_over_when_expected_total_exceeds_line() {
        let home = form_of(7, 2, 1, 2.4, 0.8);
        let away = form_of(2, 3, 5, 0.9, 2.1);
        let ou = over_under(&home, &away);
        assert_eq!(ou.call, OverUnder::Over);
        assert_eq!(ou.probability, 59.0);
    }

    #[test]
    fn test_under_is_floored_and_over_capped() {
        let tight = form_of(3, 4, 3, 0.8, 0.7);
        let ou = over_under(&tight, &tight);
        assert_eq!(ou.call, OverUnder::Under);
        assert_eq!(ou.probability, 35.0);

        let dry = form_of(0, 10, 0, 0.0, 0.0);
        assert_eq!(over_under(&dry, &dry).probability, 15.0);

        let wild = form_of(5, 0, 5, 4.0, 4.0);
        let ou = over_under(&wild, &wild);
        assert_eq!(ou.call, OverUnder::Over);
        assert_eq!(ou.probability, 85.0);
    }

    #[test]
    fn test_exact_line_is_under_at_fifty() {
        let even = form_of(4, 2, 4, 1.25, 1.25);
        let ou = over_under(&even, &even);
        assert_eq!(ou.call, OverUnder::Under);
        assert_eq!(ou.probability, 50.0);
    }

    #[test]
    fn test_btts_call_and_probability_can_disagree() {
        let home = form_of(6, 2, 2, 2.6, 1.0);
        let away = form_of(2, 2, 6, 0.8, 1.8);
        let b = btts(&home, &away);
        assert!(!b.yes);
        assert_eq!(b.probability, 85.0);
    }

    #[test]
    fn test_btts_zero_rate_uses_default() {
        let blank = form_of(0, 5, 5, 0.0, 1.0);
        let scorer = form_of(5, 5, 0, 1.1, 0.4);
        let b = btts(&blank, &scorer);
        assert!(b.yes);
        assert_eq!(b.probability, 65.0);
    }
}
