use serde::{Deserialize, Serialize};

use super::probability::{round1, Probabilities};
use crate::db::models::RiskTier;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,
    /// Confidence points per percentage point of spread
    pub spread_factor: f64,
    pub low_risk_from: u8,
    pub high_risk_below: u8,
    /// Required margin of model probability over implied probability, in points
    pub value_edge_pct: f64,
    /// Required expected value per unit staked
    pub value_min_ev: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            confidence_floor: 60.0,
            confidence_ceiling: 95.0,
            spread_factor: 0.7,
            low_risk_from: 80,
            high_risk_below: 70,
            value_edge_pct: 10.0,
            value_min_ev: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub confidence: u8,
    pub risk: RiskTier,
    pub is_value_bet: bool,
    /// Expected value in percent, one decimal
    pub value_rating: f64,
}

pub fn confidence(probs: &Probabilities, cfg: &ClassifierConfig) -> u8 {
    let raw = (cfg.confidence_floor + cfg.spread_factor * probs.spread()).round();
    raw.clamp(cfg.confidence_floor, cfg.confidence_ceiling) as u8
}

pub fn risk_tier(confidence: u8, cfg: &ClassifierConfig) -> RiskTier {
    if confidence >= cfg.low_risk_from {
        RiskTier::Low
    } else if confidence < cfg.high_risk_below {
        RiskTier::High
    } else {
        RiskTier::Medium
    }
}

/// Classify a probability triple. `odds` are the best decimal odds on the favourite, if any.
pub fn classify(probs: &Probabilities, odds: Option<f64>, cfg: &ClassifierConfig) -> Classification {
    let confidence = confidence(probs, cfg);
    let mut out = Classification {
        confidence,
        risk: risk_tier(confidence, cfg),
        is_value_bet: false,
        value_rating: 0.0,
    };

    if let Some(odds) = odds.filter(|o| o.is_finite() && *o > 1.0) {
        let p = probs.of(probs.winner());
        let implied = 100.0 / odds;
        let ev = odds * p / 100.0 - 1.0;
        out.value_rating = round1(ev * 100.0);
        out.is_value_bet = p > implied + cfg.value_edge_pct && ev > cfg.value_min_ev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn probs(home: f64, draw: f64, away: f64) -> Probabilities {
        Probabilities { home, draw, away }
    }

    #[test]
    fn test_confidence_bounds() {
        let cfg = ClassifierConfig::default();
        assert_eq!(confidence(&probs(33.4, 33.3, 33.3), &cfg), 60);
        assert_eq!(confidence(&probs(58.5, 34.8, 6.7), &cfg), 95);
        // 60 + 0.7 * 20 = 74
        assert_eq!(confidence(&probs(45.0, 30.0, 25.0), &cfg), 74);
    }

    #[test]
    fn test_confidence_non_decreasing_in_spread() {
        let cfg = ClassifierConfig::default();
        let mut last = 0;
        for step in 0..=66 {
            let s = step as f64;
            let home = 33.4 + s;
            let away = (33.3 - s / 2.0).max(0.0);
            let p = probs(home, 100.0 - home - away, away);
            let c = confidence(&p, &cfg);
            assert!(c >= last, "confidence dropped to {c} at spread {}", p.spread());
            assert!((60..=95).contains(&c));
            last = c;
        }
    }

    #[test]
    fn test_risk_tiers() {
        let cfg = ClassifierConfig::default();
        assert_eq!(risk_tier(95, &cfg), RiskTier::Low);
        assert_eq!(risk_tier(80, &cfg), RiskTier::Low);
        assert_eq!(risk_tier(79, &cfg), RiskTier::Medium);
        assert_eq!(risk_tier(70, &cfg), RiskTier::Medium);
        assert_eq!(risk_tier(69, &cfg), RiskTier::High);
    }

    #[test]
    fn test_no_odds_is_never_value() {
        let c = classify(&probs(70.0, 20.0, 10.0), None, &ClassifierConfig::default());
        assert!(!c.is_value_bet);
        assert_eq!(c.value_rating, 0.0);
    }

    #[test]
    fn test_value_bet_needs_edge_and_ev() {
        let cfg = ClassifierConfig::default();
        // implied 40%, ev = 2.5 * 0.6 - 1 = 0.5
        let c = classify(&probs(60.0, 25.0, 15.0), Some(2.5), &cfg);
        assert!(c.is_value_bet);
        assert_relative_eq!(c.value_rating, 50.0, epsilon = 1e-9);

        // implied 55.6%, edge below 10 points
        let c = classify(&probs(60.0, 25.0, 15.0), Some(1.8), &cfg);
        assert!(!c.is_value_bet);
        assert_relative_eq!(c.value_rating, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_value_rating() {
        let c = classify(&probs(50.0, 30.0, 20.0), Some(1.5), &ClassifierConfig::default());
        assert!(!c.is_value_bet);
        assert_relative_eq!(c.value_rating, -25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_odds_ignored() {
        let c = classify(&probs(60.0, 25.0, 15.0), Some(1.0), &ClassifierConfig::default());
        assert!(!c.is_value_bet);
        assert_eq!(c.value_rating, 0.0);
    }
}
