use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::{HeadToHead, Outcome, TeamForm};

/// Tunable constants of the ensemble model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Probability shift per point-per-game of form difference
    pub form_weight: f64,
    /// Added to home, half of it taken from each of draw and away
    pub home_advantage: f64,
    pub h2h_weight: f64,
    /// Meetings required before head-to-head counts
    pub h2h_min_matches: u32,
    /// Win rate treated as neutral in head-to-head
    pub h2h_baseline: f64,
    /// Attack/defence ratio above which a side gets `strength_bonus`
    pub strength_ratio: f64,
    pub strength_bonus: f64,
    /// Strength gap under which the draw gets `draw_bonus`
    pub draw_band: f64,
    pub draw_bonus: f64,
    /// Lower bound on each raw share before normalisation
    pub min_share: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            form_weight: 0.15,
            home_advantage: 0.10,
            h2h_weight: 0.20,
            h2h_min_matches: 3,
            h2h_baseline: 0.33,
            strength_ratio: 1.3,
            strength_bonus: 0.10,
            draw_band: 0.2,
            draw_bonus: 0.10,
            min_share: 0.02,
        }
    }
}

/// Home/draw/away probabilities in percent, one decimal, summing to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Probabilities {
    pub fn max(&self) -> f64 {
        self.home.max(self.draw).max(self.away)
    }

    pub fn min(&self) -> f64 {
        self.home.min(self.draw).min(self.away)
    }

    pub fn spread(&self) -> f64 {
        self.max() - self.min()
    }

    /// Favourite outcome. Ties resolve home, then away, then draw.
    pub fn winner(&self) -> Outcome {
        let max = self.max();
        if self.home == max {
            Outcome::Home
        } else if self.away == max {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    pub fn of(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
}

/// Goal rate used for strength ratios; zero rates fall back to the league default.
fn rate_or_default(v: f64) -> f64 {
    if v > 0.0 {
        v
    } else {
        super::form::DEFAULT_AVG_GOALS
    }
}

/// Combine form, home advantage, head-to-head and goal strength into outcome probabilities.
pub fn outcome_probabilities(
    home: &TeamForm,
    away: &TeamForm,
    h2h: &HeadToHead,
    cfg: &ModelConfig,
) -> Probabilities {
    let third = 1.0 / 3.0;
    let (mut p_home, mut p_draw, mut p_away) = (third, third, third);

    let form_diff = home.points_per_game() - away.points_per_game();
    p_home += form_diff * cfg.form_weight;
    p_away -= form_diff * cfg.form_weight;

    p_home += cfg.home_advantage;
    p_draw -= cfg.home_advantage / 2.0;
    p_away -= cfg.home_advantage / 2.0;

    if h2h.total_matches >= cfg.h2h_min_matches && h2h.total_matches > 0 {
        let n = h2h.total_matches as f64;
        p_home += (h2h.team_a_wins as f64 / n - cfg.h2h_baseline) * cfg.h2h_weight;
        p_away += (h2h.team_b_wins as f64 / n - cfg.h2h_baseline) * cfg.h2h_weight;
    }

    let home_strength = rate_or_default(home.avg_goals_scored) / rate_or_default(away.avg_goals_conceded);
    let away_strength = rate_or_default(away.avg_goals_scored) / rate_or_default(home.avg_goals_conceded);
    if home_strength > cfg.strength_ratio {
        p_home += cfg.strength_bonus;
    }
    if away_strength > cfg.strength_ratio {
        p_away += cfg.strength_bonus;
    }
    if (home_strength - away_strength).abs() < cfg.draw_band {
        p_draw += cfg.draw_bonus;
    }

    debug!(
        form_diff,
        home_strength, away_strength, p_home, p_draw, p_away, "raw outcome shares"
    );
    normalize([p_home, p_draw, p_away], cfg.min_share)
}

/// Scale to percentages with one decimal; the rounding residual goes to the largest share
/// so the three always add up to exactly 100.
fn normalize(raw: [f64; 3], min_share: f64) -> Probabilities {
    let floored = raw.map(|p| p.max(min_share));
    let total: f64 = floored.iter().sum();
    let mut pct = floored.map(|p| round1(p / total * 100.0));

    let residual = round1(100.0 - pct.iter().sum::<f64>());
    if residual != 0.0 {
        // home, away, draw precedence for the largest share
        let idx = [0usize, 2, 1]
            .into_iter()
            .fold(0usize, |best, i| if pct[i] > pct[best] { i } else { best });
        pct[idx] = round1(pct[idx] + residual);
    }

    Probabilities {
        home: pct[0],
        draw: pct[1],
        away: pct[2],
    }
}

/// Expected goals from raw scoring and conceding rates.
pub fn expected_goals(home: &TeamForm, away: &TeamForm) -> ExpectedGoals {
    ExpectedGoals {
        home: (home.avg_goals_scored + away.avg_goals_conceded) / 2.0,
        away: (away.avg_goals_scored + home.avg_goals_conceded) / 2.0,
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
