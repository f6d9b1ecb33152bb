pub mod classifier;
pub mod form;
pub mod markets;
pub mod probability;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::models::{HeadToHead, Match, MatchStatus, OverUnder, Prediction, TeamForm};
use crate::db::Database;
use classifier::{classify, ClassifierConfig};
use markets::{btts, over_under, OverUnderCall};
use probability::{expected_goals, outcome_probabilities, round1, ExpectedGoals, ModelConfig, Probabilities};

pub const MODEL_NAME: &str = "ensemble_v1";
pub const MODEL_VERSION: &str = "1.1.0";

/// Everything the model needs to price one fixture.
#[derive(Debug, Clone)]
pub struct MatchInputs {
    pub home_form: TeamForm,
    pub away_form: TeamForm,
    pub h2h: HeadToHead,
    /// Best decimal odds on the favourite, once known
    pub favourite_odds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub league_ids: Vec<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated: u32,
    pub errors: u32,
    pub total: u32,
}

/// Builds and stores predictions for upcoming fixtures.
#[derive(Clone)]
pub struct PredictionEngine {
    db: Database,
    model: ModelConfig,
    classifier: ClassifierConfig,
}

impl PredictionEngine {
    pub fn new(db: Database, model: ModelConfig, classifier: ClassifierConfig) -> Self {
        Self { db, model, classifier }
    }

    /// Gather form, head-to-head and odds for a fixture from the store.
    fn load_inputs(&self, m: &Match) -> Result<MatchInputs> {
        let home_recent = self
            .db
            .recent_team_matches(m.home_team_id, m.league_id, m.kickoff, form::FORM_WINDOW)?;
        let away_recent = self
            .db
            .recent_team_matches(m.away_team_id, m.league_id, m.kickoff, form::FORM_WINDOW)?;
        let meetings = self
            .db
            .head_to_head_matches(m.home_team_id, m.away_team_id, m.kickoff, form::H2H_WINDOW)?;

        Ok(MatchInputs {
            home_form: form::team_form(m.home_team_id, m.league_id, &home_recent),
            away_form: form::team_form(m.away_team_id, m.league_id, &away_recent),
            h2h: form::head_to_head(m.home_team_id, m.away_team_id, &meetings),
            favourite_odds: None,
        })
    }

    /// Predict and persist one fixture. Returns `None` for fixtures that already kicked off.
    pub fn predict_match(&self, m: &Match) -> Result<Option<Prediction>> {
        if m.status != MatchStatus::NotStarted {
            debug!(match_id = m.id, status = m.status.as_str(), "skipping prediction");
            return Ok(None);
        }
        let mut inputs = self.load_inputs(m)?;
        let probs = outcome_probabilities(&inputs.home_form, &inputs.away_form, &inputs.h2h, &self.model);
        inputs.favourite_odds = self.db.best_odds(m.id, probs.winner())?;

        let mut prediction = build_prediction(m, &inputs, &self.model, &self.classifier);
        prediction.id = Some(self.db.upsert_prediction(&prediction)?);
        Ok(Some(prediction))
    }

    /// Predict every upcoming fixture, optionally restricted to some leagues and capped.
    /// A failure on one fixture is counted and does not stop the batch.
    pub fn generate_for_upcoming(&self, params: &GenerateParams) -> Result<GenerationReport> {
        let matches = self.db.list_upcoming_matches(&params.league_ids, params.limit)?;
        let mut report = GenerationReport {
            total: matches.len() as u32,
            ..Default::default()
        };

        for m in &matches {
            match self.predict_match(m) {
                Ok(Some(p)) => {
                    report.generated += 1;
                    if p.is_value_bet {
                        info!(
                            match_id = m.id,
                            rating = p.value_rating,
                            "Value bet: {} at {}% confidence",
                            p.best_bet,
                            p.confidence
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!("Prediction failed for match {}: {:#}", m.id, e);
                }
            }
        }

        info!(
            "Prediction batch: {} generated, {} errors, {} fixtures",
            report.generated, report.errors, report.total
        );
        Ok(report)
    }
}

/// Assemble the full prediction record for a fixture. Pure and deterministic.
pub fn build_prediction(
    m: &Match,
    inputs: &MatchInputs,
    model: &ModelConfig,
    classifier_cfg: &ClassifierConfig,
) -> Prediction {
    let probs = outcome_probabilities(&inputs.home_form, &inputs.away_form, &inputs.h2h, model);
    let xg = expected_goals(&inputs.home_form, &inputs.away_form);
    let ou = over_under(&inputs.home_form, &inputs.away_form);
    let both = btts(&inputs.home_form, &inputs.away_form);
    let class = classify(&probs, inputs.favourite_odds, classifier_cfg);

    Prediction {
        id: None,
        match_id: m.id,
        model_name: MODEL_NAME.to_string(),
        model_version: MODEL_VERSION.to_string(),
        predicted_winner: probs.winner(),
        home_win_probability: probs.home,
        draw_probability: probs.draw,
        away_win_probability: probs.away,
        predicted_home_goals: round1(xg.home),
        predicted_away_goals: round1(xg.away),
        over_under_25: ou.call,
        over_under_probability: ou.probability,
        btts: both.yes,
        btts_probability: both.probability,
        confidence: class.confidence,
        risk_level: class.risk,
        is_value_bet: class.is_value_bet,
        value_rating: class.value_rating,
        analysis: analysis_text(m, inputs, &probs, &xg),
        best_bet: best_bet(&probs, &ou).to_string(),
        generated_at: Utc::now(),
    }
}

fn analysis_text(m: &Match, inputs: &MatchInputs, probs: &Probabilities, xg: &ExpectedGoals) -> String {
    let verdict = if probs.home > 50.0 {
        "Home team favored"
    } else if probs.away > 50.0 {
        "Away team favored"
    } else {
        "Evenly matched contest"
    };
    let h2h = if inputs.h2h.total_matches >= 3 {
        format!(
            " Last {} meetings: {}-{}-{}.",
            inputs.h2h.total_matches, inputs.h2h.team_a_wins, inputs.h2h.draws, inputs.h2h.team_b_wins
        )
    } else {
        String::new()
    };
    format!(
        "Team {} ({}) hosts Team {} ({}). Expected goals: {:.1} - {:.1}.{} {}.",
        m.home_team_id,
        inputs.home_form.record(),
        m.away_team_id,
        inputs.away_form.record(),
        round1(xg.home),
        round1(xg.away),
        h2h,
        verdict
    )
}

/// Single recommended market for a fixture.
pub fn best_bet(probs: &Probabilities, ou: &OverUnderCall) -> &'static str {
    let max = probs.max();
    if probs.home == max && probs.home > 45.0 {
        "Home Win"
    } else if probs.away == max && probs.away > 45.0 {
        "Away Win"
    } else if probs.draw == max && probs.draw > 35.0 {
        "Draw"
    } else if probs.home + probs.draw > 70.0 {
        "Home or Draw"
    } else if ou.probability > 65.0 {
        match ou.call {
            OverUnder::Over => "Over 2.5 Goals",
            OverUnder::Under => "Under 2.5 Goals",
        }
    } else {
        "No strong recommendation"
    }
}
