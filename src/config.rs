use clap::Parser;

use crate::predict::classifier::ClassifierConfig;
use crate::predict::probability::ModelConfig;
use crate::wagering::StakePolicy;

/// Football prediction and picks engine
#[derive(Parser, Debug, Clone)]
#[command(name = "matchpick", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchpick.db")]
    pub database_path: String,

    /// HTTP API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// Virtual bankroll granted when a user's ledger is opened
    #[arg(long, env = "STARTING_BANKROLL", default_value = "1000.0")]
    pub starting_bankroll: f64,

    /// Optional cap on a single stake
    #[arg(long, env = "MAX_STAKE")]
    pub max_stake: Option<f64>,

    /// How often finished matches are checked for settlement, in seconds
    #[arg(long, env = "SETTLEMENT_POLL_SECS", default_value = "60")]
    pub settlement_poll_secs: u64,

    /// How often predictions are regenerated for upcoming matches, in seconds (0 disables)
    #[arg(long, env = "PREDICTION_INTERVAL_SECS", default_value = "900")]
    pub prediction_interval_secs: u64,

    /// Maximum fixtures per scheduled prediction batch
    #[arg(long, env = "PREDICTION_BATCH_LIMIT")]
    pub prediction_batch_limit: Option<usize>,

    /// Leagues included in scheduled prediction batches (comma separated, empty = all)
    #[arg(long, env = "LEAGUE_IDS", value_delimiter = ',')]
    pub league_ids: Vec<i64>,

    /// Probability shift per point-per-game of form difference
    #[arg(long, env = "FORM_WEIGHT", default_value = "0.15")]
    pub form_weight: f64,

    /// Home advantage added to the home share
    #[arg(long, env = "HOME_ADVANTAGE", default_value = "0.10")]
    pub home_advantage: f64,

    /// Weight of head-to-head win rates
    #[arg(long, env = "H2H_WEIGHT", default_value = "0.20")]
    pub h2h_weight: f64,

    /// Points by which model probability must beat implied probability for a value bet
    #[arg(long, env = "VALUE_EDGE_PCT", default_value = "10.0")]
    pub value_edge_pct: f64,

    /// Minimum expected value per unit staked for a value bet
    #[arg(long, env = "VALUE_MIN_EV", default_value = "0.15")]
    pub value_min_ev: f64,

    /// Settled picks a user needs inside the window to appear on leaderboards
    #[arg(long, env = "LEADERBOARD_MIN_PICKS", default_value = "1")]
    pub leaderboard_min_picks: u32,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.starting_bankroll.is_finite() && self.starting_bankroll > 0.0) {
            anyhow::bail!("starting_bankroll must be positive");
        }
        if let Some(max) = self.max_stake {
            if !(max.is_finite() && max > 0.0) {
                anyhow::bail!("max_stake must be positive when set");
            }
        }
        if self.settlement_poll_secs == 0 {
            anyhow::bail!("settlement_poll_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.form_weight) {
            anyhow::bail!("form_weight must be between 0.0 and 1.0");
        }
        if !(0.0..=0.5).contains(&self.home_advantage) {
            anyhow::bail!("home_advantage must be between 0.0 and 0.5");
        }
        if !(0.0..=1.0).contains(&self.h2h_weight) {
            anyhow::bail!("h2h_weight must be between 0.0 and 1.0");
        }
        if !(0.0..=100.0).contains(&self.value_edge_pct) {
            anyhow::bail!("value_edge_pct must be between 0 and 100");
        }
        if !self.value_min_ev.is_finite() || self.value_min_ev < 0.0 {
            anyhow::bail!("value_min_ev must be non-negative");
        }
        Ok(())
    }

    pub fn model(&self) -> ModelConfig {
        ModelConfig {
            form_weight: self.form_weight,
            home_advantage: self.home_advantage,
            h2h_weight: self.h2h_weight,
            ..ModelConfig::default()
        }
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            value_edge_pct: self.value_edge_pct,
            value_min_ev: self.value_min_ev,
            ..ClassifierConfig::default()
        }
    }

    pub fn stake_policy(&self) -> StakePolicy {
        StakePolicy {
            max_stake: self.max_stake,
        }
    }
}
