use crate::db::models::round_cents;
use crate::error::{WagerError, WagerResult};

/// Payout multiplier for a pick placed at the given confidence.
/// Lower confidence pays more.
pub fn payout_multiplier(confidence: u8) -> f64 {
    match confidence {
        80.. => 1.5,
        70..=79 => 1.8,
        60..=69 => 2.2,
        _ => 2.5,
    }
}

pub fn potential_return(stake: f64, confidence: u8) -> f64 {
    round_cents(stake * payout_multiplier(confidence))
}

/// Limits applied to a stake before it reaches the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StakePolicy {
    pub max_stake: Option<f64>,
}

impl StakePolicy {
    pub fn validate(&self, stake: f64) -> WagerResult<()> {
        if !stake.is_finite() || stake <= 0.0 {
            return Err(WagerError::InvalidStake(format!("stake must be positive, got {stake}")));
        }
        if !is_whole_cents(stake) {
            return Err(WagerError::InvalidStake(format!(
                "stake must be a whole number of cents, got {stake}"
            )));
        }
        if let Some(max) = self.max_stake {
            if stake > max {
                return Err(WagerError::InvalidStake(format!(
                    "stake {stake:.2} exceeds the maximum of {max:.2}"
                )));
            }
        }
        Ok(())
    }
}

/// Binary fractions like 33.33 land a hair off the cent; anything further is sub-cent.
fn is_whole_cents(amount: f64) -> bool {
    let cents = amount * 100.0;
    (cents - cents.round()).abs() < 1e-6
}
