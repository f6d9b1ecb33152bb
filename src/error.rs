use thiserror::Error;

/// Typed rejection returned by the wagering operations.
#[derive(Debug, Error)]
pub enum WagerError {
    #[error("invalid stake: {0}")]
    InvalidStake(String),

    #[error("match {0} has already started")]
    MatchAlreadyStarted(i64),

    #[error("insufficient funds: available {available:.2}, requested {requested:.2}")]
    InsufficientFunds { available: f64, requested: f64 },

    #[error("a pick already exists for prediction {prediction_id}")]
    DuplicatePick { prediction_id: i64 },

    #[error("prediction {0} not found")]
    PredictionNotFound(i64),

    #[error("match {0} not found")]
    MatchNotFound(i64),

    #[error("no ledger for user {0}")]
    UserNotFound(i64),

    #[error("match {0} is not finished")]
    MatchNotFinished(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl WagerError {
    /// Stable machine-readable code exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            WagerError::InvalidStake(_) => "invalid_stake",
            WagerError::MatchAlreadyStarted(_) => "match_already_started",
            WagerError::InsufficientFunds { .. } => "insufficient_funds",
            WagerError::DuplicatePick { .. } => "duplicate_pick",
            WagerError::PredictionNotFound(_) => "prediction_not_found",
            WagerError::MatchNotFound(_) => "match_not_found",
            WagerError::UserNotFound(_) => "user_not_found",
            WagerError::MatchNotFinished(_) => "match_not_finished",
            WagerError::Storage(_) => "storage_error",
        }
    }
}

impl From<rusqlite::Error> for WagerError {
    fn from(e: rusqlite::Error) -> Self {
        WagerError::Storage(e.into())
    }
}

pub type WagerResult<T> = std::result::Result<T, WagerError>;
