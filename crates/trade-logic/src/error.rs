//! Error taxonomy for the decision and simulation core

use thiserror::Error;

/// Errors raised by payoff lookup, solving, profile resolution and play
#[derive(Debug, Error)]
pub enum GameError {
    /// The payoff model has no entry for a (user move, computer move) pair
    #[error("no payoff entry for user move '{user_move}' against computer move '{computer_move}'")]
    MissingPayoff {
        user_move: String,
        computer_move: String,
    },

    /// The indifference system is singular or has no exact solution
    #[error("no mixed equilibrium: {0}")]
    NoMixedEquilibrium(String),

    /// Phase allocation of a computer profile is malformed
    #[error("invalid profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },

    /// Game, strategy or campaign configuration violates an invariant
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown computer profile '{0}'")]
    UnknownProfile(String),

    #[error("unknown move '{0}'")]
    UnknownMove(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GameError {
    /// Stable label used when a failed run is recorded
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::MissingPayoff { .. } => "MissingPayoff",
            GameError::NoMixedEquilibrium(_) => "NoMixedEquilibrium",
            GameError::InvalidProfile { .. } => "InvalidProfile",
            GameError::InvalidConfiguration(_) => "InvalidConfiguration",
            GameError::UnknownProfile(_) => "UnknownProfile",
            GameError::UnknownMove(_) => "UnknownMove",
            GameError::Serialization(_) => "Serialization",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        GameError::InvalidConfiguration(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, GameError>;
