//! Move definitions shared by both players

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Tolerance for probability vectors summing to one
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Whether a move cooperates with or defects against the other country
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Cooperative,
    Defective,
}

/// Side of the table a move belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Player {
    User,
    Computer,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::User => Player::Computer,
            Player::Computer => Player::User,
        }
    }
}

fn default_probability() -> f64 {
    1.0
}

/// A trade move available to one player
///
/// `probability` only matters when the move is part of a mixed-strategy
/// move set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub name: String,
    pub kind: MoveKind,
    #[serde(default = "default_probability")]
    pub probability: f64,
    pub owner: Player,
}

impl Move {
    pub fn new(name: impl Into<String>, kind: MoveKind, owner: Player) -> Self {
        Self {
            name: name.into(),
            kind,
            probability: 1.0,
            owner,
        }
    }

    pub fn cooperative(name: impl Into<String>, owner: Player) -> Self {
        Self::new(name, MoveKind::Cooperative, owner)
    }

    pub fn defective(name: impl Into<String>, owner: Player) -> Self {
        Self::new(name, MoveKind::Defective, owner)
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn is_cooperative(&self) -> bool {
        self.kind == MoveKind::Cooperative
    }

    pub fn is_defective(&self) -> bool {
        self.kind == MoveKind::Defective
    }
}

/// Look up a move by name
pub fn find_move<'a>(catalog: &'a [Move], name: &str) -> Option<&'a Move> {
    catalog.iter().find(|m| m.name == name)
}

/// Moves of one kind, in declaration order
pub fn moves_of_kind(catalog: &[Move], kind: MoveKind) -> Vec<&Move> {
    catalog.iter().filter(|m| m.kind == kind).collect()
}

/// Check that a probability vector is a distribution
///
/// Every entry must lie in [0, 1] and the total must be 1 within
/// `PROBABILITY_TOLERANCE`.
pub fn validate_distribution(probabilities: &[f64]) -> Result<()> {
    if probabilities.is_empty() {
        return Err(GameError::invalid("probability vector is empty"));
    }
    if let Some(p) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < -PROBABILITY_TOLERANCE || **p > 1.0 + PROBABILITY_TOLERANCE)
    {
        return Err(GameError::invalid(format!("probability {} outside [0, 1]", p)));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(GameError::invalid(format!(
            "probabilities sum to {:.8}, expected 1",
            total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent() {
        assert_eq!(Player::User.opponent(), Player::Computer);
        assert_eq!(Player::Computer.opponent(), Player::User);
    }

    #[test]
    fn test_move_json_defaults_probability() {
        let m: Move = serde_json::from_str(
            r#"{"name": "impose_tariffs", "kind": "defective", "owner": "computer"}"#,
        )
        .unwrap();
        assert_eq!(m.probability, 1.0);
        assert!(m.is_defective());
        assert_eq!(m.owner, Player::Computer);
    }

    #[test]
    fn test_moves_of_kind_keeps_order() {
        let catalog = vec![
            Move::defective("tariffs", Player::User),
            Move::cooperative("negotiate", Player::User),
            Move::cooperative("wait_and_see", Player::User),
        ];
        let coop: Vec<_> = moves_of_kind(&catalog, MoveKind::Cooperative)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(coop, vec!["negotiate", "wait_and_see"]);
        assert!(find_move(&catalog, "tariffs").is_some());
        assert!(find_move(&catalog, "sanctions").is_none());
    }

    #[test]
    fn test_validate_distribution() {
        assert!(validate_distribution(&[0.25, 0.75]).is_ok());
        assert!(validate_distribution(&[0.5, 0.5 + 1e-9]).is_ok());
        assert!(validate_distribution(&[0.5, 0.4]).is_err());
        assert!(validate_distribution(&[1.5, -0.5]).is_err());
        assert!(validate_distribution(&[]).is_err());
        assert!(validate_distribution(&[f64::NAN, 1.0]).is_err());
    }
}
