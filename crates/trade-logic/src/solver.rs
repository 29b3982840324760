//! Mixed-strategy solver based on the indifference principle
//!
//! The mixing player picks probabilities `p` over its own moves so that the
//! opponent's expected payoff is the same whichever pure move the opponent
//! plays. With `m` mixing moves and `n` opponent moves this is the linear
//! system
//!
//! ```text
//! Σ_i p_i · (U[i][j] - U[i][0]) = 0      for j = 1..n
//! Σ_i p_i                       = 1
//! ```
//!
//! where `U[i][j]` is the opponent's payoff. Square systems are solved by LU
//! decomposition; rectangular ones by SVD least squares, accepted only when
//! the residual vanishes. Both are exact linear solves, so identical inputs
//! always give identical output.

use nalgebra::{DMatrix, DVector};

use crate::error::{GameError, Result};
use crate::moves::{Move, Player, PROBABILITY_TOLERANCE};
use crate::payoff::PayoffModel;

/// Determinant / singular value below which the system is treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Largest residual `|Ap - b|` accepted from the least-squares path
const RESIDUAL_TOLERANCE: f64 = 1e-8;

/// Probability vector over `move_set` that makes the opponent indifferent
///
/// # Errors
/// * `InvalidConfiguration` when `move_set` has fewer than two moves, mixes
///   owners, or the solution leaves [0, 1]
/// * `NoMixedEquilibrium` when the system is singular or inconsistent
/// * `MissingPayoff` when the model lacks a needed pair
pub fn solve_indifference(model: &PayoffModel, move_set: &[Move]) -> Result<Vec<f64>> {
    if move_set.len() < 2 {
        return Err(GameError::invalid(format!(
            "mixed strategy needs at least two moves, got {}",
            move_set.len()
        )));
    }
    let mixer = move_set[0].owner;
    if let Some(stray) = move_set.iter().find(|m| m.owner != mixer) {
        return Err(GameError::invalid(format!(
            "move '{}' does not belong to {:?}",
            stray.name, mixer
        )));
    }

    let opponents = model.moves(mixer.opponent());
    let opponent_payoffs: Vec<Vec<f64>> = move_set
        .iter()
        .map(|mv| {
            opponents
                .iter()
                .map(|o| model.payoff_of(o, mv))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;

    let rows = opponents.len();
    let cols = move_set.len();
    let a = DMatrix::from_fn(rows, cols, |r, c| {
        if r + 1 < rows {
            opponent_payoffs[c][r + 1] - opponent_payoffs[c][0]
        } else {
            1.0
        }
    });
    let mut b = DVector::<f64>::zeros(rows);
    b[rows - 1] = 1.0;

    let solution = if rows == cols {
        solve_square(a, &b)?
    } else {
        solve_least_squares(a, &b)?
    };

    into_distribution(solution.iter().copied().collect(), move_set)
}

fn solve_square(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let lu = a.lu();
    if lu.determinant().abs() < SINGULAR_TOLERANCE {
        return Err(GameError::NoMixedEquilibrium(
            "indifference system is singular".to_string(),
        ));
    }
    lu.solve(b).ok_or_else(|| {
        GameError::NoMixedEquilibrium("indifference system is singular".to_string())
    })
}

fn solve_least_squares(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    if svd.rank(SINGULAR_TOLERANCE) == 0 {
        return Err(GameError::NoMixedEquilibrium(
            "indifference system has rank zero".to_string(),
        ));
    }
    let x = svd
        .solve(b, SINGULAR_TOLERANCE)
        .map_err(|e| GameError::NoMixedEquilibrium(e.to_string()))?;
    let residual = (&a * &x - b).norm();
    if residual > RESIDUAL_TOLERANCE {
        return Err(GameError::NoMixedEquilibrium(format!(
            "no exact indifference solution (residual {:.3e})",
            residual
        )));
    }
    Ok(x)
}

/// Reject out-of-range components, then clamp rounding noise and renormalise
fn into_distribution(raw: Vec<f64>, move_set: &[Move]) -> Result<Vec<f64>> {
    for (p, mv) in raw.iter().zip(move_set) {
        if !p.is_finite() || *p < -PROBABILITY_TOLERANCE || *p > 1.0 + PROBABILITY_TOLERANCE {
            return Err(GameError::invalid(format!(
                "solved probability {:.6} for move '{}' lies outside [0, 1]",
                p, mv.name
            )));
        }
    }
    let clamped: Vec<f64> = raw.iter().map(|p| p.clamp(0.0, 1.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        return Err(GameError::NoMixedEquilibrium(
            "solved probabilities sum to zero".to_string(),
        ));
    }
    Ok(clamped.into_iter().map(|p| p / total).collect())
}

/// Equilibrium distribution for one player
///
/// A dominant pure move wins outright (probability one); otherwise the
/// indifference solution over the player's whole catalog is used.
pub fn equilibrium_distribution(model: &PayoffModel, player: Player) -> Result<Vec<f64>> {
    let moves = model.moves(player);
    if let Some(dominant) = model.dominant_move(moves, None)? {
        return Ok(moves
            .iter()
            .map(|m| if m.name == dominant.name { 1.0 } else { 0.0 })
            .collect());
    }
    solve_indifference(model, moves)
}
