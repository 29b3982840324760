//! Round execution engine

use log::trace;
use serde::{Deserialize, Serialize};

use crate::decision::{epsilon_greedy_response, nash_equilibrium_move, security_level_response};
use crate::error::{GameError, Result};
use crate::moves::{Move, Player};
use crate::payoff::PayoffModel;
use crate::phase::Phase;
use crate::random::SeededRng;
use crate::strategy::{mixed_draw, next_move, MixedSequence, PolicyState, StrategySettings};

/// How the computer picks its move in one round
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ComputerPolicy {
    /// Dominant move, else a draw from the mixed equilibrium
    Equilibrium,
    /// The computer's dominant move
    DominantMove,
    /// Best response to the user's last move, exploring with `epsilon`
    GreedyResponse { epsilon: f64 },
    /// Draw from the cached equalizer distribution
    MixedStrategy,
    /// Maximin move
    SecurityLevel,
}

/// Who scored more in a round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundWinner {
    User,
    Computer,
    Tie,
}

impl RoundWinner {
    pub fn from_payoffs(user_payoff: f64, computer_payoff: f64) -> Self {
        if user_payoff > computer_payoff {
            RoundWinner::User
        } else if computer_payoff > user_payoff {
            RoundWinner::Computer
        } else {
            RoundWinner::Tie
        }
    }
}

/// Result of a single round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_number: u32,
    pub user_move: Move,
    pub computer_move: Move,
    pub user_payoff: f64,
    pub computer_payoff: f64,
    pub winner: RoundWinner,
    pub running_user_total: f64,
    pub running_computer_total: f64,
    pub phase: Phase,
}

/// Everything that changes while one game is played
///
/// Owned by exactly one game. Serializable so a session layer can park it
/// between rounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub total_rounds: u32,
    /// Completed rounds; the next round is `round_index + 1`
    pub round_index: u32,
    pub phase: Phase,
    /// Cached computer distribution for the mixed-strategy phase
    pub equalizer_strategy: Option<Vec<f64>>,
    pub last_strategy_update_round: u32,
    /// Precomputed computer draws over its catalog
    pub generated_mixed_move_sequence: Option<MixedSequence>,
    pub user_policy: PolicyState,
    pub user_history: Vec<Move>,
    pub computer_history: Vec<Move>,
    pub running_user_total: f64,
    pub running_computer_total: f64,
}

impl GameState {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            total_rounds,
            round_index: 0,
            phase: Phase::Equilibrium,
            equalizer_strategy: None,
            last_strategy_update_round: 0,
            generated_mixed_move_sequence: None,
            user_policy: PolicyState::default(),
            user_history: Vec::with_capacity(total_rounds as usize),
            computer_history: Vec::with_capacity(total_rounds as usize),
            running_user_total: 0.0,
            running_computer_total: 0.0,
        }
    }

    pub fn last_computer_move(&self) -> Option<&Move> {
        self.computer_history.last()
    }

    pub fn last_user_move(&self) -> Option<&Move> {
        self.user_history.last()
    }

    pub fn is_finished(&self) -> bool {
        self.round_index >= self.total_rounds
    }

    /// Rounds not yet played, counting the next one
    pub fn remaining_rounds(&self) -> u32 {
        self.total_rounds.saturating_sub(self.round_index)
    }
}

fn computer_move(
    policy: &ComputerPolicy,
    state: &mut GameState,
    model: &PayoffModel,
    rng: &mut SeededRng,
) -> Result<Move> {
    let catalog = model.computer_moves();
    let chosen = match *policy {
        ComputerPolicy::Equilibrium => nash_equilibrium_move(model, Player::Computer, rng)?,
        ComputerPolicy::DominantMove => model
            .dominant_move(catalog, None)?
            .ok_or_else(|| GameError::invalid("computer has no dominant move"))?,
        ComputerPolicy::GreedyResponse { epsilon } => {
            epsilon_greedy_response(model, catalog, state.user_history.last(), epsilon, rng)?
        }
        ComputerPolicy::MixedStrategy => {
            let equalizer = state
                .equalizer_strategy
                .as_deref()
                .ok_or_else(|| GameError::invalid("mixed-strategy round without an equalizer"))?;
            if equalizer.len() != catalog.len() {
                return Err(GameError::invalid(format!(
                    "equalizer has {} entries for {} computer moves",
                    equalizer.len(),
                    catalog.len()
                )));
            }
            let index = mixed_draw(equalizer, state.generated_mixed_move_sequence.as_mut(), rng)?;
            &catalog[index]
        }
        ComputerPolicy::SecurityLevel => security_level_response(model, catalog)?,
    };
    Ok(chosen.clone())
}

/// Play one round and update the state
///
/// The user's behavioral strategy sees the computer's earlier moves, the
/// computer's policy sees the user's. A missing payoff aborts the round
/// before the totals, histories or round counter change.
pub fn advance_round(
    state: &mut GameState,
    user_settings: &StrategySettings,
    policy: &ComputerPolicy,
    model: &PayoffModel,
    rng: &mut SeededRng,
) -> Result<RoundResult> {
    if state.is_finished() {
        return Err(GameError::invalid(format!(
            "game already played all {} rounds",
            state.total_rounds
        )));
    }
    let round_number = state.round_index + 1;

    let user_move = next_move(
        user_settings,
        model.user_moves(),
        round_number,
        &state.computer_history,
        &mut state.user_policy,
        rng,
    )?;
    let computer_move = computer_move(policy, state, model, rng)?;
    let (user_payoff, computer_payoff) = model.payoff_for(&user_move, &computer_move)?;

    state.running_user_total += user_payoff;
    state.running_computer_total += computer_payoff;
    state.user_history.push(user_move.clone());
    state.computer_history.push(computer_move.clone());
    state.round_index = round_number;

    let result = RoundResult {
        round_number,
        user_move,
        computer_move,
        user_payoff,
        computer_payoff,
        winner: RoundWinner::from_payoffs(user_payoff, computer_payoff),
        running_user_total: state.running_user_total,
        running_computer_total: state.running_computer_total,
        phase: state.phase,
    };
    trace!(
        "round {}: {} vs {} -> ({}, {})",
        round_number,
        result.user_move.name,
        result.computer_move.name,
        user_payoff,
        computer_payoff
    );
    Ok(result)
}
