//! Behavioral strategy definitions and execution

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::moves::{find_move, moves_of_kind, validate_distribution, Move, MoveKind};
use crate::random::SeededRng;

/// Behavioral strategy kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Mirror the opponent's previous move. Open with the first move.
    CopyCat,
    /// Cooperate until the start round, then mirror the opponent.
    TitForTat,
    /// Cooperate until the opponent defects once, then always defect.
    GrimTrigger,
    /// Uniform choice over the catalog each round.
    Random,
    /// Sample from a fixed move distribution.
    Mixed,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::CopyCat,
        StrategyKind::TitForTat,
        StrategyKind::GrimTrigger,
        StrategyKind::Random,
        StrategyKind::Mixed,
    ];

    /// Snake-case label, identical to the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::CopyCat => "copy_cat",
            StrategyKind::TitForTat => "tit_for_tat",
            StrategyKind::GrimTrigger => "grim_trigger",
            StrategyKind::Random => "random",
            StrategyKind::Mixed => "mixed",
        }
    }

    /// Human-readable description (used by the WASM module)
    pub fn describe(self) -> &'static str {
        match self {
            StrategyKind::CopyCat => "Copies the opponent's last move. Opens with the chosen first move.",
            StrategyKind::TitForTat => "Cooperates until the start round, then copies the opponent.",
            StrategyKind::GrimTrigger => "Cooperates until the opponent defects once, then always defects.",
            StrategyKind::Random => "Picks any move uniformly at random each round.",
            StrategyKind::Mixed => "Samples each move from a fixed probability distribution.",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_cooperation_start_round() -> u32 {
    1
}

/// Settings for one player's behavioral strategy; fixed for a whole game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    pub kind: StrategyKind,
    /// Opening move (by name); defaults to the first declared move
    #[serde(default)]
    pub first_move: Option<String>,
    /// Tit-for-tat cooperates in every round before this one (1-based)
    #[serde(default = "default_cooperation_start_round")]
    pub cooperation_start_round: u32,
    /// Moves and probabilities used by the mixed strategy
    #[serde(default)]
    pub mixed_move_set: Option<Vec<Move>>,
}

impl StrategySettings {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            first_move: None,
            cooperation_start_round: default_cooperation_start_round(),
            mixed_move_set: None,
        }
    }

    pub fn with_first_move(mut self, name: impl Into<String>) -> Self {
        self.first_move = Some(name.into());
        self
    }

    pub fn with_cooperation_start_round(mut self, round: u32) -> Self {
        self.cooperation_start_round = round;
        self
    }

    pub fn with_mixed_move_set(mut self, moves: Vec<Move>) -> Self {
        self.mixed_move_set = Some(moves);
        self
    }

    /// Check the settings against the player's move catalog
    pub fn validate(&self, catalog: &[Move]) -> Result<()> {
        if catalog.is_empty() {
            return Err(GameError::invalid("strategy needs a non-empty move catalog"));
        }
        if let Some(name) = &self.first_move {
            if find_move(catalog, name).is_none() {
                return Err(GameError::UnknownMove(name.clone()));
            }
        }
        if self.kind == StrategyKind::Mixed {
            let set = self.mixed_set()?;
            for mv in set {
                if find_move(catalog, &mv.name).is_none() {
                    return Err(GameError::UnknownMove(mv.name.clone()));
                }
            }
            validate_distribution(&mixed_probabilities(set))?;
        }
        Ok(())
    }

    fn mixed_set(&self) -> Result<&[Move]> {
        match self.mixed_move_set.as_deref() {
            Some(set) if !set.is_empty() => Ok(set),
            _ => Err(GameError::invalid("mixed strategy requires a non-empty move set")),
        }
    }
}

/// Precomputed draws (indices into a move list) consumed in order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MixedSequence {
    pub draws: Vec<usize>,
    pub cursor: usize,
}

impl MixedSequence {
    /// Draw `len` indices from `probabilities`
    pub fn generate(probabilities: &[f64], len: usize, rng: &mut SeededRng) -> Result<Self> {
        validate_distribution(probabilities)?;
        let draws = (0..len)
            .map(|_| {
                rng.choose_weighted(probabilities)
                    .ok_or_else(|| GameError::invalid("distribution has no positive weight"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { draws, cursor: 0 })
    }

    /// Next precomputed draw, or `None` once exhausted
    pub fn next_draw(&mut self) -> Option<usize> {
        let draw = self.draws.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(draw)
    }

    pub fn remaining(&self) -> usize {
        self.draws.len().saturating_sub(self.cursor)
    }
}

/// Mutable memory of one behavioral policy, carried in the game state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Grim trigger has fired; never reset within a game
    pub grim_triggered: bool,
    #[serde(default)]
    pub mixed_sequence: Option<MixedSequence>,
}

/// Probabilities of a mixed move set, in order
pub fn mixed_probabilities(moves: &[Move]) -> Vec<f64> {
    moves.iter().map(|m| m.probability).collect()
}

/// Index into `moves` for one mixed-strategy draw
///
/// Consumes the precomputed sequence when one is present and not exhausted,
/// otherwise samples `probabilities` live.
pub fn mixed_draw(
    probabilities: &[f64],
    sequence: Option<&mut MixedSequence>,
    rng: &mut SeededRng,
) -> Result<usize> {
    if let Some(index) = sequence.and_then(MixedSequence::next_draw) {
        if index < probabilities.len() {
            return Ok(index);
        }
        return Err(GameError::invalid(format!(
            "precomputed draw {} outside move set of {}",
            index,
            probabilities.len()
        )));
    }
    rng.choose_weighted(probabilities)
        .ok_or_else(|| GameError::invalid("distribution has no positive weight"))
}

/// Execute a behavioral strategy for one round
///
/// # Arguments
/// * `settings` - The player's strategy settings
/// * `catalog` - The player's own move catalog
/// * `round` - Current round number (1-based)
/// * `opponent_history` - Opponent's moves in earlier rounds
/// * `state` - Policy memory, updated in place
/// * `rng` - Random number generator for this player
pub fn next_move(
    settings: &StrategySettings,
    catalog: &[Move],
    round: u32,
    opponent_history: &[Move],
    state: &mut PolicyState,
    rng: &mut SeededRng,
) -> Result<Move> {
    if catalog.is_empty() {
        return Err(GameError::invalid("strategy needs a non-empty move catalog"));
    }

    match settings.kind {
        StrategyKind::CopyCat => execute_copy_cat(settings, catalog, round, opponent_history, rng),
        StrategyKind::TitForTat => {
            if round < settings.cooperation_start_round || opponent_history.is_empty() {
                play_kind(settings, catalog, MoveKind::Cooperative, rng)
            } else {
                execute_copy_cat(settings, catalog, round, opponent_history, rng)
            }
        }
        StrategyKind::GrimTrigger => {
            if round < settings.cooperation_start_round {
                play_kind(settings, catalog, MoveKind::Cooperative, rng)
            } else {
                execute_grim_trigger(settings, catalog, opponent_history, state, rng)
            }
        }
        StrategyKind::Random => Ok(catalog[rng.next_range(catalog.len())].clone()),
        StrategyKind::Mixed => execute_mixed(settings, catalog, state, rng),
    }
}

/// The settings' opening move, or the first declared move
fn opening_move(settings: &StrategySettings, catalog: &[Move]) -> Result<Move> {
    match &settings.first_move {
        Some(name) => find_move(catalog, name)
            .cloned()
            .ok_or_else(|| GameError::UnknownMove(name.clone())),
        None => Ok(catalog[0].clone()),
    }
}

/// A move of the given kind: the opening move if it matches, else a
/// uniform draw among the catalog's moves of that kind
fn play_kind(
    settings: &StrategySettings,
    catalog: &[Move],
    kind: MoveKind,
    rng: &mut SeededRng,
) -> Result<Move> {
    if settings.first_move.is_some() {
        let opening = opening_move(settings, catalog)?;
        if opening.kind == kind {
            return Ok(opening);
        }
    }
    let options = moves_of_kind(catalog, kind);
    if options.is_empty() {
        return Err(GameError::invalid(format!("catalog has no {:?} move", kind)));
    }
    Ok(options[rng.next_range(options.len())].clone())
}

/// Copy-cat: mirror the opponent's last move by name, else by kind
fn execute_copy_cat(
    settings: &StrategySettings,
    catalog: &[Move],
    round: u32,
    opponent_history: &[Move],
    rng: &mut SeededRng,
) -> Result<Move> {
    match opponent_history.last() {
        Some(last) if round > 1 => match find_move(catalog, &last.name) {
            Some(same) => Ok(same.clone()),
            None => play_kind(settings, catalog, last.kind, rng),
        },
        _ => opening_move(settings, catalog),
    }
}

/// Grim trigger: cooperate until the opponent defects, then always defect
fn execute_grim_trigger(
    settings: &StrategySettings,
    catalog: &[Move],
    opponent_history: &[Move],
    state: &mut PolicyState,
    rng: &mut SeededRng,
) -> Result<Move> {
    if !state.grim_triggered && opponent_history.iter().any(Move::is_defective) {
        state.grim_triggered = true;
    }
    let kind = if state.grim_triggered {
        MoveKind::Defective
    } else {
        MoveKind::Cooperative
    };
    play_kind(settings, catalog, kind, rng)
}

/// Mixed: draw from the configured move set
fn execute_mixed(
    settings: &StrategySettings,
    catalog: &[Move],
    state: &mut PolicyState,
    rng: &mut SeededRng,
) -> Result<Move> {
    let set = settings.mixed_set()?;
    let probabilities = mixed_probabilities(set);
    let index = mixed_draw(&probabilities, state.mixed_sequence.as_mut(), rng)?;
    let chosen = &set[index];
    find_move(catalog, &chosen.name)
        .cloned()
        .ok_or_else(|| GameError::UnknownMove(chosen.name.clone()))
}
