//! Payoff model and pure-strategy analysis
//!
//! The model is an immutable lookup from (user move, computer move) to the
//! pair of payoffs. Pairs missing from the model are allowed at construction
//! time but fail fast on lookup, so an incomplete model can never silently
//! score a round as zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::moves::{Move, MoveKind, Player};

/// One cell of the payoff matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoffEntry {
    pub user_move_name: String,
    pub computer_move_name: String,
    pub user_payoff: f64,
    pub computer_payoff: f64,
}

impl PayoffEntry {
    pub fn new(
        user_move_name: impl Into<String>,
        computer_move_name: impl Into<String>,
        user_payoff: f64,
        computer_payoff: f64,
    ) -> Self {
        Self {
            user_move_name: user_move_name.into(),
            computer_move_name: computer_move_name.into(),
            user_payoff,
            computer_payoff,
        }
    }
}

/// Serializable game configuration as supplied by the surrounding layers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameDefinition {
    pub user_moves: Vec<Move>,
    pub computer_moves: Vec<Move>,
    pub payoff_matrix: Vec<PayoffEntry>,
}

impl GameDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_model(self) -> Result<PayoffModel> {
        PayoffModel::new(self.user_moves, self.computer_moves, self.payoff_matrix)
    }
}

/// Immutable payoff lookup for every (user move, computer move) pair
///
/// Serializes as a [`GameDefinition`] and is validated on deserialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "GameDefinition", into = "GameDefinition")]
pub struct PayoffModel {
    user_moves: Vec<Move>,
    computer_moves: Vec<Move>,
    user_index: HashMap<String, usize>,
    computer_index: HashMap<String, usize>,
    /// Row-major `[user][computer]`
    cells: Vec<Option<(f64, f64)>>,
}

fn index_catalog(catalog: &[Move], owner: Player) -> Result<HashMap<String, usize>> {
    if catalog.len() < 2 {
        return Err(GameError::invalid(format!(
            "{:?} needs at least two moves, got {}",
            owner,
            catalog.len()
        )));
    }
    let mut index = HashMap::with_capacity(catalog.len());
    for (i, m) in catalog.iter().enumerate() {
        if m.owner != owner {
            return Err(GameError::invalid(format!(
                "move '{}' belongs to {:?}, expected {:?}",
                m.name, m.owner, owner
            )));
        }
        if index.insert(m.name.clone(), i).is_some() {
            return Err(GameError::invalid(format!("duplicate move name '{}'", m.name)));
        }
    }
    Ok(index)
}

/// Catalogs and row-major entries for a symmetric game scored by move kind
fn symmetric_parts(moves: &[(&str, MoveKind)]) -> (Vec<Move>, Vec<Move>, Vec<PayoffEntry>) {
    let catalog = |owner: Player| -> Vec<Move> {
        moves
            .iter()
            .map(|(name, kind)| Move::new(*name, *kind, owner))
            .collect()
    };
    let mut entries = Vec::with_capacity(moves.len() * moves.len());
    for (user_name, user_kind) in moves {
        for (computer_name, computer_kind) in moves {
            let (u, c) = match (user_kind, computer_kind) {
                (MoveKind::Cooperative, MoveKind::Cooperative) => (3.0, 3.0),
                (MoveKind::Cooperative, MoveKind::Defective) => (0.0, 5.0),
                (MoveKind::Defective, MoveKind::Cooperative) => (5.0, 0.0),
                (MoveKind::Defective, MoveKind::Defective) => (1.0, 1.0),
            };
            entries.push(PayoffEntry::new(*user_name, *computer_name, u, c));
        }
    }
    (catalog(Player::User), catalog(Player::Computer), entries)
}

impl TryFrom<GameDefinition> for PayoffModel {
    type Error = GameError;

    fn try_from(definition: GameDefinition) -> Result<Self> {
        definition.into_model()
    }
}

impl From<PayoffModel> for GameDefinition {
    fn from(model: PayoffModel) -> Self {
        model.to_definition()
    }
}

impl PayoffModel {
    /// Build and validate a model
    ///
    /// Fails on catalogs with fewer than two moves, duplicate names, entries
    /// naming unknown moves, and duplicate entries for the same pair.
    pub fn new(
        user_moves: Vec<Move>,
        computer_moves: Vec<Move>,
        entries: Vec<PayoffEntry>,
    ) -> Result<Self> {
        let user_index = index_catalog(&user_moves, Player::User)?;
        let computer_index = index_catalog(&computer_moves, Player::Computer)?;
        let width = computer_moves.len();
        let mut cells = vec![None; user_moves.len() * width];

        for entry in entries {
            let u = *user_index
                .get(&entry.user_move_name)
                .ok_or_else(|| GameError::UnknownMove(entry.user_move_name.clone()))?;
            let c = *computer_index
                .get(&entry.computer_move_name)
                .ok_or_else(|| GameError::UnknownMove(entry.computer_move_name.clone()))?;
            if !entry.user_payoff.is_finite() || !entry.computer_payoff.is_finite() {
                return Err(GameError::invalid(format!(
                    "non-finite payoff for ({}, {})",
                    entry.user_move_name, entry.computer_move_name
                )));
            }
            let cell = &mut cells[u * width + c];
            if cell.is_some() {
                return Err(GameError::invalid(format!(
                    "duplicate payoff entry for ({}, {})",
                    entry.user_move_name, entry.computer_move_name
                )));
            }
            *cell = Some((entry.user_payoff, entry.computer_payoff));
        }

        Ok(Self {
            user_moves,
            computer_moves,
            user_index,
            computer_index,
            cells,
        })
    }

    /// Symmetric game with prisoner's-dilemma payoffs decided by move kind
    pub fn from_move_kinds(moves: &[(&str, MoveKind)]) -> Result<Self> {
        let (user_moves, computer_moves, entries) = symmetric_parts(moves);
        Self::new(user_moves, computer_moves, entries)
    }

    /// Two-move trade war with classic prisoner's-dilemma payoffs
    pub fn classic() -> Self {
        let (user_moves, computer_moves, entries) = symmetric_parts(&[
            ("negotiate", MoveKind::Cooperative),
            ("impose_tariffs", MoveKind::Defective),
        ]);
        let index = |catalog: &[Move]| -> HashMap<String, usize> {
            catalog
                .iter()
                .enumerate()
                .map(|(i, m)| (m.name.clone(), i))
                .collect()
        };
        Self {
            user_index: index(&user_moves),
            computer_index: index(&computer_moves),
            cells: entries
                .iter()
                .map(|e| Some((e.user_payoff, e.computer_payoff)))
                .collect(),
            user_moves,
            computer_moves,
        }
    }

    pub fn user_moves(&self) -> &[Move] {
        &self.user_moves
    }

    pub fn computer_moves(&self) -> &[Move] {
        &self.computer_moves
    }

    pub fn moves(&self, player: Player) -> &[Move] {
        match player {
            Player::User => &self.user_moves,
            Player::Computer => &self.computer_moves,
        }
    }

    pub fn find(&self, player: Player, name: &str) -> Option<&Move> {
        let index = match player {
            Player::User => &self.user_index,
            Player::Computer => &self.computer_index,
        };
        index.get(name).map(|&i| &self.moves(player)[i])
    }

    /// Payoffs `(user, computer)` for a pair of move names
    pub fn payoff_by_name(&self, user_move: &str, computer_move: &str) -> Result<(f64, f64)> {
        let missing = || GameError::MissingPayoff {
            user_move: user_move.to_string(),
            computer_move: computer_move.to_string(),
        };
        let u = *self.user_index.get(user_move).ok_or_else(missing)?;
        let c = *self.computer_index.get(computer_move).ok_or_else(missing)?;
        self.cells[u * self.computer_moves.len() + c].ok_or_else(missing)
    }

    /// Payoffs `(user, computer)` when both moves are played
    pub fn payoff_for(&self, user_move: &Move, computer_move: &Move) -> Result<(f64, f64)> {
        self.payoff_by_name(&user_move.name, &computer_move.name)
    }

    /// Payoff received by the owner of `mv` when the other side plays `opponent`
    pub fn payoff_of(&self, mv: &Move, opponent: &Move) -> Result<f64> {
        match (mv.owner, opponent.owner) {
            (Player::User, Player::Computer) => Ok(self.payoff_for(mv, opponent)?.0),
            (Player::Computer, Player::User) => Ok(self.payoff_for(opponent, mv)?.1),
            _ => Err(GameError::invalid(format!(
                "moves '{}' and '{}' belong to the same player",
                mv.name, opponent.name
            ))),
        }
    }

    /// True when every (user, computer) pair has an entry
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Payoff matrix from one player's point of view
    ///
    /// Rows are that player's moves, columns the opponent's, both in
    /// declaration order.
    pub fn matrix_for(&self, player: Player) -> Result<Vec<Vec<f64>>> {
        let opponents = self.moves(player.opponent());
        self.moves(player)
            .iter()
            .map(|mv| opponents.iter().map(|o| self.payoff_of(mv, o)).collect())
            .collect()
    }

    /// Serializable form of the model
    pub fn to_definition(&self) -> GameDefinition {
        let width = self.computer_moves.len();
        let payoff_matrix = self
            .cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                cell.map(|(u, c)| {
                    PayoffEntry::new(
                        self.user_moves[i / width].name.clone(),
                        self.computer_moves[i % width].name.clone(),
                        u,
                        c,
                    )
                })
            })
            .collect();
        GameDefinition {
            user_moves: self.user_moves.clone(),
            computer_moves: self.computer_moves.clone(),
            payoff_matrix,
        }
    }

    // ─────────────────────── Pure-strategy analysis ───────────────────────

    /// Strict payoff comparison against one opponent move; ties are not better
    pub fn better_payoff(&self, move_a: &Move, move_b: &Move, opponent: &Move) -> Result<bool> {
        Ok(self.payoff_of(move_a, opponent)? > self.payoff_of(move_b, opponent)?)
    }

    /// Whether `mv` weakly dominates every other candidate
    ///
    /// With `Some(opponent)` the comparison is against that opponent move
    /// only; with `None` it covers the opponent's whole catalog. When two
    /// candidates tie everywhere, only the one declared first counts as
    /// dominant.
    pub fn is_dominant(&self, mv: &Move, candidates: &[Move], opponent: Option<&Move>) -> Result<bool> {
        let opponents: Vec<&Move> = match opponent {
            Some(o) => vec![o],
            None => self.moves(mv.owner.opponent()).iter().collect(),
        };
        let own: Vec<f64> = opponents
            .iter()
            .map(|o| self.payoff_of(mv, o))
            .collect::<Result<_>>()?;

        let position = candidates.iter().position(|c| c.name == mv.name);
        for (i, other) in candidates.iter().enumerate() {
            if other.name == mv.name {
                continue;
            }
            let theirs: Vec<f64> = opponents
                .iter()
                .map(|o| self.payoff_of(other, o))
                .collect::<Result<_>>()?;
            if own.iter().zip(&theirs).any(|(a, b)| a < b) {
                return Ok(false);
            }
            let identical = own.iter().zip(&theirs).all(|(a, b)| a == b);
            if identical && position.map_or(true, |p| i < p) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// First dominant candidate in declaration order, if any
    pub fn dominant_move<'a>(
        &self,
        candidates: &'a [Move],
        opponent: Option<&Move>,
    ) -> Result<Option<&'a Move>> {
        for mv in candidates {
            if self.is_dominant(mv, candidates, opponent)? {
                return Ok(Some(mv));
            }
        }
        Ok(None)
    }
}
