//! Trade War game logic
//!
//! Decision and simulation core for a repeated two-player trade conflict:
//! payoff lookup and dominance analysis, mixed-strategy solving, the
//! phase-driven computer opponent and Monte Carlo campaigns over randomized
//! game lengths.
//! This crate is compiled to:
//! - Native (for the game server and batch analysis)
//! - WASM (for the browser front-end)

mod campaign;
mod decision;
mod duration;
mod engine;
mod error;
mod moves;
mod payoff;
mod phase;
mod profile;
mod random;
mod solver;
mod strategy;

#[cfg(feature = "wasm")]
mod wasm;

pub use campaign::{
    run_multi_profile_campaign, run_simulation_campaign, CampaignConfig, CampaignEvent, CampaignObserver,
    CampaignReport, CampaignSummary, CancellationToken, ChannelObserver, CombinationStats, FailedRun,
    MoveStatistics, MoveStats, MultiProfileReport, RoundsStatistics, RunOutcome, RunRecord, SilentObserver,
    SimulationResult, StrategyPick,
};
pub use decision::{epsilon_greedy_response, nash_equilibrium_move, sample_move, security_level_response};
pub use duration::{DiscreteWeibull, DurationComponent, DurationModel, DurationParams, DurationSample};
pub use engine::{advance_round, ComputerPolicy, GameState, RoundResult, RoundWinner};
pub use error::{GameError, Result};
pub use moves::{find_move, moves_of_kind, validate_distribution, Move, MoveKind, Player, PROBABILITY_TOLERANCE};
pub use payoff::{GameDefinition, PayoffEntry, PayoffModel};
pub use phase::{compute_round, play_full_game, play_game_with, GameConfig, GameOutcome, Phase};
pub use profile::{
    resolve_profile, Aggressiveness, ComputerProfile, DominantProbabilities, EpsilonSchedule, PhaseBoundaries,
    PhasePercentages, ProfileCatalog,
};
pub use random::SeededRng;
pub use solver::{equilibrium_distribution, solve_indifference};
pub use strategy::{
    mixed_draw, mixed_probabilities, next_move, MixedSequence, PolicyState, StrategyKind, StrategySettings,
};
