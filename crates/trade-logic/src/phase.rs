//! Phase orchestration and full-game play
//!
//! A game moves through three computer regimes in a fixed order:
//! equilibrium play, greedy best response, then a mixed strategy over a
//! cached equalizer distribution. Boundaries come from the computer profile.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::{advance_round, ComputerPolicy, GameState, RoundResult};
use crate::error::{GameError, Result};
use crate::moves::Player;
use crate::payoff::PayoffModel;
use crate::profile::{resolve_profile, ComputerProfile, PhaseBoundaries};
use crate::random::SeededRng;
use crate::solver::equilibrium_distribution;
use crate::strategy::{mixed_probabilities, MixedSequence, StrategyKind, StrategySettings};

/// Computer behavior regime; phases only ever move forward
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Equilibrium,
    GreedyResponse,
    MixedStrategy,
}

impl Phase {
    /// Phase of a 1-based round
    pub fn for_round(round: u32, boundaries: &PhaseBoundaries) -> Phase {
        if round <= boundaries.phase1_end {
            Phase::Equilibrium
        } else if round <= boundaries.phase2_end {
            Phase::GreedyResponse
        } else {
            Phase::MixedStrategy
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Equilibrium => "equilibrium",
            Phase::GreedyResponse => "greedy_response",
            Phase::MixedStrategy => "mixed_strategy",
        }
    }
}

/// Everything needed to play one game
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub model: PayoffModel,
    pub user_settings: StrategySettings,
    #[serde(default)]
    pub profile: ComputerProfile,
    pub total_rounds: u32,
    #[serde(default)]
    pub seed: u64,
}

/// Final totals and round-by-round history of one game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub final_user_payoff: f64,
    pub final_computer_payoff: f64,
    pub history: Vec<RoundResult>,
}

/// Cache the equalizer on entering the mixed phase and refresh it on cadence
fn refresh_equalizer(
    state: &mut GameState,
    profile: &ComputerProfile,
    model: &PayoffModel,
    round: u32,
    rng: &mut SeededRng,
) -> Result<()> {
    let refresh_every = profile.aggressiveness.refresh_every;
    let due = match state.equalizer_strategy {
        None => true,
        Some(_) => refresh_every > 0 && round.saturating_sub(state.last_strategy_update_round) >= refresh_every,
    };
    if !due {
        return Ok(());
    }

    let equalizer = equilibrium_distribution(model, Player::Computer)?;
    let remaining = state.remaining_rounds() as usize;
    state.generated_mixed_move_sequence = Some(MixedSequence::generate(&equalizer, remaining, rng)?);
    debug!("round {}: equalizer set to {:?}", round, equalizer);
    state.equalizer_strategy = Some(equalizer);
    state.last_strategy_update_round = round;
    Ok(())
}

/// Computer policy for the round
///
/// A dominant user move may be answered with the security-level move or an
/// exact best response; otherwise the computer plays its own dominant move
/// with the phase's probability, else the phase policy.
fn select_policy(
    state: &GameState,
    phase: Phase,
    profile: &ComputerProfile,
    model: &PayoffModel,
    round: u32,
    rng: &mut SeededRng,
) -> Result<ComputerPolicy> {
    let aggressiveness = &profile.aggressiveness;
    if let Some(last_user) = state.last_user_move() {
        let answer = aggressiveness.security_probability > 0.0 || aggressiveness.best_response_probability > 0.0;
        if answer && model.is_dominant(last_user, model.user_moves(), None)? {
            if rng.chance(aggressiveness.security_probability) {
                return Ok(ComputerPolicy::SecurityLevel);
            }
            if rng.chance(aggressiveness.best_response_probability) {
                return Ok(ComputerPolicy::GreedyResponse { epsilon: 0.0 });
            }
        }
    }

    let dominant_probability = aggressiveness.dominant_probabilities.for_phase(phase);
    if dominant_probability > 0.0
        && model.dominant_move(model.computer_moves(), None)?.is_some()
        && rng.chance(dominant_probability)
    {
        return Ok(ComputerPolicy::DominantMove);
    }

    Ok(match phase {
        Phase::Equilibrium => ComputerPolicy::Equilibrium,
        Phase::GreedyResponse => ComputerPolicy::GreedyResponse {
            epsilon: aggressiveness.epsilon.epsilon_at(round),
        },
        Phase::MixedStrategy => ComputerPolicy::MixedStrategy,
    })
}

/// Play the next round of a game in progress
///
/// Resolves the phase for the round, moves the state into it (never
/// backwards), prepares the mixed-phase equalizer when needed and plays the
/// round with the resulting computer policy.
pub fn compute_round(
    state: &mut GameState,
    settings: &StrategySettings,
    profile: &ComputerProfile,
    model: &PayoffModel,
    rng: &mut SeededRng,
) -> Result<RoundResult> {
    let boundaries = resolve_profile(profile, state.total_rounds)?;
    if state.is_finished() {
        return Err(GameError::invalid(format!(
            "game already played all {} rounds",
            state.total_rounds
        )));
    }
    let round = state.round_index + 1;

    let phase = Phase::for_round(round, &boundaries).max(state.phase);
    if phase != state.phase {
        debug!("round {}: phase {} -> {}", round, state.phase.label(), phase.label());
        state.phase = phase;
    }
    if phase == Phase::MixedStrategy {
        refresh_equalizer(state, profile, model, round, rng)?;
    }

    let policy = select_policy(state, phase, profile, model, round, rng)?;
    advance_round(state, settings, &policy, model, rng)
}

/// Play a whole game, reporting each round to `on_round`
///
/// The profile and strategy settings are checked before the first round.
pub fn play_game_with<F>(
    model: &PayoffModel,
    settings: &StrategySettings,
    profile: &ComputerProfile,
    total_rounds: u32,
    rng: &mut SeededRng,
    mut on_round: F,
) -> Result<GameOutcome>
where
    F: FnMut(&RoundResult),
{
    if total_rounds == 0 {
        return Err(GameError::invalid("a game needs at least one round"));
    }
    resolve_profile(profile, total_rounds)?;
    settings.validate(model.user_moves())?;

    let mut state = GameState::new(total_rounds);
    if settings.kind == StrategyKind::Mixed {
        if let Some(set) = &settings.mixed_move_set {
            state.user_policy.mixed_sequence = Some(MixedSequence::generate(
                &mixed_probabilities(set),
                total_rounds as usize,
                rng,
            )?);
        }
    }

    let mut history = Vec::with_capacity(total_rounds as usize);
    while !state.is_finished() {
        let result = compute_round(&mut state, settings, profile, model, rng)?;
        on_round(&result);
        history.push(result);
    }

    Ok(GameOutcome {
        final_user_payoff: state.running_user_total,
        final_computer_payoff: state.running_computer_total,
        history,
    })
}

/// Play a whole game from a self-contained configuration
pub fn play_full_game(config: &GameConfig) -> Result<GameOutcome> {
    let mut rng = SeededRng::new(config.seed, 0);
    play_game_with(
        &config.model,
        &config.user_settings,
        &config.profile,
        config.total_rounds,
        &mut rng,
        |_| {},
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::Move;
    use crate::payoff::PayoffEntry;
    use crate::profile::{DominantProbabilities, PhasePercentages};

    fn pennies() -> PayoffModel {
        let users = vec![
            Move::cooperative("heads", Player::User),
            Move::defective("tails", Player::User),
        ];
        let computers = vec![
            Move::cooperative("heads", Player::Computer),
            Move::defective("tails", Player::Computer),
        ];
        PayoffModel::new(
            users,
            computers,
            vec![
                PayoffEntry::new("heads", "heads", 1.0, -1.0),
                PayoffEntry::new("heads", "tails", -1.0, 1.0),
                PayoffEntry::new("tails", "heads", -1.0, 1.0),
                PayoffEntry::new("tails", "tails", 1.0, -1.0),
            ],
        )
        .unwrap()
    }

    fn make_rng() -> SeededRng {
        SeededRng::new(42, 0)
    }

    fn config(model: PayoffModel, kind: StrategyKind, rounds: u32) -> GameConfig {
        GameConfig {
            model,
            user_settings: StrategySettings::new(kind),
            profile: ComputerProfile::standard(),
            total_rounds: rounds,
            seed: 7,
        }
    }

    #[test]
    fn test_phase_for_round() {
        let b = PhaseBoundaries {
            phase1_end: 2,
            phase2_end: 5,
            phase3_end: 8,
        };
        assert_eq!(Phase::for_round(1, &b), Phase::Equilibrium);
        assert_eq!(Phase::for_round(2, &b), Phase::Equilibrium);
        assert_eq!(Phase::for_round(3, &b), Phase::GreedyResponse);
        assert_eq!(Phase::for_round(6, &b), Phase::MixedStrategy);
    }

    #[test]
    fn test_full_game_phases_are_monotonic() {
        let outcome = play_full_game(&config(pennies(), StrategyKind::Random, 50)).unwrap();
        assert_eq!(outcome.history.len(), 50);

        let phases: Vec<Phase> = outcome.history.iter().map(|r| r.phase).collect();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(phases[4], Phase::Equilibrium);
        assert_eq!(phases[5], Phase::GreedyResponse);
        assert_eq!(phases[30], Phase::MixedStrategy);
    }

    #[test]
    fn test_totals_match_history() {
        let outcome = play_full_game(&config(PayoffModel::classic(), StrategyKind::TitForTat, 40)).unwrap();
        let user: f64 = outcome.history.iter().map(|r| r.user_payoff).sum();
        let computer: f64 = outcome.history.iter().map(|r| r.computer_payoff).sum();
        assert_eq!(outcome.final_user_payoff, user);
        assert_eq!(outcome.final_computer_payoff, computer);
        let last = outcome.history.last().unwrap();
        assert_eq!(last.running_user_total, user);
        assert_eq!(last.round_number, 40);
    }

    #[test]
    fn test_same_seed_same_game() {
        let cfg = config(pennies(), StrategyKind::Random, 60);
        assert_eq!(play_full_game(&cfg).unwrap(), play_full_game(&cfg).unwrap());
    }

    #[test]
    fn test_equalizer_cached_and_refreshed_on_cadence() {
        let model = pennies();
        let settings = StrategySettings::new(StrategyKind::Random);
        let mut profile = ComputerProfile::new("MixedOnly", PhasePercentages::new(0.0, 0.0, 100.0));
        profile.aggressiveness.refresh_every = 4;
        profile.aggressiveness.security_probability = 0.0;
        let mut state = GameState::new(10);
        let mut rng = SeededRng::new(3, 0);

        let mut updates = Vec::new();
        for _ in 0..10 {
            compute_round(&mut state, &settings, &profile, &model, &mut rng).unwrap();
            updates.push(state.last_strategy_update_round);
        }
        assert_eq!(updates, vec![1, 1, 1, 1, 5, 5, 5, 5, 9, 9]);
        let eq = state.equalizer_strategy.as_ref().unwrap();
        assert!((eq[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_equalizer_never_refreshed_when_cadence_zero() {
        let model = pennies();
        let settings = StrategySettings::new(StrategyKind::Random);
        let mut profile = ComputerProfile::new("MixedOnly", PhasePercentages::new(0.0, 0.0, 100.0));
        profile.aggressiveness.refresh_every = 0;
        let mut state = GameState::new(12);
        let mut rng = SeededRng::new(3, 0);

        for _ in 0..12 {
            compute_round(&mut state, &settings, &profile, &model, &mut rng).unwrap();
        }
        assert_eq!(state.last_strategy_update_round, 1);
        assert_eq!(
            state.generated_mixed_move_sequence.as_ref().map(MixedSequence::remaining),
            Some(0)
        );
    }

    #[test]
    fn test_prisoners_dilemma_mixed_phase_plays_dominant_move() {
        let mut cfg = config(PayoffModel::classic(), StrategyKind::CopyCat, 30);
        cfg.profile = ComputerProfile::new("MixedOnly", PhasePercentages::new(0.0, 0.0, 100.0));
        let outcome = play_full_game(&cfg).unwrap();
        assert!(outcome
            .history
            .iter()
            .all(|r| r.computer_move.name == "impose_tariffs"));
    }

    #[test]
    fn test_security_override_on_dominant_user_move() {
        // Pure exploration, but the user always plays its dominant move
        let model = PayoffModel::classic();
        let settings = StrategySettings::new(StrategyKind::Mixed)
            .with_mixed_move_set(vec![Move::defective("impose_tariffs", Player::User).with_probability(1.0)]);
        let mut profile = ComputerProfile::new("AllGreedy", PhasePercentages::new(0.0, 100.0, 0.0));
        profile.aggressiveness.security_probability = 1.0;
        profile.aggressiveness.epsilon = crate::profile::EpsilonSchedule::Constant { value: 1.0 };
        let mut state = GameState::new(20);
        let mut rng = SeededRng::new(1, 0);

        compute_round(&mut state, &settings, &profile, &model, &mut rng).unwrap();
        for _ in 1..20 {
            let r = compute_round(&mut state, &settings, &profile, &model, &mut rng).unwrap();
            assert_eq!(r.computer_move.name, "impose_tariffs");
        }
    }

    #[test]
    fn test_dominant_probability_per_phase() {
        let model = PayoffModel::classic();
        let state = GameState::new(10);
        let mut rng = make_rng();
        let phases = [Phase::Equilibrium, Phase::GreedyResponse, Phase::MixedStrategy];

        for (i, phase) in phases.into_iter().enumerate() {
            let mut probabilities = [0.0; 3];
            let mut profile = ComputerProfile::standard();

            profile.aggressiveness.dominant_probabilities = DominantProbabilities::new(0.0, 0.0, 0.0);
            let policy = select_policy(&state, phase, &profile, &model, 3, &mut rng).unwrap();
            assert_ne!(policy, ComputerPolicy::DominantMove);

            probabilities[i] = 1.0;
            profile.aggressiveness.dominant_probabilities =
                DominantProbabilities::new(probabilities[0], probabilities[1], probabilities[2]);
            let policy = select_policy(&state, phase, &profile, &model, 3, &mut rng).unwrap();
            assert_eq!(policy, ComputerPolicy::DominantMove);

            // Certainty in another phase does not leak into this one
            let other = phases[(i + 1) % 3];
            let policy = select_policy(&state, other, &profile, &model, 3, &mut rng).unwrap();
            assert_ne!(policy, ComputerPolicy::DominantMove);
        }
    }

    #[test]
    fn test_dominant_probability_needs_a_dominant_move() {
        let mut profile = ComputerProfile::standard();
        profile.aggressiveness.dominant_probabilities = DominantProbabilities::new(1.0, 1.0, 1.0);
        let mut rng = make_rng();
        let policy = select_policy(&GameState::new(5), Phase::GreedyResponse, &profile, &pennies(), 2, &mut rng).unwrap();
        assert!(matches!(policy, ComputerPolicy::GreedyResponse { .. }));
    }

    #[test]
    fn test_best_response_to_dominant_user_move() {
        let model = PayoffModel::classic();
        let mut state = GameState::new(5);
        state.user_history.push(Move::defective("impose_tariffs", Player::User));
        let mut profile = ComputerProfile::new("MixedOnly", PhasePercentages::new(0.0, 0.0, 100.0));
        profile.aggressiveness.security_probability = 0.0;
        profile.aggressiveness.best_response_probability = 1.0;
        let mut rng = make_rng();

        let policy = select_policy(&state, Phase::MixedStrategy, &profile, &model, 2, &mut rng).unwrap();
        assert_eq!(policy, ComputerPolicy::GreedyResponse { epsilon: 0.0 });

        profile.aggressiveness.best_response_probability = 0.0;
        profile.aggressiveness.dominant_probabilities = DominantProbabilities::new(0.0, 0.0, 0.0);
        let policy = select_policy(&state, Phase::MixedStrategy, &profile, &model, 2, &mut rng).unwrap();
        assert_eq!(policy, ComputerPolicy::MixedStrategy);
    }

    #[test]
    fn test_restored_state_with_later_update_round() {
        let model = pennies();
        let settings = StrategySettings::new(StrategyKind::Random);
        let profile = ComputerProfile::new("MixedOnly", PhasePercentages::new(0.0, 0.0, 100.0));
        let mut state = GameState::new(10);
        state.phase = Phase::MixedStrategy;
        state.equalizer_strategy = Some(vec![0.5, 0.5]);
        state.last_strategy_update_round = 5;
        let mut rng = make_rng();

        let r = compute_round(&mut state, &settings, &profile, &model, &mut rng).unwrap();
        assert_eq!(r.round_number, 1);
        assert_eq!(state.last_strategy_update_round, 5);
    }

    #[test]
    fn test_invalid_profile_fails_before_play() {
        let mut cfg = config(PayoffModel::classic(), StrategyKind::Random, 10);
        cfg.profile = ComputerProfile::new("Broken", PhasePercentages::new(50.0, 50.0, 50.0));
        let mut rounds_played = 0;
        let mut rng = SeededRng::new(0, 0);
        let result = play_game_with(
            &cfg.model,
            &cfg.user_settings,
            &cfg.profile,
            cfg.total_rounds,
            &mut rng,
            |_| rounds_played += 1,
        );
        assert!(matches!(result, Err(GameError::InvalidProfile { .. })));
        assert_eq!(rounds_played, 0);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        assert!(play_full_game(&config(PayoffModel::classic(), StrategyKind::Random, 0)).is_err());
    }

    #[test]
    fn test_game_config_from_json() {
        let json = r#"{
            "model": {
                "user_moves": [
                    {"name": "negotiate", "kind": "cooperative", "owner": "user"},
                    {"name": "impose_tariffs", "kind": "defective", "owner": "user"}
                ],
                "computer_moves": [
                    {"name": "negotiate", "kind": "cooperative", "owner": "computer"},
                    {"name": "impose_tariffs", "kind": "defective", "owner": "computer"}
                ],
                "payoff_matrix": [
                    {"user_move_name": "negotiate", "computer_move_name": "negotiate", "user_payoff": 3, "computer_payoff": 3},
                    {"user_move_name": "negotiate", "computer_move_name": "impose_tariffs", "user_payoff": 0, "computer_payoff": 5},
                    {"user_move_name": "impose_tariffs", "computer_move_name": "negotiate", "user_payoff": 5, "computer_payoff": 0},
                    {"user_move_name": "impose_tariffs", "computer_move_name": "impose_tariffs", "user_payoff": 1, "computer_payoff": 1}
                ]
            },
            "user_settings": {"kind": "grim_trigger"},
            "total_rounds": 15
        }"#;
        let cfg: GameConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.profile.name, "Default");
        let outcome = play_full_game(&cfg).unwrap();
        assert_eq!(outcome.history.len(), 15);
    }
}
