//! Decision algorithms: epsilon-greedy best response, Nash-equilibrium
//! selection and the security-level (maximin) response

use crate::error::{GameError, Result};
use crate::moves::{Move, Player};
use crate::payoff::PayoffModel;
use crate::random::SeededRng;
use crate::solver::solve_indifference;

/// Sample one move from a probability vector aligned with `moves`
pub fn sample_move<'a>(moves: &'a [Move], probabilities: &[f64], rng: &mut SeededRng) -> Result<&'a Move> {
    if moves.len() != probabilities.len() {
        return Err(GameError::invalid(format!(
            "{} probabilities for {} moves",
            probabilities.len(),
            moves.len()
        )));
    }
    rng.choose_weighted(probabilities)
        .map(|i| &moves[i])
        .ok_or_else(|| GameError::invalid("distribution has no positive weight"))
}

/// Epsilon-greedy best response
///
/// With probability `epsilon` explores uniformly over `moves`; otherwise
/// exploits by picking the move with the highest payoff against the
/// opponent's last move (first declared wins ties). Before the opponent has
/// moved at all, exploitation falls back to the security-level response.
pub fn epsilon_greedy_response<'a>(
    model: &PayoffModel,
    moves: &'a [Move],
    opponent_last: Option<&Move>,
    epsilon: f64,
    rng: &mut SeededRng,
) -> Result<&'a Move> {
    if moves.is_empty() {
        return Err(GameError::invalid("no moves to choose from"));
    }
    if !(0.0..=1.0).contains(&epsilon) {
        return Err(GameError::invalid(format!("epsilon {} outside [0, 1]", epsilon)));
    }

    if rng.chance(epsilon) {
        return Ok(&moves[rng.next_range(moves.len())]);
    }

    let Some(opponent) = opponent_last else {
        return security_level_response(model, moves);
    };

    let mut best = &moves[0];
    let mut best_payoff = model.payoff_of(best, opponent)?;
    for mv in &moves[1..] {
        let payoff = model.payoff_of(mv, opponent)?;
        if payoff > best_payoff {
            best = mv;
            best_payoff = payoff;
        }
    }
    Ok(best)
}

/// Nash-equilibrium move selection
///
/// Plays the player's dominant move when one exists; otherwise samples from
/// the indifference distribution over the player's catalog.
pub fn nash_equilibrium_move<'a>(
    model: &'a PayoffModel,
    player: Player,
    rng: &mut SeededRng,
) -> Result<&'a Move> {
    let moves = model.moves(player);
    if let Some(dominant) = model.dominant_move(moves, None)? {
        return Ok(dominant);
    }
    let distribution = solve_indifference(model, moves)?;
    sample_move(moves, &distribution, rng)
}

/// Security-level (maximin) response
///
/// For every candidate takes its worst payoff over all opponent moves and
/// returns the candidate whose worst case is best; ties go to the candidate
/// declared first.
pub fn security_level_response<'a>(model: &PayoffModel, moves: &'a [Move]) -> Result<&'a Move> {
    let first = moves
        .first()
        .ok_or_else(|| GameError::invalid("no moves to choose from"))?;
    let opponents = model.moves(first.owner.opponent());

    let mut best: Option<(&Move, f64)> = None;
    for mv in moves {
        let mut worst = f64::INFINITY;
        for o in opponents {
            worst = worst.min(model.payoff_of(mv, o)?);
        }
        match best {
            Some((_, level)) if worst <= level => {}
            _ => best = Some((mv, worst)),
        }
    }
    Ok(best.map(|(mv, _)| mv).unwrap_or(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payoff::PayoffEntry;

    fn make_rng() -> SeededRng {
        SeededRng::new(42, 0)
    }

    fn pennies() -> PayoffModel {
        let users = vec![
            Move::cooperative("heads", Player::User),
            Move::cooperative("tails", Player::User),
        ];
        let computers = vec![
            Move::cooperative("heads", Player::Computer),
            Move::cooperative("tails", Player::Computer),
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

    #[test]
    fn test_greedy_exploits_with_zero_epsilon() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        let opponent = &model.user_moves()[0];
        for _ in 0..50 {
            let m = epsilon_greedy_response(&model, model.computer_moves(), Some(opponent), 0.0, &mut rng)
                .unwrap();
            assert_eq!(m.name, "impose_tariffs");
        }
    }

    #[test]
    fn test_greedy_explores_with_full_epsilon() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        let opponent = &model.user_moves()[0];
        let mut seen_negotiate = false;
        for _ in 0..100 {
            let m = epsilon_greedy_response(&model, model.computer_moves(), Some(opponent), 1.0, &mut rng)
                .unwrap();
            seen_negotiate |= m.name == "negotiate";
        }
        assert!(seen_negotiate);
    }

    #[test]
    fn test_greedy_is_reproducible() {
        let model = pennies();
        let opponent = &model.user_moves()[1];
        let run = |seed| {
            let mut rng = SeededRng::new(seed, 0);
            (0..30)
                .map(|_| {
                    epsilon_greedy_response(&model, model.computer_moves(), Some(opponent), 0.3, &mut rng)
                        .unwrap()
                        .name
                        .clone()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn test_greedy_responds_to_last_move() {
        let model = pennies();
        let mut rng = make_rng();
        let heads = &model.user_moves()[0];
        let tails = &model.user_moves()[1];
        let vs_heads =
            epsilon_greedy_response(&model, model.computer_moves(), Some(heads), 0.0, &mut rng).unwrap();
        let vs_tails =
            epsilon_greedy_response(&model, model.computer_moves(), Some(tails), 0.0, &mut rng).unwrap();
        assert_eq!(vs_heads.name, "tails");
        assert_eq!(vs_tails.name, "heads");
    }

    #[test]
    fn test_greedy_rejects_bad_epsilon() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        assert!(epsilon_greedy_response(&model, model.computer_moves(), None, 1.5, &mut rng).is_err());
        assert!(epsilon_greedy_response(&model, &[], None, 0.1, &mut rng).is_err());
    }

    #[test]
    fn test_greedy_without_history_uses_security_level() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        let m = epsilon_greedy_response(&model, model.computer_moves(), None, 0.0, &mut rng).unwrap();
        assert_eq!(m.name, "impose_tariffs");
    }

    #[test]
    fn test_nash_plays_dominant_move() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        for _ in 0..20 {
            assert_eq!(
                nash_equilibrium_move(&model, Player::Computer, &mut rng).unwrap().name,
                "impose_tariffs"
            );
        }
    }

    #[test]
    fn test_nash_samples_mixed_equilibrium() {
        let model = pennies();
        let mut rng = make_rng();
        let heads = (0..1000)
            .filter(|_| nash_equilibrium_move(&model, Player::Computer, &mut rng).unwrap().name == "heads")
            .count();
        assert!(heads > 400 && heads < 600, "heads drawn {} times", heads);
    }

    #[test]
    fn test_security_level_is_maximin() {
        let users = vec![
            Move::cooperative("safe", Player::User),
            Move::defective("risky", Player::User),
        ];
        let computers = vec![
            Move::cooperative("x", Player::Computer),
            Move::cooperative("y", Player::Computer),
        ];
        let model = PayoffModel::new(
            users,
            computers,
            vec![
                PayoffEntry::new("safe", "x", 2.0, 0.0),
                PayoffEntry::new("safe", "y", 2.0, 0.0),
                PayoffEntry::new("risky", "x", 10.0, 0.0),
                PayoffEntry::new("risky", "y", -5.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(security_level_response(&model, model.user_moves()).unwrap().name, "safe");
    }

    #[test]
    fn test_security_level_ties_go_to_first() {
        let model = pennies();
        assert_eq!(
            security_level_response(&model, model.computer_moves()).unwrap().name,
            "heads"
        );
    }

    #[test]
    fn test_sample_move_validates_lengths() {
        let model = PayoffModel::classic();
        let mut rng = make_rng();
        assert!(sample_move(model.user_moves(), &[1.0], &mut rng).is_err());
        assert!(sample_move(model.user_moves(), &[0.0, 0.0], &mut rng).is_err());
        assert_eq!(
            sample_move(model.user_moves(), &[0.0, 1.0], &mut rng).unwrap().name,
            "impose_tariffs"
        );
    }
}
