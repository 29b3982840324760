//! Monte Carlo simulation campaigns
//!
//! A campaign plays many independent games per candidate user strategy, each
//! with a length drawn from the duration model, and aggregates the results.
//! Every run is its own error boundary: a run that fails (or panics) becomes
//! a [`FailedRun`] and the campaign moves on.
//!
//! Runs derive their random source from `(seed, strategy index, run index)`
//! only, so sequential and parallel campaigns produce identical results.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::duration::{DurationComponent, DurationModel, DurationParams};
use crate::engine::{RoundResult, RoundWinner};
use crate::error::{GameError, Result};
use crate::payoff::PayoffModel;
use crate::phase::play_game_with;
use crate::profile::{resolve_profile, ComputerProfile};
use crate::random::SeededRng;
use crate::strategy::{StrategyKind, StrategySettings};

fn default_parallel() -> bool {
    true
}

/// Configuration of one campaign
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub model: PayoffModel,
    #[serde(default)]
    pub profile: ComputerProfile,
    pub strategies: Vec<StrategySettings>,
    pub num_simulations: u32,
    #[serde(default)]
    pub duration: DurationParams,
    #[serde(default)]
    pub seed: u64,
    /// Spread runs over the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Emit a progress event for every round of every run
    #[serde(default)]
    pub emit_round_progress: bool,
}

impl CampaignConfig {
    pub fn new(model: PayoffModel, strategies: Vec<StrategySettings>, num_simulations: u32) -> Self {
        Self {
            model,
            profile: ComputerProfile::default(),
            strategies,
            num_simulations,
            duration: DurationParams::default(),
            seed: 0,
            parallel: default_parallel(),
            emit_round_progress: false,
        }
    }
}

/// A successful run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_index: u32,
    pub rounds: u32,
    pub component: DurationComponent,
    pub final_user_payoff: f64,
    pub final_computer_payoff: f64,
    pub payoff_difference: f64,
    pub user_won: bool,
}

/// A run that ended in an error or a panic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_index: u32,
    pub rounds: u32,
    /// `GameError::kind()` label, or `"Panic"`
    pub error_kind: String,
    pub message: String,
    pub context: String,
}

/// How a run ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunRecord {
    Completed(RunOutcome),
    Failed(FailedRun),
}

impl RunRecord {
    pub fn rounds(&self) -> u32 {
        match self {
            RunRecord::Completed(outcome) => outcome.rounds,
            RunRecord::Failed(failure) => failure.rounds,
        }
    }
}

/// Usage statistics of one move
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    /// Rounds in which the move was played
    pub frequency: u64,
    /// `frequency` over all rounds of all successful runs
    pub frequency_share: f64,
    pub average_payoff: f64,
    /// Share of the move's rounds won by the player who made it
    pub win_rate: f64,
    /// Successful runs in which the move was played at least once
    pub usage_count: u32,
}

/// Statistics of one (user move, computer move) pairing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinationStats {
    pub user_move: String,
    pub computer_move: String,
    pub frequency: u64,
    pub frequency_share: f64,
    pub average_user_payoff: f64,
    pub average_computer_payoff: f64,
}

/// Per-move statistics for both players
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStatistics {
    pub total_rounds: u64,
    pub user: BTreeMap<String, MoveStats>,
    pub computer: BTreeMap<String, MoveStats>,
    pub combinations: Vec<CombinationStats>,
}

/// Count and payoff sums of one move or pairing
#[derive(Clone, Debug, Default)]
struct Tally {
    count: u64,
    sums: (f64, f64),
    wins: u64,
    runs: u32,
}

impl Tally {
    fn add(&mut self, payoffs: (f64, f64), won: bool) {
        self.count += 1;
        self.sums.0 += payoffs.0;
        self.sums.1 += payoffs.1;
        self.wins += won as u64;
    }

    fn absorb(&mut self, other: Tally) {
        self.count += other.count;
        self.sums.0 += other.sums.0;
        self.sums.1 += other.sums.1;
        self.wins += other.wins;
        self.runs += other.runs;
    }

    fn mean(&self, sum: f64) -> f64 {
        sum / self.count as f64
    }
}

/// Raw move counts, merged across runs before finalizing
#[derive(Clone, Debug, Default)]
struct MoveTally {
    rounds: u64,
    user: BTreeMap<String, Tally>,
    computer: BTreeMap<String, Tally>,
    combinations: BTreeMap<(String, String), Tally>,
}

fn absorb_all<K: Ord>(mine: &mut BTreeMap<K, Tally>, theirs: BTreeMap<K, Tally>) {
    for (key, tally) in theirs {
        mine.entry(key).or_default().absorb(tally);
    }
}

impl MoveTally {
    fn from_history(history: &[RoundResult]) -> Self {
        let mut tally = MoveTally { rounds: history.len() as u64, ..MoveTally::default() };
        for r in history {
            let payoffs = (r.user_payoff, r.computer_payoff);
            let (user, computer) = (r.user_move.name.clone(), r.computer_move.name.clone());
            tally.user.entry(user.clone()).or_default().add(payoffs, r.winner == RoundWinner::User);
            tally.computer.entry(computer.clone()).or_default().add((payoffs.1, payoffs.0), r.winner == RoundWinner::Computer);
            tally.combinations.entry((user, computer)).or_default().add(payoffs, false);
        }
        for t in tally.user.values_mut().chain(tally.computer.values_mut()) {
            t.runs = 1;
        }
        tally
    }

    fn merge(&mut self, other: MoveTally) {
        self.rounds += other.rounds;
        absorb_all(&mut self.user, other.user);
        absorb_all(&mut self.computer, other.computer);
        absorb_all(&mut self.combinations, other.combinations);
    }

    fn finalize(self) -> MoveStatistics {
        let total = self.rounds;
        let share = |count: u64| if total == 0 { 0.0 } else { count as f64 / total as f64 };
        let side = |tallies: BTreeMap<String, Tally>| -> BTreeMap<String, MoveStats> {
            tallies
                .into_iter()
                .map(|(name, t)| {
                    let stats = MoveStats {
                        frequency: t.count,
                        frequency_share: share(t.count),
                        average_payoff: t.mean(t.sums.0),
                        win_rate: t.wins as f64 / t.count as f64,
                        usage_count: t.runs,
                    };
                    (name, stats)
                })
                .collect()
        };
        let combinations = self
            .combinations
            .into_iter()
            .map(|((user_move, computer_move), t)| CombinationStats {
                user_move,
                computer_move,
                frequency: t.count,
                frequency_share: share(t.count),
                average_user_payoff: t.mean(t.sums.0),
                average_computer_payoff: t.mean(t.sums.1),
            })
            .collect();
        MoveStatistics {
            total_rounds: total,
            user: side(self.user),
            computer: side(self.computer),
            combinations,
        }
    }
}

/// Aggregated results of all runs for one candidate strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy_index: usize,
    pub strategy_kind: StrategyKind,
    pub mean_user_payoff: f64,
    pub std_user_payoff: f64,
    pub mean_computer_payoff: f64,
    pub std_computer_payoff: f64,
    pub mean_payoff_difference: f64,
    /// Fraction of successful runs the user won outright; ties count for neither
    pub win_rate: f64,
    pub successful_run_count: u32,
    pub failed_runs: Vec<FailedRun>,
    /// Runs never started because the campaign was cancelled
    pub skipped_runs: u32,
    pub runs: Vec<RunOutcome>,
    pub move_statistics: MoveStatistics,
}

/// Population mean and standard deviation; zero for an empty slice
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl SimulationResult {
    fn aggregate(
        strategy_index: usize,
        strategy_kind: StrategyKind,
        reports: Vec<Option<RunReport>>,
    ) -> Self {
        let mut runs = Vec::new();
        let mut failed_runs = Vec::new();
        let mut skipped_runs = 0;
        let mut tally = MoveTally::default();

        for report in reports {
            match report {
                None => skipped_runs += 1,
                Some(RunReport {
                    record: RunRecord::Completed(outcome),
                    tally: run_tally,
                }) => {
                    runs.push(outcome);
                    tally.merge(run_tally);
                }
                Some(RunReport {
                    record: RunRecord::Failed(failure),
                    ..
                }) => failed_runs.push(failure),
            }
        }

        let user: Vec<f64> = runs.iter().map(|r| r.final_user_payoff).collect();
        let computer: Vec<f64> = runs.iter().map(|r| r.final_computer_payoff).collect();
        let difference: Vec<f64> = runs.iter().map(|r| r.payoff_difference).collect();
        let (mean_user_payoff, std_user_payoff) = mean_std(&user);
        let (mean_computer_payoff, std_computer_payoff) = mean_std(&computer);
        let (mean_payoff_difference, _) = mean_std(&difference);
        let wins = runs.iter().filter(|r| r.user_won).count();
        let win_rate = if runs.is_empty() {
            0.0
        } else {
            wins as f64 / runs.len() as f64
        };

        Self {
            strategy_index,
            strategy_kind,
            mean_user_payoff,
            std_user_payoff,
            mean_computer_payoff,
            std_computer_payoff,
            mean_payoff_difference,
            win_rate,
            successful_run_count: runs.len() as u32,
            failed_runs,
            skipped_runs,
            runs,
            move_statistics: tally.finalize(),
        }
    }
}

/// Mean, spread and range of the drawn game lengths
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundsStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: u32,
    pub max: u32,
}

/// A strategy entry of the campaign, by position in `CampaignConfig::strategies`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPick {
    pub strategy_index: usize,
    pub strategy_kind: StrategyKind,
}

/// Best and worst strategies of a campaign
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    /// Highest mean user payoff
    pub best_strategy: Option<StrategyPick>,
    pub worst_strategy: Option<StrategyPick>,
    /// Highest win rate
    pub most_wins: Option<StrategyPick>,
}

/// Everything a campaign produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub profile: String,
    pub num_simulations: u32,
    pub rounds_statistics: RoundsStatistics,
    pub results: Vec<SimulationResult>,
    pub summary: CampaignSummary,
    /// Some runs were skipped because of cancellation
    pub cancelled: bool,
}

/// First result maximizing `key`; ties keep the earlier strategy
fn first_max_by(results: &[&SimulationResult], key: impl Fn(&SimulationResult) -> f64) -> Option<StrategyPick> {
    let mut best: Option<(&SimulationResult, f64)> = None;
    for &r in results {
        let value = key(r);
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((r, value)),
        }
    }
    best.map(|(r, _)| StrategyPick {
        strategy_index: r.strategy_index,
        strategy_kind: r.strategy_kind,
    })
}

impl CampaignSummary {
    fn from_results(results: &[SimulationResult]) -> Self {
        let scored: Vec<&SimulationResult> = results.iter().filter(|r| r.successful_run_count > 0).collect();
        Self {
            best_strategy: first_max_by(&scored, |r| r.mean_user_payoff),
            worst_strategy: first_max_by(&scored, |r| -r.mean_user_payoff),
            most_wins: first_max_by(&scored, |r| r.win_rate),
        }
    }
}

/// Notification emitted while a campaign runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CampaignEvent {
    RoundProgress {
        strategy_index: usize,
        strategy: StrategyKind,
        run_index: u32,
        round: RoundResult,
    },
    RunCompleted {
        strategy_index: usize,
        strategy: StrategyKind,
        run_index: u32,
        rounds: u32,
        record: RunRecord,
    },
    StrategyCompleted {
        result: Box<SimulationResult>,
    },
}

/// Receiver of campaign events
///
/// `on_progress` is fire-and-forget and may drop events; the runner calls
/// `on_strategy_complete` exactly once per strategy and implementations must
/// deliver it.
pub trait CampaignObserver: Send + Sync {
    fn on_progress(&self, event: CampaignEvent);

    fn on_strategy_complete(&self, result: &SimulationResult) {
        self.on_progress(CampaignEvent::StrategyCompleted {
            result: Box::new(result.clone()),
        })
    }
}

impl<F: Fn(CampaignEvent) + Send + Sync> CampaignObserver for F {
    fn on_progress(&self, event: CampaignEvent) {
        self(event)
    }
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl CampaignObserver for SilentObserver {
    fn on_progress(&self, _event: CampaignEvent) {}
}

/// Observer forwarding events into a bounded channel
///
/// Progress events are dropped while the channel is full; strategy results
/// block until there is room.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: SyncSender<CampaignEvent>,
}

impl ChannelObserver {
    pub fn bounded(capacity: usize) -> (Self, Receiver<CampaignEvent>) {
        let (sender, receiver) = sync_channel(capacity);
        (Self { sender }, receiver)
    }
}

impl CampaignObserver for ChannelObserver {
    fn on_progress(&self, event: CampaignEvent) {
        let _ = self.sender.try_send(event);
    }

    fn on_strategy_complete(&self, result: &SimulationResult) {
        // Only fails once the receiver is gone, and then nobody is listening
        let _ = self.sender.send(CampaignEvent::StrategyCompleted {
            result: Box::new(result.clone()),
        });
    }
}

/// Cooperative cancellation flag, checked before each run starts
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One finished run plus its move counts
struct RunReport {
    record: RunRecord,
    tally: MoveTally,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "run panicked".to_string()
    }
}

/// Shared, read-only inputs of every run for one strategy
struct StrategyRunner<'a> {
    config: &'a CampaignConfig,
    duration: &'a DurationModel,
    settings: &'a StrategySettings,
    strategy_index: usize,
    base_rng: SeededRng,
    observer: &'a dyn CampaignObserver,
    cancel: &'a CancellationToken,
}

impl StrategyRunner<'_> {
    /// Play one run inside its own error boundary; `None` when cancelled
    fn run(&self, run_index: u32) -> Option<RunReport> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let kind = self.settings.kind;
        let mut rng = self.base_rng.for_run(run_index as u64);
        let sample = self.duration.sample(&mut rng);

        let played = catch_unwind(AssertUnwindSafe(|| {
            play_game_with(
                &self.config.model,
                self.settings,
                &self.config.profile,
                sample.rounds,
                &mut rng,
                |round| {
                    if self.config.emit_round_progress {
                        self.observer.on_progress(CampaignEvent::RoundProgress {
                            strategy_index: self.strategy_index,
                            strategy: kind,
                            run_index,
                            round: round.clone(),
                        });
                    }
                },
            )
        }));

        let failure = |error_kind: &str, message: String| {
            let context = format!(
                "strategy {} (#{}), run {}, {} rounds, profile '{}'",
                kind, self.strategy_index, run_index, sample.rounds, self.config.profile.name
            );
            warn!("run failed: {} [{}]: {}", context, error_kind, message);
            RunReport {
                record: RunRecord::Failed(FailedRun {
                    run_index,
                    rounds: sample.rounds,
                    error_kind: error_kind.to_string(),
                    message,
                    context,
                }),
                tally: MoveTally::default(),
            }
        };

        let report = match played {
            Ok(Ok(outcome)) => {
                let difference = outcome.final_user_payoff - outcome.final_computer_payoff;
                RunReport {
                    tally: MoveTally::from_history(&outcome.history),
                    record: RunRecord::Completed(RunOutcome {
                        run_index,
                        rounds: sample.rounds,
                        component: sample.component,
                        final_user_payoff: outcome.final_user_payoff,
                        final_computer_payoff: outcome.final_computer_payoff,
                        payoff_difference: difference,
                        user_won: difference > 0.0,
                    }),
                }
            }
            Ok(Err(err)) => failure(err.kind(), err.to_string()),
            Err(payload) => failure("Panic", panic_message(payload.as_ref())),
        };

        // The completion report belongs to the run's error boundary too
        let notified = catch_unwind(AssertUnwindSafe(|| {
            self.observer.on_progress(CampaignEvent::RunCompleted {
                strategy_index: self.strategy_index,
                strategy: kind,
                run_index,
                rounds: sample.rounds,
                record: report.record.clone(),
            })
        }));
        match notified {
            Ok(()) => Some(report),
            Err(payload) => Some(failure("Panic", panic_message(payload.as_ref()))),
        }
    }
}

fn rounds_statistics(all_rounds: &[u32]) -> RoundsStatistics {
    let values: Vec<f64> = all_rounds.iter().map(|r| *r as f64).collect();
    let (mean, std) = mean_std(&values);
    RoundsStatistics {
        mean,
        std,
        min: all_rounds.iter().copied().min().unwrap_or(0),
        max: all_rounds.iter().copied().max().unwrap_or(0),
    }
}

/// Run every strategy of the campaign and aggregate the results
///
/// Configuration problems (no strategies, bad duration parameters, a
/// malformed profile) fail the whole campaign before any run starts. Errors
/// inside a run are recorded as failed runs instead.
pub fn run_simulation_campaign(
    config: &CampaignConfig,
    observer: &dyn CampaignObserver,
    cancel: &CancellationToken,
) -> Result<CampaignReport> {
    if config.strategies.is_empty() {
        return Err(GameError::invalid("campaign needs at least one strategy"));
    }
    if config.num_simulations == 0 {
        return Err(GameError::invalid("campaign needs at least one simulation per strategy"));
    }
    resolve_profile(&config.profile, config.duration.max_rounds)?;
    let duration = DurationModel::new(config.duration)?;

    info!(
        "campaign start: {} strategies x {} runs, profile '{}', seed {}",
        config.strategies.len(),
        config.num_simulations,
        config.profile.name,
        config.seed
    );

    let mut results = Vec::with_capacity(config.strategies.len());
    let mut all_rounds = Vec::new();
    for (strategy_index, settings) in config.strategies.iter().enumerate() {
        let runner = StrategyRunner {
            config,
            duration: &duration,
            settings,
            strategy_index,
            base_rng: SeededRng::new(config.seed, strategy_index as u64),
            observer,
            cancel,
        };

        let reports: Vec<Option<RunReport>> = if config.parallel {
            (0..config.num_simulations)
                .into_par_iter()
                .map(|run_index| runner.run(run_index))
                .collect()
        } else {
            (0..config.num_simulations)
                .map(|run_index| runner.run(run_index))
                .collect()
        };
        all_rounds.extend(reports.iter().flatten().map(|r| r.record.rounds()));

        let result = SimulationResult::aggregate(strategy_index, settings.kind, reports);
        info!(
            "strategy {} done: {} ok, {} failed, {} skipped, mean payoff {:.2}, win rate {:.3}",
            settings.kind,
            result.successful_run_count,
            result.failed_runs.len(),
            result.skipped_runs,
            result.mean_user_payoff,
            result.win_rate
        );
        observer.on_strategy_complete(&result);
        results.push(result);
    }

    let report = CampaignReport {
        profile: config.profile.name.clone(),
        num_simulations: config.num_simulations,
        rounds_statistics: rounds_statistics(&all_rounds),
        summary: CampaignSummary::from_results(&results),
        cancelled: results.iter().any(|r| r.skipped_runs > 0),
        results,
    };
    info!(
        "campaign done: best {:?}, most wins {:?}",
        report.summary.best_strategy, report.summary.most_wins
    );
    Ok(report)
}

/// Campaign reports for several profiles plus a cross-profile summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiProfileReport {
    pub reports: Vec<CampaignReport>,
    /// Mean user payoff of each strategy entry averaged over profiles, by
    /// strategy index
    pub strategy_averages: BTreeMap<usize, f64>,
    pub best_strategy_overall: Option<StrategyPick>,
}

/// Run the same campaign against each profile in turn
pub fn run_multi_profile_campaign(
    config: &CampaignConfig,
    profiles: &[ComputerProfile],
    observer: &dyn CampaignObserver,
    cancel: &CancellationToken,
) -> Result<MultiProfileReport> {
    if profiles.is_empty() {
        return Err(GameError::invalid("multi-profile campaign needs at least one profile"));
    }

    let mut reports = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let per_profile = CampaignConfig {
            profile: profile.clone(),
            ..config.clone()
        };
        reports.push(run_simulation_campaign(&per_profile, observer, cancel)?);
    }

    let mut sums: BTreeMap<usize, (f64, u32)> = BTreeMap::new();
    for result in reports.iter().flat_map(|r| &r.results) {
        if result.successful_run_count > 0 {
            let entry = sums.entry(result.strategy_index).or_insert((0.0, 0));
            entry.0 += result.mean_user_payoff;
            entry.1 += 1;
        }
    }
    let strategy_averages: BTreeMap<usize, f64> = sums
        .into_iter()
        .map(|(index, (sum, n))| (index, sum / n as f64))
        .collect();

    // Ties keep the lower index
    let best_strategy_overall = strategy_averages
        .iter()
        .rev()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(&strategy_index, _)| StrategyPick {
            strategy_index,
            strategy_kind: config.strategies[strategy_index].kind,
        });

    Ok(MultiProfileReport {
        reports,
        strategy_averages,
        best_strategy_overall,
    })
}
