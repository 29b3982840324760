//! Computer behavior profiles
//!
//! A profile splits a game into three phases by percentage and carries the
//! knobs that control how aggressively the computer exploits the user.
//! `resolve_profile` turns the percentages into concrete round boundaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::phase::Phase;

/// Tolerance on the percentage total
const PERCENT_TOLERANCE: f64 = 1e-6;

/// Share of the game spent in each phase, in percent
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhasePercentages {
    pub equilibrium: f64,
    pub greedy_response: f64,
    pub mixed_strategy: f64,
}

impl PhasePercentages {
    pub fn new(equilibrium: f64, greedy_response: f64, mixed_strategy: f64) -> Self {
        Self {
            equilibrium,
            greedy_response,
            mixed_strategy,
        }
    }
}

impl Default for PhasePercentages {
    /// Rounds 1-20 / 21-120 / 121-200 of a 200-round game
    fn default() -> Self {
        Self::new(10.0, 50.0, 40.0)
    }
}

/// Exploration rate of the greedy-response phase as a function of the round
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EpsilonSchedule {
    Constant { value: f64 },
    /// Straight line from `start` at round 0 to `end` at `end_round`, then flat
    Linear { start: f64, end: f64, end_round: u32 },
    /// `base * 2^(-round / tau) + floor`, settling at `floor` once `round >= tau`
    Decay { base: f64, floor: f64, tau: f64 },
    Piecewise { early: f64, late: f64, switch_round: u32 },
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule::Constant { value: 0.3 }
    }
}

impl EpsilonSchedule {
    /// Epsilon for a 1-based round, clamped to [0, 1]
    pub fn epsilon_at(&self, round: u32) -> f64 {
        let r = round as f64;
        let raw = match *self {
            EpsilonSchedule::Constant { value } => value,
            EpsilonSchedule::Linear { start, end, end_round } => {
                if end_round == 0 || round >= end_round {
                    end
                } else {
                    start + (end - start) * r / end_round as f64
                }
            }
            EpsilonSchedule::Decay { base, floor, tau } => {
                if r >= tau {
                    floor
                } else {
                    base * (-r / tau).exp2() + floor
                }
            }
            EpsilonSchedule::Piecewise { early, late, switch_round } => {
                if round < switch_round {
                    early
                } else {
                    late
                }
            }
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let values: Vec<f64> = match *self {
            EpsilonSchedule::Constant { value } => vec![value],
            EpsilonSchedule::Linear { start, end, .. } => vec![start, end],
            EpsilonSchedule::Decay { base, floor, tau } => {
                if !(tau.is_finite() && tau > 0.0) {
                    return Err(format!("decay tau must be positive, got {}", tau));
                }
                vec![base, floor]
            }
            EpsilonSchedule::Piecewise { early, late, .. } => vec![early, late],
        };
        match values.iter().find(|v| !v.is_finite()) {
            Some(v) => Err(format!("epsilon parameter {} is not finite", v)),
            None => Ok(()),
        }
    }
}

/// Chance per phase of playing the computer's dominant move, when it has one
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DominantProbabilities {
    #[serde(alias = "p1")]
    pub equilibrium: f64,
    #[serde(alias = "p2")]
    pub greedy_response: f64,
    #[serde(alias = "p3")]
    pub mixed_strategy: f64,
}

impl DominantProbabilities {
    pub fn new(equilibrium: f64, greedy_response: f64, mixed_strategy: f64) -> Self {
        Self {
            equilibrium,
            greedy_response,
            mixed_strategy,
        }
    }

    pub fn for_phase(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Equilibrium => self.equilibrium,
            Phase::GreedyResponse => self.greedy_response,
            Phase::MixedStrategy => self.mixed_strategy,
        }
    }
}

impl Default for DominantProbabilities {
    fn default() -> Self {
        Self::new(0.6, 0.4, 0.2)
    }
}

fn default_security_probability() -> f64 {
    0.5
}

fn default_best_response_probability() -> f64 {
    0.6
}

fn default_refresh_every() -> u32 {
    10
}

/// How hard the computer pushes once past the equilibrium phase
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggressiveness {
    #[serde(default)]
    pub epsilon: EpsilonSchedule,
    #[serde(default)]
    pub dominant_probabilities: DominantProbabilities,
    /// Chance of answering a dominant user move with the security-level move
    #[serde(default = "default_security_probability")]
    pub security_probability: f64,
    /// Chance of answering a dominant user move with an exact best response,
    /// tried once the security-level draw has failed
    #[serde(default = "default_best_response_probability")]
    pub best_response_probability: f64,
    /// Rounds between equalizer recomputations in the mixed phase; 0 = never
    #[serde(default = "default_refresh_every")]
    pub refresh_every: u32,
}

impl Default for Aggressiveness {
    fn default() -> Self {
        Self {
            epsilon: EpsilonSchedule::default(),
            dominant_probabilities: DominantProbabilities::default(),
            security_probability: default_security_probability(),
            best_response_probability: default_best_response_probability(),
            refresh_every: default_refresh_every(),
        }
    }
}

/// Named computer behavior configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputerProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phase_percentages: PhasePercentages,
    #[serde(default)]
    pub aggressiveness: Aggressiveness,
}

impl ComputerProfile {
    pub fn new(name: impl Into<String>, phase_percentages: PhasePercentages) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            phase_percentages,
            aggressiveness: Aggressiveness::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_aggressiveness(mut self, aggressiveness: Aggressiveness) -> Self {
        self.aggressiveness = aggressiveness;
        self
    }

    /// Balanced profile: 10% equilibrium, 50% greedy, 40% mixed
    pub fn standard() -> Self {
        Self::new("Default", PhasePercentages::default())
            .with_description("Balanced opponent: brief equilibrium play, long exploitation, mixed finish.")
    }

    /// Exploitative profile with a short opening and decaying exploration
    pub fn hawk() -> Self {
        Self::new("Hawk", PhasePercentages::new(5.0, 70.0, 25.0))
            .with_description("Aggressive opponent that exploits quickly and rarely explores.")
            .with_aggressiveness(Aggressiveness {
                epsilon: EpsilonSchedule::Decay {
                    base: 0.3,
                    floor: 0.05,
                    tau: 40.0,
                },
                dominant_probabilities: DominantProbabilities::new(0.8, 0.7, 0.5),
                security_probability: 0.8,
                best_response_probability: 0.8,
                refresh_every: 10,
            })
    }

    /// Conciliatory profile with long equilibrium play and heavy exploration
    pub fn dove() -> Self {
        Self::new("Dove", PhasePercentages::new(30.0, 30.0, 40.0))
            .with_description("Cautious opponent that explores often and seldom retaliates.")
            .with_aggressiveness(Aggressiveness {
                epsilon: EpsilonSchedule::Constant { value: 0.5 },
                dominant_probabilities: DominantProbabilities::new(0.4, 0.2, 0.1),
                security_probability: 0.2,
                best_response_probability: 0.3,
                refresh_every: 20,
            })
    }

    fn invalid(&self, reason: impl Into<String>) -> GameError {
        GameError::InvalidProfile {
            profile: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Check percentages and aggressiveness parameters
    pub fn validate(&self) -> Result<()> {
        let p = &self.phase_percentages;
        let shares = [p.equilibrium, p.greedy_response, p.mixed_strategy];
        if let Some(bad) = shares.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(self.invalid(format!("phase percentage {} must be a non-negative number", bad)));
        }
        let total: f64 = shares.iter().sum();
        if (total - 100.0).abs() > PERCENT_TOLERANCE {
            return Err(self.invalid(format!("phase percentages sum to {}, expected 100", total)));
        }

        let a = &self.aggressiveness;
        let d = &a.dominant_probabilities;
        let probabilities = [
            ("security", a.security_probability),
            ("best response", a.best_response_probability),
            ("phase 1 dominant", d.equilibrium),
            ("phase 2 dominant", d.greedy_response),
            ("phase 3 dominant", d.mixed_strategy),
        ];
        for (label, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(self.invalid(format!("{} probability {} outside [0, 1]", label, p)));
            }
        }
        a.epsilon.validate().map_err(|reason| self.invalid(reason))
    }
}

impl Default for ComputerProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// Last round (1-based, inclusive) of each phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    pub phase1_end: u32,
    pub phase2_end: u32,
    pub phase3_end: u32,
}

/// Floor of `total * percent / 100`, tolerant of representation error
fn share_of(total: u32, percent: f64) -> u32 {
    let exact = total as f64 * percent / 100.0;
    (exact + 1e-9).floor().max(0.0) as u32
}

/// Convert a profile's percentages into round boundaries for one game
///
/// Each phase gets the floor of its share; whatever the flooring leaves over
/// goes to the final phase, so `phase3_end == total_rounds` always.
pub fn resolve_profile(profile: &ComputerProfile, total_rounds: u32) -> Result<PhaseBoundaries> {
    profile.validate()?;
    let p = &profile.phase_percentages;
    let phase1_end = share_of(total_rounds, p.equilibrium).min(total_rounds);
    let phase2_end = phase1_end
        .saturating_add(share_of(total_rounds, p.greedy_response))
        .min(total_rounds);
    Ok(PhaseBoundaries {
        phase1_end,
        phase2_end,
        phase3_end: total_rounds,
    })
}

/// Named collection of computer profiles
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, ComputerProfile>,
}

impl ProfileCatalog {
    /// Catalog of the built-in profiles
    pub fn builtin() -> Self {
        let mut catalog = Self {
            profiles: BTreeMap::new(),
        };
        for profile in [ComputerProfile::standard(), ComputerProfile::hawk(), ComputerProfile::dove()] {
            catalog.insert(profile);
        }
        catalog
    }

    /// Built-ins overlaid with `{"profiles": {name: profile, ...}}`
    ///
    /// Loaded profiles replace built-ins of the same name; map keys fill
    /// missing names.
    pub fn from_json(json: &str) -> Result<Self> {
        let loaded: ProfileCatalog = serde_json::from_str(json)?;
        let mut catalog = Self::builtin();
        for (key, mut profile) in loaded.profiles {
            if profile.name.is_empty() {
                profile.name = key;
            }
            profile.validate()?;
            catalog.insert(profile);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, profile: ComputerProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Result<&ComputerProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| GameError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn describe(&self, name: &str) -> Result<&str> {
        self.get(name).map(|p| p.description.as_str())
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ComputerProfile> {
        self.profiles.values()
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_boundaries() {
        let b = resolve_profile(&ComputerProfile::standard(), 200).unwrap();
        assert_eq!(
            b,
            PhaseBoundaries {
                phase1_end: 20,
                phase2_end: 120,
                phase3_end: 200
            }
        );
    }

    #[test]
    fn test_remainder_goes_to_final_phase() {
        let profile = ComputerProfile::new("Thirds", PhasePercentages::new(100.0 / 3.0, 100.0 / 3.0, 100.0 / 3.0));
        let b = resolve_profile(&profile, 10).unwrap();
        assert_eq!(b.phase1_end, 3);
        assert_eq!(b.phase2_end, 6);
        assert_eq!(b.phase3_end, 10);
    }

    #[test]
    fn test_zero_share_phases() {
        let profile = ComputerProfile::new("AllGreedy", PhasePercentages::new(0.0, 100.0, 0.0));
        let b = resolve_profile(&profile, 7).unwrap();
        assert_eq!((b.phase1_end, b.phase2_end, b.phase3_end), (0, 7, 7));

        let b = resolve_profile(&ComputerProfile::standard(), 0).unwrap();
        assert_eq!((b.phase1_end, b.phase2_end, b.phase3_end), (0, 0, 0));
    }

    #[test]
    fn test_invalid_percentages() {
        let short = ComputerProfile::new("Short", PhasePercentages::new(10.0, 10.0, 10.0));
        assert!(matches!(
            resolve_profile(&short, 100),
            Err(GameError::InvalidProfile { .. })
        ));

        let negative = ComputerProfile::new("Negative", PhasePercentages::new(-10.0, 60.0, 50.0));
        assert!(matches!(
            resolve_profile(&negative, 100),
            Err(GameError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_invalid_aggressiveness() {
        let mut profile = ComputerProfile::standard();
        profile.aggressiveness.security_probability = 1.5;
        assert!(profile.validate().is_err());

        let mut profile = ComputerProfile::standard();
        profile.aggressiveness.epsilon = EpsilonSchedule::Decay {
            base: 0.3,
            floor: 0.0,
            tau: 0.0,
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_epsilon_schedules() {
        assert_eq!(EpsilonSchedule::Constant { value: 0.3 }.epsilon_at(50), 0.3);
        assert_eq!(EpsilonSchedule::Constant { value: 2.0 }.epsilon_at(1), 1.0);

        let linear = EpsilonSchedule::Linear {
            start: 0.5,
            end: 0.1,
            end_round: 100,
        };
        assert!((linear.epsilon_at(50) - 0.3).abs() < 1e-12);
        assert_eq!(linear.epsilon_at(150), 0.1);

        let decay = EpsilonSchedule::Decay {
            base: 0.4,
            floor: 0.05,
            tau: 10.0,
        };
        assert!((decay.epsilon_at(0) - 0.45).abs() < 1e-12);
        assert!((decay.epsilon_at(5) - (0.4 * 0.5f64.sqrt() + 0.05)).abs() < 1e-12);
        assert_eq!(decay.epsilon_at(10), 0.05);

        let piecewise = EpsilonSchedule::Piecewise {
            early: 0.4,
            late: 0.1,
            switch_round: 30,
        };
        assert_eq!(piecewise.epsilon_at(29), 0.4);
        assert_eq!(piecewise.epsilon_at(30), 0.1);
    }

    #[test]
    fn test_catalog_builtin_and_lookup() {
        let catalog = ProfileCatalog::builtin();
        assert_eq!(catalog.names(), vec!["Default", "Dove", "Hawk"]);
        assert!(catalog.describe("Hawk").unwrap().contains("Aggressive"));
        assert!(matches!(
            catalog.get("Vulture"),
            Err(GameError::UnknownProfile(_))
        ));
        for profile in catalog.profiles() {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "profiles": {
                "Tariff Hawk": {
                    "description": "Escalates fast",
                    "phase_percentages": {"equilibrium": 5, "greedy_response": 80, "mixed_strategy": 15},
                    "aggressiveness": {
                        "epsilon": {"type": "linear", "start": 0.4, "end": 0.05, "end_round": 60},
                        "security_probability": 0.9
                    }
                }
            }
        }"#;
        let catalog = ProfileCatalog::from_json(json).unwrap();
        let profile = catalog.get("Tariff Hawk").unwrap();
        assert_eq!(profile.name, "Tariff Hawk");
        assert_eq!(profile.aggressiveness.refresh_every, 10);
        assert_eq!(resolve_profile(profile, 100).unwrap().phase2_end, 85);

        let bad = r#"{"profiles": {"Bad": {"phase_percentages": {"equilibrium": 50, "greedy_response": 60, "mixed_strategy": 0}}}}"#;
        assert!(ProfileCatalog::from_json(bad).is_err());
    }

    #[test]
    fn test_loaded_catalog_keeps_builtins() {
        let json = r#"{
            "profiles": {
                "Envoy": {"phase_percentages": {"equilibrium": 50, "greedy_response": 25, "mixed_strategy": 25}},
                "Hawk": {"description": "Local hawk", "phase_percentages": {"equilibrium": 0, "greedy_response": 100, "mixed_strategy": 0}}
            }
        }"#;
        let catalog = ProfileCatalog::from_json(json).unwrap();
        assert_eq!(catalog.names(), vec!["Default", "Dove", "Envoy", "Hawk"]);
        assert_eq!(catalog.get("Default").unwrap(), &ComputerProfile::standard());
        assert_eq!(catalog.describe("Hawk").unwrap(), "Local hawk");
        assert_eq!(catalog.get("Envoy").unwrap().name, "Envoy");
    }

    #[test]
    fn test_dominant_probabilities() {
        let d = ComputerProfile::standard().aggressiveness.dominant_probabilities;
        assert_eq!(d.for_phase(Phase::Equilibrium), 0.6);
        assert_eq!(d.for_phase(Phase::GreedyResponse), 0.4);
        assert_eq!(d.for_phase(Phase::MixedStrategy), 0.2);

        let parsed: DominantProbabilities = serde_json::from_str(r#"{"p1": 1.0, "p2": 0.5, "p3": 0.0}"#).unwrap();
        assert_eq!(parsed, DominantProbabilities::new(1.0, 0.5, 0.0));

        let mut profile = ComputerProfile::hawk();
        profile.aggressiveness.dominant_probabilities.mixed_strategy = -0.1;
        assert!(profile.validate().is_err());
    }
}
