//! Stochastic game-length model
//!
//! A two-component mixture of discrete Weibull distributions with survival
//! `S(k) = q^(k^β)`. The negotiable component (β > 1) has a rising hazard of
//! ending, the entrenched one (β < 1) a falling hazard. Samples are drawn by
//! walking the hazard round by round, so they are always whole rounds.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::random::SeededRng;

/// Bisection steps used to calibrate `q`
const CALIBRATION_STEPS: usize = 100;

/// Bracket for `λ = -ln q` during calibration
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 50.0;

/// Parameters of the duration mixture
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationParams {
    pub min_rounds: u32,
    pub max_rounds: u32,
    /// Target mean length of the negotiable component
    pub mean_rounds: f64,
    #[serde(default = "DurationParams::default_negotiable_weight")]
    pub negotiable_weight: f64,
    #[serde(default = "DurationParams::default_negotiable_beta")]
    pub negotiable_beta: f64,
    #[serde(default = "DurationParams::default_entrenched_beta")]
    pub entrenched_beta: f64,
    /// Entrenched mean relative to `mean_rounds`
    #[serde(default = "DurationParams::default_entrenched_mean_factor")]
    pub entrenched_mean_factor: f64,
}

impl DurationParams {
    fn default_negotiable_weight() -> f64 {
        0.8
    }

    fn default_negotiable_beta() -> f64 {
        1.5
    }

    fn default_entrenched_beta() -> f64 {
        0.7
    }

    fn default_entrenched_mean_factor() -> f64 {
        1.2
    }

    /// Bounds and mean with the standard mixture shape
    pub fn new(min_rounds: u32, max_rounds: u32, mean_rounds: f64) -> Self {
        Self {
            min_rounds,
            max_rounds,
            mean_rounds,
            negotiable_weight: Self::default_negotiable_weight(),
            negotiable_beta: Self::default_negotiable_beta(),
            entrenched_beta: Self::default_entrenched_beta(),
            entrenched_mean_factor: Self::default_entrenched_mean_factor(),
        }
    }

    /// Games of exactly `rounds` rounds
    pub fn fixed(rounds: u32) -> Self {
        Self::new(rounds, rounds, rounds as f64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_rounds == 0 {
            return Err(GameError::invalid("min_rounds must be at least 1"));
        }
        if self.min_rounds > self.max_rounds {
            return Err(GameError::invalid(format!(
                "min_rounds {} exceeds max_rounds {}",
                self.min_rounds, self.max_rounds
            )));
        }
        if !self.mean_rounds.is_finite() || self.mean_rounds <= 0.0 {
            return Err(GameError::invalid(format!("mean_rounds {} must be positive", self.mean_rounds)));
        }
        if !(0.0..=1.0).contains(&self.negotiable_weight) {
            return Err(GameError::invalid(format!(
                "negotiable_weight {} outside [0, 1]",
                self.negotiable_weight
            )));
        }
        for beta in [self.negotiable_beta, self.entrenched_beta] {
            if !beta.is_finite() || beta <= 0.0 {
                return Err(GameError::invalid(format!("Weibull shape {} must be positive", beta)));
            }
        }
        if !self.entrenched_mean_factor.is_finite() || self.entrenched_mean_factor <= 0.0 {
            return Err(GameError::invalid("entrenched_mean_factor must be positive"));
        }
        Ok(())
    }
}

impl Default for DurationParams {
    fn default() -> Self {
        Self::new(50, 500, 200.0)
    }
}

/// Discrete Weibull distribution over rounds 1, 2, ...
///
/// Deserialization goes through [`DiscreteWeibull::new`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeibullShape")]
pub struct DiscreteWeibull {
    pub q: f64,
    pub beta: f64,
}

#[derive(Deserialize)]
struct WeibullShape {
    q: f64,
    beta: f64,
}

impl TryFrom<WeibullShape> for DiscreteWeibull {
    type Error = GameError;

    fn try_from(shape: WeibullShape) -> Result<Self> {
        Self::new(shape.q, shape.beta)
    }
}

impl DiscreteWeibull {
    pub fn new(q: f64, beta: f64) -> Result<Self> {
        let dist = Self { q, beta };
        dist.validate()?;
        Ok(dist)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.q > 0.0 && self.q < 1.0) {
            return Err(GameError::invalid(format!("Weibull q {} outside (0, 1)", self.q)));
        }
        if !self.beta.is_finite() || self.beta <= 0.0 {
            return Err(GameError::invalid(format!("Weibull shape {} must be positive", self.beta)));
        }
        Ok(())
    }

    /// Calibrate `q` so the length clamped to `[min, max]` has the target mean
    ///
    /// The clamped mean `min + Σ_{k=min}^{max-1} S(k)` grows with `q`, so a
    /// bisection on `ln(-ln q)` converges deterministically. Targets outside
    /// the reachable range land on the nearest end of the bracket.
    pub fn with_mean(target: f64, beta: f64, min_rounds: u32, max_rounds: u32) -> Result<Self> {
        if min_rounds == 0 || min_rounds > max_rounds {
            return Err(GameError::invalid(format!(
                "invalid round bounds [{}, {}]",
                min_rounds, max_rounds
            )));
        }
        let probe = Self::new(0.5, beta)?;

        let mut lo = LAMBDA_MIN.ln();
        let mut hi = LAMBDA_MAX.ln();
        for _ in 0..CALIBRATION_STEPS {
            let mid = 0.5 * (lo + hi);
            let candidate = DiscreteWeibull {
                q: (-mid.exp()).exp(),
                ..probe
            };
            if candidate.clamped_mean(min_rounds, max_rounds) > target {
                // Too long; raise the hazard
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let q = (-(0.5 * (lo + hi)).exp()).exp();
        Self::new(q.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON), beta)
    }

    /// `S(k) = P(length > k)`
    pub fn survival(&self, k: u32) -> f64 {
        self.q.powf((k as f64).powf(self.beta))
    }

    /// Probability of ending in round `k` having lasted into it
    pub fn hazard(&self, k: u32) -> f64 {
        if k == 0 {
            return 0.0;
        }
        let before = self.survival(k - 1);
        if before <= 0.0 {
            return 1.0;
        }
        (1.0 - self.survival(k) / before).clamp(0.0, 1.0)
    }

    /// Expected length once clamped to `[min_rounds, max_rounds]`
    pub fn clamped_mean(&self, min_rounds: u32, max_rounds: u32) -> f64 {
        min_rounds as f64 + (min_rounds..max_rounds).map(|k| self.survival(k)).sum::<f64>()
    }

    /// Walk the hazard from round 1, stopping at `max_rounds`, then clamp
    pub fn sample(&self, min_rounds: u32, max_rounds: u32, rng: &mut SeededRng) -> u32 {
        let mut k = 1;
        while k < max_rounds {
            if rng.chance(self.hazard(k)) {
                break;
            }
            k += 1;
        }
        k.clamp(min_rounds, max_rounds.max(min_rounds))
    }
}

/// Mixture component a sample came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationComponent {
    Negotiable,
    Entrenched,
}

/// One drawn game length
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSample {
    pub component: DurationComponent,
    pub rounds: u32,
}

/// Calibrated two-component duration mixture
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationModel {
    pub params: DurationParams,
    pub negotiable: DiscreteWeibull,
    pub entrenched: DiscreteWeibull,
}

impl DurationModel {
    /// Validate parameters and calibrate both components
    pub fn new(params: DurationParams) -> Result<Self> {
        params.validate()?;
        let negotiable = DiscreteWeibull::with_mean(
            params.mean_rounds,
            params.negotiable_beta,
            params.min_rounds,
            params.max_rounds,
        )?;
        let entrenched = DiscreteWeibull::with_mean(
            params.mean_rounds * params.entrenched_mean_factor,
            params.entrenched_beta,
            params.min_rounds,
            params.max_rounds,
        )?;
        Ok(Self {
            params,
            negotiable,
            entrenched,
        })
    }

    /// Use explicit components instead of calibrating them
    pub fn with_components(
        params: DurationParams,
        negotiable: DiscreteWeibull,
        entrenched: DiscreteWeibull,
    ) -> Result<Self> {
        params.validate()?;
        negotiable.validate()?;
        entrenched.validate()?;
        Ok(Self {
            params,
            negotiable,
            entrenched,
        })
    }

    /// Pick a component, then a length from it
    pub fn sample(&self, rng: &mut SeededRng) -> DurationSample {
        let (component, dist) = if rng.chance(self.params.negotiable_weight) {
            (DurationComponent::Negotiable, &self.negotiable)
        } else {
            (DurationComponent::Entrenched, &self.entrenched)
        };
        DurationSample {
            component,
            rounds: dist.sample(self.params.min_rounds, self.params.max_rounds, rng),
        }
    }
}
