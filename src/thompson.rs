//! Thompson sampling over Normal-Gamma beliefs, with mode-dependent overrides.
//!
//! Policy by [`SystemMode`]:
//! - `ForcedExploration`: uniform random arm, beliefs ignored.
//! - `Monitoring`: uniform random arm with probability `epsilon`, otherwise Thompson.
//! - `Learning`: Thompson.
//!
//! Thompson draws, per arm, `tau ~ Gamma(alpha, rate = beta)` then
//! `m ~ Normal(mu, 1 / (nu * tau))`, and picks the largest `m`.
//!
//! Notes:
//! - This selector is **seedable** so selection can be reproducible in tests.
//! - Ties go to the first arm in the caller's order; callers pass a stable-sorted arm list.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{Belief, SystemMode};

/// Default exploration probability while monitoring.
pub const DEFAULT_EPSILON: f64 = 0.05;

/// Configuration for arm selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Probability of a uniform random pick in `Monitoring` mode (clamped to `[0, 1]`).
    pub epsilon: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Why an arm was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// Forced exploration: uniform random.
    Forced,
    /// The epsilon branch of monitoring: uniform random.
    Epsilon,
    /// Largest Thompson draw.
    Thompson { sample: f64 },
    /// No arm had a belief yet: uniform random.
    NoBeliefs,
}

/// The chosen arm plus the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub arm: String,
    pub reason: SelectionReason,
}

/// Seedable Thompson-sampling selector.
///
/// Holds no belief state of its own; every call is given the current beliefs.
#[derive(Debug, Clone)]
pub struct Selector {
    cfg: SelectionConfig,
    rng: StdRng,
}

impl Selector {
    /// Create a selector with a deterministic fixed seed (0).
    pub fn new(cfg: SelectionConfig) -> Self {
        Self::with_seed(cfg, 0)
    }

    /// Create a selector with a fixed seed (reproducible).
    pub fn with_seed(cfg: SelectionConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a selector seeded from OS entropy.
    pub fn from_entropy(cfg: SelectionConfig) -> Self {
        Self {
            cfg,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn config(&self) -> SelectionConfig {
        self.cfg
    }

    /// Select an arm from `arms_in_order`. Returns `None` only if `arms_in_order` is empty.
    ///
    /// Arms without an entry in `beliefs` are skipped by Thompson sampling; if none of them
    /// has a belief the choice is uniform.
    pub fn select(
        &mut self,
        arms_in_order: &[String],
        beliefs: &BTreeMap<String, Belief>,
        mode: SystemMode,
    ) -> Option<Selection> {
        if arms_in_order.is_empty() {
            return None;
        }

        match mode {
            SystemMode::ForcedExploration => {
                return Some(self.uniform(arms_in_order, SelectionReason::Forced));
            }
            SystemMode::Monitoring => {
                let eps = if self.cfg.epsilon.is_finite() {
                    self.cfg.epsilon.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if self.rng.random::<f64>() < eps {
                    return Some(self.uniform(arms_in_order, SelectionReason::Epsilon));
                }
            }
            SystemMode::Learning => {}
        }

        let mut best: Option<(&String, f64)> = None;
        for arm in arms_in_order {
            let Some(b) = beliefs.get(arm) else {
                continue;
            };
            let x = self.sample_mean(b);
            // Strict `>`: an equal later draw never displaces an earlier arm.
            if best.map_or(true, |(_, s)| x > s) {
                best = Some((arm, x));
            }
        }

        match best {
            Some((arm, sample)) => Some(Selection {
                arm: arm.clone(),
                reason: SelectionReason::Thompson { sample },
            }),
            None => Some(self.uniform(arms_in_order, SelectionReason::NoBeliefs)),
        }
    }

    /// One joint draw from the belief: precision from the Gamma, then the mean given it.
    ///
    /// Invalid parameters fall back to the point estimate `mu`.
    pub fn sample_mean(&mut self, b: &Belief) -> f64 {
        if !b.is_valid() {
            return b.mu;
        }
        let tau = match Gamma::new(b.alpha, 1.0 / b.beta) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => return b.mu,
        };
        let z: f64 = StandardNormal.sample(&mut self.rng);
        // tau can underflow to 0 for small shapes; the draw is then unbounded, as the model says.
        let sd = 1.0 / (b.nu * tau).sqrt();
        let x = b.mu + z * sd;
        if x.is_nan() {
            b.mu
        } else {
            x
        }
    }

    fn uniform(&mut self, arms: &[String], reason: SelectionReason) -> Selection {
        let idx = self.rng.random_range(0..arms.len());
        Selection {
            arm: arms[idx].clone(),
            reason,
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}
