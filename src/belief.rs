//! Normal-Gamma belief over one arm's Gaussian reward.
//!
//! A belief `NG(mu, nu, alpha, beta)` is the conjugate prior for a Gaussian with unknown mean
//! and unknown precision:
//!
//! ```text
//!   precision ~ Gamma(shape = alpha, rate = beta)
//!   mean | precision ~ Normal(mu, 1 / (nu * precision))
//! ```
//!
//! Everything here is pure: no store access, no randomness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Field names used when a belief is stored as an opaque `field -> f64` map.
pub const FIELD_MU: &str = "mu";
pub const FIELD_NU: &str = "nu";
pub const FIELD_ALPHA: &str = "alpha";
pub const FIELD_BETA: &str = "beta";

/// Opaque field map as persisted in a [`KvStore`](crate::KvStore).
pub type Fields = BTreeMap<String, f64>;

/// Posterior parameters for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// Posterior mean estimate of the arm's expected reward.
    pub mu: f64,
    /// Effective observation count folded into `mu`.
    pub nu: f64,
    /// Gamma shape for reward precision.
    pub alpha: f64,
    /// Gamma rate for reward precision.
    pub beta: f64,
}

impl Belief {
    /// The weak prior every arm starts from (and is reset to after drift).
    pub const UNINFORMATIVE: Belief = Belief {
        mu: 0.0,
        nu: 1.0,
        alpha: 0.2,
        beta: 0.2,
    };

    pub fn new(mu: f64, nu: f64, alpha: f64, beta: f64) -> Self {
        Self {
            mu,
            nu,
            alpha,
            beta,
        }
    }

    /// `nu`, `alpha` and `beta` strictly positive and every field finite.
    pub fn is_valid(&self) -> bool {
        self.mu.is_finite()
            && self.nu.is_finite()
            && self.alpha.is_finite()
            && self.beta.is_finite()
            && self.nu > 0.0
            && self.alpha > 0.0
            && self.beta > 0.0
    }

    /// Conjugate posterior after one Gaussian observation.
    ///
    /// `mu'` is computed from the previous `mu` and `nu` before anything else reads them, so
    /// the result is bit-for-bit the textbook sequence:
    ///
    /// ```text
    ///   mu'    = (nu*mu + r) / (nu + 1)
    ///   alpha' = alpha + 0.5
    ///   beta'  = beta + nu*(r - mu)^2 / (2*(nu + 1))
    ///   nu'    = nu + 1
    /// ```
    #[must_use]
    pub fn update(&self, reward: f64) -> Belief {
        let Belief {
            mu: mu_prev,
            nu: nu_prev,
            alpha: alpha_prev,
            beta: beta_prev,
        } = *self;

        let mu = (nu_prev * mu_prev + reward) / (nu_prev + 1.0);
        let alpha = alpha_prev + 0.5;
        let beta = beta_prev + (nu_prev * (reward - mu_prev).powi(2)) / (2.0 * (nu_prev + 1.0));
        let nu = nu_prev + 1.0;

        Belief {
            mu,
            nu,
            alpha,
            beta,
        }
    }

    /// Expected precision `E[tau] = alpha / beta`.
    pub fn expected_precision(&self) -> f64 {
        self.alpha / self.beta
    }

    /// Expected reward variance `E[1/tau] = beta / (alpha - 1)`, defined only for `alpha > 1`.
    pub fn expected_variance(&self) -> Option<f64> {
        (self.alpha > 1.0).then(|| self.beta / (self.alpha - 1.0))
    }

    /// Encode as the opaque field map used by the store.
    pub fn to_fields(&self) -> Fields {
        Fields::from([
            (FIELD_MU.to_string(), self.mu),
            (FIELD_NU.to_string(), self.nu),
            (FIELD_ALPHA.to_string(), self.alpha),
            (FIELD_BETA.to_string(), self.beta),
        ])
    }

    /// Decode from a stored field map. `key` is only used for the error message.
    pub fn from_fields(key: &str, fields: &Fields) -> Result<Belief> {
        let field = |name: &'static str| {
            fields
                .get(name)
                .copied()
                .ok_or_else(|| Error::MalformedBelief {
                    key: key.to_string(),
                    field: name,
                })
        };
        Ok(Belief {
            mu: field(FIELD_MU)?,
            nu: field(FIELD_NU)?,
            alpha: field(FIELD_ALPHA)?,
            beta: field(FIELD_BETA)?,
        })
    }
}

impl Default for Belief {
    fn default() -> Self {
        Self::UNINFORMATIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_observation_from_prior() {
        let b = Belief::UNINFORMATIVE.update(2.0);
        assert_eq!(b.mu, 1.0);
        assert_eq!(b.nu, 2.0);
        assert!((b.alpha - 0.7).abs() < 1e-12);
        assert!((b.beta - 1.2).abs() < 1e-12);
    }

    #[test]
    fn reward_equal_to_mean_only_adds_confidence() {
        let mut b = Belief::new(1.5, 3.0, 2.0, 4.0);
        for _ in 0..10 {
            let next = b.update(b.mu);
            assert_eq!(next.mu, b.mu);
            assert_eq!(next.beta, b.beta);
            assert_eq!(next.nu, b.nu + 1.0);
            assert_eq!(next.alpha, b.alpha + 0.5);
            b = next;
        }
    }

    #[test]
    fn fields_round_trip_and_missing_field_is_reported() {
        let b = Belief::new(0.25, 4.0, 1.7, 0.9);
        let f = b.to_fields();
        assert_eq!(Belief::from_fields("arm:a", &f).unwrap(), b);

        let mut partial = f.clone();
        partial.remove(FIELD_ALPHA);
        match Belief::from_fields("arm:a", &partial) {
            Err(Error::MalformedBelief { key, field }) => {
                assert_eq!(key, "arm:a");
                assert_eq!(field, FIELD_ALPHA);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn expected_variance_needs_alpha_above_one() {
        assert_eq!(Belief::UNINFORMATIVE.expected_variance(), None);
        let b = Belief::new(0.0, 5.0, 3.0, 4.0);
        assert_eq!(b.expected_variance(), Some(2.0));
    }

    #[test]
    fn uninformative_prior_is_valid() {
        assert!(Belief::UNINFORMATIVE.is_valid());
        assert!(!Belief::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!Belief::new(f64::NAN, 1.0, 1.0, 1.0).is_valid());
    }
}
