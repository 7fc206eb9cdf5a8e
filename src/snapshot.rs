//! Read-only view of the shared state, for status output and dashboards.

use serde::{Deserialize, Serialize};

use crate::monitor::best_arm;
use crate::store::BeliefStore;
use crate::{Belief, Result, SystemMode};

/// One arm's row in a [`BeliefSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmView {
    pub arm: String,
    pub belief: Belief,
    /// `beta / (alpha - 1)` once `alpha > 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_variance: Option<f64>,
}

/// Beliefs for every arm plus the current mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSnapshot {
    pub mode: SystemMode,
    /// In fixed arm order; arms without a belief are omitted.
    pub arms: Vec<ArmView>,
    /// Arm with the largest posterior mean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
}

impl BeliefSnapshot {
    pub async fn capture(store: &BeliefStore, arms_in_order: &[String]) -> Result<Self> {
        let mode = store.get_mode().await?;
        let beliefs = store.snapshot(arms_in_order).await?;
        let leader = best_arm(arms_in_order, &beliefs).map(|(a, _)| a.clone());
        let arms = arms_in_order
            .iter()
            .filter_map(|arm| {
                beliefs.get(arm).map(|b| ArmView {
                    arm: arm.clone(),
                    belief: *b,
                    expected_variance: b.expected_variance(),
                })
            })
            .collect();
        Ok(Self { mode, arms, leader })
    }

    /// Total effective observations across arms, net of the prior's `nu`.
    pub fn observations(&self, prior: &Belief) -> f64 {
        self.arms
            .iter()
            .map(|v| (v.belief.nu - prior.nu).max(0.0))
            .sum()
    }
}
