//! Monitoring primitives used by the supervisor: belief movement between snapshots, the
//! converged-best arm, and a bounded rolling window of observed rewards.
//!
//! This module is policy-light: it computes numbers; the supervisor decides what they mean.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::Belief;

/// Sum of `|mu_now - mu_before|` over arms present in both snapshots.
pub fn total_mean_change(
    previous: &BTreeMap<String, Belief>,
    current: &BTreeMap<String, Belief>,
) -> f64 {
    current
        .iter()
        .filter_map(|(arm, now)| previous.get(arm).map(|before| (now.mu - before.mu).abs()))
        .sum()
}

/// Arm with the largest posterior mean, visiting arms in `arms_in_order`.
///
/// Ties go to the first arm in order. Arms missing from `snapshot` are skipped.
pub fn best_arm<'a>(
    arms_in_order: &'a [String],
    snapshot: &BTreeMap<String, Belief>,
) -> Option<(&'a String, f64)> {
    let mut best: Option<(&'a String, f64)> = None;
    for arm in arms_in_order {
        let Some(b) = snapshot.get(arm) else {
            continue;
        };
        if best.map_or(true, |(_, mu)| b.mu > mu) {
            best = Some((arm, b.mu));
        }
    }
    best
}

/// Bounded rolling window of rewards (oldest evicted first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardWindow {
    cap: usize,
    buf: VecDeque<f64>,
}

impl RewardWindow {
    /// Create an empty window with capacity `cap` (minimum 1).
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether the window holds `cap` rewards.
    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    /// Push a reward, evicting the oldest if at capacity.
    pub fn push(&mut self, reward: f64) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(reward);
    }

    /// Mean of the retained rewards, or `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.iter().sum::<f64>() / self.buf.len() as f64)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.buf.iter()
    }
}

/// Outcome of comparing a full window against the converged mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftCheck {
    pub window_mean: f64,
    pub threshold: f64,
    pub drifted: bool,
}

/// Drift when the window mean falls strictly below `converged_mean * factor`.
pub fn check_drift(window_mean: f64, converged_mean: f64, factor: f64) -> DriftCheck {
    let threshold = converged_mean * factor;
    DriftCheck {
        window_mean,
        threshold,
        drifted: window_mean < threshold,
    }
}
