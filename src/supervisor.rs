//! Supervisor: watches shared beliefs for convergence, then watches the converged-best arm's
//! rewards for drift, and flips the global mode accordingly.
//!
//! Two phases, as an explicit tagged state:
//!
//! ```text
//!   ConvergenceDetection --(N consecutive stable ticks)--> DriftMonitoring   [mode := MONITORING]
//!   DriftMonitoring --(full window mean < mean * factor)--> ConvergenceDetection
//!                                                [beliefs := prior, mode := FORCED_EXPLORATION (ttl)]
//! ```
//!
//! A tick evaluates exactly one phase. Ticks never overlap: [`Supervisor::run`] awaits each one
//! before sleeping.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::monitor::{best_arm, check_drift, total_mean_change, RewardWindow};
use crate::store::BeliefStore;
use crate::{Belief, Result, SystemMode};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.01;
pub const DEFAULT_CONVERGENCE_DURATION_CHECKS: u32 = 5;
pub const DEFAULT_DRIFT_WINDOW_SIZE: usize = 50;
pub const DEFAULT_DRIFT_THRESHOLD_FACTOR: f64 = 0.7;
pub const DEFAULT_FORCED_EXPLORATION: Duration = Duration::from_secs(30);

/// Supervisor tuning.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Pause between ticks.
    pub check_interval: Duration,
    /// Pause before the first tick.
    pub startup_delay: Duration,
    /// A tick is stable when the summed `|Δmu|` is strictly below this.
    pub convergence_threshold: f64,
    /// Consecutive stable ticks required to declare convergence.
    pub convergence_duration_checks: u32,
    /// Rewards required before judging drift.
    pub drift_window_size: usize,
    /// Drift when the window mean is below `converged_mean * factor`.
    pub drift_threshold_factor: f64,
    /// Lifetime of the forced-exploration mode flag.
    pub forced_exploration: Duration,
    /// Belief every arm is reset to on drift.
    pub prior: Belief,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            startup_delay: Duration::ZERO,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            convergence_duration_checks: DEFAULT_CONVERGENCE_DURATION_CHECKS,
            drift_window_size: DEFAULT_DRIFT_WINDOW_SIZE,
            drift_threshold_factor: DEFAULT_DRIFT_THRESHOLD_FACTOR,
            forced_exploration: DEFAULT_FORCED_EXPLORATION,
            prior: Belief::UNINFORMATIVE,
        }
    }
}

/// Supervisor session state.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    ConvergenceDetection {
        stable_checks: u32,
        last_snapshot: Option<BTreeMap<String, Belief>>,
    },
    DriftMonitoring {
        best_arm: String,
        converged_mean: f64,
        window: RewardWindow,
    },
}

impl Phase {
    fn initial() -> Self {
        Phase::ConvergenceDetection {
            stable_checks: 0,
            last_snapshot: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::ConvergenceDetection { .. } => "CONVERGENCE_DETECTION",
            Phase::DriftMonitoring { .. } => "DRIFT_MONITORING",
        }
    }
}

/// What a single tick observed or did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    /// No usable previous/current snapshot yet.
    Warmup,
    /// Beliefs moved too much; the stability counter was reset.
    Changing { total_change: f64 },
    /// Stable tick, not yet enough of them.
    Stable { total_change: f64, checks: u32 },
    /// Convergence declared; mode switched to `MONITORING`.
    Converged { arm: String, mean: f64 },
    /// Drift window still filling.
    Collecting { len: usize, cap: usize },
    /// Full window, no drift.
    Holding { window_mean: f64, threshold: f64 },
    /// Drift declared; beliefs reset and forced exploration started.
    DriftDetected {
        arm: String,
        window_mean: f64,
        threshold: f64,
    },
}

/// Single-instance supervisor.
#[derive(Debug)]
pub struct Supervisor {
    arms: Vec<String>,
    store: BeliefStore,
    cfg: SupervisorConfig,
    phase: Phase,
}

impl Supervisor {
    /// `arms` is sorted here to give the fixed ordering used for tie-breaks.
    pub fn new(mut arms: Vec<String>, store: BeliefStore, cfg: SupervisorConfig) -> Self {
        arms.sort();
        arms.dedup();
        Self {
            arms,
            store,
            cfg,
            phase: Phase::initial(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Evaluate one tick of the current phase.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        match self.phase {
            Phase::ConvergenceDetection { .. } => self.tick_convergence().await,
            Phase::DriftMonitoring { .. } => self.tick_drift().await,
        }
    }

    async fn tick_convergence(&mut self) -> Result<TickOutcome> {
        let current = self.store.snapshot(&self.arms).await?;

        let Phase::ConvergenceDetection {
            stable_checks,
            last_snapshot,
        } = &mut self.phase
        else {
            return Ok(TickOutcome::Warmup);
        };

        let previous = match last_snapshot.take() {
            Some(prev) if !prev.is_empty() && !current.is_empty() => prev,
            _ => {
                *last_snapshot = Some(current);
                return Ok(TickOutcome::Warmup);
            }
        };

        let total_change = total_mean_change(&previous, &current);
        if total_change < self.cfg.convergence_threshold {
            *stable_checks += 1;
        } else {
            *stable_checks = 0;
        }
        let checks = *stable_checks;

        if checks < self.cfg.convergence_duration_checks {
            *last_snapshot = Some(current);
            if checks == 0 {
                debug!(target: "ngbandit::supervisor", total_change, "beliefs still moving");
                return Ok(TickOutcome::Changing { total_change });
            }
            debug!(
                target: "ngbandit::supervisor",
                total_change,
                checks,
                required = self.cfg.convergence_duration_checks,
                "stable check"
            );
            return Ok(TickOutcome::Stable {
                total_change,
                checks,
            });
        }

        let (arm, mean) = match best_arm(&self.arms, &current) {
            Some((arm, mean)) => (arm.clone(), mean),
            None => {
                *last_snapshot = Some(current);
                return Ok(TickOutcome::Warmup);
            }
        };
        *last_snapshot = Some(current);

        // Only leave the phase once the mode write has landed; a failed write retries next tick.
        self.store.set_mode(SystemMode::Monitoring, None).await?;
        info!(
            target: "ngbandit::supervisor",
            arm = %arm,
            mean,
            checks,
            "converged; monitoring for drift"
        );
        self.phase = Phase::DriftMonitoring {
            best_arm: arm.clone(),
            converged_mean: mean,
            window: RewardWindow::new(self.cfg.drift_window_size),
        };
        Ok(TickOutcome::Converged { arm, mean })
    }

    async fn tick_drift(&mut self) -> Result<TickOutcome> {
        let (arm, converged_mean) = match &self.phase {
            Phase::DriftMonitoring {
                best_arm,
                converged_mean,
                ..
            } => (best_arm.clone(), *converged_mean),
            Phase::ConvergenceDetection { .. } => return Ok(TickOutcome::Warmup),
        };

        let fresh = self.store.take_reward(&arm).await?;

        let Phase::DriftMonitoring { window, .. } = &mut self.phase else {
            return Ok(TickOutcome::Warmup);
        };
        if let Some(r) = fresh {
            window.push(r);
        }
        if !window.is_full() {
            return Ok(TickOutcome::Collecting {
                len: window.len(),
                cap: window.cap(),
            });
        }
        let Some(window_mean) = window.mean() else {
            return Ok(TickOutcome::Collecting {
                len: 0,
                cap: window.cap(),
            });
        };

        let check = check_drift(window_mean, converged_mean, self.cfg.drift_threshold_factor);
        if !check.drifted {
            debug!(
                target: "ngbandit::supervisor",
                arm = %arm,
                window_mean,
                threshold = check.threshold,
                "no drift"
            );
            return Ok(TickOutcome::Holding {
                window_mean,
                threshold: check.threshold,
            });
        }

        warn!(
            target: "ngbandit::supervisor",
            arm = %arm,
            window_mean,
            threshold = check.threshold,
            converged_mean,
            "drift detected; resetting beliefs and forcing exploration"
        );
        self.store.reset_all(&self.arms, self.cfg.prior).await?;
        self.store
            .set_mode(
                SystemMode::ForcedExploration,
                Some(self.cfg.forced_exploration),
            )
            .await?;
        self.phase = Phase::initial();
        Ok(TickOutcome::DriftDetected {
            arm,
            window_mean,
            threshold: check.threshold,
        })
    }

    /// Tick forever at `check_interval`. A failing tick is logged and skipped; it never ends
    /// the loop. Stop it by aborting the task.
    pub async fn run(mut self) {
        info!(
            target: "ngbandit::supervisor",
            arms = self.arms.len(),
            interval_ms = self.cfg.check_interval.as_millis() as u64,
            "supervisor starting"
        );
        if !self.cfg.startup_delay.is_zero() {
            tokio::time::sleep(self.cfg.startup_delay).await;
        }
        loop {
            match self.tick().await {
                Ok(outcome) => debug!(
                    target: "ngbandit::supervisor",
                    phase = self.phase.name(),
                    outcome = ?outcome,
                    "tick"
                ),
                Err(e) => warn!(
                    target: "ngbandit::supervisor",
                    phase = self.phase.name(),
                    error = %e,
                    "tick failed"
                ),
            }
            tokio::time::sleep(self.cfg.check_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;
    use std::sync::Arc;

    fn arms() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    async fn seeded(mus: &[f64]) -> BeliefStore {
        let store = BeliefStore::new(Arc::new(MemoryKv::new()));
        for (arm, &mu) in arms().iter().zip(mus) {
            store
                .set_belief(arm, Belief::new(mu, 10.0, 5.0, 5.0))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn empty_store_stays_in_warmup() {
        let store = BeliefStore::new(Arc::new(MemoryKv::new()));
        let mut sup = Supervisor::new(arms(), store, SupervisorConfig::default());
        for _ in 0..10 {
            assert_eq!(sup.tick().await.unwrap(), TickOutcome::Warmup);
        }
        assert_eq!(sup.phase().name(), "CONVERGENCE_DETECTION");
    }

    #[tokio::test]
    async fn movement_resets_the_stability_counter() {
        let store = seeded(&[1.0, 2.0, 3.0]).await;
        let mut sup = Supervisor::new(arms(), store.clone(), SupervisorConfig::default());
        assert_eq!(sup.tick().await.unwrap(), TickOutcome::Warmup);
        assert!(matches!(
            sup.tick().await.unwrap(),
            TickOutcome::Stable { checks: 1, .. }
        ));
        store
            .set_belief("a", Belief::new(1.5, 10.0, 5.0, 5.0))
            .await
            .unwrap();
        match sup.tick().await.unwrap() {
            TickOutcome::Changing { total_change } => assert!((total_change - 0.5).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            sup.tick().await.unwrap(),
            TickOutcome::Stable { checks: 1, .. }
        ));
    }

    #[tokio::test]
    async fn drift_window_ignores_missing_signals() {
        let store = seeded(&[1.0, 4.0, 3.0]).await;
        let cfg = SupervisorConfig {
            convergence_duration_checks: 1,
            drift_window_size: 2,
            ..SupervisorConfig::default()
        };
        let mut sup = Supervisor::new(arms(), store.clone(), cfg);
        sup.tick().await.unwrap();
        assert_eq!(
            sup.tick().await.unwrap(),
            TickOutcome::Converged {
                arm: "b".to_string(),
                mean: 4.0
            }
        );
        assert_eq!(
            sup.tick().await.unwrap(),
            TickOutcome::Collecting { len: 0, cap: 2 }
        );
        store
            .report_reward("b", 4.0, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            sup.tick().await.unwrap(),
            TickOutcome::Collecting { len: 1, cap: 2 }
        );
        assert_eq!(
            sup.tick().await.unwrap(),
            TickOutcome::Collecting { len: 1, cap: 2 }
        );
    }
}
