//! Agents: the select → pull → update loop against shared beliefs.
//!
//! Any number of agents may run against the same [`BeliefStore`]. They never talk to each other
//! or to the supervisor directly; all coordination goes through the store:
//! - the mode flag decides the selection policy,
//! - belief updates are optimistic compare-and-swap writes, retried on conflict,
//! - every pull is published in the arm's transient last-reward slot.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::rewards::RewardSource;
use crate::store::{BeliefStore, ModifyOutcome};
use crate::thompson::{Selection, Selector};
use crate::{Belief, Result, SystemMode};

/// Agent loop timing and prior.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Pause between successive pulls.
    pub pull_interval: Duration,
    /// Pause after a failed pull or store call.
    pub error_backoff: Duration,
    /// Lifetime of the per-arm last-reward signal.
    pub last_reward_ttl: Duration,
    /// Belief written for every arm on first initialization.
    pub prior: Belief,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            last_reward_ttl: Duration::from_secs(5),
            prior: Belief::UNINFORMATIVE,
        }
    }
}

/// What one full cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub mode: SystemMode,
    pub selection: Selection,
    pub reward: f64,
    pub update: ModifyOutcome,
}

/// One agent instance.
pub struct Agent {
    id: usize,
    arms: Vec<String>,
    store: BeliefStore,
    rewards: Arc<dyn RewardSource>,
    selector: Selector,
    cfg: AgentConfig,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("arms", &self.arms)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// `arms` is sorted here, so every agent shares the same fixed arm ordering.
    pub fn new(
        id: usize,
        mut arms: Vec<String>,
        store: BeliefStore,
        rewards: Arc<dyn RewardSource>,
        selector: Selector,
        cfg: AgentConfig,
    ) -> Self {
        arms.sort();
        arms.dedup();
        Self {
            id,
            arms,
            store,
            rewards,
            selector,
            cfg,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn arms(&self) -> &[String] {
        &self.arms
    }

    /// Write the prior for every arm if the first arm has no belief yet.
    ///
    /// Racing initializers all write the same constant, so last-writer-wins is harmless.
    /// Returns whether this call wrote anything.
    pub async fn initialize(&self) -> Result<bool> {
        let Some(first) = self.arms.first() else {
            return Ok(false);
        };
        if self.store.get_belief(first).await?.is_some() {
            debug!(target: "ngbandit::agent", agent = self.id, "beliefs already present");
            return Ok(false);
        }
        self.store.reset_all(&self.arms, self.cfg.prior).await?;
        info!(
            target: "ngbandit::agent",
            agent = self.id,
            arms = self.arms.len(),
            "initialized beliefs to prior"
        );
        Ok(true)
    }

    /// Pick an arm under `mode` from the current beliefs. Never writes.
    pub async fn choose(&mut self, mode: SystemMode) -> Result<Option<Selection>> {
        let beliefs = self.store.snapshot(&self.arms).await?;
        Ok(self.selector.select(&self.arms, &beliefs, mode))
    }

    /// Fold one observed reward into `arm`'s belief.
    ///
    /// Publishes the reward in the arm's last-reward slot, then runs the optimistic update.
    /// If the belief vanished concurrently the update is abandoned, not recreated.
    pub async fn observe(&self, arm: &str, reward: f64) -> Result<ModifyOutcome> {
        self.store
            .report_reward(arm, reward, self.cfg.last_reward_ttl)
            .await?;
        let out = self.store.modify_belief(arm, |b| b.update(reward)).await?;
        match out {
            ModifyOutcome::Applied { belief, attempts } => debug!(
                target: "ngbandit::agent",
                agent = self.id,
                arm,
                reward,
                mu = belief.mu,
                nu = belief.nu,
                attempts,
                "belief updated"
            ),
            ModifyOutcome::Missing { .. } => debug!(
                target: "ngbandit::agent",
                agent = self.id,
                arm,
                "belief missing, update abandoned"
            ),
        }
        Ok(out)
    }

    /// One cycle: read mode, choose, pull, observe.
    ///
    /// Returns `Ok(None)` when there is nothing to choose from.
    pub async fn step(&mut self) -> Result<Option<StepOutcome>> {
        let mode = self.store.get_mode().await?;
        let Some(selection) = self.choose(mode).await? else {
            return Ok(None);
        };
        let reward = self.rewards.pull(&selection.arm).await?;
        let update = self.observe(&selection.arm, reward).await?;
        Ok(Some(StepOutcome {
            mode,
            selection,
            reward,
            update,
        }))
    }

    /// Run cycles forever. Faults are logged and followed by a backoff; nothing here
    /// terminates the loop. Stop it by aborting the task.
    pub async fn run(mut self) {
        info!(target: "ngbandit::agent", agent = self.id, "agent loop starting");
        let mut pulls = 0u64;
        loop {
            match self.step().await {
                Ok(Some(out)) => {
                    pulls += 1;
                    debug!(
                        target: "ngbandit::agent",
                        agent = self.id,
                        pulls,
                        mode = %out.mode,
                        arm = %out.selection.arm,
                        reason = ?out.selection.reason,
                        reward = out.reward,
                        "pull complete"
                    );
                    tokio::time::sleep(self.cfg.pull_interval).await;
                }
                Ok(None) => {
                    warn!(target: "ngbandit::agent", agent = self.id, "no arms to choose from");
                    tokio::time::sleep(self.cfg.error_backoff).await;
                }
                Err(e) => {
                    warn!(target: "ngbandit::agent", agent = self.id, error = %e, "cycle failed");
                    tokio::time::sleep(self.cfg.error_backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::{ArmConfig, SimulatedRewards};
    use crate::thompson::{SelectionConfig, SelectionReason};
    use crate::MemoryKv;
    use std::collections::BTreeMap;

    fn setup() -> (BeliefStore, Agent) {
        let store = BeliefStore::new(Arc::new(MemoryKv::new()));
        let rewards = Arc::new(SimulatedRewards::new(
            BTreeMap::from([
                ("b".to_string(), ArmConfig { mean: 1.0, std_dev: 0.0 }),
                ("a".to_string(), ArmConfig { mean: 2.0, std_dev: 0.0 }),
            ]),
            5,
        ));
        let agent = Agent::new(
            0,
            vec!["b".to_string(), "a".to_string()],
            store.clone(),
            rewards,
            Selector::with_seed(SelectionConfig::default(), 5),
            AgentConfig::default(),
        );
        (store, agent)
    }

    #[tokio::test]
    async fn initialize_writes_prior_once() {
        let (store, agent) = setup();
        assert_eq!(agent.arms(), &["a".to_string(), "b".to_string()]);
        assert!(agent.initialize().await.unwrap());
        assert_eq!(
            store.get_belief("b").await.unwrap(),
            Some(Belief::UNINFORMATIVE)
        );

        agent.observe("a", 2.0).await.unwrap();
        assert!(!agent.initialize().await.unwrap());
        assert_eq!(store.get_belief("a").await.unwrap().unwrap().nu, 2.0);
    }

    #[tokio::test]
    async fn observe_publishes_reward_and_updates() {
        let (store, agent) = setup();
        agent.initialize().await.unwrap();
        let out = agent.observe("a", 2.0).await.unwrap();
        assert!(matches!(out, ModifyOutcome::Applied { attempts: 1, .. }));
        assert_eq!(store.take_reward("a").await.unwrap(), Some(2.0));
        let b = store.get_belief("a").await.unwrap().unwrap();
        assert_eq!(b.mu, 1.0);
        assert!((b.beta - 1.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn observe_after_reset_delete_is_abandoned() {
        let (store, agent) = setup();
        agent.initialize().await.unwrap();
        store.kv().delete("arm:a").await.unwrap();
        let out = agent.observe("a", 1.0).await.unwrap();
        assert!(matches!(out, ModifyOutcome::Missing { .. }));
        assert!(store.get_belief("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn step_respects_forced_mode() {
        let (store, mut agent) = setup();
        agent.initialize().await.unwrap();
        store
            .set_mode(SystemMode::ForcedExploration, Some(Duration::from_secs(30)))
            .await
            .unwrap();
        let out = agent.step().await.unwrap().unwrap();
        assert_eq!(out.mode, SystemMode::ForcedExploration);
        assert_eq!(out.selection.reason, SelectionReason::Forced);
        assert!(matches!(out.update, ModifyOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn choose_does_not_write() {
        let (store, mut agent) = setup();
        agent.initialize().await.unwrap();
        let before = store.snapshot(agent.arms()).await.unwrap();
        for _ in 0..10 {
            agent.choose(SystemMode::Learning).await.unwrap().unwrap();
        }
        assert_eq!(store.snapshot(agent.arms()).await.unwrap(), before);
    }
}
