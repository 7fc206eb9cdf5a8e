//! Typed view of shared belief state over any [`KvStore`].
//!
//! Key layout:
//!
//! | Key | Kind | Written by |
//! |-----|------|------------|
//! | `arm:<id>` | field map (`mu`, `nu`, `alpha`, `beta`) | agents (CAS), supervisor (reset) |
//! | `arm:<id>:last_reward` | scalar, short TTL | agents |
//! | `system:mode` | scalar, optional TTL | supervisor |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::kv::{CasOutcome, KvStore, Versioned};
use crate::{Belief, Error, Result, SystemMode};

pub const MODE_KEY: &str = "system:mode";

pub fn arm_key(arm: &str) -> String {
    format!("arm:{arm}")
}

pub fn last_reward_key(arm: &str) -> String {
    format!("arm:{arm}:last_reward")
}

/// Result of [`BeliefStore::modify_belief`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModifyOutcome {
    /// The new belief was written. `attempts` counts read-modify-write rounds (>= 1).
    Applied { belief: Belief, attempts: u64 },
    /// The belief was absent (e.g. removed concurrently); nothing was written.
    Missing { attempts: u64 },
}

/// Shared belief store handle. Cheap to clone.
#[derive(Clone)]
pub struct BeliefStore {
    kv: Arc<dyn KvStore>,
}

impl std::fmt::Debug for BeliefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeliefStore").finish_non_exhaustive()
    }
}

impl BeliefStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub async fn get_belief(&self, arm: &str) -> Result<Option<Belief>> {
        Ok(self.get_versioned(arm).await?.map(|v| v.value))
    }

    pub async fn get_versioned(&self, arm: &str) -> Result<Option<Versioned<Belief>>> {
        let key = arm_key(arm);
        match self.kv.get_fields(&key).await? {
            None => Ok(None),
            Some(Versioned { value, version }) => Ok(Some(Versioned {
                value: Belief::from_fields(&key, &value)?,
                version,
            })),
        }
    }

    /// Unconditional write (initialization and reset).
    pub async fn set_belief(&self, arm: &str, belief: Belief) -> Result<()> {
        self.kv.set_fields(&arm_key(arm), belief.to_fields()).await?;
        Ok(())
    }

    /// Write `prior` for every arm.
    pub async fn reset_all(&self, arms: &[String], prior: Belief) -> Result<()> {
        for arm in arms {
            self.set_belief(arm, prior).await?;
        }
        Ok(())
    }

    /// Beliefs for every arm in `arms` that currently has one.
    pub async fn snapshot(&self, arms: &[String]) -> Result<BTreeMap<String, Belief>> {
        let mut out = BTreeMap::new();
        for arm in arms {
            if let Some(b) = self.get_belief(arm).await? {
                out.insert(arm.clone(), b);
            }
        }
        Ok(out)
    }

    /// Optimistic read-modify-write of one arm's belief.
    ///
    /// Reads the belief and its version, applies `f`, and writes back only if the version is
    /// unchanged. On conflict the whole cycle is retried, without limit. An absent belief is
    /// never recreated: the call returns [`ModifyOutcome::Missing`].
    pub async fn modify_belief<F>(&self, arm: &str, f: F) -> Result<ModifyOutcome>
    where
        F: Fn(&Belief) -> Belief + Send + Sync,
    {
        let key = arm_key(arm);
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            let Some(current) = self.kv.get_fields(&key).await? else {
                return Ok(ModifyOutcome::Missing { attempts });
            };
            let before = Belief::from_fields(&key, &current.value)?;
            let after = f(&before);
            match self
                .kv
                .conditional_update(&key, current.version, after.to_fields())
                .await?
            {
                CasOutcome::Applied(_) => {
                    return Ok(ModifyOutcome::Applied {
                        belief: after,
                        attempts,
                    })
                }
                CasOutcome::Missing => return Ok(ModifyOutcome::Missing { attempts }),
                CasOutcome::Conflict => {
                    debug!(target: "ngbandit::store", arm, attempts, "belief write conflict, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Current mode; an absent or expired flag reads as `Learning`.
    pub async fn get_mode(&self) -> Result<SystemMode> {
        match self.kv.get_value(MODE_KEY).await? {
            None => Ok(SystemMode::Learning),
            Some(s) => s.parse(),
        }
    }

    pub async fn set_mode(&self, mode: SystemMode, ttl: Option<Duration>) -> Result<()> {
        trace!(target: "ngbandit::store", %mode, ?ttl, "writing mode flag");
        self.kv
            .set_with_expiry(MODE_KEY, mode.as_str().to_string(), ttl)
            .await
    }

    /// Publish the most recent reward for `arm` in its single transient slot.
    pub async fn report_reward(&self, arm: &str, reward: f64, ttl: Duration) -> Result<()> {
        self.kv
            .set_with_expiry(&last_reward_key(arm), reward.to_string(), Some(ttl))
            .await
    }

    /// Consume the transient last-reward slot for `arm`, if set.
    pub async fn take_reward(&self, arm: &str) -> Result<Option<f64>> {
        let key = last_reward_key(arm);
        match self.kv.take_value(&key).await? {
            None => Ok(None),
            Some(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|e| Error::Store(format!("{key}: bad reward {s:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;

    fn store() -> BeliefStore {
        BeliefStore::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn modify_applies_update_once_without_contention() {
        let s = store();
        s.set_belief("a", Belief::UNINFORMATIVE).await.unwrap();
        let out = s.modify_belief("a", |b| b.update(2.0)).await.unwrap();
        match out {
            ModifyOutcome::Applied { belief, attempts } => {
                assert_eq!(attempts, 1);
                assert_eq!(belief.mu, 1.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.get_belief("a").await.unwrap().unwrap().nu, 2.0);
    }

    #[tokio::test]
    async fn modify_never_recreates_missing_belief() {
        let s = store();
        let out = s.modify_belief("ghost", |b| b.update(1.0)).await.unwrap();
        assert_eq!(out, ModifyOutcome::Missing { attempts: 1 });
        assert!(s.get_belief("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_mode_reads_as_learning() {
        let s = store();
        assert_eq!(s.get_mode().await.unwrap(), SystemMode::Learning);
        s.set_mode(SystemMode::Monitoring, None).await.unwrap();
        assert_eq!(s.get_mode().await.unwrap(), SystemMode::Monitoring);
    }

    #[tokio::test]
    async fn snapshot_skips_arms_without_beliefs() {
        let s = store();
        s.set_belief("a", Belief::UNINFORMATIVE).await.unwrap();
        let arms = vec!["a".to_string(), "b".to_string()];
        let snap = s.snapshot(&arms).await.unwrap();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("a"));
    }

    #[tokio::test]
    async fn reward_slot_holds_only_the_latest_value() {
        let s = store();
        let ttl = Duration::from_secs(5);
        s.report_reward("a", 1.0, ttl).await.unwrap();
        s.report_reward("a", 2.5, ttl).await.unwrap();
        assert_eq!(s.take_reward("a").await.unwrap(), Some(2.5));
        assert_eq!(s.take_reward("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_mode_flag_is_an_error() {
        let s = store();
        s.kv()
            .set_with_expiry(MODE_KEY, "SLEEPING".to_string(), None)
            .await
            .unwrap();
        assert!(s.get_mode().await.is_err());
    }
}
