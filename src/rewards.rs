//! Reward sources: where agents get arm ids and noisy rewards from.
//!
//! The core treats a reward source as a black box. Two implementations ship here:
//! - [`SimulatedRewards`]: Gaussian arms held in-process, with drift injection.
//! - [`HttpRewardSource`] (feature `http`): a remote service exposing
//!   `GET /get_arm_configs` and `GET /choose_arm?arm_id=<id>`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Anything that can list arms and produce a reward for one.
#[async_trait]
pub trait RewardSource: Send + Sync {
    /// Arm identifiers currently offered. Only the key set matters to the core.
    async fn arm_ids(&self) -> Result<Vec<String>>;

    /// Pull `arm` once and return the observed reward.
    async fn pull(&self, arm: &str) -> Result<f64>;
}

/// Ground truth for one simulated arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    pub mean: f64,
    pub std_dev: f64,
}

/// A five-arm problem where the best arm is also the noisiest.
pub fn default_arm_configs() -> BTreeMap<String, ArmConfig> {
    BTreeMap::from([
        ("0".to_string(), ArmConfig { mean: 2.8, std_dev: 0.8 }),
        ("1".to_string(), ArmConfig { mean: 3.0, std_dev: 3.0 }),
        ("2".to_string(), ArmConfig { mean: 2.2, std_dev: 0.3 }),
        ("3".to_string(), ArmConfig { mean: 0.5, std_dev: 5.0 }),
        ("4".to_string(), ArmConfig { mean: -0.5, std_dev: 0.5 }),
    ])
}

/// In-process Gaussian reward source.
#[derive(Debug)]
pub struct SimulatedRewards {
    arms: Mutex<BTreeMap<String, ArmConfig>>,
    rng: Mutex<StdRng>,
}

impl SimulatedRewards {
    pub fn new(arms: BTreeMap<String, ArmConfig>, seed: u64) -> Self {
        Self {
            arms: Mutex::new(arms),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Move `arm`'s true mean by `delta` (concept drift). Returns the new mean.
    pub fn shift_mean(&self, arm: &str, delta: f64) -> Result<f64> {
        let mut arms = self.arms.lock();
        let cfg = arms
            .get_mut(arm)
            .ok_or_else(|| Error::RewardSource(format!("unknown arm {arm:?}")))?;
        cfg.mean += delta;
        Ok(cfg.mean)
    }

    pub fn config(&self, arm: &str) -> Option<ArmConfig> {
        self.arms.lock().get(arm).copied()
    }
}

#[async_trait]
impl RewardSource for SimulatedRewards {
    async fn arm_ids(&self) -> Result<Vec<String>> {
        Ok(self.arms.lock().keys().cloned().collect())
    }

    async fn pull(&self, arm: &str) -> Result<f64> {
        let cfg = self
            .config(arm)
            .ok_or_else(|| Error::RewardSource(format!("unknown arm {arm:?}")))?;
        let z: f64 = StandardNormal.sample(&mut *self.rng.lock());
        Ok(cfg.mean + cfg.std_dev.abs() * z)
    }
}

/// Discover the arm set, retrying a bounded number of times with a fixed delay.
///
/// The returned ids are sorted and de-duplicated; that order is the fixed arm ordering used
/// for tie-breaking everywhere. An empty arm set counts as a failed attempt.
pub async fn discover_arms(
    source: &dyn RewardSource,
    attempts: u32,
    delay: Duration,
) -> Result<Vec<String>> {
    let attempts = attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        match source.arm_ids().await {
            Ok(mut ids) if !ids.is_empty() => {
                ids.sort();
                ids.dedup();
                info!(target: "ngbandit::rewards", arms = ?ids, "discovered arms");
                return Ok(ids);
            }
            Ok(_) => last = Error::NoArms.to_string(),
            Err(e) => last = e.to_string(),
        }
        warn!(
            target: "ngbandit::rewards",
            attempt,
            max_attempts = attempts,
            error = %last,
            "arm discovery failed"
        );
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Err(Error::Discovery { attempts, last })
}

#[cfg(feature = "http")]
pub use http::HttpRewardSource;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use reqwest::Client;

    pub const ARM_CONFIGS_PATH: &str = "/get_arm_configs";
    pub const PULL_PATH: &str = "/choose_arm";

    #[derive(Deserialize)]
    struct PullResponse {
        reward: f64,
    }

    /// Reward source backed by a remote HTTP service.
    #[derive(Debug, Clone)]
    pub struct HttpRewardSource {
        client: Client,
        base_url: String,
    }

    impl HttpRewardSource {
        /// `timeout` bounds every request.
        pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            })
        }
    }

    #[async_trait]
    impl RewardSource for HttpRewardSource {
        async fn arm_ids(&self) -> Result<Vec<String>> {
            let url = format!("{}{ARM_CONFIGS_PATH}", self.base_url);
            let configs: BTreeMap<String, serde_json::Value> = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(configs.into_keys().collect())
        }

        async fn pull(&self, arm: &str) -> Result<f64> {
            let url = format!("{}{PULL_PATH}", self.base_url);
            let resp: PullResponse = self
                .client
                .get(&url)
                .query(&[("arm_id", arm)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if resp.reward.is_finite() {
                Ok(resp.reward)
            } else {
                Err(Error::RewardSource(format!(
                    "non-finite reward {} for arm {arm:?}",
                    resp.reward
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RewardSource for Flaky {
        async fn arm_ids(&self) -> Result<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::RewardSource("connection refused".to_string()))
            } else {
                Ok(vec!["b".to_string(), "a".to_string(), "b".to_string()])
            }
        }

        async fn pull(&self, _arm: &str) -> Result<f64> {
            Ok(0.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_retries_then_sorts() {
        let src = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let ids = discover_arms(&src, 3, Duration::from_secs(1)).await.unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_gives_up_after_bounded_attempts() {
        let src = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        match discover_arms(&src, 3, Duration::from_secs(1)).await {
            Err(Error::Discovery { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("connection refused"), "{last}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn discovery_rejects_empty_arm_set() {
        let src = SimulatedRewards::new(BTreeMap::new(), 0);
        assert!(matches!(
            discover_arms(&src, 1, Duration::ZERO).await,
            Err(Error::Discovery { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn simulated_rewards_track_the_configured_mean() {
        let src = SimulatedRewards::new(default_arm_configs(), 11);
        let n = 4_000;
        let mut sum = 0.0;
        for _ in 0..n {
            sum += src.pull("2").await.unwrap();
        }
        let mean = sum / n as f64;
        assert!((mean - 2.2).abs() < 0.05, "mean={mean}");
        assert!(src.pull("nope").await.is_err());
    }

    #[tokio::test]
    async fn shift_mean_moves_ground_truth() {
        let src = SimulatedRewards::new(default_arm_configs(), 0);
        assert_eq!(src.shift_mean("1", -2.0).unwrap(), 1.0);
        assert_eq!(src.config("1").unwrap().mean, 1.0);
        assert!(src.shift_mean("9", 1.0).is_err());
    }
}
