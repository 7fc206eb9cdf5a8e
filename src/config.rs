//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [model]
//! prior_alpha = 0.2
//!
//! [supervisor]
//! check_interval_secs = 10
//! drift_window_size = 50
//!
//! [rewards]
//! url = "http://localhost:8000"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::logging::LogConfig;
use crate::rewards::{default_arm_configs, ArmConfig};
use crate::supervisor::SupervisorConfig;
use crate::thompson::{SelectionConfig, DEFAULT_EPSILON};
use crate::{Belief, Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub selection: SelectionSection,
    pub agent: AgentSection,
    pub supervisor: SupervisorSection,
    pub rewards: RewardsSection,
    pub logging: LogConfig,
}

/// Prior written on initialization and after drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub prior_mu: f64,
    pub prior_nu: f64,
    pub prior_alpha: f64,
    pub prior_beta: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let p = Belief::UNINFORMATIVE;
        Self {
            prior_mu: p.mu,
            prior_nu: p.nu,
            prior_alpha: p.alpha,
            prior_beta: p.beta,
        }
    }
}

impl ModelConfig {
    pub fn prior(&self) -> Belief {
        Belief::new(self.prior_mu, self.prior_nu, self.prior_alpha, self.prior_beta)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSection {
    pub epsilon: f64,
    /// Base seed; agent `i` uses `seed + i`. Absent means OS entropy.
    pub seed: Option<u64>,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Number of concurrent agent tasks.
    pub count: usize,
    pub pull_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub last_reward_ttl_ms: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            count: 1,
            pull_interval_ms: 1_000,
            error_backoff_ms: 5_000,
            last_reward_ttl_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub check_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub convergence_threshold: f64,
    pub convergence_duration_checks: u32,
    pub drift_window_size: usize,
    pub drift_threshold_factor: f64,
    pub forced_exploration_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        let d = SupervisorConfig::default();
        Self {
            check_interval_secs: d.check_interval.as_secs(),
            startup_delay_secs: d.startup_delay.as_secs(),
            convergence_threshold: d.convergence_threshold,
            convergence_duration_checks: d.convergence_duration_checks,
            drift_window_size: d.drift_window_size,
            drift_threshold_factor: d.drift_threshold_factor,
            forced_exploration_secs: d.forced_exploration.as_secs(),
        }
    }
}

/// A scheduled change of one simulated arm's true mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSchedule {
    pub after_secs: u64,
    pub arm: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsSection {
    /// Remote reward service. Absent means the in-process simulation below.
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub discovery_attempts: u32,
    pub discovery_delay_ms: u64,
    /// Simulated ground truth.
    pub arms: BTreeMap<String, ArmConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftSchedule>,
}

impl Default for RewardsSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 2_000,
            discovery_attempts: 5,
            discovery_delay_ms: 1_000,
            arms: default_arm_configs(),
            drift: None,
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::Config(msg));

        if !self.model.prior().is_valid() {
            return bad(format!(
                "prior must have finite mu and positive nu/alpha/beta, got {:?}",
                self.model.prior()
            ));
        }
        let eps = self.selection.epsilon;
        if !(0.0..=1.0).contains(&eps) {
            return bad(format!("selection.epsilon must be in [0, 1], got {eps}"));
        }
        if self.agent.count == 0 {
            return bad("agent.count must be at least 1".to_string());
        }
        for (name, ms) in [
            ("agent.pull_interval_ms", self.agent.pull_interval_ms),
            ("agent.error_backoff_ms", self.agent.error_backoff_ms),
            ("agent.last_reward_ttl_ms", self.agent.last_reward_ttl_ms),
            ("rewards.timeout_ms", self.rewards.timeout_ms),
            ("rewards.discovery_delay_ms", self.rewards.discovery_delay_ms),
        ] {
            if ms == 0 {
                return bad(format!("{name} must be positive"));
            }
        }
        let s = &self.supervisor;
        if s.check_interval_secs == 0 {
            return bad("supervisor.check_interval_secs must be positive".to_string());
        }
        if s.convergence_duration_checks == 0 {
            return bad("supervisor.convergence_duration_checks must be positive".to_string());
        }
        if s.drift_window_size == 0 {
            return bad("supervisor.drift_window_size must be positive".to_string());
        }
        if !(s.convergence_threshold.is_finite() && s.convergence_threshold > 0.0) {
            return bad(format!(
                "supervisor.convergence_threshold must be positive, got {}",
                s.convergence_threshold
            ));
        }
        if !s.drift_threshold_factor.is_finite() {
            return bad("supervisor.drift_threshold_factor must be finite".to_string());
        }
        if s.forced_exploration_secs == 0 {
            return bad("supervisor.forced_exploration_secs must be positive".to_string());
        }
        if self.rewards.url.is_none() && self.rewards.arms.is_empty() {
            return bad("rewards.arms must not be empty without rewards.url".to_string());
        }
        if let Some(d) = &self.rewards.drift {
            if self.rewards.url.is_some() {
                return bad(
                    "rewards.drift only applies to simulated arms; remove rewards.url".to_string(),
                );
            }
            if !self.rewards.arms.contains_key(&d.arm) {
                return bad(format!("rewards.drift.arm {:?} is not a simulated arm", d.arm));
            }
        }
        Ok(())
    }

    pub fn selection_config(&self) -> SelectionConfig {
        SelectionConfig {
            epsilon: self.selection.epsilon,
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            pull_interval: Duration::from_millis(self.agent.pull_interval_ms),
            error_backoff: Duration::from_millis(self.agent.error_backoff_ms),
            last_reward_ttl: Duration::from_millis(self.agent.last_reward_ttl_ms),
            prior: self.model.prior(),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let s = &self.supervisor;
        SupervisorConfig {
            check_interval: Duration::from_secs(s.check_interval_secs),
            startup_delay: Duration::from_secs(s.startup_delay_secs),
            convergence_threshold: s.convergence_threshold,
            convergence_duration_checks: s.convergence_duration_checks,
            drift_window_size: s.drift_window_size,
            drift_threshold_factor: s.drift_threshold_factor,
            forced_exploration: Duration::from_secs(s.forced_exploration_secs),
            prior: self.model.prior(),
        }
    }
}
