//! `ngbandit`: an online Bayesian bandit with shared beliefs, concurrent agents, and a
//! convergence/drift supervisor.
//!
//! Designed for “arm selection” problems with Gaussian rewards of unknown mean and variance:
//! a fixed set of arms, repeated pulls, a noisy scalar reward per pull, and an environment
//! that may change after the system has settled.
//!
//! **Pieces:**
//! - [`Belief`]: Normal-Gamma posterior per arm, with the pure conjugate [`Belief::update`].
//! - [`Selector`]: seedable Thompson sampling, overridden by the global [`SystemMode`]
//!   (uniform in `FORCED_EXPLORATION`, epsilon-uniform in `MONITORING`).
//! - [`KvStore`] / [`BeliefStore`]: the shared state. Per-arm beliefs are versioned field maps
//!   written by compare-and-swap; the mode flag and per-arm last-reward slot are scalar values
//!   with optional TTL. [`MemoryKv`] is the in-process backend.
//! - [`Agent`]: read mode → choose → pull a [`RewardSource`] → optimistic update, retried on
//!   conflict. Any number may run at once.
//! - [`Supervisor`]: one instance; declares convergence after a run of stable belief snapshots,
//!   then watches the best arm's rewards and forces re-exploration when they fall below a
//!   fraction of the converged mean.
//!
//! **Goals:**
//! - **Deterministic by default**: fixed seeds + fixed beliefs + fixed arm order → same choice.
//! - **Lock-free coordination**: agents never block each other; conflicts are retried.
//! - **Graceful degradation**: only startup faults are fatal.
//!
//! **Non-goals:**
//! - Not a general RL framework: one reward family (Gaussian), one prior family
//!   (Normal-Gamma), one policy family (Thompson with random overrides).
//! - No dashboard; [`BeliefSnapshot`] is the read-only boundary for one.
//!
//! ```rust
//! use ngbandit::Belief;
//!
//! let b = Belief::UNINFORMATIVE.update(2.0);
//! assert_eq!(b.mu, 1.0);
//! assert_eq!(b.nu, 2.0);
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod belief;
pub use belief::*;

mod mode;
pub use mode::*;

mod thompson;
pub use thompson::*;

pub mod kv;
pub use kv::{CasOutcome, KvStore, MemoryKv, Version, Versioned};

pub mod store;
pub use store::{BeliefStore, ModifyOutcome};

pub mod rewards;
pub use rewards::{discover_arms, ArmConfig, RewardSource, SimulatedRewards};
#[cfg(feature = "http")]
pub use rewards::HttpRewardSource;

mod agent;
pub use agent::*;

pub mod monitor;
pub use monitor::RewardWindow;

mod supervisor;
pub use supervisor::*;

mod snapshot;
pub use snapshot::*;

pub mod config;
pub use config::Config;

pub mod logging;

pub const NGBANDIT_VERSION: &str = env!("CARGO_PKG_VERSION");
