//! Global operating mode shared between the supervisor (writer) and agents (readers).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// System-wide exploration mode.
///
/// An absent (or expired) mode flag reads as [`SystemMode::Learning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    /// Plain Thompson sampling.
    #[default]
    Learning,
    /// Converged: Thompson sampling with an epsilon-random override.
    Monitoring,
    /// Drift detected: uniform random selection, ignoring beliefs.
    ForcedExploration,
}

impl SystemMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMode::Learning => "LEARNING",
            SystemMode::Monitoring => "MONITORING",
            SystemMode::ForcedExploration => "FORCED_EXPLORATION",
        }
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEARNING" => Ok(SystemMode::Learning),
            "MONITORING" => Ok(SystemMode::Monitoring),
            "FORCED_EXPLORATION" => Ok(SystemMode::ForcedExploration),
            other => Err(Error::Store(format!("unknown system mode {other:?}"))),
        }
    }
}
