//! Logging setup on `tracing-subscriber`.
//!
//! `RUST_LOG` takes precedence over the configured level:
//!
//! ```bash
//! # Supervisor decisions only
//! RUST_LOG=warn,ngbandit::supervisor=debug ngbandit run
//! ```
//!
//! | Target | Description |
//! |--------|-------------|
//! | `ngbandit::agent` | Selections, pulls, belief updates |
//! | `ngbandit::supervisor` | Convergence and drift decisions |
//! | `ngbandit::store` | Write conflicts and mode writes |
//! | `ngbandit::rewards` | Arm discovery |

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colored.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
    /// Compact single-line.
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!(
                "unknown log format {other:?}; use pretty, json or compact"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Also write JSON logs to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_file: None,
        }
    }
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("bad log level {level:?}: {e}")))?;
    for quiet in ["hyper=warn", "reqwest=warn"] {
        let directive = quiet
            .parse()
            .map_err(|e| Error::Config(format!("bad directive {quiet}: {e}")))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let filter = build_filter(&cfg.level)?;
    let installed = if let Some(path) = &cfg.log_file {
        let file = std::fs::File::create(path)?;
        // Files get JSON regardless of the stdout format.
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .json();
        let stdout_layer = tracing_subscriber::fmt::layer().json();
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
    } else {
        match cfg.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .finish()
                .try_init(),
            LogFormat::Compact => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .finish()
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .finish()
                .try_init(),
        }
    };
    installed.map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}
