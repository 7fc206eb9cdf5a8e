use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The backing store failed or returned something unreadable.
    #[error("store error: {0}")]
    Store(String),

    /// A stored belief is missing one of its fields.
    #[error("malformed belief under {key:?}: missing field {field:?}")]
    MalformedBelief { key: String, field: &'static str },

    /// A reward source call failed.
    #[error("reward source error: {0}")]
    RewardSource(String),

    #[cfg(feature = "http")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Arm discovery ran out of attempts.
    #[error("arm discovery failed after {attempts} attempts: {last}")]
    Discovery { attempts: u32, last: String },

    #[error("reward source offered no arms")]
    NoArms,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
