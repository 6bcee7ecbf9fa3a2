//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors raised while building a [`HiveConfig`](crate::HiveConfig).
///
/// Every variant is a setup-time failure: a run never starts with a
/// configuration that produced one of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid topology: {0} (expected mesh, hierarchical, ring or star)")]
    InvalidTopology(String),

    #[error(
        "Invalid consensus mechanism: {0} (expected quorum, unanimous, weighted or leader)"
    )]
    InvalidConsensusMechanism(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
