//! Run configuration for a swarm.
//!
//! A [`HiveConfig`] is created once per invocation. It can be built from
//! defaults, a TOML file, and `SWARM_HIVE_*` environment overrides, in that
//! order of precedence (later wins), and must pass [`HiveConfig::validate`]
//! before a run starts.

use crate::error::{ConfigError, Result};
use crate::options::{
    ConsensusMechanism, FailurePolicy, Methodology, RejectionPolicy, Strategy, Topology,
};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SWARM_HIVE_";

/// Process-scoped configuration for a swarm run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HiveConfig {
    /// Coordination pattern used to populate the agent registry
    pub topology: Topology,

    /// Voting rule for consensus rounds
    pub consensus: ConsensusMechanism,

    /// Upper bound on registered agents, coordinator included
    pub max_agents: usize,

    /// Global deadline for the execution phase
    pub timeout_minutes: u64,

    /// Minimum quality score as a fraction in [0, 1]
    pub quality_threshold: f64,

    /// Key prefix for everything written to the knowledge store
    pub memory_namespace: String,

    /// Decomposition strategy
    pub strategy: Strategy,

    /// Run tasks one at a time instead of concurrently
    pub sequential: bool,

    /// Failure handling during execution
    pub on_failure: FailurePolicy,

    /// Generic four-phase flow or the structured five-phase flow
    pub methodology: Methodology,

    /// Gate the generic flow's decomposition behind a consensus round
    pub consensus_on_decomposition: bool,

    /// Response to a rejected gating round
    pub rejection_policy: RejectionPolicy,

    /// Exclusive upper bound on bid jitter
    pub bid_jitter: f64,

    /// Score contributed by each matching capability
    pub match_weight: f64,

    /// Refuse assignments where the winning agent matches no capability
    pub strict_matching: bool,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Hierarchical,
            consensus: ConsensusMechanism::Quorum,
            max_agents: 8,
            timeout_minutes: 60,
            quality_threshold: 0.8,
            memory_namespace: "hive".to_string(),
            strategy: Strategy::Auto,
            sequential: false,
            on_failure: FailurePolicy::Continue,
            methodology: Methodology::Generic,
            consensus_on_decomposition: true,
            rejection_policy: RejectionPolicy::Halt,
            bid_jitter: 0.5,
            match_weight: 3.0,
            strict_matching: false,
        }
    }
}

impl HiveConfig {
    /// Parse a configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, otherwise the per-user config file if it exists,
    /// otherwise defaults. Environment overrides are applied and the result
    /// is validated.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Location of the per-user config file, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "swarm-hive", "swarm-hive")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply `SWARM_HIVE_*` environment variables on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("TOPOLOGY") {
            self.topology = v.parse()?;
        }
        if let Some(v) = env_var("CONSENSUS") {
            self.consensus = v.parse()?;
        }
        if let Some(v) = env_var("MAX_AGENTS") {
            self.max_agents = parse_number("MAX_AGENTS", &v)?;
        }
        if let Some(v) = env_var("TIMEOUT_MINUTES") {
            self.timeout_minutes = parse_number("TIMEOUT_MINUTES", &v)?;
        }
        if let Some(v) = env_var("QUALITY_THRESHOLD") {
            self.quality_threshold = parse_number("QUALITY_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("MEMORY_NAMESPACE") {
            self.memory_namespace = v;
        }
        if let Some(v) = env_var("STRATEGY") {
            self.strategy = v.parse()?;
        }
        if let Some(v) = env_var("SEQUENTIAL") {
            self.sequential = parse_bool("SEQUENTIAL", &v)?;
        }
        if let Some(v) = env_var("ON_FAILURE") {
            self.on_failure = v.parse()?;
        }
        if let Some(v) = env_var("METHODOLOGY") {
            self.methodology = v.parse()?;
        }
        Ok(())
    }

    /// Check every numeric bound. Nothing is created for a run until this passes.
    pub fn validate(&self) -> Result<()> {
        if self.max_agents < 1 {
            return Err(ConfigError::InvalidConfiguration(
                "max_agents must be at least 1".to_string(),
            ));
        }
        if self.timeout_minutes == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "timeout_minutes must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "quality_threshold must be within [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if self.memory_namespace.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "memory_namespace must not be empty".to_string(),
            ));
        }
        if !self.match_weight.is_finite() || self.match_weight <= 0.0 {
            return Err(ConfigError::InvalidConfiguration(format!(
                "match_weight must be a positive number, got {}",
                self.match_weight
            )));
        }
        // Jitter must never be able to outweigh a single capability match.
        if !self.bid_jitter.is_finite()
            || self.bid_jitter < 0.0
            || self.bid_jitter >= self.match_weight
        {
            return Err(ConfigError::InvalidConfiguration(format!(
                "bid_jitter must be within [0, match_weight), got {} with match_weight {}",
                self.bid_jitter, self.match_weight
            )));
        }

        debug!(
            "Validated config: topology={}, consensus={}, max_agents={}",
            self.topology, self.consensus, self.max_agents
        );
        Ok(())
    }

    /// The execution deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidConfiguration(format!("{}{} is not a number: {}", ENV_PREFIX, name, value))
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidConfiguration(format!(
            "{}{} is not a boolean: {}",
            ENV_PREFIX, name, value
        ))),
    }
}
