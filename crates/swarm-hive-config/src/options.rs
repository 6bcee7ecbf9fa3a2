//! Enumerated run options.
//!
//! Each option parses from the lowercase names used on the command line and
//! in config files, and renders back to the same name.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Organizational pattern that decides which role archetypes populate a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Mesh,
    #[default]
    Hierarchical,
    Ring,
    Star,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Mesh => "mesh",
            Topology::Hierarchical => "hierarchical",
            Topology::Ring => "ring",
            Topology::Star => "star",
        }
    }
}

impl FromStr for Topology {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mesh" => Ok(Topology::Mesh),
            "hierarchical" => Ok(Topology::Hierarchical),
            "ring" => Ok(Topology::Ring),
            "star" => Ok(Topology::Star),
            other => Err(ConfigError::InvalidTopology(other.to_string())),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule used to turn per-agent votes into an approve/reject verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMechanism {
    /// Strictly more than half of the agents approve
    #[default]
    Quorum,
    /// Every agent approves
    Unanimous,
    /// Votes weighted by capability match against the phase
    Weighted,
    /// Only the coordinator's vote counts
    Leader,
}

impl ConsensusMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusMechanism::Quorum => "quorum",
            ConsensusMechanism::Unanimous => "unanimous",
            ConsensusMechanism::Weighted => "weighted",
            ConsensusMechanism::Leader => "leader",
        }
    }
}

impl FromStr for ConsensusMechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quorum" | "majority" => Ok(ConsensusMechanism::Quorum),
            "unanimous" => Ok(ConsensusMechanism::Unanimous),
            "weighted" => Ok(ConsensusMechanism::Weighted),
            "leader" => Ok(ConsensusMechanism::Leader),
            other => Err(ConfigError::InvalidConsensusMechanism(other.to_string())),
        }
    }
}

impl fmt::Display for ConsensusMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an objective is broken into subtasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Research,
    Development,
    Analysis,
    #[default]
    Auto,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Research => "research",
            Strategy::Development => "development",
            Strategy::Analysis => "analysis",
            Strategy::Auto => "auto",
        }
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(Strategy::Research),
            "development" => Ok(Strategy::Development),
            "analysis" => Ok(Strategy::Analysis),
            "auto" => Ok(Strategy::Auto),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether one task failure halts the rest of the task set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailFast,
    #[default]
    Continue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::Continue => "continue",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown failure policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall shape of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Methodology {
    /// decompose → assign → execute → aggregate
    #[default]
    Generic,
    /// specification → pseudocode → architecture → refinement → completion,
    /// each phase gated by a consensus round
    Structured,
}

impl Methodology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Methodology::Generic => "generic",
            Methodology::Structured => "structured",
        }
    }
}

impl FromStr for Methodology {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generic" => Ok(Methodology::Generic),
            "structured" | "sparc" => Ok(Methodology::Structured),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown methodology: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the controller does when a gating consensus round is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionPolicy {
    #[default]
    Halt,
    ProceedWithWarning,
}

impl FromStr for RejectionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "halt" => Ok(RejectionPolicy::Halt),
            "proceed-with-warning" | "proceed" => Ok(RejectionPolicy::ProceedWithWarning),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown rejection policy: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_parsing() {
        assert_eq!("mesh".parse::<Topology>().unwrap(), Topology::Mesh);
        assert_eq!(" Star ".parse::<Topology>().unwrap(), Topology::Star);

        let err = "tree".parse::<Topology>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTopology(ref t) if t == "tree"));
    }

    #[test]
    fn test_consensus_parsing() {
        assert_eq!(
            "unanimous".parse::<ConsensusMechanism>().unwrap(),
            ConsensusMechanism::Unanimous
        );
        assert_eq!(
            "majority".parse::<ConsensusMechanism>().unwrap(),
            ConsensusMechanism::Quorum
        );
        assert!(matches!(
            "raft".parse::<ConsensusMechanism>(),
            Err(ConfigError::InvalidConsensusMechanism(_))
        ));
    }

    #[test]
    fn test_failure_policy_round_trips_through_display() {
        for policy in [FailurePolicy::FailFast, FailurePolicy::Continue] {
            assert_eq!(policy.to_string().parse::<FailurePolicy>().unwrap(), policy);
        }
        assert_eq!(
            "fail_fast".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailFast
        );
    }
}
