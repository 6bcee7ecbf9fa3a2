//! Capability matching between task types and agents.
//!
//! The same scoring function backs assignment bids and the weighted
//! consensus mechanism, so an agent that would win a phase's task also
//! carries more weight when voting on that phase.

use crate::registry::Agent;

/// Score contributed by each required capability an agent holds.
pub const DEFAULT_MATCH_WEIGHT: f64 = 3.0;

/// Capabilities a task type calls for. Unknown types require nothing.
pub fn required_capabilities(task_type: &str) -> &'static [&'static str] {
    match normalize(task_type).as_str() {
        "analysis" | "synthesis" | "visualization" | "specification" => &["analysis"],
        "design" | "architecture" | "pseudocode" => &["architecture"],
        "implementation" | "execution" => &["coding"],
        "testing" | "validation" => &["testing"],
        "documentation" => &["documentation"],
        "research" | "data-gathering" | "exploration" => &["research"],
        "planning" | "task-breakdown" => &["planning"],
        "refinement" => &["coding", "testing"],
        "completion" => &["testing", "documentation"],
        _ => &[],
    }
}

fn normalize(task_type: &str) -> String {
    task_type.trim().to_lowercase().replace(['_', ' '], "-")
}

/// Number of `task_type`'s required capabilities that `agent` holds.
pub fn match_count(task_type: &str, agent: &Agent) -> usize {
    required_capabilities(task_type)
        .iter()
        .filter(|c| agent.has_capability(c))
        .count()
}

/// Weighted capability scoring.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityMatcher {
    weight: f64,
}

impl CapabilityMatcher {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// `weight × matched capabilities`, without jitter.
    pub fn match_score(&self, task_type: &str, agent: &Agent) -> f64 {
        self.weight * match_count(task_type, agent) as f64
    }
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_WEIGHT)
    }
}
