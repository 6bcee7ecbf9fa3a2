//! Task assignment by capability bidding.
//!
//! Every agent bids on every task: its capability match score plus a small
//! jitter. The highest bid wins. Because the jitter bound is kept below the
//! match weight, jitter only ever breaks ties between equally matched
//! agents and never overturns a better match.

use crate::capability::{self, CapabilityMatcher};
use crate::decomposition::Task;
use crate::registry::Agent;
use crate::types::{AgentId, CollectiveError, Result, TaskId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use swarm_hive_config::ConfigError;
use tracing::debug;

/// Source of the random component of a bid.
pub trait BidJitter: Send + Sync {
    /// Exclusive upper bound of [`sample`](Self::sample).
    fn bound(&self) -> f64;

    /// A value in `[0, bound)`.
    fn sample(&self) -> f64;
}

/// Uniform jitter in `[0, bound)`.
#[derive(Debug)]
pub struct RandomJitter {
    bound: f64,
    rng: Mutex<StdRng>,
}

impl RandomJitter {
    pub fn new(bound: f64) -> Self {
        Self {
            bound: bound.max(0.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }
}

impl BidJitter for RandomJitter {
    fn bound(&self) -> f64 {
        self.bound
    }

    fn sample(&self) -> f64 {
        if self.bound <= 0.0 {
            return 0.0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0.0..self.bound)
    }
}

/// No jitter; ties always go to the earliest registered agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BidJitter for NoJitter {
    fn bound(&self) -> f64 {
        0.0
    }

    fn sample(&self) -> f64 {
        0.0
    }
}

/// A task bound to the agent that won it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,

    /// Winning bid
    pub score: f64,

    /// Why this agent won
    pub reasoning: String,
}

/// Greedy per-task assignment over a snapshot of agents.
pub struct AssignmentBroker {
    matcher: CapabilityMatcher,
    jitter: Arc<dyn BidJitter>,
    strict: bool,
}

impl AssignmentBroker {
    /// Create a broker. The jitter bound must be below the match weight.
    pub fn new(matcher: CapabilityMatcher, jitter: Arc<dyn BidJitter>) -> Result<Self> {
        if jitter.bound() >= matcher.weight() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "bid jitter bound {} must be below match weight {}",
                jitter.bound(),
                matcher.weight()
            ))
            .into());
        }
        Ok(Self {
            matcher,
            jitter,
            strict: false,
        })
    }

    /// Reject tasks that no agent has a single matching capability for.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Pick the best agent for one task.
    pub fn assign_one(&self, task: &Task, agents: &[Agent]) -> Result<Assignment> {
        let no_agent = || CollectiveError::NoEligibleAgent {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
        };

        let mut best: Option<(&Agent, f64)> = None;
        for agent in agents {
            let bid = self.matcher.match_score(&task.task_type, agent) + self.jitter.sample();
            // Strictly greater keeps the earlier agent on ties
            if best.map_or(true, |(_, top)| bid > top) {
                best = Some((agent, bid));
            }
        }

        let (agent, score) = best.ok_or_else(no_agent)?;

        let matched = capability::match_count(&task.task_type, agent);
        if self.strict && matched == 0 {
            return Err(no_agent());
        }

        debug!(
            "Assigned {} ({}) to {} with bid {:.2}",
            task.id, task.task_type, agent.id, score
        );

        Ok(Assignment {
            task_id: task.id.clone(),
            agent_id: agent.id.clone(),
            score,
            reasoning: format!(
                "{} matches {} required capabilities of {}",
                agent.role, matched, task.task_type
            ),
        })
    }

    /// Assign every task, stopping at the first task nobody can take.
    pub fn assign(&self, tasks: &[Task], agents: &[Agent]) -> Result<Vec<Assignment>> {
        tasks.iter().map(|t| self.assign_one(t, agents)).collect()
    }
}
