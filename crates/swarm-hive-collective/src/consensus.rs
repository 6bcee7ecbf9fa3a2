//! Collective decision-making through consensus rounds.
//!
//! A round asks every agent for one boolean vote on a phase, then applies
//! the configured [`ConsensusMechanism`]. Where votes come from is
//! pluggable through [`VoteSource`]; the tally itself is a pure function of
//! the votes, so a given vote set always yields the same verdict.

use crate::capability::CapabilityMatcher;
use crate::execution::deadline_after;
use crate::executor::TaskExecutor;
use crate::knowledge::{self, KeySpace, KnowledgeStore};
use crate::registry::Agent;
use crate::types::{AgentId, CollectiveError, Result, RoundId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm_hive_config::ConsensusMechanism;
use tracing::{debug, info, warn};

/// Time allowed for collecting all votes of a round unless overridden.
pub const DEFAULT_VOTE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Supplies an agent's vote for a phase.
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn cast_vote(&self, agent: &Agent, phase: &str, context: &Value) -> bool;
}

/// Votes fixed ahead of time, per agent id, with a fallback for everyone else.
#[derive(Debug, Clone, Default)]
pub struct FixedVoteSource {
    votes: HashMap<AgentId, bool>,
    fallback: bool,
}

impl FixedVoteSource {
    /// Every agent casts `vote`.
    pub fn all(vote: bool) -> Self {
        Self {
            votes: HashMap::new(),
            fallback: vote,
        }
    }

    pub fn with_vote(mut self, agent_id: impl Into<AgentId>, vote: bool) -> Self {
        self.votes.insert(agent_id.into(), vote);
        self
    }
}

#[async_trait]
impl VoteSource for FixedVoteSource {
    async fn cast_vote(&self, agent: &Agent, _phase: &str, _context: &Value) -> bool {
        self.votes.get(&agent.id).copied().unwrap_or(self.fallback)
    }
}

/// Approves with a fixed probability. The cooperative default when no
/// better judgment is wired in.
#[derive(Debug)]
pub struct HeuristicVoteSource {
    approval_rate: f64,
    rng: Mutex<StdRng>,
}

impl HeuristicVoteSource {
    pub fn new(approval_rate: f64) -> Self {
        Self {
            approval_rate: approval_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }
}

impl Default for HeuristicVoteSource {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[async_trait]
impl VoteSource for HeuristicVoteSource {
    async fn cast_vote(&self, _agent: &Agent, _phase: &str, _context: &Value) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(self.approval_rate)
    }
}

/// Asks the task executor to judge the phase on the agent's behalf.
/// A successful run is an approval; an error or failed run is a rejection.
pub struct ExecutorVoteSource {
    executor: Arc<dyn TaskExecutor>,
}

impl ExecutorVoteSource {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl VoteSource for ExecutorVoteSource {
    async fn cast_vote(&self, agent: &Agent, phase: &str, context: &Value) -> bool {
        let prompt = format!(
            "As the {} agent, review the {} phase and approve or reject it.",
            agent.role, phase
        );
        match self.executor.run_task(&agent.id, &prompt, context).await {
            Ok(output) => output.success,
            Err(e) => {
                warn!("Vote from {} on {} failed, counting as reject: {}", agent.id, phase, e);
                false
            }
        }
    }
}

/// Result of tallying a vote set.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    /// Approving agents / all agents
    pub consensus_ratio: f64,

    /// Ratio the mechanism actually compared against its threshold
    pub approval_ratio: f64,

    pub approved: bool,

    /// Agent whose vote decided the round (leader mechanism only)
    pub decided_by: Option<AgentId>,
}

/// Apply `mechanism` to `votes`. Agents without a recorded vote count as
/// rejecting. An empty agent set is always rejected.
pub fn tally(
    mechanism: ConsensusMechanism,
    phase: &str,
    agents: &[Agent],
    votes: &BTreeMap<AgentId, bool>,
    matcher: &CapabilityMatcher,
) -> Tally {
    let vote_of = |agent: &Agent| votes.get(&agent.id).copied().unwrap_or(false);

    if agents.is_empty() {
        return Tally {
            consensus_ratio: 0.0,
            approval_ratio: 0.0,
            approved: false,
            decided_by: None,
        };
    }

    let approvals = agents.iter().filter(|a| vote_of(a)).count();
    let consensus_ratio = approvals as f64 / agents.len() as f64;

    match mechanism {
        ConsensusMechanism::Quorum => Tally {
            consensus_ratio,
            approval_ratio: consensus_ratio,
            approved: consensus_ratio > 0.5,
            decided_by: None,
        },
        ConsensusMechanism::Unanimous => Tally {
            consensus_ratio,
            approval_ratio: consensus_ratio,
            approved: approvals == agents.len(),
            decided_by: None,
        },
        ConsensusMechanism::Weighted => {
            // Base weight of 1 keeps agents with no matching capability in the count
            let mut weighted_total = 0.0;
            let mut weighted_approval = 0.0;
            for agent in agents {
                let weight = 1.0 + matcher.match_score(phase, agent);
                weighted_total += weight;
                if vote_of(agent) {
                    weighted_approval += weight;
                }
            }
            let approval_ratio = weighted_approval / weighted_total;
            Tally {
                consensus_ratio,
                approval_ratio,
                approved: approval_ratio > 0.5,
                decided_by: None,
            }
        }
        ConsensusMechanism::Leader => {
            let leader = agents.iter().find(|a| a.is_queen()).unwrap_or(&agents[0]);
            let approved = vote_of(leader);
            Tally {
                consensus_ratio,
                approval_ratio: if approved { 1.0 } else { 0.0 },
                approved,
                decided_by: Some(leader.id.clone()),
            }
        }
    }
}

/// A finalized consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRound {
    pub id: RoundId,

    /// Phase being decided (e.g. "specification", "task-breakdown")
    pub phase: String,

    /// What was put to the vote
    pub context: Value,

    pub mechanism: ConsensusMechanism,

    /// Raw votes by agent
    pub votes: BTreeMap<AgentId, bool>,

    pub consensus_ratio: f64,

    pub approval_ratio: f64,

    pub approved: bool,

    pub decided_by: Option<AgentId>,

    pub timestamp: DateTime<Utc>,
}

impl ConsensusRound {
    /// `Ok` when approved, otherwise `ConsensusRejected` for this phase.
    pub fn ensure_approved(&self) -> Result<()> {
        if self.approved {
            Ok(())
        } else {
            Err(CollectiveError::ConsensusRejected {
                phase: self.phase.clone(),
                ratio: self.consensus_ratio,
            })
        }
    }
}

/// Runs consensus rounds and records them in the knowledge store.
pub struct ConsensusEngine {
    mechanism: ConsensusMechanism,
    vote_source: Arc<dyn VoteSource>,
    store: Arc<dyn KnowledgeStore>,
    keys: KeySpace,
    matcher: CapabilityMatcher,
    vote_timeout: Duration,
}

impl ConsensusEngine {
    pub fn new(
        mechanism: ConsensusMechanism,
        vote_source: Arc<dyn VoteSource>,
        store: Arc<dyn KnowledgeStore>,
        keys: KeySpace,
    ) -> Self {
        Self {
            mechanism,
            vote_source,
            store,
            keys,
            matcher: CapabilityMatcher::default(),
            vote_timeout: DEFAULT_VOTE_TIMEOUT,
        }
    }

    pub fn with_matcher(mut self, matcher: CapabilityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Deadline for collecting a round's votes. Votes still outstanding
    /// when it passes count as rejections.
    pub fn with_vote_timeout(mut self, timeout: Duration) -> Self {
        self.vote_timeout = timeout;
        self
    }

    pub fn mechanism(&self) -> ConsensusMechanism {
        self.mechanism
    }

    /// Collect one vote per agent, tally, and persist the round.
    ///
    /// Rounds are never retried; a rejected round is returned like an
    /// approved one and the caller decides what to do with it.
    pub async fn conduct_round(
        &self,
        phase: &str,
        context: Value,
        agents: &[Agent],
    ) -> ConsensusRound {
        let round_id = uuid::Uuid::new_v4().to_string();

        knowledge::record(
            self.store.as_ref(),
            &self.keys.consensus_context(&round_id),
            json!({
                "phase": phase,
                "mechanism": self.mechanism,
                "context": context,
                "agents": agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            }),
        )
        .await;

        let deadline = deadline_after(self.vote_timeout);
        let mut votes = BTreeMap::new();
        for agent in agents {
            let cast = self.vote_source.cast_vote(agent, phase, &context);
            let vote = match tokio::time::timeout_at(deadline, cast).await {
                Ok(vote) => vote,
                Err(_) => {
                    warn!("Vote from {} on {} timed out, counting as reject", agent.id, phase);
                    false
                }
            };
            votes.insert(agent.id.clone(), vote);
        }

        let result = tally(self.mechanism, phase, agents, &votes, &self.matcher);

        if let Some(leader) = &result.decided_by {
            for (agent_id, vote) in votes.iter().filter(|(id, _)| *id != leader) {
                debug!("Advisory vote on {} from {}: {}", phase, agent_id, vote);
            }
        }

        let round = ConsensusRound {
            id: round_id,
            phase: phase.to_string(),
            context,
            mechanism: self.mechanism,
            votes,
            consensus_ratio: result.consensus_ratio,
            approval_ratio: result.approval_ratio,
            approved: result.approved,
            decided_by: result.decided_by,
            timestamp: Utc::now(),
        };

        match serde_json::to_value(&round) {
            Ok(value) => {
                knowledge::record(
                    self.store.as_ref(),
                    &self.keys.consensus_results(&round.id),
                    value,
                )
                .await
            }
            Err(e) => warn!("Failed to serialize consensus round {}: {}", round.id, e),
        }

        info!(
            "Consensus round {} on {} ({}): ratio {:.2}, {}",
            round.id,
            phase,
            self.mechanism,
            round.consensus_ratio,
            if round.approved { "approved" } else { "rejected" }
        );

        round
    }
}
