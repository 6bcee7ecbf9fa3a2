//! Agent registry.
//!
//! An arena of agents keyed by id, owned by one run. The run controller is
//! the only writer; the consensus engine and assignment broker work on
//! snapshots taken from [`AgentRegistry::list_agents`].

use crate::types::{AgentId, Capability, CollectiveError, Result, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry handle shared between the controller and the execution coordinator.
pub type SharedRegistry = Arc<RwLock<AgentRegistry>>;

/// Role archetype of an agent. Archetypes carry no behavior of their own
/// beyond a label and a default capability set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Coordinating lead agent, registered first in every run
    Queen,
    Architect,
    Worker,
    Scout,
    Guardian,
}

impl Archetype {
    pub fn label(&self) -> &'static str {
        match self {
            Archetype::Queen => "queen",
            Archetype::Architect => "architect",
            Archetype::Worker => "worker",
            Archetype::Scout => "scout",
            Archetype::Guardian => "guardian",
        }
    }

    /// Capabilities every agent of this archetype starts with.
    pub fn base_capabilities(&self) -> &'static [&'static str] {
        match self {
            Archetype::Queen => &["coordination", "planning"],
            Archetype::Architect => &["architecture", "planning"],
            Archetype::Worker => &["coding"],
            Archetype::Scout => &["research"],
            Archetype::Guardian => &["testing"],
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current activity of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Voting,
    Executing,
}

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique within a run
    pub id: AgentId,

    /// Display role (e.g. "coder", "reviewer")
    pub role: String,

    pub archetype: Archetype,

    pub capabilities: BTreeSet<Capability>,

    pub status: AgentStatus,

    /// Votes cast, by round. Entries are never replaced.
    pub votes: BTreeMap<RoundId, bool>,
}

impl Agent {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_queen(&self) -> bool {
        self.archetype == Archetype::Queen
    }
}

/// Filter for [`AgentRegistry::list_agents`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub archetype: Option<Archetype>,
    pub status: Option<AgentStatus>,
    pub capability: Option<Capability>,
}

impl AgentFilter {
    pub fn archetype(archetype: Archetype) -> Self {
        Self {
            archetype: Some(archetype),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        self.archetype.map_or(true, |a| agent.archetype == a)
            && self.status.map_or(true, |s| agent.status == s)
            && self
                .capability
                .as_deref()
                .map_or(true, |c| agent.has_capability(c))
    }
}

/// Arena of agents for a single run, in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index: HashMap<AgentId, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the registry for sharing across tasks.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register an agent and return its id. The archetype's base
    /// capabilities are merged with `capabilities`.
    pub fn register_agent(
        &mut self,
        role: impl Into<String>,
        archetype: Archetype,
        capabilities: impl IntoIterator<Item = impl Into<String>>,
    ) -> AgentId {
        let role = role.into();
        let id = format!(
            "{}-{}",
            role.to_lowercase().replace(' ', "-"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        let mut caps: BTreeSet<Capability> = archetype
            .base_capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect();
        caps.extend(capabilities.into_iter().map(Into::into));

        let agent = Agent {
            id: id.clone(),
            role,
            archetype,
            capabilities: caps,
            status: AgentStatus::Idle,
            votes: BTreeMap::new(),
        };

        self.index.insert(id.clone(), self.agents.len());
        self.agents.push(agent);
        id
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    /// Like [`get_agent`](Self::get_agent) but not-found is an error.
    pub fn require(&self, id: &str) -> Result<&Agent> {
        self.get_agent(id)
            .ok_or_else(|| CollectiveError::AgentNotFound(id.to_string()))
    }

    /// Snapshot of the agents matching `filter`, in registration order.
    pub fn list_agents(&self, filter: Option<&AgentFilter>) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|a| filter.map_or(true, |f| f.matches(a)))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Move an agent to `status`, returning the previous status.
    pub fn set_status(&mut self, id: &str, status: AgentStatus) -> Result<AgentStatus> {
        let agent = self.get_mut(id)?;
        Ok(std::mem::replace(&mut agent.status, status))
    }

    /// Append a vote to an agent's history. A second vote for the same
    /// round is ignored and `false` is returned.
    pub fn record_vote(&mut self, id: &str, round_id: &str, vote: bool) -> Result<bool> {
        let agent = self.get_mut(id)?;
        if agent.votes.contains_key(round_id) {
            return Ok(false);
        }
        agent.votes.insert(round_id.to_string(), vote);
        Ok(true)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Agent> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.agents[i]),
            None => Err(CollectiveError::AgentNotFound(id.to_string())),
        }
    }
}
