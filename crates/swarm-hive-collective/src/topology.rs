//! Topology policy: which role archetypes populate a run.

use crate::registry::{AgentRegistry, Archetype};
use crate::types::{AgentId, Result};
use swarm_hive_config::Topology;
use tracing::debug;

/// One slot in a topology's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSlot {
    pub archetype: Archetype,
    pub role: &'static str,
    pub capabilities: &'static [&'static str],
}

impl RoleSlot {
    const fn new(
        archetype: Archetype,
        role: &'static str,
        capabilities: &'static [&'static str],
    ) -> Self {
        Self {
            archetype,
            role,
            capabilities,
        }
    }
}

/// The coordinating agent, registered ahead of every roster.
pub const QUEEN: RoleSlot = RoleSlot::new(
    Archetype::Queen,
    "queen",
    &["coordination", "planning", "consensus"],
);

const HIERARCHICAL: &[RoleSlot] = &[
    RoleSlot::new(Archetype::Architect, "architect", &["architecture", "design"]),
    RoleSlot::new(Archetype::Worker, "coder", &["coding", "implementation"]),
    RoleSlot::new(Archetype::Scout, "analyst", &["analysis"]),
    RoleSlot::new(Archetype::Scout, "researcher", &["research"]),
    RoleSlot::new(Archetype::Guardian, "reviewer", &["testing", "review"]),
];

const MESH: &[RoleSlot] = &[
    RoleSlot::new(Archetype::Worker, "generalist", &["coding", "analysis", "research"]),
    RoleSlot::new(Archetype::Architect, "specialist", &["architecture", "coding"]),
    RoleSlot::new(Archetype::Scout, "explorer", &["research", "analysis"]),
    RoleSlot::new(Archetype::Guardian, "validator", &["testing", "documentation"]),
];

const RING: &[RoleSlot] = &[
    RoleSlot::new(Archetype::Scout, "researcher", &["research"]),
    RoleSlot::new(Archetype::Scout, "analyst", &["analysis"]),
    RoleSlot::new(Archetype::Worker, "coder", &["coding"]),
    RoleSlot::new(Archetype::Guardian, "reviewer", &["testing", "review"]),
];

const STAR: &[RoleSlot] = &[
    RoleSlot::new(Archetype::Worker, "coder", &["coding"]),
    RoleSlot::new(Archetype::Guardian, "tester", &["testing"]),
    RoleSlot::new(Archetype::Scout, "analyst", &["analysis"]),
    RoleSlot::new(Archetype::Worker, "documenter", &["documentation"]),
];

/// Full archetype table for a topology.
pub fn archetypes(topology: Topology) -> &'static [RoleSlot] {
    match topology {
        Topology::Hierarchical => HIERARCHICAL,
        Topology::Mesh => MESH,
        Topology::Ring => RING,
        Topology::Star => STAR,
    }
}

/// Roster for a run: the topology's slots, truncated to
/// `min(max_agents - 1, len)` so the queen always fits.
pub fn roster(topology: Topology, max_agents: usize) -> &'static [RoleSlot] {
    let slots = archetypes(topology);
    &slots[..max_agents.saturating_sub(1).min(slots.len())]
}

/// Resolve a topology by name. Unknown names are `InvalidTopology`.
pub fn parse_topology(name: &str) -> Result<Topology> {
    Ok(name.parse::<Topology>()?)
}

/// Register the queen followed by the topology roster. Returns the ids in
/// registration order.
pub fn populate(
    registry: &mut AgentRegistry,
    topology: Topology,
    max_agents: usize,
) -> Vec<AgentId> {
    let mut ids = Vec::new();
    for slot in std::iter::once(&QUEEN).chain(roster(topology, max_agents)) {
        let id = registry.register_agent(
            slot.role,
            slot.archetype,
            slot.capabilities.iter().copied(),
        );
        debug!("Registered {} agent {} ({})", slot.archetype, id, slot.role);
        ids.push(id);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CollectiveError;
    use swarm_hive_config::ConfigError;

    #[test]
    fn test_roster_sizing() {
        assert_eq!(roster(Topology::Hierarchical, 8).len(), 5);
        assert_eq!(roster(Topology::Hierarchical, 3).len(), 2);
        assert_eq!(roster(Topology::Mesh, 1).len(), 0);
        assert_eq!(roster(Topology::Mesh, 100).len(), 4);
    }

    #[test]
    fn test_hierarchical_roles_in_order() {
        let roles: Vec<_> = archetypes(Topology::Hierarchical)
            .iter()
            .map(|s| s.role)
            .collect();
        assert_eq!(
            roles,
            vec!["architect", "coder", "analyst", "researcher", "reviewer"]
        );
    }

    #[test]
    fn test_populate_registers_queen_first() {
        let mut registry = AgentRegistry::new();
        let ids = populate(&mut registry, Topology::Star, 3);

        assert_eq!(ids.len(), 3);
        let agents = registry.list_agents(None);
        assert!(agents[0].is_queen());
        assert_eq!(agents[1].role, "coder");
        assert_eq!(agents[2].role, "tester");
    }

    #[test]
    fn test_single_agent_run_is_queen_only() {
        let mut registry = AgentRegistry::new();
        populate(&mut registry, Topology::Ring, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.list_agents(None)[0].is_queen());
    }

    #[test]
    fn test_unknown_topology() {
        assert_eq!(parse_topology("ring").unwrap(), Topology::Ring);
        assert!(matches!(
            parse_topology("torus"),
            Err(CollectiveError::Config(ConfigError::InvalidTopology(_)))
        ));
    }
}
