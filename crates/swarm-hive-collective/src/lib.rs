//! Coordination engine for swarms of cooperating agents.
//!
//! This crate turns a high-level objective into a bounded, audited run by a
//! team of role-specialized agents:
//!
//! - **Agent Registry & Topology**: Populate a run with a coordinator and a
//!   topology-specific roster of role archetypes
//! - **Consensus**: Collective approval of phases by quorum, unanimity,
//!   capability-weighted voting, or the coordinator's decision
//! - **Decomposition**: Split an objective into a dependency-ordered task graph
//! - **Assignment**: Capability bidding with bounded jitter
//! - **Execution**: Parallel or sequential execution under one deadline, with
//!   fail-fast or continue failure handling
//! - **Quality Gate**: Score the results and decide pass or fail
//!
//! # Architecture
//!
//! The engine owns no work and no storage of its own. It reaches the outside
//! world through two seams:
//!
//! - [`TaskExecutor`] performs each unit of work for an agent
//! - [`KnowledgeStore`] receives the audit trail of rounds, results and
//!   run verdicts
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use swarm_hive_collective::{InMemoryKnowledgeStore, SimulatedExecutor, SwarmController};
//! use swarm_hive_config::HiveConfig;
//!
//! let mut controller = SwarmController::new(
//!     HiveConfig::default(),
//!     Arc::new(SimulatedExecutor::default()),
//!     Arc::new(InMemoryKnowledgeStore::new()),
//! );
//! let summary = controller.run("Build a REST API").await?;
//! println!("{} scored {:.1}", summary.run_id, summary.quality_score);
//! ```

pub mod capability;
pub mod consensus;
pub mod decomposition;
pub mod delegation;
pub mod execution;
pub mod executor;
pub mod knowledge;
pub mod orchestration;
pub mod quality;
pub mod registry;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use capability::{required_capabilities, CapabilityMatcher, DEFAULT_MATCH_WEIGHT};
pub use consensus::{tally, ConsensusEngine, ConsensusRound, ExecutorVoteSource, FixedVoteSource, HeuristicVoteSource, Tally, VoteSource};
pub use decomposition::{validate_dependencies, Objective, ObjectiveStatus, RuleBasedDecomposer, Task, TaskDecomposer, TaskStatus};
pub use delegation::{Assignment, AssignmentBroker, BidJitter, NoJitter, RandomJitter};
pub use execution::{Concurrency, ExecutionCoordinator, ExecutionPolicy, ExecutionResult, ExecutionStatus};
pub use executor::{SimulatedExecutor, TaskExecutor, TaskOutput};
pub use knowledge::{InMemoryKnowledgeStore, KeySpace, KnowledgeStore};
pub use orchestration::{RunError, RunState, RunSummary, SwarmController, STRUCTURED_PHASES};
pub use quality::{CompletionRatioScorer, QualityGate, QualityReport, QualityScorer};
pub use registry::{Agent, AgentFilter, AgentRegistry, AgentStatus, Archetype, SharedRegistry};
pub use topology::{parse_topology, populate, roster, RoleSlot};
pub use types::{AgentId, CollectiveError, Result, RunId, TaskId};
