//! Common types used across the coordination engine.

use swarm_hive_config::ConfigError;

/// Unique identifier for an agent within a run.
pub type AgentId = String;

/// Unique identifier for a task.
pub type TaskId = String;

/// Unique identifier for a consensus round.
pub type RoundId = String;

/// Unique identifier for a swarm run.
pub type RunId = String;

/// Capability tag (e.g., "coding", "analysis").
pub type Capability = String;

/// Error types for coordination operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("No eligible agent for task {task_id} ({task_type})")]
    NoEligibleAgent { task_id: TaskId, task_type: String },

    #[error("Consensus rejected in phase {phase}: ratio {ratio:.2}")]
    ConsensusRejected { phase: String, ratio: f64 },

    #[error("Task {task_id} failed: {message}")]
    TaskExecutionError { task_id: TaskId, message: String },

    #[error("Timeout")]
    Timeout,

    #[error("Cyclic dependency among tasks: {}", .0.join(", "))]
    CyclicDependency(Vec<TaskId>),

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: TaskId, dependency: TaskId },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CollectiveError>;
