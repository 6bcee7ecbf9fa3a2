//! Objective decomposition into dependent tasks.

use crate::types::{AgentId, CollectiveError, Result, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use swarm_hive_config::Strategy;

/// Lifecycle of an objective within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    #[default]
    Created,
    Decomposed,
    Assigned,
    Executing,
    Aggregated,
    Completed,
    Failed,
}

/// The top-level goal of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub description: String,
    pub strategy: Strategy,
    pub status: ObjectiveStatus,
    pub created_at: DateTime<Utc>,
}

impl Objective {
    pub fn new(description: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            id: format!("objective-{}", uuid::Uuid::new_v4()),
            description: description.into(),
            strategy,
            status: ObjectiveStatus::Created,
            created_at: Utc::now(),
        }
    }
}

/// State of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// A unit of work derived from an objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Work category, used for capability matching (e.g. "implementation")
    pub task_type: String,

    pub description: String,

    /// Tasks that must complete before this one may run
    pub depends_on: Vec<TaskId>,

    pub assigned_agent: Option<AgentId>,

    pub status: TaskStatus,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        task_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            description: description.into(),
            depends_on: Vec::new(),
            assigned_agent: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_dependency(mut self, task_id: impl Into<TaskId>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }
}

/// Turns an objective description into a task list.
pub trait TaskDecomposer: Send + Sync {
    fn decompose(&self, description: &str, strategy: Strategy) -> Vec<Task>;
}

/// Fixed keyword and strategy rules. Same input, same tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedDecomposer;

const BUILD_CUES: &[&str] = &["build", "create", "implement", "develop"];
const RESEARCH_CUES: &[&str] = &["research", "analyze", "investigate"];

impl RuleBasedDecomposer {
    fn plan(description: &str, strategy: Strategy) -> &'static [&'static str] {
        match strategy {
            Strategy::Research => &["research", "analysis", "synthesis"],
            Strategy::Development => &["planning", "implementation", "testing", "documentation"],
            Strategy::Analysis => &["data-gathering", "analysis", "visualization"],
            Strategy::Auto => {
                let lower = description.to_lowercase();
                if BUILD_CUES.iter().any(|cue| lower.contains(cue)) {
                    &["design", "implementation", "testing"]
                } else if RESEARCH_CUES.iter().any(|cue| lower.contains(cue)) {
                    &["research", "analysis", "synthesis"]
                } else {
                    &["exploration", "execution", "validation"]
                }
            }
        }
    }
}

impl TaskDecomposer for RuleBasedDecomposer {
    fn decompose(&self, description: &str, strategy: Strategy) -> Vec<Task> {
        let plan = Self::plan(description, strategy);
        let mut tasks: Vec<Task> = Vec::with_capacity(plan.len());

        for (i, task_type) in plan.iter().enumerate() {
            let mut task = Task::new(
                format!("task-{}-{}", i + 1, task_type),
                *task_type,
                format!("{} for: {}", task_type, description),
            );

            // Documentation hangs off implementation, alongside testing
            let parent = if *task_type == "documentation" {
                tasks.iter().find(|t| t.task_type == "implementation")
            } else {
                tasks.last()
            };
            if let Some(parent) = parent {
                task.depends_on.push(parent.id.clone());
            }

            tasks.push(task);
        }

        tasks
    }
}

/// Check that every dependency exists and the graph is acyclic.
///
/// Returns the task ids in a valid execution order. Among tasks that become
/// ready together, input order is preserved.
pub fn validate_dependencies(tasks: &[Task]) -> Result<Vec<TaskId>> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for task in tasks {
        indegree.entry(task.id.as_str()).or_insert(0);
        for dep in &task.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(CollectiveError::UnknownDependency {
                    task_id: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
            *indegree.entry(task.id.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(task.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = tasks
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| indegree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for next in dependents.get(id).into_iter().flatten() {
            if let Some(deg) = indegree.get_mut(next) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if order.len() < indegree.len() {
        let cycle = tasks
            .iter()
            .filter(|t| indegree.get(t.id.as_str()).is_some_and(|d| *d > 0))
            .map(|t| t.id.clone())
            .collect();
        return Err(CollectiveError::CyclicDependency(cycle));
    }

    Ok(order)
}
