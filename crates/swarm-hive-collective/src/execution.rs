//! Execution of assigned tasks.
//!
//! The coordinator schedules tasks whose dependencies have completed, hands
//! them to the [`TaskExecutor`] and waits on completions or the phase
//! deadline, whichever comes first. Tasks on the same agent queue behind a
//! per-agent lane so an agent never runs two tasks at once.

use crate::delegation::Assignment;
use crate::decomposition::Task;
use crate::executor::TaskExecutor;
use crate::knowledge::{self, KeySpace, KnowledgeStore};
use crate::registry::{AgentStatus, SharedRegistry};
use crate::types::{AgentId, CollectiveError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm_hive_config::{FailurePolicy, HiveConfig};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Error text recorded for tasks cut off by the deadline.
pub const TIMEOUT_ERROR: &str = "Timeout";

const HALTED_REASON: &str = "halted after an earlier failure";

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `timeout` from now, saturating at a far-future instant instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// How tasks are started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// Every ready task starts at once
    #[default]
    Parallel,
    /// One task at a time, in assignment order
    Sequential,
}

/// Scheduling policy for one execution phase.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPolicy {
    pub concurrency: Concurrency,
    pub on_failure: FailurePolicy,
    /// Single deadline for the whole phase
    pub timeout: Duration,
}

impl ExecutionPolicy {
    pub fn from_config(config: &HiveConfig) -> Self {
        Self {
            concurrency: if config.sequential {
                Concurrency::Sequential
            } else {
                Concurrency::Parallel
            },
            on_failure: config.on_failure,
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Parallel,
            on_failure: FailurePolicy::Continue,
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Terminal status of a task within a phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    /// Never ran
    Skipped,
}

/// Outcome of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `None` when the task never had an agent
    pub agent_id: Option<AgentId>,
    pub task_id: TaskId,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub output: Option<Value>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub(crate) fn skipped(task_id: &str, agent_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.map(String::from),
            task_id: task_id.to_string(),
            status: ExecutionStatus::Skipped,
            timestamp: Utc::now(),
            error: Some(reason.into()),
            output: None,
            duration_ms: 0,
        }
    }

    pub(crate) fn failed(task_id: &str, agent_id: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            ..Self::skipped(task_id, agent_id, error)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn is_timeout(&self) -> bool {
        self.status == ExecutionStatus::Failed && self.error.as_deref() == Some(TIMEOUT_ERROR)
    }

    /// The failure as an engine error, if the task failed.
    pub fn to_error(&self) -> Option<CollectiveError> {
        match self.status {
            ExecutionStatus::Failed if self.is_timeout() => Some(CollectiveError::Timeout),
            ExecutionStatus::Failed => Some(CollectiveError::TaskExecutionError {
                task_id: self.task_id.clone(),
                message: self.error.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(TaskId),
}

fn readiness(task: &Task, outcomes: &HashMap<TaskId, ExecutionStatus>) -> Readiness {
    for dep in &task.depends_on {
        match outcomes.get(dep) {
            Some(ExecutionStatus::Completed) => {}
            Some(_) => return Readiness::Blocked(dep.clone()),
            None => return Readiness::Waiting,
        }
    }
    Readiness::Ready
}

/// Everything a spawned task needs, owned.
struct Job {
    executor: Arc<dyn TaskExecutor>,
    registry: SharedRegistry,
    store: Arc<dyn KnowledgeStore>,
    keys: KeySpace,
    lane: Arc<Mutex<()>>,
    /// Set once a failure halts scheduling under fail-fast
    halt: Option<Arc<AtomicBool>>,
    task_id: TaskId,
    agent_id: AgentId,
    description: String,
    context: Value,
}

impl Job {
    async fn run(self) -> ExecutionResult {
        let _lane = self.lane.lock().await;

        // Queued behind the lane when the halt came in, so it never started
        if self.halted() {
            debug!("Skipping {}: {}", self.task_id, HALTED_REASON);
            return ExecutionResult::skipped(&self.task_id, Some(&self.agent_id), HALTED_REASON);
        }

        self.set_status(AgentStatus::Executing).await;
        let started = std::time::Instant::now();

        let outcome = self
            .executor
            .run_task(&self.agent_id, &self.description, &self.context)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.set_status(AgentStatus::Idle).await;

        let (status, output, error) = match outcome {
            Ok(out) if out.success => (ExecutionStatus::Completed, Some(out.output), None),
            Ok(out) => (
                ExecutionStatus::Failed,
                Some(out.output).filter(|v| !v.is_null()),
                Some(out.error.unwrap_or_else(|| "task reported failure".to_string())),
            ),
            Err(e) => (ExecutionStatus::Failed, None, Some(e.to_string())),
        };

        let result = ExecutionResult {
            agent_id: Some(self.agent_id.clone()),
            task_id: self.task_id.clone(),
            status,
            timestamp: Utc::now(),
            error,
            output,
            duration_ms,
        };

        if result.status == ExecutionStatus::Failed {
            if let Some(halt) = &self.halt {
                halt.store(true, Ordering::SeqCst);
            }
        }

        persist(self.store.as_ref(), &self.keys, &result).await;

        match result.status {
            ExecutionStatus::Completed => {
                debug!("Task {} completed by {} in {}ms", result.task_id, self.agent_id, duration_ms)
            }
            _ => warn!(
                "Task {} failed on {}: {}",
                result.task_id,
                self.agent_id,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }

        result
    }

    fn halted(&self) -> bool {
        self.halt.as_ref().is_some_and(|h| h.load(Ordering::SeqCst))
    }

    async fn set_status(&self, status: AgentStatus) {
        if let Err(e) = self.registry.write().await.set_status(&self.agent_id, status) {
            warn!("Could not update status of {}: {}", self.agent_id, e);
        }
    }
}

async fn persist(store: &dyn KnowledgeStore, keys: &KeySpace, result: &ExecutionResult) {
    let Some(agent_id) = result.agent_id.as_deref() else {
        return;
    };
    let key = keys.execution(agent_id, result.timestamp.timestamp_nanos_opt().unwrap_or_default());
    match serde_json::to_value(result) {
        Ok(value) => knowledge::record(store, &key, value).await,
        Err(e) => warn!("Failed to serialize result for {}: {}", result.task_id, e),
    }
}

/// Runs assigned tasks under an [`ExecutionPolicy`].
pub struct ExecutionCoordinator {
    executor: Arc<dyn TaskExecutor>,
    registry: SharedRegistry,
    store: Arc<dyn KnowledgeStore>,
    keys: KeySpace,
}

impl ExecutionCoordinator {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        registry: SharedRegistry,
        store: Arc<dyn KnowledgeStore>,
        keys: KeySpace,
    ) -> Self {
        Self {
            executor,
            registry,
            store,
            keys,
        }
    }

    /// Execute `tasks` and return one result per task.
    ///
    /// Tasks are started in assignment order; tasks with no assignment are
    /// skipped. Results are appended in the order tasks reach a terminal
    /// status.
    pub async fn execute(
        &self,
        tasks: &[Task],
        assignments: &[Assignment],
        policy: &ExecutionPolicy,
    ) -> Vec<ExecutionResult> {
        let deadline = deadline_after(policy.timeout);
        let fail_fast = policy.on_failure == FailurePolicy::FailFast;
        let halt = Arc::new(AtomicBool::new(false));

        let by_task: HashMap<&str, &Assignment> = assignments
            .iter()
            .map(|a| (a.task_id.as_str(), a))
            .collect();
        let task_index: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut pending: Vec<&Task> = Vec::with_capacity(tasks.len());
        for assignment in assignments {
            if let Some(task) = task_index.get(assignment.task_id.as_str()) {
                if !pending.iter().any(|t| t.id == task.id) {
                    pending.push(task);
                }
            }
        }
        pending.extend(tasks.iter().filter(|t| !by_task.contains_key(t.id.as_str())));

        let mut outcomes: HashMap<TaskId, ExecutionStatus> = HashMap::new();
        let mut results: Vec<ExecutionResult> = Vec::with_capacity(tasks.len());
        let mut running: HashMap<tokio::task::Id, (TaskId, AgentId)> = HashMap::new();
        let mut in_flight: JoinSet<ExecutionResult> = JoinSet::new();
        let mut lanes: HashMap<AgentId, Arc<Mutex<()>>> = HashMap::new();
        let mut timed_out = false;

        loop {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let halted = halt.load(Ordering::SeqCst);
            if !halted {
                let mut i = 0;
                while i < pending.len() {
                    if policy.concurrency == Concurrency::Sequential && !in_flight.is_empty() {
                        break;
                    }

                    let task = pending[i];
                    match readiness(task, &outcomes) {
                        Readiness::Waiting => {
                            i += 1;
                        }
                        Readiness::Blocked(dep) => {
                            pending.remove(i);
                            let agent = by_task.get(task.id.as_str()).map(|a| a.agent_id.as_str());
                            debug!("Skipping {}: dependency {} did not complete", task.id, dep);
                            outcomes.insert(task.id.clone(), ExecutionStatus::Skipped);
                            results.push(ExecutionResult::skipped(
                                &task.id,
                                agent,
                                format!("dependency {} did not complete", dep),
                            ));
                        }
                        Readiness::Ready => {
                            pending.remove(i);
                            let Some(assignment) = by_task.get(task.id.as_str()) else {
                                outcomes.insert(task.id.clone(), ExecutionStatus::Skipped);
                                results.push(ExecutionResult::skipped(
                                    &task.id,
                                    None,
                                    "no agent assigned",
                                ));
                                continue;
                            };

                            let lane = lanes
                                .entry(assignment.agent_id.clone())
                                .or_default()
                                .clone();
                            let job = Job {
                                executor: self.executor.clone(),
                                registry: self.registry.clone(),
                                store: self.store.clone(),
                                keys: self.keys.clone(),
                                lane,
                                halt: fail_fast.then(|| halt.clone()),
                                task_id: task.id.clone(),
                                agent_id: assignment.agent_id.clone(),
                                description: task.description.clone(),
                                context: json!({
                                    "task_id": task.id,
                                    "task_type": task.task_type,
                                    "depends_on": task.depends_on,
                                }),
                            };

                            debug!("Starting {} on {}", task.id, assignment.agent_id);
                            let handle = in_flight.spawn(job.run());
                            running.insert(
                                handle.id(),
                                (task.id.clone(), assignment.agent_id.clone()),
                            );
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                let reason = if halt.load(Ordering::SeqCst) {
                    HALTED_REASON
                } else {
                    "dependencies never completed"
                };
                for task in pending.drain(..) {
                    let agent = by_task.get(task.id.as_str()).map(|a| a.agent_id.as_str());
                    outcomes.insert(task.id.clone(), ExecutionStatus::Skipped);
                    results.push(ExecutionResult::skipped(&task.id, agent, reason));
                }
                break;
            }

            match tokio::time::timeout_at(deadline, in_flight.join_next_with_id()).await {
                Err(_) => {
                    timed_out = true;
                    break;
                }
                Ok(None) => {}
                Ok(Some(Ok((id, result)))) => {
                    running.remove(&id);
                    if result.status == ExecutionStatus::Failed && fail_fast && !halted {
                        info!("Task {} failed, halting further scheduling", result.task_id);
                        halt.store(true, Ordering::SeqCst);
                    }
                    outcomes.insert(result.task_id.clone(), result.status);
                    results.push(result);
                }
                Ok(Some(Err(e))) => {
                    let Some((task_id, agent_id)) = running.remove(&e.id()) else {
                        warn!("Execution task aborted: {}", e);
                        continue;
                    };
                    warn!("Task {} aborted on {}: {}", task_id, agent_id, e);
                    self.release(&agent_id).await;
                    let result = ExecutionResult::failed(
                        &task_id,
                        Some(&agent_id),
                        format!("execution aborted: {}", e),
                    );
                    persist(self.store.as_ref(), &self.keys, &result).await;
                    if fail_fast {
                        halt.store(true, Ordering::SeqCst);
                    }
                    outcomes.insert(task_id, ExecutionStatus::Failed);
                    results.push(result);
                }
            }
        }

        if timed_out {
            warn!(
                "Execution deadline of {:?} reached with {} running and {} unscheduled tasks",
                policy.timeout,
                running.len(),
                pending.len()
            );
            in_flight.shutdown().await;

            for (_, (task_id, agent_id)) in running.drain() {
                self.release(&agent_id).await;
                let result = ExecutionResult::failed(&task_id, Some(&agent_id), TIMEOUT_ERROR);
                persist(self.store.as_ref(), &self.keys, &result).await;
                results.push(result);
            }
            for task in pending.drain(..) {
                let agent = by_task.get(task.id.as_str()).map(|a| a.agent_id.as_str());
                results.push(ExecutionResult::failed(&task.id, agent, TIMEOUT_ERROR));
            }
        }

        results
    }

    async fn release(&self, agent_id: &str) {
        if let Err(e) = self
            .registry
            .write()
            .await
            .set_status(agent_id, AgentStatus::Idle)
        {
            warn!("Could not release {}: {}", agent_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskOutput;
    use crate::knowledge::InMemoryKnowledgeStore;
    use crate::registry::{AgentRegistry, Archetype};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails descriptions containing "fail", never returns on "hang",
    /// panics on "panic" and takes an extra 100ms on "slow".
    struct ScriptedExecutor {
        latency: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn run_task(
            &self,
            agent_id: &str,
            task_description: &str,
            _context: &Value,
        ) -> anyhow::Result<TaskOutput> {
            if task_description.contains("hang") {
                std::future::pending::<()>().await;
            }
            if task_description.contains("panic") {
                panic!("executor blew up on {}", agent_id);
            }
            if task_description.contains("slow") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if task_description.contains("error") {
                anyhow::bail!("executor crashed");
            }
            if task_description.contains("fail") {
                return Ok(TaskOutput::failure("scripted failure"));
            }
            Ok(TaskOutput::success(json!({ "agent": agent_id })))
        }
    }

    struct Fixture {
        coordinator: ExecutionCoordinator,
        registry: SharedRegistry,
        store: Arc<InMemoryKnowledgeStore>,
        agents: Vec<AgentId>,
    }

    fn fixture(executor: Arc<dyn TaskExecutor>, agent_count: usize) -> Fixture {
        let mut registry = AgentRegistry::new();
        let agents = (0..agent_count)
            .map(|i| registry.register_agent(format!("worker {}", i), Archetype::Worker, Vec::<String>::new()))
            .collect();
        let registry = registry.into_shared();
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let coordinator = ExecutionCoordinator::new(
            executor,
            registry.clone(),
            store.clone(),
            KeySpace::new("hive"),
        );
        Fixture {
            coordinator,
            registry,
            store,
            agents,
        }
    }

    fn assign(tasks: &[Task], agents: &[AgentId]) -> Vec<Assignment> {
        tasks
            .iter()
            .enumerate()
            .map(|(i, t)| Assignment {
                task_id: t.id.clone(),
                agent_id: agents[i % agents.len()].clone(),
                score: 3.0,
                reasoning: String::new(),
            })
            .collect()
    }

    fn policy(concurrency: Concurrency, on_failure: FailurePolicy) -> ExecutionPolicy {
        ExecutionPolicy {
            concurrency,
            on_failure,
            timeout: Duration::from_secs(5),
        }
    }

    fn status_of(results: &[ExecutionResult], task_id: &str) -> ExecutionStatus {
        results
            .iter()
            .find(|r| r.task_id == task_id)
            .map(|r| r.status)
            .unwrap()
    }

    fn three_tasks() -> Vec<Task> {
        vec![
            Task::new("t1", "implementation", "step one"),
            Task::new("t2", "implementation", "step two will fail"),
            Task::new("t3", "implementation", "step three"),
        ]
    }

    #[tokio::test]
    async fn test_sequential_fail_fast_skips_remaining() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 3);
        let tasks = three_tasks();

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Sequential, FailurePolicy::FailFast))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(status_of(&results, "t1"), ExecutionStatus::Completed);
        assert_eq!(status_of(&results, "t2"), ExecutionStatus::Failed);
        assert_eq!(status_of(&results, "t3"), ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_sequential_continue_runs_independent_tasks() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 3);
        let tasks = three_tasks();

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Sequential, FailurePolicy::Continue))
            .await;

        assert_eq!(status_of(&results, "t1"), ExecutionStatus::Completed);
        assert_eq!(status_of(&results, "t2"), ExecutionStatus::Failed);
        assert_eq!(status_of(&results, "t3"), ExecutionStatus::Completed);
        assert_eq!(
            results.iter().map(|r| r.task_id.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2", "t3"]
        );
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 3);
        let tasks = vec![
            Task::new("a", "research", "gather, error out"),
            Task::new("b", "analysis", "independent"),
            Task::new("c", "synthesis", "needs a").with_dependency("a"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::Continue))
            .await;

        assert_eq!(status_of(&results, "a"), ExecutionStatus::Failed);
        assert_eq!(status_of(&results, "b"), ExecutionStatus::Completed);
        assert_eq!(status_of(&results, "c"), ExecutionStatus::Skipped);

        let a = results.iter().find(|r| r.task_id == "a").unwrap();
        assert!(matches!(a.to_error(), Some(CollectiveError::TaskExecutionError { .. })));
    }

    #[tokio::test]
    async fn test_dependencies_gate_parallel_start() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::from_millis(10))), 3);
        let tasks = vec![
            Task::new("a", "design", "first"),
            Task::new("b", "implementation", "second").with_dependency("a"),
            Task::new("c", "testing", "third").with_dependency("b"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::Continue))
            .await;

        assert!(results.iter().all(|r| r.is_completed()));
        assert_eq!(
            results.iter().map(|r| r.task_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_timeout_fails_hung_tasks() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 2);
        let tasks = vec![
            Task::new("quick", "implementation", "finishes"),
            Task::new("stuck", "implementation", "will hang"),
            Task::new("after", "testing", "never starts").with_dependency("stuck"),
        ];
        let policy = policy(Concurrency::Parallel, FailurePolicy::Continue)
            .with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy)
            .await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(status_of(&results, "quick"), ExecutionStatus::Completed);
        for id in ["stuck", "after"] {
            let result = results.iter().find(|r| r.task_id == id).unwrap();
            assert!(result.is_timeout(), "{} should time out", id);
            assert!(matches!(result.to_error(), Some(CollectiveError::Timeout)));
        }

        let registry = f.registry.read().await;
        for id in &f.agents {
            assert_eq!(registry.get_agent(id).unwrap().status, AgentStatus::Idle);
        }
    }

    #[tokio::test]
    async fn test_same_agent_tasks_never_overlap() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::from_millis(20)));
        let f = fixture(executor.clone(), 1);
        let tasks = vec![
            Task::new("a", "implementation", "one"),
            Task::new("b", "implementation", "two"),
            Task::new("c", "implementation", "three"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::Continue))
            .await;

        assert!(results.iter().all(|r| r.is_completed()));
        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_results_written_to_store() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 3);
        let tasks = three_tasks();

        f.coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Sequential, FailurePolicy::FailFast))
            .await;

        // t3 was skipped and never ran, so only two records
        let keys = f.store.keys("hive/execution/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|k| k.starts_with(&format!("hive/execution/{}/", f.agents[1]))));
    }

    #[tokio::test]
    async fn test_unassigned_task_is_skipped() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 1);
        let tasks = vec![Task::new("a", "implementation", "one"), Task::new("b", "testing", "two")];
        let assignments = assign(&tasks[..1], &f.agents);

        let results = f
            .coordinator
            .execute(&tasks, &assignments, &ExecutionPolicy::default())
            .await;

        assert_eq!(status_of(&results, "a"), ExecutionStatus::Completed);
        let b = results.iter().find(|r| r.task_id == "b").unwrap();
        assert_eq!(b.status, ExecutionStatus::Skipped);
        assert!(b.agent_id.is_none());
    }

    #[tokio::test]
    async fn test_parallel_fail_fast_lets_in_flight_finish() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 3);
        let tasks = vec![
            Task::new("a", "implementation", "fail quickly"),
            Task::new("b", "implementation", "slow sibling"),
            Task::new("c", "testing", "after b").with_dependency("b"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::FailFast))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(status_of(&results, "a"), ExecutionStatus::Failed);
        assert_eq!(status_of(&results, "b"), ExecutionStatus::Completed);
        let c = results.iter().find(|r| r.task_id == "c").unwrap();
        assert_eq!(c.status, ExecutionStatus::Skipped);
        assert_eq!(c.error.as_deref(), Some(HALTED_REASON));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_tasks_queued_on_a_lane() {
        let executor = Arc::new(ScriptedExecutor::new(Duration::ZERO));
        let f = fixture(executor, 1);
        let tasks = vec![
            Task::new("a", "implementation", "fail first"),
            Task::new("b", "implementation", "queued"),
            Task::new("c", "implementation", "queued too"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::FailFast))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(status_of(&results, "a"), ExecutionStatus::Failed);
        assert_eq!(status_of(&results, "b"), ExecutionStatus::Skipped);
        assert_eq!(status_of(&results, "c"), ExecutionStatus::Skipped);

        // Only the failure reached the executor and the store
        let keys = f.store.keys("hive/execution/").await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_is_recorded_while_others_run() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 2);
        let tasks = vec![
            Task::new("p", "implementation", "panic now"),
            Task::new("s", "implementation", "slow but fine"),
        ];

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy(Concurrency::Parallel, FailurePolicy::Continue))
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(status_of(&results, "s"), ExecutionStatus::Completed);
        let p = results.iter().find(|r| r.task_id == "p").unwrap();
        assert_eq!(p.status, ExecutionStatus::Failed);
        assert_eq!(p.agent_id.as_deref(), Some(f.agents[0].as_str()));
        assert!(p.error.as_deref().unwrap().starts_with("execution aborted"));

        let registry = f.registry.read().await;
        assert_eq!(registry.get_agent(&f.agents[0]).unwrap().status, AgentStatus::Idle);
        drop(registry);

        let keys = f.store.keys(&format!("hive/execution/{}/", f.agents[0])).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let f = fixture(Arc::new(ScriptedExecutor::new(Duration::ZERO)), 1);
        let tasks = vec![Task::new("a", "implementation", "one")];
        let policy = policy(Concurrency::Parallel, FailurePolicy::Continue).with_timeout(Duration::MAX);

        let results = f
            .coordinator
            .execute(&tasks, &assign(&tasks, &f.agents), &policy)
            .await;

        assert!(results[0].is_completed());
        assert!(deadline_after(Duration::MAX) > Instant::now());
    }
}
