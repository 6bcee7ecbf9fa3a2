//! Swarm run orchestration.
//!
//! [`SwarmController`] drives one objective through a run:
//!
//! ```text
//! Initializing -> Decomposing -> (ConsensusOnDecomposition) -> Assigning
//!              -> Executing -> Aggregating -> Completed | Failed
//! ```
//!
//! The generic methodology decomposes the objective once and executes the
//! task graph. The structured methodology walks five fixed phases, each one
//! assigned, executed, and then put to a consensus round. Terminal states
//! are final; a run is never retried as a whole.

use crate::capability::CapabilityMatcher;
use crate::consensus::{ConsensusEngine, ConsensusRound, ExecutorVoteSource, VoteSource};
use crate::decomposition::{
    validate_dependencies, Objective, ObjectiveStatus, RuleBasedDecomposer, Task,
    TaskDecomposer, TaskStatus,
};
use crate::delegation::{Assignment, AssignmentBroker, BidJitter, RandomJitter};
use crate::execution::{ExecutionCoordinator, ExecutionPolicy, ExecutionResult, ExecutionStatus};
use crate::executor::TaskExecutor;
use crate::knowledge::{self, KeySpace, KnowledgeStore};
use crate::quality::{QualityGate, QualityReport};
use crate::registry::{Agent, AgentRegistry, AgentStatus, SharedRegistry};
use crate::topology;
use crate::types::{CollectiveError, Result, RunId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use swarm_hive_config::{FailurePolicy, HiveConfig, Methodology, RejectionPolicy};
use tracing::{debug, info, warn};

/// Phases of the structured methodology, in order.
pub const STRUCTURED_PHASES: [&str; 5] = [
    "specification",
    "pseudocode",
    "architecture",
    "refinement",
    "completion",
];

/// Phase name of the round that gates a generic decomposition.
pub const DECOMPOSITION_PHASE: &str = "task-breakdown";

/// State of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Decomposing,
    ConsensusOnDecomposition,
    Assigning,
    Executing,
    Aggregating,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Initializing => "initializing",
            RunState::Decomposing => "decomposing",
            RunState::ConsensusOnDecomposition => "consensus_on_decomposition",
            RunState::Assigning => "assigning",
            RunState::Executing => "executing",
            RunState::Aggregating => "aggregating",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run that reached aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub objective: String,
    pub quality_score: f64,
    pub passed: bool,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
    pub state: RunState,

    /// Rejected rounds the run proceeded past
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A run aborted before aggregation.
#[derive(Debug, thiserror::Error)]
#[error("Run {run_id} failed during {phase}: {source}")]
pub struct RunError {
    pub run_id: RunId,
    /// State the run was in when it aborted
    pub phase: RunState,
    #[source]
    pub source: CollectiveError,
}

/// Per-run wiring, rebuilt for every call to [`SwarmController::run`].
struct RunContext {
    run_id: RunId,
    objective: Objective,
    keys: KeySpace,
    registry: SharedRegistry,
    engine: ConsensusEngine,
    broker: AssignmentBroker,
    coordinator: ExecutionCoordinator,
    policy: ExecutionPolicy,
    tasks: Vec<Task>,
    warnings: Vec<String>,
}

/// Drives objectives through the run state machine.
pub struct SwarmController {
    config: HiveConfig,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn KnowledgeStore>,
    vote_source: Arc<dyn VoteSource>,
    jitter: Option<Arc<dyn BidJitter>>,
    decomposer: Box<dyn TaskDecomposer>,
    quality: QualityGate,
    execution_timeout: Option<Duration>,
    history: Vec<RunState>,
    registry: Option<SharedRegistry>,
}

impl SwarmController {
    /// Create a controller. Votes default to the executor's judgment and
    /// jitter to a uniform draw below `config.bid_jitter`.
    pub fn new(
        config: HiveConfig,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let vote_source: Arc<dyn VoteSource> = Arc::new(ExecutorVoteSource::new(executor.clone()));
        Self {
            config,
            executor,
            store,
            vote_source,
            jitter: None,
            decomposer: Box::new(RuleBasedDecomposer),
            quality: QualityGate::default(),
            execution_timeout: None,
            history: Vec::new(),
            registry: None,
        }
    }

    pub fn with_vote_source(mut self, vote_source: Arc<dyn VoteSource>) -> Self {
        self.vote_source = vote_source;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn BidJitter>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_decomposer(mut self, decomposer: Box<dyn TaskDecomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_quality_gate(mut self, quality: QualityGate) -> Self {
        self.quality = quality;
        self
    }

    /// Override the execution deadline derived from `timeout_minutes`.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    /// States visited by the most recent run, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Initializing)
    }

    /// Registry of the most recent run.
    pub fn registry(&self) -> Option<&SharedRegistry> {
        self.registry.as_ref()
    }

    /// Run an objective to a terminal state.
    ///
    /// A run that reaches aggregation returns `Ok`, whether or not it
    /// passed the quality threshold; `RunSummary::state` carries the
    /// verdict. Anything that aborts the run earlier is a [`RunError`].
    pub async fn run(&mut self, objective: &str) -> std::result::Result<RunSummary, RunError> {
        let run_id: RunId = format!("run-{}", uuid::Uuid::new_v4());
        self.history.clear();
        self.transition(RunState::Initializing);

        let mut ctx = match self.prepare(&run_id, objective).await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.transition(RunState::Failed);
                warn!("Run {} could not start: {}", run_id, e);
                return Err(RunError {
                    run_id,
                    phase: RunState::Initializing,
                    source: e,
                });
            }
        };
        self.registry = Some(ctx.registry.clone());

        let outcome = match self.config.methodology {
            Methodology::Generic => self.run_generic(&mut ctx).await,
            Methodology::Structured => self.run_structured(&mut ctx).await,
        };

        let results = match outcome {
            Ok(results) => results,
            Err(e) => return Err(self.abort(&mut ctx, e).await),
        };

        self.transition(RunState::Aggregating);
        ctx.objective.status = ObjectiveStatus::Aggregated;
        let report = self.quality.aggregate(&results, self.config.quality_threshold);

        ctx.objective.status = if report.passed {
            ObjectiveStatus::Completed
        } else {
            ObjectiveStatus::Failed
        };
        self.transition(if report.passed {
            RunState::Completed
        } else {
            RunState::Failed
        });

        let summary = self.summarize(&ctx, &report);
        knowledge::record(
            self.store.as_ref(),
            &ctx.keys.run_results(&ctx.run_id),
            json!({
                "summary": summary,
                "report": report,
                "objective": ctx.objective,
                "tasks": ctx.tasks,
                "results": results,
            }),
        )
        .await;

        info!(
            "Run {} finished {}: quality {:.1} ({} completed, {} failed, {} skipped)",
            summary.run_id,
            summary.state,
            summary.quality_score,
            summary.tasks_completed,
            summary.tasks_failed,
            summary.tasks_skipped
        );

        Ok(summary)
    }

    async fn prepare(&self, run_id: &str, objective: &str) -> Result<RunContext> {
        self.config.validate()?;

        let keys = KeySpace::new(self.config.memory_namespace.as_str());
        let mut registry = AgentRegistry::new();
        let agent_ids = topology::populate(&mut registry, self.config.topology, self.config.max_agents);
        let registry = registry.into_shared();

        let matcher = CapabilityMatcher::new(self.config.match_weight);
        let jitter: Arc<dyn BidJitter> = match &self.jitter {
            Some(jitter) => jitter.clone(),
            None => Arc::new(RandomJitter::new(self.config.bid_jitter)),
        };
        let broker = AssignmentBroker::new(matcher, jitter)?.strict(self.config.strict_matching);

        let mut policy = ExecutionPolicy::from_config(&self.config);
        if let Some(timeout) = self.execution_timeout {
            policy = policy.with_timeout(timeout);
        }

        let engine = ConsensusEngine::new(
            self.config.consensus,
            self.vote_source.clone(),
            self.store.clone(),
            keys.clone(),
        )
        .with_matcher(matcher)
        .with_vote_timeout(policy.timeout);

        let coordinator = ExecutionCoordinator::new(
            self.executor.clone(),
            registry.clone(),
            self.store.clone(),
            keys.clone(),
        );

        let objective = Objective::new(objective, self.config.strategy);

        knowledge::record(
            self.store.as_ref(),
            &keys.run_config(run_id),
            json!({
                "run_id": run_id,
                "objective": objective.description,
                "config": self.config,
                "agents": agent_ids,
            }),
        )
        .await;

        info!(
            "Run {} started with {} agents ({} topology, {} consensus)",
            run_id,
            agent_ids.len(),
            self.config.topology,
            self.config.consensus
        );

        Ok(RunContext {
            run_id: run_id.to_string(),
            objective,
            keys,
            registry,
            engine,
            broker,
            coordinator,
            policy,
            tasks: Vec::new(),
            warnings: Vec::new(),
        })
    }

    async fn run_generic(&mut self, ctx: &mut RunContext) -> Result<Vec<ExecutionResult>> {
        self.transition(RunState::Decomposing);
        let mut tasks = self
            .decomposer
            .decompose(&ctx.objective.description, ctx.objective.strategy);
        validate_dependencies(&tasks)?;
        ctx.objective.status = ObjectiveStatus::Decomposed;
        info!("Decomposed objective into {} tasks", tasks.len());

        if self.config.consensus_on_decomposition {
            self.transition(RunState::ConsensusOnDecomposition);
            let context = json!({
                "objective": ctx.objective.description,
                "tasks": tasks
                    .iter()
                    .map(|t| json!({"id": t.id, "type": t.task_type, "depends_on": t.depends_on}))
                    .collect::<Vec<_>>(),
            });
            self.consensus(ctx, DECOMPOSITION_PHASE, context).await?;
        }

        self.transition(RunState::Assigning);
        let candidates = candidates(&ctx.registry).await;
        let assignments = self.assign(ctx, &mut tasks, &candidates)?;
        ctx.objective.status = ObjectiveStatus::Assigned;

        self.transition(RunState::Executing);
        ctx.objective.status = ObjectiveStatus::Executing;
        let results = ctx
            .coordinator
            .execute(&tasks, &assignments, &ctx.policy)
            .await;

        apply_results(&mut tasks, &results);
        ctx.tasks = tasks;
        Ok(results)
    }

    async fn run_structured(&mut self, ctx: &mut RunContext) -> Result<Vec<ExecutionResult>> {
        self.transition(RunState::Decomposing);
        let phases: Vec<Task> = STRUCTURED_PHASES
            .iter()
            .enumerate()
            .map(|(i, phase)| {
                Task::new(
                    format!("phase-{}-{}", i + 1, phase),
                    *phase,
                    format!("{} phase for: {}", phase, ctx.objective.description),
                )
            })
            .collect();
        ctx.objective.status = ObjectiveStatus::Decomposed;

        let fail_fast = self.config.on_failure == FailurePolicy::FailFast;
        let mut results = Vec::with_capacity(phases.len());
        let mut halted = false;

        for mut task in phases {
            let phase = task.task_type.clone();

            if halted {
                task.status = TaskStatus::Skipped;
                results.push(ExecutionResult::skipped(
                    &task.id,
                    None,
                    "halted after an earlier failure",
                ));
                ctx.tasks.push(task);
                continue;
            }

            self.transition(RunState::Assigning);
            let candidates = candidates(&ctx.registry).await;
            let assignments = self.assign(ctx, std::slice::from_mut(&mut task), &candidates)?;

            self.transition(RunState::Executing);
            ctx.objective.status = ObjectiveStatus::Executing;
            let phase_results = ctx
                .coordinator
                .execute(std::slice::from_ref(&task), &assignments, &ctx.policy)
                .await;
            apply_results(std::slice::from_mut(&mut task), &phase_results);

            let completed = phase_results.iter().all(ExecutionResult::is_completed);
            let context = json!({
                "phase": phase,
                "task_id": task.id,
                "results": phase_results,
            });
            results.extend(phase_results);
            ctx.tasks.push(task);

            if !completed {
                warn!("Phase {} did not complete", phase);
                if fail_fast {
                    halted = true;
                    continue;
                }
            }

            self.consensus(ctx, &phase, context).await?;
        }

        Ok(results)
    }

    /// Hold a gating round. A rejection fails the run unless the rejection
    /// policy says to carry on.
    async fn consensus(
        &self,
        ctx: &mut RunContext,
        phase: &str,
        context: serde_json::Value,
    ) -> Result<ConsensusRound> {
        let agents = {
            let mut registry = ctx.registry.write().await;
            for id in registry.ids() {
                registry.set_status(&id, AgentStatus::Voting)?;
            }
            registry.list_agents(None)
        };

        let round = ctx.engine.conduct_round(phase, context, &agents).await;

        {
            let mut registry = ctx.registry.write().await;
            for (agent_id, vote) in &round.votes {
                if !registry.record_vote(agent_id, &round.id, *vote)? {
                    debug!("{} already voted in round {}", agent_id, round.id);
                }
            }
            for id in registry.ids() {
                registry.set_status(&id, AgentStatus::Idle)?;
            }
        }

        if !round.approved {
            match self.config.rejection_policy {
                RejectionPolicy::Halt => round.ensure_approved()?,
                RejectionPolicy::ProceedWithWarning => {
                    let message = format!(
                        "consensus on {} rejected with ratio {:.2}",
                        phase, round.consensus_ratio
                    );
                    warn!("Run {}: {}, proceeding", ctx.run_id, message);
                    ctx.warnings.push(message);
                }
            }
        }

        Ok(round)
    }

    /// Assign each task to its best candidate. Under the continue policy a
    /// task nobody can take is left unassigned and later skipped.
    fn assign(
        &self,
        ctx: &RunContext,
        tasks: &mut [Task],
        candidates: &[Agent],
    ) -> Result<Vec<Assignment>> {
        let mut assignments = Vec::with_capacity(tasks.len());
        for task in tasks.iter_mut() {
            match ctx.broker.assign_one(task, candidates) {
                Ok(assignment) => {
                    task.assigned_agent = Some(assignment.agent_id.clone());
                    task.status = TaskStatus::Assigned;
                    assignments.push(assignment);
                }
                Err(e @ CollectiveError::NoEligibleAgent { .. })
                    if self.config.on_failure == FailurePolicy::Continue =>
                {
                    warn!("{}, task will be skipped", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(assignments)
    }

    async fn abort(&mut self, ctx: &mut RunContext, source: CollectiveError) -> RunError {
        let phase = self.state();
        self.transition(RunState::Failed);
        ctx.objective.status = ObjectiveStatus::Failed;

        warn!("Run {} failed during {}: {}", ctx.run_id, phase, source);
        knowledge::record(
            self.store.as_ref(),
            &ctx.keys.run_results(&ctx.run_id),
            json!({
                "run_id": ctx.run_id,
                "state": RunState::Failed,
                "phase": phase,
                "error": source.to_string(),
                "tasks": ctx.tasks,
            }),
        )
        .await;

        RunError {
            run_id: ctx.run_id.clone(),
            phase,
            source,
        }
    }

    fn summarize(&self, ctx: &RunContext, report: &QualityReport) -> RunSummary {
        RunSummary {
            run_id: ctx.run_id.clone(),
            objective: ctx.objective.description.clone(),
            quality_score: report.quality_score,
            passed: report.passed,
            tasks_completed: report.tasks_completed,
            tasks_failed: report.tasks_failed,
            tasks_skipped: report.tasks_skipped,
            state: self.state(),
            warnings: ctx.warnings.clone(),
        }
    }

    fn transition(&mut self, state: RunState) {
        if let Some(current) = self.history.last() {
            debug!("Run state {} -> {}", current, state);
        }
        self.history.push(state);
    }
}

/// Agents eligible for work: everyone but the queen, unless the queen is
/// all there is.
async fn candidates(registry: &SharedRegistry) -> Vec<Agent> {
    let all = registry.read().await.list_agents(None);
    let workers: Vec<Agent> = all.iter().filter(|a| !a.is_queen()).cloned().collect();
    if workers.is_empty() {
        all
    } else {
        workers
    }
}

fn apply_results(tasks: &mut [Task], results: &[ExecutionResult]) {
    for result in results {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == result.task_id) {
            task.status = match result.status {
                ExecutionStatus::Completed => TaskStatus::Completed,
                ExecutionStatus::Failed => TaskStatus::Failed,
                ExecutionStatus::Skipped => TaskStatus::Skipped,
            };
        }
    }
}
