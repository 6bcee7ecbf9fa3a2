use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use swarm_hive_collective::{
    CollectiveError, FixedVoteSource, InMemoryKnowledgeStore, KnowledgeStore, NoJitter, RunState,
    SimulatedExecutor, SwarmController, TaskExecutor, TaskOutput,
};
use swarm_hive_config::{ConsensusMechanism, FailurePolicy, HiveConfig, Strategy, Topology};

/// Fails every task whose description starts with one of the listed task types.
struct FailingTypes(&'static [&'static str]);

#[async_trait]
impl TaskExecutor for FailingTypes {
    async fn run_task(
        &self,
        agent_id: &str,
        task_description: &str,
        _context: &Value,
    ) -> anyhow::Result<TaskOutput> {
        if self.0.iter().any(|t| task_description.starts_with(t)) {
            Ok(TaskOutput::failure(format!("{} gave up", agent_id)))
        } else {
            Ok(TaskOutput::success(json!({ "done": task_description })))
        }
    }
}

fn swarm(config: HiveConfig, executor: Arc<dyn TaskExecutor>) -> (SwarmController, Arc<InMemoryKnowledgeStore>) {
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let controller = SwarmController::new(config, executor, store.clone())
        .with_vote_source(Arc::new(FixedVoteSource::all(true)))
        .with_jitter(Arc::new(NoJitter));
    (controller, store)
}

fn reliable() -> Arc<dyn TaskExecutor> {
    Arc::new(SimulatedExecutor::new(1.0, Duration::ZERO))
}

#[tokio::test]
async fn every_topology_completes_a_run() {
    for (topology, expected_agents) in [
        (Topology::Hierarchical, 6),
        (Topology::Mesh, 5),
        (Topology::Ring, 5),
        (Topology::Star, 5),
    ] {
        let config = HiveConfig {
            topology,
            ..HiveConfig::default()
        };
        let (mut controller, store) = swarm(config, reliable());

        let summary = controller.run("Build a CLI").await.unwrap();
        assert_eq!(summary.state, RunState::Completed, "{}", topology);

        let record = store
            .get(&format!("hive/hive/{}/config", summary.run_id))
            .await
            .unwrap();
        assert_eq!(
            record["agents"].as_array().unwrap().len(),
            expected_agents,
            "{}",
            topology
        );
    }
}

#[tokio::test]
async fn max_agents_caps_the_roster() {
    let config = HiveConfig {
        max_agents: 3,
        ..HiveConfig::default()
    };
    let (mut controller, _store) = swarm(config, reliable());
    controller.run("Build a CLI").await.unwrap();

    let registry = controller.registry().unwrap().read().await;
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn every_mechanism_approves_unanimous_support() {
    for mechanism in [
        ConsensusMechanism::Quorum,
        ConsensusMechanism::Unanimous,
        ConsensusMechanism::Weighted,
        ConsensusMechanism::Leader,
    ] {
        let config = HiveConfig {
            consensus: mechanism,
            ..HiveConfig::default()
        };
        let (mut controller, _store) = swarm(config, reliable());
        let summary = controller.run("Investigate a regression").await.unwrap();
        assert!(summary.passed, "{}", mechanism);
    }
}

#[tokio::test]
async fn failed_implementation_skips_its_dependents() {
    for on_failure in [FailurePolicy::FailFast, FailurePolicy::Continue] {
        let config = HiveConfig {
            strategy: Strategy::Development,
            sequential: true,
            on_failure,
            ..HiveConfig::default()
        };
        let (mut controller, store) = swarm(config, Arc::new(FailingTypes(&["implementation"])));

        let summary = controller.run("Ship the importer").await.unwrap();

        assert_eq!(summary.tasks_completed, 1);
        assert_eq!(summary.tasks_failed, 1);
        assert_eq!(summary.tasks_skipped, 2);
        assert_eq!(summary.quality_score, 25.0);
        assert_eq!(summary.state, RunState::Failed);

        // Only planning and implementation ran
        let executions = store.keys("hive/execution/*").await.unwrap();
        assert_eq!(executions.len(), 2);
    }
}

#[tokio::test]
async fn low_threshold_passes_partial_runs() {
    let config = HiveConfig {
        strategy: Strategy::Research,
        quality_threshold: 0.6,
        ..HiveConfig::default()
    };
    let (mut controller, _store) = swarm(config, Arc::new(FailingTypes(&["synthesis"])));

    let summary = controller.run("Survey consensus protocols").await.unwrap();
    assert!((summary.quality_score - 200.0 / 3.0).abs() < 1e-9);
    assert!(summary.passed);
    assert_eq!(summary.state, RunState::Completed);
}

#[tokio::test]
async fn strict_matching_without_capable_agents() {
    let config = HiveConfig {
        topology: Topology::Star,
        max_agents: 2,
        strategy: Strategy::Research,
        strict_matching: true,
        on_failure: FailurePolicy::FailFast,
        ..HiveConfig::default()
    };
    let (mut controller, _store) = swarm(config.clone(), reliable());

    let err = controller.run("Survey the field").await.unwrap_err();
    assert_eq!(err.phase, RunState::Assigning);
    assert!(matches!(err.source, CollectiveError::NoEligibleAgent { .. }));

    let config = HiveConfig {
        on_failure: FailurePolicy::Continue,
        ..config
    };
    let (mut controller, _store) = swarm(config, reliable());

    let summary = controller.run("Survey the field").await.unwrap();
    assert_eq!(summary.tasks_skipped, 3);
    assert_eq!(summary.quality_score, 0.0);
}

#[tokio::test]
async fn audit_trail_is_searchable() {
    let config = HiveConfig {
        memory_namespace: "audit".to_string(),
        ..HiveConfig::default()
    };
    let (mut controller, store) = swarm(config, reliable());
    let summary = controller.run("Build a dashboard").await.unwrap();

    let rounds = store.search("audit/consensus/*/results", 10).await.unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0]["phase"], "task-breakdown");

    let verdict = store
        .search(&format!("audit/hive/{}/results", summary.run_id), 1)
        .await
        .unwrap();
    assert_eq!(verdict[0]["summary"]["passed"], true);
}
