pub use swarm_hive_collective::{
    capability, consensus, decomposition, delegation, execution, executor, knowledge,
    orchestration, quality, registry, topology, types,
};
pub use swarm_hive_collective::{
    InMemoryKnowledgeStore, KnowledgeStore, RunError, RunState, RunSummary, SimulatedExecutor,
    SwarmController, TaskExecutor,
};
pub use swarm_hive_config as config;
pub use swarm_hive_config::HiveConfig;
