//! Task executor seam.
//!
//! The engine never performs work itself. Each assigned task is handed to a
//! [`TaskExecutor`], which may be arbitrarily slow or fail; the execution
//! coordinator bounds it with the run deadline.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome reported by an executor for one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutput {
    pub success: bool,
    /// Opaque result payload
    pub output: Value,
    pub error: Option<String>,
}

impl TaskOutput {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Performs a unit of work on behalf of an agent.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run a task. An `Err` and an `Ok` with `success == false` are both
    /// recorded as task failures.
    async fn run_task(
        &self,
        agent_id: &str,
        task_description: &str,
        context: &Value,
    ) -> Result<TaskOutput>;
}

/// Executor that fakes work with a fixed latency and a seeded success rate.
///
/// Used by the command-line runner when no real executor is wired in.
#[derive(Debug)]
pub struct SimulatedExecutor {
    success_rate: f64,
    latency: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn new(success_rate: f64, latency: Duration) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            latency,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Make outcomes reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn roll(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(self.success_rate)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(0.9, Duration::from_millis(50))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn run_task(
        &self,
        agent_id: &str,
        task_description: &str,
        _context: &Value,
    ) -> Result<TaskOutput> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.roll() {
            Ok(TaskOutput::success(json!({
                "agent": agent_id,
                "summary": format!("Completed: {}", task_description),
            })))
        } else {
            Ok(TaskOutput::failure(format!(
                "Simulated failure for agent {}",
                agent_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_executor_always_succeeds_at_full_rate() {
        let executor = SimulatedExecutor::new(1.0, Duration::ZERO);
        let output = executor
            .run_task("agent-1", "write the parser", &Value::Null)
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.output["agent"], "agent-1");
        assert!(output.error.is_none());
    }

    #[tokio::test]
    async fn test_simulated_executor_always_fails_at_zero_rate() {
        let executor = SimulatedExecutor::new(0.0, Duration::ZERO);
        let output = executor
            .run_task("agent-2", "write the parser", &Value::Null)
            .await
            .unwrap();

        assert!(!output.success);
        assert!(output.error.unwrap().contains("agent-2"));
    }

    #[tokio::test]
    async fn test_seeded_executors_agree() {
        let a = SimulatedExecutor::new(0.5, Duration::ZERO).with_seed(7);
        let b = SimulatedExecutor::new(0.5, Duration::ZERO).with_seed(7);

        for _ in 0..10 {
            let x = a.run_task("x", "t", &Value::Null).await.unwrap().success;
            let y = b.run_task("x", "t", &Value::Null).await.unwrap().success;
            assert_eq!(x, y);
        }
    }
}
