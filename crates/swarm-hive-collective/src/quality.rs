//! Aggregation of execution results into a pass/fail verdict.

use crate::execution::{ExecutionResult, ExecutionStatus};
use serde::{Deserialize, Serialize};

/// Tolerance on the threshold comparison so that a score of exactly
/// `threshold × 100` passes despite float rounding.
const SCORE_EPSILON: f64 = 1e-9;

/// Scores a set of results on a 0–100 scale.
pub trait QualityScorer: Send + Sync {
    fn score(&self, results: &[ExecutionResult]) -> f64;
}

/// Percentage of tasks that completed. No tasks scores 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionRatioScorer;

impl QualityScorer for CompletionRatioScorer {
    fn score(&self, results: &[ExecutionResult]) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        let completed = results.iter().filter(|r| r.is_completed()).count();
        completed as f64 / results.len() as f64 * 100.0
    }
}

/// Verdict for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub quality_score: f64,
    pub passed: bool,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
}

/// Whether `score` (0–100) clears `threshold` (0–1). Inclusive.
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score >= threshold * 100.0 - SCORE_EPSILON
}

/// Applies a [`QualityScorer`] and the pass threshold.
pub struct QualityGate {
    scorer: Box<dyn QualityScorer>,
}

impl QualityGate {
    pub fn new(scorer: Box<dyn QualityScorer>) -> Self {
        Self { scorer }
    }

    pub fn aggregate(&self, results: &[ExecutionResult], threshold: f64) -> QualityReport {
        let count = |status: ExecutionStatus| results.iter().filter(|r| r.status == status).count();
        let quality_score = self.scorer.score(results);

        QualityReport {
            quality_score,
            passed: meets_threshold(quality_score, threshold),
            tasks_completed: count(ExecutionStatus::Completed),
            tasks_failed: count(ExecutionStatus::Failed),
            tasks_skipped: count(ExecutionStatus::Skipped),
        }
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(Box::new(CompletionRatioScorer))
    }
}
