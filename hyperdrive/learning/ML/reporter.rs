use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::editor::CleaningStats;

/// Outcome of one hyperparameter trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialReport {
    /// Inverse regularization strength.
    pub c: f64,
    /// Iteration budget.
    pub max_iter: usize,
    /// Held-out accuracy.
    pub accuracy: f64,
    /// Newton updates performed.
    pub iterations: usize,
    /// Whether the solver met its tolerance.
    pub converged: bool,
    /// Rows in the training partition.
    pub train_rows: usize,
    /// Rows in the test partition.
    pub test_rows: usize,
    /// Encoded feature width.
    pub feature_count: usize,
    /// Cleaner row accounting.
    pub cleaning: CleaningStats,
    /// Written model file.
    pub artifact: PathBuf,
}

impl TrialReport {
    /// Renders a concise summary string.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[trial] C={} max_iter={} accuracy={:.4} iterations={}{} train={} test={} features={} artifact={}",
            self.c,
            self.max_iter,
            self.accuracy,
            self.iterations,
            if self.converged { "" } else { " (not converged)" },
            self.train_rows,
            self.test_rows,
            self.feature_count,
            self.artifact.display()
        )
    }
}
