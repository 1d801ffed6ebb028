//! Classical ML trial pipeline: clean, split, fit, score, persist.

/// Feature cleaning and schema.
pub mod editor;
/// Split and scoring helpers.
pub mod func;
/// Logistic regression model.
pub mod ml;
/// Trial reporting.
pub mod reporter;
/// Model artifact persistence.
pub mod saver;

use std::path::PathBuf;

use anyhow::Context;
use editor::{clean_data, CalendarPolicy};
use func::{accuracy, train_test_split, SplitConfig};
use ml::{LogisticRegressionModel, TrainerConfig};
use reporter::TrialReport;
use saver::ModelArtifact;
use serde_json::json;
use shared_logging::{LogLevel, MetricValue, RunLogger};

use crate::{dataloader::RawTable, telemetry::LearningTelemetry};

/// Metric label for the regularization strength.
pub const REGULARIZATION_METRIC: &str = "Regularization Strength:";
/// Metric label for the iteration budget.
pub const MAX_ITER_METRIC: &str = "Max iterations:";
/// Metric label for held-out accuracy.
pub const ACCURACY_METRIC: &str = "Accuracy";

/// Everything one trial needs besides the data and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    /// Solver hyperparameters.
    pub trainer: TrainerConfig,
    /// Split parameters.
    pub split: SplitConfig,
    /// Handling of unmapped month/weekday values.
    pub calendar_policy: CalendarPolicy,
    /// Artifact directory.
    pub output_dir: PathBuf,
}

impl TrialConfig {
    /// Trial with the given hyperparameters and default everything else.
    #[must_use]
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            trainer: TrainerConfig::new(c, max_iter),
            split: SplitConfig::default(),
            calendar_policy: CalendarPolicy::default(),
            output_dir: PathBuf::from("outputs"),
        }
    }

    /// Overrides the artifact directory.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Overrides the calendar policy.
    #[must_use]
    pub const fn with_calendar_policy(mut self, policy: CalendarPolicy) -> Self {
        self.calendar_policy = policy;
        self
    }
}

/// End-to-end trial orchestrator.
#[derive(Debug, Default)]
pub struct TrialPipeline;

impl TrialPipeline {
    /// Runs one trial and returns its report.
    pub fn run(
        &self,
        table: &RawTable,
        config: &TrialConfig,
        run_logger: &dyn RunLogger,
    ) -> anyhow::Result<TrialReport> {
        self.run_with_telemetry(table, config, run_logger, None)
    }

    /// Runs one trial with optional telemetry instrumentation.
    ///
    /// Hyperparameters are logged before the fit validates them, so a rejected
    /// `C` or `max_iter` still leaves its metrics. Nothing is written to
    /// `config.output_dir` unless every earlier step succeeded.
    pub fn run_with_telemetry(
        &self,
        table: &RawTable,
        config: &TrialConfig,
        run_logger: &dyn RunLogger,
        telemetry: Option<&LearningTelemetry>,
    ) -> anyhow::Result<TrialReport> {
        let (schema, cleaned) =
            clean_data(table, config.calendar_policy).context("cleaning dataset")?;
        log(
            telemetry,
            LogLevel::Info,
            "trial_cleaned",
            json!({
                "input_rows": cleaned.stats.input_rows,
                "incomplete_rows": cleaned.stats.incomplete_rows,
                "calendar_rows": cleaned.stats.calendar_rows,
                "kept_rows": cleaned.stats.kept_rows,
                "feature_dim": schema.width(),
            }),
        );

        let split = train_test_split(&cleaned.features.values, &cleaned.target, config.split)
            .context("splitting dataset")?;
        log(
            telemetry,
            LogLevel::Debug,
            "trial_split",
            json!({
                "train_rows": split.train_indices.len(),
                "test_rows": split.test_indices.len(),
                "seed": config.split.seed,
            }),
        );

        let trainer = &config.trainer;
        run_logger.log_metric(REGULARIZATION_METRIC, MetricValue::Float(trainer.c))?;
        run_logger.log_metric(MAX_ITER_METRIC, MetricValue::from(trainer.max_iter))?;

        let model = LogisticRegressionModel::fit(&split.x_train, &split.y_train, trainer)
            .context("fitting logistic regression")?;
        if model.converged() {
            log(
                telemetry,
                LogLevel::Info,
                "trial_fit_complete",
                json!({ "iterations": model.iterations() }),
            );
        } else {
            log(
                telemetry,
                LogLevel::Warn,
                "trial_fit_not_converged",
                json!({ "iterations": model.iterations(), "max_iter": trainer.max_iter }),
            );
        }

        let predictions = model.predict(&split.x_test)?;
        let score = accuracy(&predictions, &split.y_test).context("scoring test split")?;
        run_logger.log_metric(ACCURACY_METRIC, MetricValue::Float(score))?;

        let artifact = ModelArtifact::new(schema, model, score);
        let path = artifact.write(&config.output_dir)?;
        log(
            telemetry,
            LogLevel::Info,
            "trial_artifact_written",
            json!({ "path": path, "accuracy": score }),
        );

        Ok(TrialReport {
            c: trainer.c,
            max_iter: trainer.max_iter,
            accuracy: score,
            iterations: artifact.model.iterations(),
            converged: artifact.model.converged(),
            train_rows: split.train_indices.len(),
            test_rows: split.test_indices.len(),
            feature_count: artifact.schema.width(),
            cleaning: cleaned.stats,
            artifact: path,
        })
    }
}

fn log(
    telemetry: Option<&LearningTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: serde_json::Value,
) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, message, metadata);
    }
}
