#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Hyperdrive learning stack: bank-marketing ingestion, feature cleaning, and logistic regression trials.

/// Classical ML trial pipeline.
#[path = "../ML/main.rs"]
pub mod classical_ml;

/// Telemetry helpers for structured trial logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Dataset fetching and raw table parsing.
#[path = "../dataloader.rs"]
pub mod dataloader;

/// Environment-level trial settings.
#[path = "../settings.rs"]
pub mod settings;

#[cfg(test)]
#[path = "../fixtures.rs"]
mod fixtures;

pub use classical_ml::{
    editor::{clean_data, CalendarPolicy, CleanError, CleanedData, FeatureSchema},
    func::{accuracy, train_test_split, SplitConfig, TrainTestSplit},
    ml::{LogisticRegressionModel, TrainError, TrainerConfig},
    reporter::TrialReport,
    saver::{artifact_file_name, ModelArtifact},
    TrialConfig, TrialPipeline, ACCURACY_METRIC, MAX_ITER_METRIC, REGULARIZATION_METRIC,
};
pub use dataloader::{DataSource, DataSourceError, RawTable, BANK_MARKETING_URL};
pub use settings::{SettingsError, TrialSettings, SETTINGS_FILE};
pub use telemetry::{LearningTelemetry, LearningTelemetryBuilder};
