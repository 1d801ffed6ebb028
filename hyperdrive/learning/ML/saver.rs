use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{
    classical_ml::{editor::FeatureSchema, ml::LogisticRegressionModel},
    dataloader::RawTable,
};

/// File-name prefix of every trial artifact.
pub const ARTIFACT_PREFIX: &str = "hyperDrive";
/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "json";
const FORMAT_VERSION: u32 = 1;

/// Renders a hyperparameter the way a scripting-language float literal prints:
/// integral values keep a trailing `.0` and tiny or huge magnitudes switch to
/// exponent notation with a signed, two-digit exponent.
#[must_use]
pub fn hyperparameter_literal(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        let literal = if value > 0.0 { "inf" } else { "-inf" };
        return literal.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let rendered = format!("{value:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or_default();
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
            }
            None => rendered,
        };
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// `hyperDrive_<C>_<max_iter>.json`
#[must_use]
pub fn artifact_file_name(c: f64, max_iter: usize) -> String {
    format!(
        "{ARTIFACT_PREFIX}_{}_{max_iter}.{ARTIFACT_EXTENSION}",
        hyperparameter_literal(c)
    )
}

/// Full artifact path under `output_dir`.
#[must_use]
pub fn artifact_path(output_dir: impl AsRef<Path>, c: f64, max_iter: usize) -> PathBuf {
    output_dir.as_ref().join(artifact_file_name(c, max_iter))
}

/// Persisted trial output: fitted model plus the feature schema it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Layout version of this file.
    pub format_version: u32,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// Encoding applied to raw rows before prediction.
    pub schema: FeatureSchema,
    /// Fitted classifier.
    pub model: LogisticRegressionModel,
    /// Held-out accuracy measured at training time.
    pub accuracy: f64,
}

impl ModelArtifact {
    /// Bundles a fitted model with its schema.
    #[must_use]
    pub fn new(schema: FeatureSchema, model: LogisticRegressionModel, accuracy: f64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            schema,
            model,
            accuracy,
        }
    }

    /// Writes the artifact under `output_dir`, creating the directory if needed.
    /// An existing artifact with the same hyperparameters is overwritten.
    pub fn write(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating {}", output_dir.display()))?;
        let config = self.model.config();
        let path = artifact_path(output_dir, config.c, config.max_iter);
        let payload = serde_json::to_vec_pretty(self).context("serializing model artifact")?;
        fs::write(&path, payload).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Loads an artifact written by [`ModelArtifact::write`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing model artifact {}", path.display()))
    }

    /// Encodes raw rows with the stored schema and predicts 0/1 labels.
    pub fn predict_table(&self, table: &RawTable) -> Result<Array1<u8>> {
        let cleaned = self
            .schema
            .transform(table)
            .context("encoding rows with stored schema")?;
        Ok(self.model.predict(&cleaned.features.values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classical_ml::{
        editor::{clean_data, CalendarPolicy},
        ml::TrainerConfig,
    };
    use crate::fixtures::bank_table;
    use tempfile::tempdir;

    fn artifact(c: f64, max_iter: usize) -> ModelArtifact {
        let (schema, cleaned) = clean_data(&bank_table(60, 3), CalendarPolicy::Reject).unwrap();
        let model = LogisticRegressionModel::fit(
            &cleaned.features.values,
            &cleaned.target,
            &TrainerConfig::new(c, max_iter),
        )
        .unwrap();
        ModelArtifact::new(schema, model, 0.75)
    }

    #[test]
    fn literals_match_float_repr() {
        assert_eq!(hyperparameter_literal(0.5), "0.5");
        assert_eq!(hyperparameter_literal(1.0), "1.0");
        assert_eq!(hyperparameter_literal(100.0), "100.0");
        assert_eq!(hyperparameter_literal(0.001), "0.001");
        assert_eq!(hyperparameter_literal(0.0001), "0.0001");
        assert_eq!(hyperparameter_literal(0.00001), "1e-05");
        assert_eq!(hyperparameter_literal(2.5e-7), "2.5e-07");
        assert_eq!(hyperparameter_literal(1e16), "1e+16");
        assert_eq!(hyperparameter_literal(0.1), "0.1");
    }

    #[test]
    fn file_names_embed_hyperparameters() {
        assert_eq!(artifact_file_name(0.5, 50), "hyperDrive_0.5_50.json");
        assert_eq!(artifact_file_name(1.0, 100), "hyperDrive_1.0_100.json");
        assert_ne!(artifact_file_name(0.5, 50), artifact_file_name(0.5, 51));
        assert_ne!(artifact_file_name(0.5, 50), artifact_file_name(0.05, 50));
    }

    #[test]
    fn writes_into_created_outputs_dir() {
        let dir = tempdir().unwrap();
        let outputs = dir.path().join("outputs");
        assert!(!outputs.exists());

        let artifact = artifact(0.5, 50);
        let path = artifact.write(&outputs).unwrap();
        assert_eq!(path, outputs.join("hyperDrive_0.5_50.json"));
        assert!(path.is_file());

        // Second write with identical hyperparameters overwrites in place.
        let again = artifact.write(&outputs).unwrap();
        assert_eq!(again, path);
        assert_eq!(fs::read_dir(&outputs).unwrap().count(), 1);
    }

    #[test]
    fn round_trip_preserves_predictions() {
        let dir = tempdir().unwrap();
        let artifact = artifact(1.0, 100);
        let path = artifact.write(dir.path()).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.schema, artifact.schema);
        assert_eq!(loaded.model.config(), artifact.model.config());

        let table = bank_table(25, 3);
        assert_eq!(
            loaded.predict_table(&table).unwrap(),
            artifact.predict_table(&table).unwrap()
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ModelArtifact::load("/no/such/hyperDrive_1.0_100.json").unwrap_err();
        assert!(format!("{err:#}").contains("hyperDrive_1.0_100.json"));
    }
}
