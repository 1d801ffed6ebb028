use std::{fmt, path::Path};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::JsonLogger;

/// Scalar value attached to a run metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    /// Integral metric (iteration counts, sizes).
    Int(i64),
    /// Real-valued metric.
    Float(f64),
}

impl MetricValue {
    /// Returns the value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

/// One named scalar logged against a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    /// Time the metric was recorded.
    pub timestamp: DateTime<Utc>,
    /// Identifier of the trial run.
    pub run_id: String,
    /// Caller-provided label.
    pub name: String,
    /// Logged value.
    pub value: MetricValue,
}

/// Experiment-tracking sink receiving named scalar metrics.
pub trait RunLogger: Send + Sync {
    /// Records one metric under the given label.
    fn log_metric(&self, name: &str, value: MetricValue) -> Result<()>;
}

/// Run logger appending metric records to a JSON-lines file.
#[derive(Debug)]
pub struct JsonRunLogger {
    run_id: String,
    sink: JsonLogger,
}

impl JsonRunLogger {
    /// Opens (or creates) the metrics file for the given run.
    pub fn new(path: impl AsRef<Path>, run_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            run_id: run_id.into(),
            sink: JsonLogger::new(path)?,
        })
    }

    /// Identifier stamped on every record.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the metrics file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.sink.path()
    }
}

impl RunLogger for JsonRunLogger {
    fn log_metric(&self, name: &str, value: MetricValue) -> Result<()> {
        self.sink.append(&MetricRecord {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            name: name.to_string(),
            value,
        })
    }
}

/// In-memory run logger, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRunLogger {
    records: Mutex<Vec<(String, MetricValue)>>,
}

impl MemoryRunLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of logged metrics in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<(String, MetricValue)> {
        self.records.lock().clone()
    }

    /// Most recent value logged under `name`.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<MetricValue> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|(label, _)| label == name)
            .map(|(_, value)| *value)
    }
}

impl RunLogger for MemoryRunLogger {
    fn log_metric(&self, name: &str, value: MetricValue) -> Result<()> {
        self.records.lock().push((name.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn json_run_logger_appends_records() {
        let dir = tempdir().unwrap();
        let logger = JsonRunLogger::new(dir.path().join("metrics.jsonl"), "run-1").unwrap();
        logger
            .log_metric("Regularization Strength:", MetricValue::Float(0.5))
            .unwrap();
        logger
            .log_metric("Max iterations:", MetricValue::Int(50))
            .unwrap();

        let content = fs::read_to_string(logger.path()).unwrap();
        let records: Vec<MetricRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run_id, "run-1");
        assert_eq!(records[0].value, MetricValue::Float(0.5));
        assert_eq!(records[1].name, "Max iterations:");
        assert_eq!(records[1].value, MetricValue::Int(50));
    }

    #[test]
    fn memory_logger_keeps_order_and_latest() {
        let logger = MemoryRunLogger::new();
        logger.log_metric("Accuracy", 0.5.into()).unwrap();
        logger.log_metric("Max iterations:", 100_usize.into()).unwrap();
        logger.log_metric("Accuracy", 0.9.into()).unwrap();
        assert_eq!(logger.records().len(), 3);
        assert_eq!(logger.latest("Accuracy"), Some(MetricValue::Float(0.9)));
        assert!(logger.latest("missing").is_none());
    }

    #[test]
    fn metric_values_render_plainly() {
        assert_eq!(MetricValue::Int(100).to_string(), "100");
        assert_eq!(MetricValue::Float(0.25).to_string(), "0.25");
        assert!((MetricValue::Int(3).as_f64() - 3.0).abs() < f64::EPSILON);
    }
}
