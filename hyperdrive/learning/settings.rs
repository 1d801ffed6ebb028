use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    classical_ml::editor::CalendarPolicy,
    dataloader::{DataSource, BANK_MARKETING_URL},
};

/// Optional settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "hyperdrive.toml";

/// Environment-level trial settings. Hyperparameters come from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrialSettings {
    /// Remote CSV location.
    #[serde(default = "default_data_url")]
    pub data_url: String,
    /// Local CSV used instead of `data_url` when set.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    /// Directory receiving model artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory receiving telemetry and metric logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Handling of unmapped month/weekday values.
    #[serde(default)]
    pub calendar_policy: CalendarPolicy,
    /// Whole-request timeout for the HTTP fetch.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            data_path: None,
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            calendar_policy: CalendarPolicy::default(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl TrialSettings {
    /// Parses and validates settings from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a file; a relative `data_path` resolves against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&raw)?;
        if let Some(data_path) = settings.data_path.as_mut() {
            if data_path.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                *data_path = base.join(&*data_path);
            }
        }
        Ok(settings)
    }

    /// Loads `path` when it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Data source described by these settings.
    #[must_use]
    pub fn data_source(&self) -> DataSource {
        match &self.data_path {
            Some(path) => DataSource::File(path.clone()),
            None => DataSource::Http {
                url: self.data_url.clone(),
                timeout: Duration::from_secs(self.request_timeout_secs),
            },
        }
    }

    /// Telemetry log file.
    #[must_use]
    pub fn telemetry_path(&self) -> PathBuf {
        self.log_dir.join("trial.log.jsonl")
    }

    /// Run-metric log file.
    #[must_use]
    pub fn metrics_path(&self) -> PathBuf {
        self.log_dir.join("metrics.jsonl")
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.data_path.is_none()
            && !(self.data_url.starts_with("http://") || self.data_url.starts_with("https://"))
        {
            return Err(SettingsError::Invalid(format!(
                "data_url must be an http(s) URL, got '{}'",
                self.data_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::Invalid(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(SettingsError::Invalid("output_dir must not be empty".into()));
        }
        Ok(())
    }
}

fn default_data_url() -> String {
    BANK_MARKETING_URL.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("outputs/logs")
}

const fn default_timeout_secs() -> u64 {
    60
}

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file unreadable.
    #[error("reading {}: {source}", path.display())]
    Io {
        /// Settings file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// TOML syntax or type error.
    #[error("parsing settings: {0}")]
    Parse(#[from] toml::de::Error),
    /// Semantically invalid value.
    #[error("invalid settings: {0}")]
    Invalid(String),
}
