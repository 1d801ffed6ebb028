use std::{io::Read, path::PathBuf, time::Duration};

use thiserror::Error;

/// Published bank-marketing training snapshot.
pub const BANK_MARKETING_URL: &str = "https://automlsamplenotebookdata.blob.core.windows.net/automl-sample-notebook-data/bankmarketing_train.csv";

/// Cell contents treated as a missing value.
pub const NULL_TOKENS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// In-memory delimited table. Missing cells are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Builds a table, rejecting rows whose width differs from the header.
    pub fn new(
        headers: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self, DataSourceError> {
        if headers.is_empty() {
            return Err(DataSourceError::EmptyHeader);
        }
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != headers.len())
        {
            return Err(DataSourceError::RaggedRow {
                row,
                expected: headers.len(),
                found: cells.len(),
            });
        }
        Ok(Self { headers, rows })
    }

    /// Parses CSV with a header row from any reader.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self, DataSourceError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = csv.headers()?.iter().map(ToOwned::to_owned).collect();
        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            rows.push(record.iter().map(normalize_cell).collect());
        }
        Self::new(headers, rows)
    }

    /// Parses CSV text held in memory.
    pub fn from_csv_str(text: &str) -> Result<Self, DataSourceError> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Column names in source order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All rows, including incomplete ones.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Number of rows without any missing cell.
    #[must_use]
    pub fn complete_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.iter().all(Option::is_some)).count()
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Where the trial dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// CSV served over HTTP(S).
    Http {
        /// Remote location.
        url: String,
        /// Whole-request timeout.
        timeout: Duration,
    },
    /// CSV on the local filesystem.
    File(PathBuf),
}

impl Default for DataSource {
    fn default() -> Self {
        Self::Http {
            url: BANK_MARKETING_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl DataSource {
    /// Human-readable location used in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Http { url, .. } => url.clone(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Fetches and parses the dataset.
    pub async fn fetch(&self) -> Result<RawTable, DataSourceError> {
        match self {
            Self::Http { url, timeout } => {
                let body = fetch_http(url, *timeout).await?;
                RawTable::from_csv_str(&body)
            }
            Self::File(path) => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| DataSourceError::Io {
                        path: path.clone(),
                        source,
                    })?;
                RawTable::from_csv_str(&body)
            }
        }
    }
}

async fn fetch_http(url: &str, timeout: Duration) -> Result<String, DataSourceError> {
    let request_error = |source| DataSourceError::Request {
        url: url.to_string(),
        source,
    };
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(request_error)?;
    client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(request_error)?
        .text()
        .await
        .map_err(request_error)
}

/// Errors raised while fetching or parsing the dataset.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// HTTP request failed or returned a non-success status.
    #[error("fetching {url}: {source}")]
    Request {
        /// Requested location.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Filesystem read failed.
    #[error("reading {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// CSV syntax error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Header row missing.
    #[error("dataset has no header row")]
    EmptyHeader,
    /// Row width differs from header width.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based data row.
        row: usize,
        /// Header width.
        expected: usize,
        /// Row width.
        found: usize,
    },
}
