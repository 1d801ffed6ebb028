use std::collections::BTreeSet;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataloader::RawTable;

/// Target column holding the campaign outcome.
pub const TARGET_COLUMN: &str = "y";

/// Columns expanded into one indicator per category, in output order.
pub const ONE_HOT_COLUMNS: [&str; 3] = ["job", "contact", "education"];

/// Columns that must be present in every source table.
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "job",
    "marital",
    "default",
    "housing",
    "loan",
    "contact",
    "education",
    "poutcome",
    "month",
    "day_of_week",
    TARGET_COLUMN,
];

const MONTHS: [(&str, u8); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const WEEKDAYS: [(&str, u8); 7] = [
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
    ("sun", 7),
];

/// Maps a three-letter month abbreviation to 1..=12.
#[must_use]
pub fn month_number(value: &str) -> Option<u8> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, number)| *number)
}

/// Maps a three-letter weekday abbreviation to 1..=7.
#[must_use]
pub fn weekday_number(value: &str) -> Option<u8> {
    WEEKDAYS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, number)| *number)
}

/// What to do with month/day values missing from the lookup tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPolicy {
    /// Fail the cleaning step.
    #[default]
    Reject,
    /// Drop the row as if it were incomplete.
    DropRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRule {
    Numeric,
    Binary(&'static str),
    Month,
    Weekday,
    OneHot,
    Target,
}

fn rule_for(column: &str) -> ColumnRule {
    match column {
        "marital" => ColumnRule::Binary("married"),
        "default" | "housing" | "loan" => ColumnRule::Binary("yes"),
        "poutcome" => ColumnRule::Binary("success"),
        "month" => ColumnRule::Month,
        "day_of_week" => ColumnRule::Weekday,
        TARGET_COLUMN => ColumnRule::Target,
        other if ONE_HOT_COLUMNS.contains(&other) => ColumnRule::OneHot,
        _ => ColumnRule::Numeric,
    }
}

/// Sorted category vocabulary of one expanded column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotGroup {
    /// Source column.
    pub column: String,
    /// Categories observed when the schema was fitted, sorted.
    pub categories: Vec<String>,
}

impl OneHotGroup {
    /// Indicator column names (`<column>_<category>`).
    #[must_use]
    pub fn indicator_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| format!("{}_{category}", self.column))
            .collect()
    }

    fn position(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|probe| probe.as_str().cmp(category))
            .ok()
    }
}

/// Feature layout derived from a reference table.
///
/// Scalar columns keep their source order; indicator groups follow in
/// [`ONE_HOT_COLUMNS`] order. Persisting the schema with the model keeps the
/// encoding stable: categories unseen at fit time encode as an all-zero group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    scalar_columns: Vec<String>,
    one_hot: Vec<OneHotGroup>,
    calendar_policy: CalendarPolicy,
}

/// Numeric feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Column names, one per matrix column.
    pub columns: Vec<String>,
    /// Row-major values.
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    /// Number of rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Index of a named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Copy of a named column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Array1<f64>> {
        self.column_index(name)
            .map(|idx| self.values.column(idx).to_owned())
    }
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningStats {
    /// Rows in the source table.
    pub input_rows: usize,
    /// Rows dropped for a missing cell.
    pub incomplete_rows: usize,
    /// Rows dropped for an unmapped month or weekday.
    pub calendar_rows: usize,
    /// Rows kept.
    pub kept_rows: usize,
}

/// Output of the cleaner: features, binary target, accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedData {
    /// Encoded features.
    pub features: FeatureMatrix,
    /// 1 iff the outcome was "yes".
    pub target: Array1<u8>,
    /// Row accounting.
    pub stats: CleaningStats,
}

impl FeatureSchema {
    /// Derives the layout and category vocabularies from the usable rows of `table`.
    pub fn fit(table: &RawTable, calendar_policy: CalendarPolicy) -> Result<Self, CleanError> {
        check_required(table)?;
        let (usable, _) = usable_rows(table, calendar_policy)?;

        let scalar_columns = table
            .headers()
            .iter()
            .filter(|name| !matches!(rule_for(name), ColumnRule::OneHot | ColumnRule::Target))
            .cloned()
            .collect();

        let mut one_hot = Vec::with_capacity(ONE_HOT_COLUMNS.len());
        for column in ONE_HOT_COLUMNS {
            let idx = require_column(table, column)?;
            let categories: BTreeSet<&str> = usable
                .iter()
                .filter_map(|&row| table.rows()[row][idx].as_deref())
                .collect();
            one_hot.push(OneHotGroup {
                column: column.to_string(),
                categories: categories.into_iter().map(ToOwned::to_owned).collect(),
            });
        }

        Ok(Self {
            scalar_columns,
            one_hot,
            calendar_policy,
        })
    }

    /// Encodes `table` with this schema's vocabularies.
    pub fn transform(&self, table: &RawTable) -> Result<CleanedData, CleanError> {
        check_required(table)?;
        let (usable, mut stats) = usable_rows(table, self.calendar_policy)?;

        let scalar_idx = self
            .scalar_columns
            .iter()
            .map(|name| require_column(table, name).map(|idx| (idx, rule_for(name))))
            .collect::<Result<Vec<_>, _>>()?;
        let group_idx = self
            .one_hot
            .iter()
            .map(|group| require_column(table, &group.column))
            .collect::<Result<Vec<_>, _>>()?;
        let target_idx = require_column(table, TARGET_COLUMN)?;

        let width = self.width();
        let mut values = Array2::<f64>::zeros((usable.len(), width));
        let mut target = Array1::<u8>::zeros(usable.len());

        for (out_row, &row) in usable.iter().enumerate() {
            let cells = &table.rows()[row];
            for (out_col, &(idx, rule)) in scalar_idx.iter().enumerate() {
                let value = cell(cells, idx);
                values[[out_row, out_col]] =
                    encode_scalar(rule, value).ok_or_else(|| CleanError::NonNumeric {
                        column: table.headers()[idx].clone(),
                        row,
                        value: value.to_string(),
                    })?;
            }
            let mut offset = scalar_idx.len();
            for (group, &idx) in self.one_hot.iter().zip(&group_idx) {
                if let Some(position) = group.position(cell(cells, idx)) {
                    values[[out_row, offset + position]] = 1.0;
                }
                offset += group.categories.len();
            }
            target[out_row] = u8::from(cell(cells, target_idx) == "yes");
        }

        stats.kept_rows = usable.len();
        Ok(CleanedData {
            features: FeatureMatrix {
                columns: self.feature_names(),
                values,
            },
            target,
            stats,
        })
    }

    /// Output column names in order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.scalar_columns
            .iter()
            .cloned()
            .chain(self.one_hot.iter().flat_map(OneHotGroup::indicator_names))
            .collect()
    }

    /// Number of output columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.scalar_columns.len()
            + self
                .one_hot
                .iter()
                .map(|group| group.categories.len())
                .sum::<usize>()
    }

    /// Indicator groups in output order.
    #[must_use]
    pub fn groups(&self) -> &[OneHotGroup] {
        &self.one_hot
    }

    /// Policy applied to unmapped month/weekday values.
    #[must_use]
    pub const fn calendar_policy(&self) -> CalendarPolicy {
        self.calendar_policy
    }
}

/// Fits a schema on `table` and encodes the same table.
pub fn clean_data(
    table: &RawTable,
    calendar_policy: CalendarPolicy,
) -> Result<(FeatureSchema, CleanedData), CleanError> {
    let schema = FeatureSchema::fit(table, calendar_policy)?;
    let cleaned = schema.transform(table)?;
    Ok((schema, cleaned))
}

fn check_required(table: &RawTable) -> Result<(), CleanError> {
    REQUIRED_COLUMNS
        .iter()
        .try_for_each(|column| require_column(table, column).map(|_| ()))
}

fn require_column(table: &RawTable, column: &str) -> Result<usize, CleanError> {
    table
        .column_index(column)
        .ok_or_else(|| CleanError::MissingColumn(column.to_string()))
}

// Only called on complete rows.
fn cell(cells: &[Option<String>], idx: usize) -> &str {
    cells[idx].as_deref().unwrap_or_default()
}

fn encode_scalar(rule: ColumnRule, value: &str) -> Option<f64> {
    match rule {
        ColumnRule::Binary(positive) => Some(if value == positive { 1.0 } else { 0.0 }),
        ColumnRule::Month => month_number(value).map(f64::from),
        ColumnRule::Weekday => weekday_number(value).map(f64::from),
        ColumnRule::Numeric => value.parse::<f64>().ok().filter(|v| v.is_finite()),
        ColumnRule::OneHot | ColumnRule::Target => None,
    }
}

fn usable_rows(
    table: &RawTable,
    policy: CalendarPolicy,
) -> Result<(Vec<usize>, CleaningStats), CleanError> {
    let calendar: Vec<(usize, ColumnRule)> = table
        .headers()
        .iter()
        .enumerate()
        .map(|(idx, name)| (idx, rule_for(name)))
        .filter(|(_, rule)| matches!(rule, ColumnRule::Month | ColumnRule::Weekday))
        .collect();

    let mut stats = CleaningStats {
        input_rows: table.len(),
        ..CleaningStats::default()
    };
    let mut usable = Vec::with_capacity(table.len());
    for (row, cells) in table.rows().iter().enumerate() {
        if cells.iter().any(Option::is_none) {
            stats.incomplete_rows += 1;
            continue;
        }
        let unmapped = calendar
            .iter()
            .find(|&&(idx, rule)| encode_scalar(rule, cell(cells, idx)).is_none());
        match (unmapped, policy) {
            (None, _) => usable.push(row),
            (Some(_), CalendarPolicy::DropRow) => stats.calendar_rows += 1,
            (Some(&(idx, _)), CalendarPolicy::Reject) => {
                return Err(CleanError::UnknownCalendarValue {
                    column: table.headers()[idx].clone(),
                    row,
                    value: cell(cells, idx).to_string(),
                })
            }
        }
    }
    Ok((usable, stats))
}

/// Errors raised by the feature cleaner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CleanError {
    /// A required column is absent from the header.
    #[error("missing required column '{0}'")]
    MissingColumn(String),
    /// A passthrough cell could not be parsed as a finite number.
    #[error("column '{column}' row {row}: '{value}' is not numeric")]
    NonNumeric {
        /// Column name.
        column: String,
        /// Zero-based source row.
        row: usize,
        /// Offending cell.
        value: String,
    },
    /// Month or weekday outside the lookup table.
    #[error("column '{column}' row {row}: unmapped value '{value}'")]
    UnknownCalendarValue {
        /// Column name.
        column: String,
        /// Zero-based source row.
        row: usize,
        /// Offending cell.
        value: String,
    },
}
