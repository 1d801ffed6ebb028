use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fraction of rows held out for evaluation.
pub const TEST_FRACTION: f64 = 0.3;
/// Seed shared by the split and the trainer.
pub const TRIAL_SEED: u64 = 123;

/// Split parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows placed in the test partition, in (0, 1).
    pub test_fraction: f64,
    /// Permutation seed.
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: TEST_FRACTION,
            seed: TRIAL_SEED,
        }
    }
}

/// Train/test partitions plus the source row indices of each side.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    /// Training features.
    pub x_train: Array2<f64>,
    /// Held-out features.
    pub x_test: Array2<f64>,
    /// Training labels.
    pub y_train: Array1<u8>,
    /// Held-out labels.
    pub y_test: Array1<u8>,
    /// Source rows in the training partition, in partition order.
    pub train_indices: Vec<usize>,
    /// Source rows in the test partition, in partition order.
    pub test_indices: Vec<usize>,
}

/// Seeded, unstratified shuffle split.
///
/// The test side receives `ceil(test_fraction * n)` rows: the first entries of
/// a `ChaCha8` permutation of `0..n`. The rest form the training side.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<u8>,
    config: SplitConfig,
) -> Result<TrainTestSplit, SplitError> {
    let n = x.nrows();
    if n != y.len() {
        return Err(SplitError::LengthMismatch {
            rows: n,
            labels: y.len(),
        });
    }
    if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(config.test_fraction));
    }
    let n_test = test_rows(n, config.test_fraction);
    if n_test == 0 || n_test >= n {
        return Err(SplitError::TooFewRows {
            rows: n,
            test_fraction: config.test_fraction,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(config.seed));
    let (test_indices, train_indices) = order.split_at(n_test);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), train_indices),
        x_test: x.select(Axis(0), test_indices),
        y_train: y.select(Axis(0), train_indices),
        y_test: y.select(Axis(0), test_indices),
        train_indices: train_indices.to_vec(),
        test_indices: test_indices.to_vec(),
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn test_rows(n: usize, fraction: f64) -> usize {
    // 1e-9 keeps exact products such as 0.3 * 10 from rounding up a row.
    ((fraction * n as f64) - 1e-9).ceil().max(0.0) as usize
}

/// Fraction of predictions equal to the reference labels.
pub fn accuracy(predictions: &Array1<u8>, truth: &Array1<u8>) -> Result<f64, EvaluationError> {
    if predictions.len() != truth.len() {
        return Err(EvaluationError::LengthMismatch {
            predictions: predictions.len(),
            truth: truth.len(),
        });
    }
    if truth.is_empty() {
        return Err(EvaluationError::Empty);
    }
    let correct = predictions
        .iter()
        .zip(truth.iter())
        .filter(|(pred, label)| pred == label)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = correct as f64 / truth.len() as f64;
    Ok(ratio)
}

/// Errors raised by the split stage.
#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    /// Feature and label counts disagree.
    #[error("{rows} feature rows but {labels} labels")]
    LengthMismatch {
        /// Feature rows.
        rows: usize,
        /// Labels.
        labels: usize,
    },
    /// Fraction outside (0, 1).
    #[error("test fraction {0} must lie strictly between 0 and 1")]
    InvalidFraction(f64),
    /// One side of the split would be empty.
    #[error("{rows} rows cannot be split with test fraction {test_fraction}")]
    TooFewRows {
        /// Rows available.
        rows: usize,
        /// Requested fraction.
        test_fraction: f64,
    },
}

/// Errors raised while scoring predictions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// Prediction and label counts disagree.
    #[error("{predictions} predictions for {truth} labels")]
    LengthMismatch {
        /// Predictions.
        predictions: usize,
        /// Reference labels.
        truth: usize,
    },
    /// Nothing to score.
    #[error("cannot score an empty test set")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample(n: usize) -> (Array2<f64>, Array1<u8>) {
        #[allow(clippy::cast_precision_loss)]
        let x = Array2::from_shape_fn((n, 2), |(row, col)| (row * 10 + col) as f64);
        let y = Array1::from_shape_fn(n, |row| u8::from(row % 3 == 0));
        (x, y)
    }

    #[test]
    fn split_sizes_follow_ceiling_rule() {
        let (x, y) = sample(10);
        let split = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        assert_eq!(split.test_indices.len(), 3);
        assert_eq!(split.train_indices.len(), 7);

        let (x, y) = sample(11);
        let split = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        assert_eq!(split.test_indices.len(), 4);
        assert_eq!(split.x_train.nrows(), 7);
    }

    #[test]
    fn split_is_deterministic_and_a_partition() {
        let (x, y) = sample(50);
        let first = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        let second = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        assert_eq!(first, second);

        let mut all: Vec<usize> = first
            .train_indices
            .iter()
            .chain(&first.test_indices)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn split_rows_travel_with_labels() {
        let (x, y) = sample(20);
        let split = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        for (pos, &source) in split.test_indices.iter().enumerate() {
            assert_eq!(split.x_test.row(pos), x.row(source));
            assert_eq!(split.y_test[pos], y[source]);
        }
        for (pos, &source) in split.train_indices.iter().enumerate() {
            assert_eq!(split.x_train.row(pos), x.row(source));
            assert_eq!(split.y_train[pos], y[source]);
        }
    }

    #[test]
    fn different_seeds_shuffle_differently() {
        let (x, y) = sample(40);
        let a = train_test_split(&x, &y, SplitConfig::default()).unwrap();
        let b = train_test_split(
            &x,
            &y,
            SplitConfig {
                seed: 7,
                ..SplitConfig::default()
            },
        )
        .unwrap();
        assert_ne!(a.test_indices, b.test_indices);
    }

    #[test]
    fn split_rejects_bad_inputs() {
        let (x, y) = sample(10);
        let bad = SplitConfig {
            test_fraction: 1.0,
            ..SplitConfig::default()
        };
        assert_eq!(
            train_test_split(&x, &y, bad).unwrap_err(),
            SplitError::InvalidFraction(1.0)
        );

        let (x1, y1) = sample(1);
        assert!(matches!(
            train_test_split(&x1, &y1, SplitConfig::default()),
            Err(SplitError::TooFewRows { rows: 1, .. })
        ));

        let short = array![1_u8, 0];
        assert!(matches!(
            train_test_split(&x, &short, SplitConfig::default()),
            Err(SplitError::LengthMismatch { rows: 10, labels: 2 })
        ));
    }

    #[test]
    fn accuracy_counts_exact_matches() {
        let predictions = array![1_u8, 0, 1, 1];
        let truth = array![1_u8, 1, 1, 0];
        assert!((accuracy(&predictions, &truth).unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(
            accuracy(&array![1_u8], &truth).unwrap_err(),
            EvaluationError::LengthMismatch {
                predictions: 1,
                truth: 4
            }
        );
        let empty = Array1::<u8>::zeros(0);
        assert_eq!(accuracy(&empty, &empty).unwrap_err(), EvaluationError::Empty);
    }
}
