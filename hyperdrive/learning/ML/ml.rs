use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classical_ml::func::TRIAL_SEED;

/// Default inverse regularization strength.
pub const DEFAULT_C: f64 = 1.0;
/// Default Newton iteration budget.
pub const DEFAULT_MAX_ITER: usize = 100;
/// Stop once half the Newton decrement falls below this.
pub const DEFAULT_TOL: f64 = 1e-4;

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;

/// Hyperparameters of one fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Inverse L2 regularization strength, > 0.
    pub c: f64,
    /// Maximum Newton updates, >= 1.
    pub max_iter: usize,
    /// Convergence tolerance.
    pub tol: f64,
    /// Recorded for reproducibility; the solver itself is deterministic.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_C, DEFAULT_MAX_ITER)
    }
}

impl TrainerConfig {
    /// Config with the given hyperparameters and default tolerance and seed.
    #[must_use]
    pub const fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            tol: DEFAULT_TOL,
            seed: TRIAL_SEED,
        }
    }

    /// Checks hyperparameter ranges.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(TrainError::InvalidRegularization(self.c));
        }
        if self.max_iter == 0 {
            return Err(TrainError::InvalidIterations);
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(TrainError::InvalidTolerance(self.tol));
        }
        Ok(())
    }
}

/// L2-regularized binary logistic regression.
///
/// Fitting minimizes `0.5 * |w|^2 + C * sum(log(1 + exp(-s_i * (x_i . w + b))))`
/// with a damped Newton method; the intercept is not penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionModel {
    coefficients: Array1<f64>,
    intercept: f64,
    config: TrainerConfig,
    iterations: usize,
    converged: bool,
}

impl LogisticRegressionModel {
    /// Fits the model on `x` (rows are samples) and 0/1 labels `y`.
    ///
    /// Running out of iterations is not an error: the model is returned with
    /// [`converged`](Self::converged) set to `false`.
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<u8>,
        config: &TrainerConfig,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        let (n, features) = x.dim();
        if n == 0 {
            return Err(TrainError::EmptyTrainingSet);
        }
        if n != y.len() {
            return Err(TrainError::LabelMismatch {
                rows: n,
                labels: y.len(),
            });
        }
        if x.iter().any(|value| !value.is_finite()) {
            return Err(TrainError::NonFiniteFeatures);
        }
        let positives = y.iter().filter(|&&label| label == 1).count();
        if positives == 0 || positives == n {
            return Err(TrainError::SingleClass);
        }

        let objective = Objective::new(x, y, config.c);
        let mut theta = Array1::<f64>::zeros(features + 1);
        let mut loss = objective.value(&theta);
        let mut iterations = 0;
        let mut converged = false;

        loop {
            let (step, decrement) = objective.newton_step(&theta, iterations)?;
            if 0.5 * decrement <= config.tol {
                converged = true;
                break;
            }
            if iterations == config.max_iter {
                break;
            }
            match objective.line_search(&theta, &step, loss, decrement) {
                Some((next, next_loss)) => {
                    theta = next;
                    loss = next_loss;
                    iterations += 1;
                }
                None => break,
            }
        }

        Ok(Self {
            coefficients: theta.slice(s![..features]).to_owned(),
            intercept: theta[features],
            config: *config,
            iterations,
            converged,
        })
    }

    /// Raw scores `x . w + b`.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainError> {
        if x.ncols() != self.coefficients.len() {
            return Err(TrainError::FeatureWidth {
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Probability of the positive class per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainError> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Hard 0/1 labels at threshold 0.5.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>, TrainError> {
        Ok(self
            .predict_proba(x)?
            .mapv(|probability| u8::from(probability >= 0.5)))
    }

    /// Learned feature weights.
    #[must_use]
    pub const fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Learned bias.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Hyperparameters used for the fit.
    #[must_use]
    pub const fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Newton updates performed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the tolerance was reached within the iteration budget.
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.converged
    }
}

struct Objective {
    design: Array2<f64>,
    target: Array1<f64>,
    c: f64,
    features: usize,
}

impl Objective {
    fn new(x: &Array2<f64>, y: &Array1<u8>, c: f64) -> Self {
        let (n, features) = x.dim();
        // Trailing column of ones carries the intercept.
        let mut design = Array2::<f64>::ones((n, features + 1));
        design.slice_mut(s![.., ..features]).assign(x);
        Self {
            design,
            target: y.mapv(f64::from),
            c,
            features,
        }
    }

    fn penalty(&self, theta: &Array1<f64>) -> f64 {
        0.5 * theta
            .slice(s![..self.features])
            .iter()
            .map(|w| w * w)
            .sum::<f64>()
    }

    fn value(&self, theta: &Array1<f64>) -> f64 {
        let z = self.design.dot(theta);
        let data = z
            .iter()
            .zip(self.target.iter())
            .map(|(&z, &y)| softplus(z) - y * z)
            .sum::<f64>();
        self.c * data + self.penalty(theta)
    }

    fn newton_step(
        &self,
        theta: &Array1<f64>,
        iteration: usize,
    ) -> Result<(Array1<f64>, f64), TrainError> {
        let probabilities = self.design.dot(theta).mapv(sigmoid);
        let residual = &probabilities - &self.target;
        let mut gradient = self.design.t().dot(&residual) * self.c;

        let curvature = probabilities.mapv(|p| p * (1.0 - p) * self.c);
        let weighted = &self.design * &curvature.view().insert_axis(Axis(1));
        let mut hessian = self.design.t().dot(&weighted);

        for j in 0..self.features {
            gradient[j] += theta[j];
            hessian[[j, j]] += 1.0;
        }

        let step = cholesky_solve(&hessian, &gradient)
            .ok_or(TrainError::SingularHessian { iteration })?;
        let decrement = gradient.dot(&step);
        if !decrement.is_finite() {
            return Err(TrainError::NonFiniteObjective { iteration });
        }
        Ok((step, decrement))
    }

    fn line_search(
        &self,
        theta: &Array1<f64>,
        step: &Array1<f64>,
        loss: f64,
        decrement: f64,
    ) -> Option<(Array1<f64>, f64)> {
        let slack = 1e-12 * loss.abs();
        let mut t = 1.0;
        while t >= MIN_STEP {
            let candidate = theta - &(step * t);
            let candidate_loss = self.value(&candidate);
            if candidate_loss.is_finite()
                && candidate_loss <= loss - ARMIJO * t * decrement + slack
            {
                return Some((candidate, candidate_loss));
            }
            t *= 0.5;
        }
        None
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Solves `a x = b` for symmetric positive-definite `a`, adding diagonal jitter
/// when the factorization breaks down.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() || n == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64).max(1.0);
    [0.0, 1e-10, 1e-8, 1e-6]
        .iter()
        .find_map(|jitter| cholesky_factor(a, jitter * scale))
        .map(|l| substitute(&l, b))
}

fn cholesky_factor(a: &Array2<f64>, jitter: f64) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] + jitter - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, i]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Errors raised while fitting or applying the model.
#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    /// `C` must be finite and positive.
    #[error("regularization strength C must be positive, got {0}")]
    InvalidRegularization(f64),
    /// `max_iter` must be at least one.
    #[error("max_iter must be at least 1")]
    InvalidIterations,
    /// Tolerance must be finite and positive.
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    /// No training rows.
    #[error("training set is empty")]
    EmptyTrainingSet,
    /// Feature and label counts disagree.
    #[error("{rows} training rows but {labels} labels")]
    LabelMismatch {
        /// Feature rows.
        rows: usize,
        /// Labels.
        labels: usize,
    },
    /// NaN or infinite feature value.
    #[error("training features contain non-finite values")]
    NonFiniteFeatures,
    /// Only one label value present.
    #[error("training labels contain a single class")]
    SingleClass,
    /// Hessian could not be factorized.
    #[error("hessian is not positive definite at iteration {iteration}")]
    SingularHessian {
        /// Newton iteration.
        iteration: usize,
    },
    /// Objective or step became NaN/infinite.
    #[error("objective diverged at iteration {iteration}")]
    NonFiniteObjective {
        /// Newton iteration.
        iteration: usize,
    },
    /// Input width differs from the fitted width.
    #[error("model expects {expected} features, got {found}")]
    FeatureWidth {
        /// Fitted width.
        expected: usize,
        /// Provided width.
        found: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classical_ml::editor::{clean_data, CalendarPolicy};
    use crate::fixtures::bank_table;
    use ndarray::array;

    fn line_data() -> (Array2<f64>, Array1<u8>) {
        let xs: Vec<f64> = (0..40).map(|i| f64::from(i) * 0.15 - 3.0).collect();
        let mut labels: Vec<u8> = xs.iter().map(|&x| u8::from(x > 0.0)).collect();
        // Overlap near the boundary.
        labels[18] = 1;
        labels[22] = 0;
        let x = Array2::from_shape_vec((xs.len(), 1), xs).unwrap();
        (x, Array1::from(labels))
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = line_data();
        let model = LogisticRegressionModel::fit(&x, &y, &TrainerConfig::default()).unwrap();
        assert!(model.converged());
        assert!(model.iterations() <= DEFAULT_MAX_ITER);
        assert!(model.coefficients()[0] > 0.0);
        let predictions = model.predict(&array![[-2.0], [2.0]]).unwrap();
        assert_eq!(predictions, array![0_u8, 1]);
        let proba = model.predict_proba(&array![[0.0]]).unwrap();
        assert!((proba[0] - 0.5).abs() < 0.2);
    }

    #[test]
    fn stronger_regularization_shrinks_weights() {
        let (x, y) = line_data();
        let loose = LogisticRegressionModel::fit(&x, &y, &TrainerConfig::new(100.0, 100)).unwrap();
        let tight = LogisticRegressionModel::fit(&x, &y, &TrainerConfig::new(0.01, 100)).unwrap();
        assert!(tight.coefficients()[0].abs() < loose.coefficients()[0].abs());
    }

    #[test]
    fn fitting_is_deterministic() {
        let (_, cleaned) = clean_data(&bank_table(150, 4), CalendarPolicy::Reject).unwrap();
        let x = &cleaned.features.values;
        let config = TrainerConfig::new(1.0, 100);
        let first = LogisticRegressionModel::fit(x, &cleaned.target, &config).unwrap();
        let second = LogisticRegressionModel::fit(x, &cleaned.target, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.predict(x).unwrap(), second.predict(x).unwrap());
    }

    #[test]
    fn iteration_budget_is_respected() {
        let (_, cleaned) = clean_data(&bank_table(150, 4), CalendarPolicy::Reject).unwrap();
        let model = LogisticRegressionModel::fit(
            &cleaned.features.values,
            &cleaned.target,
            &TrainerConfig::new(1.0, 2),
        )
        .unwrap();
        assert!(model.iterations() <= 2);
        assert_eq!(model.config().max_iter, 2);
        assert_eq!(model.config().seed, TRIAL_SEED);
    }

    #[test]
    fn rejects_unusable_inputs() {
        let (x, y) = line_data();
        assert_eq!(
            LogisticRegressionModel::fit(&x, &y, &TrainerConfig::new(0.0, 100)).unwrap_err(),
            TrainError::InvalidRegularization(0.0)
        );
        assert_eq!(
            LogisticRegressionModel::fit(&x, &y, &TrainerConfig::new(1.0, 0)).unwrap_err(),
            TrainError::InvalidIterations
        );
        let ones = Array1::<u8>::ones(x.nrows());
        assert_eq!(
            LogisticRegressionModel::fit(&x, &ones, &TrainerConfig::default()).unwrap_err(),
            TrainError::SingleClass
        );
        let empty = Array2::<f64>::zeros((0, 1));
        assert_eq!(
            LogisticRegressionModel::fit(&empty, &Array1::zeros(0), &TrainerConfig::default())
                .unwrap_err(),
            TrainError::EmptyTrainingSet
        );
        assert_eq!(
            LogisticRegressionModel::fit(&x, &array![0_u8, 1], &TrainerConfig::default())
                .unwrap_err(),
            TrainError::LabelMismatch {
                rows: 40,
                labels: 2
            }
        );
        let mut poisoned = x.clone();
        poisoned[[3, 0]] = f64::NAN;
        assert_eq!(
            LogisticRegressionModel::fit(&poisoned, &y, &TrainerConfig::default()).unwrap_err(),
            TrainError::NonFiniteFeatures
        );
    }

    #[test]
    fn prediction_checks_width() {
        let (x, y) = line_data();
        let model = LogisticRegressionModel::fit(&x, &y, &TrainerConfig::default()).unwrap();
        assert_eq!(
            model.predict(&array![[1.0, 2.0]]).unwrap_err(),
            TrainError::FeatureWidth {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn cholesky_solves_spd_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        let residual = a.dot(&x) - &b;
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
        assert!(cholesky_solve(&array![[-1.0]], &array![1.0]).is_none());
    }

    #[test]
    fn numerics_are_stable_at_extremes() {
        assert!((sigmoid(800.0) - 1.0).abs() < f64::EPSILON);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
        assert!(softplus(-800.0) >= 0.0);
    }
}
