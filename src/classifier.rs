//! Binary classifiers: the fit / predict seam plus a logistic regression.

use std::fmt;

use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::warn;
use crate::{
    error::{StatsError, Result},
    optimization::solve_linear_system,
};

/// something that can be fit to a predictor matrix & 0/1 outcome
pub trait Classifier {
    /// `Err(StatsError::PerfectSeparation)` is recoverable, anything else is not
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn FittedClassifier>>;
}

/// a fitted model - always predicts, sometimes knows class probabilities
pub trait FittedClassifier: fmt::Debug {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// true when `predict_proba` is implemented
    fn supports_probability(&self) -> bool {
        false
    }

    /// probability of the positive class
    fn predict_proba(&self, _x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Err(StatsError::model_fit("model exposes no class probabilities"))
    }
}

/// where `FittedModel` gets its probabilities from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbabilitySource {
    /// the model's own positive-class probability
    Probability,
    /// raw predictions standing in for a probability
    RawPrediction,
}

/// uniform probability interface over any fitted classifier
#[derive(Debug)]
pub struct FittedModel {
    inner: Box<dyn FittedClassifier>,
    source: ProbabilitySource,
}

impl FittedModel {
    pub fn new(inner: Box<dyn FittedClassifier>) -> Self {
        let source = if inner.supports_probability() {
            ProbabilitySource::Probability
        } else {
            ProbabilitySource::RawPrediction
        };
        Self { inner, source }
    }

    pub fn source(&self) -> ProbabilitySource {
        self.source
    }

    pub fn predicted_probability(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        match self.source {
            ProbabilitySource::Probability => self.inner.predict_proba(x),
            ProbabilitySource::RawPrediction => self.inner.predict(x),
        }
    }

    pub fn inner(&self) -> &dyn FittedClassifier {
        self.inner.as_ref()
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

/// binomial GLM w/ logit link, fitted by iteratively reweighted least squares
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    fit_intercept: bool,
    max_iterations: usize,
    tolerance: f64,            // relative deviance change
    separation_tolerance: f64, // max |y - p| that counts as a perfect fit
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            max_iterations: 100,
            tolerance: 1e-8,
            separation_tolerance: 1e-6,
        }
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_separation_tolerance(mut self, tol: f64) -> Self {
        self.separation_tolerance = tol;
        self
    }

    fn design(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if !self.fit_intercept {
            return Ok(x.to_owned());
        }

        let ones = Array2::<f64>::ones((x.nrows(), 1));
        concatenate(Axis(1), &[ones.view(), x.view()]).map_err(|e| StatsError::invalid_dimensions(e.to_string()))
    }

    pub fn fit_logistic(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LogisticFit> {
        if x.nrows() != y.len() {
            return Err(StatsError::invalid_dimensions(format!(
                "predictor rows ({}) != outcome len ({})",
                x.nrows(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(StatsError::model_fit("no rows to fit"));
        }

        let design = self.design(x)?;
        let mut beta = Array1::<f64>::zeros(design.ncols());
        let mut prev_deviance = f64::INFINITY;

        for iteration in 0..self.max_iterations {
            let mu = design.dot(&beta).mapv(sigmoid);

            let worst_residual = y
                .iter()
                .zip(mu.iter())
                .map(|(&yi, &mi)| (yi - mi).abs())
                .fold(0.0, f64::max);
            if worst_residual < self.separation_tolerance {
                return Err(StatsError::perfect_separation(format!(
                    "fitted probabilities reproduce the outcome after {} iterations",
                    iteration
                )));
            }

            let deviance: f64 = -2.0
                * y.iter()
                    .zip(mu.iter())
                    .map(|(&yi, &mi)| {
                        yi * mi.max(f64::MIN_POSITIVE).ln()
                            + (1.0 - yi) * (1.0 - mi).max(f64::MIN_POSITIVE).ln()
                    })
                    .sum::<f64>();

            if (deviance - prev_deviance).abs() / (deviance.abs() + 0.1) < self.tolerance {
                return Ok(self.finish(beta, true, iteration));
            }
            prev_deviance = deviance;

            let weights = mu.mapv(|m| m * (1.0 - m));
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let information = design.t().dot(&weighted);
            let score = design.t().dot(&(&y - &mu));

            let step = solve_linear_system(&information, &score).map_err(|_| {
                StatsError::model_fit("information matrix is singular - collinear predictors?")
            })?;
            beta += &step;

            if beta.iter().any(|b| !b.is_finite()) {
                return Err(StatsError::model_fit("coefficients are no longer finite"));
            }
        }

        warn!(
            iterations = self.max_iterations,
            "logistic regression did not converge, returning last iterate"
        );
        Ok(self.finish(beta, false, self.max_iterations))
    }

    fn finish(&self, beta: Array1<f64>, converged: bool, iterations: usize) -> LogisticFit {
        let (intercept, coefficients) = if self.fit_intercept {
            (beta[0], beta.slice(ndarray::s![1..]).to_owned())
        } else {
            (0.0, beta)
        };

        LogisticFit { coefficients, intercept, converged, iterations }
    }
}

impl Classifier for LogisticRegression {
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn FittedClassifier>> {
        Ok(Box::new(self.fit_logistic(x, y)?))
    }
}

#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub converged: bool,
    pub iterations: usize,
}

impl LogisticFit {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(StatsError::invalid_dimensions(format!(
                "feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

impl FittedClassifier for LogisticFit {
    /// the GLM mean, i.e. the probability
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.linear_predictor(x)?.mapv(sigmoid))
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct Constant(f64);

    impl FittedClassifier for Constant {
        fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.0))
        }
    }

    fn overlapping_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((8, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_logistic_fit_converges() {
        let (x, y) = overlapping_data();
        let fit = LogisticRegression::new().fit_logistic(x.view(), y.view()).unwrap();

        assert!(fit.converged);
        assert!(fit.coefficients[0] > 0.0);

        // score equations: residuals sum to zero with an intercept
        let p = fit.predict(x.view()).unwrap();
        assert_relative_eq!((&y - &p).sum(), 0.0, epsilon = 1e-6);
        assert_relative_eq!((&y - &p).dot(&x.column(0)), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_design_prepends_intercept_column() {
        let x = array![[2.0, 3.0], [4.0, 5.0]];

        let with_intercept = LogisticRegression::new().design(x.view()).unwrap();
        assert_eq!(with_intercept, array![[1.0, 2.0, 3.0], [1.0, 4.0, 5.0]]);

        let without = LogisticRegression::new().with_intercept(false).design(x.view()).unwrap();
        assert_eq!(without, x);
    }

    #[test]
    fn test_intercept_only_matches_base_rate() {
        let x = Array2::zeros((4, 0));
        let y = array![1.0, 0.0, 0.0, 0.0];
        let fit = LogisticRegression::new().fit_logistic(x.view(), y.view()).unwrap();

        assert_relative_eq!(sigmoid(fit.intercept), 0.25, epsilon = 1e-8);
    }

    #[test]
    fn test_perfect_separation_detected() {
        let x = Array2::from_shape_vec((6, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let err = LogisticRegression::new().fit(x.view(), y.view()).unwrap_err();

        assert!(err.is_perfect_separation());
    }

    #[test]
    fn test_collinear_predictors_fail() {
        let x = Array2::from_shape_vec((6, 2), vec![
            1.0, 2.0,
            2.0, 4.0,
            3.0, 6.0,
            4.0, 8.0,
            5.0, 10.0,
            6.0, 12.0,
        ]).unwrap();
        let y = array![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let err = LogisticRegression::new().fit(x.view(), y.view()).unwrap_err();

        assert!(matches!(err, StatsError::ModelFit { .. }));
    }

    #[test]
    fn test_fitted_model_picks_source_once() {
        let (x, y) = overlapping_data();
        let logistic = FittedModel::new(LogisticRegression::new().fit(x.view(), y.view()).unwrap());
        assert_eq!(logistic.source(), ProbabilitySource::Probability);

        let raw = FittedModel::new(Box::new(Constant(0.3)));
        assert_eq!(raw.source(), ProbabilitySource::RawPrediction);
        assert_eq!(raw.predicted_probability(x.view()).unwrap()[0], 0.3);
        assert!(raw.inner().predict_proba(x.view()).is_err());
    }
}
