//! L1-penalized linear regression & predictor selection by lasso.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use tracing::debug;
use crate::{
    classifier::{Classifier, FittedClassifier, FittedModel},
    data::{Dataset, DesignMatrix},
    error::{StatsError, Result},
    resampling::CrossValidator,
    roc::{row_probabilities, PredictedProbabilities, RocCurve, RocSummary},
    metrics::{accuracy, roc_curve, trapezoid_auc},
};

/// fits a penalized linear model
pub trait PenalizedRegression {
    fn fit_penalized(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LassoFit>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LassoFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub alpha: f64,
    pub iterations: usize,
}

impl LassoFit {
    /// positions of the non-zero coefficients
    pub fn support(&self) -> Vec<usize> {
        self.coefficients
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != 0.0)
            .map(|(j, _)| j)
            .collect()
    }
}

impl FittedClassifier for LassoFit {
    /// linear prediction, not a probability
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
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

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

fn check_shapes(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
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
    Ok(())
}

/// column means of x & mean of y
fn centers(x: ArrayView2<f64>, y: ArrayView1<f64>) -> (Array1<f64>, f64) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    (x_mean, y.mean().unwrap_or(0.0))
}

/// penalty above which every coefficient is zero, on centered data
fn alpha_max(x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
    let (x_mean, y_mean) = centers(x, y);
    let xc = &x - &x_mean.insert_axis(Axis(0));
    let yc = &y - y_mean;

    xc.t().dot(&yc).iter().fold(0.0_f64, |m, v| m.max(v.abs())) / y.len() as f64
}

/// lasso w/ a fixed penalty
///
/// Minimizes `1/(2n) ||y - Xw - b||^2 + alpha ||w||_1` by cyclic coordinate
/// descent on centered data; the intercept is not penalized.
#[derive(Debug, Clone)]
pub struct LassoRegression {
    alpha: f64,
    max_iterations: usize,
    tolerance: f64, // max coefficient change per sweep
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

impl LassoRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
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

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl PenalizedRegression for LassoRegression {
    fn fit_penalized(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LassoFit> {
        check_shapes(x, y)?;
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(StatsError::invalid_parameter("alpha", self.alpha.to_string()));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();

        let (x_mean, y_mean) = centers(x, y);
        let xc = &x - &x_mean.view().insert_axis(Axis(0));
        let yc = &y - y_mean;

        let col_norms: Vec<f64> = (0..n_features).map(|j| xc.column(j).dot(&xc.column(j))).collect();
        let lambda = self.alpha * n_samples as f64;

        let mut w = Array1::<f64>::zeros(n_features);
        let mut residual = yc;
        let mut iterations = self.max_iterations;

        for iter in 0..self.max_iterations {
            let mut max_change = 0.0_f64;

            for j in 0..n_features {
                // constant column
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }

                let old = w[j];
                let rho = xc.column(j).dot(&residual) + col_norms[j] * old;
                let new = soft_threshold(rho, lambda) / col_norms[j];

                if new != old {
                    residual.scaled_add(old - new, &xc.column(j));
                    w[j] = new;
                    max_change = max_change.max((new - old).abs());
                }
            }

            if max_change < self.tolerance {
                iterations = iter + 1;
                break;
            }
        }

        if w.iter().any(|v| !v.is_finite()) {
            return Err(StatsError::numerical_error("lasso coefficients are not finite"));
        }

        let intercept = y_mean - w.dot(&x_mean);
        Ok(LassoFit { coefficients: w, intercept, alpha: self.alpha, iterations })
    }
}

impl Classifier for LassoRegression {
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn FittedClassifier>> {
        Ok(Box::new(self.fit_penalized(x, y)?))
    }
}

/// lasso w/ the penalty chosen by held-out mean squared error
///
/// Penalties run log-spaced from the smallest one that zeroes every
/// coefficient down to `eps` times that value. Splits are unshuffled k-fold
/// or leave-one-out; the winning penalty is refit on every row.
#[derive(Debug, Clone)]
pub struct LassoCv {
    validator: CrossValidator,
    n_alphas: usize,
    eps: f64,
    base: LassoRegression,
}

impl Default for LassoCv {
    fn default() -> Self {
        Self {
            validator: CrossValidator::k_fold(5).with_shuffle(false),
            n_alphas: 100,
            eps: 1e-3,
            base: LassoRegression::new(),
        }
    }
}

impl LassoCv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.validator = CrossValidator::k_fold(n_folds).with_shuffle(false);
        self
    }

    pub fn leave_one_out(mut self) -> Self {
        self.validator = CrossValidator::leave_one_out();
        self
    }

    pub fn with_n_alphas(mut self, n_alphas: usize) -> Self {
        self.n_alphas = n_alphas;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.base = self.base.with_max_iterations(max_iter);
        self
    }

    /// candidate penalties, largest first
    pub fn alpha_path(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Vec<f64>> {
        check_shapes(x, y)?;
        if self.n_alphas == 0 {
            return Err(StatsError::invalid_parameter("n_alphas", "0"));
        }
        if !(self.eps > 0.0 && self.eps < 1.0) {
            return Err(StatsError::invalid_parameter("eps", self.eps.to_string()));
        }

        let top = alpha_max(x, y).max(f64::EPSILON);
        if self.n_alphas == 1 {
            return Ok(vec![top]);
        }

        let steps = (self.n_alphas - 1) as f64;
        Ok((0..self.n_alphas)
            .map(|i| top * self.eps.powf(i as f64 / steps))
            .collect())
    }

    /// penalty with the lowest mean held-out squared error
    pub fn select_alpha(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<f64> {
        let alphas = self.alpha_path(x, y)?;
        let splits = self.validator.splits(y.len())?;

        let mut best = (f64::INFINITY, alphas[0]);
        for &alpha in &alphas {
            let model = self.base.clone().with_alpha(alpha);

            let mut fold_mse = 0.0;
            for split in &splits {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                let x_test = x.select(Axis(0), &split.test_indices);
                let y_test = y.select(Axis(0), &split.test_indices);

                let fit = model.fit_penalized(x_train.view(), y_train.view())?;
                let prediction = fit.predict(x_test.view())?;
                fold_mse += (&y_test - &prediction).mapv(|r| r * r).mean().unwrap_or(0.0);
            }

            let mse = fold_mse / splits.len() as f64;
            // first minimum wins, i.e. the largest penalty on ties
            if mse < best.0 {
                best = (mse, alpha);
            }
        }

        debug!(alpha = best.1, mse = best.0, n_alphas = alphas.len(), "lasso penalty selected");
        Ok(best.1)
    }
}

impl PenalizedRegression for LassoCv {
    fn fit_penalized(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LassoFit> {
        let alpha = self.select_alpha(x, y)?;
        self.base.clone().with_alpha(alpha).fit_penalized(x, y)
    }
}

impl Classifier for LassoCv {
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Box<dyn FittedClassifier>> {
        Ok(Box::new(self.fit_penalized(x, y)?))
    }
}

/// lasso fit on the complete rows, scored as a classifier
#[derive(Debug)]
pub struct LassoSelection {
    /// raw curve from the full-data fit
    pub curve: RocCurve,
    pub model: FittedModel,
    pub probabilities: PredictedProbabilities,
    /// predictors with a non-zero coefficient, in input order
    pub selected: Vec<String>,
    pub alpha: f64,
}

impl RocSummary for LassoSelection {
    fn curve(&self) -> &RocCurve {
        &self.curve
    }

    fn success(&self) -> bool {
        true
    }
}

/// picks the lasso penalty (fixed, heuristic or resampled) and reports the
/// predictors that survive it
#[derive(Debug, Clone)]
pub struct LassoSelector {
    n_folds: usize,
    leave_one_out: bool,
    alpha: Option<f64>,
}

impl Default for LassoSelector {
    fn default() -> Self {
        Self {
            n_folds: 10,
            leave_one_out: false,
            alpha: None,
        }
    }
}

impl LassoSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1 disables the penalty search
    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_leave_one_out(mut self, leave_one_out: bool) -> Self {
        self.leave_one_out = leave_one_out;
        self
    }

    /// fixed penalty, skips the search
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// `max_j |sum_i x_ij y_i| / n` on the raw (uncentered) data
    pub fn default_alpha(x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        x.t().dot(&y).iter().fold(0.0_f64, |m, v| m.max(v.abs())) / y.len().max(1) as f64
    }

    fn regression(&self, design: &DesignMatrix) -> Box<dyn PenalizedRegression> {
        if self.n_folds == 1 || self.alpha.is_some() {
            let alpha = self
                .alpha
                .unwrap_or_else(|| Self::default_alpha(design.predictors(), design.outcome()));
            Box::new(LassoRegression::new().with_alpha(alpha))
        } else if self.leave_one_out {
            Box::new(LassoCv::new().leave_one_out())
        } else {
            Box::new(LassoCv::new().with_folds(self.n_folds))
        }
    }

    pub fn select(&self, design: &DesignMatrix) -> Result<LassoSelection> {
        let fit = self.regression(design).fit_penalized(design.predictors(), design.outcome())?;
        debug!(alpha = fit.alpha, n_selected = fit.support().len(), "lasso fit");

        let selected = fit
            .support()
            .into_iter()
            .map(|j| design.predictor_names()[j].clone())
            .collect();
        let alpha = fit.alpha;

        let model = FittedModel::new(Box::new(fit));
        let probability = model.predicted_probability(design.predictors())?;

        let points = roc_curve(design.outcome(), probability.view())?;
        let auc = trapezoid_auc(&points.fpr, &points.tpr)?;
        let acc = accuracy(design.outcome(), probability.view())?;

        Ok(LassoSelection {
            curve: RocCurve { fpr: points.fpr, tpr: points.tpr, auc, accuracy: acc },
            probabilities: row_probabilities(design, &probability),
            model,
            selected,
            alpha,
        })
    }
}

/// lasso variable selection on the complete rows of `outcome` ~ `predictors`
pub fn lasso_var_select<S: AsRef<str>>(
    data: &Dataset,
    outcome: &str,
    predictors: &[S],
    selector: &LassoSelector,
) -> Result<LassoSelection> {
    let design = data.complete_cases(outcome, predictors)?;
    selector.select(&design)
}
