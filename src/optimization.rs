use ndarray::{Array1, Array2, ArrayView2};
use crate::{
    data::SurvivalData,
    error::{StatsError, Result},
};

/// Configuration for the Cox partial-likelihood fit
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub max_step_halvings: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
            max_step_halvings: 20,
        }
    }
}

/// Where Newton-Raphson ended up
#[derive(Debug, Clone)]
pub struct NewtonSolution {
    pub coefficients: Array1<f64>,
    /// observed information (negative Hessian of the penalized log-likelihood)
    pub information: Array2<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
}

pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Newton-Raphson on the Breslow partial likelihood w/ step halving
    pub fn optimize(&self, data: &SurvivalData) -> Result<NewtonSolution> {
        if data.n_events() == 0 {
            return Err(StatsError::model_fit("no events - partial likelihood is flat"));
        }

        let covariates = data.centered_covariates();
        let n_features = data.n_features();
        let mut beta = Array1::zeros(n_features);

        let (mut loglik, mut gradient, mut hessian) =
            self.penalized_derivatives(data, covariates.view(), &beta)?;

        for iteration in 0..self.config.max_iterations {
            let information = -&hessian;
            let step = solve_linear_system(&information, &gradient).map_err(|_| {
                StatsError::model_fit("information matrix is singular - collinear covariates?")
            })?;

            // halve the step until the likelihood stops getting worse
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..=self.config.max_step_halvings {
                let candidate = &beta + &(scale * &step);
                if let Ok(derivs) = self.penalized_derivatives(data, covariates.view(), &candidate) {
                    if derivs.0.is_finite() && derivs.0 >= loglik - self.config.tolerance {
                        accepted = Some((candidate, derivs));
                        break;
                    }
                }
                scale *= 0.5;
            }

            let Some((candidate, (new_loglik, new_gradient, new_hessian))) = accepted else {
                return Err(StatsError::model_fit("step halving could not improve the likelihood"));
            };

            let change = (new_loglik - loglik).abs();
            let largest_step = step.iter().fold(0.0_f64, |m, s| m.max((scale * s).abs()));
            beta = candidate;
            loglik = new_loglik;
            gradient = new_gradient;
            hessian = new_hessian;

            if beta.iter().any(|b| !b.is_finite() || b.abs() > 50.0) {
                return Err(StatsError::model_fit(
                    "coefficients diverging - likelihood may be monotone",
                ));
            }

            // a flat likelihood alone is not convergence: beta may still be drifting off
            if change < self.config.tolerance && largest_step < self.config.tolerance.sqrt() {
                return Ok(NewtonSolution {
                    coefficients: beta,
                    information: -&hessian,
                    log_likelihood: loglik,
                    iterations: iteration + 1,
                });
            }
        }

        Err(StatsError::model_fit(format!(
            "Newton-Raphson failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }

    fn penalized_derivatives(
        &self,
        data: &SurvivalData,
        covariates: ArrayView2<f64>,
        beta: &Array1<f64>,
    ) -> Result<(f64, Array1<f64>, Array2<f64>)> {
        let (loglik, mut gradient, mut hessian) = likelihood_derivatives(data, covariates, beta)?;

        if self.config.l2_penalty > 0.0 {
            gradient = &gradient - &(self.config.l2_penalty * beta);
            for i in 0..beta.len() {
                hessian[[i, i]] -= self.config.l2_penalty;
            }
            return Ok((loglik - 0.5 * self.config.l2_penalty * beta.dot(beta), gradient, hessian));
        }

        Ok((loglik, gradient, hessian))
    }
}

/// log partial likelihood w/ gradient & Hessian (Breslow ties)
pub fn likelihood_derivatives(
    data: &SurvivalData,
    covariates: ArrayView2<f64>,
    beta: &Array1<f64>,
) -> Result<(f64, Array1<f64>, Array2<f64>)> {
    let n_features = covariates.ncols();
    let linear_pred = covariates.dot(beta);

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut hessian = Array2::zeros((n_features, n_features));

    for (risk_set, failures) in data.risk_sets().iter().zip(data.failures()) {
        if failures.is_empty() || risk_set.is_empty() {
            continue;
        }

        // shift by the max so exp() can't overflow
        let max_pred = risk_set
            .iter()
            .map(|&i| linear_pred[i])
            .fold(f64::NEG_INFINITY, f64::max);

        let mut risk_sum = 0.0;
        let mut weighted_sum = Array1::<f64>::zeros(n_features);
        let mut weighted_outer = Array2::<f64>::zeros((n_features, n_features));

        for &i in risk_set {
            let weight = (linear_pred[i] - max_pred).exp();
            let row = covariates.row(i);
            risk_sum += weight;
            weighted_sum.scaled_add(weight, &row);
            for j in 0..n_features {
                for k in 0..n_features {
                    weighted_outer[[j, k]] += weight * row[j] * row[k];
                }
            }
        }

        if risk_sum <= 0.0 || !risk_sum.is_finite() {
            return Err(StatsError::numerical_error("risk set sum is non-positive"));
        }

        let log_sum = max_pred + risk_sum.ln();
        let mean = &weighted_sum / risk_sum;
        let mut variance = weighted_outer / risk_sum;
        for j in 0..n_features {
            for k in 0..n_features {
                variance[[j, k]] -= mean[j] * mean[k];
            }
        }

        let d = failures.len() as f64;
        for &i in failures {
            loglik += linear_pred[i] - log_sum;
            gradient += &covariates.row(i);
        }
        gradient.scaled_add(-d, &mean);
        hessian.scaled_add(-d, &variance);
    }

    Ok((loglik, gradient, hessian))
}

/// Solve Ax = b by Gaussian elimination w/ partial pivoting
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(StatsError::invalid_dimensions("matrix dimensions mismatch"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);

    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a_copy[[max_row, i]].abs() < 1e-12 * scale {
            return Err(StatsError::numerical_error("matrix is singular"));
        }

        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Invert a square matrix one column at a time
pub(crate) fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut inverse = Array2::zeros((n, n));

    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        let column = solve_linear_system(a, &unit)?;
        inverse.column_mut(j).assign(&column);
    }

    Ok(inverse)
}
