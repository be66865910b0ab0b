use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use statrs::distribution::{ContinuousCDF, Normal};
use crate::{
    data::SurvivalData,
    error::{StatsError, Result},
    optimization::{invert_matrix, CoxOptimizer, OptimizationConfig},
};

/// anything that fits a proportional-hazards model & reports per-covariate inference
pub trait HazardsModel {
    /// fit on `data`; `covariate_names` labels the covariate columns in order
    fn fit_hazards(&self, data: &SurvivalData, covariate_names: &[String]) -> Result<HazardsSummary>;
}

/// cox proportional hazards model, Breslow ties, optional ridge penalty
#[derive(Debug, Clone)]
pub struct CoxModel {
    coefficients: Option<Array1<f64>>,  // fitted coefficients
    information: Option<Array2<f64>>,   // observed information at the optimum
    l2_penalty: f64,                    // ridge penalty
    max_iterations: usize,              // newton iteration limit
    tolerance: f64,                     // log-likelihood change threshold
    confidence_level: f64,              // for wald intervals
    feature_names: Option<Vec<String>>, // optional feature labels
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            coefficients: None,
            information: None,
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
            confidence_level: 0.95,
            feature_names: None,
        }
    }
}

impl CoxModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// add ridge penalty (L2) - shrinks coefficients
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
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

    /// level of the reported wald intervals, e.g. 0.95
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(StatsError::invalid_parameter(
                "confidence_level",
                self.confidence_level.to_string(),
            ));
        }

        if let Some(names) = &self.feature_names {
            if names.len() != data.n_features() {
                return Err(StatsError::invalid_dimensions(format!(
                    "{} feature names for {} covariates",
                    names.len(),
                    data.n_features()
                )));
            }
        }

        let config = OptimizationConfig {
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ..Default::default()
        };

        let solution = CoxOptimizer::new(config).optimize(data)?;
        let covariance = invert_matrix(&solution.information)
            .map_err(|_| StatsError::model_fit("information matrix is not invertible"))?;

        // an almost flat likelihood ridge leaves the fit numerically converged but meaningless
        for (coef, variance) in solution.coefficients.iter().zip(covariance.diag()) {
            let se = variance.max(0.0).sqrt();
            if !se.is_finite() || se > 1e3 * (1.0 + coef.abs()) {
                return Err(StatsError::model_fit(format!(
                    "standard error {:.3e} for coefficient {:.3}; likelihood is nearly flat",
                    se, coef
                )));
            }
        }

        self.coefficients = Some(solution.coefficients);
        self.information = Some(solution.information);

        Ok(self)
    }

    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        match &self.coefficients {
            Some(coefs) => Ok(coefs.view()),
            None => Err(StatsError::ModelNotFitted),
        }
    }

    /// standard errors from the inverse observed information
    pub fn standard_errors(&self) -> Result<Array1<f64>> {
        let information = self.information.as_ref().ok_or(StatsError::ModelNotFitted)?;
        let covariance = invert_matrix(information)
            .map_err(|_| StatsError::model_fit("information matrix is not invertible"))?;

        Ok(covariance.diag().mapv(|v| v.max(0.0).sqrt()))
    }

    /// linear predictor x'beta for new rows
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(StatsError::invalid_dimensions(format!(
                "feature count mismatch: expected {}, got {}",
                coefs.len(),
                covariates.ncols()
            )));
        }

        Ok(covariates.dot(&coefs))
    }

    /// exp of the linear predictor
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict(covariates)?.mapv(f64::exp))
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// coefficient table w/ wald intervals & p-values
    pub fn summary(&self) -> Result<HazardsSummary> {
        let coefs = self.coefficients()?;
        let standard_errors = self.standard_errors()?;

        let normal = Normal::new(0.0, 1.0).map_err(|e| StatsError::numerical_error(e.to_string()))?;
        let z_crit = normal.inverse_cdf(1.0 - (1.0 - self.confidence_level) / 2.0);

        let rows = coefs
            .iter()
            .zip(standard_errors.iter())
            .enumerate()
            .map(|(i, (&coef, &se))| {
                let name = self
                    .feature_names
                    .as_ref()
                    .and_then(|names| names.get(i).cloned())
                    .unwrap_or_else(|| format!("x{}", i));
                let z = coef / se;

                CovariateEstimate {
                    name,
                    coefficient: coef,
                    standard_error: se,
                    lower_bound: coef - z_crit * se,
                    upper_bound: coef + z_crit * se,
                    p_value: 2.0 * (1.0 - normal.cdf(z.abs())),
                }
            })
            .collect();

        Ok(HazardsSummary {
            covariates: rows,
            confidence_level: self.confidence_level,
        })
    }
}

impl HazardsModel for CoxModel {
    fn fit_hazards(&self, data: &SurvivalData, covariate_names: &[String]) -> Result<HazardsSummary> {
        let mut model = self.clone().with_feature_names(covariate_names.to_vec());
        model.fit(data)?;
        model.summary()
    }
}

/// one row of the coefficient table
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateEstimate {
    pub name: String,
    pub coefficient: f64,    // log hazard ratio
    pub standard_error: f64,
    pub lower_bound: f64,    // wald interval on the coefficient
    pub upper_bound: f64,
    pub p_value: f64,        // two-sided wald test of coef = 0
}

impl CovariateEstimate {
    pub fn hazard_ratio(&self) -> f64 {
        self.coefficient.exp()
    }
}

/// what the hazards model learned, indexed by covariate name
#[derive(Debug, Clone)]
pub struct HazardsSummary {
    pub covariates: Vec<CovariateEstimate>,
    pub confidence_level: f64,
}

impl HazardsSummary {
    pub fn get(&self, name: &str) -> Result<&CovariateEstimate> {
        self.covariates
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| StatsError::missing_column(name))
    }

    pub fn print(&self) {
        println!("proportional hazards model summary");
        println!("==================================");
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "covariate", "coef", "exp(coef)", "se", "lower", "upper", "p"
        );
        println!("{:-<82}", "");

        for c in &self.covariates {
            println!(
                "{:<16} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                c.name,
                c.coefficient,
                c.hazard_ratio(),
                c.standard_error,
                c.lower_bound,
                c.upper_bound,
                c.p_value
            );
        }
    }
}
