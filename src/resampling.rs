//! Cross-validated ROC: k-fold with a fixed shuffle seed, or leave-one-out.
//!
//! A k-fold run only counts as cross-validated when every fold fits. If any
//! fold hits perfect separation the fold results are dropped and the run falls
//! back to a single fit on the complete rows, flagged with `success = false`.
//! Leave-one-out instead borrows the complete-data prediction for a row whose
//! fold cannot be fit, and skips the folds entirely when the complete-data fit
//! itself separates.

use ndarray::Array1;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, warn};
use crate::{
    classifier::{Classifier, FittedModel},
    data::{Dataset, DesignMatrix},
    error::{StatsError, Result},
    metrics::{accuracy, interp, linspace, pin_endpoints, roc_curve, trapezoid_auc},
    roc::{fit_or_separate, fit_roc, row_probabilities, PredictedProbabilities, RocCurve, RocSummary},
};

#[derive(Debug, Clone)]
pub struct ResamplingConfig {
    pub n_folds: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// points on the shared false-positive-rate grid
    pub grid_points: usize,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            n_folds: 10,
            shuffle: true,
            seed: 110820,
            grid_points: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplingScheme {
    KFold,
    LeaveOneOut,
}

/// one train/test partition, as row positions in the design matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// what one fold left behind
#[derive(Debug)]
pub struct FoldResult {
    pub fold_idx: usize,
    /// `None` when the fold could not be fit
    pub model: Option<FittedModel>,
    /// held-out predictions (borrowed ones included)
    pub probabilities: PredictedProbabilities,
}

impl FoldResult {
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

/// outcome of a resampled ROC run
#[derive(Debug)]
pub struct ResampledRoc {
    /// on the fixed fpr grid
    pub curve: RocCurve,
    pub folds: Vec<FoldResult>,
    /// out-of-fold prediction per row id
    pub probabilities: PredictedProbabilities,
    /// true when the full resampling protocol completed
    pub success: bool,
    pub completed_folds: usize,
    pub n_folds: usize,
}

impl ResampledRoc {
    pub fn fold_models(&self) -> impl Iterator<Item = Option<&FittedModel>> + '_ {
        self.folds.iter().map(|f| f.model.as_ref())
    }
}

impl RocSummary for ResampledRoc {
    fn curve(&self) -> &RocCurve {
        &self.curve
    }

    fn success(&self) -> bool {
        self.success
    }
}

#[derive(Debug, Clone)]
pub struct CrossValidator {
    scheme: ResamplingScheme,
    config: ResamplingConfig,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self {
            scheme: ResamplingScheme::KFold,
            config: ResamplingConfig::default(),
        }
    }
}

impl CrossValidator {
    pub fn k_fold(n_folds: usize) -> Self {
        let mut validator = Self::default();
        validator.config.n_folds = n_folds;
        validator
    }

    pub fn leave_one_out() -> Self {
        Self {
            scheme: ResamplingScheme::LeaveOneOut,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    pub fn with_grid_points(mut self, grid_points: usize) -> Self {
        self.config.grid_points = grid_points;
        self
    }

    pub fn scheme(&self) -> ResamplingScheme {
        self.scheme
    }

    pub fn config(&self) -> &ResamplingConfig {
        &self.config
    }

    /// train/test partitions over `n_samples` rows
    pub fn splits(&self, n_samples: usize) -> Result<Vec<FoldSplit>> {
        match self.scheme {
            ResamplingScheme::KFold => self.k_fold_splits(n_samples),
            ResamplingScheme::LeaveOneOut => self.leave_one_out_splits(n_samples),
        }
    }

    fn k_fold_splits(&self, n_samples: usize) -> Result<Vec<FoldSplit>> {
        let n_folds = self.config.n_folds;
        if n_folds < 2 {
            return Err(StatsError::invalid_parameter("n_folds", n_folds.to_string()));
        }
        if n_samples < n_folds {
            return Err(StatsError::invalid_dimensions(format!(
                "n_samples ({}) must be >= n_folds ({})",
                n_samples, n_folds
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            indices.shuffle(&mut rng);
        }

        // the first n % k folds take one extra row
        let base = n_samples / n_folds;
        let remainder = n_samples % n_folds;

        let mut splits = Vec::with_capacity(n_folds);
        let mut current = 0;
        for fold_idx in 0..n_folds {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(&indices[current + fold_size..])
                .copied()
                .collect();

            splits.push(FoldSplit { train_indices, test_indices, fold_idx });
            current += fold_size;
        }

        Ok(splits)
    }

    fn leave_one_out_splits(&self, n_samples: usize) -> Result<Vec<FoldSplit>> {
        if n_samples < 2 {
            return Err(StatsError::invalid_dimensions(format!(
                "leave-one-out needs at least 2 rows, got {}",
                n_samples
            )));
        }

        Ok((0..n_samples)
            .map(|i| FoldSplit {
                train_indices: (0..n_samples).filter(|&j| j != i).collect(),
                test_indices: vec![i],
                fold_idx: i,
            })
            .collect())
    }

    fn grid(&self) -> Result<Vec<f64>> {
        if self.config.grid_points < 2 {
            return Err(StatsError::invalid_parameter("grid_points", self.config.grid_points.to_string()));
        }
        Ok(linspace(0.0, 1.0, self.config.grid_points))
    }

    /// resampled ROC of `classifier` on the complete rows of `outcome` ~ `predictors`
    pub fn compute<C: Classifier + ?Sized, S: AsRef<str>>(
        &self,
        data: &Dataset,
        classifier: &C,
        outcome: &str,
        predictors: &[S],
    ) -> Result<ResampledRoc> {
        let design = data.complete_cases(outcome, predictors)?;
        self.run(&design, classifier)
    }

    pub fn run<C: Classifier + ?Sized>(&self, design: &DesignMatrix, classifier: &C) -> Result<ResampledRoc> {
        match self.scheme {
            ResamplingScheme::KFold => self.run_k_fold(design, classifier),
            ResamplingScheme::LeaveOneOut => self.run_leave_one_out(design, classifier),
        }
    }

    fn run_k_fold<C: Classifier + ?Sized>(&self, design: &DesignMatrix, classifier: &C) -> Result<ResampledRoc> {
        let grid = self.grid()?;
        let splits = self.splits(design.n_samples())?;
        let n_folds = splits.len();

        let mut tpr_sum = vec![0.0; grid.len()];
        let mut n_curves = 0usize;
        let mut accuracy_sum = 0.0;
        let mut folds = Vec::with_capacity(n_folds);

        for split in &splits {
            let fold = split.fold_idx;
            let train = design.subset(&split.train_indices)?;
            let test = design.subset(&split.test_indices)?;

            let Some(model) = fit_or_separate(&train, classifier)? else {
                debug!(fold, "fold could not be fit");
                continue;
            };

            let probability = model.predicted_probability(test.predictors())?;
            match roc_curve(test.outcome(), probability.view()) {
                Ok(points) => {
                    let tpr = interp(&grid, &points.fpr, &points.tpr)?;
                    tpr_sum.iter_mut().zip(tpr).for_each(|(sum, t)| *sum += t);
                    n_curves += 1;
                }
                Err(StatsError::SingleClass { .. }) => {
                    debug!(fold, "held-out rows are a single class, no curve for this fold");
                }
                Err(e) => return Err(e),
            }

            let fold_accuracy = accuracy(test.outcome(), probability.view())?;
            accuracy_sum += fold_accuracy;
            debug!(fold, n_test = test.n_samples(), accuracy = fold_accuracy, "fold complete");

            folds.push(FoldResult {
                fold_idx: fold,
                probabilities: row_probabilities(&test, &probability),
                model: Some(model),
            });
        }

        let completed = folds.len();
        if completed < n_folds || n_curves == 0 {
            warn!(completed, n_folds, "ROC: did not finish all folds");
            return self.whole_data_fallback(design, classifier, &grid, completed, n_folds);
        }

        let mut mean_tpr: Vec<f64> = tpr_sum.iter().map(|sum| sum / n_curves as f64).collect();
        pin_endpoints(&mut mean_tpr);
        let auc = trapezoid_auc(&grid, &mean_tpr)?;

        let probabilities = PredictedProbabilities::from_pairs(folds.iter().flat_map(|f| f.probabilities.iter()));

        Ok(ResampledRoc {
            curve: RocCurve {
                fpr: grid,
                tpr: mean_tpr,
                auc,
                accuracy: accuracy_sum / completed as f64,
            },
            folds,
            probabilities,
            success: true,
            completed_folds: completed,
            n_folds,
        })
    }

    /// single fit on every row, reported on the grid and flagged unsuccessful
    fn whole_data_fallback<C: Classifier + ?Sized>(
        &self,
        design: &DesignMatrix,
        classifier: &C,
        grid: &[f64],
        completed_folds: usize,
        n_folds: usize,
    ) -> Result<ResampledRoc> {
        warn!(n = design.n_samples(), "returning metrics from fitting the complete dataset (no CV)");

        let whole = fit_roc(design, classifier)?;
        let mut tpr = interp(grid, &whole.curve.fpr, &whole.curve.tpr)?;
        pin_endpoints(&mut tpr);

        Ok(ResampledRoc {
            curve: RocCurve {
                fpr: grid.to_vec(),
                tpr,
                auc: whole.curve.auc,
                accuracy: whole.curve.accuracy,
            },
            probabilities: whole.probabilities.clone(),
            folds: vec![FoldResult {
                fold_idx: 0,
                model: whole.model,
                probabilities: whole.probabilities,
            }],
            success: false,
            completed_folds,
            n_folds,
        })
    }

    fn run_leave_one_out<C: Classifier + ?Sized>(&self, design: &DesignMatrix, classifier: &C) -> Result<ResampledRoc> {
        let grid = self.grid()?;
        let splits = self.splits(design.n_samples())?;
        let n_folds = splits.len();

        let Some(whole_model) = fit_or_separate(design, classifier)? else {
            warn!(n = n_folds, "complete dataset separates perfectly, skipping leave-one-out folds");
            return self.separated_leave_one_out(design, &grid);
        };
        let whole_probability = whole_model.predicted_probability(design.predictors())?;

        let mut probability = Array1::<f64>::zeros(n_folds);
        let mut folds = Vec::with_capacity(n_folds);

        for split in &splits {
            let row = split.fold_idx;
            let train = design.subset(&split.train_indices)?;
            let test = design.subset(&split.test_indices)?;

            let model = fit_or_separate(&train, classifier)?;
            let p = match &model {
                Some(model) => model
                    .predicted_probability(test.predictors())?
                    .get(0)
                    .copied()
                    .ok_or_else(|| StatsError::numerical_error("no prediction for held-out row"))?,
                None => {
                    debug!(row, "borrowing the complete-data prediction");
                    whole_probability[row]
                }
            };

            probability[row] = p;
            folds.push(FoldResult {
                fold_idx: row,
                model,
                probabilities: PredictedProbabilities::from_pairs([(design.row_ids()[row], p)]),
            });
        }

        let points = roc_curve(design.outcome(), probability.view())?;
        let auc = trapezoid_auc(&points.fpr, &points.tpr)?;
        let acc = accuracy(design.outcome(), probability.view())?;

        let mut tpr = interp(&grid, &points.fpr, &points.tpr)?;
        pin_endpoints(&mut tpr);

        let completed = folds.iter().filter(|f| f.is_fitted()).count();
        debug!(completed, n_folds, auc, "leave-one-out complete");

        Ok(ResampledRoc {
            curve: RocCurve { fpr: grid, tpr, auc, accuracy: acc },
            folds,
            probabilities: row_probabilities(design, &probability),
            success: true,
            completed_folds: completed,
            n_folds,
        })
    }

    /// leave-one-out result when the outcome is perfectly predicted
    fn separated_leave_one_out(&self, design: &DesignMatrix, grid: &[f64]) -> Result<ResampledRoc> {
        let outcome = design.outcome().to_owned();
        let points = roc_curve(outcome.view(), outcome.view())?;
        let mut tpr = interp(grid, &points.fpr, &points.tpr)?;
        pin_endpoints(&mut tpr);

        let folds = design
            .row_ids()
            .iter()
            .zip(outcome.iter())
            .enumerate()
            .map(|(i, (&id, &y))| FoldResult {
                fold_idx: i,
                model: None,
                probabilities: PredictedProbabilities::from_pairs([(id, y)]),
            })
            .collect();

        Ok(ResampledRoc {
            curve: RocCurve {
                fpr: grid.to_vec(),
                tpr,
                auc: 1.0,
                accuracy: 1.0,
            },
            folds,
            probabilities: row_probabilities(design, &outcome),
            success: false,
            completed_folds: 0,
            n_folds: design.n_samples(),
        })
    }
}

/// k-fold ROC w/ the default shuffle seed and a 100-point grid
pub fn compute_cv_roc<C: Classifier + ?Sized, S: AsRef<str>>(
    data: &Dataset,
    classifier: &C,
    outcome: &str,
    predictors: &[S],
    n_folds: usize,
) -> Result<ResampledRoc> {
    CrossValidator::k_fold(n_folds).compute(data, classifier, outcome, predictors)
}

/// leave-one-out ROC on a 100-point grid
pub fn compute_loo_roc<C: Classifier + ?Sized, S: AsRef<str>>(
    data: &Dataset,
    classifier: &C,
    outcome: &str,
    predictors: &[S],
) -> Result<ResampledRoc> {
    CrossValidator::leave_one_out().compute(data, classifier, outcome, predictors)
}
