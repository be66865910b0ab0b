//! ROC analysis of a single fit on the complete-case rows, plus the shared
//! result types the resampled and lasso variants report through.

use std::collections::BTreeMap;

use ndarray::Array1;
use tracing::warn;
use crate::{
    classifier::{Classifier, FittedModel},
    data::{Dataset, DesignMatrix, RowId},
    error::{StatsError, Result},
    metrics::{accuracy, pin_endpoints, roc_curve, trapezoid_auc},
};

/// ROC curve (fpr, tpr) with its area and the accuracy at a 0.5 threshold
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: f64,
    pub accuracy: f64,
}

impl RocCurve {
    /// curve reported when the outcome is perfectly predicted
    pub fn perfect() -> Self {
        Self {
            fpr: vec![0.0, 0.0, 0.0, 0.0, 1.0],
            tpr: vec![0.0, 1.0, 1.0, 1.0, 1.0],
            auc: 1.0,
            accuracy: 1.0,
        }
    }
}

/// predicted probability per row id, ascending by id
///
/// Ids seen more than once (e.g. a row held out by several folds) keep the
/// mean of their predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictedProbabilities {
    values: BTreeMap<RowId, f64>,
}

impl PredictedProbabilities {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (RowId, f64)>) -> Self {
        let mut sums: BTreeMap<RowId, (f64, usize)> = BTreeMap::new();
        for (id, p) in pairs {
            let entry = sums.entry(id).or_insert((0.0, 0));
            entry.0 += p;
            entry.1 += 1;
        }

        Self {
            values: sums
                .into_iter()
                .map(|(id, (sum, count))| (id, sum / count as f64))
                .collect(),
        }
    }

    pub fn get(&self, id: RowId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, f64)> + '_ {
        self.values.iter().map(|(&id, &p)| (id, p))
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.values().copied().collect()
    }
}

/// anything that reports a ROC curve & knows whether it is a clean result
pub trait RocSummary {
    fn curve(&self) -> &RocCurve;

    /// false when the numbers come from a fallback path
    fn success(&self) -> bool;

    /// legend text, e.g. `"age + bmi (AUC = 0.87; ACC = 0.81)"`
    fn label(&self, name: &str) -> String {
        let star = if self.success() { "" } else { "*" };
        format!(
            "{} (AUC{} = {:.2}; ACC{} = {:.2})",
            name,
            star,
            self.curve().auc,
            star,
            self.curve().accuracy
        )
    }
}

/// classifier fit once on every complete row
#[derive(Debug)]
pub struct SingleFitRoc {
    pub curve: RocCurve,
    /// `None` when the fit hit perfect separation
    pub model: Option<FittedModel>,
    pub probabilities: PredictedProbabilities,
}

impl RocSummary for SingleFitRoc {
    fn curve(&self) -> &RocCurve {
        &self.curve
    }

    fn success(&self) -> bool {
        self.model.is_some()
    }
}

/// fit `classifier`, turning perfect separation into `Ok(None)`
pub(crate) fn fit_or_separate<C: Classifier + ?Sized>(
    design: &DesignMatrix,
    classifier: &C,
) -> Result<Option<FittedModel>> {
    match classifier.fit(design.predictors(), design.outcome()) {
        Ok(inner) => Ok(Some(FittedModel::new(inner))),
        Err(e) if e.is_perfect_separation() => {
            warn!(
                outcome = design.outcome_name(),
                n = design.n_samples(),
                predictors = design.n_features(),
                "perfect separation, outcome is fully predicted"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// curve, AUC & accuracy of `probability` against the design's outcome
pub(crate) fn score_probabilities(design: &DesignMatrix, probability: &Array1<f64>) -> Result<RocCurve> {
    let points = roc_curve(design.outcome(), probability.view())?;
    let auc = trapezoid_auc(&points.fpr, &points.tpr)?;
    let acc = accuracy(design.outcome(), probability.view())?;

    let mut tpr = points.tpr;
    pin_endpoints(&mut tpr);

    Ok(RocCurve { fpr: points.fpr, tpr, auc, accuracy: acc })
}

pub(crate) fn row_probabilities(design: &DesignMatrix, probability: &Array1<f64>) -> PredictedProbabilities {
    PredictedProbabilities::from_pairs(design.row_ids().iter().copied().zip(probability.iter().copied()))
}

/// single-fit ROC on an already assembled design matrix
pub fn fit_roc<C: Classifier + ?Sized>(design: &DesignMatrix, classifier: &C) -> Result<SingleFitRoc> {
    match fit_or_separate(design, classifier)? {
        Some(model) => {
            let probability = model.predicted_probability(design.predictors())?;
            Ok(SingleFitRoc {
                curve: score_probabilities(design, &probability)?,
                probabilities: row_probabilities(design, &probability),
                model: Some(model),
            })
        }
        None => Ok(SingleFitRoc {
            curve: RocCurve::perfect(),
            model: None,
            probabilities: row_probabilities(design, &design.outcome().to_owned()),
        }),
    }
}

/// fit `classifier` on the complete rows of `outcome` ~ `predictors` and
/// report its in-sample ROC curve
pub fn compute_roc<C: Classifier + ?Sized, S: AsRef<str>>(
    data: &Dataset,
    classifier: &C,
    outcome: &str,
    predictors: &[S],
) -> Result<SingleFitRoc> {
    let design = data.complete_cases(outcome, predictors)?;
    fit_roc(&design, classifier)
}

/// a labelled curve, ready for a plotting collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledCurve {
    pub label: String,
    pub curve: RocCurve,
    pub success: bool,
}

/// run one ROC routine per predictor set
///
/// `labels` defaults to the predictors joined by `" + "`.
pub fn compare_predictor_sets<R, F>(
    predictor_sets: &[Vec<String>],
    labels: Option<&[String]>,
    mut roc_fn: F,
) -> Result<Vec<LabelledCurve>>
where
    R: RocSummary,
    F: FnMut(&[String]) -> Result<R>,
{
    if let Some(labels) = labels {
        if labels.len() != predictor_sets.len() {
            return Err(StatsError::invalid_dimensions(format!(
                "{} labels for {} predictor sets",
                labels.len(),
                predictor_sets.len()
            )));
        }
    }

    predictor_sets
        .iter()
        .enumerate()
        .map(|(i, predictors)| {
            let result = roc_fn(predictors)?;
            let name = match labels {
                Some(labels) => labels[i].clone(),
                None => predictors.join(" + "),
            };

            Ok(LabelledCurve {
                label: result.label(&name),
                curve: result.curve().clone(),
                success: result.success(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LogisticRegression;
    use approx::assert_relative_eq;

    fn overlapping() -> Dataset {
        Dataset::new(vec![10, 11, 12, 13, 14, 15, 16, 17, 18])
            .unwrap()
            .with_values("disease", vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0])
            .unwrap()
            .with_column("age", vec![
                Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0),
                Some(6.0), Some(7.0), Some(8.0), None,
            ])
            .unwrap()
    }

    #[test]
    fn test_single_fit_drops_missing_rows() {
        let roc = compute_roc(&overlapping(), &LogisticRegression::new(), "disease", &["age"]).unwrap();

        assert!(roc.model.is_some());
        assert_eq!(roc.probabilities.len(), 8);
        assert!(roc.probabilities.get(18).is_none());
        assert!((0.0..=1.0).contains(&roc.curve.auc));
        assert!(roc.curve.auc > 0.5);
        assert_eq!(roc.curve.tpr[0], 0.0);
        assert_eq!(*roc.curve.tpr.last().unwrap(), 1.0);
        assert_eq!(roc.curve.fpr[0], 0.0);
        assert_eq!(*roc.curve.fpr.last().unwrap(), 1.0);
    }

    #[test]
    fn test_perfect_separation_is_recovered() {
        let data = Dataset::with_rows(6)
            .with_values("disease", vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
            .unwrap()
            .with_values("age", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let roc = compute_roc(&data, &LogisticRegression::new(), "disease", &["age"]).unwrap();

        assert!(roc.model.is_none());
        assert_eq!(roc.curve, RocCurve::perfect());
        assert_eq!(roc.probabilities.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_relative_eq!(trapezoid_auc(&roc.curve.fpr, &roc.curve.tpr).unwrap(), 1.0);
    }

    #[test]
    fn test_other_fit_failures_propagate() {
        let data = Dataset::with_rows(6)
            .with_values("disease", vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0])
            .unwrap()
            .with_values("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .with_values("b", vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0])
            .unwrap();
        let result = compute_roc(&data, &LogisticRegression::new(), "disease", &["a", "b"]);
        assert!(matches!(result, Err(StatsError::ModelFit { .. })));
    }

    #[test]
    fn test_duplicate_ids_are_averaged() {
        let probs = PredictedProbabilities::from_pairs(vec![(3, 0.2), (1, 0.5), (3, 0.4)]);

        assert_eq!(probs.len(), 2);
        assert_relative_eq!(probs.get(3).unwrap(), 0.3, epsilon = 1e-12);
        assert_eq!(probs.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_labels_star_fallback_results() {
        let clean = compute_roc(&overlapping(), &LogisticRegression::new(), "disease", &["age"]).unwrap();
        let label = clean.label("age");
        assert!(label.starts_with("age (AUC = "));
        assert!(label.contains("; ACC = "));

        let fallback = SingleFitRoc {
            curve: RocCurve::perfect(),
            model: None,
            probabilities: PredictedProbabilities::default(),
        };
        assert_eq!(fallback.label("x"), "x (AUC* = 1.00; ACC* = 1.00)");
    }

    #[test]
    fn test_compare_predictor_sets_default_labels() {
        let data = overlapping()
            .with_values("noise", vec![0.3, 0.1, 0.4, 0.1, 0.5, 0.9, 0.2, 0.6, 0.5])
            .unwrap();
        let sets = vec![vec!["age".to_string()], vec!["age".to_string(), "noise".to_string()]];

        let curves = compare_predictor_sets(&sets, None, |predictors| {
            compute_roc(&data, &LogisticRegression::new(), "disease", predictors)
        })
        .unwrap();

        assert_eq!(curves.len(), 2);
        assert!(curves[0].label.starts_with("age (AUC"));
        assert!(curves[1].label.starts_with("age + noise (AUC"));

        let bad_labels = vec!["only one".to_string()];
        let result = compare_predictor_sets(&sets, Some(&bad_labels), |predictors| {
            compute_roc(&data, &LogisticRegression::new(), "disease", predictors)
        });
        assert!(result.is_err());
    }
}
