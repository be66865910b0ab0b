//! Treatment efficacy: TE = 1 - RR from attack rates, or 1 - HR from a
//! proportional-hazards fit.

use tracing::debug;
use crate::{
    contingency::{ContingencyTable, ExactTest, FisherExact},
    data::{binary_value, Dataset},
    error::{StatsError, Result},
    model::{CoxModel, HazardsModel},
};

/// 97.5th percentile of the standard normal, rounded as in the usual 95% Wald interval
const Z_95: f64 = 1.96;

/// point estimate, 95% interval (low <= high) and p-value for H0: no effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficacyEstimate {
    pub point_estimate: f64,
    pub confidence_interval: (f64, f64),
    pub p_value: f64,
}

impl EfficacyEstimate {
    /// 1 - x maps an increasing bound to a decreasing one; always hand back (low, high)
    fn new(point_estimate: f64, bound1: f64, bound2: f64, p_value: f64) -> Self {
        Self {
            point_estimate,
            confidence_interval: (bound1.min(bound2), bound1.max(bound2)),
            p_value,
        }
    }
}

/// treatment x event table over rows where both are present
pub fn efficacy_table(data: &Dataset, treatment_col: &str, event_col: &str) -> Result<ContingencyTable> {
    let treatment = data.column(treatment_col)?;
    let event = data.column(event_col)?;

    let pairs = treatment
        .iter()
        .zip(event)
        .filter_map(|(t, e)| Some((t.as_ref()?, e.as_ref()?)))
        .map(|(&t, &e)| Ok((binary_value(t, treatment_col)?, binary_value(e, event_col)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ContingencyTable::from_pairs(pairs))
}

/// efficacy from attack rates in a 2x2 table w/ a log-RR Wald interval
pub fn efficacy_from_table<T: ExactTest + ?Sized>(table: &ContingencyTable, test: &T) -> Result<EfficacyEstimate> {
    let ContingencyTable { a, b, c, d } = *table;

    if a == 0 || a + b == 0 || c == 0 || c + d == 0 {
        return Err(StatsError::invalid_table(format!(
            "relative risk undefined for a={}, b={}, c={}, d={}",
            a, b, c, d
        )));
    }

    let (a, b, c, d) = (a as f64, b as f64, c as f64, d as f64);
    let rr = (a / (a + b)) / (c / (c + d));
    let se = (b / (a * (a + b)) + d / (c * (c + d))).sqrt();

    let log_rr = rr.ln();
    let upper = 1.0 - (log_rr - Z_95 * se).exp();
    let lower = 1.0 - (log_rr + Z_95 * se).exp();

    let p_value = test.exact_test(table)?.p_value;

    debug!(rr, se, p_value, "efficacy from cumulative incidence");

    Ok(EfficacyEstimate::new(1.0 - rr, lower, upper, p_value))
}

/// treatment efficacy from cumulative incidence, p-value from the given exact test
pub fn estimate_efficacy_ci_with<T: ExactTest + ?Sized>(
    data: &Dataset,
    treatment_col: &str,
    event_col: &str,
    test: &T,
) -> Result<EfficacyEstimate> {
    let table = efficacy_table(data, treatment_col, event_col)?;
    efficacy_from_table(&table, test)
}

/// treatment efficacy from cumulative incidence w/ Fisher's exact p-value
pub fn estimate_efficacy_ci(data: &Dataset, treatment_col: &str, event_col: &str) -> Result<EfficacyEstimate> {
    estimate_efficacy_ci_with(data, treatment_col, event_col, &FisherExact::new())
}

/// treatment efficacy as 1 - exp(coef) from a proportional-hazards fit
pub fn estimate_efficacy_ph_with<H: HazardsModel + ?Sized, S: AsRef<str>>(
    data: &Dataset,
    treatment_col: &str,
    duration_col: &str,
    event_col: &str,
    covariates: &[S],
    model: &H,
) -> Result<EfficacyEstimate> {
    let mut names = vec![treatment_col.to_string()];
    names.extend(covariates.iter().map(|c| c.as_ref().to_string()));

    let survival = data.survival_data(duration_col, event_col, &names)?;
    let summary = model.fit_hazards(&survival, &names)?;
    let treatment = summary.get(treatment_col)?;

    debug!(
        coef = treatment.coefficient,
        se = treatment.standard_error,
        n = survival.n_samples(),
        events = survival.n_events(),
        "efficacy from proportional hazards"
    );

    Ok(EfficacyEstimate::new(
        1.0 - treatment.coefficient.exp(),
        1.0 - treatment.upper_bound.exp(),
        1.0 - treatment.lower_bound.exp(),
        treatment.p_value,
    ))
}

/// treatment efficacy from an unpenalized Cox model
pub fn estimate_efficacy_ph<S: AsRef<str>>(
    data: &Dataset,
    treatment_col: &str,
    duration_col: &str,
    event_col: &str,
    covariates: &[S],
) -> Result<EfficacyEstimate> {
    estimate_efficacy_ph_with(data, treatment_col, duration_col, event_col, covariates, &CoxModel::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contingency::ExactTestResult;
    use crate::data::SurvivalData;
    use crate::model::{CovariateEstimate, HazardsSummary};
    use approx::assert_relative_eq;

    /// rows for a table a/b/c/d of (treated, event)
    fn dataset_from_counts(a: usize, b: usize, c: usize, d: usize) -> Dataset {
        let mut treated = Vec::new();
        let mut event = Vec::new();
        for (t, e, n) in [(1.0, 1.0, a), (1.0, 0.0, b), (0.0, 1.0, c), (0.0, 0.0, d)] {
            treated.extend(std::iter::repeat(Some(t)).take(n));
            event.extend(std::iter::repeat(Some(e)).take(n));
        }

        Dataset::with_rows(treated.len())
            .with_column("treated", treated)
            .unwrap()
            .with_column("disease", event)
            .unwrap()
    }

    struct FixedPValue(f64);

    impl ExactTest for FixedPValue {
        fn exact_test(&self, _table: &ContingencyTable) -> Result<ExactTestResult> {
            Ok(ExactTestResult { odds_ratio: 1.0, p_value: self.0 })
        }
    }

    struct FixedHazards {
        lower: f64,
        upper: f64,
    }

    impl HazardsModel for FixedHazards {
        fn fit_hazards(&self, _data: &SurvivalData, names: &[String]) -> Result<HazardsSummary> {
            Ok(HazardsSummary {
                covariates: vec![CovariateEstimate {
                    name: names[0].clone(),
                    coefficient: -0.5,
                    standard_error: 0.2,
                    lower_bound: self.lower,
                    upper_bound: self.upper,
                    p_value: 0.01,
                }],
                confidence_level: 0.95,
            })
        }
    }

    #[test]
    fn test_harmful_treatment() {
        let data = dataset_from_counts(8, 2, 4, 6);
        let est = estimate_efficacy_ci_with(&data, "treated", "disease", &FixedPValue(0.17)).unwrap();

        // RR = 0.8 / 0.4 = 2
        assert_relative_eq!(est.point_estimate, -1.0, epsilon = 1e-12);

        let se = (0.025f64 + 0.15).sqrt();
        assert_relative_eq!(se, 0.41833, epsilon = 1e-5);
        let (low, high) = est.confidence_interval;
        assert_relative_eq!(low, 1.0 - (2f64.ln() + 1.96 * se).exp(), epsilon = 1e-12);
        assert_relative_eq!(high, 1.0 - (2f64.ln() - 1.96 * se).exp(), epsilon = 1e-12);
        assert!(low < est.point_estimate && est.point_estimate < high);
        assert_eq!(est.p_value, 0.17);
    }

    #[test]
    fn test_protective_treatment_with_fisher() {
        let data = dataset_from_counts(2, 48, 10, 40);
        let est = estimate_efficacy_ci(&data, "treated", "disease").unwrap();

        assert_relative_eq!(est.point_estimate, 0.8, epsilon = 1e-12);
        assert!(est.confidence_interval.0 <= est.confidence_interval.1);
        assert!(est.confidence_interval.1 < 1.0);
        assert!(est.p_value > 0.0 && est.p_value < 0.05);
    }

    #[test]
    fn test_missing_rows_are_skipped() {
        let data = Dataset::with_rows(6)
            .with_column("treated", vec![Some(1.0), Some(1.0), None, Some(0.0), Some(0.0), Some(1.0)])
            .unwrap()
            .with_column("disease", vec![Some(1.0), Some(0.0), Some(1.0), Some(1.0), Some(0.0), None])
            .unwrap();

        let table = efficacy_table(&data, "treated", "disease").unwrap();
        assert_eq!(table, ContingencyTable::new(1, 1, 1, 1));
        assert_eq!(table.total(), 4);
    }

    #[test]
    fn test_degenerate_table() {
        let data = dataset_from_counts(0, 10, 4, 6);
        assert!(matches!(
            estimate_efficacy_ci(&data, "treated", "disease"),
            Err(StatsError::InvalidTable { .. })
        ));

        let data = dataset_from_counts(3, 7, 0, 10);
        assert!(matches!(
            estimate_efficacy_ci(&data, "treated", "disease"),
            Err(StatsError::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_non_binary_treatment() {
        let data = Dataset::with_rows(2)
            .with_values("treated", vec![2.0, 0.0])
            .unwrap()
            .with_values("disease", vec![1.0, 0.0])
            .unwrap();
        assert!(matches!(
            estimate_efficacy_ci(&data, "treated", "disease"),
            Err(StatsError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_ph_interval_sorted_even_if_bounds_swapped() {
        let data = Dataset::with_rows(3)
            .with_values("treated", vec![1.0, 0.0, 1.0])
            .unwrap()
            .with_values("time", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_values("disease", vec![1.0, 1.0, 0.0])
            .unwrap();

        let covars: [&str; 0] = [];
        for (lower, upper) in [(-0.9, -0.1), (-0.1, -0.9)] {
            let est = estimate_efficacy_ph_with(
                &data, "treated", "time", "disease", &covars, &FixedHazards { lower, upper },
            )
            .unwrap();

            assert_relative_eq!(est.point_estimate, 1.0 - (-0.5f64).exp(), epsilon = 1e-12);
            assert_relative_eq!(est.confidence_interval.0, 1.0 - (-0.1f64).exp(), epsilon = 1e-12);
            assert_relative_eq!(est.confidence_interval.1, 1.0 - (-0.9f64).exp(), epsilon = 1e-12);
            assert_eq!(est.p_value, 0.01);
        }
    }

    #[test]
    fn test_ph_no_events_among_treated_is_fit_error() {
        let data = Dataset::with_rows(8)
            .with_values("treated", vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap()
            .with_values("time", vec![2.0, 4.0, 6.0, 8.0, 1.0, 3.0, 5.0, 7.0])
            .unwrap()
            .with_values("disease", vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0])
            .unwrap();

        let covars: [&str; 0] = [];
        assert!(matches!(
            estimate_efficacy_ph(&data, "treated", "time", "disease", &covars),
            Err(StatsError::ModelFit { .. })
        ));
    }

    #[test]
    fn test_ph_missing_treatment_column() {
        let data = Dataset::with_rows(2)
            .with_values("time", vec![1.0, 2.0])
            .unwrap()
            .with_values("disease", vec![1.0, 0.0])
            .unwrap();
        let covars: [&str; 0] = [];
        assert!(matches!(
            estimate_efficacy_ph(&data, "treated", "time", "disease", &covars),
            Err(StatsError::MissingColumn { .. })
        ));
    }
}
