use efficacy_roc::{
    compare_predictor_sets, compute_cv_roc, compute_loo_roc, compute_roc, estimate_efficacy_ci,
    estimate_efficacy_ph, lasso_var_select, roc_stats,
    classifier::{Classifier, FittedClassifier},
    metrics::{interp, linspace, pin_endpoints},
    CrossValidator, Dataset, LassoSelector, LogisticRegression, RocSummary, StatsError,
};
use ndarray::{ArrayView1, ArrayView2};
use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// binary outcome driven by `signal`, plus an unrelated `noise` column
fn create_diagnostic_data(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut signal = Vec::with_capacity(n_samples);
    let mut noise = Vec::with_capacity(n_samples);
    let mut disease = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let x: f64 = rng.gen_range(-2.0..2.0);
        let p = sigmoid(1.2 * x);
        signal.push(x);
        noise.push(rng.gen_range(-1.0..1.0));
        disease.push(if rng.r#gen::<f64>() < p { 1.0 } else { 0.0 });
    }

    Dataset::with_rows(n_samples)
        .with_values("disease", disease).unwrap()
        .with_values("signal", signal).unwrap()
        .with_values("noise", noise).unwrap()
}

/// half treated, treatment halves the hazard
fn create_trial_data(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut treated = Vec::with_capacity(n_samples);
    let mut age = Vec::with_capacity(n_samples);
    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let t = (i % 2) as f64;
        let a: f64 = rng.gen_range(-1.0..1.0);
        let hazard = 0.2 * (2f64.ln() * -t + 0.3 * a).exp();
        let time = -rng.r#gen::<f64>().ln() / hazard;
        let censoring_time = rng.gen_range(2.0..10.0);

        treated.push(t);
        age.push(a);
        if time < censoring_time {
            times.push(time);
            events.push(1.0);
        } else {
            times.push(censoring_time);
            events.push(0.0);
        }
    }

    Dataset::with_rows(n_samples)
        .with_values("treated", treated).unwrap()
        .with_values("age", age).unwrap()
        .with_values("time", times).unwrap()
        .with_values("infected", events).unwrap()
}

/// perfect separation on anything but the complete data
struct SeparatesOnFolds {
    full_rows: usize,
}

impl Classifier for SeparatesOnFolds {
    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> efficacy_roc::Result<Box<dyn FittedClassifier>> {
        if y.len() < self.full_rows {
            return Err(StatsError::perfect_separation("fold"));
        }
        LogisticRegression::new().fit(x, y)
    }
}

#[test]
fn test_roc_stats_balanced_example() {
    let stats = roc_stats(&[1.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 1.0, 0.0]).unwrap();

    assert_eq!((stats.table.a, stats.table.b, stats.table.c, stats.table.d), (1, 1, 1, 1));
    assert_relative_eq!(stats.sensitivity, 0.5);
    assert_relative_eq!(stats.specificity, 0.5);
    assert_relative_eq!(stats.ppv, 0.5);
    assert_relative_eq!(stats.npv, 0.5);
    assert_relative_eq!(stats.accuracy, 0.5);
}

#[test]
fn test_efficacy_from_attack_rates() {
    // 10% attack rate when treated, 30% otherwise
    let n = 400;
    let treated: Vec<f64> = (0..n).map(|i| (i < n / 2) as u8 as f64).collect();
    let infected: Vec<f64> = (0..n)
        .map(|i| {
            let within = i % (n / 2);
            let rate = if i < n / 2 { 10 } else { 30 };
            (within % 100 < rate) as u8 as f64
        })
        .collect();

    let data = Dataset::with_rows(n)
        .with_values("treated", treated).unwrap()
        .with_values("infected", infected).unwrap();

    let est = estimate_efficacy_ci(&data, "treated", "infected").unwrap();

    assert_relative_eq!(est.point_estimate, 1.0 - 0.1 / 0.3, epsilon = 1e-12);
    let (low, high) = est.confidence_interval;
    assert!(low < est.point_estimate && est.point_estimate < high);
    assert!(high < 1.0);
    assert!(est.p_value < 0.001);
}

#[test]
fn test_efficacy_from_proportional_hazards() {
    let data = create_trial_data(300, 42);

    let est = estimate_efficacy_ph(&data, "treated", "time", "infected", &["age"]).unwrap();

    assert!(est.point_estimate > 0.2 && est.point_estimate < 0.8, "TE = {}", est.point_estimate);
    let (low, high) = est.confidence_interval;
    assert!(low <= est.point_estimate && est.point_estimate <= high);
    assert!(est.p_value < 0.05);

    let no_covariates: [&str; 0] = [];
    let crude = estimate_efficacy_ph(&data, "treated", "time", "infected", &no_covariates).unwrap();
    assert!(crude.point_estimate > 0.0);
}

#[test]
fn test_single_fit_roc() {
    let data = create_diagnostic_data(150, 7);
    let roc = compute_roc(&data, &LogisticRegression::new(), "disease", &["signal"]).unwrap();

    assert!(roc.model.is_some());
    assert!(roc.curve.auc > 0.6 && roc.curve.auc <= 1.0);
    assert_eq!(roc.curve.tpr[0], 0.0);
    assert_eq!(*roc.curve.tpr.last().unwrap(), 1.0);
    assert_eq!(roc.probabilities.len(), 150);
    assert!(roc.probabilities.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));
}

#[test]
fn test_k_fold_roc_completes_every_fold() {
    let data = create_diagnostic_data(200, 11);
    let roc = compute_cv_roc(&data, &LogisticRegression::new(), "disease", &["signal", "noise"], 10).unwrap();

    assert!(roc.success);
    assert_eq!(roc.completed_folds, 10);
    assert_eq!(roc.folds.len(), 10);
    assert_eq!(roc.probabilities.len(), 200);

    assert_eq!(roc.curve.fpr.len(), 100);
    assert_eq!(roc.curve.fpr[0], 0.0);
    assert_eq!(roc.curve.fpr[99], 1.0);
    assert_eq!(roc.curve.tpr[0], 0.0);
    assert_eq!(roc.curve.tpr[99], 1.0);
    assert!(roc.curve.auc > 0.6);

    // same seed, same folds, same answer
    let again = compute_cv_roc(&data, &LogisticRegression::new(), "disease", &["signal", "noise"], 10).unwrap();
    assert_eq!(roc.curve, again.curve);
}

#[test]
fn test_k_fold_roc_degrades_on_failed_folds() {
    let data = create_diagnostic_data(60, 3);
    let roc = compute_cv_roc(&data, &SeparatesOnFolds { full_rows: 60 }, "disease", &["signal"], 5).unwrap();

    assert!(!roc.success);
    assert_eq!(roc.completed_folds, 0);

    let whole = compute_roc(&data, &LogisticRegression::new(), "disease", &["signal"]).unwrap();
    let grid = linspace(0.0, 1.0, 100);
    let mut expected = interp(&grid, &whole.curve.fpr, &whole.curve.tpr).unwrap();
    pin_endpoints(&mut expected);

    assert_eq!(roc.curve.tpr, expected);
    assert_relative_eq!(roc.curve.auc, whole.curve.auc, epsilon = 1e-12);
    assert!(roc.label("signal").contains("AUC*"));
}

#[test]
fn test_leave_one_out_on_separable_data() {
    let data = Dataset::with_rows(10)
        .with_values("disease", vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap()
        .with_values("signal", vec![0.1, 0.5, 0.9, 1.3, 1.7, 2.1, 2.5, 2.9, 3.3, 3.7]).unwrap();

    let roc = compute_loo_roc(&data, &LogisticRegression::new(), "disease", &["signal"]).unwrap();

    assert!(!roc.success);
    assert_eq!(roc.curve.accuracy, 1.0);
    assert_eq!(roc.curve.auc, 1.0);
    assert_eq!(roc.completed_folds, 0);
    assert!(roc.fold_models().all(|m| m.is_none()));
}

#[test]
fn test_leave_one_out_roc() {
    let data = create_diagnostic_data(50, 19);
    let roc = compute_loo_roc(&data, &LogisticRegression::new(), "disease", &["signal"]).unwrap();

    assert!(roc.success);
    assert_eq!(roc.n_folds, 50);
    assert_eq!(roc.probabilities.len(), 50);
    assert_eq!(roc.curve.tpr[0], 0.0);
    assert_eq!(*roc.curve.tpr.last().unwrap(), 1.0);
    assert!((0.0..=1.0).contains(&roc.curve.accuracy));
}

#[test]
fn test_missing_values_shrink_the_analysis_set() {
    let data = create_diagnostic_data(40, 5)
        .with_column("partial", (0..40).map(|i| if i % 4 == 0 { None } else { Some(i as f64 % 3.0) }).collect())
        .unwrap();

    let roc = CrossValidator::k_fold(3)
        .compute(&data, &LogisticRegression::new(), "disease", &["signal", "partial"])
        .unwrap();

    assert_eq!(roc.probabilities.len(), 30);
    assert!(roc.probabilities.get(0).is_none());
}

#[test]
fn test_lasso_keeps_the_signal() {
    let data = create_diagnostic_data(150, 23);

    let selection = lasso_var_select(&data, "disease", &["signal", "noise"], &LassoSelector::new().with_folds(5)).unwrap();
    assert!(selection.selected.contains(&"signal".to_string()));
    assert!(selection.alpha > 0.0);
    assert!(selection.curve.auc > 0.6);

    let fixed = lasso_var_select(&data, "disease", &["signal", "noise"], &LassoSelector::new().with_alpha(0.02)).unwrap();
    assert_eq!(fixed.alpha, 0.02);
}

#[test]
fn test_compare_predictor_sets() {
    let data = create_diagnostic_data(120, 31);
    let sets = vec![
        vec!["signal".to_string()],
        vec!["noise".to_string()],
        vec!["signal".to_string(), "noise".to_string()],
    ];

    let curves = compare_predictor_sets(&sets, None, |predictors| {
        compute_cv_roc(&data, &LogisticRegression::new(), "disease", predictors, 5)
    })
    .unwrap();

    assert_eq!(curves.len(), 3);
    assert!(curves[2].label.starts_with("signal + noise (AUC = "));
    assert!(curves[0].curve.auc > curves[1].curve.auc);
}

#[test]
fn test_errors_surface_to_the_caller() {
    let data = create_diagnostic_data(20, 1);

    assert!(matches!(
        compute_roc(&data, &LogisticRegression::new(), "disease", &["missing"]),
        Err(StatsError::MissingColumn { .. })
    ));
    assert!(matches!(
        compute_cv_roc(&data, &LogisticRegression::new(), "disease", &["signal"], 1),
        Err(StatsError::InvalidParameter { .. })
    ));
    assert!(matches!(
        roc_stats(&[1.0, 0.0, 1.0], &[1.0, 1.0, 1.0]),
        Err(StatsError::DivisionUndefined { .. })
    ));
}
