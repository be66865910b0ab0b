use efficacy_roc::{
    compare_predictor_sets, compute_roc, lasso_var_select, CrossValidator, Dataset, LassoSelector,
    LogisticRegression, RocSummary,
};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn generate_cohort(n_samples: usize, seed: u64) -> efficacy_roc::Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut titer = Vec::with_capacity(n_samples);
    let mut age = Vec::with_capacity(n_samples);
    let mut bmi = Vec::with_capacity(n_samples);
    let mut protected = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let t: f64 = rng.gen_range(0.0..4.0);
        let a: f64 = rng.gen_range(-1.0..1.0);
        // bmi is recorded for most but not all participants
        let b = if rng.r#gen::<f64>() < 0.9 { Some(rng.gen_range(-1.0..1.0)) } else { None };

        let linear_pred = 1.5 * (t - 2.0) - 0.5 * a;
        let p = 1.0 / (1.0 + (-linear_pred).exp());

        titer.push(Some(t));
        age.push(Some(a));
        bmi.push(b);
        protected.push(Some(if rng.r#gen::<f64>() < p { 1.0 } else { 0.0 }));
    }

    Dataset::with_rows(n_samples)
        .with_column("protected", protected)?
        .with_column("titer", titer)?
        .with_column("age", age)?
        .with_column("bmi", bmi)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "efficacy_roc=info".into()),
        )
        .init();

    println!("Cross-validated ROC - Correlates of Protection Example");
    println!("======================================================\n");

    let data = generate_cohort(300, 110820)?;
    let logistic = LogisticRegression::new();

    // Example 1: in-sample ROC
    let single = compute_roc(&data, &logistic, "protected", &["titer"])?;
    println!("Single fit:      {}", single.label("titer"));

    // Example 2: 10-fold and leave-one-out
    let k_fold = CrossValidator::k_fold(10).compute(&data, &logistic, "protected", &["titer", "age"])?;
    println!("10-fold CV:      {} ({} of {} folds)",
             k_fold.label("titer + age"), k_fold.completed_folds, k_fold.n_folds);

    let loo = CrossValidator::leave_one_out().compute(&data, &logistic, "protected", &["titer", "age"])?;
    println!("Leave-one-out:   {}", loo.label("titer + age"));
    println!();

    // Example 3: several predictor sets, ready for plotting
    println!("Predictor sets (10-fold CV):");
    let sets = vec![
        vec!["titer".to_string()],
        vec!["age".to_string()],
        vec!["titer".to_string(), "age".to_string(), "bmi".to_string()],
    ];
    let validator = CrossValidator::k_fold(10);
    for curve in compare_predictor_sets(&sets, None, |predictors| {
        validator.compute(&data, &logistic, "protected", predictors)
    })? {
        println!("  - {}", curve.label);
    }
    println!();

    // Example 4: lasso selection
    println!("Lasso selection (5-fold penalty search):");
    let selection = lasso_var_select(
        &data,
        "protected",
        &["titer", "age", "bmi"],
        &LassoSelector::new().with_folds(5),
    )?;
    println!("  alpha = {:.4}", selection.alpha);
    println!("  kept: {}", selection.selected.join(", "));
    println!("  {}", selection.label("lasso"));

    Ok(())
}
