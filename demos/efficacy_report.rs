use efficacy_roc::{
    contingency::ContingencyStats, efficacy::efficacy_table, estimate_efficacy_ci, estimate_efficacy_ph,
    CoxModel, Dataset, HazardsModel,
};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn generate_trial(n_participants: usize, seed: u64) -> efficacy_roc::Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut vaccinated = Vec::with_capacity(n_participants);
    let mut age = Vec::with_capacity(n_participants);
    let mut days = Vec::with_capacity(n_participants);
    let mut infected = Vec::with_capacity(n_participants);

    for i in 0..n_participants {
        let v = (i % 2) as f64;
        let a: f64 = rng.gen_range(18.0..80.0);

        // vaccine cuts the hazard by 60%, older participants are at higher risk
        let hazard = 0.004 * (0.4f64.ln() * v + 0.01 * (a - 50.0)).exp();
        let time = -rng.r#gen::<f64>().ln() / hazard;
        let follow_up = rng.gen_range(90.0..180.0);

        vaccinated.push(v);
        age.push(a);
        days.push(time.min(follow_up));
        infected.push(if time < follow_up { 1.0 } else { 0.0 });
    }

    Dataset::with_rows(n_participants)
        .with_values("vaccinated", vaccinated)?
        .with_values("age", age)?
        .with_values("days", days)?
        .with_values("infected", infected)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "efficacy_roc=info".into()),
        )
        .init();

    println!("Treatment Efficacy - Vaccine Trial Example");
    println!("==========================================\n");

    let data = generate_trial(1000, 2020)?;

    let table = efficacy_table(&data, "vaccinated", "infected")?;
    println!("Attack rates:");
    println!("  - vaccinated:   {}/{}", table.a, table.a + table.b);
    println!("  - unvaccinated: {}/{}", table.c, table.c + table.d);
    println!();

    // Example 1: cumulative incidence
    println!("Example 1: Efficacy from cumulative incidence");
    println!("---------------------------------------------");
    let ci = estimate_efficacy_ci(&data, "vaccinated", "infected")?;
    println!("  TE = {:.3}  95% CI [{:.3}, {:.3}]  p = {:.2e}",
             ci.point_estimate, ci.confidence_interval.0, ci.confidence_interval.1, ci.p_value);
    println!();

    // Example 2: proportional hazards, adjusted for age
    println!("Example 2: Efficacy from a Cox model (adjusted for age)");
    println!("-------------------------------------------------------");
    let ph = estimate_efficacy_ph(&data, "vaccinated", "days", "infected", &["age"])?;
    println!("  TE = {:.3}  95% CI [{:.3}, {:.3}]  p = {:.2e}",
             ph.point_estimate, ph.confidence_interval.0, ph.confidence_interval.1, ph.p_value);
    println!();

    let names = vec!["vaccinated".to_string(), "age".to_string()];
    let survival = data.survival_data("days", "infected", &names)?;
    CoxModel::new().fit_hazards(&survival, &names)?.print();
    println!();

    // Example 3: vaccination status as a "test" for staying uninfected
    println!("Example 3: 2x2 statistics");
    println!("-------------------------");
    match ContingencyStats::from_table(table) {
        Ok(stats) => stats.print(),
        Err(e) => println!("  statistics undefined: {}", e),
    }

    Ok(())
}
