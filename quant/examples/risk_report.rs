//! End-to-end risk report example
//!
//! Fits stochastic models to a synthetic index, simulates scenarios from the
//! best fit, and prints VaR, tail, copula and stress results.
//!
//! Run with: RUST_LOG=ag_quant=debug cargo run --example risk_report

use ag_quant::copula::select_copula;
use ag_quant::models::select_model;
use ag_quant::simulation::simulate_scenarios;
use ag_quant::stress::{StressTestEngine, StressVariable};
use ag_quant::tail::analyze_tail;
use ag_quant::var::VarEngine;
use ag_quant::EngineConfig;
use chrono::{Duration, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Risk Report Example ===\n");

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/default.yaml");
    let config = EngineConfig::from_yaml(&std::fs::read_to_string(path)?)?;

    // 1. Two correlated synthetic price series (two years of trading days)
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).single().ok_or("bad start date")?;
    let (mut index, mut rates) = (100.0, 50.0);
    let mut index_pairs = Vec::new();
    let mut rates_pairs = Vec::new();
    for i in 0..504 {
        let t = i as f64;
        let shock = (t * 0.37).sin() * 0.012 + (t * 1.91).cos() * 0.006;
        index *= 1.0 + 0.0003 + shock;
        rates *= 1.0 + 0.6 * shock + (t * 2.53).sin() * 0.004;
        let ts = start + Duration::days(i);
        index_pairs.push((ts, index));
        rates_pairs.push((ts, rates));
    }
    let index = config.models.series("index", index_pairs)?;
    let rates = config.models.series("rates", rates_pairs)?;

    // 2. Model selection
    let selection = select_model(&index, &config.models.models)?;
    println!("Model ranking for '{}':", selection.series_name);
    for ranked in &selection.ranking {
        println!(
            "  {}. {:<20} AIC {:>10.2}  BIC {:>10.2}",
            ranked.rank,
            ranked.fit.kind().to_string(),
            ranked.fit.aic,
            ranked.fit.bic
        );
    }
    for failure in &selection.failures {
        println!("  dropped {}: {}", failure.kind, failure.reason);
    }
    println!();

    // 3. Scenario VaR from the best fit
    let best = selection.best().ok_or("no model could be fitted")?;
    let last = *index.values().last().ok_or("empty series")?;
    let scenarios = simulate_scenarios(best, last, &config.simulation)?;
    let report = VarEngine::new(config.var.clone()).analyze(&scenarios)?;
    println!("Scenario risk ({} paths, best model {}):", scenarios.n_scenarios(), best.kind());
    for estimate in &report.estimates {
        println!(
            "  {:>5.1}%  VaR {:>7.4}%  ES {:>7.4}%  parametric VaR {:>7.4}%",
            estimate.confidence_level * 100.0,
            estimate.historical_var * 100.0,
            estimate.expected_shortfall * 100.0,
            estimate.parametric_var * 100.0
        );
    }
    println!("  Stress VaR(99%): {:.4}%", report.stress_var * 100.0);
    println!();

    // 4. Tail risk of daily returns
    let returns = index.simple_returns();
    let tail = analyze_tail(&returns, &config.tail)?;
    println!("Tail analysis ({:?} tail):", tail.side);
    println!("  Hill shape: {:.4}  Pickands shape: {:.4}", tail.hill_shape, tail.pickands_shape);
    println!(
        "  GPD: threshold {:.4}, shape {:.4}, scale {:.4} ({} exceedances)",
        tail.gpd.threshold, tail.gpd.shape, tail.gpd.scale, tail.gpd.n_exceedances
    );
    println!();

    // 5. Dependence between the two series
    let copulas = select_copula(
        &returns,
        &rates.simple_returns(),
        &config.copulas.families,
        config.copulas.student_t_df,
    )?;
    if let Some(fit) = copulas.best() {
        println!(
            "Best copula: {} (tau {:.3}, tail dependence {:?})",
            fit.family(),
            copulas.kendall_tau,
            copulas.dependence
        );
    }
    println!();

    // 6. Stress scenarios on a 30% event probability
    let engine = StressTestEngine::from_config(&config.stress);
    let variables = vec![
        StressVariable::new("equities", 0.2),
        StressVariable::new("interest rates", 0.1),
    ];
    let stress = engine.run(0.30, &variables)?;
    println!("Stress scenarios (base 30.0%):");
    for result in &stress.results {
        println!(
            "  {:<25} {:>5.1}%  ({:+.1}%)",
            result.scenario,
            result.stressed_probability * 100.0,
            result.delta_pct
        );
    }
    println!("  Worst: {} at {:.1}%", stress.worst_scenario, stress.worst_probability * 100.0);

    println!("\nFull VaR report as JSON:");
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
