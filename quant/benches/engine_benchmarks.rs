//! Benchmarks for the analytics engine
//!
//! Run with: cargo bench

use ag_quant::backtest::{self, Outcome, Prediction};
use ag_quant::contagion::{analyze_contagion, ContagionConfig};
use ag_quant::copula::{select_copula, CopulaFamily, DEFAULT_STUDENT_T_DF};
use ag_quant::correlation::{CorrelationMatrix, CorrelationMethod};
use ag_quant::models::{select_model, ModelKind};
use ag_quant::simulation::{simulate_scenarios, SimulationConfig};
use ag_quant::tail::{analyze_tail, TailConfig};
use ag_quant::var::VarEngine;
use ag_quant::{Frequency, TimeSeries};
use chrono::{Duration, TimeZone, Utc};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Analytics Engine Performance Benchmarks ===\n");

    benchmark_model_selection();
    benchmark_dependence();
    benchmark_tail_and_var();
    benchmark_backtest();
    benchmark_contagion();
}

fn noise(n: usize, seed: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let h = (i as f64 * 12.9898 + seed as f64 * 78.233).sin() * 43_758.545_3;
            h.fract().abs() - 0.5
        })
        .collect()
}

fn price_series(n: usize) -> TimeSeries {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut level = 100.0;
    let pairs = noise(n, 1)
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            level *= 1.0 + 0.0002 + 0.02 * e;
            (start + Duration::days(i as i64), level)
        })
        .collect();
    TimeSeries::from_pairs("bench", pairs, Frequency::Daily).unwrap()
}

fn benchmark_model_selection() {
    println!("## Model Selection");

    let series = price_series(1000);
    let start = Instant::now();
    for _ in 0..100 {
        let _ = select_model(&series, &ModelKind::ALL);
    }
    let elapsed = start.elapsed();
    println!("  Select model, 1000 points (100 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 100);

    println!();
}

fn benchmark_dependence() {
    println!("## Dependence");

    let x = noise(500, 2);
    let y: Vec<f64> = x.iter().zip(noise(500, 3)).map(|(a, b)| a + 0.5 * b).collect();

    let start = Instant::now();
    for _ in 0..100 {
        let _ = select_copula(&x, &y, &CopulaFamily::ALL, DEFAULT_STUDENT_T_DF);
    }
    let elapsed = start.elapsed();
    println!("  Copula selection, 500 points (100 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 100);

    let columns: Vec<(String, Vec<f64>)> = (0..10)
        .map(|k| (format!("v{}", k), noise(500, k + 10)))
        .collect();
    for method in [CorrelationMethod::Pearson, CorrelationMethod::Kendall] {
        let start = Instant::now();
        for _ in 0..10 {
            let _ = CorrelationMatrix::from_columns(&columns, method);
        }
        let elapsed = start.elapsed();
        println!("  {} matrix, 10x500 (10 iterations): {:?}", method, elapsed);
    }

    println!();
}

fn benchmark_tail_and_var() {
    println!("## Tail Risk and VaR");

    let returns: Vec<f64> = noise(5000, 4).iter().map(|e| e * 0.04).collect();
    let config = TailConfig::default();
    let start = Instant::now();
    for _ in 0..100 {
        let _ = analyze_tail(&returns, &config);
    }
    let elapsed = start.elapsed();
    println!("  Tail analysis, 5000 points (100 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 100);

    let series = price_series(500);
    let fit = match select_model(&series, &[ModelKind::Gbm]).ok().and_then(|s| s.best().cloned()) {
        Some(fit) => fit,
        None => return,
    };
    let sim = SimulationConfig {
        n_scenarios: 10_000,
        horizon: 20,
        seed: 42,
    };
    let start = Instant::now();
    let scenarios = match simulate_scenarios(&fit, 100.0, &sim) {
        Ok(s) => s,
        Err(_) => return,
    };
    println!("  Simulate 10,000 x 20 scenarios: {:?}", start.elapsed());

    let engine = VarEngine::default();
    let start = Instant::now();
    let _ = engine.analyze(&scenarios);
    println!("  Full risk report, 10,000 scenarios: {:?}", start.elapsed());

    println!();
}

fn benchmark_backtest() {
    println!("## Backtesting");

    let day0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let probabilities: Vec<f64> = noise(2000, 5).iter().map(|e| e + 0.5).collect();
    let predictions: Vec<Prediction> = probabilities
        .iter()
        .enumerate()
        .map(|(i, &p)| Prediction {
            event_id: "evt".to_string(),
            date: day0 + Duration::days(i as i64),
            probability: p,
        })
        .collect();
    let outcomes: Vec<Outcome> = noise(2000, 6)
        .iter()
        .enumerate()
        .map(|(i, e)| Outcome {
            event_id: "evt".to_string(),
            date: day0 + Duration::days(i as i64),
            occurred: e + 0.5 < probabilities[i],
        })
        .collect();

    let start = Instant::now();
    for _ in 0..10 {
        let _ = backtest::run_backtest(&predictions, &outcomes, &Default::default());
    }
    let elapsed = start.elapsed();
    println!("  Backtest, 2000 records (10 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10);

    println!();
}

fn benchmark_contagion() {
    println!("## Contagion");

    let columns: Vec<(String, Vec<f64>)> = (0..6)
        .map(|k| (format!("m{}", k), noise(1000, k + 20).iter().map(|e| e * 0.02).collect()))
        .collect();
    let config = ContagionConfig::default();
    let start = Instant::now();
    for _ in 0..10 {
        let _ = analyze_contagion(&columns, &config);
    }
    let elapsed = start.elapsed();
    println!("  Contagion analysis, 6x1000 (10 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10);

    println!();
}
