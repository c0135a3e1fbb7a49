//! Integration tests for the analytics engine
//!
//! These tests run components end to end: configuration loading, model
//! fitting feeding scenario risk, backtesting, stress and contagion
//! analysis, plus property tests over the statistical core.

use ag_quant::backtest::{self, Outcome, Prediction};
use ag_quant::comparison::{compare_models, CandidateModel};
use ag_quant::contagion::analyze_contagion;
use ag_quant::copula::{select_copula, CopulaFamily, DEFAULT_STUDENT_T_DF};
use ag_quant::correlation::{self, CorrelationMatrix, CorrelationMethod};
use ag_quant::models::{fit_model, select_model, ModelKind};
use ag_quant::runner::{Analysis, AnalysisRegistry, WithRetry, WithTimeout};
use ag_quant::simulation::{simulate_scenarios, SimulationConfig};
use ag_quant::stress::{StressTestEngine, StressVariable};
use ag_quant::tail::{self, TailSide};
use ag_quant::transform::{self, TransformOp};
use ag_quant::var::{self, VarEngine};
use ag_quant::{stats, EngineConfig, Frequency, QuantError, Result, TimeSeries};
use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::fs;

fn day(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
}

/// Deterministic pseudo-noise in [-0.5, 0.5)
fn noise(n: usize, seed: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let h = (i as f64 * 12.9898 + seed as f64 * 78.233).sin() * 43_758.545_3;
            h.fract().abs() - 0.5
        })
        .collect()
}

fn series(name: &str, values: Vec<f64>) -> TimeSeries {
    let timestamps = (0..values.len() as i64).map(day).collect();
    TimeSeries::new(name, timestamps, values, Frequency::Daily).unwrap()
}

fn price_path(n: usize, seed: usize) -> Vec<f64> {
    let mut level = 100.0;
    noise(n, seed)
        .into_iter()
        .map(|e| {
            level *= 1.0 + 0.0003 + 0.03 * e;
            level
        })
        .collect()
}

fn load_config(file: &str) -> EngineConfig {
    let path = format!("{}/configs/{}", env!("CARGO_MANIFEST_DIR"), file);
    let yaml = fs::read_to_string(path).expect("Failed to read config");
    EngineConfig::from_yaml(&yaml).expect("Failed to parse config")
}

#[test]
fn test_load_default_config() {
    let config = load_config("default.yaml");
    assert_eq!(config.models.models, ModelKind::ALL.to_vec());
    assert_eq!(config.copulas.families, CopulaFamily::ALL.to_vec());
    assert_eq!(config.stress.custom_scenarios.len(), 1);
    assert_eq!(config.stress.custom_scenarios[0].name, "Rate Spike");

    let mut expected = EngineConfig::default();
    expected.stress = config.stress.clone();
    assert_eq!(config, expected);
}

#[test]
fn test_conservative_config() {
    let config = load_config("conservative.yaml");
    assert_eq!(config.tail.tail, TailSide::Lower);
    assert_eq!(config.tail.threshold_percentile, 90.0);
    assert_eq!(config.var.confidence_levels, vec![0.95, 0.99, 0.995]);
    assert_eq!(config.backtest.n_bins, 5);
    assert_eq!(config.simulation.horizon, 60);
    // Untouched sections keep their defaults
    assert_eq!(config.correlation, EngineConfig::default().correlation);
}

#[test]
fn test_fitted_model_feeds_var_engine() {
    let config = EngineConfig::default();
    let prices = price_path(250, 11);
    let fit = fit_model(ModelKind::Gbm, &prices, config.models.frequency).unwrap();

    let sim = SimulationConfig {
        n_scenarios: 500,
        horizon: 10,
        seed: config.simulation.seed,
    };
    let start = prices[prices.len() - 1];
    let scenarios = simulate_scenarios(&fit, start, &sim).unwrap();
    assert_eq!(scenarios.n_scenarios(), 500);

    let engine = VarEngine::new(config.var.clone());
    let report = engine.analyze(&scenarios).unwrap();
    let m = &report.metrics;
    assert!(!m.degenerate);
    assert!(m.var_99 >= m.var_95);
    assert!(m.es_95 >= m.var_95 - 1e-12);
    assert!(m.es_99 >= m.var_99 - 1e-12);
    assert_eq!(report.estimates.len(), config.var.confidence_levels.len());
    assert!(report.stress_var >= m.var_95);

    // Same inputs, same seed: identical report
    let again = engine
        .analyze(&simulate_scenarios(&fit, start, &sim).unwrap())
        .unwrap();
    assert_eq!(report, again);
}

#[test]
fn test_model_selection_over_series() {
    let s = series("index", price_path(300, 3));
    let selection = select_model(&s, &ModelKind::ALL).unwrap();
    assert_eq!(selection.series_name, "index");
    assert_eq!(selection.ranking.len() + selection.failures.len(), 4);
    for (i, ranked) in selection.ranking.iter().enumerate() {
        assert_eq!(ranked.rank, i + 1);
    }
    let best = selection.best().unwrap();
    assert!(selection
        .ranking
        .iter()
        .all(|r| best.aic.total_cmp(&r.fit.aic) != Ordering::Greater));
}

#[test]
fn test_difference_scenario() {
    let s = series("count", (1..=10).map(|v| v as f64).collect());
    let result = transform::apply_pipeline(&s, &[TransformOp::Difference { order: 1 }]).unwrap();
    assert_eq!(result.values, vec![1.0; 9]);
    assert_eq!(result.timestamps.len(), 9);
    assert_eq!(result.steps[0].affected_values, 9);
}

#[test]
fn test_transform_pipeline_from_yaml() {
    let yaml = r#"
- type: interpolate
- type: log_transform
- type: difference
- type: winsorize
  p: 0.1
"#;
    let ops: Vec<TransformOp> = serde_yaml::from_str(yaml).unwrap();
    let mut values = price_path(50, 4);
    values[10] = f64::NAN;
    let result = transform::apply_pipeline(&series("px", values), &ops).unwrap();
    assert_eq!(result.steps.len(), 4);
    assert_eq!(result.steps[0].affected_values, 1);
    assert_eq!(result.values.len(), 49);
    assert!(result.values.iter().all(|v| v.is_finite()));

    let unknown: std::result::Result<Vec<TransformOp>, _> =
        serde_yaml::from_str("- type: fourier\n");
    assert!(unknown.is_err());
}

#[test]
fn test_perfect_anticorrelation() {
    let x: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let y: Vec<f64> = x.iter().map(|v| -v).collect();
    assert_relative_eq!(
        correlation::correlation(&x, &y, CorrelationMethod::Pearson),
        -1.0,
        epsilon = 1e-12
    );
    assert_eq!(correlation::kendall_tau(&x, &y), -1.0);
}

#[test]
fn test_correlation_matrix_over_series() {
    let a = series("a", noise(120, 1));
    let b = series("b", noise(120, 2));
    let c = series("c", noise(120, 1).iter().map(|v| 3.0 * v - 1.0).collect());
    let matrix = CorrelationMatrix::from_series(&[a, b, c], CorrelationMethod::Spearman).unwrap();
    for i in 0..3 {
        assert_eq!(matrix.matrix[(i, i)], 1.0);
        for j in 0..3 {
            assert_eq!(matrix.matrix[(i, j)], matrix.matrix[(j, i)]);
        }
    }
    assert_relative_eq!(matrix.get("a", "c").unwrap(), 1.0, epsilon = 1e-12);
    assert!(matrix.get("a", "zzz").is_none());
}

#[test]
fn test_brier_scenario() {
    assert_relative_eq!(
        backtest::brier_score(&[0.9, 0.1], &[true, false]),
        0.01,
        epsilon = 1e-12
    );
}

#[test]
fn test_gpd_few_exceedances() {
    let data: Vec<f64> = (1..=20).map(|v| v as f64).collect();
    let fit = tail::fit_gpd(&data, 95.0);
    let actual = data.iter().filter(|v| **v > fit.threshold).count();
    assert_eq!(fit.shape, 0.0);
    assert_eq!(fit.n_exceedances, actual);
    assert!(fit.degenerate);
}

#[test]
fn test_comparator_needs_two_models() {
    let err = compare_models(&[CandidateModel::new("solo", vec![0.4, 0.6], 1)]).unwrap_err();
    assert!(err.to_string().contains("at least two models required"));
    assert!(!err.is_retryable());
}

#[test]
fn test_backtest_with_configured_bins() {
    let config = load_config("conservative.yaml");
    let mut predictions = Vec::new();
    let mut outcomes = Vec::new();
    for (i, e) in noise(200, 9).into_iter().enumerate() {
        let p = e + 0.5;
        predictions.push(Prediction {
            event_id: format!("evt-{}", i % 4),
            date: day(i as i64),
            probability: p,
        });
        outcomes.push(Outcome {
            event_id: format!("evt-{}", i % 4),
            date: day(i as i64),
            occurred: p >= 0.5,
        });
    }
    // Outcome on a date with no prediction is ignored
    outcomes.push(Outcome {
        event_id: "evt-0".to_string(),
        date: day(500),
        occurred: true,
    });

    let report = backtest::run_backtest(&predictions, &outcomes, &config.backtest).unwrap();
    assert_eq!(report.n_matched, 200);
    assert_eq!(report.hit_rate, 1.0);
    assert_eq!(report.auc, 1.0);
    assert_eq!(report.calibration.bins.len(), 5);
    assert!(report.brier_score < 0.25);
}

#[test]
fn test_backtest_without_matches() {
    let predictions = vec![Prediction {
        event_id: "a".to_string(),
        date: day(0),
        probability: 0.5,
    }];
    let outcomes = vec![Outcome {
        event_id: "b".to_string(),
        date: day(0),
        occurred: true,
    }];
    let result = backtest::run_backtest(&predictions, &outcomes, &Default::default());
    assert!(matches!(result, Err(QuantError::NotFound(_))));
}

#[test]
fn test_stress_with_configured_scenario() {
    let config = load_config("default.yaml");
    let engine = StressTestEngine::from_config(&config.stress);
    let variables = vec![
        StressVariable::new("policy rate", 0.3),
        StressVariable::new("stocks", 0.2),
    ];
    let report = engine.run(0.3, &variables).unwrap();
    let spike = report
        .results
        .iter()
        .find(|r| r.scenario == "Rate Spike")
        .unwrap();
    assert_eq!(spike.shocked_variables.len(), 2);
    assert!(spike.stressed_probability > 0.3);
    assert!(report.worst_probability <= 0.99);
    assert_eq!(report.sensitivity.len(), 2 * 3);
}

#[test]
fn test_contagion_across_panel() {
    let n = 300;
    let common = noise(n, 99);
    let panel: Vec<(String, Vec<f64>)> = ["equities", "credit", "fx"]
        .iter()
        .enumerate()
        .map(|(k, name)| {
            let own = noise(n, k + 1);
            let values = (0..n)
                .map(|i| {
                    let shock = if (200..240).contains(&i) { 0.2 * common[i] } else { 0.0 };
                    0.01 * own[i] + shock
                })
                .collect();
            (name.to_string(), values)
        })
        .collect();

    let analysis = analyze_contagion(&panel, &Default::default()).unwrap();
    assert_eq!(analysis.proxy, "equities");
    assert!(!analysis.crisis_periods.is_empty());
    assert!(analysis.events.iter().any(|e| e.source == "equities"));
}

#[test]
fn test_var_backtest_of_constant_forecast() {
    let losses: Vec<f64> = noise(250, 21).iter().map(|e| e * 0.04).collect();
    let forecast = var::historical_var(&losses, 0.95).unwrap();
    let result = var::backtest_var(&vec![forecast; losses.len()], &losses, 0.95).unwrap();
    assert_eq!(result.num_predictions, 250);
    assert!(result.violation_rate <= 0.05 + 1e-12);
    assert!(result.p_value > 0.0 && result.p_value <= 1.0);
}

#[test]
fn test_registry_runs_components() {
    let mut registry: AnalysisRegistry<Vec<f64>, f64> = AnalysisRegistry::new();
    registry.register(
        "var_95",
        WithRetry::new(
            |returns: &Vec<f64>| -> Result<f64> {
                let losses: Vec<f64> = returns.iter().map(|r| -r).collect();
                var::historical_var(&losses, 0.95)
            },
            3,
            std::time::Duration::ZERO,
        ),
    );
    registry.register(
        "hill",
        WithTimeout::new(
            |returns: &Vec<f64>| -> Result<f64> { Ok(tail::hill_estimator(returns)) },
            std::time::Duration::from_secs(10),
        ),
    );

    let returns: Vec<f64> = noise(100, 5).iter().map(|e| e * 0.02).collect();
    let var95 = registry.run("var_95", &returns).unwrap();
    assert!(var95 > 0.0);
    assert!(registry.run("hill", &returns).unwrap().is_finite());
    assert!(matches!(
        registry.run("garch", &returns),
        Err(QuantError::NotFound(_))
    ));

    let direct = |r: &Vec<f64>| -> Result<f64> { Ok(stats::std(r)) };
    assert_eq!(direct.run(&returns).unwrap(), stats::std(&returns));
}

fn non_constant(min_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-100.0f64..100.0, min_len..60)
        .prop_filter("needs spread", |v| stats::std(v) > 1e-6)
}

proptest! {
    #[test]
    fn prop_pearson_symmetric_and_bounded(
        pairs in prop::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 2..60)
    ) {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let xy = stats::pearson(&x, &y);
        prop_assert_eq!(xy, stats::pearson(&y, &x));
        prop_assert!((-1.0..=1.0).contains(&xy));
        for method in [CorrelationMethod::Spearman, CorrelationMethod::Kendall] {
            let c = correlation::correlation(&x, &y, method);
            prop_assert!((-1.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn prop_self_correlation_is_one(x in non_constant(3)) {
        prop_assert!((stats::pearson(&x, &x) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prop_spearman_monotone_invariant(
        x in non_constant(3),
        y in non_constant(3),
    ) {
        let n = x.len().min(y.len());
        let (x, y) = (&x[..n], &y[..n]);
        let base = correlation::spearman(x, y);
        let affine: Vec<f64> = x.iter().map(|v| 3.0 * v + 7.0).collect();
        let cubed: Vec<f64> = y.iter().map(|v| v.powi(3)).collect();
        prop_assert!((correlation::spearman(&affine, y) - base).abs() < 1e-9);
        prop_assert!((correlation::spearman(x, &cubed) - base).abs() < 1e-9);
    }

    #[test]
    fn prop_var_and_es_ordering(losses in prop::collection::vec(-0.2f64..0.2, 1..300)) {
        let var95 = var::historical_var(&losses, 0.95).unwrap();
        let var99 = var::historical_var(&losses, 0.99).unwrap();
        prop_assert!(var99 >= var95);
        for c in [0.90, 0.95, 0.99] {
            let v = var::historical_var(&losses, c).unwrap();
            let es = var::expected_shortfall(&losses, c).unwrap();
            prop_assert!(es >= v - 1e-12);
        }
    }

    #[test]
    fn prop_normalize_round_trip(values in prop::collection::vec(-1e3f64..1e3, 1..80)) {
        let (scaled, min, max) = transform::normalize(&values);
        prop_assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));
        let restored = transform::inverse_normalize(&scaled, min, max);
        for (a, b) in values.iter().zip(&restored) {
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_model_ranks_contiguous(returns in prop::collection::vec(-0.05f64..0.05, 30..120)) {
        let mut level = 100.0;
        let prices: Vec<f64> = returns
            .iter()
            .map(|r| {
                level *= 1.0 + r;
                level
            })
            .collect();
        let selection = select_model(&series("p", prices), &ModelKind::ALL).unwrap();
        for (i, ranked) in selection.ranking.iter().enumerate() {
            prop_assert_eq!(ranked.rank, i + 1);
        }
        for w in selection.ranking.windows(2) {
            prop_assert!(w[0].fit.aic.total_cmp(&w[1].fit.aic) != Ordering::Greater);
        }
    }

    #[test]
    fn prop_copula_ranks_contiguous_and_deterministic(
        pairs in prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0), 3..80)
    ) {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let first = select_copula(&x, &y, &CopulaFamily::ALL, DEFAULT_STUDENT_T_DF).unwrap();
        let second = select_copula(&x, &y, &CopulaFamily::ALL, DEFAULT_STUDENT_T_DF).unwrap();
        for (i, ranked) in first.ranking.iter().enumerate() {
            prop_assert_eq!(ranked.rank, i + 1);
        }
        // Compared as JSON so NaN sentinels compare equal
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn prop_tail_analysis_deterministic(data in prop::collection::vec(-5.0f64..5.0, 1..200)) {
        let config = tail::TailConfig::default();
        let a = tail::analyze_tail(&data, &config).unwrap();
        let b = tail::analyze_tail(&data, &config).unwrap();
        prop_assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
