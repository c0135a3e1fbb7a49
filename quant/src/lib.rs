//! # ag-quant: Quantitative Analytics Engine
//!
//! This library provides the statistical core behind forecasting and risk
//! reports: stochastic model selection, dependence modelling, tail risk,
//! scenario risk and probability backtesting. Every component is a pure,
//! deterministic computation over in-memory data; data acquisition and
//! report rendering live outside the crate.
//!
//! ## Core Components
//!
//! - **Model selection**: GBM, Ornstein-Uhlenbeck, Heston and Merton fits ranked by AIC
//! - **Copulas**: Gaussian, Clayton, Gumbel, Student-t and Frank dependence fits
//! - **Correlation**: Pearson/Spearman/Kendall matrices, rolling correlation, regime changes
//! - **Tail risk**: Hill and Pickands estimators, GPD fits and extreme quantiles
//! - **VaR engine**: historical/parametric VaR, Expected Shortfall, marginal and stress VaR
//! - **Backtesting**: Brier score, log loss, AUC, Hosmer-Lemeshow calibration
//! - **Stress testing**: historical scenario library and sensitivity analysis
//! - **Contagion**: crisis detection, correlation jumps, spillover and network measures
//! - **Model comparison**: AIC/BIC scoring with likelihood-ratio and Vuong statistics
//!
//! ## Example Usage
//!
//! ```rust
//! use ag_quant::{select_model, Frequency, ModelKind, TimeSeries};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let pairs = (0..120)
//!     .map(|i| {
//!         let t = i as f64;
//!         (start + Duration::days(i), 100.0 * (1.0 + 0.001 * t + 0.02 * (0.7 * t).sin()))
//!     })
//!     .collect();
//! let series = TimeSeries::from_pairs("index", pairs, Frequency::Daily).unwrap();
//!
//! let selection = select_model(&series, &ModelKind::ALL).unwrap();
//! assert_eq!(selection.ranking[0].rank, 1);
//! assert!(selection.ranking.iter().enumerate().all(|(i, r)| r.rank == i + 1));
//! ```

pub mod backtest;
pub mod comparison;
pub mod config;
pub mod contagion;
pub mod copula;
pub mod correlation;
pub mod error;
pub mod models;
pub mod runner;
pub mod series;
pub mod simulation;
pub mod stats;
pub mod stress;
pub mod tail;
pub mod transform;
pub mod var;

pub use backtest::{
    run_backtest, BacktestConfig, BacktestReport, CalibrationResult, Outcome, Prediction,
};
pub use comparison::{compare_models, CandidateModel, ModelComparison, ModelScore};
pub use config::{CopulaSelectorConfig, CorrelationConfig, EngineConfig, ModelSelectorConfig};
pub use contagion::{analyze_contagion, ContagionAnalysis, ContagionConfig, ContagionEvent};
pub use copula::{select_copula, CopulaFamily, CopulaFit, CopulaParameters, CopulaSelection};
pub use correlation::{
    correlation, detect_regime_changes, rolling_correlation, CorrelationMatrix, CorrelationMethod,
    RegimeChange, Severity,
};
pub use error::{QuantError, Result};
pub use models::{fit_model, select_model, ModelFit, ModelKind, ModelParameters, ModelSelection};
pub use runner::{Analysis, AnalysisRegistry, WithRetry, WithTimeout};
pub use series::{Frequency, TimeSeries};
pub use simulation::{simulate_scenarios, SimulationConfig};
pub use stress::{StressConfig, StressReport, StressScenario, StressTestEngine, StressVariable};
pub use tail::{analyze_tail, fit_gpd, GpdFit, TailAnalysis, TailConfig, TailSide};
pub use transform::{apply_pipeline, TransformOp, TransformResult, TransformStep};
pub use var::{backtest_var, RiskMetrics, RiskReport, ScenarioMatrix, VarConfig, VarEngine};
