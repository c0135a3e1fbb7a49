//! Value at Risk and Expected Shortfall
//!
//! Implements:
//! - Historical VaR: loss at the `(1 - c)` cutoff of descending-sorted losses
//! - Expected Shortfall: mean loss at or beyond that cutoff
//! - Parametric VaR/ES: Normal assumption with a fixed z-table for common levels
//! - Marginal VaR: finite-difference sensitivity of VaR(99%) to one factor
//! - Stress VaR: VaR(99%) after scaling every scenario by a stress factor
//! - Kupiec proportion-of-failures backtest of VaR forecasts

use crate::error::{QuantError, Result};
use crate::stats;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, warn};

/// z-scores used by parametric VaR for the common confidence levels
pub const Z_TABLE: [(f64, f64); 4] = [
    (0.90, 1.2816),
    (0.95, 1.6449),
    (0.99, 2.3263),
    (0.995, 2.5758),
];

/// VaR engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarConfig {
    /// Confidence levels reported in addition to 95% and 99%
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,

    /// Multiplier applied to every scenario for stress VaR
    #[serde(default = "default_stress_factor")]
    pub stress_factor: f64,

    /// Proportional shock used for marginal VaR
    #[serde(default = "default_marginal_shock")]
    pub marginal_shock: f64,
}

fn default_confidence_levels() -> Vec<f64> {
    vec![0.90, 0.95, 0.99]
}

fn default_stress_factor() -> f64 {
    2.0
}

fn default_marginal_shock() -> f64 {
    0.01
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            confidence_levels: default_confidence_levels(),
            stress_factor: default_stress_factor(),
            marginal_shock: default_marginal_shock(),
        }
    }
}

/// Simulated outcomes, one row per scenario and one column per risk factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMatrix {
    pub factors: Vec<String>,
    pub values: DMatrix<f64>,
}

impl ScenarioMatrix {
    pub fn new(factors: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if factors.len() != values.ncols() {
            return Err(QuantError::InvalidInput(format!(
                "{} factor names for {} columns",
                factors.len(),
                values.ncols()
            )));
        }
        Ok(Self { factors, values })
    }

    /// Build from row vectors, naming the factors `f0`, `f1`, ...
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(QuantError::InvalidInput(
                "scenario rows must all have the same number of factors".to_string(),
            ));
        }
        let values = DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]);
        let factors = (0..ncols).map(|j| format!("f{}", j)).collect();
        Ok(Self { factors, values })
    }

    pub fn n_scenarios(&self) -> usize {
        self.values.nrows()
    }

    /// Equal-weighted return of each scenario
    pub fn portfolio_returns(&self) -> Vec<f64> {
        let ncols = self.values.ncols();
        if ncols == 0 {
            return vec![0.0; self.values.nrows()];
        }
        self.values
            .row_iter()
            .map(|row| row.sum() / ncols as f64)
            .collect()
    }

    /// Per-scenario loss, the negated portfolio return
    pub fn losses(&self) -> Vec<f64> {
        self.portfolio_returns().into_iter().map(|r| -r).collect()
    }

    fn column_index(&self, factor: &str) -> Result<usize> {
        self.factors
            .iter()
            .position(|f| f == factor)
            .ok_or_else(|| QuantError::NotFound(format!("risk factor '{}'", factor)))
    }
}

/// Headline risk figures for one loss distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub var_95: f64,
    pub var_99: f64,
    pub es_95: f64,
    pub es_99: f64,
    /// Peak-to-trough decline of the wealth path, in `[0, 1]`
    pub max_drawdown: f64,
    pub volatility: f64,
    pub n_scenarios: usize,
    /// Fewer than two scenarios; figures are sentinels
    pub degenerate: bool,
}

/// VaR and ES at one confidence level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence_level: f64,
    pub historical_var: f64,
    pub expected_shortfall: f64,
    pub parametric_var: f64,
    pub parametric_es: f64,
}

/// Marginal VaR of a single factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalVar {
    pub factor: String,
    pub marginal_var: f64,
}

/// Output of [`VarEngine::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub metrics: RiskMetrics,
    pub estimates: Vec<VarEstimate>,
    pub marginal: Vec<MarginalVar>,
    pub stress_var: f64,
}

/// VaR backtest result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBacktestResult {
    pub num_predictions: usize,

    /// Realized loss strictly above the forecast
    pub num_violations: usize,

    pub violation_rate: f64,
    pub expected_violation_rate: f64,

    /// Kupiec likelihood-ratio statistic, chi-square with 1 degree of freedom
    pub kupiec_statistic: f64,
    pub p_value: f64,

    /// Violation rate consistent with the confidence level at 5%
    pub validated: bool,
}

fn validate_confidence(confidence_level: f64) -> Result<()> {
    if confidence_level <= 0.0 || confidence_level >= 1.0 || confidence_level.is_nan() {
        return Err(QuantError::InvalidConfidenceLevel(confidence_level));
    }
    Ok(())
}

/// Losses sorted descending
fn sorted_desc(losses: &[f64]) -> Vec<f64> {
    let mut sorted = stats::sorted(losses);
    sorted.reverse();
    sorted
}

/// Index of the VaR cutoff in a descending-sorted loss vector of length `n`
fn cutoff_index(n: usize, confidence_level: f64) -> usize {
    (((1.0 - confidence_level) * n as f64).floor() as usize).min(n.saturating_sub(1))
}

/// Historical VaR at `confidence_level`, `0` for an empty loss vector
pub fn historical_var(losses: &[f64], confidence_level: f64) -> Result<f64> {
    validate_confidence(confidence_level)?;
    if losses.is_empty() {
        return Ok(0.0);
    }
    let sorted = sorted_desc(losses);
    Ok(sorted[cutoff_index(sorted.len(), confidence_level)])
}

/// Expected Shortfall: mean of losses at or beyond the VaR cutoff
pub fn expected_shortfall(losses: &[f64], confidence_level: f64) -> Result<f64> {
    validate_confidence(confidence_level)?;
    if losses.is_empty() {
        return Ok(0.0);
    }
    let sorted = sorted_desc(losses);
    let idx = cutoff_index(sorted.len(), confidence_level);
    Ok(stats::mean(&sorted[..=idx]))
}

/// z-score for `confidence_level`, from [`Z_TABLE`] when listed
pub fn z_score_for(confidence_level: f64) -> f64 {
    Z_TABLE
        .iter()
        .find(|(c, _)| (c - confidence_level).abs() < 1e-9)
        .map(|&(_, z)| z)
        .unwrap_or_else(|| stats::normal_quantile(confidence_level))
}

/// Parametric VaR of a return distribution with the given mean and std
pub fn parametric_var(mean: f64, std: f64, confidence_level: f64) -> Result<f64> {
    validate_confidence(confidence_level)?;
    Ok(z_score_for(confidence_level) * std - mean)
}

/// Parametric Expected Shortfall, `std * phi(z) / (1 - c) - mean`
pub fn parametric_expected_shortfall(mean: f64, std: f64, confidence_level: f64) -> Result<f64> {
    validate_confidence(confidence_level)?;
    let z = z_score_for(confidence_level);
    Ok(std * stats::normal_pdf(z) / (1.0 - confidence_level) - mean)
}

/// Maximum drawdown of the cumulative-product wealth path of `returns`
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut max_dd: f64 = 0.0;
    for r in returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - wealth) / peak);
        }
    }
    max_dd.clamp(0.0, 1.0)
}

/// Headline metrics from a flat vector of portfolio returns
pub fn risk_metrics_from_returns(returns: &[f64]) -> Result<RiskMetrics> {
    let losses: Vec<f64> = returns.iter().map(|r| -r).collect();
    let degenerate = returns.len() < 2;
    if degenerate {
        warn!(n = returns.len(), "Too few scenarios for risk metrics");
    }
    Ok(RiskMetrics {
        var_95: historical_var(&losses, 0.95)?,
        var_99: historical_var(&losses, 0.99)?,
        es_95: expected_shortfall(&losses, 0.95)?,
        es_99: expected_shortfall(&losses, 0.99)?,
        max_drawdown: max_drawdown(returns),
        volatility: stats::std(returns),
        n_scenarios: returns.len(),
        degenerate,
    })
}

/// VaR calculation engine
#[derive(Debug, Clone, Default)]
pub struct VarEngine {
    config: VarConfig,
}

impl VarEngine {
    pub fn new(config: VarConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Full risk report over a scenario matrix
    pub fn analyze(&self, scenarios: &ScenarioMatrix) -> Result<RiskReport> {
        let returns = scenarios.portfolio_returns();
        let metrics = risk_metrics_from_returns(&returns)?;
        let estimates = self.estimates(&returns)?;

        let marginal = scenarios
            .factors
            .iter()
            .map(|factor| {
                Ok(MarginalVar {
                    factor: factor.clone(),
                    marginal_var: self.marginal_var(scenarios, factor)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let stress_var = self.stress_var(scenarios)?;
        debug!(
            var_99 = metrics.var_99,
            es_99 = metrics.es_99,
            stress_var,
            "Risk report computed"
        );

        Ok(RiskReport {
            metrics,
            estimates,
            marginal,
            stress_var,
        })
    }

    /// Historical and parametric estimates at every configured level
    pub fn estimates(&self, returns: &[f64]) -> Result<Vec<VarEstimate>> {
        let losses: Vec<f64> = returns.iter().map(|r| -r).collect();
        let mean = stats::mean(returns);
        let std = stats::std(returns);
        self.config
            .confidence_levels
            .iter()
            .map(|&c| {
                Ok(VarEstimate {
                    confidence_level: c,
                    historical_var: historical_var(&losses, c)?,
                    expected_shortfall: expected_shortfall(&losses, c)?,
                    parametric_var: parametric_var(mean, std, c)?,
                    parametric_es: parametric_expected_shortfall(mean, std, c)?,
                })
            })
            .collect()
    }

    /// Change in VaR(99%) per unit proportional shock of one factor
    pub fn marginal_var(&self, scenarios: &ScenarioMatrix, factor: &str) -> Result<f64> {
        let shock = self.config.marginal_shock;
        if shock == 0.0 || !shock.is_finite() {
            return Err(QuantError::InvalidInput(format!(
                "marginal shock must be finite and non-zero, got {}",
                shock
            )));
        }
        let j = scenarios.column_index(factor)?;
        let base = historical_var(&scenarios.losses(), 0.99)?;

        let mut shocked = scenarios.clone();
        shocked
            .values
            .column_mut(j)
            .iter_mut()
            .for_each(|v| *v *= 1.0 + shock);
        let bumped = historical_var(&shocked.losses(), 0.99)?;
        Ok((bumped - base) / shock)
    }

    /// VaR(99%) with every scenario value scaled by the stress factor
    pub fn stress_var(&self, scenarios: &ScenarioMatrix) -> Result<f64> {
        let stressed = &scenarios.values * self.config.stress_factor;
        let ncols = stressed.ncols().max(1) as f64;
        let losses: Vec<f64> = stressed.row_iter().map(|row| -row.sum() / ncols).collect();
        historical_var(&losses, 0.99)
    }
}

/// Kupiec proportion-of-failures test of VaR forecasts
pub fn backtest_var(
    var_forecasts: &[f64],
    realized_losses: &[f64],
    confidence_level: f64,
) -> Result<VarBacktestResult> {
    validate_confidence(confidence_level)?;
    if var_forecasts.len() != realized_losses.len() {
        return Err(QuantError::InvalidInput(format!(
            "{} VaR forecasts for {} realized losses",
            var_forecasts.len(),
            realized_losses.len()
        )));
    }
    if var_forecasts.is_empty() {
        return Err(QuantError::InvalidInput(
            "no VaR forecasts to backtest".to_string(),
        ));
    }

    let n = var_forecasts.len();
    let x = var_forecasts
        .iter()
        .zip(realized_losses)
        .filter(|(var, loss)| loss > var)
        .count();

    let p = 1.0 - confidence_level;
    let rate = x as f64 / n as f64;
    let kupiec_statistic = kupiec_lr(n, x, p);
    let p_value = match ChiSquared::new(1.0) {
        Ok(chi) => 1.0 - chi.cdf(kupiec_statistic),
        Err(_) => 0.0,
    };

    Ok(VarBacktestResult {
        num_predictions: n,
        num_violations: x,
        violation_rate: rate,
        expected_violation_rate: p,
        kupiec_statistic,
        p_value,
        validated: p_value > 0.05,
    })
}

/// `x * ln(q)` with the `0 * ln(0) = 0` convention
fn xlogy(x: f64, q: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * q.ln()
    }
}

fn kupiec_lr(n: usize, x: usize, p: f64) -> f64 {
    let (n, x) = (n as f64, x as f64);
    let rate = x / n;
    let null = xlogy(n - x, 1.0 - p) + xlogy(x, p);
    let alt = xlogy(n - x, 1.0 - rate) + xlogy(x, rate);
    (-2.0 * (null - alt)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_returns() -> Vec<f64> {
        vec![
            -0.05, -0.03, -0.02, -0.01, 0.00,
            0.01, 0.02, 0.03, 0.04, 0.05,
            -0.04, 0.01, 0.02, -0.01, 0.03,
            0.00, -0.02, 0.01, 0.02, -0.01,
        ]
    }

    #[test]
    fn test_historical_var() {
        let losses: Vec<f64> = create_test_returns().iter().map(|r| -r).collect();
        // floor(0.05 * 20) = 1 -> second-largest loss
        assert_relative_eq!(historical_var(&losses, 0.95).unwrap(), 0.04, epsilon = 1e-12);
        assert_relative_eq!(historical_var(&losses, 0.99).unwrap(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(expected_shortfall(&losses, 0.95).unwrap(), 0.045, epsilon = 1e-12);
    }

    #[test]
    fn test_var_ordering() {
        let losses: Vec<f64> = create_test_returns().iter().map(|r| -r).collect();
        let v95 = historical_var(&losses, 0.95).unwrap();
        let v99 = historical_var(&losses, 0.99).unwrap();
        assert!(v99 >= v95);
        assert!(expected_shortfall(&losses, 0.95).unwrap() >= v95);
    }

    #[test]
    fn test_parametric_var() {
        let var = parametric_var(0.0, 0.02, 0.95).unwrap();
        assert_relative_eq!(var, 1.6449 * 0.02, epsilon = 1e-12);
        let es = parametric_expected_shortfall(0.0, 0.02, 0.95).unwrap();
        assert!(es > var);
        // Off-table level falls back to the exact quantile
        assert_relative_eq!(z_score_for(0.975), 1.959964, epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_confidence_level() {
        assert!(parametric_var(0.0, 0.02, 1.5).is_err());
        assert!(matches!(
            historical_var(&[1.0], -0.1),
            Err(QuantError::InvalidConfidenceLevel(_))
        ));
    }

    #[test]
    fn test_max_drawdown() {
        assert_relative_eq!(max_drawdown(&[0.1, -0.5, 0.2]), 0.5, epsilon = 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
        assert_eq!(max_drawdown(&[-2.0]), 1.0);
    }

    #[test]
    fn test_engine_report() {
        let rows: Vec<Vec<f64>> = create_test_returns()
            .iter()
            .map(|r| vec![*r, r * 0.5])
            .collect();
        let scenarios = ScenarioMatrix::from_rows(&rows).unwrap();
        let report = VarEngine::default().analyze(&scenarios).unwrap();
        assert_eq!(report.metrics.n_scenarios, 20);
        assert!(!report.metrics.degenerate);
        assert!(report.metrics.var_99 >= report.metrics.var_95);
        assert_eq!(report.marginal.len(), 2);
        assert_relative_eq!(report.stress_var, 2.0 * report.metrics.var_99, epsilon = 1e-12);
        // Scaling factor f0 by 1% scales its share of the worst loss by 1%
        assert_relative_eq!(report.marginal[0].marginal_var, 0.05 / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_factor() {
        let scenarios = ScenarioMatrix::from_rows(&[vec![0.1]]).unwrap();
        assert!(matches!(
            VarEngine::default().marginal_var(&scenarios, "missing"),
            Err(QuantError::NotFound(_))
        ));
    }

    #[test]
    fn test_degenerate_metrics() {
        let metrics = risk_metrics_from_returns(&[]).unwrap();
        assert!(metrics.degenerate);
        assert_eq!(metrics.var_99, 0.0);
        assert_eq!(metrics.volatility, 0.0);
    }

    #[test]
    fn test_var_backtest() {
        let forecasts = vec![100.0; 100];
        let mut losses = vec![50.0; 100];
        for loss in losses.iter_mut().take(5) {
            *loss = 150.0;
        }

        let backtest = backtest_var(&forecasts, &losses, 0.95).unwrap();
        assert_eq!(backtest.num_predictions, 100);
        assert_eq!(backtest.num_violations, 5);
        assert_relative_eq!(backtest.violation_rate, 0.05, epsilon = 1e-12);
        assert!(backtest.kupiec_statistic.abs() < 1e-9);
        assert!(backtest.validated);

        let losses = vec![150.0; 100];
        let backtest = backtest_var(&forecasts, &losses, 0.95).unwrap();
        assert!(!backtest.validated);
    }

    #[test]
    fn test_backtest_rejects_bad_input() {
        assert!(backtest_var(&[1.0], &[1.0, 2.0], 0.99).is_err());
        assert!(backtest_var(&[], &[], 0.99).is_err());
    }
}
