//! Stress testing of a baseline event probability
//!
//! Implements:
//! - A library of named macro scenarios keyed by canonical factor names
//! - Caller-supplied custom scenarios
//! - Scenario application to a baseline probability
//! - One-variable sensitivity and elasticity at 10%, 25% and 50% shocks
//!
//! Each model variable whose canonical name matches a scenario shock scales
//! the probability by `1 + |shock| * (1 + historical_std) * 0.5`. The
//! stressed probability is clamped to `[0.01, 0.99]`.

use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Shock magnitudes used by sensitivity analysis
pub const SENSITIVITY_SHOCKS: [f64; 3] = [0.10, 0.25, 0.50];

const PROBABILITY_FLOOR: f64 = 0.01;
const PROBABILITY_CAP: f64 = 0.99;

/// Alternative spellings mapped onto canonical factor names
const FACTOR_ALIASES: [(&str, &str); 22] = [
    ("rates", "interest_rate"),
    ("interest", "interest_rate"),
    ("interest_rates", "interest_rate"),
    ("policy_rate", "interest_rate"),
    ("cpi", "inflation"),
    ("inflation_rate", "inflation"),
    ("gdp", "gdp_growth"),
    ("growth", "gdp_growth"),
    ("fx", "exchange_rate"),
    ("currency", "exchange_rate"),
    ("fx_rate", "exchange_rate"),
    ("stocks", "equity_index"),
    ("equities", "equity_index"),
    ("equity", "equity_index"),
    ("sp500", "equity_index"),
    ("oil", "oil_price"),
    ("crude", "oil_price"),
    ("vix", "volatility"),
    ("credit", "credit_spread"),
    ("spreads", "credit_spread"),
    ("jobless", "unemployment"),
    ("unemployment_rate", "unemployment"),
];

/// Canonical form of a factor or variable name
///
/// Lowercases, collapses non-alphanumeric runs to `_` and resolves aliases,
/// so `"Interest Rates"`, `"interest-rates"` and `"rates"` all map to
/// `interest_rate`.
pub fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    FACTOR_ALIASES
        .iter()
        .find(|(alias, _)| *alias == out)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(out)
}

/// A model input that scenarios can shock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressVariable {
    pub name: String,

    /// Historical standard deviation of the variable, scaling its shocks
    pub historical_std: f64,
}

impl StressVariable {
    pub fn new(name: impl Into<String>, historical_std: f64) -> Self {
        Self {
            name: name.into(),
            historical_std,
        }
    }

    fn multiplier(&self, shock: f64) -> f64 {
        1.0 + shock.abs() * (1.0 + self.historical_std) * 0.5
    }
}

/// Stress test scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Shocks by factor name (proportional, e.g. -0.20 for -20%)
    pub shocks: BTreeMap<String, f64>,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>, shocks: &[(&str, f64)]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            shocks: shocks
                .iter()
                .map(|(factor, shock)| (factor.to_string(), *shock))
                .collect(),
        }
    }

    /// Shock applying to `variable`, matched on canonical names
    fn shock_for(&self, variable: &str) -> Option<f64> {
        let key = canonicalize(variable);
        self.shocks
            .iter()
            .find(|(factor, _)| canonicalize(factor) == key)
            .map(|(_, shock)| *shock)
    }
}

/// Stress configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StressConfig {
    /// Scenarios run in addition to the standard library
    #[serde(default)]
    pub custom_scenarios: Vec<StressScenario>,
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub stressed_probability: f64,
    pub delta: f64,
    /// Delta as a percentage of the baseline
    pub delta_pct: f64,
    pub shocked_variables: Vec<String>,
}

/// Response of the probability to one variable shocked alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub variable: String,
    pub shock: f64,
    pub stressed_probability: f64,
    pub delta: f64,
    /// `%change in probability / %change in variable`
    pub elasticity: f64,
}

/// Comprehensive stress test report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub base_probability: f64,
    pub results: Vec<ScenarioResult>,
    pub sensitivity: Vec<SensitivityPoint>,

    /// Scenario with the highest stressed probability
    pub worst_scenario: String,
    pub worst_probability: f64,

    /// Scenario with the lowest stressed probability
    pub best_scenario: String,
    pub best_probability: f64,

    pub average_probability: f64,
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROBABILITY_FLOOR, PROBABILITY_CAP)
}

fn percent_change(delta: f64, base: f64) -> f64 {
    if base != 0.0 {
        delta / base * 100.0
    } else {
        0.0
    }
}

/// Stress testing engine
#[derive(Debug, Clone)]
pub struct StressTestEngine {
    scenarios: Vec<StressScenario>,
}

impl StressTestEngine {
    pub fn new(scenarios: Vec<StressScenario>) -> Self {
        Self { scenarios }
    }

    /// Engine with the standard macro scenario library
    pub fn with_standard_scenarios() -> Self {
        Self {
            scenarios: standard_scenarios(),
        }
    }

    /// Standard library followed by the configured custom scenarios
    pub fn from_config(config: &StressConfig) -> Self {
        let mut scenarios = standard_scenarios();
        scenarios.extend(config.custom_scenarios.iter().cloned());
        Self { scenarios }
    }

    pub fn scenarios(&self) -> &[StressScenario] {
        &self.scenarios
    }

    /// Apply one scenario to `base_probability`
    pub fn run_scenario(
        &self,
        base_probability: f64,
        variables: &[StressVariable],
        scenario: &StressScenario,
    ) -> Result<ScenarioResult> {
        validate_probability(base_probability)?;

        let mut multiplier = 1.0;
        let mut shocked_variables = Vec::new();
        for variable in variables {
            if let Some(shock) = scenario.shock_for(&variable.name) {
                multiplier *= variable.multiplier(shock);
                shocked_variables.push(variable.name.clone());
            }
        }

        let stressed_probability = clamp_probability(base_probability * multiplier);
        let delta = stressed_probability - base_probability;
        Ok(ScenarioResult {
            scenario: scenario.name.clone(),
            stressed_probability,
            delta,
            delta_pct: percent_change(delta, base_probability),
            shocked_variables,
        })
    }

    /// Shock each variable alone at every [`SENSITIVITY_SHOCKS`] magnitude
    pub fn sensitivity(
        &self,
        base_probability: f64,
        variables: &[StressVariable],
    ) -> Result<Vec<SensitivityPoint>> {
        validate_probability(base_probability)?;
        let mut points = Vec::with_capacity(variables.len() * SENSITIVITY_SHOCKS.len());
        for variable in variables {
            for &shock in &SENSITIVITY_SHOCKS {
                let stressed_probability =
                    clamp_probability(base_probability * variable.multiplier(shock));
                let delta = stressed_probability - base_probability;
                let elasticity = percent_change(delta, base_probability) / (shock * 100.0);
                points.push(SensitivityPoint {
                    variable: variable.name.clone(),
                    shock,
                    stressed_probability,
                    delta,
                    elasticity,
                });
            }
        }
        Ok(points)
    }

    /// Run every scenario plus sensitivity analysis
    pub fn run(&self, base_probability: f64, variables: &[StressVariable]) -> Result<StressReport> {
        if self.scenarios.is_empty() {
            return Err(QuantError::InsufficientData(
                "No stress scenarios configured".to_string(),
            ));
        }

        let results = self
            .scenarios
            .iter()
            .map(|scenario| self.run_scenario(base_probability, variables, scenario))
            .collect::<Result<Vec<_>>>()?;

        // Initialize with the first result so all-equal outcomes still name a scenario
        let first = &results[0];
        let (mut worst, mut best) = (first, first);
        let mut total = 0.0;
        for result in &results {
            total += result.stressed_probability;
            if result.stressed_probability > worst.stressed_probability {
                worst = result;
            }
            if result.stressed_probability < best.stressed_probability {
                best = result;
            }
        }

        let report = StressReport {
            base_probability,
            sensitivity: self.sensitivity(base_probability, variables)?,
            worst_scenario: worst.scenario.clone(),
            worst_probability: worst.stressed_probability,
            best_scenario: best.scenario.clone(),
            best_probability: best.stressed_probability,
            average_probability: total / results.len() as f64,
            results,
        };
        debug!(
            scenarios = report.results.len(),
            worst = %report.worst_scenario,
            worst_probability = report.worst_probability,
            "Stress test complete"
        );
        Ok(report)
    }
}

impl Default for StressTestEngine {
    fn default() -> Self {
        Self::with_standard_scenarios()
    }
}

fn validate_probability(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(QuantError::InvalidInput(format!(
            "base probability must be in [0, 1], got {}",
            p
        )));
    }
    Ok(())
}

/// Named macro scenarios over canonical factors
pub fn standard_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario::new(
            "Global Financial Crisis",
            "Credit freeze with a deep equity drawdown",
            &[
                ("equity_index", -0.40),
                ("credit_spread", 2.00),
                ("volatility", 2.50),
                ("gdp_growth", -0.05),
                ("unemployment", 0.50),
                ("interest_rate", -0.60),
            ],
        ),
        StressScenario::new(
            "Pandemic Shock",
            "Sudden stop in activity and a volatility spike",
            &[
                ("equity_index", -0.34),
                ("volatility", 3.00),
                ("gdp_growth", -0.08),
                ("unemployment", 1.00),
                ("oil_price", -0.50),
            ],
        ),
        StressScenario::new(
            "Inflation Surge",
            "Persistent inflation met by aggressive rate hikes",
            &[
                ("inflation", 0.50),
                ("interest_rate", 0.60),
                ("equity_index", -0.20),
                ("credit_spread", 0.40),
            ],
        ),
        StressScenario::new(
            "Currency Crisis",
            "Sharp depreciation with emergency tightening",
            &[
                ("exchange_rate", -0.30),
                ("interest_rate", 0.80),
                ("inflation", 0.30),
                ("gdp_growth", -0.03),
            ],
        ),
        StressScenario::new(
            "Oil Price Shock",
            "Supply disruption in energy markets",
            &[
                ("oil_price", 0.80),
                ("inflation", 0.20),
                ("gdp_growth", -0.02),
            ],
        ),
        StressScenario::new(
            "Mild Correction",
            "Orderly pullback in risk assets",
            &[("equity_index", -0.05), ("volatility", 0.30)],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn variables() -> Vec<StressVariable> {
        vec![
            StressVariable::new("Interest Rates", 0.2),
            StressVariable::new("CPI", 0.1),
            StressVariable::new("unrelated", 0.5),
        ]
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("Interest Rates"), "interest_rate");
        assert_eq!(canonicalize("interest-rate"), "interest_rate");
        assert_eq!(canonicalize("  VIX "), "volatility");
        assert_eq!(canonicalize("GDP"), "gdp_growth");
        assert_eq!(canonicalize("custom factor"), "custom_factor");
    }

    #[test]
    fn test_scenario_multiplier() {
        let engine = StressTestEngine::default();
        let scenario = StressScenario::new("test", "", &[("rates", 0.5), ("inflation", -0.2)]);
        let result = engine.run_scenario(0.2, &variables(), &scenario).unwrap();

        let expected = 0.2 * (1.0 + 0.5 * 1.2 * 0.5) * (1.0 + 0.2 * 1.1 * 0.5);
        assert_relative_eq!(result.stressed_probability, expected, epsilon = 1e-12);
        assert_eq!(result.shocked_variables, vec!["Interest Rates", "CPI"]);
        assert_relative_eq!(result.delta_pct, (expected - 0.2) / 0.2 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stressed_probability_is_clamped() {
        let engine = StressTestEngine::default();
        let scenario = StressScenario::new("huge", "", &[("rates", 50.0)]);
        let result = engine.run_scenario(0.5, &variables(), &scenario).unwrap();
        assert_eq!(result.stressed_probability, 0.99);

        let untouched = StressScenario::new("none", "", &[("oil", 0.5)]);
        let result = engine.run_scenario(0.001, &variables(), &untouched).unwrap();
        assert_eq!(result.stressed_probability, 0.01);
        assert!(result.shocked_variables.is_empty());
    }

    #[test]
    fn test_sensitivity_elasticity() {
        let engine = StressTestEngine::default();
        let vars = vec![StressVariable::new("rates", 0.0)];
        let points = engine.sensitivity(0.1, &vars).unwrap();
        assert_eq!(points.len(), 3);
        // Multiplier 1 + 0.5 * shock, so elasticity is 0.5 at every magnitude
        for point in &points {
            assert_relative_eq!(point.elasticity, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_report_worst_and_best() {
        let engine = StressTestEngine::with_standard_scenarios();
        let report = engine.run(0.2, &variables()).unwrap();
        assert_eq!(report.results.len(), standard_scenarios().len());
        let max = report
            .results
            .iter()
            .map(|r| r.stressed_probability)
            .fold(f64::MIN, f64::max);
        assert_eq!(report.worst_probability, max);
        assert!(report.best_probability <= report.average_probability);
        assert!(report.average_probability <= report.worst_probability);
        assert_eq!(report.worst_scenario, "Inflation Surge");
    }

    #[test]
    fn test_custom_scenarios_from_config() {
        let config = StressConfig {
            custom_scenarios: vec![StressScenario::new("Rate Spike", "", &[("rates", 1.0)])],
        };
        let engine = StressTestEngine::from_config(&config);
        assert_eq!(engine.scenarios().len(), standard_scenarios().len() + 1);
    }

    #[test]
    fn test_invalid_base_probability() {
        let engine = StressTestEngine::default();
        assert!(engine.run(1.5, &variables()).is_err());
        assert!(StressTestEngine::new(vec![]).run(0.5, &variables()).is_err());
    }
}
