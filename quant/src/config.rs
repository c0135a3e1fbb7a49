//! Engine configuration
//!
//! One serde struct per component, collected into [`EngineConfig`]. Every
//! field has a default so partial YAML/JSON documents are accepted;
//! unsupported enumeration values are rejected while parsing.

use crate::backtest::BacktestConfig;
use crate::contagion::ContagionConfig;
use crate::copula::{CopulaFamily, DEFAULT_STUDENT_T_DF};
use crate::correlation::CorrelationMethod;
use crate::error::{QuantError, Result};
use crate::models::ModelKind;
use crate::series::{Frequency, TimeSeries};
use crate::simulation::SimulationConfig;
use crate::stress::StressConfig;
use crate::tail::TailConfig;
use crate::var::VarConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stochastic model selection
    #[serde(default)]
    pub models: ModelSelectorConfig,

    /// Copula family selection
    #[serde(default)]
    pub copulas: CopulaSelectorConfig,

    /// Correlation and regime analysis
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Extreme value analysis
    #[serde(default)]
    pub tail: TailConfig,

    /// VaR / ES engine
    #[serde(default)]
    pub var: VarConfig,

    /// Probability backtesting
    #[serde(default)]
    pub backtest: BacktestConfig,

    /// Stress scenarios beyond the standard set
    #[serde(default)]
    pub stress: StressConfig,

    /// Contagion detection
    #[serde(default)]
    pub contagion: ContagionConfig,

    /// Monte Carlo scenario generation
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl EngineConfig {
    /// Parse a YAML document
    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)
            .map_err(|e| QuantError::Config(format!("invalid YAML config: {}", e)))?;
        config.validate()?;
        debug!("Loaded engine config from YAML");
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)
            .map_err(|e| QuantError::Config(format!("invalid JSON config: {}", e)))?;
        config.validate()?;
        debug!("Loaded engine config from JSON");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| QuantError::Config(e.to_string()))
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.models.models.is_empty() {
            return Err(QuantError::Config("models.models must not be empty".to_string()));
        }
        if self.copulas.families.is_empty() {
            return Err(QuantError::Config("copulas.families must not be empty".to_string()));
        }
        if self.copulas.student_t_df <= 2.0 {
            return Err(QuantError::Config(format!(
                "copulas.student_t_df must exceed 2, got {}",
                self.copulas.student_t_df
            )));
        }
        if self.correlation.rolling_window < 2 || self.correlation.regime_window < 2 {
            return Err(QuantError::Config(
                "correlation windows must be at least 2".to_string(),
            ));
        }
        if let Some(c) = self
            .var
            .confidence_levels
            .iter()
            .find(|c| !(**c > 0.0 && **c < 1.0))
        {
            return Err(QuantError::Config(format!(
                "var.confidence_levels entries must lie in (0, 1), got {}",
                c
            )));
        }
        if self.backtest.n_bins < 3 {
            return Err(QuantError::Config(format!(
                "backtest.n_bins must be at least 3, got {}",
                self.backtest.n_bins
            )));
        }
        Ok(())
    }
}

/// Model selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelectorConfig {
    /// Model kinds to fit and rank
    #[serde(default = "default_models")]
    pub models: Vec<ModelKind>,

    /// Frequency used when building series from raw config-driven inputs
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
}

fn default_models() -> Vec<ModelKind> {
    ModelKind::ALL.to_vec()
}

fn default_frequency() -> Frequency {
    Frequency::Daily
}

impl ModelSelectorConfig {
    /// Build a series at the configured frequency from raw observations
    pub fn series(
        &self,
        name: impl Into<String>,
        pairs: Vec<(DateTime<Utc>, f64)>,
    ) -> Result<TimeSeries> {
        TimeSeries::from_pairs(name, pairs, self.frequency)
    }
}

impl Default for ModelSelectorConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            frequency: default_frequency(),
        }
    }
}

/// Copula selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaSelectorConfig {
    /// Families to fit and rank
    #[serde(default = "default_families")]
    pub families: Vec<CopulaFamily>,

    /// Degrees of freedom for the Student-t copula
    #[serde(default = "default_student_t_df")]
    pub student_t_df: f64,
}

fn default_families() -> Vec<CopulaFamily> {
    CopulaFamily::ALL.to_vec()
}

fn default_student_t_df() -> f64 {
    DEFAULT_STUDENT_T_DF
}

impl Default for CopulaSelectorConfig {
    fn default() -> Self {
        Self {
            families: default_families(),
            student_t_df: default_student_t_df(),
        }
    }
}

/// Correlation analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub method: CorrelationMethod,

    /// Window for rolling correlation series
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,

    /// Window for the before/after regime comparison
    #[serde(default = "default_regime_window")]
    pub regime_window: usize,

    /// Minimum absolute correlation change reported as a regime change
    #[serde(default = "default_regime_threshold")]
    pub regime_threshold: f64,
}

fn default_rolling_window() -> usize {
    30
}

fn default_regime_window() -> usize {
    30
}

fn default_regime_threshold() -> f64 {
    0.3
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::default(),
            rolling_window: default_rolling_window(),
            regime_window: default_regime_window(),
            regime_threshold: default_regime_threshold(),
        }
    }
}
