//! Extreme value analysis of a single return series
//!
//! Tail-index estimators (Hill, Pickands), a Generalized Pareto fit to
//! threshold exceedances, extreme quantiles under Normal and GPD
//! assumptions, and a Jarque-Bera comparison against the Normal.

use crate::error::{QuantError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Jarque-Bera critical value at 5% (chi-square, 2 degrees of freedom)
pub const JARQUE_BERA_CRITICAL: f64 = 5.99;

/// Minimum exceedances for a method-of-moments GPD fit
pub const MIN_EXCEEDANCES: usize = 10;

const GPD_SHAPE_MIN: f64 = -0.5;
const GPD_SHAPE_MAX: f64 = 1.0;
const SHAPE_EPSILON: f64 = 1e-6;

/// Which tail of the series to analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailSide {
    /// Large positive values
    #[default]
    Upper,
    /// Large negative values, analyzed on the negated series
    Lower,
}

/// Tail analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailConfig {
    /// Percentile (0-100) above which observations count as exceedances
    #[serde(default = "default_threshold_percentile")]
    pub threshold_percentile: f64,

    /// Tail probabilities at which extreme quantiles are reported
    #[serde(default = "default_exceedance_probabilities")]
    pub exceedance_probabilities: Vec<f64>,

    #[serde(default)]
    pub tail: TailSide,
}

fn default_threshold_percentile() -> f64 {
    95.0
}

fn default_exceedance_probabilities() -> Vec<f64> {
    vec![0.01, 0.005, 0.001]
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: default_threshold_percentile(),
            exceedance_probabilities: default_exceedance_probabilities(),
            tail: TailSide::default(),
        }
    }
}

/// Generalized Pareto fit to exceedances over a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpdFit {
    pub threshold: f64,
    /// Shape `xi`, clamped to `[-0.5, 1]`
    pub shape: f64,
    /// Scale `sigma`
    pub scale: f64,
    pub n_exceedances: usize,
    /// Share of the sample above the threshold
    pub exceedance_rate: f64,
    /// Too few exceedances (or zero spread) for the moment estimator; shape
    /// is `0`
    pub degenerate: bool,
}

impl GpdFit {
    /// Quantile exceeded with probability `p` over the whole sample
    pub fn quantile(&self, p: f64) -> f64 {
        if self.n_exceedances == 0 || self.exceedance_rate <= 0.0 {
            return self.threshold;
        }
        let ratio = p / self.exceedance_rate;
        if self.shape.abs() < SHAPE_EPSILON {
            self.threshold - self.scale * ratio.ln()
        } else {
            self.threshold + self.scale / self.shape * (ratio.powf(-self.shape) - 1.0)
        }
    }

    /// Mean of values beyond `quantile`
    ///
    /// Infinite when the shape is 1 or larger.
    pub fn expected_shortfall(&self, quantile: f64) -> f64 {
        if self.shape >= 1.0 {
            return f64::INFINITY;
        }
        (quantile + self.scale - self.shape * self.threshold) / (1.0 - self.shape)
    }
}

/// Extreme quantile at one tail probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremeQuantile {
    pub probability: f64,
    pub normal: f64,
    pub gpd: f64,
    pub gpd_expected_shortfall: f64,
}

/// Four-level classification of excess kurtosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailHeaviness {
    Thin,
    Normal,
    Heavy,
    VeryHeavy,
}

impl TailHeaviness {
    pub fn classify(excess_kurtosis: f64) -> Self {
        if excess_kurtosis < -0.5 {
            TailHeaviness::Thin
        } else if excess_kurtosis < 1.0 {
            TailHeaviness::Normal
        } else if excess_kurtosis < 5.0 {
            TailHeaviness::Heavy
        } else {
            TailHeaviness::VeryHeavy
        }
    }
}

/// Comparison against the Normal distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityTest {
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub jarque_bera: f64,
    /// Normality rejected at the 5% level
    pub rejects_normality: bool,
    pub heaviness: TailHeaviness,
}

impl NormalityTest {
    pub fn from_data(data: &[f64]) -> Self {
        let n = data.len() as f64;
        let skewness = stats::skewness(data);
        let excess_kurtosis = stats::excess_kurtosis(data);
        let jarque_bera = n / 6.0 * (skewness.powi(2) + excess_kurtosis.powi(2) / 4.0);
        Self {
            skewness,
            excess_kurtosis,
            jarque_bera,
            rejects_normality: jarque_bera > JARQUE_BERA_CRITICAL,
            heaviness: TailHeaviness::classify(excess_kurtosis),
        }
    }
}

/// Full output of [`analyze_tail`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailAnalysis {
    pub side: TailSide,
    pub n_obs: usize,
    /// Hill estimate of the shape `1 / alpha`
    pub hill_shape: f64,
    /// Hill tail index `alpha`, `0` when the shape is degenerate
    pub hill_tail_index: f64,
    pub pickands_shape: f64,
    pub gpd: GpdFit,
    pub quantiles: Vec<ExtremeQuantile>,
    pub normality: NormalityTest,
    pub fat_tails: bool,
}

/// Hill estimator over the top `floor(sqrt(n))` order statistics
///
/// Only defined for positive order statistics; anything else yields `0`.
pub fn hill_estimator(data: &[f64]) -> f64 {
    let mut desc = stats::sorted(data);
    desc.reverse();
    let k = (data.len() as f64).sqrt().floor() as usize;
    if k == 0 || k >= desc.len() {
        return 0.0;
    }
    let anchor = desc[k];
    if anchor <= 0.0 {
        return 0.0;
    }
    desc[..k].iter().map(|x| (x / anchor).ln()).sum::<f64>() / k as f64
}

/// Pickands estimator with `k = n / 4`
pub fn pickands_estimator(data: &[f64]) -> f64 {
    let mut desc = stats::sorted(data);
    desc.reverse();
    let k = desc.len() / 4;
    if k == 0 {
        return 0.0;
    }
    // 1-based order statistics X(k), X(2k), X(4k)
    let (xk, x2k, x4k) = (desc[k - 1], desc[2 * k - 1], desc[4 * k - 1]);
    let num = xk - x2k;
    let den = x2k - x4k;
    if num <= 0.0 || den <= 0.0 {
        return 0.0;
    }
    (num / den).ln() / std::f64::consts::LN_2
}

/// Method-of-moments GPD fit to exceedances over the `percentile` threshold
pub fn fit_gpd(data: &[f64], percentile: f64) -> GpdFit {
    let threshold = stats::percentile(data, percentile);
    let excess: Vec<f64> = data
        .iter()
        .filter(|&&x| x > threshold)
        .map(|x| x - threshold)
        .collect();
    let n_exceedances = excess.len();
    let exceedance_rate = if data.is_empty() {
        0.0
    } else {
        n_exceedances as f64 / data.len() as f64
    };

    let m = stats::mean(&excess);
    let s2 = stats::variance(&excess);
    if n_exceedances < MIN_EXCEEDANCES || s2 <= 0.0 {
        warn!(n_exceedances, "Too few exceedances for a GPD fit, shape set to 0");
        return GpdFit {
            threshold,
            shape: 0.0,
            scale: m,
            n_exceedances,
            exceedance_rate,
            degenerate: true,
        };
    }

    let ratio = m * m / s2;
    let shape = (0.5 * (1.0 - ratio)).clamp(GPD_SHAPE_MIN, GPD_SHAPE_MAX);
    let scale = 0.5 * m * (ratio + 1.0);
    GpdFit {
        threshold,
        shape,
        scale,
        n_exceedances,
        exceedance_rate,
        degenerate: false,
    }
}

/// Run every tail estimator over `data`
pub fn analyze_tail(data: &[f64], config: &TailConfig) -> Result<TailAnalysis> {
    if data.is_empty() {
        return Err(QuantError::InvalidInput(
            "tail analysis needs at least one observation".to_string(),
        ));
    }
    if !(0.0..100.0).contains(&config.threshold_percentile) {
        return Err(QuantError::InvalidInput(format!(
            "threshold percentile must be in [0, 100), got {}",
            config.threshold_percentile
        )));
    }
    if let Some(&p) = config
        .exceedance_probabilities
        .iter()
        .find(|&&p| p <= 0.0 || p >= 1.0)
    {
        return Err(QuantError::InvalidConfidenceLevel(p));
    }

    let oriented: Vec<f64> = match config.tail {
        TailSide::Upper => data.to_vec(),
        TailSide::Lower => data.iter().map(|x| -x).collect(),
    };

    let hill_shape = hill_estimator(&oriented);
    let pickands_shape = pickands_estimator(&oriented);
    let gpd = fit_gpd(&oriented, config.threshold_percentile);

    let mean = stats::mean(&oriented);
    let std = stats::std(&oriented);
    let quantiles = config
        .exceedance_probabilities
        .iter()
        .map(|&p| {
            let gpd_q = gpd.quantile(p);
            ExtremeQuantile {
                probability: p,
                normal: mean + std * stats::normal_quantile(1.0 - p),
                gpd: gpd_q,
                gpd_expected_shortfall: gpd.expected_shortfall(gpd_q),
            }
        })
        .collect();

    let normality = NormalityTest::from_data(&oriented);
    let fat_tails = normality.excess_kurtosis > 1.0 || gpd.shape > 0.1;
    debug!(
        hill_shape,
        pickands_shape,
        gpd_shape = gpd.shape,
        fat_tails,
        "Tail analysis complete"
    );

    Ok(TailAnalysis {
        side: config.tail,
        n_obs: data.len(),
        hill_shape,
        hill_tail_index: if hill_shape > 0.0 { 1.0 / hill_shape } else { 0.0 },
        pickands_shape,
        gpd,
        quantiles,
        normality,
        fat_tails,
    })
}
