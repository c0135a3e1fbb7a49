//! Correlation and regime analytics
//!
//! Provides:
//! - Full correlation matrices (Pearson, Spearman, Kendall)
//! - Key-relationship extraction with strength tiers and significance
//! - Rolling correlation with trend classification
//! - Correlation regime-break detection

use crate::error::{QuantError, Result};
use crate::series::TimeSeries;
use crate::stats;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Correlation estimator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        };
        f.write_str(name)
    }
}

impl FromStr for CorrelationMethod {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            other => Err(QuantError::InvalidInput(format!(
                "unknown correlation method '{}'",
                other
            ))),
        }
    }
}

/// Correlation of `x` and `y` over their common prefix
pub fn correlation(x: &[f64], y: &[f64], method: CorrelationMethod) -> f64 {
    match method {
        CorrelationMethod::Pearson => stats::pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
        CorrelationMethod::Kendall => kendall_tau(x, y),
    }
}

/// Spearman rank correlation: Pearson on ranks
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    stats::pearson(&stats::rank(&x[..n]), &stats::rank(&y[..n]))
}

/// Kendall's tau-a via full pairwise comparison
///
/// `(concordant - discordant) / C(n, 2)`; tied pairs count as neither.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mut score: i64 = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            let s = (x[i] - x[j]).signum() * (y[i] - y[j]).signum();
            if x[i] != x[j] && y[i] != y[j] {
                score += s as i64;
            }
        }
    }
    let pairs = (n * (n - 1) / 2) as f64;
    score as f64 / pairs
}

/// Symmetric correlation matrix over named variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Variable names in row/column order
    pub names: Vec<String>,

    /// Correlation values, unit diagonal
    pub matrix: DMatrix<f64>,

    /// Estimator used
    pub method: CorrelationMethod,

    /// Pairs whose correlation is a zero sentinel (constant or too-short
    /// input) rather than an estimate
    pub degenerate_pairs: Vec<(String, String)>,
}

impl CorrelationMatrix {
    /// Build a matrix from equal-length named columns
    pub fn from_columns(columns: &[(String, Vec<f64>)], method: CorrelationMethod) -> Result<Self> {
        if columns.is_empty() {
            return Err(QuantError::InsufficientData(
                "No variables provided".to_string(),
            ));
        }
        let n_obs = columns[0].1.len();
        for (name, data) in columns {
            if data.len() != n_obs {
                return Err(QuantError::InvalidInput(format!(
                    "Variable {} has {} observations, expected {}",
                    name,
                    data.len(),
                    n_obs
                )));
            }
        }

        let n = columns.len();
        let mut matrix = DMatrix::identity(n, n);
        let mut degenerate_pairs = Vec::new();

        for i in 0..n {
            for j in (i + 1)..n {
                let (ref name_i, ref xi) = columns[i];
                let (ref name_j, ref xj) = columns[j];
                let c = correlation(xi, xj, method);
                if n_obs < 2 || stats::std(xi) == 0.0 || stats::std(xj) == 0.0 {
                    degenerate_pairs.push((name_i.clone(), name_j.clone()));
                }
                matrix[(i, j)] = c;
                matrix[(j, i)] = c;
            }
        }

        if !degenerate_pairs.is_empty() {
            warn!(
                count = degenerate_pairs.len(),
                "Correlation matrix contains degenerate pairs reported as zero"
            );
        }

        Ok(Self {
            names: columns.iter().map(|(name, _)| name.clone()).collect(),
            matrix,
            method,
            degenerate_pairs,
        })
    }

    /// Build a matrix from a panel of equal-length series
    pub fn from_series(series: &[TimeSeries], method: CorrelationMethod) -> Result<Self> {
        let columns: Vec<(String, Vec<f64>)> = series
            .iter()
            .map(|s| (s.name().to_string(), s.values().to_vec()))
            .collect();
        Self::from_columns(&columns, method)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a variable by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Correlation between two named variables
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.matrix[(self.index_of(a)?, self.index_of(b)?)])
    }
}

/// Strength tier of a correlation by absolute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl CorrelationStrength {
    pub fn classify(correlation: f64) -> Self {
        match correlation.abs() {
            c if c < 0.4 => CorrelationStrength::Weak,
            c if c < 0.6 => CorrelationStrength::Moderate,
            c if c < 0.8 => CorrelationStrength::Strong,
            _ => CorrelationStrength::VeryStrong,
        }
    }
}

/// One off-diagonal pair of a correlation matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRelationship {
    pub first: String,
    pub second: String,
    pub correlation: f64,
    pub strength: CorrelationStrength,

    /// `r * sqrt((n - 2) / (1 - r^2))`
    pub t_statistic: f64,

    /// Two-sided p-value of the t statistic under a normal approximation
    pub p_value: f64,
}

/// All off-diagonal pairs, strongest first
///
/// `n_obs` is the sample size the matrix was estimated from.
pub fn key_relationships(matrix: &CorrelationMatrix, n_obs: usize) -> Vec<KeyRelationship> {
    let n = matrix.len();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            let r = matrix.matrix[(i, j)];
            let t = t_statistic(r, n_obs);
            let p_value = if t.is_infinite() {
                0.0
            } else {
                2.0 * (1.0 - stats::normal_cdf(t.abs()))
            };
            out.push(KeyRelationship {
                first: matrix.names[i].clone(),
                second: matrix.names[j].clone(),
                correlation: r,
                strength: CorrelationStrength::classify(r),
                t_statistic: t,
                p_value,
            });
        }
    }

    out.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    out
}

fn t_statistic(r: f64, n_obs: usize) -> f64 {
    if n_obs < 3 {
        return 0.0;
    }
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return if r >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
    }
    r * ((n_obs - 2) as f64 / denom).sqrt()
}

/// Direction of a rolling correlation series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Fixed-window Pearson correlation walked across two series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingCorrelation {
    pub window: usize,

    /// One value per full window; element `k` covers points `k..k + window`
    pub values: Vec<f64>,

    pub trend: CorrelationTrend,

    /// Second-half mean minus first-half mean of `values`
    pub trend_change: f64,
}

/// Rolling Pearson correlation
pub fn rolling_correlation(x: &[f64], y: &[f64], window: usize) -> Result<RollingCorrelation> {
    if window < 2 {
        return Err(QuantError::InvalidInput(format!(
            "rolling correlation window must be at least 2, got {}",
            window
        )));
    }
    let n = x.len().min(y.len());
    let values: Vec<f64> = if n < window {
        Vec::new()
    } else {
        (0..=n - window)
            .map(|k| stats::pearson(&x[k..k + window], &y[k..k + window]))
            .collect()
    };

    let half = values.len() / 2;
    let trend_change = if half == 0 {
        0.0
    } else {
        stats::mean(&values[half..]) - stats::mean(&values[..half])
    };
    let trend = if trend_change > 0.1 {
        CorrelationTrend::Increasing
    } else if trend_change < -0.1 {
        CorrelationTrend::Decreasing
    } else {
        CorrelationTrend::Stable
    };

    Ok(RollingCorrelation {
        window,
        values,
        trend,
        trend_change,
    })
}

/// Severity tier shared by regime breaks and contagion events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A detected break in the correlation of one variable pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeChange {
    pub first: String,
    pub second: String,

    /// Index of the first observation of the "after" window
    pub index: usize,

    pub correlation_before: f64,
    pub correlation_after: f64,

    /// `correlation_after - correlation_before`
    pub change: f64,

    pub severity: Severity,
}

impl RegimeChange {
    /// Severity from the absolute correlation change
    pub fn severity_for(change: f64) -> Severity {
        match change.abs() {
            c if c > 0.8 => Severity::Critical,
            c if c > 0.6 => Severity::High,
            c if c > 0.45 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Scan a pair for correlation breaks
///
/// At each candidate split `i` the `window` points before and after are
/// compared. Needs at least `3 * window` points. After a detected break the
/// scan jumps one full window ahead so reports do not overlap.
pub fn detect_regime_changes(
    names: (&str, &str),
    x: &[f64],
    y: &[f64],
    window: usize,
    threshold: f64,
) -> Result<Vec<RegimeChange>> {
    if window < 2 {
        return Err(QuantError::InvalidInput(format!(
            "regime window must be at least 2, got {}",
            window
        )));
    }
    let n = x.len().min(y.len());
    let mut changes = Vec::new();
    if n < 3 * window {
        debug!(
            n,
            window, "Series too short for regime detection, skipping"
        );
        return Ok(changes);
    }

    let mut i = window;
    while i + window <= n {
        let before = stats::pearson(&x[i - window..i], &y[i - window..i]);
        let after = stats::pearson(&x[i..i + window], &y[i..i + window]);
        let change = after - before;

        if change.abs() > threshold {
            changes.push(RegimeChange {
                first: names.0.to_string(),
                second: names.1.to_string(),
                index: i,
                correlation_before: before,
                correlation_after: after,
                change,
                severity: RegimeChange::severity_for(change),
            });
            i += window;
        } else {
            i += 1;
        }
    }

    debug!(
        first = names.0,
        second = names.1,
        breaks = changes.len(),
        "Regime scan complete"
    );
    Ok(changes)
}

/// Run regime detection over every pair in a panel
pub fn detect_panel_regime_changes(
    columns: &[(String, Vec<f64>)],
    window: usize,
    threshold: f64,
) -> Result<Vec<RegimeChange>> {
    let mut all = Vec::new();
    for i in 0..columns.len() {
        for j in (i + 1)..columns.len() {
            let (ref a, ref xa) = columns[i];
            let (ref b, ref xb) = columns[j];
            all.extend(detect_regime_changes((a, b), xa, xb, window, threshold)?);
        }
    }
    Ok(all)
}
