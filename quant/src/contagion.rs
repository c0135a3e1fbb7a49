//! Contagion detection across a panel of return series
//!
//! Crisis windows are found on a proxy series where rolling annualized
//! volatility rises above `mean + 2 * std` of its own history. Within each
//! crisis, pairwise correlation is compared against an equal-length
//! pre-crisis window with a Fisher z test. A variable whose correlation to
//! two or more others jumps significantly is reported as a contagion source.
//!
//! Spillover (lag-1 cross-correlation) and a simple correlation network
//! (degree centrality, clusters, systemic contribution) are computed on the
//! full sample.

use crate::correlation::{CorrelationMatrix, CorrelationMethod, Severity};
use crate::error::{QuantError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Two-sided 5% critical value of the Fisher z test
pub const FISHER_Z_CRITICAL: f64 = 1.96;

/// Minimum correlation increase counted as a contagion jump
pub const JUMP_THRESHOLD: f64 = 0.2;

const ANNUALIZATION: f64 = 252.0;
const CENTRALITY_THRESHOLD: f64 = 0.5;
const CLUSTER_THRESHOLD: f64 = 0.7;
const MIN_JUMPS: usize = 2;

/// Contagion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContagionConfig {
    /// Rolling window for the proxy volatility
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,

    #[serde(default = "default_max_crisis_periods")]
    pub max_crisis_periods: usize,

    /// Variable used for crisis detection, the first column when unset
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_volatility_window() -> usize {
    20
}

fn default_max_crisis_periods() -> usize {
    5
}

impl Default for ContagionConfig {
    fn default() -> Self {
        Self {
            volatility_window: default_volatility_window(),
            max_crisis_periods: default_max_crisis_periods(),
            proxy: None,
        }
    }
}

/// Inclusive index range of a high-volatility window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisPeriod {
    pub start: usize,
    pub end: usize,
    pub peak_volatility: f64,
}

impl CrisisPeriod {
    /// Number of observations in the period
    pub fn n_obs(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Pre-crisis versus crisis correlation of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationShift {
    pub first: String,
    pub second: String,
    /// Index into [`ContagionAnalysis::crisis_periods`]
    pub period: usize,
    pub pre_crisis: f64,
    pub crisis: f64,
    pub change: f64,
    pub z_statistic: f64,
    pub significant: bool,
}

/// A variable whose correlation to several others jumped in one crisis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContagionEvent {
    pub source: String,
    pub period: usize,
    pub affected: Vec<String>,
    pub correlation_before: f64,
    pub correlation_after: f64,
    pub average_jump: f64,
    pub severity: Severity,
}

/// Directional lag-1 spillover of one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalSpillover {
    pub variable: String,
    /// Mean |corr(self[t], other[t+1])|
    pub to_others: f64,
    /// Mean |corr(other[t], self[t+1])|
    pub from_others: f64,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpilloverAnalysis {
    /// Mean absolute lag-1 cross-correlation over ordered pairs
    pub index: f64,
    pub directional: Vec<DirectionalSpillover>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    /// Share of other variables with |correlation| above 0.5
    pub degree_centrality: BTreeMap<String, f64>,
    /// Groups of two or more variables with |correlation| above 0.7 to the
    /// group seed
    pub clusters: Vec<Vec<String>>,
    /// Mean |correlation| to every other variable
    pub systemic_risk: BTreeMap<String, f64>,
}

/// Output of [`analyze_contagion`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContagionAnalysis {
    pub proxy: String,
    pub crisis_periods: Vec<CrisisPeriod>,
    pub shifts: Vec<CorrelationShift>,
    pub events: Vec<ContagionEvent>,
    pub spillover: SpilloverAnalysis,
    pub network: NetworkAnalysis,
}

/// Severity from the average correlation jump
pub fn contagion_severity(average_jump: f64) -> Severity {
    if average_jump > 0.5 {
        Severity::Critical
    } else if average_jump > 0.35 {
        Severity::High
    } else if average_jump > 0.25 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Annualized rolling standard deviation; element `k` covers `k..k + window`
pub fn rolling_volatility(returns: &[f64], window: usize) -> Vec<f64> {
    if window < 2 || returns.len() < window {
        return Vec::new();
    }
    returns
        .windows(window)
        .map(|w| stats::std(w) * ANNUALIZATION.sqrt())
        .collect()
}

/// High-volatility windows of `returns`, merged and capped
pub fn detect_crisis_periods(returns: &[f64], window: usize, max_periods: usize) -> Vec<CrisisPeriod> {
    let vol = rolling_volatility(returns, window);
    if vol.len() < 2 {
        return Vec::new();
    }
    let threshold = stats::mean(&vol) + 2.0 * stats::std(&vol);

    let mut periods: Vec<CrisisPeriod> = Vec::new();
    let mut run: Option<(usize, usize, f64)> = None;
    for (k, &v) in vol.iter().enumerate() {
        if v > threshold {
            run = Some(match run {
                Some((start, _, peak)) => (start, k, peak.max(v)),
                None => (k, k, v),
            });
        } else if let Some((start, last, peak)) = run.take() {
            periods.push(CrisisPeriod {
                start,
                end: last + window - 1,
                peak_volatility: peak,
            });
        }
    }
    if let Some((start, last, peak)) = run {
        periods.push(CrisisPeriod {
            start,
            end: last + window - 1,
            peak_volatility: peak,
        });
    }
    periods.truncate(max_periods);
    periods
}

/// Fisher z statistic for the difference of two correlations
///
/// `0` when either sample has three or fewer points.
pub fn fisher_z_test(r_before: f64, n_before: usize, r_after: f64, n_after: usize) -> f64 {
    if n_before <= 3 || n_after <= 3 {
        return 0.0;
    }
    let z_before = r_before.clamp(-0.9999, 0.9999).atanh();
    let z_after = r_after.clamp(-0.9999, 0.9999).atanh();
    let se = (1.0 / (n_before - 3) as f64 + 1.0 / (n_after - 3) as f64).sqrt();
    (z_after - z_before) / se
}

/// Lag-1 cross-correlation spillover
pub fn spillover(columns: &[(String, Vec<f64>)]) -> SpilloverAnalysis {
    let k = columns.len();
    let mut lagged = vec![vec![0.0; k]; k];
    for (i, (_, xi)) in columns.iter().enumerate() {
        for (j, (_, xj)) in columns.iter().enumerate() {
            if i != j && xi.len() > 2 && xj.len() > 2 {
                let n = xi.len().min(xj.len());
                lagged[i][j] = stats::pearson(&xi[..n - 1], &xj[1..n]).abs();
            }
        }
    }

    let others = (k.saturating_sub(1)).max(1) as f64;
    let directional: Vec<DirectionalSpillover> = columns
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            let to_others = (0..k).filter(|&j| j != i).map(|j| lagged[i][j]).sum::<f64>() / others;
            let from_others = (0..k).filter(|&j| j != i).map(|j| lagged[j][i]).sum::<f64>() / others;
            DirectionalSpillover {
                variable: name.clone(),
                to_others,
                from_others,
                net: to_others - from_others,
            }
        })
        .collect();

    let index = if k > 1 {
        directional.iter().map(|d| d.to_others).sum::<f64>() / k as f64
    } else {
        0.0
    };
    SpilloverAnalysis { index, directional }
}

/// Degree centrality, naive clusters and systemic contribution
pub fn network(matrix: &CorrelationMatrix) -> NetworkAnalysis {
    let k = matrix.len();
    let others = (k.saturating_sub(1)).max(1) as f64;
    let mut degree_centrality = BTreeMap::new();
    let mut systemic_risk = BTreeMap::new();
    for (i, name) in matrix.names.iter().enumerate() {
        let off: Vec<f64> = (0..k)
            .filter(|&j| j != i)
            .map(|j| matrix.matrix[(i, j)].abs())
            .collect();
        let degree = off.iter().filter(|&&c| c > CENTRALITY_THRESHOLD).count();
        degree_centrality.insert(name.clone(), degree as f64 / others);
        systemic_risk.insert(name.clone(), off.iter().sum::<f64>() / others);
    }

    let mut assigned = vec![false; k];
    let mut clusters = Vec::new();
    for i in 0..k {
        if assigned[i] {
            continue;
        }
        let mut members = vec![i];
        for j in (i + 1)..k {
            if !assigned[j] && matrix.matrix[(i, j)].abs() > CLUSTER_THRESHOLD {
                members.push(j);
            }
        }
        if members.len() > 1 {
            for &m in &members {
                assigned[m] = true;
            }
            clusters.push(members.iter().map(|&m| matrix.names[m].clone()).collect());
        }
    }

    NetworkAnalysis {
        degree_centrality,
        clusters,
        systemic_risk,
    }
}

/// Run crisis detection, correlation-shift tests, spillover and network
/// analysis over a panel of equal-length return columns
pub fn analyze_contagion(
    columns: &[(String, Vec<f64>)],
    config: &ContagionConfig,
) -> Result<ContagionAnalysis> {
    if columns.len() < 2 {
        return Err(QuantError::InvalidInput(
            "contagion analysis needs at least two variables".to_string(),
        ));
    }
    let matrix = CorrelationMatrix::from_columns(columns, CorrelationMethod::Pearson)?;

    let proxy_idx = match &config.proxy {
        Some(name) => columns
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| QuantError::NotFound(format!("proxy variable '{}'", name)))?,
        None => 0,
    };
    let proxy = columns[proxy_idx].0.clone();

    let crisis_periods = detect_crisis_periods(
        &columns[proxy_idx].1,
        config.volatility_window,
        config.max_crisis_periods,
    );
    debug!(proxy = %proxy, periods = crisis_periods.len(), "Crisis periods detected");

    let mut shifts = Vec::new();
    for (p, period) in crisis_periods.iter().enumerate() {
        let len = period.n_obs();
        let pre_start = match period.start.checked_sub(len) {
            Some(start) if len > 3 => start,
            _ => {
                debug!(period = p, "No equal-length pre-crisis window, skipping");
                continue;
            }
        };
        for i in 0..columns.len() {
            for j in (i + 1)..columns.len() {
                let (ref a, ref xa) = columns[i];
                let (ref b, ref xb) = columns[j];
                let pre = stats::pearson(&xa[pre_start..period.start], &xb[pre_start..period.start]);
                let crisis = stats::pearson(&xa[period.start..=period.end], &xb[period.start..=period.end]);
                let z = fisher_z_test(pre, len, crisis, len);
                shifts.push(CorrelationShift {
                    first: a.clone(),
                    second: b.clone(),
                    period: p,
                    pre_crisis: pre,
                    crisis,
                    change: crisis - pre,
                    z_statistic: z,
                    significant: z.abs() > FISHER_Z_CRITICAL,
                });
            }
        }
    }

    let events = contagion_events(columns, &shifts, crisis_periods.len());
    if !events.is_empty() {
        info!(events = events.len(), "Contagion detected");
    }

    Ok(ContagionAnalysis {
        proxy,
        crisis_periods,
        shifts,
        events,
        spillover: spillover(columns),
        network: network(&matrix),
    })
}

fn contagion_events(
    columns: &[(String, Vec<f64>)],
    shifts: &[CorrelationShift],
    n_periods: usize,
) -> Vec<ContagionEvent> {
    let mut events = Vec::new();
    for period in 0..n_periods {
        for (source, _) in columns {
            let jumps: Vec<(&str, &CorrelationShift)> = shifts
                .iter()
                .filter(|s| s.period == period && s.significant && s.change > JUMP_THRESHOLD)
                .filter_map(|s| {
                    if &s.first == source {
                        Some((s.second.as_str(), s))
                    } else if &s.second == source {
                        Some((s.first.as_str(), s))
                    } else {
                        None
                    }
                })
                .collect();
            if jumps.len() < MIN_JUMPS {
                continue;
            }
            let count = jumps.len() as f64;
            let average_jump = jumps.iter().map(|(_, s)| s.change).sum::<f64>() / count;
            events.push(ContagionEvent {
                source: source.clone(),
                period,
                affected: jumps.iter().map(|(name, _)| name.to_string()).collect(),
                correlation_before: jumps.iter().map(|(_, s)| s.pre_crisis).sum::<f64>() / count,
                correlation_after: jumps.iter().map(|(_, s)| s.crisis).sum::<f64>() / count,
                average_jump,
                severity: contagion_severity(average_jump),
            });
        }
    }
    events
}
