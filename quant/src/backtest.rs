//! Backtesting and calibration of probabilistic forecasts
//!
//! Predicted probabilities are matched to realized binary outcomes on the
//! exact `(event_id, date)` key. Matched pairs are scored (hit rate, Brier,
//! log loss, AUC), checked for calibration (Hosmer-Lemeshow plus a
//! logit-space slope/intercept) and scanned for windows of poor accuracy.

use crate::error::{QuantError, Result};
use crate::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Probabilities are clamped into `[LOG_LOSS_CLAMP, 1 - LOG_LOSS_CLAMP]`
/// before taking logs
pub const LOG_LOSS_CLAMP: f64 = 0.001;

/// Mean squared error above which a window is reported as a failure period
pub const FAILURE_MSE_THRESHOLD: f64 = 0.3;

const MIN_FAILURE_WINDOW: usize = 10;
const SLOPE_MIN: f64 = 0.1;
const SLOPE_MAX: f64 = 3.0;

/// Backtest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Equal-width probability bins for calibration
    #[serde(default = "default_n_bins")]
    pub n_bins: usize,
}

fn default_n_bins() -> usize {
    10
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            n_bins: default_n_bins(),
        }
    }
}

/// A dated forecast of the probability that an event occurs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub probability: f64,
}

/// A dated realized outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub occurred: bool,
}

/// Prediction and outcome sharing the same key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub probability: f64,
    pub occurred: bool,
}

impl MatchedRecord {
    fn target(&self) -> f64 {
        if self.occurred {
            1.0
        } else {
            0.0
        }
    }

    fn squared_error(&self) -> f64 {
        (self.probability - self.target()).powi(2)
    }
}

/// One equal-width bin of the reliability diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_predicted: f64,
    pub observed_rate: f64,
}

/// Goodness-of-fit of predicted probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Hosmer-Lemeshow statistic
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub calibration_slope: f64,
    pub calibration_intercept: f64,
    pub is_well_calibrated: bool,
    pub bins: Vec<ReliabilityBin>,
    /// Every clamped logit prediction is identical; slope and intercept are the identity
    pub degenerate: bool,
}

/// Window of time-sorted records with poor accuracy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub n_records: usize,
    pub mean_squared_error: f64,
}

/// Output of [`run_backtest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub n_matched: usize,
    /// Predictions without an outcome for their key
    pub n_unmatched: usize,
    pub hit_rate: f64,
    pub brier_score: f64,
    pub log_loss: f64,
    pub auc: f64,
    pub calibration: CalibrationResult,
    pub failure_periods: Vec<FailurePeriod>,
}

/// Join predictions to outcomes on `(event_id, date)`
///
/// The result is sorted by date, then event id. Fails with `NotFound` when
/// no prediction has a matching outcome.
pub fn match_records(predictions: &[Prediction], outcomes: &[Outcome]) -> Result<Vec<MatchedRecord>> {
    let index: BTreeMap<(&str, DateTime<Utc>), bool> = outcomes
        .iter()
        .map(|o| ((o.event_id.as_str(), o.date), o.occurred))
        .collect();

    let mut matched: Vec<MatchedRecord> = predictions
        .iter()
        .filter_map(|p| {
            index
                .get(&(p.event_id.as_str(), p.date))
                .map(|&occurred| MatchedRecord {
                    event_id: p.event_id.clone(),
                    date: p.date,
                    probability: p.probability,
                    occurred,
                })
        })
        .collect();

    if matched.is_empty() {
        return Err(QuantError::NotFound(format!(
            "no matching (event_id, date) pairs between {} predictions and {} outcomes",
            predictions.len(),
            outcomes.len()
        )));
    }
    matched.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.event_id.cmp(&b.event_id)));
    Ok(matched)
}

/// Share of predictions on the right side of 0.5
pub fn hit_rate(probabilities: &[f64], outcomes: &[bool]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    let hits = probabilities
        .iter()
        .zip(outcomes)
        .filter(|&(&p, &o)| (p >= 0.5) == o)
        .count();
    hits as f64 / probabilities.len() as f64
}

/// Mean squared probability error
pub fn brier_score(probabilities: &[f64], outcomes: &[bool]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    probabilities
        .iter()
        .zip(outcomes)
        .map(|(p, &o)| (p - if o { 1.0 } else { 0.0 }).powi(2))
        .sum::<f64>()
        / probabilities.len() as f64
}

/// Mean negative log-likelihood with probabilities clamped to `[0.001, 0.999]`
pub fn log_loss(probabilities: &[f64], outcomes: &[bool]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    probabilities
        .iter()
        .zip(outcomes)
        .map(|(p, &o)| {
            let p = p.clamp(LOG_LOSS_CLAMP, 1.0 - LOG_LOSS_CLAMP);
            if o {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum::<f64>()
        / probabilities.len() as f64
}

/// Area under the ROC curve by exact pairwise concordance
///
/// Ties between a positive and a negative count as half. Returns `0.5` when
/// either class is absent.
pub fn auc(probabilities: &[f64], outcomes: &[bool]) -> f64 {
    let positives: Vec<f64> = probabilities
        .iter()
        .zip(outcomes)
        .filter(|&(_, &o)| o)
        .map(|(&p, _)| p)
        .collect();
    let negatives: Vec<f64> = probabilities
        .iter()
        .zip(outcomes)
        .filter(|&(_, &o)| !o)
        .map(|(&p, _)| p)
        .collect();
    if positives.is_empty() || negatives.is_empty() {
        return 0.5;
    }

    let mut score = 0.0;
    for pos in &positives {
        for neg in &negatives {
            if pos > neg {
                score += 1.0;
            } else if pos == neg {
                score += 0.5;
            }
        }
    }
    score / (positives.len() * negatives.len()) as f64
}

/// Reliability bins, Hosmer-Lemeshow test and logit-space calibration line
pub fn calibrate(probabilities: &[f64], outcomes: &[bool], n_bins: usize) -> Result<CalibrationResult> {
    if n_bins < 3 {
        return Err(QuantError::InvalidInput(format!(
            "calibration needs at least 3 bins, got {}",
            n_bins
        )));
    }

    let width = 1.0 / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    let mut predicted = vec![0.0; n_bins];
    let mut observed = vec![0.0; n_bins];
    for (&p, &o) in probabilities.iter().zip(outcomes) {
        let b = ((p / width).floor() as usize).min(n_bins - 1);
        counts[b] += 1;
        predicted[b] += p;
        if o {
            observed[b] += 1.0;
        }
    }

    let bins: Vec<ReliabilityBin> = (0..n_bins)
        .map(|b| {
            let n = counts[b] as f64;
            ReliabilityBin {
                lower: b as f64 * width,
                upper: (b + 1) as f64 * width,
                count: counts[b],
                mean_predicted: if n > 0.0 { predicted[b] / n } else { 0.0 },
                observed_rate: if n > 0.0 { observed[b] / n } else { 0.0 },
            }
        })
        .collect();

    let statistic: f64 = bins
        .iter()
        .filter(|b| b.count > 0)
        .filter_map(|b| {
            let n = b.count as f64;
            let expected = n * b.mean_predicted;
            let denom = expected * (1.0 - b.mean_predicted);
            (denom > 0.0).then(|| (n * b.observed_rate - expected).powi(2) / denom)
        })
        .sum();
    let degrees_of_freedom = n_bins - 2;
    let p_value = match ChiSquared::new(degrees_of_freedom as f64) {
        Ok(chi) => 1.0 - chi.cdf(statistic),
        Err(_) => 0.0,
    };

    let x: Vec<f64> = probabilities
        .iter()
        .map(|&p| stats::logit(p, LOG_LOSS_CLAMP))
        .collect();
    let y: Vec<f64> = outcomes.iter().map(|&o| if o { 1.0 } else { 0.0 }).collect();
    let degenerate = stats::variance(&x) <= 0.0;
    let (calibration_slope, calibration_intercept) = if degenerate {
        (1.0, 0.0)
    } else {
        let fit = stats::ols(&x, &y);
        (fit.slope.clamp(SLOPE_MIN, SLOPE_MAX), fit.intercept)
    };

    Ok(CalibrationResult {
        statistic,
        degrees_of_freedom,
        p_value,
        calibration_slope,
        calibration_intercept,
        is_well_calibrated: p_value > 0.05 && (calibration_slope - 1.0).abs() < 0.2,
        bins,
        degenerate,
    })
}

/// Windows of `max(10, n / 10)` time-sorted records whose mean squared
/// error exceeds 0.3, without overlap
pub fn scan_failure_periods(records: &[MatchedRecord]) -> Vec<FailurePeriod> {
    let window = MIN_FAILURE_WINDOW.max(records.len() / 10);
    let mut periods = Vec::new();
    let mut start = 0;
    while start + window <= records.len() {
        let slice = &records[start..start + window];
        let mse = slice.iter().map(MatchedRecord::squared_error).sum::<f64>() / window as f64;
        if mse > FAILURE_MSE_THRESHOLD {
            periods.push(FailurePeriod {
                start: slice[0].date,
                end: slice[window - 1].date,
                n_records: window,
                mean_squared_error: mse,
            });
            start += window;
        } else {
            start += 1;
        }
    }
    periods
}

/// Match, score, calibrate and scan a set of forecasts
pub fn run_backtest(
    predictions: &[Prediction],
    outcomes: &[Outcome],
    config: &BacktestConfig,
) -> Result<BacktestReport> {
    if let Some(bad) = predictions
        .iter()
        .find(|p| !(0.0..=1.0).contains(&p.probability))
    {
        return Err(QuantError::InvalidInput(format!(
            "probability for '{}' must be in [0, 1], got {}",
            bad.event_id, bad.probability
        )));
    }

    let records = match_records(predictions, outcomes)?;
    let n_unmatched = predictions.len() - records.len();
    if n_unmatched > 0 {
        warn!(n_unmatched, "Predictions without a matching outcome were skipped");
    }

    let probabilities: Vec<f64> = records.iter().map(|r| r.probability).collect();
    let occurred: Vec<bool> = records.iter().map(|r| r.occurred).collect();

    let calibration = calibrate(&probabilities, &occurred, config.n_bins)?;
    let failure_periods = scan_failure_periods(&records);
    let report = BacktestReport {
        n_matched: records.len(),
        n_unmatched,
        hit_rate: hit_rate(&probabilities, &occurred),
        brier_score: brier_score(&probabilities, &occurred),
        log_loss: log_loss(&probabilities, &occurred),
        auc: auc(&probabilities, &occurred),
        calibration,
        failure_periods,
    };
    debug!(
        n_matched = report.n_matched,
        brier = report.brier_score,
        auc = report.auc,
        "Backtest complete"
    );
    Ok(report)
}
