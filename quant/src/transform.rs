//! Time-series transform pipeline
//!
//! A pipeline is an ordered list of [`TransformOp`]s applied to one series.
//! Operations that shorten the series (differencing, rolling windows,
//! resampling) truncate the timestamps in lockstep, and every step leaves a
//! [`TransformStep`] entry describing what it did.

use crate::error::{QuantError, Result};
use crate::series::{Frequency, TimeSeries};
use crate::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// How resampling collapses the observations that share a bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    First,
    #[default]
    Last,
    Mean,
    Sum,
}

/// A single pipeline operation with its typed parameters
///
/// Deserializes from tagged maps such as `{ type: rolling_mean, window: 20 }`,
/// so an unknown `type` is rejected when the pipeline is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformOp {
    /// Collapse observations into `frequency` buckets
    Resample {
        frequency: Frequency,
        #[serde(default)]
        aggregation: Aggregation,
    },

    /// Fill `NaN` gaps linearly, or by carrying the nearest valid value when
    /// only one side is available
    Interpolate,

    /// Rescale to `[0, 1]` using the observed min and max
    Normalize,

    /// Z-score using the sample mean and standard deviation
    Standardize,

    /// Difference `order` times, dropping `order` leading points
    Difference {
        #[serde(default = "default_order")]
        order: usize,
    },

    /// Natural log, shifting the series first if it has non-positive values
    LogTransform,

    /// Trailing mean over `window` points, dropping `window - 1` leading points
    RollingMean { window: usize },

    /// Trailing sample std over `window` points, dropping `window - 1` leading points
    RollingStd { window: usize },

    /// Exponentially weighted mean with `alpha = 2 / (span + 1)`
    Ewma { span: usize },

    /// Subtract the OLS line fitted against the index
    Detrend,

    /// Subtract per-position seasonal means for a cycle of `period` points
    SeasonalityAdjust { period: usize },

    /// Clamp to the `p` and `1 - p` percentiles
    Winsorize {
        #[serde(default = "default_winsor_p")]
        p: f64,
    },

    /// Clamp to fixed bounds
    Clip {
        #[serde(default)]
        lower: Option<f64>,
        #[serde(default)]
        upper: Option<f64>,
    },
}

fn default_order() -> usize {
    1
}

fn default_winsor_p() -> f64 {
    0.05
}

impl TransformOp {
    /// Operation name as used in transformation logs
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Resample { .. } => "resample",
            TransformOp::Interpolate => "interpolate",
            TransformOp::Normalize => "normalize",
            TransformOp::Standardize => "standardize",
            TransformOp::Difference { .. } => "difference",
            TransformOp::LogTransform => "log_transform",
            TransformOp::RollingMean { .. } => "rolling_mean",
            TransformOp::RollingStd { .. } => "rolling_std",
            TransformOp::Ewma { .. } => "ewma",
            TransformOp::Detrend => "detrend",
            TransformOp::SeasonalityAdjust { .. } => "seasonality_adjust",
            TransformOp::Winsorize { .. } => "winsorize",
            TransformOp::Clip { .. } => "clip",
        }
    }

    /// Build an operation from a name and a loose numeric parameter map
    ///
    /// Used by callers that carry operations as untyped records. Resampling
    /// needs a frequency and cannot be expressed this way.
    pub fn from_params(name: &str, params: &BTreeMap<String, f64>) -> Result<Self> {
        let window = |key: &str| -> Result<usize> {
            params
                .get(key)
                .filter(|v| **v >= 1.0)
                .map(|v| *v as usize)
                .ok_or_else(|| {
                    QuantError::InvalidInput(format!(
                        "operation '{}' needs a positive '{}' parameter",
                        name, key
                    ))
                })
        };

        match name {
            "interpolate" => Ok(TransformOp::Interpolate),
            "normalize" => Ok(TransformOp::Normalize),
            "standardize" => Ok(TransformOp::Standardize),
            "difference" => Ok(TransformOp::Difference {
                order: params.get("order").map(|v| *v as usize).unwrap_or(1),
            }),
            "log_transform" => Ok(TransformOp::LogTransform),
            "rolling_mean" => Ok(TransformOp::RollingMean {
                window: window("window")?,
            }),
            "rolling_std" => Ok(TransformOp::RollingStd {
                window: window("window")?,
            }),
            "ewma" => Ok(TransformOp::Ewma {
                span: window("span")?,
            }),
            "detrend" => Ok(TransformOp::Detrend),
            "seasonality_adjust" => Ok(TransformOp::SeasonalityAdjust {
                period: window("period")?,
            }),
            "winsorize" => Ok(TransformOp::Winsorize {
                p: params.get("p").copied().unwrap_or_else(default_winsor_p),
            }),
            "clip" => Ok(TransformOp::Clip {
                lower: params.get("lower").copied(),
                upper: params.get("upper").copied(),
            }),
            "resample" => Err(QuantError::InvalidInput(
                "resample needs a typed frequency; build TransformOp::Resample directly".to_string(),
            )),
            other => Err(QuantError::UnknownOperation(other.to_string())),
        }
    }
}

/// Log entry for one applied operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    /// Operation name
    pub operation: String,

    /// Parameters used, including derived ones (e.g. normalize min/max)
    pub parameters: BTreeMap<String, f64>,

    /// Number of values the operation changed, filled, clamped or produced
    pub affected_values: usize,

    /// Series length before the step
    pub input_len: usize,

    /// Series length after the step
    pub output_len: usize,

    /// True when the step fell back to a sentinel (zero range, zero variance,
    /// too few points for the requested cycle, nothing to interpolate from)
    pub degenerate: bool,
}

/// Output of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub name: String,
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub steps: Vec<TransformStep>,
}

impl TransformResult {
    /// Rebuild a [`TimeSeries`] from the transformed output
    pub fn into_series(self, frequency: Frequency) -> Result<TimeSeries> {
        TimeSeries::new(self.name, self.timestamps, self.values, frequency)
    }
}

/// Apply `ops` to `series` in order
pub fn apply_pipeline(series: &TimeSeries, ops: &[TransformOp]) -> Result<TransformResult> {
    let mut values = series.values().to_vec();
    let mut timestamps = series.timestamps().to_vec();
    let mut steps = Vec::with_capacity(ops.len());

    for op in ops {
        let (v, t, step) = apply_op(values, timestamps, op)?;
        debug!(
            series = series.name(),
            operation = op.name(),
            affected = step.affected_values,
            output_len = step.output_len,
            "Applied transform"
        );
        values = v;
        timestamps = t;
        steps.push(step);
    }

    Ok(TransformResult {
        name: series.name().to_string(),
        values,
        timestamps,
        steps,
    })
}

type StepOutput = (Vec<f64>, Vec<DateTime<Utc>>, TransformStep);

/// Apply a single operation to paired values and timestamps
pub fn apply_op(
    values: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    op: &TransformOp,
) -> Result<StepOutput> {
    let input_len = values.len();
    let mut params = BTreeMap::new();
    let mut degenerate = false;

    let (out, ts, affected) = match op {
        TransformOp::Resample {
            frequency,
            aggregation,
        } => {
            let (out, ts) = resample(&values, &timestamps, *frequency, *aggregation);
            params.insert("periods_per_year".to_string(), frequency.periods_per_year());
            let affected = input_len - out.len();
            (out, ts, affected)
        }
        TransformOp::Interpolate => {
            let (out, filled, unfilled) = interpolate(&values);
            degenerate = unfilled > 0;
            (out, timestamps, filled)
        }
        TransformOp::Normalize => {
            let (out, min, max) = normalize(&values);
            params.insert("min".to_string(), min);
            params.insert("max".to_string(), max);
            degenerate = max <= min;
            let n = out.len();
            (out, timestamps, n)
        }
        TransformOp::Standardize => {
            let mean = stats::mean(&values);
            let std = stats::std(&values);
            params.insert("mean".to_string(), mean);
            params.insert("std".to_string(), std);
            degenerate = std <= 0.0;
            let out: Vec<f64> = values.iter().map(|v| stats::z_score(*v, mean, std)).collect();
            let n = out.len();
            (out, timestamps, n)
        }
        TransformOp::Difference { order } => {
            params.insert("order".to_string(), *order as f64);
            let out = difference(&values, *order);
            let ts = drop_leading(timestamps, input_len - out.len());
            let n = out.len();
            (out, ts, n)
        }
        TransformOp::LogTransform => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let offset = if min > 0.0 { 0.0 } else { 1.0 - min };
            params.insert("offset".to_string(), offset);
            let out: Vec<f64> = values.iter().map(|v| (v + offset).ln()).collect();
            let n = out.len();
            (out, timestamps, n)
        }
        TransformOp::RollingMean { window } => {
            let window = require_window(*window, "rolling_mean")?;
            params.insert("window".to_string(), window as f64);
            let out = rolling(&values, window, stats::mean);
            let ts = drop_leading(timestamps, input_len - out.len());
            let n = out.len();
            (out, ts, n)
        }
        TransformOp::RollingStd { window } => {
            let window = require_window(*window, "rolling_std")?;
            params.insert("window".to_string(), window as f64);
            let out = rolling(&values, window, stats::std);
            let ts = drop_leading(timestamps, input_len - out.len());
            let n = out.len();
            (out, ts, n)
        }
        TransformOp::Ewma { span } => {
            let span = require_window(*span, "ewma")?;
            let alpha = 2.0 / (span as f64 + 1.0);
            params.insert("span".to_string(), span as f64);
            params.insert("alpha".to_string(), alpha);
            let out = ewma(&values, alpha);
            let n = out.len();
            (out, timestamps, n)
        }
        TransformOp::Detrend => {
            let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
            let fit = stats::ols(&index, &values);
            params.insert("slope".to_string(), fit.slope);
            params.insert("intercept".to_string(), fit.intercept);
            degenerate = values.len() < 2;
            let n = fit.residuals.len();
            (fit.residuals, timestamps, n)
        }
        TransformOp::SeasonalityAdjust { period } => {
            if *period < 2 {
                return Err(QuantError::InvalidInput(format!(
                    "seasonality_adjust period must be at least 2, got {}",
                    period
                )));
            }
            params.insert("period".to_string(), *period as f64);
            match seasonal_adjust(&values, *period) {
                Some(out) => {
                    let n = out.len();
                    (out, timestamps, n)
                }
                None => {
                    degenerate = true;
                    (values, timestamps, 0)
                }
            }
        }
        TransformOp::Winsorize { p } => {
            if !(0.0..0.5).contains(p) {
                return Err(QuantError::InvalidInput(format!(
                    "winsorize p must be in [0, 0.5), got {}",
                    p
                )));
            }
            let sorted = stats::sorted(&values);
            let lower = stats::percentile_of_sorted(&sorted, p * 100.0);
            let upper = stats::percentile_of_sorted(&sorted, (1.0 - p) * 100.0);
            params.insert("p".to_string(), *p);
            params.insert("lower".to_string(), lower);
            params.insert("upper".to_string(), upper);
            let (out, clamped) = clamp_values(&values, Some(lower), Some(upper));
            (out, timestamps, clamped)
        }
        TransformOp::Clip { lower, upper } => {
            if let (Some(lo), Some(hi)) = (lower, upper) {
                if lo > hi {
                    return Err(QuantError::InvalidInput(format!(
                        "clip lower bound {} exceeds upper bound {}",
                        lo, hi
                    )));
                }
            }
            if let Some(lo) = lower {
                params.insert("lower".to_string(), *lo);
            }
            if let Some(hi) = upper {
                params.insert("upper".to_string(), *hi);
            }
            let (out, clamped) = clamp_values(&values, *lower, *upper);
            (out, timestamps, clamped)
        }
    };

    let step = TransformStep {
        operation: op.name().to_string(),
        parameters: params,
        affected_values: affected,
        input_len,
        output_len: out.len(),
        degenerate,
    };
    Ok((out, ts, step))
}

fn require_window(window: usize, op: &str) -> Result<usize> {
    if window == 0 {
        return Err(QuantError::InvalidInput(format!(
            "{} window must be positive",
            op
        )));
    }
    Ok(window)
}

fn drop_leading<T>(mut items: Vec<T>, count: usize) -> Vec<T> {
    items.drain(..count.min(items.len()));
    items
}

/// Rescale to `[0, 1]`, returning `(values, min, max)`
///
/// A flat series maps to all zeros.
pub fn normalize(values: &[f64]) -> (Vec<f64>, f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (values.to_vec(), 0.0, 0.0);
    }
    let range = max - min;
    let out = values
        .iter()
        .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
        .collect();
    (out, min, max)
}

/// Undo [`normalize`] using its returned `min` and `max`
pub fn inverse_normalize(values: &[f64], min: f64, max: f64) -> Vec<f64> {
    values.iter().map(|v| v * (max - min) + min).collect()
}

/// Difference `order` times
pub fn difference(values: &[f64], order: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..order {
        if out.is_empty() {
            break;
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Apply `f` over each trailing window of length `window`
pub fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values.windows(window).map(f).collect()
}

/// Exponentially weighted mean seeded with the first observation
pub fn ewma(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Fill `NaN` gaps, returning `(values, filled, still_missing)`
pub fn interpolate(values: &[f64]) -> (Vec<f64>, usize, usize) {
    let valid: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    let mut out = values.to_vec();
    let mut filled = 0;
    let mut missing = 0;

    for i in 0..values.len() {
        if !values[i].is_nan() {
            continue;
        }
        // Position of the first valid index after i
        let pos = valid.partition_point(|&j| j < i);
        let prev = pos.checked_sub(1).map(|p| valid[p]);
        let next = valid.get(pos).copied();

        out[i] = match (prev, next) {
            (Some(a), Some(b)) => {
                let w = (i - a) as f64 / (b - a) as f64;
                values[a] + w * (values[b] - values[a])
            }
            (Some(a), None) => values[a],
            (None, Some(b)) => values[b],
            (None, None) => {
                missing += 1;
                continue;
            }
        };
        filled += 1;
    }

    (out, filled, missing)
}

fn seasonal_adjust(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if values.len() < 2 * period {
        return None;
    }
    let overall = stats::mean(values);
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, v) in values.iter().enumerate() {
        sums[i % period] += v;
        counts[i % period] += 1;
    }
    let seasonal: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| s / *c as f64 - overall)
        .collect();
    Some(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| v - seasonal[i % period])
            .collect(),
    )
}

fn clamp_values(values: &[f64], lower: Option<f64>, upper: Option<f64>) -> (Vec<f64>, usize) {
    let mut clamped = 0;
    let out = values
        .iter()
        .map(|&v| {
            let mut c = v;
            if let Some(lo) = lower {
                if c < lo {
                    c = lo;
                }
            }
            if let Some(hi) = upper {
                if c > hi {
                    c = hi;
                }
            }
            if c != v {
                clamped += 1;
            }
            c
        })
        .collect();
    (out, clamped)
}

fn resample(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    frequency: Frequency,
    aggregation: Aggregation,
) -> (Vec<f64>, Vec<DateTime<Utc>>) {
    let mut out = Vec::new();
    let mut ts = Vec::new();
    let mut start = 0;

    while start < values.len() {
        let key = frequency.bucket(&timestamps[start]);
        let mut end = start + 1;
        while end < values.len() && frequency.bucket(&timestamps[end]) == key {
            end += 1;
        }

        let group = &values[start..end];
        let finite: Vec<f64> = group.iter().copied().filter(|v| !v.is_nan()).collect();
        let value = match aggregation {
            Aggregation::First => group[0],
            Aggregation::Last => group[group.len() - 1],
            Aggregation::Mean if finite.is_empty() => f64::NAN,
            Aggregation::Mean => stats::mean(&finite),
            Aggregation::Sum => finite.iter().sum(),
        };
        out.push(value);
        ts.push(timestamps[end - 1]);
        start = end;
    }

    (out, ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn series(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        TimeSeries::new("test", ts, values, Frequency::Daily).unwrap()
    }

    #[test]
    fn test_difference_order_one() {
        let s = series((1..=10).map(|i| i as f64).collect());
        let result = apply_pipeline(&s, &[TransformOp::Difference { order: 1 }]).unwrap();
        assert_eq!(result.values, vec![1.0; 9]);
        assert_eq!(result.timestamps.len(), 9);
        assert_eq!(result.timestamps[0], s.timestamps()[1]);
        assert_eq!(result.steps[0].affected_values, 9);
    }

    #[test]
    fn test_rolling_truncates_timestamps() {
        let s = series((1..=10).map(|i| i as f64).collect());
        let result = apply_pipeline(&s, &[TransformOp::RollingMean { window: 3 }]).unwrap();
        assert_eq!(result.values.len(), 8);
        assert_eq!(result.timestamps.len(), 8);
        assert_relative_eq!(result.values[0], 2.0);
        assert_eq!(result.timestamps[0], s.timestamps()[2]);
    }

    #[test]
    fn test_pipeline_applies_in_order() {
        let s = series(vec![1.0, 4.0, 9.0, 16.0, 25.0]);
        let result = apply_pipeline(
            &s,
            &[
                TransformOp::Difference { order: 1 },
                TransformOp::Difference { order: 1 },
            ],
        )
        .unwrap();
        assert_eq!(result.values, vec![2.0, 2.0, 2.0]);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].input_len, 4);
    }

    #[test]
    fn test_normalize_round_trip() {
        let data = vec![3.0, -2.0, 7.5, 0.0];
        let (norm, min, max) = normalize(&data);
        assert_relative_eq!(norm[1], 0.0);
        assert_relative_eq!(norm[2], 1.0);
        let back = inverse_normalize(&norm, min, max);
        for (a, b) in back.iter().zip(&data) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_normalize_flat_series_is_degenerate() {
        let s = series(vec![5.0; 4]);
        let result = apply_pipeline(&s, &[TransformOp::Normalize]).unwrap();
        assert_eq!(result.values, vec![0.0; 4]);
        assert!(result.steps[0].degenerate);
    }

    #[test]
    fn test_standardize() {
        let s = series(vec![1.0, 2.0, 3.0]);
        let result = apply_pipeline(&s, &[TransformOp::Standardize]).unwrap();
        assert_relative_eq!(result.values[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(result.values[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ewma_seeded_with_first() {
        let out = ewma(&[10.0, 20.0], 0.5);
        assert_eq!(out, vec![10.0, 15.0]);
    }

    #[test]
    fn test_detrend_removes_line() {
        let s = series((0..8).map(|i| 1.0 + 0.5 * i as f64).collect());
        let result = apply_pipeline(&s, &[TransformOp::Detrend]).unwrap();
        assert!(result.values.iter().all(|v| v.abs() < 1e-9));
        assert_relative_eq!(result.steps[0].parameters["slope"], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_winsorize_counts_clamped() {
        let mut data: Vec<f64> = (0..20).map(|i| i as f64).collect();
        data[0] = -100.0;
        data[19] = 100.0;
        let s = series(data);
        let result = apply_pipeline(&s, &[TransformOp::Winsorize { p: 0.05 }]).unwrap();
        let step = &result.steps[0];
        assert_eq!(step.affected_values, 2);
        assert!(result.values[0] > -100.0);
        assert!(result.values[19] < 100.0);
    }

    #[test]
    fn test_interpolate_fills_gaps() {
        let (out, filled, missing) = interpolate(&[f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN]);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 3.0, 3.0]);
        assert_eq!(filled, 3);
        assert_eq!(missing, 0);
    }

    #[test]
    fn test_clip() {
        let s = series(vec![-5.0, 0.0, 5.0]);
        let result = apply_pipeline(
            &s,
            &[TransformOp::Clip {
                lower: Some(-1.0),
                upper: Some(1.0),
            }],
        )
        .unwrap();
        assert_eq!(result.values, vec![-1.0, 0.0, 1.0]);
        assert_eq!(result.steps[0].affected_values, 2);
    }

    #[test]
    fn test_log_transform_shifts_non_positive() {
        let s = series(vec![0.0, 1.0]);
        let result = apply_pipeline(&s, &[TransformOp::LogTransform]).unwrap();
        assert_relative_eq!(result.values[0], 0.0);
        assert_relative_eq!(result.steps[0].parameters["offset"], 1.0);
    }

    #[test]
    fn test_resample_monthly() {
        let start = Utc.with_ymd_and_hms(2024, 1, 30, 0, 0, 0).unwrap();
        let ts: Vec<_> = (0..4).map(|i| start + Duration::days(i)).collect();
        let s = TimeSeries::new("m", ts.clone(), vec![1.0, 2.0, 3.0, 4.0], Frequency::Daily).unwrap();
        let result = apply_pipeline(
            &s,
            &[TransformOp::Resample {
                frequency: Frequency::Monthly,
                aggregation: Aggregation::Last,
            }],
        )
        .unwrap();
        // Jan 30, Jan 31 | Feb 1, Feb 2
        assert_eq!(result.values, vec![2.0, 4.0]);
        assert_eq!(result.timestamps, vec![ts[1], ts[3]]);
        assert_eq!(result.steps[0].affected_values, 2);
    }

    #[test]
    fn test_seasonality_adjust() {
        let data: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 10.0 } else { 20.0 }).collect();
        let s = series(data);
        let result = apply_pipeline(&s, &[TransformOp::SeasonalityAdjust { period: 2 }]).unwrap();
        assert!(result.values.iter().all(|v| (v - 15.0).abs() < 1e-12));
    }

    #[test]
    fn test_from_params() {
        let mut params = BTreeMap::new();
        params.insert("window".to_string(), 5.0);
        assert_eq!(
            TransformOp::from_params("rolling_std", &params).unwrap(),
            TransformOp::RollingStd { window: 5 }
        );
        assert!(matches!(
            TransformOp::from_params("fourier", &params),
            Err(QuantError::UnknownOperation(_))
        ));
        assert!(TransformOp::from_params("ewma", &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_ops_deserialize_from_yaml() {
        let yaml = r#"
- type: difference
- type: rolling_mean
  window: 3
- type: winsorize
  p: 0.01
"#;
        let ops: Vec<TransformOp> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ops[0], TransformOp::Difference { order: 1 });
        assert_eq!(ops[1], TransformOp::RollingMean { window: 3 });

        let bad = "- type: fourier\n";
        assert!(serde_yaml::from_str::<Vec<TransformOp>>(bad).is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let s = series(vec![1.0, 2.0]);
        assert!(apply_pipeline(&s, &[TransformOp::RollingMean { window: 0 }]).is_err());
    }
}
