//! Time series value type

use crate::error::{QuantError, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling frequency of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Observations per year, used to annualize per-period estimates
    pub fn periods_per_year(self) -> f64 {
        match self {
            Frequency::Daily => 252.0,
            Frequency::Weekly => 52.0,
            Frequency::Monthly => 12.0,
            Frequency::Quarterly => 4.0,
            Frequency::Yearly => 1.0,
        }
    }

    /// Step size in years
    pub fn dt(self) -> f64 {
        1.0 / self.periods_per_year()
    }

    /// Bucket key a timestamp falls into when resampling to this frequency
    pub fn bucket(self, ts: &DateTime<Utc>) -> (i32, u32) {
        match self {
            Frequency::Daily => (ts.year(), ts.ordinal()),
            Frequency::Weekly => {
                let week = ts.iso_week();
                (week.year(), week.week())
            }
            Frequency::Monthly => (ts.year(), ts.month()),
            Frequency::Quarterly => (ts.year(), (ts.month() - 1) / 3),
            Frequency::Yearly => (ts.year(), 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Frequency::Daily),
            "weekly" | "w" => Ok(Frequency::Weekly),
            "monthly" | "m" => Ok(Frequency::Monthly),
            "quarterly" | "q" => Ok(Frequency::Quarterly),
            "yearly" | "annual" | "y" => Ok(Frequency::Yearly),
            other => Err(QuantError::InvalidInput(format!(
                "unsupported frequency '{}'",
                other
            ))),
        }
    }
}

/// Named, ordered sequence of `(timestamp, value)` observations
///
/// Missing observations are represented as `NaN` values. Timestamps are
/// strictly increasing and always as long as the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    name: String,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    frequency: Frequency,
}

impl TimeSeries {
    /// Create a series, validating the length and ordering invariants
    pub fn new(
        name: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
        frequency: Frequency,
    ) -> Result<Self> {
        let name = name.into();
        if timestamps.len() != values.len() {
            return Err(QuantError::InvalidInput(format!(
                "series '{}' has {} timestamps but {} values",
                name,
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(QuantError::InvalidInput(format!(
                "series '{}' timestamps are not strictly increasing at index {}",
                name,
                pos + 1
            )));
        }
        Ok(Self {
            name,
            timestamps,
            values,
            frequency,
        })
    }

    /// Build a series from `(timestamp, value)` pairs
    pub fn from_pairs(
        name: impl Into<String>,
        pairs: Vec<(DateTime<Utc>, f64)>,
        frequency: Frequency,
    ) -> Result<Self> {
        let (timestamps, values) = pairs.into_iter().unzip();
        Self::new(name, timestamps, values, frequency)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Simple returns `v[t] / v[t-1] - 1`, dropping the first point
    ///
    /// A zero previous level yields a `0.0` return.
    pub fn simple_returns(&self) -> Vec<f64> {
        self.values
            .windows(2)
            .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
            .collect()
    }

    /// Log returns `ln(v[t] / v[t-1])`
    ///
    /// Fails when any level is not strictly positive.
    pub fn log_returns(&self) -> Result<Vec<f64>> {
        log_returns(&self.values)
    }
}

/// Log returns of a level sequence, requiring strictly positive levels
pub fn log_returns(levels: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = levels.iter().find(|v| v.is_nan() || **v <= 0.0) {
        return Err(QuantError::DegenerateInput(format!(
            "log returns need strictly positive levels, found {}",
            bad
        )));
    }
    Ok(levels.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn dates(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_series_validates_lengths() {
        let result = TimeSeries::new("x", dates(3), vec![1.0, 2.0], Frequency::Daily);
        assert!(matches!(result, Err(QuantError::InvalidInput(_))));
    }

    #[test]
    fn test_series_validates_ordering() {
        let mut ts = dates(3);
        ts.swap(1, 2);
        let result = TimeSeries::new("x", ts, vec![1.0, 2.0, 3.0], Frequency::Daily);
        assert!(result.is_err());
    }

    #[test]
    fn test_returns() {
        let s = TimeSeries::new("x", dates(3), vec![100.0, 110.0, 99.0], Frequency::Daily).unwrap();
        let simple = s.simple_returns();
        assert!((simple[0] - 0.1).abs() < 1e-12);
        assert!((simple[1] + 0.1).abs() < 1e-12);
        let logs = s.log_returns().unwrap();
        assert!((logs[0] - 1.1f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_returns_reject_non_positive() {
        assert!(log_returns(&[1.0, 0.0, 2.0]).is_err());
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert!("hourly".parse::<Frequency>().is_err());
        assert_eq!(Frequency::Weekly.periods_per_year(), 52.0);
    }
}
