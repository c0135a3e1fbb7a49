//! Statistics primitives
//!
//! Pure functions over finite slices of reals. Every function is total:
//! inputs too short to define the statistic (or with zero variance) yield
//! `0.0` instead of an error or a NaN. Callers that need to tell "zero"
//! from "undefined" check the input length or variance themselves.

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{PI, SQRT_2};

/// Arithmetic mean, `0.0` for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (divisor `n - 1`), `0.0` for fewer than two points
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Sample standard deviation (divisor `n - 1`), `0.0` for fewer than two points
pub fn std(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Copy of `data` sorted ascending
pub fn sorted(data: &[f64]) -> Vec<f64> {
    let mut out = data.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Percentile `p` (in `[0, 100]`) with linear interpolation between order
/// statistics (the R-7 / Excel `PERCENTILE.INC` convention)
pub fn percentile(data: &[f64], p: f64) -> f64 {
    percentile_of_sorted(&sorted(data), p)
}

/// [`percentile`] over data that is already sorted ascending
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * (p / 100.0).clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Ascending 1-based ranks
///
/// Ties are not averaged; equal values keep their input order (stable sort),
/// so the result is always a permutation of `1..=n`.
pub fn rank(data: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..data.len()).collect();
    idx.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let mut ranks = vec![0.0; data.len()];
    for (r, &i) in idx.iter().enumerate() {
        ranks[i] = (r + 1) as f64;
    }
    ranks
}

/// Population central moments `(m2, m3, m4)`
fn central_moments(data: &[f64]) -> (f64, f64, f64) {
    let n = data.len() as f64;
    let m = mean(data);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in data {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Third standardized moment (population divisor)
pub fn skewness(data: &[f64]) -> f64 {
    if data.len() < 3 {
        return 0.0;
    }
    let (m2, m3, _) = central_moments(data);
    if m2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Fourth standardized moment (population divisor)
///
/// This is raw kurtosis: a normal sample scores about 3. Returns `0.0` for
/// fewer than four points or zero variance; use [`excess_kurtosis`] when the
/// sentinel must read as "no excess".
pub fn kurtosis(data: &[f64]) -> f64 {
    if data.len() < 4 {
        return 0.0;
    }
    let (m2, _, m4) = central_moments(data);
    if m2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    m4 / (m2 * m2)
}

/// `kurtosis - 3`, with `0.0` for inputs where kurtosis is undefined
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    let k = kurtosis(data);
    if k == 0.0 {
        0.0
    } else {
        k - 3.0
    }
}

/// Classical biased autocorrelation estimator at `lag`
///
/// The denominator is the mean-centred sum of squares over the full series.
pub fn autocorrelation(data: &[f64], lag: usize) -> f64 {
    let n = data.len();
    if n < 2 || lag >= n {
        return 0.0;
    }
    let m = mean(data);
    let denom: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    if denom <= 0.0 {
        return 0.0;
    }
    let num: f64 = (lag..n).map(|t| (data[t] - m) * (data[t - lag] - m)).sum();
    num / denom
}

/// Standard score of `x`, `0.0` when `std` is not positive
pub fn z_score(x: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        0.0
    } else {
        (x - mean) / std
    }
}

/// Standard normal density
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF via the complementary error function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile
///
/// `p <= 0` maps to `-inf` and `p >= 1` to `+inf`.
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        f64::NEG_INFINITY
    } else if p >= 1.0 {
        f64::INFINITY
    } else {
        -SQRT_2 * erfc_inv(2.0 * p)
    }
}

/// Log-odds of `p` after clamping into `[lo, 1 - lo]`
pub fn logit(p: f64, lo: f64) -> f64 {
    let p = p.clamp(lo, 1.0 - lo);
    (p / (1.0 - p)).ln()
}

/// Sample covariance over the common prefix of `x` and `y`
pub fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Pearson correlation over the common prefix of `x` and `y`
///
/// `0.0` when fewer than two points or either side has zero variance.
/// The result is clamped to `[-1, 1]` to absorb rounding.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Ordinary least squares fit `y = intercept + slope * x`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub residuals: Vec<f64>,
}

impl LinearFit {
    /// Residual variance with `n - 2` degrees of freedom
    pub fn residual_variance(&self) -> f64 {
        let n = self.residuals.len();
        if n < 3 {
            return 0.0;
        }
        self.residuals.iter().map(|r| r * r).sum::<f64>() / (n - 2) as f64
    }
}

/// OLS regression of `y` on `x` over their common prefix
///
/// A regressor with zero spread yields a flat line through the mean of `y`.
pub fn ols(x: &[f64], y: &[f64]) -> LinearFit {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let sxx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = my - slope * mx;
    let residuals = x
        .iter()
        .zip(y)
        .map(|(a, b)| b - (intercept + slope * a))
        .collect();

    LinearFit {
        slope,
        intercept,
        residuals,
    }
}

/// Gaussian log-likelihood of `data` under `N(mean, std^2)`
///
/// Returns `-inf` when `std` is not positive so that rankings push the
/// candidate to the bottom instead of failing.
pub fn gaussian_log_likelihood(data: &[f64], mean: f64, std: f64) -> f64 {
    if std <= 0.0 || !std.is_finite() {
        return f64::NEG_INFINITY;
    }
    let n = data.len() as f64;
    let var = std * std;
    let ss: f64 = data.iter().map(|x| (x - mean).powi(2)).sum();
    -0.5 * n * (2.0 * PI * var).ln() - ss / (2.0 * var)
}
