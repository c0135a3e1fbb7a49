//! Copula family selection for a pair of series
//!
//! Each series is mapped to pseudo-uniform marginals with `rank / (n + 1)`.
//! Family parameters are read off Kendall's tau rather than maximized:
//!
//! | Family    | Parameter                      |
//! |-----------|--------------------------------|
//! | Gaussian  | `rho = sin(pi * tau / 2)`      |
//! | Student-t | same `rho`, fixed `df`         |
//! | Clayton   | `theta = max(0.01, 2 tau / (1 - tau))` |
//! | Gumbel    | `theta = max(1, 1 / (1 - tau))`|
//! | Frank     | `theta ~ 5.736 tau`            |
//!
//! The copula log-density is then evaluated at that parameter and families
//! are ranked by AIC. The Student-t likelihood is the Gaussian likelihood
//! scaled by [`STUDENT_T_LIKELIHOOD_SCALE`], not the t density.

use crate::correlation::{kendall_tau, spearman};
use crate::error::{QuantError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Multiplier applied to the Gaussian log-likelihood for the Student-t family
pub const STUDENT_T_LIKELIHOOD_SCALE: f64 = 1.05;

/// Default Student-t degrees of freedom
pub const DEFAULT_STUDENT_T_DF: f64 = 4.0;

/// Tail-dependence coefficients at or below this are treated as absent
pub const TAIL_DEPENDENCE_THRESHOLD: f64 = 0.01;

/// Lower/upper coefficient gap above which dependence is called asymmetric
pub const ASYMMETRY_THRESHOLD: f64 = 0.05;

// Kendall's tau is kept off +/-1 so tau-derived parameters stay finite
const TAU_LIMIT: f64 = 0.99;
const RHO_LIMIT: f64 = 0.999;

/// Supported copula families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopulaFamily {
    Gaussian,
    Clayton,
    Gumbel,
    StudentT,
    Frank,
}

impl CopulaFamily {
    pub const ALL: [CopulaFamily; 5] = [
        CopulaFamily::Gaussian,
        CopulaFamily::Clayton,
        CopulaFamily::Gumbel,
        CopulaFamily::StudentT,
        CopulaFamily::Frank,
    ];

    pub fn parameter_count(self) -> usize {
        match self {
            CopulaFamily::StudentT => 2,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CopulaFamily::Gaussian => "gaussian",
            CopulaFamily::Clayton => "clayton",
            CopulaFamily::Gumbel => "gumbel",
            CopulaFamily::StudentT => "student_t",
            CopulaFamily::Frank => "frank",
        }
    }
}

impl fmt::Display for CopulaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CopulaFamily {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(CopulaFamily::Gaussian),
            "clayton" => Ok(CopulaFamily::Clayton),
            "gumbel" => Ok(CopulaFamily::Gumbel),
            "student_t" | "t" | "student" => Ok(CopulaFamily::StudentT),
            "frank" => Ok(CopulaFamily::Frank),
            other => Err(QuantError::UnknownCopulaFamily(other.to_string())),
        }
    }
}

/// Family parameters, one variant per family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CopulaParameters {
    Gaussian { rho: f64 },
    Clayton { theta: f64 },
    Gumbel { theta: f64 },
    StudentT { rho: f64, df: f64 },
    Frank { theta: f64 },
}

impl CopulaParameters {
    /// Tau-based starting parameters for `family`
    pub fn from_tau(family: CopulaFamily, tau: f64, student_t_df: f64) -> Self {
        let tau = tau.clamp(-TAU_LIMIT, TAU_LIMIT);
        let rho = (PI * tau / 2.0).sin();
        match family {
            CopulaFamily::Gaussian => CopulaParameters::Gaussian { rho },
            CopulaFamily::StudentT => CopulaParameters::StudentT {
                rho,
                df: student_t_df,
            },
            CopulaFamily::Clayton => CopulaParameters::Clayton {
                theta: (2.0 * tau / (1.0 - tau)).max(0.01),
            },
            CopulaFamily::Gumbel => CopulaParameters::Gumbel {
                theta: (1.0 / (1.0 - tau)).max(1.0),
            },
            CopulaFamily::Frank => CopulaParameters::Frank { theta: 5.736 * tau },
        }
    }

    pub fn family(&self) -> CopulaFamily {
        match self {
            CopulaParameters::Gaussian { .. } => CopulaFamily::Gaussian,
            CopulaParameters::Clayton { .. } => CopulaFamily::Clayton,
            CopulaParameters::Gumbel { .. } => CopulaFamily::Gumbel,
            CopulaParameters::StudentT { .. } => CopulaFamily::StudentT,
            CopulaParameters::Frank { .. } => CopulaFamily::Frank,
        }
    }

    /// `(lower, upper)` tail-dependence coefficients
    pub fn tail_dependence(&self) -> (f64, f64) {
        match *self {
            CopulaParameters::Gaussian { .. } | CopulaParameters::Frank { .. } => (0.0, 0.0),
            CopulaParameters::Clayton { theta } => (2f64.powf(-1.0 / theta), 0.0),
            CopulaParameters::Gumbel { theta } => (0.0, 2.0 - 2f64.powf(1.0 / theta)),
            CopulaParameters::StudentT { rho, df } => {
                let lambda = student_t_tail(rho, df);
                (lambda, lambda)
            }
        }
    }

    /// Copula log-likelihood over pseudo-observations
    ///
    /// Returns `-inf` when the density is not finite anywhere on the sample.
    pub fn log_likelihood(&self, u: &[f64], v: &[f64]) -> f64 {
        let ll = match *self {
            CopulaParameters::Gaussian { rho } => gaussian_ll(u, v, rho),
            CopulaParameters::StudentT { rho, .. } => {
                gaussian_ll(u, v, rho) * STUDENT_T_LIKELIHOOD_SCALE
            }
            CopulaParameters::Clayton { theta } => sum_density(u, v, |a, b| clayton_ln_density(a, b, theta)),
            CopulaParameters::Gumbel { theta } => sum_density(u, v, |a, b| gumbel_ln_density(a, b, theta)),
            CopulaParameters::Frank { theta } => sum_density(u, v, |a, b| frank_ln_density(a, b, theta)),
        };
        if ll.is_nan() {
            f64::NEG_INFINITY
        } else {
            ll
        }
    }
}

fn student_t_tail(rho: f64, df: f64) -> f64 {
    let rho = rho.clamp(-RHO_LIMIT, RHO_LIMIT);
    let arg = -((df + 1.0) * (1.0 - rho) / (1.0 + rho)).sqrt();
    match StudentsT::new(0.0, 1.0, df + 1.0) {
        Ok(t) => 2.0 * t.cdf(arg),
        Err(_) => 0.0,
    }
}

fn sum_density(u: &[f64], v: &[f64], f: impl Fn(f64, f64) -> f64) -> f64 {
    u.iter().zip(v).map(|(&a, &b)| f(a, b)).sum()
}

/// `ln(e^a + e^b - 1)` without overflow, for `a, b >= 0`
fn ln_sum_exp_minus_one(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp() - (-m).exp()).ln()
}

/// `ln(e^a + e^b)` without overflow
fn ln_sum_exp(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

fn gaussian_ll(u: &[f64], v: &[f64], rho: f64) -> f64 {
    let rho = rho.clamp(-RHO_LIMIT, RHO_LIMIT);
    let one_minus = 1.0 - rho * rho;
    sum_density(u, v, |a, b| {
        let x = stats::normal_quantile(a);
        let y = stats::normal_quantile(b);
        -0.5 * one_minus.ln() - (rho * rho * (x * x + y * y) - 2.0 * rho * x * y) / (2.0 * one_minus)
    })
}

fn clayton_ln_density(u: f64, v: f64, theta: f64) -> f64 {
    let (lu, lv) = (u.ln(), v.ln());
    (1.0 + theta).ln() - (theta + 1.0) * (lu + lv)
        - (2.0 + 1.0 / theta) * ln_sum_exp_minus_one(-theta * lu, -theta * lv)
}

fn gumbel_ln_density(u: f64, v: f64, theta: f64) -> f64 {
    let (x, y) = (-u.ln(), -v.ln());
    let ln_s = ln_sum_exp(theta * x.ln(), theta * y.ln());
    let a = (ln_s / theta).exp();
    -a - u.ln() - v.ln() + (theta - 1.0) * (x.ln() + y.ln()) + (1.0 / theta - 2.0) * ln_s
        + (a + theta - 1.0).ln()
}

fn frank_ln_density(u: f64, v: f64, theta: f64) -> f64 {
    if theta.abs() < 1e-8 {
        return 0.0;
    }
    let e = -(-theta).exp_m1(); // 1 - e^{-theta}
    let eu = -(-theta * u).exp_m1();
    let ev = -(-theta * v).exp_m1();
    let denom = e - eu * ev;
    (theta * e).ln() - theta * (u + v) - 2.0 * denom.abs().ln()
}

/// A family evaluated at its tau-based parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaFit {
    pub parameters: CopulaParameters,
    pub log_likelihood: f64,
    pub aic: f64,
    pub tail_lower: f64,
    pub tail_upper: f64,
}

impl CopulaFit {
    pub fn family(&self) -> CopulaFamily {
        self.parameters.family()
    }
}

/// A fit with its position in the AIC ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCopula {
    pub rank: usize,
    pub fit: CopulaFit,
}

/// Which tails show dependence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailDependenceKind {
    None,
    Lower,
    Upper,
    Both,
}

impl TailDependenceKind {
    pub fn classify(lower: f64, upper: f64) -> Self {
        match (lower > TAIL_DEPENDENCE_THRESHOLD, upper > TAIL_DEPENDENCE_THRESHOLD) {
            (true, true) => TailDependenceKind::Both,
            (true, false) => TailDependenceKind::Lower,
            (false, true) => TailDependenceKind::Upper,
            (false, false) => TailDependenceKind::None,
        }
    }
}

/// Output of [`select_copula`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaSelection {
    pub n_obs: usize,
    pub kendall_tau: f64,
    pub pearson: f64,
    pub spearman: f64,

    /// Families ordered by ascending AIC
    pub ranking: Vec<RankedCopula>,

    /// Tail dependence of the best-ranked family
    pub dependence: TailDependenceKind,

    /// `|tail_lower - tail_upper| > 0.05` for the best-ranked family
    pub asymmetric: bool,

    /// Fewer than three observations or a constant series; the dependence
    /// measures are zero sentinels
    pub degenerate: bool,
}

impl CopulaSelection {
    pub fn best(&self) -> Option<&CopulaFit> {
        self.ranking.first().map(|r| &r.fit)
    }
}

/// Pseudo-uniform marginals `rank / (n + 1)`
pub fn pseudo_observations(data: &[f64]) -> Vec<f64> {
    let denom = (data.len() + 1) as f64;
    stats::rank(data).into_iter().map(|r| r / denom).collect()
}

/// Evaluate each requested family on `(x, y)` and rank by AIC
pub fn select_copula(
    x: &[f64],
    y: &[f64],
    families: &[CopulaFamily],
    student_t_df: f64,
) -> Result<CopulaSelection> {
    if x.len() != y.len() {
        return Err(QuantError::InvalidInput(format!(
            "copula inputs must have equal length, got {} and {}",
            x.len(),
            y.len()
        )));
    }
    if families.is_empty() {
        return Err(QuantError::InvalidInput(
            "at least one copula family must be requested".to_string(),
        ));
    }
    if student_t_df <= 0.0 {
        return Err(QuantError::InvalidInput(format!(
            "student-t degrees of freedom must be positive, got {}",
            student_t_df
        )));
    }

    let n = x.len();
    let degenerate = n < 3 || stats::std(x) == 0.0 || stats::std(y) == 0.0;
    if degenerate {
        warn!(n, "Degenerate copula input, dependence measures default to zero");
    }

    let u = pseudo_observations(x);
    let v = pseudo_observations(y);
    let tau = if degenerate { 0.0 } else { kendall_tau(x, y) };

    let mut fits: Vec<CopulaFit> = families
        .iter()
        .map(|&family| {
            let parameters = CopulaParameters::from_tau(family, tau, student_t_df);
            let log_likelihood = parameters.log_likelihood(&u, &v);
            let k = family.parameter_count() as f64;
            let (tail_lower, tail_upper) = parameters.tail_dependence();
            debug!(family = %family, log_likelihood, "Copula evaluated");
            CopulaFit {
                parameters,
                log_likelihood,
                aic: 2.0 * k - 2.0 * log_likelihood,
                tail_lower,
                tail_upper,
            }
        })
        .collect();

    fits.sort_by(|a, b| a.aic.total_cmp(&b.aic));
    let ranking: Vec<RankedCopula> = fits
        .into_iter()
        .enumerate()
        .map(|(i, fit)| RankedCopula { rank: i + 1, fit })
        .collect();

    let (lower, upper) = ranking
        .first()
        .map(|r| (r.fit.tail_lower, r.fit.tail_upper))
        .unwrap_or((0.0, 0.0));

    Ok(CopulaSelection {
        n_obs: n,
        kendall_tau: tau,
        pearson: stats::pearson(x, y),
        spearman: spearman(x, y),
        ranking,
        dependence: TailDependenceKind::classify(lower, upper),
        asymmetric: (lower - upper).abs() > ASYMMETRY_THRESHOLD,
        degenerate,
    })
}
