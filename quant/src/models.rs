//! Stochastic process model selection
//!
//! Fits a closed set of continuous-time models to one level series and ranks
//! them by AIC:
//! - GBM: drift and volatility from log-return moments
//! - Ornstein-Uhlenbeck: AR(1) regression of level on lag
//! - Heston: moment-matched approximation (not a joint MLE)
//! - Merton jump-diffusion: moment-matched approximation (not a joint MLE)
//!
//! The Heston and Merton parameters come from return variance, skewness and
//! excess kurtosis. Their likelihood is the Gaussian return likelihood nudged
//! by a fixed factor for fat tails, so their estimates do not satisfy the
//! models' true likelihood equations.

use crate::error::{QuantError, Result};
use crate::series::{self, Frequency, TimeSeries};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Likelihood nudge applied to the Gaussian likelihood for Heston fits
pub const HESTON_LIKELIHOOD_ADJUSTMENT: f64 = 0.02;

/// Likelihood nudge applied to the Gaussian likelihood for Merton fits
pub const MERTON_LIKELIHOOD_ADJUSTMENT: f64 = 0.03;

/// Per-period jump probability assumed when moment-matching Merton jumps
const MERTON_JUMP_PROBABILITY: f64 = 0.05;

/// Supported stochastic process models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Gbm,
    OrnsteinUhlenbeck,
    Heston,
    MertonJump,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Gbm,
        ModelKind::OrnsteinUhlenbeck,
        ModelKind::Heston,
        ModelKind::MertonJump,
    ];

    /// Number of free parameters used in AIC/BIC
    ///
    /// Heston's `v0` is read off the recent sample variance and is not
    /// counted.
    pub fn parameter_count(self) -> usize {
        match self {
            ModelKind::Gbm => 2,
            ModelKind::OrnsteinUhlenbeck => 3,
            ModelKind::Heston | ModelKind::MertonJump => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Gbm => "gbm",
            ModelKind::OrnsteinUhlenbeck => "ornstein_uhlenbeck",
            ModelKind::Heston => "heston",
            ModelKind::MertonJump => "merton_jump",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbm" | "geometric_brownian_motion" => Ok(ModelKind::Gbm),
            "ou" | "ornstein_uhlenbeck" | "mean_reversion" => Ok(ModelKind::OrnsteinUhlenbeck),
            "heston" => Ok(ModelKind::Heston),
            "merton" | "merton_jump" | "jump_diffusion" => Ok(ModelKind::MertonJump),
            other => Err(QuantError::UnknownModelKind(other.to_string())),
        }
    }
}

/// Fitted parameters, one variant per model kind
///
/// All rates and volatilities are annualized using the series frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParameters {
    Gbm {
        mu: f64,
        sigma: f64,
    },
    OrnsteinUhlenbeck {
        /// Mean-reversion speed
        theta: f64,
        /// Long-run mean level
        mu: f64,
        sigma: f64,
    },
    Heston {
        mu: f64,
        /// Variance mean-reversion speed
        kappa: f64,
        /// Long-run variance
        theta: f64,
        /// Volatility of variance
        xi: f64,
        /// Price/variance correlation
        rho: f64,
        /// Starting variance
        v0: f64,
    },
    MertonJump {
        mu: f64,
        /// Diffusion volatility
        sigma: f64,
        /// Jumps per year
        lambda: f64,
        /// Mean log jump size
        jump_mean: f64,
        /// Log jump size std
        jump_std: f64,
    },
}

impl ModelParameters {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParameters::Gbm { .. } => ModelKind::Gbm,
            ModelParameters::OrnsteinUhlenbeck { .. } => ModelKind::OrnsteinUhlenbeck,
            ModelParameters::Heston { .. } => ModelKind::Heston,
            ModelParameters::MertonJump { .. } => ModelKind::MertonJump,
        }
    }

    /// Parameters as a name → value map
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let pairs: Vec<(&str, f64)> = match *self {
            ModelParameters::Gbm { mu, sigma } => vec![("mu", mu), ("sigma", sigma)],
            ModelParameters::OrnsteinUhlenbeck { theta, mu, sigma } => {
                vec![("theta", theta), ("mu", mu), ("sigma", sigma)]
            }
            ModelParameters::Heston {
                mu,
                kappa,
                theta,
                xi,
                rho,
                v0,
            } => vec![
                ("mu", mu),
                ("kappa", kappa),
                ("theta", theta),
                ("xi", xi),
                ("rho", rho),
                ("v0", v0),
            ],
            ModelParameters::MertonJump {
                mu,
                sigma,
                lambda,
                jump_mean,
                jump_std,
            } => vec![
                ("mu", mu),
                ("sigma", sigma),
                ("lambda", lambda),
                ("jump_mean", jump_mean),
                ("jump_std", jump_std),
            ],
        };
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// A fitted model with its information criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub parameters: ModelParameters,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,

    /// Observations the likelihood was evaluated on
    pub n_obs: usize,

    /// Step size in years between observations
    pub dt: f64,
}

impl ModelFit {
    /// Assemble a fit, deriving AIC and BIC from the likelihood
    pub fn new(parameters: ModelParameters, log_likelihood: f64, n_obs: usize, dt: f64) -> Self {
        let k = parameters.kind().parameter_count();
        let (aic, bic) = information_criteria(log_likelihood, k, n_obs);
        Self {
            parameters,
            log_likelihood,
            aic,
            bic,
            n_obs,
            dt,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.parameters.kind()
    }
}

/// `(AIC, BIC)` for a log-likelihood with `k` parameters over `n` observations
///
/// A `-inf` likelihood yields `+inf` criteria.
pub fn information_criteria(log_likelihood: f64, k: usize, n: usize) -> (f64, f64) {
    let k = k as f64;
    let aic = 2.0 * k - 2.0 * log_likelihood;
    let bic = k * (n.max(1) as f64).ln() - 2.0 * log_likelihood;
    (aic, bic)
}

/// Shape diagnostics of the return series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDiagnostics {
    pub n_returns: usize,
    pub skewness: f64,
    pub excess_kurtosis: f64,

    /// Lag-1 autocorrelation of returns
    pub autocorrelation: f64,

    /// Lag-1 autocorrelation of squared returns
    pub squared_autocorrelation: f64,

    /// ARCH-type clustering: squared-return autocorrelation above 0.2
    pub volatility_clustering: bool,

    /// Return autocorrelation below -0.1
    pub likely_mean_reverting: bool,

    /// Raw kurtosis above 3
    pub fat_tails: bool,
}

impl SeriesDiagnostics {
    pub fn from_returns(returns: &[f64]) -> Self {
        let squared: Vec<f64> = returns.iter().map(|r| r * r).collect();
        let autocorrelation = stats::autocorrelation(returns, 1);
        let squared_autocorrelation = stats::autocorrelation(&squared, 1);
        let kurtosis = stats::kurtosis(returns);
        Self {
            n_returns: returns.len(),
            skewness: stats::skewness(returns),
            excess_kurtosis: stats::excess_kurtosis(returns),
            autocorrelation,
            squared_autocorrelation,
            volatility_clustering: squared_autocorrelation > 0.2,
            likely_mean_reverting: autocorrelation < -0.1,
            fat_tails: kurtosis > 3.0,
        }
    }
}

/// A fit with its position in the AIC ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    /// 1 = lowest AIC
    pub rank: usize,
    pub fit: ModelFit,
}

/// A requested model that could not be fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFit {
    pub kind: ModelKind,
    pub reason: String,
}

/// Output of [`select_model`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub series_name: String,

    /// Successful fits ordered by ascending AIC
    pub ranking: Vec<RankedModel>,

    /// Requested models dropped from the ranking
    pub failures: Vec<FailedFit>,

    pub diagnostics: SeriesDiagnostics,
}

impl ModelSelection {
    /// Lowest-AIC fit, if any model could be fitted
    pub fn best(&self) -> Option<&ModelFit> {
        self.ranking.first().map(|r| &r.fit)
    }
}

/// Sort fits by AIC and assign contiguous 1-based ranks
pub fn rank_fits(mut fits: Vec<ModelFit>) -> Vec<RankedModel> {
    fits.sort_by(|a, b| a.aic.total_cmp(&b.aic));
    fits.into_iter()
        .enumerate()
        .map(|(i, fit)| RankedModel { rank: i + 1, fit })
        .collect()
}

/// Fit each requested model kind to `series` and rank by AIC
///
/// Individual fits that fail are logged and reported in `failures`; the
/// selection itself only fails on an empty model list.
pub fn select_model(series: &TimeSeries, kinds: &[ModelKind]) -> Result<ModelSelection> {
    if kinds.is_empty() {
        return Err(QuantError::InvalidInput(
            "at least one model kind must be requested".to_string(),
        ));
    }
    let levels = series.values();
    let returns = series::log_returns(levels).unwrap_or_else(|_| series.simple_returns());
    let diagnostics = SeriesDiagnostics::from_returns(&returns);

    let mut fits = Vec::new();
    let mut failures = Vec::new();
    for &kind in kinds {
        match fit_model(kind, levels, series.frequency()) {
            Ok(fit) => {
                debug!(
                    series = series.name(),
                    model = %kind,
                    log_likelihood = fit.log_likelihood,
                    aic = fit.aic,
                    "Model fitted"
                );
                fits.push(fit);
            }
            Err(e) => {
                warn!(series = series.name(), model = %kind, error = %e, "Dropping model from ranking");
                failures.push(FailedFit {
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    let ranking = rank_fits(fits);
    if let Some(best) = ranking.first() {
        info!(
            series = series.name(),
            best = %best.fit.kind(),
            aic = best.fit.aic,
            "Model selection complete"
        );
    }

    Ok(ModelSelection {
        series_name: series.name().to_string(),
        ranking,
        failures,
        diagnostics,
    })
}

/// Fit one model kind to a level series sampled at `frequency`
pub fn fit_model(kind: ModelKind, levels: &[f64], frequency: Frequency) -> Result<ModelFit> {
    let dt = frequency.dt();
    match kind {
        ModelKind::Gbm => fit_gbm(levels, dt),
        ModelKind::OrnsteinUhlenbeck => fit_ou(levels, dt),
        ModelKind::Heston => fit_heston(levels, dt),
        ModelKind::MertonJump => fit_merton(levels, dt),
    }
}

/// Log returns with the checks every return-based model needs
fn checked_returns(levels: &[f64], kind: ModelKind) -> Result<(Vec<f64>, f64, f64)> {
    let returns = series::log_returns(levels)?;
    if returns.len() < 3 {
        return Err(QuantError::InsufficientData(format!(
            "{} needs at least 3 returns, got {}",
            kind,
            returns.len()
        )));
    }
    let mean = stats::mean(&returns);
    let std = stats::std(&returns);
    if std <= 0.0 {
        return Err(QuantError::DegenerateInput(format!(
            "{}: returns have zero variance",
            kind
        )));
    }
    Ok((returns, mean, std))
}

/// Scale a likelihood toward better fit by `adjustment`
fn adjust_likelihood(ll: f64, adjustment: f64) -> f64 {
    if ll >= 0.0 {
        ll * (1.0 + adjustment)
    } else {
        ll * (1.0 - adjustment)
    }
}

fn fit_gbm(levels: &[f64], dt: f64) -> Result<ModelFit> {
    let (returns, mean, std) = checked_returns(levels, ModelKind::Gbm)?;
    let sigma = std / dt.sqrt();
    let mu = mean / dt + 0.5 * sigma * sigma;
    let ll = stats::gaussian_log_likelihood(&returns, mean, std);
    Ok(ModelFit::new(
        ModelParameters::Gbm { mu, sigma },
        ll,
        returns.len(),
        dt,
    ))
}

fn fit_ou(levels: &[f64], dt: f64) -> Result<ModelFit> {
    if levels.len() < 4 {
        return Err(QuantError::InsufficientData(format!(
            "ornstein_uhlenbeck needs at least 4 levels, got {}",
            levels.len()
        )));
    }
    let lagged = &levels[..levels.len() - 1];
    let current = &levels[1..];
    if stats::std(lagged) <= 0.0 {
        return Err(QuantError::DegenerateInput(
            "ornstein_uhlenbeck: levels have zero variance".to_string(),
        ));
    }

    let fit = stats::ols(lagged, current);
    let beta = fit.slope.clamp(0.01, 0.99);
    let alpha = fit.intercept;
    let theta = -beta.ln() / dt;
    let mu = alpha / (1.0 - beta);

    let resid_var = fit.residual_variance();
    if resid_var <= 0.0 {
        return Err(QuantError::DegenerateInput(
            "ornstein_uhlenbeck: regression residuals have zero variance".to_string(),
        ));
    }
    // Exact discretization: Var(eps) = sigma^2 (1 - beta^2) / (2 theta)
    let sigma = (2.0 * theta * resid_var / (1.0 - beta * beta)).sqrt();
    let ll = stats::gaussian_log_likelihood(&fit.residuals, 0.0, resid_var.sqrt());

    Ok(ModelFit::new(
        ModelParameters::OrnsteinUhlenbeck { theta, mu, sigma },
        ll,
        fit.residuals.len(),
        dt,
    ))
}

fn fit_heston(levels: &[f64], dt: f64) -> Result<ModelFit> {
    let (returns, mean, std) = checked_returns(levels, ModelKind::Heston)?;
    let excess_kurtosis = stats::excess_kurtosis(&returns).max(0.0);
    let skew = stats::skewness(&returns);

    let theta = std * std / dt;
    // Fewer fat tails -> faster variance mean reversion
    let kappa = (3.0 / (1.0 + excess_kurtosis)).clamp(0.5, 5.0);
    // Heston excess kurtosis is roughly 3 xi^2 / (2 kappa theta)
    let xi = (2.0 * kappa * theta * excess_kurtosis / 3.0).sqrt();
    let rho = skew.clamp(-0.95, 0.95);

    let recent = &returns[returns.len() - (returns.len() / 4).max(2)..];
    let v0 = {
        let v = stats::variance(recent) / dt;
        if v > 0.0 {
            v
        } else {
            theta
        }
    };
    let mu = mean / dt + 0.5 * theta;

    let ll = adjust_likelihood(
        stats::gaussian_log_likelihood(&returns, mean, std),
        HESTON_LIKELIHOOD_ADJUSTMENT,
    );
    Ok(ModelFit::new(
        ModelParameters::Heston {
            mu,
            kappa,
            theta,
            xi,
            rho,
            v0,
        },
        ll,
        returns.len(),
        dt,
    ))
}

fn fit_merton(levels: &[f64], dt: f64) -> Result<ModelFit> {
    let (returns, mean, std) = checked_returns(levels, ModelKind::MertonJump)?;
    let excess_kurtosis = stats::excess_kurtosis(&returns).max(0.0);
    let skew = stats::skewness(&returns);
    let variance = std * std;

    // Share of per-period variance attributed to jumps
    let jump_share = excess_kurtosis / (excess_kurtosis + 3.0);
    let jump_var = jump_share * variance / MERTON_JUMP_PROBABILITY;
    let jump_std = jump_var.sqrt();
    let jump_mean = skew.clamp(-3.0, 3.0) * jump_std / 3.0;

    let sigma = ((1.0 - jump_share) * variance / dt).sqrt();
    let lambda = MERTON_JUMP_PROBABILITY / dt;
    let mu = mean / dt + 0.5 * sigma * sigma;

    let ll = adjust_likelihood(
        stats::gaussian_log_likelihood(&returns, mean, std),
        MERTON_LIKELIHOOD_ADJUSTMENT,
    );
    Ok(ModelFit::new(
        ModelParameters::MertonJump {
            mu,
            sigma,
            lambda,
            jump_mean,
            jump_std,
        },
        ll,
        returns.len(),
        dt,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let ts = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        TimeSeries::new("asset", ts, values, Frequency::Daily).unwrap()
    }

    /// Deterministic wiggly price path
    fn trending_prices(n: usize) -> Vec<f64> {
        let mut p = 100.0;
        (0..n)
            .map(|i| {
                let shock = ((i * 37) % 17) as f64 / 17.0 - 0.5;
                p *= 1.0 + 0.0005 + 0.01 * shock;
                p
            })
            .collect()
    }

    /// Level series pulled back to 50
    fn mean_reverting_levels(n: usize) -> Vec<f64> {
        let mut x = 60.0;
        (0..n)
            .map(|i| {
                let shock = ((i * 29) % 13) as f64 / 13.0 - 0.5;
                x += 0.3 * (50.0 - x) + shock;
                x
            })
            .collect()
    }

    #[test]
    fn test_information_criteria_identity() {
        let fit = fit_gbm(&trending_prices(200), 1.0 / 252.0).unwrap();
        let k = 2.0;
        let n = fit.n_obs as f64;
        assert_relative_eq!(fit.aic, 2.0 * k - 2.0 * fit.log_likelihood, epsilon = 1e-9);
        assert_relative_eq!(fit.bic, k * n.ln() - 2.0 * fit.log_likelihood, epsilon = 1e-9);
    }

    #[test]
    fn test_gbm_recovers_volatility_scale() {
        let prices = trending_prices(300);
        let fit = fit_gbm(&prices, 1.0 / 252.0).unwrap();
        let returns = series::log_returns(&prices).unwrap();
        match fit.parameters {
            ModelParameters::Gbm { sigma, .. } => {
                assert_relative_eq!(sigma, stats::std(&returns) * 252f64.sqrt(), epsilon = 1e-12);
            }
            other => panic!("unexpected parameters {:?}", other),
        }
    }

    #[test]
    fn test_ou_recovers_long_run_mean() {
        let levels = mean_reverting_levels(400);
        let fit = fit_ou(&levels, 1.0 / 252.0).unwrap();
        match fit.parameters {
            ModelParameters::OrnsteinUhlenbeck { theta, mu, sigma } => {
                assert!((mu - 50.0).abs() < 1.0, "mu = {}", mu);
                assert!(theta > 0.0);
                assert!(sigma > 0.0);
            }
            other => panic!("unexpected parameters {:?}", other),
        }
    }

    #[test]
    fn test_selection_ranks_contiguously() {
        let s = series(trending_prices(250));
        let selection = select_model(&s, &ModelKind::ALL).unwrap();
        assert_eq!(selection.ranking.len(), 4);
        assert!(selection.failures.is_empty());
        let ranks: Vec<usize> = selection.ranking.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        let min_aic = selection
            .ranking
            .iter()
            .map(|r| r.fit.aic)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(selection.best().unwrap().aic, min_aic);
    }

    #[test]
    fn test_constant_series_drops_fits() {
        let s = series(vec![10.0; 30]);
        let selection = select_model(&s, &[ModelKind::Gbm, ModelKind::OrnsteinUhlenbeck]).unwrap();
        assert!(selection.ranking.is_empty());
        assert_eq!(selection.failures.len(), 2);
        assert!(selection.best().is_none());
    }

    #[test]
    fn test_non_positive_levels_only_drop_return_models() {
        let mut levels = mean_reverting_levels(100);
        levels[10] = -1.0;
        let s = series(levels);
        let selection = select_model(&s, &ModelKind::ALL).unwrap();
        assert_eq!(selection.ranking.len(), 1);
        assert_eq!(selection.best().unwrap().kind(), ModelKind::OrnsteinUhlenbeck);
        assert_eq!(selection.failures.len(), 3);
    }

    #[test]
    fn test_diagnostics_flags() {
        let alternating: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let diag = SeriesDiagnostics::from_returns(&alternating);
        assert!(diag.likely_mean_reverting);
        assert!(!diag.fat_tails);

        let mut spiky = vec![0.001; 60];
        for i in (0..60).step_by(2) {
            spiky[i] = -0.001;
        }
        spiky[30] = 0.2;
        let diag = SeriesDiagnostics::from_returns(&spiky);
        assert!(diag.fat_tails);
        assert!(diag.excess_kurtosis > 0.0);
    }

    #[test]
    fn test_parameter_maps() {
        let fit = fit_merton(&trending_prices(120), 1.0 / 252.0).unwrap();
        let map = fit.parameters.to_map();
        assert_eq!(map.len(), 5);
        assert!(map.contains_key("lambda"));
        assert_eq!(fit.kind().parameter_count(), 5);
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("OU".parse::<ModelKind>().unwrap(), ModelKind::OrnsteinUhlenbeck);
        assert!(matches!(
            "garch".parse::<ModelKind>(),
            Err(QuantError::UnknownModelKind(_))
        ));
    }

    #[test]
    fn test_empty_request_rejected() {
        let s = series(trending_prices(20));
        assert!(select_model(&s, &[]).is_err());
    }
}
