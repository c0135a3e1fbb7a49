//! Cross-model comparison by information criteria
//!
//! Candidates are scored by AIC/BIC (estimating the log-likelihood from a
//! Gaussian fit to the predictions when none is supplied), optionally by
//! Brier score and log loss against ground truth, ranked by AIC and compared
//! pairwise with a likelihood ratio and a simplified Vuong statistic.

use crate::backtest;
use crate::error::{QuantError, Result};
use crate::models::information_criteria;
use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A model's predictions and fit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateModel {
    pub name: String,
    pub predictions: Vec<f64>,
    pub parameter_count: usize,

    /// Precomputed log-likelihood; estimated from the predictions when unset
    #[serde(default)]
    pub log_likelihood: Option<f64>,

    /// Realized outcomes aligned with `predictions`
    #[serde(default)]
    pub ground_truth: Option<Vec<bool>>,
}

impl CandidateModel {
    pub fn new(name: impl Into<String>, predictions: Vec<f64>, parameter_count: usize) -> Self {
        Self {
            name: name.into(),
            predictions,
            parameter_count,
            log_likelihood: None,
            ground_truth: None,
        }
    }

    pub fn with_log_likelihood(mut self, log_likelihood: f64) -> Self {
        self.log_likelihood = Some(log_likelihood);
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: Vec<bool>) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }
}

/// Score of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub name: String,
    pub rank: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_obs: usize,
    pub parameter_count: usize,
    pub brier_score: Option<f64>,
    pub log_loss: Option<f64>,

    /// `1` for the lowest AIC, `0` for the highest
    pub relative_score: f64,

    /// Log-likelihood is not finite (e.g. constant predictions)
    pub degenerate: bool,
}

/// Comparison of an ordered pair of candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseComparison {
    pub first: String,
    pub second: String,

    /// `exp(ll_first - ll_second)`
    pub likelihood_ratio: f64,

    /// `(ll_first - ll_second) / sqrt(n)`
    pub vuong_statistic: f64,

    /// Candidate with the lower AIC, `first` on ties
    pub preferred: String,
}

/// Output of [`compare_models`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    /// Scores ordered by ascending AIC
    pub scores: Vec<ModelScore>,
    pub pairwise: Vec<PairwiseComparison>,
}

impl ModelComparison {
    pub fn best(&self) -> Option<&ModelScore> {
        self.scores.first()
    }
}

/// Score, rank and pairwise-compare at least two candidates
pub fn compare_models(models: &[CandidateModel]) -> Result<ModelComparison> {
    if models.len() < 2 {
        return Err(QuantError::InvalidInput(format!(
            "at least two models required, got {}",
            models.len()
        )));
    }

    let mut scores = models.iter().map(score_model).collect::<Result<Vec<_>>>()?;
    scores.sort_by(|a, b| a.aic.total_cmp(&b.aic));

    let finite: Vec<f64> = scores.iter().map(|s| s.aic).filter(|a| a.is_finite()).collect();
    let min_aic = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max_aic = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
        score.relative_score = if !score.aic.is_finite() {
            0.0
        } else if max_aic > min_aic {
            (max_aic - score.aic) / (max_aic - min_aic)
        } else {
            1.0
        };
    }

    let mut pairwise = Vec::with_capacity(scores.len() * (scores.len() - 1));
    for (i, a) in scores.iter().enumerate() {
        for (j, b) in scores.iter().enumerate() {
            if i != j {
                pairwise.push(compare_pair(a, b));
            }
        }
    }

    debug!(
        models = scores.len(),
        best = %scores[0].name,
        "Model comparison complete"
    );
    Ok(ModelComparison { scores, pairwise })
}

fn score_model(model: &CandidateModel) -> Result<ModelScore> {
    if model.predictions.is_empty() {
        return Err(QuantError::InvalidInput(format!(
            "model '{}' has no predictions",
            model.name
        )));
    }
    let n_obs = model.predictions.len();

    let log_likelihood = model.log_likelihood.unwrap_or_else(|| {
        stats::gaussian_log_likelihood(
            &model.predictions,
            stats::mean(&model.predictions),
            stats::std(&model.predictions),
        )
    });
    let degenerate = !log_likelihood.is_finite();
    if degenerate {
        warn!(model = %model.name, "Log-likelihood is not finite, model ranks last");
    }
    let (aic, bic) = information_criteria(log_likelihood, model.parameter_count, n_obs);

    let (brier_score, log_loss) = match &model.ground_truth {
        Some(truth) if truth.len() != n_obs => {
            return Err(QuantError::InvalidInput(format!(
                "model '{}' has {} predictions but {} outcomes",
                model.name,
                n_obs,
                truth.len()
            )))
        }
        Some(truth) => (
            Some(backtest::brier_score(&model.predictions, truth)),
            Some(backtest::log_loss(&model.predictions, truth)),
        ),
        None => (None, None),
    };

    Ok(ModelScore {
        name: model.name.clone(),
        rank: 0,
        log_likelihood,
        aic,
        bic,
        n_obs,
        parameter_count: model.parameter_count,
        brier_score,
        log_loss,
        relative_score: 0.0,
        degenerate,
    })
}

fn compare_pair(a: &ModelScore, b: &ModelScore) -> PairwiseComparison {
    let diff = a.log_likelihood - b.log_likelihood;
    let n = a.n_obs.min(b.n_obs).max(1) as f64;
    let (likelihood_ratio, vuong_statistic) = if diff.is_nan() {
        (1.0, 0.0)
    } else {
        (diff.exp(), diff / n.sqrt())
    };
    PairwiseComparison {
        first: a.name.clone(),
        second: b.name.clone(),
        likelihood_ratio,
        vuong_statistic,
        preferred: if b.aic < a.aic {
            b.name.clone()
        } else {
            a.name.clone()
        },
    }
}
