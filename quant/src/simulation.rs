//! Seeded scenario simulation from fitted models
//!
//! Turns any [`ModelFit`] into a [`ScenarioMatrix`] of simple returns
//! (rows are scenarios, columns are horizon steps) so that fitted models
//! can feed the VaR engine. The generator is seeded from the config, so
//! equal inputs give bit-identical matrices.

use crate::error::{QuantError, Result};
use crate::models::{ModelFit, ModelParameters};
use crate::var::ScenarioMatrix;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Monte Carlo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_n_scenarios")]
    pub n_scenarios: usize,

    /// Steps per scenario, in units of the fit's `dt`
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_scenarios() -> usize {
    1_000
}

fn default_horizon() -> usize {
    20
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_scenarios: default_n_scenarios(),
            horizon: default_horizon(),
            seed: default_seed(),
        }
    }
}

/// Simulate `config.n_scenarios` paths of `config.horizon` steps from `fit`
pub fn simulate_scenarios(
    fit: &ModelFit,
    start_value: f64,
    config: &SimulationConfig,
) -> Result<ScenarioMatrix> {
    if config.n_scenarios == 0 || config.horizon == 0 {
        return Err(QuantError::InvalidInput(
            "simulation needs at least one scenario and one step".to_string(),
        ));
    }
    if !start_value.is_finite() {
        return Err(QuantError::InvalidInput(format!(
            "start value must be finite, got {}",
            start_value
        )));
    }
    let multiplicative = !matches!(fit.parameters, ModelParameters::OrnsteinUhlenbeck { .. });
    if multiplicative && start_value <= 0.0 {
        return Err(QuantError::InvalidInput(format!(
            "{} paths need a positive start value, got {}",
            fit.kind(),
            start_value
        )));
    }
    if fit.dt <= 0.0 || !fit.dt.is_finite() {
        return Err(QuantError::InvalidInput(format!(
            "fit step size must be positive, got {}",
            fit.dt
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| QuantError::InvalidInput(e.to_string()))?;
    let mut stepper = Stepper::new(&fit.parameters, fit.dt)?;

    let (rows, cols) = (config.n_scenarios, config.horizon);
    let mut values = DMatrix::zeros(rows, cols);
    for i in 0..rows {
        stepper.reset();
        let mut level = start_value;
        for j in 0..cols {
            let next = stepper.step(level, &mut rng, &normal);
            values[(i, j)] = if level != 0.0 { next / level - 1.0 } else { 0.0 };
            level = next;
        }
    }

    debug!(
        model = %fit.kind(),
        scenarios = rows,
        horizon = cols,
        seed = config.seed,
        "Scenarios simulated"
    );
    let factors = (1..=cols).map(|t| format!("t{}", t)).collect();
    ScenarioMatrix::new(factors, values)
}

/// Per-path state and one-step transition of each model
struct Stepper {
    params: ModelParameters,
    dt: f64,
    variance: f64,
    jumps: Option<Poisson<f64>>,
    jump_size: Option<Normal<f64>>,
}

impl Stepper {
    fn new(params: &ModelParameters, dt: f64) -> Result<Self> {
        let (jumps, jump_size) = match *params {
            ModelParameters::MertonJump {
                lambda,
                jump_mean,
                jump_std,
                ..
            } => {
                let rate = lambda * dt;
                let jumps = if rate > 0.0 {
                    Some(Poisson::new(rate).map_err(|e| QuantError::InvalidInput(e.to_string()))?)
                } else {
                    None
                };
                let size = Normal::new(jump_mean, jump_std.max(0.0))
                    .map_err(|e| QuantError::InvalidInput(e.to_string()))?;
                (jumps, Some(size))
            }
            _ => (None, None),
        };
        Ok(Self {
            params: *params,
            dt,
            variance: 0.0,
            jumps,
            jump_size,
        })
    }

    fn reset(&mut self) {
        if let ModelParameters::Heston { v0, .. } = self.params {
            self.variance = v0;
        }
    }

    fn step(&mut self, level: f64, rng: &mut StdRng, normal: &Normal<f64>) -> f64 {
        let dt = self.dt;
        let z = normal.sample(rng);
        match self.params {
            ModelParameters::Gbm { mu, sigma } => {
                level * ((mu - 0.5 * sigma * sigma) * dt + sigma * dt.sqrt() * z).exp()
            }
            ModelParameters::OrnsteinUhlenbeck { theta, mu, sigma } => {
                let decay = (-theta * dt).exp();
                let sd = sigma * ((1.0 - decay * decay) / (2.0 * theta)).sqrt();
                mu + (level - mu) * decay + sd * z
            }
            ModelParameters::Heston {
                mu,
                kappa,
                theta,
                xi,
                rho,
                ..
            } => {
                // Full truncation: negative variance is floored in drift and diffusion
                let v = self.variance.max(0.0);
                let w = normal.sample(rng);
                let z2 = rho * z + (1.0 - rho * rho).max(0.0).sqrt() * w;
                let next = level * ((mu - 0.5 * v) * dt + (v * dt).sqrt() * z).exp();
                self.variance += kappa * (theta - v) * dt + xi * (v * dt).sqrt() * z2;
                next
            }
            ModelParameters::MertonJump {
                mu,
                sigma,
                lambda,
                jump_mean,
                jump_std,
            } => {
                let compensator = lambda * ((jump_mean + 0.5 * jump_std * jump_std).exp() - 1.0);
                let mut log_step =
                    (mu - 0.5 * sigma * sigma - compensator) * dt + sigma * dt.sqrt() * z;
                if let (Some(jumps), Some(size)) = (&self.jumps, &self.jump_size) {
                    let count = jumps.sample(rng) as usize;
                    log_step += (0..count).map(|_| size.sample(rng)).sum::<f64>();
                }
                level * log_step.exp()
            }
        }
    }
}
