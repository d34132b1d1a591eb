use crate::config::VolatilityConfig;
use crate::stats::daily_returns;
use futures::future::join_all;
use log::{debug, info, warn};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Decay of the exponentially weighted variance backcast
const BACKCAST_DECAY: f64 = 0.94;
const BACKCAST_WINDOW: usize = 75;
/// Upper bound on alpha + beta, keeping the fitted process stationary
const MAX_PERSISTENCE: f64 = 0.99999;
const SIMPLEX_XTOL: f64 = 1e-4;
const SIMPLEX_FTOL: f64 = 1e-4;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

#[derive(Debug, Error)]
pub enum VolatilityError {
    #[error("insufficient data points: {observed} < {required}")]
    InsufficientData { observed: usize, required: usize },
    #[error("return series has no variance")]
    NoVariance,
    #[error("convergence failed after {0} iterations")]
    ConvergenceFailed(usize),
    #[error("invalid variance forecast: {0}")]
    InvalidForecast(f64),
    #[error("fit timed out after {0} ms")]
    Timeout(u64),
    #[error("fit task failed: {0}")]
    TaskFailed(String),
}

/// One-step-ahead conditional variance forecaster
#[cfg_attr(test, mockall::automock)]
pub trait VolatilityModel: Send + Sync {
    /// Forecast next-period variance in the squared units of `returns`
    fn forecast_variance(&self, returns: &[f64]) -> Result<f64, VolatilityError>;
}

/// Fitted GARCH(1,1) parameters with a constant mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarchParameters {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl GarchParameters {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    fn from_slice(x: &[f64]) -> Self {
        Self {
            mu: x[0],
            omega: x[1],
            alpha: x[2],
            beta: x[3],
        }
    }

    fn is_admissible(&self) -> bool {
        self.omega > 0.0
            && self.alpha >= 0.0
            && self.beta >= 0.0
            && self.persistence() < MAX_PERSISTENCE
    }
}

#[derive(Debug, Clone)]
pub struct GarchFit {
    pub params: GarchParameters,
    pub log_likelihood: f64,
    pub iterations: usize,
    last_residual: f64,
    last_variance: f64,
}

impl GarchFit {
    /// sigma2_{T+1} = omega + alpha * eps_T^2 + beta * sigma2_T
    pub fn forecast_variance(&self) -> f64 {
        let p = &self.params;
        p.omega + p.alpha * self.last_residual.powi(2) + p.beta * self.last_variance
    }
}

/// GARCH(1,1) with normal innovations, fit by maximum likelihood
#[derive(Debug, Clone)]
pub struct Garch11 {
    pub min_observations: usize,
    pub max_iterations: usize,
}

impl Default for Garch11 {
    fn default() -> Self {
        Self {
            min_observations: 30,
            max_iterations: 2000,
        }
    }
}

struct Recursion {
    neg_log_likelihood: f64,
    last_residual: f64,
    last_variance: f64,
}

impl Garch11 {
    pub fn new(min_observations: usize, max_iterations: usize) -> Self {
        Self {
            min_observations,
            max_iterations,
        }
    }

    pub fn fit(&self, returns: &[f64]) -> Result<GarchFit, VolatilityError> {
        let required = self.min_observations.max(2);
        if returns.len() < required {
            return Err(VolatilityError::InsufficientData {
                observed: returns.len(),
                required,
            });
        }

        let mean = returns.mean();
        let variance = returns.variance();
        if !(variance > 0.0) || !variance.is_finite() {
            return Err(VolatilityError::NoVariance);
        }

        let (lo, hi) = returns
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(r), hi.max(r))
            });
        let lower = [lo, 1e-6 * variance, 0.0, 0.0];
        let upper = [hi, 10.0 * variance, 1.0, 1.0];
        let start = [mean, 0.05 * variance, 0.05, 0.90];

        let objective = |x: &[f64]| {
            let params = GarchParameters::from_slice(x);
            Self::recursion(&params, returns)
                .map(|r| r.neg_log_likelihood)
                .unwrap_or(f64::INFINITY)
        };

        let (best, iterations) =
            nelder_mead(objective, &start, &lower, &upper, self.max_iterations)
                .ok_or(VolatilityError::ConvergenceFailed(self.max_iterations))?;

        let params = GarchParameters::from_slice(&best);
        let recursion = Self::recursion(&params, returns)
            .ok_or(VolatilityError::ConvergenceFailed(iterations))?;

        debug!(
            "GARCH(1,1) fit: mu={:.5} omega={:.5} alpha={:.4} beta={:.4} in {} iterations",
            params.mu, params.omega, params.alpha, params.beta, iterations
        );

        Ok(GarchFit {
            params,
            log_likelihood: -recursion.neg_log_likelihood,
            iterations,
            last_residual: recursion.last_residual,
            last_variance: recursion.last_variance,
        })
    }

    /// Exponentially weighted mean of the earliest squared residuals
    fn backcast(residuals: &[f64]) -> f64 {
        let tau = residuals.len().min(BACKCAST_WINDOW);
        let weights: Vec<f64> = (0..tau).map(|i| BACKCAST_DECAY.powi(i as i32)).collect();
        let total: f64 = weights.iter().sum();
        residuals
            .iter()
            .zip(weights.iter())
            .map(|(e, w)| w / total * e * e)
            .sum()
    }

    fn recursion(params: &GarchParameters, returns: &[f64]) -> Option<Recursion> {
        if !params.is_admissible() {
            return None;
        }

        let residuals: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
        let backcast = Self::backcast(&residuals);

        let mut variance = params.omega + params.persistence() * backcast;
        let mut total = 0.0;
        for (t, e) in residuals.iter().enumerate() {
            if t > 0 {
                variance = params.omega
                    + params.alpha * residuals[t - 1].powi(2)
                    + params.beta * variance;
            }
            total += 0.5 * (LN_2PI + variance.ln() + e * e / variance);
        }

        if !total.is_finite() {
            return None;
        }

        Some(Recursion {
            neg_log_likelihood: total,
            last_residual: residuals.last().copied().unwrap_or(0.0),
            last_variance: variance,
        })
    }
}

impl VolatilityModel for Garch11 {
    fn forecast_variance(&self, returns: &[f64]) -> Result<f64, VolatilityError> {
        let forecast = self.fit(returns)?.forecast_variance();
        if forecast.is_finite() && forecast > 0.0 {
            Ok(forecast)
        } else {
            Err(VolatilityError::InvalidForecast(forecast))
        }
    }
}

fn clamp_to(point: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((x, lo), hi) in point.iter_mut().zip(lower).zip(upper) {
        *x = x.clamp(*lo, *hi);
    }
}

/// Box-bounded Nelder-Mead minimizer.
///
/// Returns the best vertex and the iteration count, or `None` when the simplex
/// has not contracted within `max_iterations`.
fn nelder_mead<F>(
    f: F,
    start: &[f64],
    lower: &[f64],
    upper: &[f64],
    max_iterations: usize,
) -> Option<(Vec<f64>, usize)>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut first = start.to_vec();
    clamp_to(&mut first, lower, upper);
    simplex.push(first);
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] = if vertex[i] != 0.0 {
            vertex[i] * 1.05
        } else {
            0.00025
        };
        clamp_to(&mut vertex, lower, upper);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let along = |from: &[f64], to: &[f64], t: f64| -> Vec<f64> {
        let mut point: Vec<f64> = from
            .iter()
            .zip(to)
            .map(|(a, b)| a + t * (b - a))
            .collect();
        clamp_to(&mut point, lower, upper);
        point
    };

    for iteration in 0..=max_iterations {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        if values.iter().all(|v| v.is_finite())
            && x_spread <= SIMPLEX_XTOL
            && f_spread <= SIMPLEX_FTOL
        {
            return Some((simplex.swap_remove(0), iteration));
        }
        if iteration == max_iterations {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();

        let reflected = along(&centroid, &simplex[n], -1.0);
        let f_reflected = f(&reflected);

        if f_reflected < values[0] {
            let expanded = along(&centroid, &simplex[n], -2.0);
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        // Contract outside the worst vertex if the reflection helped, inside otherwise
        let (contracted, accept) = if f_reflected < values[n] {
            let point = along(&centroid, &reflected, 0.5);
            let value = f(&point);
            ((point, value), value <= f_reflected)
        } else {
            let point = along(&centroid, &simplex[n], 0.5);
            let value = f(&point);
            ((point, value), value < values[n])
        };
        if accept {
            simplex[n] = contracted.0;
            values[n] = contracted.1;
            continue;
        }

        // Shrink towards the best vertex
        for i in 1..=n {
            let shrunk: Vec<f64> = simplex[i]
                .iter()
                .zip(&simplex[0])
                .map(|(x, best)| best + 0.5 * (x - best))
                .collect();
            values[i] = f(&shrunk);
            simplex[i] = shrunk;
        }
    }

    None
}

/// Inverse-volatility position sizing from per-instrument variance forecasts
#[derive(Clone)]
pub struct VolatilityTargeter {
    /// Target annualized volatility per position
    pub target_volatility: f64,
    pub annualization_factor: f64,
    fit_timeout: Duration,
    model: Arc<dyn VolatilityModel>,
}

impl VolatilityTargeter {
    pub fn new(config: &VolatilityConfig) -> Self {
        let model = Garch11::new(config.min_observations, config.max_iterations);
        Self::with_model(config, Arc::new(model))
    }

    pub fn with_model(config: &VolatilityConfig, model: Arc<dyn VolatilityModel>) -> Self {
        info!(
            "Initializing volatility targeter with target: {:.1}%",
            config.target_annual_vol * 100.0
        );

        Self {
            target_volatility: config.target_annual_vol,
            annualization_factor: config.annualization_factor,
            fit_timeout: Duration::from_millis(config.fit_timeout_ms),
            model,
        }
    }

    /// Weight from a one-step variance forecast of percentage returns
    pub fn weight_from_variance(&self, pct_variance: f64) -> f64 {
        let daily_variance = pct_variance / 10_000.0;
        self.target_volatility / (daily_variance * self.annualization_factor).sqrt()
    }

    /// Raw (unnormalized) weights for each instrument's close history.
    ///
    /// Every fit runs as its own blocking task under a timeout. A failed,
    /// timed-out or panicked fit maps that instrument to weight 0.
    pub async fn compute_weights(
        &self,
        closes: BTreeMap<String, Vec<f64>>,
    ) -> BTreeMap<String, f64> {
        let timeout_ms = self.fit_timeout.as_millis() as u64;

        let fits = closes.into_iter().map(|(ticker, prices)| {
            let model = Arc::clone(&self.model);
            let fit_timeout = self.fit_timeout;
            async move {
                let returns: Vec<f64> = daily_returns(&prices)
                    .into_iter()
                    .filter(|r| !r.is_nan())
                    .map(|r| r * 100.0)
                    .collect();

                let task = tokio::task::spawn_blocking(move || model.forecast_variance(&returns));
                let outcome = match tokio::time::timeout(fit_timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(VolatilityError::TaskFailed(join_error.to_string())),
                    Err(_) => Err(VolatilityError::Timeout(timeout_ms)),
                };
                (ticker, outcome)
            }
        });

        join_all(fits)
            .await
            .into_iter()
            .map(|(ticker, outcome)| {
                let weight = match outcome {
                    Ok(variance) => {
                        let weight = self.weight_from_variance(variance);
                        if weight.is_finite() && weight > 0.0 {
                            weight
                        } else {
                            warn!("Discarding non-finite weight for {}", ticker);
                            0.0
                        }
                    }
                    Err(e) => {
                        warn!("Volatility fit failed for {}: {}; weight set to 0", ticker, e);
                        0.0
                    }
                };
                debug!("Raw volatility weight for {}: {:.4}", ticker, weight);
                (ticker, weight)
            })
            .collect()
    }
}
