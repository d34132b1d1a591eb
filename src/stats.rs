use crate::indicators::pct_change;
use crate::market_data::{Field, Panel};
use log::info;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualized risk-adjusted return figures of one instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReturnStats {
    pub sharpe: f64,
    pub sortino: f64,
}

/// Simple daily returns of a price history; the first value is NaN
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    pct_change(prices, 1)
}

fn observed(returns: &[f64]) -> Vec<f64> {
    returns.iter().copied().filter(|r| !r.is_nan()).collect()
}

/// Calculate the Sharpe ratio for a series of returns (zero risk-free rate).
///
/// Missing returns are skipped. A zero or undefined standard deviation gives a
/// non-finite ratio, which threshold comparisons exclude.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let valid = observed(returns);
    let mean_return = (&valid).mean();
    let std_dev = (&valid).std_dev();

    mean_return / std_dev * periods_per_year.sqrt()
}

/// Calculate the Sortino ratio using the sample std of strictly negative returns
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let valid = observed(returns);
    let mean_return = (&valid).mean();

    let negative_returns: Vec<f64> = valid.iter().copied().filter(|&r| r < 0.0).collect();
    let downside_dev = (&negative_returns).std_dev();

    mean_return / downside_dev * periods_per_year.sqrt()
}

pub fn return_stats(prices: &[f64]) -> ReturnStats {
    let returns = daily_returns(prices);
    ReturnStats {
        sharpe: sharpe_ratio(&returns, TRADING_DAYS_PER_YEAR),
        sortino: sortino_ratio(&returns, TRADING_DAYS_PER_YEAR),
    }
}

/// Sharpe/Sortino for every instrument of the panel over its full history
pub fn compute_return_stats(panel: &Panel) -> BTreeMap<String, ReturnStats> {
    let stats: BTreeMap<String, ReturnStats> = panel
        .field_histories(Field::Close)
        .into_iter()
        .map(|(ticker, closes)| (ticker, return_stats(&closes)))
        .collect();

    let sharpe = Distribution::of(stats.values().map(|s| s.sharpe));
    let sortino = Distribution::of(stats.values().map(|s| s.sortino));
    info!("Sharpe distribution: {}", sharpe);
    info!("Sortino distribution: {}", sortino);

    stats
}

/// Summary of the finite values of a cross-sectional metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Distribution {
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        Self {
            count: finite.len(),
            mean: (&finite).mean(),
            min: (&finite).min(),
            max: (&finite).max(),
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "count={} mean={:.4} min={:.4} max={:.4}",
            self.count, self.mean, self.min, self.max
        )
    }
}
