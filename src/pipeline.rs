//! Screening pipeline
//!
//! Turns a raw price/volume panel into the weighted candidate table:
//! return-quality and ATR filters, a Sharpe fallback when both filters leave
//! nothing, technical confirmation, then inverse-volatility weights.

use crate::config::ScreenerConfig;
use crate::data_store::PanelSource;
use crate::error::ScreenerError;
use crate::indicators::{atr, last};
use crate::market_data::{Field, Panel};
use crate::signals::technical::TechnicalFilter;
use crate::stats::{compute_return_stats, Distribution, ReturnStats};
use crate::volatility::{VolatilityModel, VolatilityTargeter};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One row of the final candidate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Sharpe")]
    pub sharpe: f64,
    #[serde(rename = "Sortino")]
    pub sortino: f64,
    #[serde(rename = "ATR%")]
    pub atr_pct: f64,
    #[serde(rename = "Weight")]
    pub weight: f64,
}

/// Final candidate table, ordered by ticker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateTable {
    rows: Vec<CandidateRow>,
}

impl CandidateTable {
    pub const COLUMNS: [&'static str; 5] = ["Ticker", "Sharpe", "Sortino", "ATR%", "Weight"];

    pub fn empty() -> Self {
        Self::default()
    }

    fn from_rows(mut rows: Vec<CandidateRow>) -> Self {
        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Self { rows }
    }

    pub fn rows(&self) -> &[CandidateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.ticker.as_str()).collect()
    }

    pub fn get(&self, ticker: &str) -> Option<&CandidateRow> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }

    pub fn weight_sum(&self) -> f64 {
        self.rows.iter().map(|r| r.weight).sum()
    }

    /// Rows with the highest Sharpe first
    pub fn top_by_sharpe(&self, n: usize) -> Vec<&CandidateRow> {
        let mut rows: Vec<&CandidateRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.sharpe.total_cmp(&a.sharpe));
        rows.truncate(n);
        rows
    }
}

/// How the candidate universe was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSelection {
    /// Instruments passing both the return-quality and ATR filters
    Filtered(BTreeSet<String>),
    /// Top instruments by Sharpe, used when the filters leave nothing
    Fallback(BTreeSet<String>),
}

impl UniverseSelection {
    pub fn tickers(&self) -> &BTreeSet<String> {
        match self {
            UniverseSelection::Filtered(t) | UniverseSelection::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, UniverseSelection::Fallback(_))
    }
}

/// Result of a screening run
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenOutcome {
    /// Candidates drawn from the filtered universe
    Filtered(CandidateTable),
    /// Candidates drawn from the top-Sharpe fallback universe
    Fallback(CandidateTable),
    /// Nothing passed technical confirmation
    Empty { fallback: bool },
}

impl ScreenOutcome {
    /// The candidate table; empty (with the fixed schema) for `Empty`
    pub fn table(&self) -> CandidateTable {
        match self {
            ScreenOutcome::Filtered(t) | ScreenOutcome::Fallback(t) => t.clone(),
            ScreenOutcome::Empty { .. } => CandidateTable::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ScreenOutcome::Empty { .. })
    }

    pub fn used_fallback(&self) -> bool {
        matches!(
            self,
            ScreenOutcome::Fallback(_) | ScreenOutcome::Empty { fallback: true }
        )
    }
}

/// Latest ATR as a fraction of the latest close, per instrument
pub fn latest_atr_pct(panel: &Panel, length: usize) -> BTreeMap<String, f64> {
    panel
        .tickers()
        .iter()
        .enumerate()
        .map(|(i, ticker)| {
            let high = panel.history(Field::High, i);
            let low = panel.history(Field::Low, i);
            let close = panel.history(Field::Close, i);
            let atr_pct = last(&atr(&high, &low, &close, length)) / last(&close);
            (ticker.clone(), atr_pct)
        })
        .collect()
}

/// Divide each weight by the total; an all-zero set cannot be normalized
pub fn normalize_weights(
    raw: BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, ScreenerError> {
    let total: f64 = raw.values().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(ScreenerError::DegenerateWeights {
            tickers: raw.into_keys().collect(),
        });
    }

    Ok(raw
        .into_iter()
        .map(|(ticker, weight)| (ticker, weight / total))
        .collect())
}

pub struct Screener {
    config: ScreenerConfig,
    technical: TechnicalFilter,
    targeter: VolatilityTargeter,
}

impl Screener {
    pub fn new(config: ScreenerConfig) -> Result<Self, ScreenerError> {
        config.validate()?;
        let targeter = VolatilityTargeter::new(&config.volatility);
        Ok(Self::assemble(config, targeter))
    }

    /// Screener with a custom volatility model
    pub fn with_model(
        config: ScreenerConfig,
        model: Arc<dyn VolatilityModel>,
    ) -> Result<Self, ScreenerError> {
        config.validate()?;
        let targeter = VolatilityTargeter::with_model(&config.volatility, model);
        Ok(Self::assemble(config, targeter))
    }

    fn assemble(config: ScreenerConfig, targeter: VolatilityTargeter) -> Self {
        let technical = TechnicalFilter::new(config.technical.clone());
        Self {
            config,
            technical,
            targeter,
        }
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    /// Load the panel from `source` and screen it
    pub async fn run(&self, source: &dyn PanelSource) -> Result<ScreenOutcome, ScreenerError> {
        let panel = source.load_panel()?;
        self.screen(&panel).await
    }

    /// Screen a panel, truncated to the configured lookback window
    pub async fn screen(&self, panel: &Panel) -> Result<ScreenOutcome, ScreenerError> {
        let panel = panel.tail(self.config.filters.lookback_rows);
        info!(
            "Screening {} instruments over {} rows ({:?} to {:?})",
            panel.tickers().len(),
            panel.len(),
            panel.first_date(),
            panel.last_date()
        );

        let stats = compute_return_stats(&panel);
        let atr_pct = latest_atr_pct(&panel, self.config.technical.atr_length);
        info!("ATR% distribution: {}", Distribution::of(atr_pct.values().copied()));

        let selection = self.select_universe(&stats, &atr_pct);
        let mask = self.technical.compute_mask(&panel);

        // BTreeSet iteration keeps the final set sorted by ticker
        let finalists: Vec<String> = selection
            .tickers()
            .iter()
            .filter(|t| mask.get(*t).copied().unwrap_or(false))
            .cloned()
            .collect();

        if finalists.is_empty() {
            info!("No instrument passed technical confirmation");
            return Ok(ScreenOutcome::Empty {
                fallback: selection.is_fallback(),
            });
        }
        info!("Final candidates: {:?}", finalists);

        let closes: BTreeMap<String, Vec<f64>> = finalists
            .iter()
            .filter_map(|t| {
                panel
                    .index_of(t)
                    .map(|i| (t.clone(), panel.history(Field::Close, i)))
            })
            .collect();
        let raw_weights = self.targeter.compute_weights(closes).await;
        let weights = normalize_weights(raw_weights)?;

        let rows = finalists
            .iter()
            .map(|ticker| {
                let s = stats[ticker];
                CandidateRow {
                    ticker: ticker.clone(),
                    sharpe: s.sharpe,
                    sortino: s.sortino,
                    atr_pct: atr_pct[ticker],
                    weight: weights.get(ticker).copied().unwrap_or(0.0),
                }
            })
            .collect();
        let table = CandidateTable::from_rows(rows);

        Ok(if selection.is_fallback() {
            ScreenOutcome::Fallback(table)
        } else {
            ScreenOutcome::Filtered(table)
        })
    }

    /// Intersect the return-quality and ATR filters, falling back to the top
    /// instruments by Sharpe when the intersection is empty.
    ///
    /// The fallback ranks on Sharpe alone and ignores the Sortino and ATR
    /// thresholds.
    pub fn select_universe(
        &self,
        stats: &BTreeMap<String, ReturnStats>,
        atr_pct: &BTreeMap<String, f64>,
    ) -> UniverseSelection {
        let f = &self.config.filters;

        let quality: BTreeSet<&String> = stats
            .iter()
            .filter(|(_, s)| {
                s.sharpe.is_finite()
                    && s.sortino.is_finite()
                    && s.sharpe >= f.sharpe_min
                    && s.sortino >= f.sortino_min
            })
            .map(|(t, _)| t)
            .collect();
        let calm: BTreeSet<&String> = atr_pct
            .iter()
            .filter(|(_, a)| **a >= f.atr_pct_min && **a <= f.atr_pct_max)
            .map(|(t, _)| t)
            .collect();
        info!(
            "Return-quality filter kept {}, ATR filter kept {}",
            quality.len(),
            calm.len()
        );

        let universe: BTreeSet<String> = quality
            .intersection(&calm)
            .map(|t| (*t).clone())
            .collect();
        if !universe.is_empty() {
            return UniverseSelection::Filtered(universe);
        }

        let mut ranked: Vec<(&String, f64)> = stats
            .iter()
            .filter(|(_, s)| !s.sharpe.is_nan())
            .map(|(t, s)| (t, s.sharpe))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let fallback: BTreeSet<String> = ranked
            .into_iter()
            .take(f.fallback_top_n)
            .map(|(t, _)| t.clone())
            .collect();
        warn!(
            "Filters left no instruments; falling back to top {} by Sharpe: {:?}",
            f.fallback_top_n, fallback
        );
        UniverseSelection::Fallback(fallback)
    }
}
