//! Technical confirmation filter
//!
//! Reduces each instrument's history to the latest-row readings the screen
//! needs, then confirms an instrument only if every condition holds.

use crate::bollinger::BollingerCalculator;
use crate::config::TechnicalConfig;
use crate::indicators::{last, macd, rolling_mean, rsi};
use crate::market_data::{Field, Panel};
use crate::momentum::MomentumCalculator;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

/// Latest-row indicator readings of one instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TechnicalSnapshot {
    pub momentum: f64,
    pub rsi: f64,
    pub volume: f64,
    pub volume_ma: f64,
    pub macd: f64,
    pub close: f64,
    pub bollinger_upper: f64,
}

impl TechnicalSnapshot {
    /// All conditions must hold; a NaN operand fails its comparison
    pub fn confirms(&self, config: &TechnicalConfig) -> bool {
        self.momentum > 0.0
            && self.rsi > config.rsi_lower
            && self.rsi < config.rsi_upper
            && self.volume > config.volume_ratio * self.volume_ma
            && self.macd > 0.0
            && self.close > self.bollinger_upper
            && self.close >= config.price_floor
            && self.volume >= config.volume_floor
    }
}

#[derive(Debug, Clone)]
pub struct TechnicalFilter {
    config: TechnicalConfig,
    bollinger: BollingerCalculator,
    momentum: MomentumCalculator,
}

impl TechnicalFilter {
    pub fn new(config: TechnicalConfig) -> Self {
        let bollinger =
            BollingerCalculator::with_settings(config.bollinger_window, config.bollinger_k);
        let momentum = MomentumCalculator::new(config.momentum_periods);
        Self {
            config,
            bollinger,
            momentum,
        }
    }

    pub fn config(&self) -> &TechnicalConfig {
        &self.config
    }

    /// Reduce one instrument's close and volume histories to latest readings
    pub fn snapshot(&self, closes: &[f64], volumes: &[f64]) -> TechnicalSnapshot {
        let c = &self.config;
        let bands = self.bollinger.calculate_bollinger_bands(closes);

        TechnicalSnapshot {
            momentum: self.momentum.latest(closes),
            rsi: last(&rsi(closes, c.rsi_length)),
            volume: last(volumes),
            volume_ma: last(&rolling_mean(volumes, c.volume_ma_window)),
            macd: macd(closes, c.macd_fast, c.macd_slow, c.macd_signal).latest(),
            close: last(closes),
            bollinger_upper: bands.latest_upper(),
        }
    }

    pub fn compute_snapshots(&self, panel: &Panel) -> BTreeMap<String, TechnicalSnapshot> {
        panel
            .tickers()
            .iter()
            .enumerate()
            .map(|(i, ticker)| {
                let closes = panel.history(Field::Close, i);
                let volumes = panel.history(Field::Volume, i);
                (ticker.clone(), self.snapshot(&closes, &volumes))
            })
            .collect()
    }

    /// Confirmation mask on the latest date of the panel
    pub fn compute_mask(&self, panel: &Panel) -> BTreeMap<String, bool> {
        let mask: BTreeMap<String, bool> = self
            .compute_snapshots(panel)
            .into_iter()
            .map(|(ticker, snapshot)| {
                let confirmed = snapshot.confirms(&self.config);
                debug!("Technical snapshot for {}: {:?} -> {}", ticker, snapshot, confirmed);
                (ticker, confirmed)
            })
            .collect();

        info!(
            "Technical signals computed: {}/{} instruments confirmed",
            mask.values().filter(|&&ok| ok).count(),
            mask.len()
        );
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_snapshot() -> TechnicalSnapshot {
        TechnicalSnapshot {
            momentum: 0.12,
            rsi: 50.0,
            volume: 2_000_000.0,
            volume_ma: 1_000_000.0,
            macd: 0.3,
            close: 10.0,
            bollinger_upper: 9.5,
        }
    }

    #[test]
    fn test_all_conditions_pass() {
        assert!(passing_snapshot().confirms(&TechnicalConfig::default()));
    }

    #[test]
    fn test_each_condition_can_veto() {
        let config = TechnicalConfig::default();
        let vetoes: [fn(&mut TechnicalSnapshot); 8] = [
            |s| s.momentum = -0.01,
            |s| s.rsi = 95.0,
            |s| s.rsi = 30.0,
            |s| s.volume_ma = 3_000_000.0,
            |s| s.macd = 0.0,
            |s| s.bollinger_upper = 10.0,
            |s| {
                s.close = 0.9;
                s.bollinger_upper = 0.8;
            },
            |s| {
                s.volume = 900_000.0;
                s.volume_ma = 500_000.0;
            },
        ];

        for (i, veto) in vetoes.iter().enumerate() {
            let mut snapshot = passing_snapshot();
            veto(&mut snapshot);
            assert!(!snapshot.confirms(&config), "veto {} should reject", i);
        }
    }

    #[test]
    fn test_nan_operand_rejects() {
        let config = TechnicalConfig::default();
        let mut snapshot = passing_snapshot();
        snapshot.momentum = f64::NAN;
        assert!(!snapshot.confirms(&config));

        let mut snapshot = passing_snapshot();
        snapshot.bollinger_upper = f64::NAN;
        assert!(!snapshot.confirms(&config));
    }

    #[test]
    fn test_short_history_snapshot_rejects() {
        let filter = TechnicalFilter::new(TechnicalConfig::default());
        let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64 * 0.1).collect();
        let volumes = vec![2_000_000.0; 30];

        let snapshot = filter.snapshot(&closes, &volumes);
        assert!(snapshot.momentum.is_nan());
        assert!(!snapshot.confirms(filter.config()));
    }
}
