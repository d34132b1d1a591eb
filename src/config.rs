use crate::error::ScreenerError;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenerConfig {
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub technical: TechnicalConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Universe filter thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_sharpe_min")]
    pub sharpe_min: f64,
    #[serde(default = "default_sortino_min")]
    pub sortino_min: f64,
    #[serde(default = "default_atr_pct_min")]
    pub atr_pct_min: f64,
    #[serde(default = "default_atr_pct_max")]
    pub atr_pct_max: f64,
    #[serde(default = "default_fallback_top_n")]
    pub fallback_top_n: usize,
    #[serde(default = "default_lookback_rows")]
    pub lookback_rows: usize,
}

/// Technical confirmation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalConfig {
    #[serde(default = "default_rsi_length")]
    pub rsi_length: usize,
    #[serde(default = "default_rsi_lower")]
    pub rsi_lower: f64,
    #[serde(default = "default_rsi_upper")]
    pub rsi_upper: f64,
    #[serde(default = "default_atr_length")]
    pub atr_length: usize,
    #[serde(default = "default_momentum_periods")]
    pub momentum_periods: usize,
    #[serde(default = "default_volume_ma_window")]
    pub volume_ma_window: usize,
    #[serde(default = "default_volume_ratio")]
    pub volume_ratio: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bollinger_window")]
    pub bollinger_window: usize,
    #[serde(default = "default_bollinger_k")]
    pub bollinger_k: f64,
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,
    #[serde(default = "default_volume_floor")]
    pub volume_floor: f64,
}

/// GARCH fit and volatility targeting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    #[serde(default = "default_target_annual_vol")]
    pub target_annual_vol: f64,
    #[serde(default = "default_annualization_factor")]
    pub annualization_factor: f64,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_fit_timeout_ms")]
    pub fit_timeout_ms: u64,
}

/// Location and freshness of the OHLCV cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_panel_path")]
    pub panel_path: String,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    #[serde(default)]
    pub allow_stale: bool,
}

/// Daily scan runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
    #[serde(default = "default_enforce_market_hours")]
    pub enforce_market_hours: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sharpe_min: default_sharpe_min(),
            sortino_min: default_sortino_min(),
            atr_pct_min: default_atr_pct_min(),
            atr_pct_max: default_atr_pct_max(),
            fallback_top_n: default_fallback_top_n(),
            lookback_rows: default_lookback_rows(),
        }
    }
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            rsi_length: default_rsi_length(),
            rsi_lower: default_rsi_lower(),
            rsi_upper: default_rsi_upper(),
            atr_length: default_atr_length(),
            momentum_periods: default_momentum_periods(),
            volume_ma_window: default_volume_ma_window(),
            volume_ratio: default_volume_ratio(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bollinger_window: default_bollinger_window(),
            bollinger_k: default_bollinger_k(),
            price_floor: default_price_floor(),
            volume_floor: default_volume_floor(),
        }
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            target_annual_vol: default_target_annual_vol(),
            annualization_factor: default_annualization_factor(),
            min_observations: default_min_observations(),
            max_iterations: default_max_iterations(),
            fit_timeout_ms: default_fit_timeout_ms(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            panel_path: default_panel_path(),
            max_age_hours: default_max_age_hours(),
            allow_stale: false,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            utc_offset_hours: default_utc_offset_hours(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            enforce_market_hours: default_enforce_market_hours(),
        }
    }
}

fn default_sharpe_min() -> f64 {
    0.3
}
fn default_sortino_min() -> f64 {
    0.8
}
fn default_atr_pct_min() -> f64 {
    0.001 // 0.1% of price
}
fn default_atr_pct_max() -> f64 {
    0.10 // 10% of price
}
fn default_fallback_top_n() -> usize {
    10
}
fn default_lookback_rows() -> usize {
    500 // ~2 years of trading days
}

fn default_rsi_length() -> usize {
    14
}
fn default_rsi_lower() -> f64 {
    30.0
}
fn default_rsi_upper() -> f64 {
    90.0
}
fn default_atr_length() -> usize {
    14
}
fn default_momentum_periods() -> usize {
    63 // ~3 months of trading days
}
fn default_volume_ma_window() -> usize {
    20
}
fn default_volume_ratio() -> f64 {
    0.8
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_bollinger_window() -> usize {
    20
}
fn default_bollinger_k() -> f64 {
    2.0
}
fn default_price_floor() -> f64 {
    1.0
}
fn default_volume_floor() -> f64 {
    1_000_000.0
}

fn default_target_annual_vol() -> f64 {
    0.15 // 15% annualized target volatility
}
fn default_annualization_factor() -> f64 {
    252.0
}
fn default_min_observations() -> usize {
    30
}
fn default_max_iterations() -> usize {
    2000
}
fn default_fit_timeout_ms() -> u64 {
    5000
}

fn default_panel_path() -> String {
    "data/bist_ohlcv.parquet".to_string()
}
fn default_max_age_hours() -> u64 {
    24
}

fn default_output_dir() -> String {
    "data/daily_scans".to_string()
}
fn default_utc_offset_hours() -> i32 {
    3 // Europe/Istanbul, no DST
}
fn default_open_hour() -> u32 {
    10
}
fn default_close_hour() -> u32 {
    18
}
fn default_enforce_market_hours() -> bool {
    true
}

impl ScreenerConfig {
    /// Load configuration from a JSON file, using defaults when the file is absent
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config = if Path::new(path).exists() {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            serde_json::from_str::<ScreenerConfig>(&config_str)
                .with_context(|| format!("Failed to parse config file {}", path))?
        } else {
            warn!("Config file {} not found, using defaults", path);
            Self::default()
        };

        config.validate()?;
        info!(
            "Screener thresholds: sharpe>={}, sortino>={}, atr%=[{}, {}], lookback={} rows",
            config.filters.sharpe_min,
            config.filters.sortino_min,
            config.filters.atr_pct_min,
            config.filters.atr_pct_max,
            config.filters.lookback_rows
        );
        Ok(config)
    }

    /// Reject windows and ranges that would make the pipeline meaningless
    pub fn validate(&self) -> Result<(), ScreenerError> {
        let f = &self.filters;
        let t = &self.technical;
        let v = &self.volatility;

        if f.atr_pct_min > f.atr_pct_max {
            return Err(ScreenerError::InvalidConfig(format!(
                "atr_pct_min {} exceeds atr_pct_max {}",
                f.atr_pct_min, f.atr_pct_max
            )));
        }
        if t.rsi_lower >= t.rsi_upper {
            return Err(ScreenerError::InvalidConfig(format!(
                "rsi_lower {} must be below rsi_upper {}",
                t.rsi_lower, t.rsi_upper
            )));
        }
        if t.macd_fast >= t.macd_slow {
            return Err(ScreenerError::InvalidConfig(format!(
                "macd_fast {} must be shorter than macd_slow {}",
                t.macd_fast, t.macd_slow
            )));
        }

        let windows = [
            ("lookback_rows", f.lookback_rows),
            ("fallback_top_n", f.fallback_top_n),
            ("rsi_length", t.rsi_length),
            ("atr_length", t.atr_length),
            ("momentum_periods", t.momentum_periods),
            ("volume_ma_window", t.volume_ma_window),
            ("macd_signal", t.macd_signal),
            ("bollinger_window", t.bollinger_window),
            ("max_iterations", v.max_iterations),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, value)| *value == 0) {
            return Err(ScreenerError::InvalidConfig(format!(
                "{} must be positive",
                name
            )));
        }

        if !(v.target_annual_vol > 0.0) || !(v.annualization_factor > 0.0) {
            return Err(ScreenerError::InvalidConfig(
                "target_annual_vol and annualization_factor must be positive".to_string(),
            ));
        }
        if self.scan.open_hour >= self.scan.close_hour || self.scan.close_hour > 24 {
            return Err(ScreenerError::InvalidConfig(format!(
                "market hours {}-{} are not a valid session",
                self.scan.open_hour, self.scan.close_hour
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_screening_thresholds() {
        let config = ScreenerConfig::default();
        assert_eq!(config.filters.sharpe_min, 0.3);
        assert_eq!(config.filters.sortino_min, 0.8);
        assert_eq!(config.filters.fallback_top_n, 10);
        assert_eq!(config.filters.lookback_rows, 500);
        assert_eq!(config.technical.volume_floor, 1_000_000.0);
        assert_eq!(config.volatility.target_annual_vol, 0.15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "filters": { "sharpe_min": 0.5 },
            "scan": { "enforce_market_hours": false }
        }"#;
        let config: ScreenerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.filters.sharpe_min, 0.5);
        assert_eq!(config.filters.sortino_min, 0.8);
        assert_eq!(config.technical.rsi_upper, 90.0);
        assert!(!config.scan.enforce_market_hours);
        assert_eq!(config.scan.open_hour, 10);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ScreenerConfig::load_from_file("does/not/exist.json").unwrap();
        assert_eq!(config.filters.atr_pct_max, 0.10);
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let mut config = ScreenerConfig::default();
        config.filters.atr_pct_min = 0.2;
        assert!(config.validate().is_err());

        let mut config = ScreenerConfig::default();
        config.technical.bollinger_window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bollinger_window"));
    }

    #[test]
    fn test_validate_rejects_empty_fallback() {
        let mut config = ScreenerConfig::default();
        config.filters.fallback_top_n = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_top_n"));
    }
}
