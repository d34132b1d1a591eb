//! Screener error types.

use crate::market_data::Field;
use thiserror::Error;

/// Errors surfaced by the screening pipeline and its panel loaders.
#[derive(Debug, Error)]
pub enum ScreenerError {
    /// A required OHLCV field is absent from the panel
    #[error("panel is missing required field: {0}")]
    MissingField(Field),

    /// Panel shape or index is inconsistent
    #[error("invalid panel: {0}")]
    InvalidPanel(String),

    /// The panel source could not be read or parsed
    #[error("failed to load panel from {path}: {reason}")]
    DataLoad { path: String, reason: String },

    /// The on-disk cache is older than the configured maximum age
    #[error("panel cache {path} is {age_hours:.1}h old (max {max_age_hours}h)")]
    StaleCache {
        path: String,
        age_hours: f64,
        max_age_hours: u64,
    },

    /// Configuration values are out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every candidate got a zero weight, so weights cannot be normalized
    #[error("no sizeable positions: all volatility weights are zero for {tickers:?}")]
    DegenerateWeights { tickers: Vec<String> },
}
