pub mod bollinger;
pub mod config;
pub mod data_store;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod momentum;
pub mod pipeline;
pub mod report;
pub mod signals;
pub mod stats;
pub mod volatility;

pub use config::ScreenerConfig;
pub use error::ScreenerError;
pub use market_data::{Bars, Field, Panel};
pub use pipeline::{CandidateRow, CandidateTable, ScreenOutcome, Screener};
