//! Panel loading from the on-disk OHLCV cache.
//!
//! The cache is a long-format table, one row per (date, ticker), stored as CSV
//! or parquet. It is read with polars and pivoted into a date-indexed [`Panel`].

use crate::config::DataConfig;
use crate::error::ScreenerError;
use crate::market_data::{Field, Panel};
use chrono::NaiveDate;
use log::{debug, info, warn};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Anything that can hand the screener a panel
#[cfg_attr(test, mockall::automock)]
pub trait PanelSource {
    fn load_panel(&self) -> Result<Panel, ScreenerError>;
}

pub const DATE_COLUMN: &str = "Date";
pub const TICKER_COLUMN: &str = "Ticker";

/// Days from 0001-01-01 to the Unix epoch, for polars' Date physical type
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone)]
pub struct PanelStore {
    path: PathBuf,
    max_age_hours: u64,
    allow_stale: bool,
}

impl PanelStore {
    pub fn new(config: &DataConfig) -> Self {
        Self {
            path: PathBuf::from(&config.panel_path),
            max_age_hours: config.max_age_hours,
            allow_stale: config.allow_stale,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_error(&self, reason: impl ToString) -> ScreenerError {
        ScreenerError::DataLoad {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Hours since the cache file was last modified
    pub fn cache_age_hours(&self) -> Result<f64, ScreenerError> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| self.load_error(e))?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        Ok(age.as_secs_f64() / 3600.0)
    }

    fn check_freshness(&self) -> Result<(), ScreenerError> {
        let age_hours = self.cache_age_hours()?;
        if age_hours <= self.max_age_hours as f64 {
            debug!("Panel cache is {:.1}h old", age_hours);
            return Ok(());
        }

        if self.allow_stale {
            warn!(
                "Using stale panel cache {} ({:.1}h old, max {}h)",
                self.path.display(),
                age_hours,
                self.max_age_hours
            );
            Ok(())
        } else {
            Err(ScreenerError::StaleCache {
                path: self.path.display().to_string(),
                age_hours,
                max_age_hours: self.max_age_hours,
            })
        }
    }

    fn read_frame(&self) -> Result<DataFrame, ScreenerError> {
        let is_parquet = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

        if is_parquet {
            let file = File::open(&self.path).map_err(|e| self.load_error(e))?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| self.load_error(e))
        } else {
            LazyCsvReader::new(self.path.as_path())
                .with_has_header(true)
                .with_try_parse_dates(true)
                .finish()
                .and_then(|lazy| lazy.collect())
                .map_err(|e| self.load_error(e))
        }
    }
}

impl PanelSource for PanelStore {
    fn load_panel(&self) -> Result<Panel, ScreenerError> {
        if !self.path.exists() {
            return Err(self.load_error("file does not exist"));
        }
        self.check_freshness()?;

        let frame = self.read_frame()?;
        let panel = panel_from_frame(&frame)?;
        info!(
            "Loaded panel from {}: {} instruments x {} dates ({:?} to {:?})",
            self.path.display(),
            panel.tickers().len(),
            panel.len(),
            panel.first_date(),
            panel.last_date()
        );
        Ok(panel)
    }
}

fn frame_error(e: PolarsError) -> ScreenerError {
    ScreenerError::InvalidPanel(e.to_string())
}

/// Parsed dates; a present but unparseable value fails the whole load
fn date_values(column: &Column) -> Result<Vec<Option<NaiveDate>>, ScreenerError> {
    if matches!(column.dtype(), DataType::String) {
        return column
            .str()
            .map_err(frame_error)?
            .into_iter()
            .map(|v| match v {
                None => Ok(None),
                Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| {
                        ScreenerError::InvalidPanel(format!(
                            "{} contains an unparseable date: {:?}",
                            DATE_COLUMN, raw
                        ))
                    }),
            })
            .collect();
    }

    let days = column
        .cast(&DataType::Date)
        .and_then(|c| c.cast(&DataType::Int32))
        .map_err(frame_error)?;
    if days.null_count() > column.null_count() {
        return Err(ScreenerError::InvalidPanel(format!(
            "{} contains values that are not dates",
            DATE_COLUMN
        )));
    }
    days.i32()
        .map_err(frame_error)?
        .into_iter()
        .map(|d| match d {
            None => Ok(None),
            Some(d) => NaiveDate::from_num_days_from_ce_opt(d + UNIX_EPOCH_DAYS_FROM_CE)
                .map(Some)
                .ok_or_else(|| {
                    ScreenerError::InvalidPanel(format!("{} is out of range: {}", DATE_COLUMN, d))
                }),
        })
        .collect()
}

fn field_values(frame: &DataFrame, field: Field) -> Result<Vec<f64>, ScreenerError> {
    let column = frame
        .column(field.as_str())
        .map_err(|_| ScreenerError::MissingField(field))?;
    let floats = column.cast(&DataType::Float64).map_err(frame_error)?;
    // The cast turns unparseable cells into nulls; empty cells were null already
    if floats.null_count() > column.null_count() {
        return Err(ScreenerError::InvalidPanel(format!(
            "{} contains non-numeric values",
            field
        )));
    }
    let values = floats
        .f64()
        .map_err(frame_error)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Pivot a long-format OHLCV frame into a panel.
///
/// Dates become the union of all rows' dates; a (date, ticker) pair with no
/// row is NaN in every field. Duplicate pairs keep the last row.
pub fn panel_from_frame(frame: &DataFrame) -> Result<Panel, ScreenerError> {
    let dates = date_values(
        frame
            .column(DATE_COLUMN)
            .map_err(|_| ScreenerError::InvalidPanel(format!("missing {} column", DATE_COLUMN)))?,
    )?;
    let ticker_column = frame
        .column(TICKER_COLUMN)
        .map_err(|_| ScreenerError::InvalidPanel(format!("missing {} column", TICKER_COLUMN)))?;
    let tickers: Vec<Option<String>> = ticker_column
        .str()
        .map_err(frame_error)?
        .into_iter()
        .map(|t| t.map(|t| t.to_string()))
        .collect();

    let mut values = BTreeMap::new();
    for field in Field::ALL {
        values.insert(field, field_values(frame, field)?);
    }

    let mut skipped = 0usize;
    let mut date_index = BTreeSet::new();
    let mut ticker_index = BTreeSet::new();
    let mut rows: BTreeMap<(String, NaiveDate), usize> = BTreeMap::new();
    for (row, (date, ticker)) in dates.iter().zip(&tickers).enumerate() {
        match (date, ticker) {
            (Some(date), Some(ticker)) => {
                date_index.insert(*date);
                ticker_index.insert(ticker.clone());
                rows.insert((ticker.clone(), *date), row);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} rows without a date or ticker", skipped);
    }

    let dates: Vec<NaiveDate> = date_index.into_iter().collect();
    let tickers: Vec<String> = ticker_index.into_iter().collect();
    let date_pos: BTreeMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let ticker_pos: BTreeMap<&str, usize> = tickers
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let shape = (tickers.len(), dates.len());
    let mut fields = BTreeMap::new();
    for (field, column) in values {
        let mut matrix = Array2::from_elem(shape, f64::NAN);
        for ((ticker, date), row) in &rows {
            matrix[[ticker_pos[ticker.as_str()], date_pos[date]]] = column[*row];
        }
        fields.insert(field, matrix);
    }

    Panel::new(dates, tickers, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn calendar_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
        (0..count as i64).map(|i| start + Duration::days(i)).collect()
    }

    fn long_frame() -> DataFrame {
        df!(
            "Date" => ["2024-01-02", "2024-01-02", "2024-01-03", "2024-01-01"],
            "Ticker" => ["AKBNK.IS", "THYAO.IS", "AKBNK.IS", "AKBNK.IS"],
            "Open" => [1.0, 10.0, 2.0, 0.5],
            "High" => [1.5, 11.0, 2.5, 0.6],
            "Low" => [0.9, 9.0, 1.9, 0.4],
            "Close" => [1.2, 10.5, 2.2, 0.55],
            "Volume" => [100.0, 1000.0, 200.0, 50.0]
        )
        .unwrap()
    }

    #[test]
    fn test_pivot_fills_missing_cells_with_nan() {
        let panel = panel_from_frame(&long_frame()).unwrap();

        assert_eq!(panel.tickers(), &["AKBNK.IS".to_string(), "THYAO.IS".to_string()]);
        assert_eq!(
            panel.dates(),
            calendar_days(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 3).as_slice()
        );

        let akbnk = panel.history(Field::Close, 0);
        assert_eq!(akbnk, vec![0.55, 1.2, 2.2]);

        let thyao = panel.history(Field::Close, 1);
        assert!(thyao[0].is_nan());
        assert_eq!(thyao[1], 10.5);
        assert!(thyao[2].is_nan());
    }

    #[test]
    fn test_missing_field_column_is_reported() {
        let frame = long_frame().drop("Volume").unwrap();
        let err = panel_from_frame(&frame).unwrap_err();
        assert!(matches!(err, ScreenerError::MissingField(Field::Volume)));
    }

    #[test]
    fn test_non_numeric_cells_are_rejected() {
        let frame = df!(
            "Date" => ["2024-01-02", "2024-01-03"],
            "Ticker" => ["AKBNK.IS", "AKBNK.IS"],
            "Open" => [1.0, 2.0],
            "High" => [1.5, 2.5],
            "Low" => [0.9, 1.9],
            "Close" => ["1.2", "n/a"],
            "Volume" => [100.0, 200.0]
        )
        .unwrap();

        match panel_from_frame(&frame) {
            Err(ScreenerError::InvalidPanel(msg)) => assert!(msg.contains("Close"), "{}", msg),
            other => panic!("expected invalid panel, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_unparseable_date_is_rejected() {
        let frame = df!(
            "Date" => ["2024-01-02", "03/01/2024"],
            "Ticker" => ["AKBNK.IS", "AKBNK.IS"],
            "Open" => [1.0, 2.0],
            "High" => [1.5, 2.5],
            "Low" => [0.9, 1.9],
            "Close" => [1.2, 2.2],
            "Volume" => [100.0, 200.0]
        )
        .unwrap();

        let err = panel_from_frame(&frame).unwrap_err();
        assert!(matches!(err, ScreenerError::InvalidPanel(ref msg) if msg.contains("Date")));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let store = PanelStore::new(&DataConfig {
            panel_path: "/nonexistent/bist_ohlcv.csv".to_string(),
            max_age_hours: 24,
            allow_stale: false,
        });
        let err = store.load_panel().unwrap_err();
        assert!(matches!(err, ScreenerError::DataLoad { .. }));
    }
}
