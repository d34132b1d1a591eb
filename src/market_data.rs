use crate::error::ScreenerError;
use chrono::NaiveDate;
use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Price/volume field of the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Open => "Open",
            Field::High => "High",
            Field::Low => "Low",
            Field::Close => "Close",
            Field::Volume => "Volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily bars of a single instrument, used to assemble a panel column by column
#[derive(Debug, Clone, Default)]
pub struct Bars {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Bars {
    fn field(&self, field: Field) -> &[f64] {
        match field {
            Field::Open => &self.open,
            Field::High => &self.high,
            Field::Low => &self.low,
            Field::Close => &self.close,
            Field::Volume => &self.volume,
        }
    }
}

/// Date-indexed price/volume panel.
///
/// Each field is stored as an `(instruments, dates)` matrix so an instrument's
/// history is one contiguous row. Missing observations are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    open: Array2<f64>,
    high: Array2<f64>,
    low: Array2<f64>,
    close: Array2<f64>,
    volume: Array2<f64>,
}

impl Panel {
    /// Build a panel from per-field matrices, validating shape and index
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        mut fields: BTreeMap<Field, Array2<f64>>,
    ) -> Result<Self, ScreenerError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ScreenerError::InvalidPanel(
                "dates must be strictly ascending".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(ScreenerError::InvalidPanel(format!(
                "duplicate ticker {}",
                dup
            )));
        }

        let expected = (tickers.len(), dates.len());
        let mut take = |field: Field| -> Result<Array2<f64>, ScreenerError> {
            let matrix = fields
                .remove(&field)
                .ok_or(ScreenerError::MissingField(field))?;
            if matrix.dim() != expected {
                return Err(ScreenerError::InvalidPanel(format!(
                    "{} has shape {:?}, expected {:?}",
                    field,
                    matrix.dim(),
                    expected
                )));
            }
            Ok(matrix.as_standard_layout().into_owned())
        };

        Ok(Self {
            open: take(Field::Open)?,
            high: take(Field::High)?,
            low: take(Field::Low)?,
            close: take(Field::Close)?,
            volume: take(Field::Volume)?,
            dates,
            tickers,
        })
    }

    /// Build a panel from per-instrument bars sharing one date index
    pub fn from_bars(
        dates: Vec<NaiveDate>,
        bars: BTreeMap<String, Bars>,
    ) -> Result<Self, ScreenerError> {
        let tickers: Vec<String> = bars.keys().cloned().collect();
        let mut fields = BTreeMap::new();

        for field in Field::ALL {
            let mut values = Vec::with_capacity(tickers.len() * dates.len());
            for (ticker, history) in &bars {
                let column = history.field(field);
                if column.len() != dates.len() {
                    return Err(ScreenerError::InvalidPanel(format!(
                        "{} {} has {} values for {} dates",
                        ticker,
                        field,
                        column.len(),
                        dates.len()
                    )));
                }
                values.extend_from_slice(column);
            }
            let matrix = Array2::from_shape_vec((tickers.len(), dates.len()), values)
                .map_err(|e| ScreenerError::InvalidPanel(e.to_string()))?;
            fields.insert(field, matrix);
        }

        Self::new(dates, tickers, fields)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Number of dates in the panel
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn field(&self, field: Field) -> &Array2<f64> {
        match field {
            Field::Open => &self.open,
            Field::High => &self.high,
            Field::Low => &self.low,
            Field::Close => &self.close,
            Field::Volume => &self.volume,
        }
    }

    /// Keep only the most recent `rows` dates
    pub fn tail(&self, rows: usize) -> Panel {
        let start = self.dates.len().saturating_sub(rows);
        if start == 0 {
            return self.clone();
        }
        let cut = |m: &Array2<f64>| m.slice(s![.., start..]).to_owned();
        Panel {
            dates: self.dates[start..].to_vec(),
            tickers: self.tickers.clone(),
            open: cut(&self.open),
            high: cut(&self.high),
            low: cut(&self.low),
            close: cut(&self.close),
            volume: cut(&self.volume),
        }
    }

    /// Full history of one instrument for one field, oldest first
    pub fn history(&self, field: Field, index: usize) -> Vec<f64> {
        self.field(field).row(index).to_vec()
    }

    /// History of one field for every instrument, keyed by ticker
    pub fn field_histories(&self, field: Field) -> BTreeMap<String, Vec<f64>> {
        self.tickers
            .iter()
            .enumerate()
            .map(|(i, ticker)| (ticker.clone(), self.history(field, i)))
            .collect()
    }

    /// Position of a ticker in the panel
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Most recent value of a field for one instrument (NaN for an empty panel)
    pub fn latest(&self, field: Field, index: usize) -> f64 {
        self.field(field)
            .row(index)
            .last()
            .copied()
            .unwrap_or(f64::NAN)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}
