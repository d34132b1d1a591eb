//! Daily scan persistence and the market-hours gate.

use crate::config::ScanConfig;
use crate::pipeline::{CandidateRow, CandidateTable};
use anyhow::{Context, Result};
use chrono::{Datelike, DateTime, FixedOffset, NaiveDate, Timelike, Utc, Weekday};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk record of one day's scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScan {
    pub date: NaiveDate,
    pub stocks: Vec<CandidateRow>,
}

pub fn scan_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.json", date.format("%Y-%m-%d")))
}

/// Write `{date, stocks}` to `<dir>/<YYYY-MM-DD>.json`, replacing any scan
/// already saved for that date
pub fn save_daily_results(table: &CandidateTable, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create scan directory {}", dir.display()))?;

    let scan = DailyScan {
        date,
        stocks: table.rows().to_vec(),
    };
    let path = scan_path(dir, date);
    let content = serde_json::to_string_pretty(&scan)?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write scan results to {}", path.display()))?;

    info!("Saved {} candidates to {}", scan.stocks.len(), path.display());
    Ok(path)
}

/// Read a previously saved scan; `None` if nothing was saved for that date
pub fn load_daily_results(dir: &Path, date: NaiveDate) -> Result<Option<DailyScan>> {
    let path = scan_path(dir, date);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let scan = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(scan))
}

/// Dates with a saved scan, most recent first
pub fn available_scan_dates(dir: &Path) -> Result<Vec<NaiveDate>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut dates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".json") {
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                dates.push(date);
            }
        }
    }
    dates.sort_unstable_by(|a, b| b.cmp(a));
    Ok(dates)
}

/// Console summary: candidate count and the top rows by Sharpe
pub fn summarize(table: &CandidateTable, top: usize) -> String {
    let mut lines = vec![
        "Daily scan summary".to_string(),
        format!("Total candidates: {}", table.len()),
        "Highest Sharpe:".to_string(),
        format!("{:<12} {:>8} {:>8}", "Ticker", "Sharpe", "Weight"),
    ];
    for row in table.top_by_sharpe(top) {
        lines.push(format!(
            "{:<12} {:>8.3} {:>8.4}",
            row.ticker, row.sharpe, row.weight
        ));
    }
    lines.join("\n")
}

/// Exchange-local time for a UTC instant
pub fn exchange_time(now: DateTime<Utc>, config: &ScanConfig) -> Option<DateTime<FixedOffset>> {
    FixedOffset::east_opt(config.utc_offset_hours * 3600).map(|offset| now.with_timezone(&offset))
}

/// Weekdays between the open and close hour, both ends inclusive at :00
pub fn is_market_open(now: DateTime<Utc>, config: &ScanConfig) -> bool {
    let Some(local) = exchange_time(now, config) else {
        return false;
    };
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minutes = local.hour() * 60 + local.minute();
    let at_close = local.hour() == config.close_hour
        && local.minute() == 0
        && local.second() == 0
        && local.nanosecond() == 0;
    minutes >= config.open_hour * 60 && (local.hour() < config.close_hour || at_close)
}
