use bist_screener::config::DataConfig;
use bist_screener::data_store::{PanelSource, PanelStore};
use bist_screener::error::ScreenerError;
use bist_screener::market_data::Field;
use chrono::NaiveDate;
use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

const CSV: &str = "\
Date,Ticker,Open,High,Low,Close,Volume
2024-01-02,AKBNK.IS,30.0,31.0,29.5,30.5,1500000
2024-01-02,THYAO.IS,250.0,255.0,248.0,252.0,900000
2024-01-03,AKBNK.IS,30.5,32.0,30.0,31.8,2100000
2024-01-03,THYAO.IS,252.0,256.0,250.0,,950000
2024-01-04,AKBNK.IS,31.8,32.5,31.0,32.1,1800000
";

fn write_cache(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bist_screener_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bist_ohlcv.csv");
    fs::write(&path, CSV).unwrap();
    path
}

fn store_for(path: &PathBuf, max_age_hours: u64, allow_stale: bool) -> PanelStore {
    PanelStore::new(&DataConfig {
        panel_path: path.display().to_string(),
        max_age_hours,
        allow_stale,
    })
}

fn age_file(path: &PathBuf, hours: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(hours * 3600))
        .unwrap();
}

#[test]
fn test_csv_cache_is_pivoted_into_panel() {
    let path = write_cache("pivot");
    let panel = store_for(&path, 24, false).load_panel().unwrap();

    assert_eq!(panel.tickers(), &["AKBNK.IS".to_string(), "THYAO.IS".to_string()]);
    assert_eq!(panel.len(), 3);
    assert_eq!(panel.first_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
    assert_eq!(panel.last_date(), NaiveDate::from_ymd_opt(2024, 1, 4));

    let akbnk = panel.history(Field::Close, 0);
    assert_eq!(akbnk, vec![30.5, 31.8, 32.1]);
    assert_eq!(panel.latest(Field::Volume, 0), 1_800_000.0);

    // Empty cell and absent row both read as missing
    let thyao = panel.history(Field::Close, 1);
    assert_eq!(thyao[0], 252.0);
    assert!(thyao[1].is_nan());
    assert!(thyao[2].is_nan());

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_stale_cache_is_rejected() {
    let path = write_cache("stale");
    age_file(&path, 48);

    match store_for(&path, 24, false).load_panel() {
        Err(ScreenerError::StaleCache { age_hours, max_age_hours, .. }) => {
            assert!(age_hours >= 47.9);
            assert_eq!(max_age_hours, 24);
        }
        other => panic!("expected stale cache error, got {:?}", other.map(|p| p.len())),
    }

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_stale_cache_allowed_when_configured() {
    let path = write_cache("allow_stale");
    age_file(&path, 48);

    let panel = store_for(&path, 24, true).load_panel().unwrap();
    assert_eq!(panel.tickers().len(), 2);

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_missing_column_is_reported() {
    let dir = std::env::temp_dir().join(format!("bist_screener_nocol_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bist_ohlcv.csv");
    fs::write(&path, "Date,Ticker,Open,High,Low,Close\n2024-01-02,AKBNK.IS,1,1,1,1\n").unwrap();

    let err = store_for(&path, 24, false).load_panel().unwrap_err();
    assert!(matches!(err, ScreenerError::MissingField(Field::Volume)));

    fs::remove_dir_all(&dir).ok();
}

fn write_raw(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bist_screener_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bist_ohlcv.csv");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_non_numeric_close_fails_load() {
    let path = write_raw(
        "bad_close",
        "Date,Ticker,Open,High,Low,Close,Volume\n\
         2024-01-02,AKBNK.IS,30.0,31.0,29.5,abc,1500000\n\
         2024-01-03,AKBNK.IS,30.5,32.0,30.0,oops,2100000\n",
    );

    match store_for(&path, 24, false).load_panel() {
        Err(ScreenerError::InvalidPanel(msg)) => assert!(msg.contains("Close"), "{}", msg),
        other => panic!("expected invalid panel, got {:?}", other.map(|p| p.len())),
    }

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_mixed_numeric_volume_fails_load() {
    let path = write_raw(
        "bad_volume",
        "Date,Ticker,Open,High,Low,Close,Volume\n\
         2024-01-02,AKBNK.IS,30.0,31.0,29.5,30.5,1500000\n\
         2024-01-03,AKBNK.IS,30.5,32.0,30.0,31.8,lots\n",
    );

    match store_for(&path, 24, false).load_panel() {
        Err(ScreenerError::InvalidPanel(msg)) => assert!(msg.contains("Volume"), "{}", msg),
        other => panic!("expected invalid panel, got {:?}", other.map(|p| p.len())),
    }

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_unparseable_date_fails_load() {
    let path = write_raw(
        "bad_date",
        "Date,Ticker,Open,High,Low,Close,Volume\n\
         2024-01-02,AKBNK.IS,30.0,31.0,29.5,30.5,1500000\n\
         someday,AKBNK.IS,30.5,32.0,30.0,31.8,2100000\n",
    );

    match store_for(&path, 24, false).load_panel() {
        Err(ScreenerError::InvalidPanel(msg)) => assert!(msg.contains("Date"), "{}", msg),
        other => panic!("expected invalid panel, got {:?}", other.map(|p| p.len())),
    }

    fs::remove_dir_all(path.parent().unwrap()).ok();
}
