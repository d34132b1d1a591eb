use bist_screener::config::ScreenerConfig;
use bist_screener::data_store::{PanelSource, PanelStore};
use bist_screener::market_data::Field;
use std::env;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_file = args.get(1).map(String::as_str).unwrap_or("config.json");
    let config = ScreenerConfig::load_from_file(config_file)?;

    let store = PanelStore::new(&config.data);
    println!("Panel cache: {}", store.path().display());
    match store.cache_age_hours() {
        Ok(age) => println!("Cache age: {:.1}h (max {}h)", age, config.data.max_age_hours),
        Err(e) => println!("Cache age: unavailable - {}", e),
    }

    let panel = store.load_panel()?;
    println!(
        "{} instruments x {} dates, {:?} to {:?}",
        panel.tickers().len(),
        panel.len(),
        panel.first_date(),
        panel.last_date()
    );

    for (i, ticker) in panel.tickers().iter().enumerate() {
        let missing = panel
            .history(Field::Close, i)
            .iter()
            .filter(|v| v.is_nan())
            .count();
        println!(
            "{}: last close={:.2}, missing closes={}",
            ticker,
            panel.latest(Field::Close, i),
            missing
        );
    }

    Ok(())
}
