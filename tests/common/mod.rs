#![allow(dead_code)]

use bist_screener::market_data::{Bars, Panel};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

pub const DAYS: usize = 260;

/// Deterministic generator so scenario outcomes are reproducible
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Approximately standard normal (Irwin-Hall with 12 terms)
    pub fn normal(&mut self) -> f64 {
        (0..12).map(|_| self.uniform()).sum::<f64>() - 6.0
    }
}

pub struct Profile {
    pub seed: u64,
    pub drift: f64,
    pub vol: f64,
    /// Extra return on the final day
    pub jump: f64,
    /// Number of trailing days with a smooth, nearly one-way climb
    pub rally: usize,
}

pub fn bars(profile: &Profile, days: usize) -> Bars {
    let mut rng = Lcg::new(profile.seed);
    let mut close = vec![10.0];
    let mut volume = vec![2e6];

    for t in 1..days {
        let z = rng.normal();
        let mut r = if profile.rally > 0 && t >= days - profile.rally {
            0.012 + 0.001 * z
        } else {
            profile.drift + profile.vol * z
        };
        if t == days - 1 {
            r += profile.jump;
        }
        let prev = close[t - 1];
        close.push(prev * (1.0 + r));

        let z2 = rng.normal();
        volume.push(2e6 * (1.0 + 0.1 * z2));
    }
    volume[days - 1] = 4e6;

    let mut open = vec![10.0];
    open.extend_from_slice(&close[..days - 1]);

    Bars {
        open,
        high: close.iter().map(|c| c * 1.008).collect(),
        low: close.iter().map(|c| c * 0.992).collect(),
        close,
        volume,
    }
}

/// Passes every filter and confirmation
pub fn scenario_a() -> Profile {
    Profile {
        seed: 6,
        drift: 0.002,
        vol: 0.012,
        jump: 0.08,
        rally: 0,
    }
}

/// Strong enough for the universe filters, but overbought (RSI above 90)
pub fn scenario_b() -> Profile {
    Profile {
        seed: 23,
        drift: 0.002,
        vol: 0.012,
        jump: 0.05,
        rally: 25,
    }
}

/// Steady decline, fails everything
pub fn scenario_c() -> Profile {
    Profile {
        seed: 37,
        drift: -0.002,
        vol: 0.012,
        jump: 0.0,
        rally: 0,
    }
}

pub fn dates(days: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..days as i64).map(|i| start + Duration::days(i)).collect()
}

pub fn panel_of(entries: &[(&str, Profile)]) -> Panel {
    let bars: BTreeMap<String, Bars> = entries
        .iter()
        .map(|(ticker, profile)| (ticker.to_string(), bars(profile, DAYS)))
        .collect();
    Panel::from_bars(dates(DAYS), bars).unwrap()
}

pub fn scenario_panel() -> Panel {
    panel_of(&[("A", scenario_a()), ("B", scenario_b()), ("C", scenario_c())])
}
