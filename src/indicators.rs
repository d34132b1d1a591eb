//! Series indicators over daily price/volume histories.
//!
//! All functions take a full history (oldest first) and return a series of the
//! same length. Insufficient warmup or missing inputs produce NaN rather than
//! errors, so short histories simply fail the downstream comparisons.

/// Smoothing factor for a center-of-mass parameterized EWM
pub fn alpha_from_com(com: f64) -> f64 {
    1.0 / (1.0 + com)
}

/// Smoothing factor for a span parameterized EWM
pub fn alpha_from_span(span: f64) -> f64 {
    2.0 / (span + 1.0)
}

/// Recursive exponential moving average (`adjust=False`).
///
/// The first observed value seeds the average. Missing observations decay
/// the weight of the running average but leave its value unchanged, so the
/// output carries the last average through gaps.
pub fn ewm_mean(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut average = f64::NAN;
    let mut old_weight = 1.0;

    for &x in values {
        let observed = !x.is_nan();
        if average.is_nan() {
            if observed {
                average = x;
            }
        } else {
            old_weight *= 1.0 - alpha;
            if observed {
                if average != x {
                    average = (old_weight * average + alpha * x) / (old_weight + alpha);
                }
                old_weight = 1.0;
            }
        }
        out.push(average);
    }

    out
}

/// One-step difference; the first element is NaN
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Percentage change over `periods` rows, without filling gaps
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                values[i] / values[i - periods] - 1.0
            }
        })
        .collect()
}

/// Trailing mean over a full window; any NaN in the window yields NaN
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Trailing sample standard deviation (ddof = 1) over a full window
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        if w.len() < 2 {
            return f64::NAN;
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let variance = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
        variance.sqrt()
    })
}

fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|x| x.is_nan()) {
                f64::NAN
            } else {
                f(slice)
            }
        })
        .collect()
}

/// Last element of a series, NaN when empty
pub fn last(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(f64::NAN)
}

/// Wilder-smoothed relative strength index in [0, 100].
///
/// Gains and losses are smoothed with an EWM of center of mass `length - 1`.
/// A window with gains and no losses reads 100.
pub fn rsi(close: &[f64], length: usize) -> Vec<f64> {
    let delta = diff(close);
    let up: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { d } else { d.max(0.0) })
        .collect();
    let down: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { d } else { (-d).max(0.0) })
        .collect();

    let alpha = alpha_from_com(length.saturating_sub(1) as f64);
    let avg_up = ewm_mean(&up, alpha);
    let avg_down = ewm_mean(&down, alpha);

    avg_up
        .iter()
        .zip(avg_down.iter())
        .map(|(&gain, &loss)| {
            let rs = gain / loss;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// Average true range with Wilder smoothing (center of mass `length - 1`).
///
/// True range takes the max of the available components, so the first row
/// (no previous close) uses the high-low range alone.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], length: usize) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let true_range: Vec<f64> = (0..n)
        .map(|i| {
            let prev_close = if i == 0 { f64::NAN } else { close[i - 1] };
            [
                high[i] - low[i],
                (high[i] - prev_close).abs(),
                (low[i] - prev_close).abs(),
            ]
            .into_iter()
            .filter(|x| !x.is_nan())
            .fold(f64::NAN, f64::max)
        })
        .collect();

    ewm_mean(&true_range, alpha_from_com(length.saturating_sub(1) as f64))
}

/// MACD line and its signal line
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

impl Macd {
    pub fn latest(&self) -> f64 {
        last(&self.macd)
    }
}

/// Fast EMA minus slow EMA, plus an EMA of the difference as signal line
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ewm_mean(close, alpha_from_span(fast as f64));
    let slow_ema = ewm_mean(close, alpha_from_span(slow as f64));
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal = ewm_mean(&macd, alpha_from_span(signal as f64));

    Macd { macd, signal }
}
