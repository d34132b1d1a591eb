use crate::indicators::{last, rolling_mean, rolling_std};

/// Bollinger band series aligned with the input closes
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub middle_line: Vec<f64>, // Rolling mean
    pub upper_band: Vec<f64>,  // Middle + (std_dev * multiplier)
    pub lower_band: Vec<f64>,  // Middle - (std_dev * multiplier)
}

impl BollingerBands {
    pub fn latest_upper(&self) -> f64 {
        last(&self.upper_band)
    }

    pub fn latest_lower(&self) -> f64 {
        last(&self.lower_band)
    }
}

#[derive(Debug, Clone)]
pub struct BollingerCalculator {
    pub period: usize,       // Rolling window (default 20)
    pub std_multiplier: f64, // Standard deviation multiplier (default 2.0)
}

impl Default for BollingerCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl BollingerCalculator {
    pub fn new() -> Self {
        Self {
            period: 20,
            std_multiplier: 2.0,
        }
    }

    pub fn with_settings(period: usize, std_multiplier: f64) -> Self {
        Self {
            period,
            std_multiplier,
        }
    }

    /// Calculate the band series; the first `period - 1` rows are NaN
    pub fn calculate_bollinger_bands(&self, prices: &[f64]) -> BollingerBands {
        let middle_line = rolling_mean(prices, self.period);
        let std_dev = rolling_std(prices, self.period);

        let upper_band = middle_line
            .iter()
            .zip(std_dev.iter())
            .map(|(m, s)| m + s * self.std_multiplier)
            .collect();
        let lower_band = middle_line
            .iter()
            .zip(std_dev.iter())
            .map(|(m, s)| m - s * self.std_multiplier)
            .collect();

        BollingerBands {
            middle_line,
            upper_band,
            lower_band,
        }
    }

    /// Latest close strictly above the latest upper band; NaN never breaks out
    pub fn is_upper_breakout(&self, prices: &[f64]) -> bool {
        let bands = self.calculate_bollinger_bands(prices);
        last(prices) > bands.latest_upper()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_calculator_creation() {
        let calc = BollingerCalculator::new();
        assert_eq!(calc.period, 20);
        assert_eq!(calc.std_multiplier, 2.0);
    }

    #[test]
    fn test_basic_bollinger_bands_calculation() {
        let calc = BollingerCalculator::with_settings(5, 2.0);

        // Mean 20, sample std sqrt(2.5)
        let prices = vec![18.0, 19.0, 20.0, 21.0, 22.0];
        let bands = calc.calculate_bollinger_bands(&prices);

        assert!(bands.middle_line[3].is_nan());
        assert!((bands.middle_line[4] - 20.0).abs() < 1e-9);
        assert!((bands.latest_upper() - (20.0 + 2.0 * 2.5_f64.sqrt())).abs() < 1e-9);
        assert!((bands.latest_lower() - (20.0 - 2.0 * 2.5_f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn test_constant_prices_collapse_bands() {
        let calc = BollingerCalculator::new();
        let prices = vec![100.0; 25];
        let bands = calc.calculate_bollinger_bands(&prices);

        assert!((bands.latest_upper() - 100.0).abs() < 1e-9);
        // Close equal to the band is not a breakout
        assert!(!calc.is_upper_breakout(&prices));
    }

    #[test]
    fn test_breakout_detection() {
        let calc = BollingerCalculator::new();

        let mut prices: Vec<f64> = (0..24).map(|i| 100.0 + ((i % 3) as f64) * 0.1).collect();
        prices.push(108.0);
        assert!(calc.is_upper_breakout(&prices));

        prices.push(100.0);
        assert!(!calc.is_upper_breakout(&prices));
    }

    #[test]
    fn test_insufficient_data_never_breaks_out() {
        let calc = BollingerCalculator::new();
        assert!(!calc.is_upper_breakout(&[100.0, 101.0, 150.0]));
        assert!(!calc.is_upper_breakout(&[]));
    }
}
