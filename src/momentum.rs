use crate::indicators::{last, pct_change};

/// Trailing percentage change over a fixed number of trading days
#[derive(Debug, Clone)]
pub struct MomentumCalculator {
    pub periods: usize,
}

impl Default for MomentumCalculator {
    fn default() -> Self {
        Self::new(63) // ~3 months of trading days
    }
}

impl MomentumCalculator {
    pub fn new(periods: usize) -> Self {
        Self { periods }
    }

    pub fn calculate_momentum(&self, prices: &[f64]) -> Vec<f64> {
        pct_change(prices, self.periods)
    }

    /// Momentum at the most recent date; NaN when the history is too short
    pub fn latest(&self, prices: &[f64]) -> f64 {
        last(&self.calculate_momentum(prices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_over_window() {
        let calc = MomentumCalculator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 12.5, 13.2];
        // 13.2 / 11.0 - 1
        assert!((calc.latest(&prices) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_short_history_is_nan() {
        let calc = MomentumCalculator::default();
        let prices: Vec<f64> = (0..63).map(|i| 10.0 + i as f64).collect();
        assert!(calc.latest(&prices).is_nan());
    }
}
