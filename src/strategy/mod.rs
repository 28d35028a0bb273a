// Signal and exit-price logic
pub mod exit;
pub mod signals;

use crate::models::{Candle, Signal};
use crate::Result;

pub use exit::calculate_exit_price;
pub use signals::{decide_signal, evaluate_sma_signal, SignalReport, DEFAULT_SMA_PERIOD};

/// Base trait for directional option strategies
pub trait Strategy: Send + Sync {
    /// Generate a CALL/PUT signal from daily candles, oldest first
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// Latest close against its trailing simple moving average
#[derive(Debug, Clone)]
pub struct SmaStrategy {
    period: usize,
    name: String,
}

impl SmaStrategy {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("SMA({})", period),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Default for SmaStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SMA_PERIOD)
    }
}

impl Strategy for SmaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        decide_signal(candles, self.period)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles_required(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategy() {
        let strategy = SmaStrategy::default();
        assert_eq!(strategy.name(), "SMA(14)");
        assert_eq!(strategy.min_candles_required(), 14);
    }

    #[test]
    fn test_strategy_rejects_empty_input() {
        let strategy = SmaStrategy::new(5);
        assert!(strategy.generate_signal(&[]).is_err());
    }
}
