use livetrader_core::prelude::*;

use crate::{validate_long_fraction, Strategy, StrategyBase, StrategyParams};

/// Follows the direction of the last price change.
///
/// Buys after an uptick, sells after a downtick and keeps the current
/// position when the price is unchanged.
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    base: StrategyBase,
    long_fraction: f64,
}

impl TrendFollowing {
    pub const DEFAULT_LONG_FRACTION: f64 = 0.5;

    pub fn new(name: impl Into<String>, params: StrategyParams) -> Result<Self> {
        let base = StrategyBase::new(name, params);
        let long_fraction = base.param_f64("long_fraction", Self::DEFAULT_LONG_FRACTION)?;
        let long_fraction = validate_long_fraction(&base, long_fraction)?;

        Ok(Self { base, long_fraction })
    }

    pub fn long_fraction(&self) -> f64 {
        self.long_fraction
    }
}

impl Strategy for TrendFollowing {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StrategyBase {
        &mut self.base
    }

    fn generate_signals(&self, prices: &[f64]) -> Result<Vec<Signal>> {
        let mut signals = Vec::with_capacity(prices.len());
        if prices.is_empty() {
            return Ok(signals);
        }

        signals.push(Signal::Hold);
        for window in prices.windows(2) {
            let signal = if window[1] > window[0] {
                Signal::Buy
            } else if window[1] < window[0] {
                Signal::Sell
            } else {
                Signal::Hold
            };
            signals.push(signal);
        }

        Ok(signals)
    }

    fn calculate_target_position(&self, signal: Signal, current_position: f64) -> Result<f64> {
        Ok(match signal {
            Signal::Buy => self.long_fraction,
            Signal::Sell => 0.0,
            Signal::Hold => current_position,
        })
    }
}
